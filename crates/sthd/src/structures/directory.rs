use crate::structures::{ShortName, time::DosDateTime};

bitflags::bitflags! {
    /// File attributes of a directory record
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_LABEL = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
    }
}

/// A 32-byte FAT directory record.
///
/// The ten bytes after the attribute byte (NT reserved field, creation
/// and access stamps) stay zero; TOS only reads the modification pair.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct RawDirEntry {
    /// DIR_Name, 8+3 space padded uppercase ASCII
    pub name: [u8; 11],
    /// DIR_Attr
    pub attributes: u8,
    pub reserved: [u8; 10],
    /// DIR_WrtTime
    pub time: [u8; 2],
    /// DIR_WrtDate
    pub date: [u8; 2],
    /// DIR_FstClusLO
    pub start_cluster: [u8; 2],
    /// DIR_FileSize, zero for directories
    pub size: [u8; 4],
}

unsafe impl bytemuck::Zeroable for RawDirEntry {}
unsafe impl bytemuck::NoUninit for RawDirEntry {}
unsafe impl bytemuck::AnyBitPattern for RawDirEntry {}

impl RawDirEntry {
    fn new(
        name: [u8; 11],
        attributes: FileAttributes,
        stamp: DosDateTime,
        start_cluster: u16,
        size: u32,
    ) -> Self {
        Self {
            name,
            attributes: attributes.bits(),
            reserved: [0; 10],
            time: stamp.time.to_le_bytes(),
            date: stamp.date.to_le_bytes(),
            start_cluster: start_cluster.to_le_bytes(),
            size: size.to_le_bytes(),
        }
    }

    pub fn file(name: &ShortName, stamp: DosDateTime, start_cluster: u16, size: u32) -> Self {
        Self::new(
            name.entry_bytes(),
            FileAttributes::ARCHIVE,
            stamp,
            start_cluster,
            size,
        )
    }

    pub fn directory(name: &ShortName, stamp: DosDateTime, start_cluster: u16) -> Self {
        Self::new(
            name.entry_bytes(),
            FileAttributes::DIRECTORY,
            stamp,
            start_cluster,
            0,
        )
    }

    /// The `.` entry of a subdirectory cluster.
    pub fn dot(stamp: DosDateTime, self_cluster: u16) -> Self {
        Self::new(*b".          ", FileAttributes::DIRECTORY, stamp, self_cluster, 0)
    }

    /// The `..` entry; `parent_cluster` is 0 when the parent is the
    /// root directory.
    pub fn dot_dot(stamp: DosDateTime, parent_cluster: u16) -> Self {
        Self::new(*b"..         ", FileAttributes::DIRECTORY, stamp, parent_cluster, 0)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(bytes)
    }

    /// True for the all-zero record that terminates a directory.
    pub fn is_terminator(&self) -> bool {
        self.name[0] == 0
    }

    pub fn is_dot_entry(&self) -> bool {
        self.name[0] == b'.'
    }

    pub fn is_directory(&self) -> bool {
        FileAttributes::from_bits_truncate(self.attributes).contains(FileAttributes::DIRECTORY)
    }

    pub fn short_name(&self) -> Option<ShortName> {
        ShortName::from_entry_bytes(&self.name)
    }

    pub fn stamp(&self) -> DosDateTime {
        DosDateTime::new(u16::from_le_bytes(self.date), u16::from_le_bytes(self.time))
    }

    pub fn cluster(&self) -> u16 {
        u16::from_le_bytes(self.start_cluster)
    }

    pub fn file_size(&self) -> u32 {
        u32::from_le_bytes(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{align_of, offset_of, size_of};
    use static_assertions::const_assert_eq;

    const_assert_eq!(size_of::<RawDirEntry>(), 32);
    const_assert_eq!(align_of::<RawDirEntry>(), 1);

    const_assert_eq!(offset_of!(RawDirEntry, name), 0);
    const_assert_eq!(offset_of!(RawDirEntry, attributes), 11);
    const_assert_eq!(offset_of!(RawDirEntry, reserved), 12);
    const_assert_eq!(offset_of!(RawDirEntry, time), 22);
    const_assert_eq!(offset_of!(RawDirEntry, date), 24);
    const_assert_eq!(offset_of!(RawDirEntry, start_cluster), 26);
    const_assert_eq!(offset_of!(RawDirEntry, size), 28);

    #[test]
    fn file_record_layout() {
        let name = ShortName::parse("TEST.TXT").unwrap();
        let stamp = DosDateTime::pack(1989, 6, 15, 12, 0, 0);
        let entry = RawDirEntry::file(&name, stamp, 2, 5);
        let bytes = bytemuck::bytes_of(&entry);
        assert_eq!(&bytes[0..11], b"TEST    TXT");
        assert_eq!(bytes[11], 0x20);
        assert_eq!(&bytes[12..22], &[0u8; 10]);
        assert_eq!(&bytes[26..28], &2u16.to_le_bytes());
        assert_eq!(&bytes[28..32], &5u32.to_le_bytes());

        let back = RawDirEntry::from_bytes(bytes);
        assert_eq!(back.short_name().unwrap().to_string(), "TEST.TXT");
        assert_eq!(back.stamp(), stamp);
        assert!(!back.is_directory());
    }

    #[test]
    fn dot_entries_have_no_name() {
        let stamp = DosDateTime::pack(1990, 1, 1, 0, 0, 0);
        assert!(RawDirEntry::dot(stamp, 3).is_dot_entry());
        assert!(RawDirEntry::dot_dot(stamp, 0).is_dot_entry());
        assert!(RawDirEntry::dot(stamp, 3).short_name().is_none());
    }
}
