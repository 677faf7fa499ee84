use crate::structures::boot_word;
use crate::{Error, SECTOR_SIZE};

/// Byte offset of the first AHDI partition descriptor.
pub const DESCRIPTOR_OFFSET: usize = 0x1C6;
/// Size of one descriptor.
pub const DESCRIPTOR_SIZE: usize = 12;
/// Offset of the big-endian total image sector count.
pub const TOTAL_SECTORS_OFFSET: usize = 0x1FA;

/// Descriptor flag bit: the slot is populated.
pub const FLAG_EXISTS: u8 = 0x01;
/// Descriptor flag bit: the partition is bootable.
pub const FLAG_BOOTABLE: u8 = 0x80;

/// One 12-byte AHDI partition descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionDescriptor {
    pub flags: u8,
    /// Partition id, `GEM` for FAT16 partitions up to 16 MiB
    pub id: [u8; 3],
    pub start_sector: u32,
    pub sector_count: u32,
}

impl PartitionDescriptor {
    pub fn gem(start_sector: u32, sector_count: u32) -> Self {
        Self {
            flags: FLAG_EXISTS,
            id: *b"GEM",
            start_sector,
            sector_count,
        }
    }

    pub fn is_bootable(&self) -> bool {
        self.flags & FLAG_BOOTABLE != 0
    }

    fn write(&self, out: &mut [u8]) {
        out[0] = self.flags;
        out[1..4].copy_from_slice(&self.id);
        out[4..8].copy_from_slice(&self.start_sector.to_be_bytes());
        out[8..12].copy_from_slice(&self.sector_count.to_be_bytes());
    }

    fn parse(raw: &[u8]) -> Option<Self> {
        if raw[0] & FLAG_EXISTS == 0 {
            return None;
        }
        Some(Self {
            flags: raw[0],
            id: raw[1..4].try_into().unwrap(),
            start_sector: u32::from_be_bytes(raw[4..8].try_into().unwrap()),
            sector_count: u32::from_be_bytes(raw[8..12].try_into().unwrap()),
        })
    }
}

/// Sector 0 of the image: the Atari root sector.
///
/// Bytes 0..446 hold the MBR loader code when one is installed, the
/// descriptor table sits at 0x1C6, the total image sector count at
/// 0x1FA, and the TOS balancing word at 0x1FE when any partition is
/// bootable.
#[derive(Debug, Clone)]
pub struct RootSector {
    pub partitions: Vec<PartitionDescriptor>,
    pub total_sectors: u32,
}

impl RootSector {
    pub fn write(&self, loader: Option<&[u8]>) -> [u8; SECTOR_SIZE] {
        debug_assert!(self.partitions.len() <= 4);
        let mut sector = [0u8; SECTOR_SIZE];
        if let Some(code) = loader {
            debug_assert!(code.len() <= DESCRIPTOR_OFFSET);
            sector[..code.len()].copy_from_slice(code);
        }
        for (i, part) in self.partitions.iter().enumerate() {
            let off = DESCRIPTOR_OFFSET + i * DESCRIPTOR_SIZE;
            part.write(&mut sector[off..off + DESCRIPTOR_SIZE]);
        }
        sector[TOTAL_SECTORS_OFFSET..TOTAL_SECTORS_OFFSET + 4]
            .copy_from_slice(&self.total_sectors.to_be_bytes());
        if self.partitions.iter().any(PartitionDescriptor::is_bootable) {
            let word = boot_word(&sector);
            sector[0x1FE..0x200].copy_from_slice(&word.to_be_bytes());
        }
        sector
    }

    pub fn parse(sector: &[u8]) -> Result<Self, Error> {
        if sector.len() != SECTOR_SIZE {
            return Err(Error::InvalidImage("short root sector".into()));
        }
        let mut partitions = Vec::new();
        for i in 0..4 {
            let off = DESCRIPTOR_OFFSET + i * DESCRIPTOR_SIZE;
            match PartitionDescriptor::parse(&sector[off..off + DESCRIPTOR_SIZE]) {
                Some(part) if part.sector_count > 0 => partitions.push(part),
                _ => break,
            }
        }
        if partitions.is_empty() {
            return Err(Error::InvalidImage("no partitions in root sector".into()));
        }
        let total_sectors = u32::from_be_bytes(
            sector[TOTAL_SECTORS_OFFSET..TOTAL_SECTORS_OFFSET + 4]
                .try_into()
                .unwrap(),
        );
        Ok(Self {
            partitions,
            total_sectors,
        })
    }
}
