use crate::structures::{Fat16Geometry, boot_word};
use crate::{Error, SECTOR_SIZE};

/// BPB_Media for a hard disk.
pub const MEDIA_HARD_DISK: u8 = 0xF8;

/// Offset of the loader code region inside the boot sector.
pub const CODE_OFFSET: usize = 0x3E;

/// The FAT16 boot sector of one partition.
///
/// The BPB is the standard little-endian DOS layout; the Atari
/// variations are the m68k jump when loader code is installed and the
/// big-endian balancing word at 0x1FE that makes TOS treat the sector
/// as bootable (see [`crate::structures::boot_word`]).
#[derive(Debug, Clone, Copy)]
pub struct BootSector {
    pub oem_name: [u8; 8],
    pub geometry: Fat16Geometry,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
}

impl BootSector {
    pub fn new(geometry: Fat16Geometry, volume_id: u32) -> Self {
        Self {
            oem_name: *b"MKHDMENU",
            geometry,
            volume_id,
            volume_label: *b"NO NAME    ",
        }
    }

    /// Derives a volume serial from the wall clock and a seed, so two
    /// partitions built in the same run still differ.
    pub fn current_volume_id(seed: u32) -> u32 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let time_part = (now.as_secs() as u32) ^ (now.as_secs().wrapping_shr(32) as u32);
        time_part ^ seed
    }

    pub fn write(&self, sector: &mut [u8]) {
        assert_eq!(sector.len(), SECTOR_SIZE);
        let g = &self.geometry;
        sector[0x00..0x03].copy_from_slice(&[0xEB, 0x3C, 0x90]);
        sector[0x03..0x0B].copy_from_slice(&self.oem_name);
        sector[0x0B..0x0D].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        sector[0x0D] = g.sectors_per_cluster;
        sector[0x0E..0x10].copy_from_slice(&g.reserved_sectors.to_le_bytes());
        sector[0x10] = g.fat_count;
        sector[0x11..0x13].copy_from_slice(&g.root_entries.to_le_bytes());
        sector[0x13..0x15].copy_from_slice(&(g.total_sectors as u16).to_le_bytes());
        sector[0x15] = MEDIA_HARD_DISK;
        sector[0x16..0x18].copy_from_slice(&g.sectors_per_fat.to_le_bytes());
        // BPB_SecPerTrk / BPB_NumHeads stay zero, TOS does not use CHS
        sector[0x18..0x1A].copy_from_slice(&0u16.to_le_bytes());
        sector[0x1A..0x1C].copy_from_slice(&0u16.to_le_bytes());
        sector[0x1C..0x20].copy_from_slice(&g.hidden_sectors.to_le_bytes());
        sector[0x20..0x24].copy_from_slice(&0u32.to_le_bytes());
        sector[0x24] = 0x80;
        sector[0x25] = 0x00;
        sector[0x26] = 0x29;
        sector[0x27..0x2B].copy_from_slice(&self.volume_id.to_le_bytes());
        sector[0x2B..0x36].copy_from_slice(&self.volume_label);
        sector[0x36..0x3E].copy_from_slice(b"FAT16   ");
    }

    /// Stamps loader machine code into the code region, switches the
    /// jump to an m68k `BRA.S` into it, and balances the sector so the
    /// big-endian word sum equals the TOS boot magic.
    pub fn install_loader(sector: &mut [u8], code: &[u8]) {
        assert_eq!(sector.len(), SECTOR_SIZE);
        assert!(CODE_OFFSET + code.len() <= SECTOR_SIZE - 2);
        sector[0x00..0x03].copy_from_slice(&[0x60, (CODE_OFFSET - 2) as u8, 0x00]);
        sector[CODE_OFFSET..CODE_OFFSET + code.len()].copy_from_slice(code);
        let word = boot_word(sector);
        sector[0x1FE..0x200].copy_from_slice(&word.to_be_bytes());
    }

    /// Reads the geometry back out of a boot sector.
    pub fn parse(sector: &[u8]) -> Result<Fat16Geometry, Error> {
        if sector.len() != SECTOR_SIZE {
            return Err(Error::InvalidImage("short boot sector".into()));
        }
        let bytes_per_sector = u16::from_le_bytes([sector[0x0B], sector[0x0C]]);
        if bytes_per_sector as usize != SECTOR_SIZE {
            return Err(Error::InvalidImage(format!(
                "unsupported sector size {bytes_per_sector}"
            )));
        }
        let total_16 = u16::from_le_bytes([sector[0x13], sector[0x14]]) as u32;
        let total_32 = u32::from_le_bytes(sector[0x20..0x24].try_into().unwrap());
        let geometry = Fat16Geometry {
            total_sectors: if total_16 != 0 { total_16 } else { total_32 },
            sectors_per_cluster: sector[0x0D],
            reserved_sectors: u16::from_le_bytes([sector[0x0E], sector[0x0F]]),
            fat_count: sector[0x10],
            root_entries: u16::from_le_bytes([sector[0x11], sector[0x12]]),
            sectors_per_fat: u16::from_le_bytes([sector[0x16], sector[0x17]]),
            hidden_sectors: u32::from_le_bytes(sector[0x1C..0x20].try_into().unwrap()),
        };
        if geometry.sectors_per_cluster == 0
            || geometry.fat_count == 0
            || geometry.sectors_per_fat == 0
            || geometry.total_sectors == 0
        {
            return Err(Error::InvalidImage("degenerate BPB".into()));
        }
        if geometry.data_start_sector() >= geometry.total_sectors {
            return Err(Error::InvalidImage(
                "BPB reserved, FAT and root regions exceed the partition".into(),
            ));
        }
        Ok(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::{BOOT_MAGIC, word_sum};
    use pretty_assertions::assert_eq;

    fn geometry() -> Fat16Geometry {
        Fat16Geometry {
            total_sectors: 2048,
            sectors_per_cluster: 1,
            reserved_sectors: 1,
            fat_count: 2,
            root_entries: 512,
            sectors_per_fat: 8,
            hidden_sectors: 1,
        }
    }

    #[test]
    fn bpb_round_trips() {
        let mut sector = [0u8; SECTOR_SIZE];
        BootSector::new(geometry(), 0xDEADBEEF).write(&mut sector);
        assert_eq!(&sector[0x36..0x3E], b"FAT16   ");
        assert_eq!(sector[0x15], MEDIA_HARD_DISK);
        assert_eq!(u32::from_le_bytes(sector[0x27..0x2B].try_into().unwrap()), 0xDEADBEEF);
        let parsed = BootSector::parse(&sector).unwrap();
        assert_eq!(parsed, geometry());
    }

    #[test]
    fn oversized_bpb_regions_are_rejected() {
        let mut sector = [0u8; SECTOR_SIZE];
        BootSector::new(geometry(), 1).write(&mut sector);
        // Nonzero reserved count far beyond the declared total
        sector[0x0E..0x10].copy_from_slice(&40_000u16.to_le_bytes());
        assert!(matches!(
            BootSector::parse(&sector),
            Err(Error::InvalidImage(_))
        ));
    }

    #[test]
    fn loader_installation_balances_checksum() {
        let mut sector = [0u8; SECTOR_SIZE];
        BootSector::new(geometry(), 1).write(&mut sector);
        assert_ne!(word_sum(&sector), BOOT_MAGIC);

        BootSector::install_loader(&mut sector, &[0x4E, 0x71, 0x4E, 0x75]);
        assert_eq!(word_sum(&sector), BOOT_MAGIC);
        assert_eq!(sector[0], 0x60);
        assert_eq!(&sector[CODE_OFFSET..CODE_OFFSET + 4], &[0x4E, 0x71, 0x4E, 0x75]);
        // The BPB survives the loader
        assert_eq!(BootSector::parse(&sector).unwrap(), geometry());
    }
}
