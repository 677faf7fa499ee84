//! Bootloader installation.
//!
//! Which loader pair goes into the image depends on the hard-disk
//! driver file present in the root of partition C: `ICDBOOT.SYS`
//! selects the ICD loaders, `SHDRIVER.SYS` (also used by renamed
//! hddriver/CBHD installations) the AHDI ones. The loader blobs are
//! opaque m68k machine code embedded at build time.

use std::path::Path;

use crate::tree::{DirNode, Node};
use crate::Result;

static ICD_MBR: &[u8] = include_bytes!("../resources/icd_mbr.bin");
static ICD_BOOT: &[u8] = include_bytes!("../resources/icd_boot.bin");
static AHDI_MBR: &[u8] = include_bytes!("../resources/ahdi_mbr.bin");
static AHDI_BOOT: &[u8] = include_bytes!("../resources/ahdi_boot.bin");

/// The hard-disk driver families the installer knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Icd,
    Ahdi,
}

impl Driver {
    /// Scans the root of partition C for a known driver file.
    pub fn detect(root: &DirNode) -> Option<Self> {
        if matches!(root.lookup("ICDBOOT.SYS"), Some(Node::File(_))) {
            Some(Self::Icd)
        } else if matches!(root.lookup("SHDRIVER.SYS"), Some(Node::File(_))) {
            Some(Self::Ahdi)
        } else {
            None
        }
    }

    pub fn driver_file(&self) -> &'static str {
        match self {
            Self::Icd => "ICDBOOT.SYS",
            Self::Ahdi => "SHDRIVER.SYS",
        }
    }

    /// Code for the root-sector (MBR) code region.
    pub fn mbr_code(&self) -> &'static [u8] {
        match self {
            Self::Icd => ICD_MBR,
            Self::Ahdi => AHDI_MBR,
        }
    }

    /// Code for the partition-C boot-sector code region.
    pub fn boot_code(&self) -> &'static [u8] {
        match self {
            Self::Icd => ICD_BOOT,
            Self::Ahdi => AHDI_BOOT,
        }
    }

    /// Writes both loader blobs next to the image, as
    /// `<stem>_mbr.bin` and `<stem>_bootsector.bin`.
    pub fn export(&self, stem: &Path) -> Result<()> {
        let mbr_path = format!("{}_mbr.bin", stem.display());
        let boot_path = format!("{}_bootsector.bin", stem.display());
        std::fs::write(&mbr_path, self.mbr_code())?;
        std::fs::write(&boot_path, self.boot_code())?;
        log::info!("exported bootloader to {mbr_path} and {boot_path}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::{ShortName, time::DosDateTime};

    fn driver_file(name: &str) -> Node {
        Node::file(
            ShortName::parse(name).unwrap(),
            vec![0u8; 100],
            DosDateTime::pack(1993, 2, 3, 4, 5, 6),
        )
    }

    #[test]
    fn icd_wins_over_ahdi() {
        let mut root = DirNode::root();
        assert_eq!(Driver::detect(&root), None);

        root.insert("SHDRIVER.SYS", driver_file("SHDRIVER.SYS")).unwrap();
        assert_eq!(Driver::detect(&root), Some(Driver::Ahdi));

        root.insert("ICDBOOT.SYS", driver_file("ICDBOOT.SYS")).unwrap();
        assert_eq!(Driver::detect(&root), Some(Driver::Icd));
    }

    #[test]
    fn loader_blobs_fit_their_code_regions() {
        for driver in [Driver::Icd, Driver::Ahdi] {
            assert!(!driver.mbr_code().is_empty());
            assert!(driver.mbr_code().len() <= 446);
            assert!(!driver.boot_code().is_empty());
            assert!(driver.boot_code().len() <= 0x1FE - 0x3E);
        }
    }

    #[test]
    fn driver_directory_does_not_count() {
        let mut root = DirNode::root();
        root.insert(
            "ICDBOOT.SYS",
            Node::dir(
                ShortName::parse("ICDBOOT.SYS").unwrap(),
                DosDateTime::pack(1993, 2, 3, 4, 5, 6),
            ),
        )
        .unwrap();
        assert_eq!(Driver::detect(&root), None);
    }
}
