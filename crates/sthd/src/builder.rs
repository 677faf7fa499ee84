//! The image assembler.
//!
//! Owns the partitions and drives the pipeline: imports populate the
//! trees, the bootloader installer inspects drive C, the catalogue is
//! generated, each partition is planned and serialized, and the root
//! sector ties the image together. Each partition moves through
//! `Empty → Populating → Planned → Serialized` exactly once.

use std::path::PathBuf;

use crate::boot::Driver;
use crate::catalogue;
use crate::import::{self, Archive, Source};
use crate::plan;
use crate::serialize;
use crate::structures::root_sector::{FLAG_BOOTABLE, PartitionDescriptor, RootSector};
use crate::structures::time::DosDateTime;
use crate::tree::{DirNode, Node};
use crate::{DRIVES, Error, MAX_PARTITION_SECTORS, Result, SECTOR_SIZE};

/// Parses a single partition size like `16M`, `8192K` or `1048576`.
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let err = || Error::MalformedSize(s.to_string());
    let (digits, multiplier) = match s.chars().last() {
        Some('K') | Some('k') => (&s[..s.len() - 1], 1024u64),
        Some('M') | Some('m') => (&s[..s.len() - 1], 1024 * 1024),
        _ => (s, 1),
    };
    let count: u64 = digits.parse().map_err(|_| err())?;
    let bytes = count.checked_mul(multiplier).ok_or_else(err)?;
    if bytes == 0
        || bytes % SECTOR_SIZE as u64 != 0
        || bytes / SECTOR_SIZE as u64 > MAX_PARTITION_SECTORS as u64
    {
        return Err(err());
    }
    Ok(bytes)
}

/// Parses a multi-partition size specification like `16M+8M`.
pub fn parse_size_spec(spec: &str) -> Result<Vec<u64>> {
    let sizes = spec
        .split('+')
        .map(parse_size)
        .collect::<Result<Vec<_>>>()?;
    if sizes.len() > DRIVES.len() {
        return Err(Error::MalformedSize(spec.to_string()));
    }
    Ok(sizes)
}

/// Options the collaborator hands to the build.
#[derive(Debug, Default)]
pub struct BuildOptions {
    /// Write the installed loaders to `<stem>_mbr.bin` and
    /// `<stem>_bootsector.bin`
    pub export_bootloader: Option<PathBuf>,
    /// Generate `HDMENU.CSV` and attach screenshots
    pub generate_menu: bool,
    /// Display names keyed by game path prefix
    pub names: Vec<(String, String)>,
    /// Display names keyed by game directory name
    pub links: Vec<(String, String)>,
    /// Screenshot lookup keys keyed by game directory name
    pub neopics: Vec<(String, String)>,
    /// The screenshot archive
    pub screenshots: Option<Archive>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Empty,
    Populating,
    Planned,
    Serialized,
}

#[derive(Debug)]
pub struct Partition {
    pub sectors: u32,
    pub root: DirNode,
    state: PartitionState,
}

impl Partition {
    pub fn state(&self) -> PartitionState {
        self.state
    }
}

#[derive(Debug)]
pub struct ImageBuilder {
    partitions: Vec<Partition>,
    options: BuildOptions,
}

impl ImageBuilder {
    /// Creates an empty image from partition sizes in bytes. Sizes
    /// must already satisfy [`parse_size`]'s constraints.
    pub fn new(sizes: &[u64]) -> Result<Self> {
        if sizes.is_empty() || sizes.len() > DRIVES.len() {
            return Err(Error::MalformedSize(format!("{} partitions", sizes.len())));
        }
        let mut partitions = Vec::with_capacity(sizes.len());
        for size in sizes {
            if *size == 0
                || *size % SECTOR_SIZE as u64 != 0
                || *size / SECTOR_SIZE as u64 > MAX_PARTITION_SECTORS as u64
            {
                return Err(Error::MalformedSize(size.to_string()));
            }
            partitions.push(Partition {
                sectors: (*size / SECTOR_SIZE as u64) as u32,
                root: DirNode::root(),
                state: PartitionState::Empty,
            });
        }
        Ok(Self {
            partitions,
            options: BuildOptions::default(),
        })
    }

    /// Rebuilds a builder from already-read partitions (sector counts
    /// plus populated roots), as produced by [`crate::reader`].
    pub fn from_partitions(parts: Vec<(u32, DirNode)>) -> Result<Self> {
        if parts.is_empty() || parts.len() > DRIVES.len() {
            return Err(Error::InvalidImage(format!(
                "{} partitions in image",
                parts.len()
            )));
        }
        let partitions = parts
            .into_iter()
            .map(|(sectors, root)| Partition {
                sectors,
                root,
                state: PartitionState::Populating,
            })
            .collect();
        Ok(Self {
            partitions,
            options: BuildOptions::default(),
        })
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut BuildOptions {
        &mut self.options
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn drive_letter(&self, index: usize) -> char {
        *DRIVES.get(index).unwrap_or(&'?')
    }

    /// Mutable access to a partition root for population. Fails for
    /// unknown drives; panics if the partition was already planned.
    fn populate(&mut self, index: usize) -> Result<&mut DirNode> {
        let letter = self.drive_letter(index);
        let part = self
            .partitions
            .get_mut(index)
            .ok_or(Error::PartitionOutOfRange(letter))?;
        assert!(
            matches!(part.state, PartitionState::Empty | PartitionState::Populating),
            "partition {letter} mutated after planning"
        );
        part.state = PartitionState::Populating;
        Ok(&mut part.root)
    }

    /// Inserts a node at `path` on partition `drive` (0 = C).
    pub fn insert(&mut self, drive: usize, path: &str, node: Node) -> Result<()> {
        self.populate(drive)?.insert(path, node)
    }

    /// Inserts file bytes, deriving the node name from the path.
    pub fn insert_file(
        &mut self,
        drive: usize,
        path: &str,
        data: Vec<u8>,
        stamp: DosDateTime,
    ) -> Result<()> {
        let components = crate::tree::split_path(path)?;
        let name = *components
            .last()
            .ok_or_else(|| Error::InvalidPath(path.to_string()))?;
        self.insert(drive, path, Node::file(name, data, stamp))
    }

    /// Imports a decoded source onto partition `drive`.
    pub fn import(
        &mut self,
        drive: usize,
        dest: Option<&str>,
        source: Source,
        program: Option<&str>,
    ) -> Result<()> {
        import::import(self.populate(drive)?, dest, source, program)
    }

    /// Which partition, if any, holds `path`.
    pub fn find(&self, path: &str) -> Option<usize> {
        self.partitions
            .iter()
            .position(|p| p.root.lookup(path).is_some())
    }

    /// Runs the pipeline and returns the image bytes.
    pub fn build(&mut self) -> Result<Vec<u8>> {
        let driver = Driver::detect(&self.partitions[0].root);
        match driver {
            Some(d) => log::info!(
                "found {} on drive C, installing the {d:?} bootloader",
                d.driver_file()
            ),
            None => log::warn!(
                "neither ICDBOOT.SYS nor SHDRIVER.SYS on drive C, the image will not boot"
            ),
        }
        if let Some(stem) = self.options.export_bootloader.clone() {
            match driver {
                Some(d) => d.export(&stem)?,
                None => log::warn!("no bootloader installed, nothing to export"),
            }
        }

        if self.options.generate_menu {
            catalogue::generate(self)?;
        }

        let mut plans = Vec::with_capacity(self.partitions.len());
        let mut start_lba = 1u32;
        for (i, part) in self.partitions.iter_mut().enumerate() {
            assert!(
                !matches!(part.state, PartitionState::Planned | PartitionState::Serialized),
                "partition planned twice"
            );
            let plan = plan::plan_partition(&part.root, part.sectors, start_lba, DRIVES[i])?;
            part.state = PartitionState::Planned;
            start_lba += part.sectors;
            plans.push(plan);
        }
        let total_sectors = start_lba;

        let mut descriptors = Vec::with_capacity(self.partitions.len());
        let mut lba = 1u32;
        for part in &self.partitions {
            descriptors.push(PartitionDescriptor::gem(lba, part.sectors));
            lba += part.sectors;
        }
        if driver.is_some() {
            descriptors[0].flags |= FLAG_BOOTABLE;
        }
        let root_sector = RootSector {
            partitions: descriptors,
            total_sectors,
        }
        .write(driver.map(|d| d.mbr_code()));

        let mut image = Vec::with_capacity(total_sectors as usize * SECTOR_SIZE);
        image.extend_from_slice(&root_sector);
        for (i, (part, plan)) in self.partitions.iter_mut().zip(&plans).enumerate() {
            let loader = if i == 0 {
                driver.map(|d| d.boot_code())
            } else {
                None
            };
            image.extend_from_slice(&serialize::serialize_partition(
                &part.root,
                plan,
                loader,
                i as u32 + 1,
            ));
            part.state = PartitionState::Serialized;
        }

        log::info!("assembled {total_sectors} sectors ({} bytes)", image.len());
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size("16M").unwrap(), 16 * 1024 * 1024);
        assert_eq!(parse_size("16384K").unwrap(), 16 * 1024 * 1024);
        assert_eq!(parse_size("512").unwrap(), 512);
        assert!(parse_size("17M").is_err());
        assert!(parse_size("1000").is_err());
        assert!(parse_size("0").is_err());
        assert!(parse_size("16G").is_err());
        assert!(parse_size("").is_err());

        assert_eq!(parse_size_spec("16M+8M").unwrap(), vec![16 << 20, 8 << 20]);
        assert!(parse_size_spec("16M+16M+16M+16M+16M").is_err());
    }

    #[test]
    fn states_progress_through_the_pipeline() {
        let mut builder = ImageBuilder::new(&[1024 * 1024]).unwrap();
        assert_eq!(builder.partitions()[0].state(), PartitionState::Empty);

        builder
            .insert_file(0, "A.TXT", b"hi".to_vec(), DosDateTime::pack(1999, 9, 9, 9, 9, 8))
            .unwrap();
        assert_eq!(builder.partitions()[0].state(), PartitionState::Populating);

        builder.build().unwrap();
        assert_eq!(builder.partitions()[0].state(), PartitionState::Serialized);
    }

    #[test]
    fn unknown_drive_is_rejected() {
        let mut builder = ImageBuilder::new(&[1024 * 1024]).unwrap();
        let err = builder
            .insert_file(1, "A.TXT", vec![], DosDateTime::pack(1999, 9, 9, 9, 9, 8))
            .unwrap_err();
        assert!(matches!(err, Error::PartitionOutOfRange('D')));
    }

    #[test]
    fn find_reports_the_holding_partition() {
        let mut builder = ImageBuilder::new(&[1024 * 1024, 1024 * 1024]).unwrap();
        builder
            .insert_file(1, "GAMES\\FOO\\RUNME.TOS", vec![1], DosDateTime::pack(2000, 1, 1, 0, 0, 0))
            .unwrap();
        assert_eq!(builder.find("GAMES\\FOO\\RUNME.TOS"), Some(1));
        assert_eq!(builder.find("NOPE.TXT"), None);
    }
}
