//! Reading an existing image back into the builder model.
//!
//! This is the inverse of the serializer, used to start a build from a
//! previously written image and to verify round trips in tests. Boot
//! code is not carried over; the driver file in the tree is enough for
//! the installer to re-stamp the loaders on the next build.

use crate::builder::ImageBuilder;
use crate::structures::Fat16Geometry;
use crate::structures::boot_sector::BootSector;
use crate::structures::directory::{FileAttributes, RawDirEntry};
use crate::structures::fat::Fat16;
use crate::tree::{DirNode, FileNode, Node};
use crate::{Error, Result, SECTOR_SIZE};

/// Directory nesting accepted when reading, matching the writer.
const MAX_DEPTH: usize = 8;

/// Parses a full image into a populated [`ImageBuilder`].
pub fn read_image(bytes: &[u8]) -> Result<ImageBuilder> {
    if bytes.len() < SECTOR_SIZE || bytes.len() % SECTOR_SIZE != 0 {
        return Err(Error::InvalidImage(format!(
            "image length {} is not sector aligned",
            bytes.len()
        )));
    }
    let root_sector = crate::structures::root_sector::RootSector::parse(&bytes[..SECTOR_SIZE])?;

    let mut parts = Vec::with_capacity(root_sector.partitions.len());
    for desc in &root_sector.partitions {
        let start = desc.start_sector as usize * SECTOR_SIZE;
        let len = desc.sector_count as usize * SECTOR_SIZE;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                Error::InvalidImage(format!(
                    "partition at sector {} runs past the image",
                    desc.start_sector
                ))
            })?;
        log::debug!(
            "reading partition at sector {} ({} sectors)",
            desc.start_sector,
            desc.sector_count
        );
        let root = read_partition(&bytes[start..end])?;
        parts.push((desc.sector_count, root));
    }
    ImageBuilder::from_partitions(parts)
}

fn read_partition(region: &[u8]) -> Result<DirNode> {
    let geometry = BootSector::parse(&region[..SECTOR_SIZE])?;
    if geometry.total_sectors as usize * SECTOR_SIZE > region.len() {
        return Err(Error::InvalidImage(
            "partition boot sector claims more sectors than present".into(),
        ));
    }

    let fat_off = geometry.reserved_sectors as usize * SECTOR_SIZE;
    let fat_len = geometry.sectors_per_fat as usize * SECTOR_SIZE;
    let fat = Fat16::from_bytes(&region[fat_off..fat_off + fat_len]);

    let root_off = geometry.root_dir_sector() as usize * SECTOR_SIZE;
    let root_len = geometry.root_entries as usize * 32;
    let mut root = DirNode::root();
    read_directory(
        region,
        &geometry,
        &fat,
        &region[root_off..root_off + root_len],
        &mut root,
        0,
    )?;
    Ok(root)
}

fn read_directory(
    region: &[u8],
    geometry: &Fat16Geometry,
    fat: &Fat16,
    entries: &[u8],
    dir: &mut DirNode,
    depth: usize,
) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::InvalidImage("directory nesting too deep".into()));
    }
    for chunk in entries.chunks_exact(32) {
        let entry = RawDirEntry::from_bytes(chunk);
        if entry.is_terminator() {
            break;
        }
        // Deleted entries, dot entries, and volume labels
        if entry.name[0] == 0xE5 || entry.is_dot_entry() {
            continue;
        }
        let attributes = FileAttributes::from_bits_truncate(entry.attributes);
        if attributes.contains(FileAttributes::VOLUME_LABEL) {
            continue;
        }
        let Some(name) = entry.short_name() else {
            log::warn!("skipping unreadable directory entry");
            continue;
        };
        if entry.is_directory() {
            let data = read_chain(region, geometry, fat, entry.cluster(), None)?;
            let mut sub = DirNode {
                name,
                stamp: entry.stamp(),
                children: Vec::new(),
            };
            read_directory(region, geometry, fat, &data, &mut sub, depth + 1)?;
            dir.children.push(Node::Dir(sub));
        } else {
            let data = read_chain(
                region,
                geometry,
                fat,
                entry.cluster(),
                Some(entry.file_size() as usize),
            )?;
            dir.children.push(Node::File(FileNode {
                name,
                data,
                stamp: entry.stamp(),
            }));
        }
    }
    Ok(())
}

/// Follows a cluster chain and collects its bytes, truncated to
/// `size` when given (files) or whole clusters (directories).
fn read_chain(
    region: &[u8],
    geometry: &Fat16Geometry,
    fat: &Fat16,
    start: u16,
    size: Option<usize>,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    if start < 2 {
        // Cluster 0 with size 0 is an empty file
        return Ok(out);
    }
    let bytes_per_cluster = geometry.bytes_per_cluster();
    let mut cluster = start;
    let mut visited = 0u32;
    loop {
        visited += 1;
        if visited > geometry.cluster_count() {
            return Err(Error::InvalidImage("cyclic cluster chain".into()));
        }
        let off = geometry.cluster_offset(cluster);
        if off + bytes_per_cluster > region.len() {
            return Err(Error::InvalidImage(format!(
                "cluster {cluster} outside the partition"
            )));
        }
        out.extend_from_slice(&region[off..off + bytes_per_cluster]);
        let next = fat.next(cluster);
        if Fat16::is_end(next) {
            break;
        }
        if next < 2 {
            return Err(Error::InvalidImage(format!(
                "chain from cluster {start} hits free cluster {next}"
            )));
        }
        cluster = next;
    }
    if let Some(size) = size {
        if size > out.len() {
            return Err(Error::InvalidImage(
                "file size exceeds its cluster chain".into(),
            ));
        }
        out.truncate(size);
    }
    Ok(out)
}
