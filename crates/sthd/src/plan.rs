//! Per-partition FAT16 layout planning.
//!
//! The planner treats the tree as read-only: it picks the cluster
//! size, sizes the FATs and the fixed 512-entry root directory, and
//! assigns every file and subdirectory a run of consecutive clusters
//! in depth-first insertion order.

use std::collections::HashMap;

use crate::structures::Fat16Geometry;
use crate::tree::{DirNode, Node};
use crate::{Error, Result, SECTOR_SIZE};

/// FAT16 cannot address more clusters than this.
pub const MAX_CLUSTERS: u32 = 65_525;

/// A node's cluster run. Empty files get `start` 0 and no clusters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Alloc {
    pub start: u16,
    pub count: u16,
}

/// The planned layout of one partition.
#[derive(Debug)]
pub struct Plan {
    pub geometry: Fat16Geometry,
    /// Cluster runs keyed by full in-partition path
    pub allocs: HashMap<String, Alloc>,
    pub clusters_used: u32,
}

fn clusters_for(bytes: usize, bytes_per_cluster: usize) -> u32 {
    bytes.div_ceil(bytes_per_cluster) as u32
}

/// Computes the layout of `root` on a partition of `capacity_sectors`
/// starting at `start_lba` in the image.
pub fn plan_partition(
    root: &DirNode,
    capacity_sectors: u32,
    start_lba: u32,
    drive: char,
) -> Result<Plan> {
    const RESERVED: u32 = 1;
    const ROOT_ENTRIES: u16 = 512;
    let root_dir_sectors = ROOT_ENTRIES as u32 * 32 / SECTOR_SIZE as u32;

    if capacity_sectors <= RESERVED + root_dir_sectors {
        return Err(Error::PartitionTooSmall {
            drive,
            needed: 1,
            available: 0,
        });
    }
    let data_estimate = capacity_sectors - RESERVED - root_dir_sectors;

    // Smallest power-of-two cluster size that keeps the count
    // addressable; smaller clusters waste less on small partitions
    let mut chosen = None;
    for shift in 0..8 {
        let spc = 1u32 << shift;
        let clusters = data_estimate.div_ceil(spc);
        if clusters <= MAX_CLUSTERS {
            chosen = Some((spc as u8, clusters));
            break;
        }
    }
    let Some((sectors_per_cluster, cluster_estimate)) = chosen else {
        return Err(Error::FatOverflow);
    };

    let sectors_per_fat = ((cluster_estimate + 2) * 2).div_ceil(SECTOR_SIZE as u32) as u16;
    let geometry = Fat16Geometry {
        total_sectors: capacity_sectors,
        sectors_per_cluster,
        reserved_sectors: RESERVED as u16,
        fat_count: 2,
        root_entries: ROOT_ENTRIES,
        sectors_per_fat,
        hidden_sectors: start_lba,
    };
    if geometry.data_start_sector() >= capacity_sectors {
        return Err(Error::PartitionTooSmall {
            drive,
            needed: 1,
            available: 0,
        });
    }

    if root.children.len() > ROOT_ENTRIES as usize {
        return Err(Error::RootDirectoryFull(drive));
    }

    let bytes_per_cluster = geometry.bytes_per_cluster();
    let mut allocs = HashMap::new();
    let mut next = 2u32;
    root.walk(&mut |path, node| {
        let count = match node {
            Node::File(f) => clusters_for(f.data.len(), bytes_per_cluster),
            Node::Dir(d) => clusters_for((d.children.len() + 2) * 32, bytes_per_cluster),
        };
        let alloc = if count == 0 {
            Alloc::default()
        } else {
            let start = next;
            next += count;
            Alloc {
                start: start.min(u16::MAX as u32) as u16,
                count: count.min(u16::MAX as u32) as u16,
            }
        };
        allocs.insert(path.to_string(), alloc);
    });

    let clusters_used = next - 2;
    let available = geometry.cluster_count();
    if clusters_used > available {
        return Err(Error::PartitionTooSmall {
            drive,
            needed: clusters_used,
            available,
        });
    }
    log::debug!(
        "drive {drive}: {clusters_used}/{available} clusters of {bytes_per_cluster} bytes, {sectors_per_fat} sectors per FAT"
    );

    Ok(Plan {
        geometry,
        allocs,
        clusters_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::{ShortName, time::DosDateTime};
    use pretty_assertions::assert_eq;

    fn stamp() -> DosDateTime {
        DosDateTime::pack(1990, 5, 6, 1, 2, 4)
    }

    fn file(root: &mut DirNode, path: &str, len: usize) {
        let name = path.rsplit('\\').next().unwrap();
        root.insert(
            path,
            Node::file(ShortName::parse(name).unwrap(), vec![0xAA; len], stamp()),
        )
        .unwrap();
    }

    #[test]
    fn empty_16m_partition_geometry() {
        let root = DirNode::root();
        let plan = plan_partition(&root, 32768, 1, 'C').unwrap();
        let g = plan.geometry;
        assert_eq!(g.sectors_per_cluster, 1);
        assert_eq!(g.reserved_sectors, 1);
        assert_eq!(g.fat_count, 2);
        assert_eq!(g.root_entries, 512);
        // ceil((ceil(32751 / 1) + 2) * 2 / 512)
        assert_eq!(g.sectors_per_fat, 128);
        assert_eq!(g.data_start_sector(), 1 + 256 + 16);
        assert_eq!(plan.clusters_used, 0);
    }

    #[test]
    fn clusters_are_assigned_depth_first() {
        let mut root = DirNode::root();
        file(&mut root, "GAMES\\FOO\\RUNME.TOS", 1024);
        file(&mut root, "HELLO.TXT", 5);
        let plan = plan_partition(&root, 2048, 1, 'C').unwrap();

        // GAMES, then FOO, then RUNME.TOS (2 clusters), then HELLO.TXT
        assert_eq!(plan.allocs["GAMES"].start, 2);
        assert_eq!(plan.allocs["GAMES\\FOO"].start, 3);
        assert_eq!(plan.allocs["GAMES\\FOO\\RUNME.TOS"].start, 4);
        assert_eq!(plan.allocs["GAMES\\FOO\\RUNME.TOS"].count, 2);
        assert_eq!(plan.allocs["HELLO.TXT"].start, 6);
        assert_eq!(plan.clusters_used, 5);
    }

    #[test]
    fn empty_files_use_no_clusters() {
        let mut root = DirNode::root();
        file(&mut root, "EMPTY.DAT", 0);
        file(&mut root, "REAL.DAT", 1);
        let plan = plan_partition(&root, 2048, 1, 'C').unwrap();
        assert_eq!(plan.allocs["EMPTY.DAT"].start, 0);
        assert_eq!(plan.allocs["EMPTY.DAT"].count, 0);
        assert_eq!(plan.allocs["REAL.DAT"].start, 2);
    }

    #[test]
    fn oversized_content_is_rejected() {
        let mut root = DirNode::root();
        // 1 MiB partition, ~1 MiB payload cannot fit next to the FATs
        file(&mut root, "BIG.DAT", 1024 * 1024);
        let err = plan_partition(&root, 2048, 1, 'C').unwrap_err();
        assert!(matches!(err, Error::PartitionTooSmall { .. }));
    }
}
