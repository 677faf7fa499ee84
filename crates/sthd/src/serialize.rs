//! Emission of one planned partition as raw FAT16 bytes.
//!
//! Order inside the partition: boot sector, FAT #1, FAT #2 (byte
//! identical), the fixed root directory, then subdirectory clusters
//! and file payloads at their assigned clusters. Every sector is
//! written exactly once into a zeroed buffer.

use crate::plan::{Alloc, Plan};
use crate::structures::boot_sector::BootSector;
use crate::structures::directory::RawDirEntry;
use crate::structures::fat::Fat16;
use crate::tree::{DirNode, Node};
use crate::SECTOR_SIZE;

/// Serializes a partition. `loader` is the bootsector machine code to
/// install (drive C with a driver present); its presence also decides
/// whether the TOS balancing word is written.
pub fn serialize_partition(root: &DirNode, plan: &Plan, loader: Option<&[u8]>, volume_seed: u32) -> Vec<u8> {
    let g = &plan.geometry;
    let mut buf = vec![0u8; g.total_sectors as usize * SECTOR_SIZE];

    let volume_id = BootSector::current_volume_id(volume_seed);
    BootSector::new(*g, volume_id).write(&mut buf[..SECTOR_SIZE]);
    if let Some(code) = loader {
        BootSector::install_loader(&mut buf[..SECTOR_SIZE], code);
    }

    let mut fat = Fat16::new(g.cluster_count());
    for alloc in plan.allocs.values() {
        if alloc.count > 0 {
            fat.chain(alloc.start, alloc.count);
        }
    }
    let fat_bytes = fat.to_bytes(g.sectors_per_fat);
    let fat_len = fat_bytes.len();
    let fat1 = g.reserved_sectors as usize * SECTOR_SIZE;
    buf[fat1..fat1 + fat_len].copy_from_slice(&fat_bytes);
    buf[fat1 + fat_len..fat1 + 2 * fat_len].copy_from_slice(&fat_bytes);

    let root_off = g.root_dir_sector() as usize * SECTOR_SIZE;
    for (i, child) in root.children.iter().enumerate() {
        let alloc = plan.allocs[&child.name().to_string()];
        let entry = entry_for(child, alloc);
        let off = root_off + i * 32;
        buf[off..off + 32].copy_from_slice(bytemuck::bytes_of(&entry));
    }

    root.walk(&mut |path, node| match node {
        Node::Dir(dir) => {
            let alloc = plan.allocs[path];
            let parent_cluster = match path.rsplit_once('\\') {
                Some((parent, _)) => plan.allocs[parent].start,
                None => 0,
            };
            let off = g.cluster_offset(alloc.start);
            let mut entries = Vec::with_capacity(dir.children.len() + 2);
            entries.push(RawDirEntry::dot(dir.stamp, alloc.start));
            entries.push(RawDirEntry::dot_dot(dir.stamp, parent_cluster));
            for child in &dir.children {
                let child_alloc = plan.allocs[&format!("{path}\\{}", child.name())];
                entries.push(entry_for(child, child_alloc));
            }
            for (i, entry) in entries.iter().enumerate() {
                buf[off + i * 32..off + i * 32 + 32].copy_from_slice(bytemuck::bytes_of(entry));
            }
        }
        Node::File(file) => {
            if !file.data.is_empty() {
                let off = g.cluster_offset(plan.allocs[path].start);
                buf[off..off + file.data.len()].copy_from_slice(&file.data);
            }
        }
    });

    buf
}

fn entry_for(node: &Node, alloc: Alloc) -> RawDirEntry {
    match node {
        Node::File(f) => RawDirEntry::file(&f.name, f.stamp, alloc.start, f.data.len() as u32),
        Node::Dir(d) => RawDirEntry::directory(&d.name, d.stamp, alloc.start),
    }
}
