//! Translation of decoded sources into tree insertions.
//!
//! Sources are already fetched and decoded by the caller; this module
//! only decides *where* their contents land in a partition tree. For
//! archives without an explicit destination the target is inferred
//! from the archive contents, mirroring how the launcher expects game
//! directories under `GAMES\`.

use crate::catalogue::MAIN_PROGRAMS;
use crate::structures::{ShortName, time::DosDateTime};
use crate::tree::{DirNode, Node};
use crate::{Error, Result};

/// One file inside a decoded ZIP archive. Paths use `/` as inside the
/// archive; directory entries (trailing `/`) never make it here.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub data: Vec<u8>,
    pub stamp: DosDateTime,
}

/// A decoded ZIP archive with its host-side basename.
#[derive(Debug, Clone)]
pub struct Archive {
    pub name: String,
    pub entries: Vec<ArchiveEntry>,
}

impl Archive {
    /// Case-insensitive entry lookup.
    pub fn entry(&self, path: &str) -> Option<&ArchiveEntry> {
        self.entries
            .iter()
            .find(|e| e.path.eq_ignore_ascii_case(path))
    }
}

/// An external input item, already fetched and decoded.
#[derive(Debug, Clone)]
pub enum Source {
    /// Raw bytes plus their logical (host) basename
    File {
        name: String,
        data: Vec<u8>,
        stamp: DosDateTime,
    },
    /// A directory listing; `children` hold only `File` and `Dir`
    Dir {
        name: String,
        children: Vec<Source>,
        stamp: DosDateTime,
    },
    Archive(Archive),
}

fn join(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('\\');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}\\{name}")
    }
}

/// Imports a source into `root`.
///
/// `dest` is the in-partition destination (no drive letter); `program`
/// is the caller-supplied program name used for archive inference.
pub fn import(
    root: &mut DirNode,
    dest: Option<&str>,
    source: Source,
    program: Option<&str>,
) -> Result<()> {
    match source {
        Source::File { name, data, stamp } => {
            let basename = ShortName::coerce(&name);
            let target = match dest {
                Some(d) if !d.trim_matches('\\').is_empty() => {
                    if d.ends_with('\\') || matches!(root.lookup(d), Some(Node::Dir(_))) {
                        join(d, &basename.to_string())
                    } else {
                        d.to_string()
                    }
                }
                _ => basename.to_string(),
            };
            let components = crate::tree::split_path(&target)?;
            let name = *components
                .last()
                .ok_or_else(|| Error::InvalidPath(target.clone()))?;
            log::debug!("importing file {target} ({} bytes)", data.len());
            root.insert(&target, Node::file(name, data, stamp))
        }
        Source::Dir { name, children, .. } => {
            let prefix = dest.unwrap_or("").trim_matches('\\').to_string();
            log::debug!("importing directory {name} under {prefix:?}");
            insert_children(root, &prefix, children)
        }
        Source::Archive(archive) => {
            let prefix = match dest {
                Some(d) if !d.trim_matches('\\').is_empty() => {
                    d.trim_matches('\\').to_string()
                }
                _ => infer_archive_prefix(&archive, program)?,
            };
            log::debug!("importing archive {} under {prefix}", archive.name);
            for entry in archive.entries {
                if entry.path.ends_with('/') {
                    continue;
                }
                let rewritten: Vec<String> = entry
                    .path
                    .split('/')
                    .filter(|c| !c.is_empty())
                    .map(|c| ShortName::coerce(c).to_string())
                    .collect();
                if rewritten.is_empty() {
                    continue;
                }
                let target = join(&prefix, &rewritten.join("\\"));
                let name = ShortName::parse(rewritten.last().unwrap())?;
                root.insert(&target, Node::file(name, entry.data, entry.stamp))?;
            }
            Ok(())
        }
    }
}

fn insert_children(root: &mut DirNode, prefix: &str, children: Vec<Source>) -> Result<()> {
    for child in children {
        match child {
            Source::File { name, data, stamp } => {
                let name = ShortName::coerce(&name);
                root.insert(&join(prefix, &name.to_string()), Node::file(name, data, stamp))?;
            }
            Source::Dir {
                name,
                children,
                stamp,
            } => {
                let name = ShortName::coerce(&name);
                let path = join(prefix, &name.to_string());
                root.insert(&path, Node::dir(name, stamp))?;
                insert_children(root, &path, children)?;
            }
            Source::Archive(archive) => {
                return Err(Error::NoProgramPath(archive.name));
            }
        }
    }
    Ok(())
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Derives the in-image prefix for an archive without a destination.
///
/// Priority: the caller-supplied program name; a known main executable
/// inside the archive; any `.PRG` inside the archive. Archives where
/// none of these apply cannot be placed.
fn infer_archive_prefix(archive: &Archive, program: Option<&str>) -> Result<String> {
    if let Some(program) = program {
        return Ok(format!("GAMES\\{}", ShortName::coerce(program)));
    }

    if let Some(entry) = archive.entries.iter().find(|e| {
        MAIN_PROGRAMS
            .iter()
            .any(|m| basename(&e.path).eq_ignore_ascii_case(m))
    }) {
        // Archives that already carry their game directory go straight
        // under GAMES\, bare ones get a directory from the archive name
        return if entry.path.contains('/') {
            Ok("GAMES".to_string())
        } else {
            Ok(format!("GAMES\\{}", ShortName::coerce(&archive.name)))
        };
    }

    if let Some(entry) = archive
        .entries
        .iter()
        .find(|e| basename(&e.path).to_ascii_uppercase().ends_with(".PRG"))
    {
        let stem = basename(&entry.path);
        let stem = &stem[..stem.len() - 4];
        return Ok(format!("GAMES\\{}", ShortName::coerce(stem)));
    }

    Err(Error::NoProgramPath(archive.name.clone()))
}
