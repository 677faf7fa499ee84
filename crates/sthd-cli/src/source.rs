//! Loading of build sources from the host side.
//!
//! Local files, directory trees, ZIP archives and HTTP(S) URLs are all
//! decoded here into the core [`Source`] model; the image builder
//! itself never touches the network or an archive.

use std::io::{Cursor, Read};
use std::path::Path;

use anyhow::Context;
use sthd::{Archive, ArchiveEntry, DosDateTime, Source};

/// Loads a source specification: an URL, a ZIP file, a directory, or
/// a plain file.
pub fn load(spec: &str) -> anyhow::Result<Source> {
    if spec.starts_with("http://") || spec.starts_with("https://") {
        let (name, data) = fetch(spec)?;
        if name.to_ascii_lowercase().ends_with(".zip") {
            return Ok(Source::Archive(decode_zip(stem(&name), data)?));
        }
        return Ok(Source::File {
            name,
            data,
            stamp: DosDateTime::now(),
        });
    }

    let path = Path::new(spec);
    let meta = std::fs::metadata(path).with_context(|| format!("cannot read {spec}"))?;
    if meta.is_dir() {
        return load_dir(path);
    }
    let name = basename(path);
    if name.to_ascii_lowercase().ends_with(".zip") {
        let data = std::fs::read(path)?;
        return Ok(Source::Archive(decode_zip(stem(&name), data)?));
    }
    Ok(Source::File {
        name,
        data: std::fs::read(path)?,
        stamp: mtime(&meta),
    })
}

/// Loads a ZIP file or URL as an archive listing (the screenshot
/// collection).
pub fn load_archive(spec: &str) -> anyhow::Result<Archive> {
    match load(spec)? {
        Source::Archive(archive) => Ok(archive),
        _ => anyhow::bail!("{spec} is not a ZIP archive"),
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string())
}

fn stem(name: &str) -> &str {
    name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name)
}

fn mtime(meta: &std::fs::Metadata) -> DosDateTime {
    meta.modified()
        .map(|t| DosDateTime::from_datetime(&chrono::DateTime::<chrono::Local>::from(t)))
        .unwrap_or_else(|_| DosDateTime::now())
}

fn load_dir(path: &Path) -> anyhow::Result<Source> {
    let mut entries: Vec<_> = std::fs::read_dir(path)
        .with_context(|| format!("cannot list {}", path.display()))?
        .collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut children = Vec::new();
    for entry in entries {
        let child_path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            children.push(load_dir(&child_path)?);
        } else {
            children.push(Source::File {
                name: basename(&child_path),
                data: std::fs::read(&child_path)?,
                stamp: mtime(&meta),
            });
        }
    }
    Ok(Source::Dir {
        name: basename(path),
        children,
        stamp: mtime(&std::fs::metadata(path)?),
    })
}

fn decode_zip(name: &str, bytes: Vec<u8>) -> anyhow::Result<Archive> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .with_context(|| format!("{name}: not a readable ZIP archive"))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        let stamp = file
            .last_modified()
            .map(|dt| DosDateTime::new(dt.datepart(), dt.timepart()))
            .unwrap_or_else(DosDateTime::now);
        entries.push(ArchiveEntry {
            path: file.name().to_string(),
            data,
            stamp,
        });
    }
    log::debug!("{name}: {} archive entries", entries.len());
    Ok(Archive {
        name: name.to_string(),
        entries,
    })
}

fn fetch(url: &str) -> anyhow::Result<(String, Vec<u8>)> {
    log::info!("fetching {url}");
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("download of {url} failed"))?;
    let mut data = Vec::new();
    response.into_reader().read_to_end(&mut data)?;
    let name = url
        .rsplit('/')
        .next()
        .and_then(|n| n.split('?').next())
        .filter(|n| !n.is_empty())
        .unwrap_or("download")
        .to_string();
    Ok((name, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn directories_load_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("auto")).unwrap();
        std::fs::write(dir.path().join("auto/driver.prg"), b"prg").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"hi").unwrap();

        let Source::Dir { children, .. } = load(dir.path().to_str().unwrap()).unwrap() else {
            panic!("expected a directory source");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[0], Source::Dir { name, .. } if name == "auto"));
        assert!(matches!(&children[1], Source::File { name, .. } if name == "readme.txt"));
    }

    #[test]
    fn zip_files_become_archives() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("game.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("FOO/RUNME.TOS", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"\x60\x1A").unwrap();
        writer.finish().unwrap();

        let archive = load_archive(zip_path.to_str().unwrap()).unwrap();
        assert_eq!(archive.name, "game");
        assert_eq!(archive.entries.len(), 1);
        assert_eq!(archive.entries[0].path, "FOO/RUNME.TOS");
        assert_eq!(archive.entries[0].data, b"\x60\x1A");
    }
}
