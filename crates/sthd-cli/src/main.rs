//! mkhdmenu - build an Atari ST (gaming) hard-disk image.
//!
//! Either drive the build from a configuration file:
//! `mkhdmenu klapauzius.cfg`
//! or from the command line:
//! `mkhdmenu 16M "C:\=./ICDBOOT.SYS" "C:\GAMES\BUBLGOST=zips/Bubble_Ghost.zip" hdd16m.img`
//!
//! Bootloaders for AHDI and ICD are installed in the MBR and the boot
//! sector of partition C when a file named SHDRIVER.SYS (AHDI) or
//! ICDBOOT.SYS (ICD) ends up in the root of partition C. This also
//! works for hddriver and CBHD when renamed to SHDRIVER.SYS.

mod cfg;
mod source;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use sthd::{DRIVES, ImageBuilder, ShortName};

#[derive(Debug, Parser)]
#[command(name = "mkhdmenu", version, about)]
struct Args {
    /// Export the installed bootloaders to <NAME>_mbr.bin and
    /// <NAME>_bootsector.bin
    #[arg(long = "export-bootloader", value_name = "NAME")]
    export_bootloader: Option<PathBuf>,

    /// Print less output
    #[arg(long, short)]
    quiet: bool,

    /// ZIP archive with <GAME>.NEO screenshots for the launcher
    #[arg(long, value_name = "ZIP")]
    screenshots: Option<String>,

    /// Either a single .cfg file, or:
    /// <sizes|image> [DEST=SRC ...] <output>
    #[arg(required = true, verbatim_doc_comment)]
    args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(if args.quiet {
            log::LevelFilter::Warn
        } else {
            log::LevelFilter::Info
        })
        .init()?;

    if args.args.len() == 1 && args.args[0].to_ascii_lowercase().ends_with(".cfg") {
        run_config(&args)
    } else {
        run_commands(&args)
    }
}

fn apply_options(builder: &mut ImageBuilder, args: &Args) -> anyhow::Result<()> {
    builder.options_mut().export_bootloader = args.export_bootloader.clone();
    if let Some(spec) = &args.screenshots {
        builder.options_mut().screenshots = Some(source::load_archive(spec)?);
    }
    Ok(())
}

/// Splits `C:\GAMES\FOO` into the partition index and the in-image
/// path.
fn parse_dest(dest: &str) -> anyhow::Result<(usize, &str)> {
    let bytes = dest.as_bytes();
    if bytes.len() < 3 || bytes[1] != b':' || bytes[2] != b'\\' {
        bail!("destination {dest:?} must start with C:\\ .. F:\\");
    }
    let letter = bytes[0].to_ascii_uppercase() as char;
    let drive = DRIVES
        .iter()
        .position(|d| *d == letter)
        .with_context(|| format!("destination {dest:?} must start with C:\\ .. F:\\"))?;
    Ok((drive, &dest[3..]))
}

fn run_commands(args: &Args) -> anyhow::Result<()> {
    let [base, commands @ .., output] = &args.args[..] else {
        bail!("expected <sizes|image> [DEST=SRC ...] <output>");
    };

    let mut builder = match sthd::parse_size_spec(base) {
        Ok(sizes) => ImageBuilder::new(&sizes)?,
        Err(_) if std::path::Path::new(base).is_file() => {
            log::info!("starting from existing image {base}");
            sthd::reader::read_image(&std::fs::read(base)?)?
        }
        Err(err) => return Err(err.into()),
    };
    apply_options(&mut builder, args)?;

    for command in commands {
        let Some((dest, src)) = command.split_once('=') else {
            bail!("expected DEST=SRC, got {command:?}");
        };
        let (drive, path) = parse_dest(dest)?;
        let source = source::load(src)?;
        builder.import(drive, Some(path), source, None)?;
    }

    finish(builder, output)
}

fn run_config(args: &Args) -> anyhow::Result<()> {
    let path = &args.args[0];
    let text =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {path}"))?;
    let commands = cfg::parse(&text)?;

    let mut output = None;
    let mut sizes = Vec::new();
    for command in &commands {
        if let cfg::Command::Img { name, size } = command {
            output = Some(name.clone());
            sizes.push(*size);
        }
    }
    let Some(output) = output else {
        bail!("{path}: no img command");
    };

    let mut builder = ImageBuilder::new(&sizes)?;
    apply_options(&mut builder, args)?;

    let mut current = 0usize;
    let mut menu = false;
    for command in commands {
        match command {
            cfg::Command::Img { .. } => {}
            cfg::Command::Partition => {
                current += 1;
                if current >= builder.partition_count() {
                    return Err(sthd::Error::PartitionOutOfRange(
                        *DRIVES.get(current).unwrap_or(&'?'),
                    )
                    .into());
                }
            }
            cfg::Command::File { dest, src } => {
                let source = source::load(&src)?;
                // The destination may carry its own drive letter
                let (drive, path) = if let Ok((drive, path)) = parse_dest(&dest) {
                    (drive, path.to_string())
                } else {
                    (current, dest.clone())
                };
                builder.import(drive, Some(&path), source, None)?;
            }
            cfg::Command::Game { src, name, neopic } => {
                let source = source::load(&src)?;
                if let Some(display) = &name {
                    let dir = ShortName::coerce(display).to_string();
                    let options = builder.options_mut();
                    options
                        .names
                        .push((format!("GAMES\\{dir}"), display.clone()));
                    if let Some(neopic) = &neopic {
                        options.neopics.push((dir, neopic.clone()));
                    }
                }
                builder.import(current, None, source, name.as_deref())?;
                menu = true;
            }
            cfg::Command::Link { dir, display } => {
                builder.options_mut().links.push((dir, display));
            }
            cfg::Command::Cfg => {
                sthd::catalogue::insert_default_config(&mut builder)?;
                menu = true;
            }
            cfg::Command::End => break,
        }
    }
    builder.options_mut().generate_menu = menu;

    finish(builder, &output)
}

fn finish(mut builder: ImageBuilder, output: &str) -> anyhow::Result<()> {
    let image = builder.build()?;
    std::fs::write(output, &image).with_context(|| format!("cannot write {output}"))?;

    let (mut files, mut dirs, mut bytes) = (0, 0, 0);
    for (index, partition) in builder.partitions().iter().enumerate() {
        let (f, d, b) = partition.root.statistics();
        log::info!(
            "drive {}: {f} files, {} directories, {b} data bytes",
            DRIVES[index],
            d + 1
        );
        files += f;
        dirs += d + 1;
        bytes += b;
    }
    log::info!("{output}: {files} files, {dirs} directories, {bytes} data bytes");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destinations_resolve_to_partitions() {
        assert_eq!(parse_dest("C:\\GAMES\\FOO").unwrap(), (0, "GAMES\\FOO"));
        assert_eq!(parse_dest("d:\\AUTO").unwrap(), (1, "AUTO"));
        assert_eq!(parse_dest("F:\\").unwrap(), (3, ""));
        assert!(parse_dest("G:\\X").is_err());
        assert!(parse_dest("GAMES").is_err());
    }
}
