//! Launcher catalogue generation.
//!
//! After all imports the partitions are scanned for game directories,
//! a `HDMENU.CSV` menu is generated on drive C, matching NEOchrome
//! screenshots are pulled from the screenshot archive, and on request
//! the default `HDMENU.CFG` is inserted.

use crate::builder::ImageBuilder;
use crate::import::ArchiveEntry;
use crate::structures::{ShortName, time::DosDateTime};
use crate::tree::Node;
use crate::{DRIVES, Result};

/// Main executables that mark a directory as a game (the PPera
/// distribution layout).
pub const MAIN_PROGRAMS: [&str; 5] = [
    "RUNME.TOS",
    "RUNFALC.TOS",
    "START.TOS",
    "START2M.TOS",
    "START.PRG",
];

/// A discovered game directory.
#[derive(Debug, Clone)]
pub struct Game {
    pub partition: usize,
    /// Full path of the game directory, no drive letter
    pub dir_path: String,
    pub dir_name: String,
    /// Full path of the executable the menu launches
    pub exec_path: String,
}

/// Walks every partition for game directories.
///
/// A directory `X` containing `X.PRG` is a game (the Klapauzius
/// layout); otherwise a directory containing one of [`MAIN_PROGRAMS`]
/// is. Partition roots themselves are never games.
pub fn discover(builder: &ImageBuilder) -> Vec<Game> {
    let mut games = Vec::new();
    for (partition, part) in builder.partitions().iter().enumerate() {
        part.root.walk(&mut |path, node| {
            let Node::Dir(dir) = node else { return };
            let named_prg = ShortName::parse(&format!("{}.PRG", dir.name)).ok();
            let exec = named_prg
                .and_then(|n| {
                    dir.child(&n)
                        .and_then(Node::as_file)
                        .map(|f| f.name.to_string())
                })
                .or_else(|| {
                    dir.children.iter().find_map(|c| {
                        let f = c.as_file()?;
                        let name = f.name.to_string();
                        MAIN_PROGRAMS.contains(&name.as_str()).then_some(name)
                    })
                });
            if let Some(exec) = exec {
                games.push(Game {
                    partition,
                    dir_path: path.to_string(),
                    dir_name: dir.name.to_string(),
                    exec_path: format!("{path}\\{exec}"),
                });
            }
        });
    }
    games
}

/// Encodes a display string as Latin-1; characters outside the
/// repertoire degrade to `?`.
fn latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
        .collect()
}

fn display_name(builder: &ImageBuilder, game: &Game) -> String {
    let options = builder.options();
    if let Some((_, name)) = options.names.iter().find(|(prefix, _)| {
        game.dir_path.len() >= prefix.len()
            && game.dir_path[..prefix.len()].eq_ignore_ascii_case(prefix)
    }) {
        return name.clone();
    }
    if let Some((_, name)) = options
        .links
        .iter()
        .find(|(dir, _)| dir.eq_ignore_ascii_case(&game.dir_name))
    {
        return name.clone();
    }
    game.dir_name.clone()
}

fn screenshot_for(builder: &ImageBuilder, game: &Game) -> Option<ArchiveEntry> {
    let options = builder.options();
    let archive = options.screenshots.as_ref()?;
    let key = options
        .neopics
        .iter()
        .find(|(dir, _)| dir.eq_ignore_ascii_case(&game.dir_name))
        .map(|(_, pic)| pic.as_str())
        .unwrap_or(&game.dir_name);
    let direct = format!("{key}/{key}.NEO");
    let by_letter = format!(
        "{}/{key}/{key}.NEO",
        key.chars().next().unwrap_or('_')
    );
    archive
        .entry(&direct)
        .or_else(|| archive.entry(&by_letter))
        .cloned()
}

/// Generates `C:\HDMENU.CSV` and attaches screenshots.
pub fn generate(builder: &mut ImageBuilder) -> Result<()> {
    let games = discover(builder);
    log::info!("discovered {} game(s)", games.len());

    let mut lines: Vec<(String, String)> = games
        .iter()
        .map(|game| {
            let display = display_name(builder, game);
            let target = format!("{}:\\{}", DRIVES[game.partition], game.exec_path);
            (display, target)
        })
        .collect();
    lines.sort_by_key(|(display, _)| display.to_lowercase());

    let mut csv = Vec::new();
    for (display, target) in &lines {
        csv.extend_from_slice(&latin1(display));
        csv.push(b';');
        csv.extend_from_slice(&latin1(target));
        csv.extend_from_slice(b"\r\n");
    }

    // Resolve screenshots before mutating any tree
    let mut shots = Vec::new();
    for game in &games {
        match screenshot_for(builder, game) {
            Some(entry) => shots.push((game.clone(), entry)),
            None => {
                if builder.options().screenshots.is_some() {
                    log::warn!("no screenshot for {}", game.dir_name);
                }
            }
        }
    }

    builder.insert_file(0, "HDMENU.CSV", csv, DosDateTime::now())?;
    for (game, entry) in shots {
        let path = format!("GAMES\\{0}\\{0}.NEO", game.dir_name);
        builder.insert_file(game.partition, &path, entry.data, entry.stamp)?;
    }
    Ok(())
}

/// Length of the launcher configuration blob.
pub const MENU_CONFIG_LEN: usize = 168;

/// Settings block behind the name tables, one byte per setting.
const MENU_POST_SETTINGS: [(usize, u8); 9] = [
    (109, 1),
    (110, 0),
    (111, 0),
    (112, 2),
    (113, 0),
    (114, 0),
    (115, 0),
    (116, 0),
    (117, 1),
];

/// The default `HDMENU.CFG` contents.
pub fn default_menu_config() -> [u8; MENU_CONFIG_LEN] {
    let mut cfg = [0u8; MENU_CONFIG_LEN];
    cfg[0..4].copy_from_slice(&3u32.to_be_bytes());
    // save-on-exit, sync, bootkey-to-desktop, boot-timeout, keyclick,
    // bootkey-scancode, copyright-timeout, restore-resolution
    cfg[4..12].copy_from_slice(&[0, 0, 1, 0, 0, 0, 2, 0]);
    // screensaver timer, off
    cfg[12..16].copy_from_slice(&0u32.to_be_bytes());
    // SNDH background tune filename, blank
    cfg[16..30].fill(b' ');
    for (offset, value) in MENU_POST_SETTINGS {
        cfg[offset] = value;
    }
    cfg
}

/// Inserts the default launcher configuration at `C:\HDMENU.CFG`.
pub fn insert_default_config(builder: &mut ImageBuilder) -> Result<()> {
    builder.insert_file(
        0,
        "HDMENU.CFG",
        default_menu_config().to_vec(),
        DosDateTime::now(),
    )
}
