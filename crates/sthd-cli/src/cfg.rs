//! The line-oriented build configuration grammar.
//!
//! ```text
//! # comment
//! img hdd16m.img;16M
//! file ICDBOOT.SYS;./ICDBOOT.SYS
//! game http://example.com/Bubble_Ghost.zip;Bubble Ghost;BUBLGOST
//! link XENON2;Xenon 2
//! cfg
//! partition
//! end
//! ```
//!
//! Arguments are `;` separated; unknown commands abort the parse.

use sthd::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Appends a partition and (re)sets the output image name
    Img { name: String, size: u64 },
    /// Copies a source into the image at `dest`
    File { dest: String, src: String },
    /// Imports a game archive with optional display name and
    /// screenshot key
    Game {
        src: String,
        name: Option<String>,
        neopic: Option<String>,
    },
    /// Maps a game directory name to a display name
    Link { dir: String, display: String },
    /// Advances the destination partition
    Partition,
    /// Requests the default launcher configuration
    Cfg,
    End,
}

pub fn parse(text: &str) -> Result<Vec<Command>, Error> {
    let mut commands = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let fields: Vec<&str> = match rest.trim() {
            "" => Vec::new(),
            rest => rest.split(';').map(str::trim).collect(),
        };
        let unknown = || Error::UnknownCommand(format!("line {}: {line}", index + 1));
        let command = match keyword {
            "img" => {
                let [name, size] = fields[..] else {
                    return Err(unknown());
                };
                Command::Img {
                    name: name.to_string(),
                    size: sthd::parse_size(size)?,
                }
            }
            "file" => {
                let [dest, src] = fields[..] else {
                    return Err(unknown());
                };
                Command::File {
                    dest: dest.to_string(),
                    src: src.to_string(),
                }
            }
            "game" => match fields[..] {
                [src] => Command::Game {
                    src: src.to_string(),
                    name: None,
                    neopic: None,
                },
                [src, name] => Command::Game {
                    src: src.to_string(),
                    name: Some(name.to_string()),
                    neopic: None,
                },
                [src, name, neopic] => Command::Game {
                    src: src.to_string(),
                    name: Some(name.to_string()),
                    neopic: Some(neopic.to_string()),
                },
                _ => return Err(unknown()),
            },
            "link" => {
                let [dir, display] = fields[..] else {
                    return Err(unknown());
                };
                Command::Link {
                    dir: dir.to_string(),
                    display: display.to_string(),
                }
            }
            "partition" if fields.is_empty() => Command::Partition,
            "cfg" if fields.is_empty() => Command::Cfg,
            "end" => Command::End,
            _ => return Err(unknown()),
        };
        let done = command == Command::End;
        commands.push(command);
        if done {
            break;
        }
    }
    Ok(commands)
}
