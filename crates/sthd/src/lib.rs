//! A library for building bootable Atari ST hard-disk images.
//!
//! An image is assembled entirely in memory: sources (raw files,
//! directory listings, decoded ZIP archives) are imported into a
//! per-partition filesystem tree, the launcher catalogue is generated,
//! and each partition is laid out and serialized as FAT16 with the
//! Atari variations (TOS boot checksum, AHDI root sector). The result
//! is a byte-exact disk image suitable for real hardware.
//!
//! The crate performs no network or archive I/O of its own; callers
//! hand it already-decoded byte blobs plus metadata. The one host-side
//! side effect is the optional bootloader export performed by the
//! installer.

pub mod boot;
pub mod builder;
pub mod catalogue;
pub mod import;
pub mod plan;
pub mod reader;
pub mod serialize;
pub mod structures;
pub mod tree;

pub use builder::{BuildOptions, ImageBuilder, parse_size, parse_size_spec};
pub use import::{Archive, ArchiveEntry, Source};
pub use structures::ShortName;
pub use structures::time::DosDateTime;
pub use tree::{DirNode, FileNode, Node};

/// Errors that can occur while assembling an image.
///
/// Everything here aborts the build; conditions that merely degrade the
/// image (a missing driver file, a missing screenshot) are logged
/// through [`log`] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A path component is not a legal 8.3 short name after
    /// uppercasing
    #[error("not a legal 8.3 name: {0:?}")]
    InvalidPath(String),

    /// A non-terminal path component resolved to a file
    #[error("path component is a file, not a directory: {0}")]
    NotADirectory(String),

    /// A destination names a partition the image does not have
    #[error("drive {0}: does not exist in this image")]
    PartitionOutOfRange(char),

    /// The partition contents do not fit the declared capacity
    #[error("partition {drive}: needs {needed} clusters but only {available} fit")]
    PartitionTooSmall {
        drive: char,
        needed: u32,
        available: u32,
    },

    /// The cluster count exceeds the FAT16 bound even at the largest
    /// cluster size
    #[error("partition exceeds the FAT16 cluster limit")]
    FatOverflow,

    /// More root entries than the fixed 512-slot root directory holds
    #[error("partition {0}: root directory exceeds 512 entries")]
    RootDirectoryFull(char),

    /// No destination path could be derived for an archive
    #[error("archive {0:?}: no program found to derive a target path from")]
    NoProgramPath(String),

    /// Unrecognized configuration command
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// A size specification did not parse or is out of range
    #[error("malformed size: {0:?}")]
    MalformedSize(String),

    /// The input bytes are not a readable AHDI/FAT16 image
    #[error("not a valid hard disk image: {0}")]
    InvalidImage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Bytes per sector. The only sector size AHDI-era Atari hardware and
/// this builder support.
pub const SECTOR_SIZE: usize = 512;

/// Largest partition in sectors (16 MiB).
pub const MAX_PARTITION_SECTORS: u32 = 32_768;

/// Drive letters in partition order.
pub const DRIVES: [char; 4] = ['C', 'D', 'E', 'F'];
