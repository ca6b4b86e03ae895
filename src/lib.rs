//! # fat12
//!
//! Read-only access to FAT12-formatted volumes stored on a block device
//! with 512-byte blocks, such as a floppy image kept in a file or in
//! memory.
//!
//! The entry point is [`volume_mgr::VolumeManager`], which owns the block
//! device and tracks every open volume, directory and file in
//! fixed-capacity tables. Handles returned by the manager are small opaque
//! IDs; convenience wrappers ([`volume_mgr::Volume`],
//! [`filesystem::directory::Directory`], [`filesystem::files::File`])
//! borrow the manager and close themselves on drop.
//!
//! ```rust,ignore
//! let mut volume_mgr = VolumeManager::new(block_device);
//! let volume = volume_mgr.open_raw_volume(BlockIdx(0))?;
//! let file = volume_mgr.open_file_by_name(volume, "HELLO.TXT")?;
//! let mut buffer = [0u8; 64];
//! let count = volume_mgr.read(file, &mut buffer)?;
//! volume_mgr.close_file(file)?;
//! volume_mgr.close_volume(volume)?;
//! ```
//!
//! The File Allocation Table is read from disk once per volume, the first
//! time a cluster chain is needed, and cached until the volume is closed.
//! Every method takes `&mut self`, so the lazy load cannot race within one
//! manager. If a manager is shared across threads behind a lock, the first
//! file open populates the cache and must be serialized by that lock like
//! any other call.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[cfg(all(feature = "defmt-log", feature = "log"))]
compile_error!("Enable at most one of the `defmt-log` and `log` features");

#[cfg(feature = "defmt-log")]
macro_rules! debug {
    ($($arg:tt)+) => (defmt::debug!($($arg)+));
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($arg:tt)+) => (log::debug!($($arg)+));
}

#[cfg(not(any(feature = "defmt-log", feature = "log")))]
macro_rules! debug {
    ($($arg:tt)+) => {};
}

pub mod blockdevice;
pub mod fat;
pub mod filesystem;
pub mod volume_mgr;

pub use crate::blockdevice::{Block, BlockCount, BlockDevice, BlockIdx};

use crate::filesystem::filename::FilenameError;

/// Every block is this many bytes.
pub const BLOCK_LEN: u32 = 512;

/// The errors this crate can return.
///
/// Generic over `E`, the error type of the underlying block device.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError<E>
where
    E: core::fmt::Debug,
{
    /// The underlying block device reported an error.
    DeviceError(E),
    /// The boot sector is not a valid FAT12 boot sector. The string names
    /// the check that failed.
    FormatError(&'static str),
    /// A caller-supplied value made no sense. The string names the
    /// offending argument.
    InvalidArgument(&'static str),
    /// The given filename was not found in the root directory.
    NotFound,
    /// The root directory region does not describe a directory.
    NotADirectory,
    /// The name matched a directory or the volume label, which cannot be
    /// opened as a file.
    OpenedDirAsFile,
    /// A seek or read left the valid range `0..=file size`.
    InvalidOffset,
    /// A cluster chain referenced a cluster the FAT cannot hold.
    BadCluster,
    /// Growing the cluster-chain buffer failed.
    AllocationError,
    /// The given filename could not be converted to 8.3 form.
    FilenameError(FilenameError),
    /// The handle does not refer to anything currently open.
    BadHandle,
    /// All volume slots are occupied.
    TooManyOpenVolumes,
    /// All directory slots are occupied.
    TooManyOpenDirs,
    /// All file slots are occupied.
    TooManyOpenFiles,
    /// That volume is already open.
    VolumeAlreadyOpen,
    /// The volume still has open files or directories.
    VolumeStillInUse,
    /// That file is already open.
    FileAlreadyOpen,
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
