//! File handles and their read/seek state.

use crate::{
    blockdevice::BlockDevice,
    filesystem::{cluster::ClusterChain, directory::DirEntry, search_id::SearchId},
    volume_mgr::{RawVolume, VolumeManager},
    DeviceError,
};

/// A handle for an open file.
///
/// Holds no reference to the [`VolumeManager`], so the manager cannot tell
/// when you lose one; pass it to [`VolumeManager::close_file`] when done,
/// or use the [`File`] wrapper which does that on drop.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RawFile(pub(crate) SearchId);

impl RawFile {
    /// Convert a raw handle into a droppable [`File`].
    pub fn to_file<D, const MAX_DIRS: usize, const MAX_FILES: usize, const MAX_VOLUMES: usize>(
        self,
        volume_mgr: &mut VolumeManager<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>,
    ) -> File<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>
    where
        D: BlockDevice,
    {
        File::new(self, volume_mgr)
    }
}

/// An open file that borrows its [`VolumeManager`].
///
/// Dropping one closes it, discarding any error; call [`File::close`] to
/// observe the error instead.
pub struct File<'a, D, const MAX_DIRS: usize, const MAX_FILES: usize, const MAX_VOLUMES: usize>
where
    D: BlockDevice,
{
    raw_file: RawFile,
    volume_mgr: &'a mut VolumeManager<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>,
}

impl<'a, D, const MAX_DIRS: usize, const MAX_FILES: usize, const MAX_VOLUMES: usize>
    File<'a, D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>
where
    D: BlockDevice,
{
    /// Create a new `File` from a `RawFile`.
    pub fn new(
        raw_file: RawFile,
        volume_mgr: &'a mut VolumeManager<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>,
    ) -> File<'a, D, MAX_DIRS, MAX_FILES, MAX_VOLUMES> {
        File {
            raw_file,
            volume_mgr,
        }
    }

    /// Read bytes from the file into `buffer`, advancing the position.
    /// Returns how many bytes were read; 0 at end of file.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize, DeviceError<D::E>> {
        self.volume_mgr.read(self.raw_file, buffer)
    }

    /// Read whole elements of `element_size` bytes. Returns how many
    /// elements were read; an element that would cross the end of the
    /// file is not read at all.
    pub fn read_elements(
        &mut self,
        buffer: &mut [u8],
        element_size: usize,
    ) -> Result<usize, DeviceError<D::E>> {
        self.volume_mgr
            .read_elements(self.raw_file, buffer, element_size)
    }

    /// Move the position to `offset` bytes from the start of the file.
    pub fn seek_from_start(&mut self, offset: u32) -> Result<u32, DeviceError<D::E>> {
        self.volume_mgr.file_seek_from_start(self.raw_file, offset)
    }

    /// Move the position to `offset` bytes before the end of the file.
    pub fn seek_from_end(&mut self, offset: u32) -> Result<u32, DeviceError<D::E>> {
        self.volume_mgr.file_seek_from_end(self.raw_file, offset)
    }

    /// Move the position by `offset` bytes relative to where it is now.
    pub fn seek_from_current(&mut self, offset: i32) -> Result<u32, DeviceError<D::E>> {
        self.volume_mgr
            .file_seek_from_current(self.raw_file, offset)
    }

    /// The size of the file in bytes.
    pub fn length(&self) -> u32 {
        self.volume_mgr.file_length(self.raw_file).unwrap_or(0)
    }

    /// The current position within the file.
    pub fn offset(&self) -> u32 {
        self.volume_mgr.file_offset(self.raw_file).unwrap_or(0)
    }

    /// Whether the position is at the end of the file.
    pub fn is_eof(&self) -> bool {
        self.volume_mgr.file_eof(self.raw_file).unwrap_or(true)
    }

    /// Convert back to a raw handle, giving up the auto-close.
    pub fn to_raw_file(self) -> RawFile {
        let f = self.raw_file;
        core::mem::forget(self);
        f
    }

    /// Consume the handle and close it, reporting any error, unlike a
    /// plain drop.
    pub fn close(self) -> Result<(), DeviceError<D::E>> {
        let result = self.volume_mgr.close_file(self.raw_file);
        core::mem::forget(self);
        result
    }
}

impl<'a, D, const MAX_DIRS: usize, const MAX_FILES: usize, const MAX_VOLUMES: usize> Drop
    for File<'a, D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>
where
    D: BlockDevice,
{
    fn drop(&mut self) {
        _ = self.volume_mgr.close_file(self.raw_file)
    }
}

/// Internal state for an open file: its directory entry, the cluster
/// chain decoded at open time, and the read position.
#[derive(Debug, Clone)]
pub(crate) struct FileInfo {
    /// Unique ID for this file handle.
    pub(crate) file_id: RawFile,
    /// The volume this file lives on.
    pub(crate) volume_id: RawVolume,
    /// The directory entry the file was opened from.
    pub(crate) entry: DirEntry,
    /// The file's clusters, in order. Built once at open.
    pub(crate) chain: ClusterChain,
    /// Current read position. Always within `0..=entry.size`.
    pub(crate) current_offset: u32,
}

impl FileInfo {
    /// Whether the position is at the end of the file.
    pub fn eof(&self) -> bool {
        self.current_offset >= self.entry.size
    }

    /// The size of the file in bytes.
    pub fn length(&self) -> u32 {
        self.entry.size
    }

    /// How many bytes remain between the position and the end.
    pub fn left(&self) -> u32 {
        self.entry.size.saturating_sub(self.current_offset)
    }

    /// Set the position from the start of the file. Fails, changing
    /// nothing, if the target is past the end.
    pub fn seek_from_start(&mut self, offset: u32) -> Result<u32, ()> {
        if offset > self.entry.size {
            return Err(());
        }
        self.current_offset = offset;
        Ok(self.current_offset)
    }

    /// Set the position counting back from the end of the file. Fails,
    /// changing nothing, if the target would land before the start.
    pub fn seek_from_end(&mut self, offset: u32) -> Result<u32, ()> {
        match self.entry.size.checked_sub(offset) {
            Some(target) => {
                self.current_offset = target;
                Ok(self.current_offset)
            }
            None => Err(()),
        }
    }

    /// Move the position by a signed amount. Fails, changing nothing, if
    /// the target leaves `0..=size`.
    pub fn seek_from_current(&mut self, offset: i32) -> Result<u32, ()> {
        let target = i64::from(self.current_offset) + i64::from(offset);
        if target < 0 || target > i64::from(self.entry.size) {
            return Err(());
        }
        self.current_offset = target as u32;
        Ok(self.current_offset)
    }
}

// ****************************************************************************
//
// Unit Tests
//
// ****************************************************************************


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
