//! The Volume Manager implementation.
//!
//! The volume manager handles open volumes, directory scans and files on
//! a block device. It is the owner of everything: the device itself, the
//! per-volume FAT cache, and the state of every handle it has given out.

use heapless::Vec;

use crate::{
    blockdevice::{Block, BlockCount, BlockDevice, BlockIdx},
    fat::volume::{next_root_entry, parse_volume, FatVolume},
    filesystem::{
        attributes::Attributes,
        cluster::ClusterChain,
        directory::{DirEntry, Directory, DirectoryInfo, RawDirectory},
        filename::ToShortFileName,
        files::{File, FileInfo, RawFile},
        search_id::{SearchId, SearchIdGenerator},
    },
    DeviceError, BLOCK_LEN,
};

/// A handle for an open volume.
///
/// Holds no reference to the [`VolumeManager`]; pass it to
/// [`VolumeManager::close_volume`] when done, or use the [`Volume`]
/// wrapper which does that on drop.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RawVolume(pub(crate) SearchId);

impl RawVolume {
    /// Convert a raw handle into a droppable [`Volume`].
    pub fn to_volume<
        D,
        const MAX_DIRS: usize,
        const MAX_FILES: usize,
        const MAX_VOLUMES: usize,
    >(
        self,
        volume_mgr: &mut VolumeManager<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>,
    ) -> Volume<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>
    where
        D: BlockDevice,
    {
        Volume::new(self, volume_mgr)
    }
}

/// An open volume that borrows its [`VolumeManager`].
///
/// Dropping one closes it, discarding any error; call [`Volume::close`]
/// to observe the error instead. Closing fails while files or directories
/// on the volume remain open.
pub struct Volume<'a, D, const MAX_DIRS: usize, const MAX_FILES: usize, const MAX_VOLUMES: usize>
where
    D: BlockDevice,
{
    raw_volume: RawVolume,
    volume_mgr: &'a mut VolumeManager<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>,
}

impl<'a, D, const MAX_DIRS: usize, const MAX_FILES: usize, const MAX_VOLUMES: usize>
    Volume<'a, D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>
where
    D: BlockDevice,
{
    /// Create a new `Volume` from a `RawVolume`.
    pub fn new(
        raw_volume: RawVolume,
        volume_mgr: &'a mut VolumeManager<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>,
    ) -> Volume<'a, D, MAX_DIRS, MAX_FILES, MAX_VOLUMES> {
        Volume {
            raw_volume,
            volume_mgr,
        }
    }

    /// Open the volume's root directory for scanning.
    pub fn open_root_dir(
        &mut self,
    ) -> Result<Directory<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>, DeviceError<D::E>> {
        let d = self.volume_mgr.open_root_dir(self.raw_volume)?;
        Ok(d.to_directory(self.volume_mgr))
    }

    /// Open a file in the root directory by name.
    pub fn open_file_by_name<N>(
        &mut self,
        name: N,
    ) -> Result<File<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>, DeviceError<D::E>>
    where
        N: ToShortFileName,
    {
        let f = self.volume_mgr.open_file_by_name(self.raw_volume, name)?;
        Ok(f.to_file(self.volume_mgr))
    }

    /// Convert back to a raw handle, giving up the auto-close.
    pub fn to_raw_volume(self) -> RawVolume {
        let v = self.raw_volume;
        core::mem::forget(self);
        v
    }

    /// Consume the handle and close it, reporting any error, unlike a
    /// plain drop.
    pub fn close(self) -> Result<(), DeviceError<D::E>> {
        let result = self.volume_mgr.close_volume(self.raw_volume);
        core::mem::forget(self);
        result
    }
}

impl<'a, D, const MAX_DIRS: usize, const MAX_FILES: usize, const MAX_VOLUMES: usize> Drop
    for Volume<'a, D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>
where
    D: BlockDevice,
{
    fn drop(&mut self) {
        _ = self.volume_mgr.close_volume(self.raw_volume)
    }
}

/// Internal information about an open volume.
#[derive(Debug, PartialEq)]
pub(crate) struct VolumeInfo {
    /// Unique ID for this volume handle.
    volume_id: RawVolume,
    /// The parsed geometry and FAT cache.
    volume: FatVolume,
}

/// A `VolumeManager` wraps a block device and gives read-only access to
/// the FAT12 volumes within it.
///
/// The const generics bound how many directories, files and volumes can
/// be open at once; the tables live inline, so there is no per-open
/// allocation beyond each file's cluster chain.
pub struct VolumeManager<
    D,
    const MAX_DIRS: usize = 4,
    const MAX_FILES: usize = 4,
    const MAX_VOLUMES: usize = 1,
> where
    D: BlockDevice,
{
    block_device: D,
    id_generator: SearchIdGenerator,
    open_volumes: Vec<VolumeInfo, MAX_VOLUMES>,
    open_dirs: Vec<DirectoryInfo, MAX_DIRS>,
    open_files: Vec<FileInfo, MAX_FILES>,
}

impl<D> VolumeManager<D, 4, 4, 1>
where
    D: BlockDevice,
{
    /// Create a new Volume Manager using a generic `BlockDevice`, with
    /// the default limits of 4 open directories, 4 open files and 1 open
    /// volume. Use [`VolumeManager::new_with_limits`] for different
    /// limits.
    pub fn new(block_device: D) -> VolumeManager<D, 4, 4, 1> {
        // A non-zero ID offset makes handles stand out in logs.
        Self::new_with_limits(block_device, 5000)
    }
}

impl<D, const MAX_DIRS: usize, const MAX_FILES: usize, const MAX_VOLUMES: usize>
    VolumeManager<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>
where
    D: BlockDevice,
{
    /// Create a new Volume Manager using a generic `BlockDevice`.
    ///
    /// The `id_offset` seeds the handle IDs this manager generates, which
    /// can help tell two managers apart when debugging.
    pub fn new_with_limits(
        block_device: D,
        id_offset: u32,
    ) -> VolumeManager<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES> {
        VolumeManager {
            block_device,
            id_generator: SearchIdGenerator::new(id_offset),
            open_volumes: Vec::new(),
            open_dirs: Vec::new(),
            open_files: Vec::new(),
        }
    }

    /// Temporarily get access to the underlying block device.
    pub fn device(&mut self) -> &mut D {
        &mut self.block_device
    }

    /// Open the volume whose boot sector lives at `start_block`, as a
    /// droppable [`Volume`].
    pub fn open_volume(
        &mut self,
        start_block: BlockIdx,
    ) -> Result<Volume<D, MAX_DIRS, MAX_FILES, MAX_VOLUMES>, DeviceError<D::E>> {
        let v = self.open_raw_volume(start_block)?;
        Ok(v.to_volume(self))
    }

    /// Open the volume whose boot sector lives at `start_block`.
    ///
    /// Parses and validates the boot sector. The FAT itself is not read
    /// until the first file is opened. You must close the returned handle
    /// with [`VolumeManager::close_volume`].
    pub fn open_raw_volume(&mut self, start_block: BlockIdx) -> Result<RawVolume, DeviceError<D::E>> {
        if self.open_volumes.is_full() {
            return Err(DeviceError::TooManyOpenVolumes);
        }
        for v in self.open_volumes.iter() {
            if v.volume.lba_start == start_block {
                return Err(DeviceError::VolumeAlreadyOpen);
            }
        }
        debug!("Opening volume at block {}", start_block.0);
        let volume = parse_volume(&mut self.block_device, start_block)?;
        let id = RawVolume(self.id_generator.get());
        let info = VolumeInfo {
            volume_id: id,
            volume,
        };
        // We already checked for space
        self.open_volumes
            .push(info)
            .map_err(|_| DeviceError::TooManyOpenVolumes)?;
        Ok(id)
    }

    /// Close a volume, dropping its FAT cache.
    ///
    /// Fails with `VolumeStillInUse` while any file or directory on it is
    /// open.
    pub fn close_volume(&mut self, volume: RawVolume) -> Result<(), DeviceError<D::E>> {
        for f in self.open_files.iter() {
            if f.volume_id == volume {
                return Err(DeviceError::VolumeStillInUse);
            }
        }
        for d in self.open_dirs.iter() {
            if d.volume_id == volume {
                return Err(DeviceError::VolumeStillInUse);
            }
        }
        let volume_idx = self.get_volume_by_id(volume)?;
        self.open_volumes.swap_remove(volume_idx);
        Ok(())
    }

    /// Open the volume's root directory and get a cursor over its
    /// entries.
    ///
    /// Fails with `NotADirectory` if the root region's first slot does
    /// not carry the directory attribute, or carries the volume-label
    /// attribute. Opening the root directory more than once is fine; each
    /// handle scans independently.
    pub fn open_root_dir(&mut self, volume: RawVolume) -> Result<RawDirectory, DeviceError<D::E>> {
        if self.open_dirs.is_full() {
            return Err(DeviceError::TooManyOpenDirs);
        }
        let volume_idx = self.get_volume_by_id(volume)?;
        let root_dir_start = self.open_volumes[volume_idx].volume.root_dir_start;
        let mut blocks = [Block::new()];
        self.block_device
            .read(&mut blocks, root_dir_start)
            .map_err(DeviceError::DeviceError)?;
        let attrs = Attributes::create_from_fat(blocks[0].content()[11]);
        if !attrs.is_directory() || attrs.is_volume() {
            return Err(DeviceError::NotADirectory);
        }
        let directory_id = RawDirectory(self.id_generator.get());
        let dir_info = DirectoryInfo {
            directory_id,
            volume_id: volume,
            sector: 0,
            slot: 0,
        };
        self.open_dirs
            .push(dir_info)
            .map_err(|_| DeviceError::TooManyOpenDirs)?;
        Ok(directory_id)
    }

    /// Open a directory by path. Only the root, spelled `"\\"`, exists on
    /// a FAT12 volume as far as this crate is concerned; any other path
    /// fails with `NotFound`.
    pub fn open_dir(
        &mut self,
        volume: RawVolume,
        path: &str,
    ) -> Result<RawDirectory, DeviceError<D::E>> {
        if path != "\\" {
            return Err(DeviceError::NotFound);
        }
        self.open_root_dir(volume)
    }

    /// Close a directory handle.
    pub fn close_dir(&mut self, directory: RawDirectory) -> Result<(), DeviceError<D::E>> {
        for (idx, info) in self.open_dirs.iter().enumerate() {
            if directory == info.directory_id {
                self.open_dirs.swap_remove(idx);
                return Ok(());
            }
        }
        Err(DeviceError::BadHandle)
    }

    /// Fetch the next entry from a directory scan.
    ///
    /// Deleted and never-used slots are skipped. Returns `Ok(None)` once
    /// the root directory region is exhausted, and keeps doing so on
    /// subsequent calls. The cursor only advances when an entry (or the
    /// end) is actually reached; a device error leaves it where it was.
    pub fn next_dir_entry(
        &mut self,
        directory: RawDirectory,
    ) -> Result<Option<DirEntry>, DeviceError<D::E>> {
        let dir_idx = self.get_dir_by_id(directory)?;
        let volume_idx = self.get_volume_by_id(self.open_dirs[dir_idx].volume_id)?;
        let root_dir_start = self.open_volumes[volume_idx].volume.root_dir_start;
        let blocks_per_root = self.open_volumes[volume_idx].volume.blocks_per_root;
        let mut sector = self.open_dirs[dir_idx].sector;
        let mut slot = self.open_dirs[dir_idx].slot;
        let result = next_root_entry(
            &mut self.block_device,
            root_dir_start,
            blocks_per_root,
            &mut sector,
            &mut slot,
        );
        if result.is_ok() {
            self.open_dirs[dir_idx].sector = sector;
            self.open_dirs[dir_idx].slot = slot;
        }
        result
    }

    /// Call a function for each entry in the directory, front to back,
    /// without disturbing the directory's own scan cursor.
    pub fn iterate_dir<F>(
        &mut self,
        directory: RawDirectory,
        mut func: F,
    ) -> Result<(), DeviceError<D::E>>
    where
        F: FnMut(&DirEntry),
    {
        let dir_idx = self.get_dir_by_id(directory)?;
        let volume_idx = self.get_volume_by_id(self.open_dirs[dir_idx].volume_id)?;
        let root_dir_start = self.open_volumes[volume_idx].volume.root_dir_start;
        let blocks_per_root = self.open_volumes[volume_idx].volume.blocks_per_root;
        let mut sector = 0;
        let mut slot = 0;
        while let Some(dir_entry) = next_root_entry(
            &mut self.block_device,
            root_dir_start,
            blocks_per_root,
            &mut sector,
            &mut slot,
        )? {
            func(&dir_entry);
        }
        Ok(())
    }

    /// Look in the root directory for a named entry, decoding slots with
    /// the same scan the directory cursor uses and stopping at the first
    /// match.
    pub fn find_dir_entry<N>(
        &mut self,
        volume: RawVolume,
        name: N,
    ) -> Result<DirEntry, DeviceError<D::E>>
    where
        N: ToShortFileName,
    {
        let volume_idx = self.get_volume_by_id(volume)?;
        let sfn = name
            .to_short_filename()
            .map_err(DeviceError::FilenameError)?;
        let root_dir_start = self.open_volumes[volume_idx].volume.root_dir_start;
        let blocks_per_root = self.open_volumes[volume_idx].volume.blocks_per_root;
        let mut sector = 0;
        let mut slot = 0;
        while let Some(dir_entry) = next_root_entry(
            &mut self.block_device,
            root_dir_start,
            blocks_per_root,
            &mut sector,
            &mut slot,
        )? {
            if dir_entry.name == sfn {
                return Ok(dir_entry);
            }
        }
        Err(DeviceError::NotFound)
    }

    /// Open a file in the root directory by name.
    ///
    /// Decodes the file's cluster chain up front, reading and caching the
    /// FAT if this is the first open on the volume. The position starts
    /// at zero. A name that matches a directory or the volume label fails
    /// with `OpenedDirAsFile`; opening the same file twice fails with
    /// `FileAlreadyOpen`.
    pub fn open_file_by_name<N>(
        &mut self,
        volume: RawVolume,
        name: N,
    ) -> Result<RawFile, DeviceError<D::E>>
    where
        N: ToShortFileName,
    {
        if self.open_files.is_full() {
            return Err(DeviceError::TooManyOpenFiles);
        }
        let dir_entry = self.find_dir_entry(volume, name)?;
        if dir_entry.attributes.is_directory() || dir_entry.attributes.is_volume() {
            return Err(DeviceError::OpenedDirAsFile);
        }
        if self.file_is_open(volume, &dir_entry) {
            return Err(DeviceError::FileAlreadyOpen);
        }
        debug!(
            "Opening file at cluster {}, {} bytes",
            dir_entry.cluster.0, dir_entry.size
        );
        let volume_idx = self.get_volume_by_id(volume)?;
        let chain = self.open_volumes[volume_idx]
            .volume
            .cluster_chain(&mut self.block_device, dir_entry.cluster)?;
        let file_id = RawFile(self.id_generator.get());
        let file = FileInfo {
            file_id,
            volume_id: volume,
            entry: dir_entry,
            chain,
            current_offset: 0,
        };
        // We already checked for space
        self.open_files
            .push(file)
            .map_err(|_| DeviceError::TooManyOpenFiles)?;
        Ok(file_id)
    }

    /// Close a file handle, dropping its cluster chain.
    pub fn close_file(&mut self, file: RawFile) -> Result<(), DeviceError<D::E>> {
        let file_idx = self.get_file_by_id(file)?;
        self.open_files.swap_remove(file_idx);
        Ok(())
    }

    /// Read from an open file, advancing the position by the number of
    /// bytes read.
    ///
    /// Stops early at the end of the file; a read at the end transfers 0
    /// bytes. The file's clusters come from the chain decoded at open
    /// time, never from walking the FAT again; a declared size that
    /// outruns the chain fails with `InvalidOffset`.
    pub fn read(&mut self, file: RawFile, buffer: &mut [u8]) -> Result<usize, DeviceError<D::E>> {
        let file_idx = self.get_file_by_id(file)?;
        let volume_idx = self.get_volume_by_id(self.open_files[file_idx].volume_id)?;
        let mut space = buffer.len();
        let mut read = 0;
        while space > 0 && !self.open_files[file_idx].eof() {
            let offset = self.open_files[file_idx].current_offset;
            let (block_idx, block_offset, block_avail) = find_data_on_disk(
                &self.open_volumes[volume_idx].volume,
                &self.open_files[file_idx].chain,
                offset,
            )?;
            let mut blocks = [Block::new()];
            self.block_device
                .read(&mut blocks, block_idx)
                .map_err(DeviceError::DeviceError)?;
            let file = &mut self.open_files[file_idx];
            let to_copy = block_avail.min(space).min(file.left() as usize);
            buffer[read..read + to_copy]
                .copy_from_slice(&blocks[0].content()[block_offset..block_offset + to_copy]);
            read += to_copy;
            space -= to_copy;
            file.current_offset += to_copy as u32;
        }
        Ok(read)
    }

    /// Read whole elements of `element_size` bytes each, fread style.
    ///
    /// Transfers `buffer.len() / element_size` elements, or as many whole
    /// elements as fit before the end of the file, whichever is smaller.
    /// A trailing partial element is not transferred at all and the
    /// position does not move over it. Returns the number of elements
    /// read; 0 at end of file.
    pub fn read_elements(
        &mut self,
        file: RawFile,
        buffer: &mut [u8],
        element_size: usize,
    ) -> Result<usize, DeviceError<D::E>> {
        if element_size == 0 {
            return Err(DeviceError::InvalidArgument("element size must be non-zero"));
        }
        let file_idx = self.get_file_by_id(file)?;
        let requested = buffer.len() / element_size;
        let left = self.open_files[file_idx].left() as usize;
        let whole = requested.min(left / element_size);
        let want = whole * element_size;
        let got = self.read(file, &mut buffer[..want])?;
        if got != want {
            return Err(DeviceError::InvalidOffset);
        }
        Ok(whole)
    }

    /// Move a file's position to `offset` bytes from the start. Returns
    /// the new position. Fails with `InvalidOffset`, leaving the position
    /// alone, if the target is past the end of the file.
    pub fn file_seek_from_start(
        &mut self,
        file: RawFile,
        offset: u32,
    ) -> Result<u32, DeviceError<D::E>> {
        let file_idx = self.get_file_by_id(file)?;
        self.open_files[file_idx]
            .seek_from_start(offset)
            .map_err(|_| DeviceError::InvalidOffset)
    }

    /// Move a file's position to `offset` bytes before the end. Returns
    /// the new position. Fails with `InvalidOffset`, leaving the position
    /// alone, if `offset` exceeds the file size.
    pub fn file_seek_from_end(
        &mut self,
        file: RawFile,
        offset: u32,
    ) -> Result<u32, DeviceError<D::E>> {
        let file_idx = self.get_file_by_id(file)?;
        self.open_files[file_idx]
            .seek_from_end(offset)
            .map_err(|_| DeviceError::InvalidOffset)
    }

    /// Move a file's position by a signed amount. Returns the new
    /// position. Fails with `InvalidOffset`, leaving the position alone,
    /// if the target would leave the file.
    pub fn file_seek_from_current(
        &mut self,
        file: RawFile,
        offset: i32,
    ) -> Result<u32, DeviceError<D::E>> {
        let file_idx = self.get_file_by_id(file)?;
        self.open_files[file_idx]
            .seek_from_current(offset)
            .map_err(|_| DeviceError::InvalidOffset)
    }

    /// Get the length of an open file.
    pub fn file_length(&self, file: RawFile) -> Result<u32, DeviceError<D::E>> {
        let file_idx = self.get_file_by_id(file)?;
        Ok(self.open_files[file_idx].length())
    }

    /// Get the current position of an open file.
    pub fn file_offset(&self, file: RawFile) -> Result<u32, DeviceError<D::E>> {
        let file_idx = self.get_file_by_id(file)?;
        Ok(self.open_files[file_idx].current_offset)
    }

    /// Check whether an open file's position is at the end.
    pub fn file_eof(&self, file: RawFile) -> Result<bool, DeviceError<D::E>> {
        let file_idx = self.get_file_by_id(file)?;
        Ok(self.open_files[file_idx].eof())
    }

    /// Check if any directories or files are open.
    pub fn has_open_handles(&self) -> bool {
        !self.open_dirs.is_empty() || !self.open_files.is_empty()
    }

    /// Consume self and return the block device.
    pub fn free(self) -> D {
        self.block_device
    }

    /// The volume a directory handle belongs to.
    pub(crate) fn dir_volume(&self, directory: RawDirectory) -> Result<RawVolume, DeviceError<D::E>> {
        let dir_idx = self.get_dir_by_id(directory)?;
        Ok(self.open_dirs[dir_idx].volume_id)
    }

    /// Check if a file is open, by the on-disk location of its entry.
    fn file_is_open(&self, volume: RawVolume, dir_entry: &DirEntry) -> bool {
        for f in self.open_files.iter() {
            if f.volume_id == volume
                && f.entry.entry_block == dir_entry.entry_block
                && f.entry.entry_offset == dir_entry.entry_offset
            {
                return true;
            }
        }
        false
    }

    fn get_volume_by_id(&self, volume: RawVolume) -> Result<usize, DeviceError<D::E>> {
        for (idx, v) in self.open_volumes.iter().enumerate() {
            if v.volume_id == volume {
                return Ok(idx);
            }
        }
        Err(DeviceError::BadHandle)
    }

    fn get_dir_by_id(&self, directory: RawDirectory) -> Result<usize, DeviceError<D::E>> {
        for (idx, d) in self.open_dirs.iter().enumerate() {
            if d.directory_id == directory {
                return Ok(idx);
            }
        }
        Err(DeviceError::BadHandle)
    }

    fn get_file_by_id(&self, file: RawFile) -> Result<usize, DeviceError<D::E>> {
        for (idx, f) in self.open_files.iter().enumerate() {
            if f.file_id == file {
                return Ok(idx);
            }
        }
        Err(DeviceError::BadHandle)
    }
}

/// Turn a byte offset within a file into the block to read, the offset
/// within that block, and how many bytes remain in the block.
///
/// The cluster is looked up directly in the file's chain; an offset that
/// maps past the end of the chain means the directory entry's size and
/// the FAT disagree.
fn find_data_on_disk<E>(
    volume: &FatVolume,
    chain: &ClusterChain,
    desired_offset: u32,
) -> Result<(BlockIdx, usize, usize), DeviceError<E>>
where
    E: core::fmt::Debug,
{
    let bytes_per_cluster = volume.bytes_per_cluster();
    let cluster_idx = (desired_offset / bytes_per_cluster) as usize;
    let cluster = chain.get(cluster_idx).ok_or(DeviceError::InvalidOffset)?;
    let cluster_block = volume
        .cluster_to_block(cluster)
        .ok_or(DeviceError::BadCluster)?;
    let offset_in_cluster = desired_offset % bytes_per_cluster;
    let block_idx = cluster_block + BlockCount(offset_in_cluster / BLOCK_LEN);
    let block_offset = (desired_offset % BLOCK_LEN) as usize;
    Ok((block_idx, block_offset, BLOCK_LEN as usize - block_offset))
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
