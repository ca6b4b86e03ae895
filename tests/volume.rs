//! Volume related tests

use fat12::{volume_mgr::VolumeManager, BlockIdx, DeviceError};

mod utils;

#[test]
fn open_close_reopen() {
    let disk = utils::make_block_device();
    let mut volume_mgr: VolumeManager<utils::RamDisk, 4, 4, 2> =
        VolumeManager::new_with_limits(disk, 0x1000_0000);

    let volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("open volume");

    // Fail to open the same volume again
    assert!(matches!(
        volume_mgr.open_raw_volume(BlockIdx(0)),
        Err(DeviceError::VolumeAlreadyOpen)
    ));

    volume_mgr.close_volume(volume).expect("close volume");

    // Closing made room for it again
    let volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("reopen volume");
    volume_mgr.close_volume(volume).expect("close volume");
}

#[test]
fn volume_table_fills_up() {
    let disk = utils::make_block_device();
    let mut volume_mgr: VolumeManager<utils::RamDisk, 4, 4, 1> =
        VolumeManager::new_with_limits(disk, 0x1000_0000);

    let _volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("open volume");

    assert!(matches!(
        volume_mgr.open_raw_volume(BlockIdx(512)),
        Err(DeviceError::TooManyOpenVolumes)
    ));
}

#[test]
fn close_volume_too_early() {
    let disk = utils::make_block_device();
    let mut volume_mgr = VolumeManager::new(disk);

    let volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("open volume");
    let root_dir = volume_mgr.open_root_dir(volume).expect("open root dir");
    assert!(volume_mgr.has_open_handles());

    // Dir open
    assert!(matches!(
        volume_mgr.close_volume(volume),
        Err(DeviceError::VolumeStillInUse)
    ));

    let test_file = volume_mgr
        .open_file_by_name(volume, "HELLO.TXT")
        .expect("open test file");
    volume_mgr.close_dir(root_dir).expect("close dir");

    // File open, no dir open
    assert!(matches!(
        volume_mgr.close_volume(volume),
        Err(DeviceError::VolumeStillInUse)
    ));

    volume_mgr.close_file(test_file).expect("close file");
    assert!(!volume_mgr.has_open_handles());
    volume_mgr.close_volume(volume).expect("close volume");
}

#[test]
fn stale_handles_are_rejected() {
    let disk = utils::make_block_device();
    let mut volume_mgr = VolumeManager::new(disk);

    let volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("open volume");
    let root_dir = volume_mgr.open_root_dir(volume).expect("open root dir");
    volume_mgr.close_dir(root_dir).expect("close dir");
    assert!(matches!(
        volume_mgr.close_dir(root_dir),
        Err(DeviceError::BadHandle)
    ));
    volume_mgr.close_volume(volume).expect("close volume");
    assert!(matches!(
        volume_mgr.close_volume(volume),
        Err(DeviceError::BadHandle)
    ));
}

#[test]
fn rejects_bad_boot_sector() {
    let disk = utils::make_block_device_patched(|image| {
        image[510] = 0x00;
    });
    let mut volume_mgr = VolumeManager::new(disk);
    assert!(matches!(
        volume_mgr.open_raw_volume(BlockIdx(0)),
        Err(DeviceError::FormatError("bad boot sector signature"))
    ));
}

#[test]
fn rejects_bad_geometry() {
    // Sectors per cluster must be a power of two
    let disk = utils::make_block_device_patched(|image| {
        image[13] = 3;
    });
    let mut volume_mgr = VolumeManager::new(disk);
    assert!(matches!(
        volume_mgr.open_raw_volume(BlockIdx(0)),
        Err(DeviceError::FormatError("bad sectors per cluster"))
    ));

    // One or two FAT copies only
    let disk = utils::make_block_device_patched(|image| {
        image[16] = 5;
    });
    let mut volume_mgr = VolumeManager::new(disk);
    assert!(matches!(
        volume_mgr.open_raw_volume(BlockIdx(0)),
        Err(DeviceError::FormatError("bad number of FAT copies"))
    ));

    // Root directory must fill whole sectors
    let disk = utils::make_block_device_patched(|image| {
        image[17..19].copy_from_slice(&100u16.to_le_bytes());
    });
    let mut volume_mgr = VolumeManager::new(disk);
    assert!(matches!(
        volume_mgr.open_raw_volume(BlockIdx(0)),
        Err(DeviceError::FormatError("root directory not sector aligned"))
    ));

    // At least one total-sector field must be set
    let disk = utils::make_block_device_patched(|image| {
        image[19..21].copy_from_slice(&0u16.to_le_bytes());
    });
    let mut volume_mgr = VolumeManager::new(disk);
    assert!(matches!(
        volume_mgr.open_raw_volume(BlockIdx(0)),
        Err(DeviceError::FormatError("no total sector count"))
    ));
}

#[test]
fn volume_wrapper_closes_on_drop() {
    let disk = utils::make_block_device();
    let mut volume_mgr = VolumeManager::new(disk);
    {
        let _volume = volume_mgr.open_volume(BlockIdx(0)).expect("open volume");
    }
    // The drop released the slot
    let volume = volume_mgr.open_volume(BlockIdx(0)).expect("reopen volume");
    volume.close().expect("close volume");
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
