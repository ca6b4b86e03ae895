//! Reading and seeking tests

use fat12::{volume_mgr::VolumeManager, BlockIdx, DeviceError};

mod utils;

#[test]
fn hello_end_to_end() {
    let disk = utils::make_block_device();
    let mut volume_mgr = VolumeManager::new(disk);
    let volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("open volume");
    let file = volume_mgr
        .open_file_by_name(volume, "HELLO.TXT")
        .expect("open file");

    let mut buffer = [0u8; 16];
    let len = volume_mgr.read(file, &mut buffer).expect("read");
    assert_eq!(len, 5);
    assert_eq!(&buffer[..len], b"HELLO");

    // At the end of the file nothing more comes out
    let elements = volume_mgr
        .read_elements(file, &mut buffer[..1], 1)
        .expect("read at eof");
    assert_eq!(elements, 0);
    let len = volume_mgr.read(file, &mut buffer).expect("read at eof");
    assert_eq!(len, 0);

    volume_mgr.close_file(file).expect("close file");
    volume_mgr.close_volume(volume).expect("close volume");
}

#[test]
fn element_reads_drop_partial_tail() {
    let disk = utils::make_block_device();
    let mut volume_mgr = VolumeManager::new(disk);
    let volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("open volume");
    let file = volume_mgr
        .open_file_by_name(volume, "HELLO.TXT")
        .expect("open file");

    // Five bytes hold two whole two-byte elements; the fifth byte is not
    // transferred and the position stays in front of it.
    let mut buffer = [0u8; 6];
    let elements = volume_mgr
        .read_elements(file, &mut buffer, 2)
        .expect("read elements");
    assert_eq!(elements, 2);
    assert_eq!(&buffer[..4], b"HELL");
    assert_eq!(volume_mgr.file_offset(file).unwrap(), 4);

    // The leftover byte is still readable one element at a time
    let elements = volume_mgr
        .read_elements(file, &mut buffer[..4], 1)
        .expect("read elements");
    assert_eq!(elements, 1);
    assert_eq!(buffer[0], b'O');
    assert_eq!(volume_mgr.file_offset(file).unwrap(), 5);

    // Element size zero is meaningless
    assert!(matches!(
        volume_mgr.read_elements(file, &mut buffer, 0),
        Err(DeviceError::InvalidArgument(_))
    ));
}

#[test]
fn trailing_bytes_read_back() {
    let disk = utils::make_block_device();
    let mut volume_mgr = VolumeManager::new(disk);
    let volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("open volume");
    let file = volume_mgr
        .open_file_by_name(volume, "README.TXT")
        .expect("open file");

    for k in [0usize, 1, 255, 511, 512, 513, 777, 1299, 1300] {
        let pos = volume_mgr
            .file_seek_from_end(file, k as u32)
            .expect("seek from end");
        assert_eq!(pos as usize, utils::README_LEN - k);
        let mut buffer = vec![0u8; k];
        let len = volume_mgr.read(file, &mut buffer).expect("read tail");
        assert_eq!(len, k);
        for (i, b) in buffer.iter().enumerate() {
            assert_eq!(*b, utils::readme_byte(utils::README_LEN - k + i));
        }
    }
}

#[test]
fn seek_is_idempotent_and_checked() {
    let disk = utils::make_block_device();
    let mut volume_mgr = VolumeManager::new(disk);
    let volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("open volume");
    let file = volume_mgr
        .open_file_by_name(volume, "README.TXT")
        .expect("open file");
    let size = utils::README_LEN as u32;

    for p in [0u32, 1, 512, 700, size] {
        assert_eq!(volume_mgr.file_seek_from_start(file, p), Ok(p));
        assert_eq!(volume_mgr.file_seek_from_current(file, 0), Ok(p));
    }

    // Failed seeks leave the position alone
    volume_mgr.file_seek_from_start(file, 700).unwrap();
    assert!(matches!(
        volume_mgr.file_seek_from_start(file, size + 1),
        Err(DeviceError::InvalidOffset)
    ));
    assert!(matches!(
        volume_mgr.file_seek_from_end(file, size + 1),
        Err(DeviceError::InvalidOffset)
    ));
    assert!(matches!(
        volume_mgr.file_seek_from_current(file, -701),
        Err(DeviceError::InvalidOffset)
    ));
    assert!(matches!(
        volume_mgr.file_seek_from_current(file, 601),
        Err(DeviceError::InvalidOffset)
    ));
    assert_eq!(volume_mgr.file_offset(file), Ok(700));
}

#[test]
fn reads_cross_cluster_boundaries() {
    let disk = utils::make_block_device();
    let mut volume_mgr = VolumeManager::new(disk);
    let volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("open volume");
    let file = volume_mgr
        .open_file_by_name(volume, "README.TXT")
        .expect("open file");

    // 200 bytes starting at 450 span the first cluster boundary
    volume_mgr.file_seek_from_start(file, 450).unwrap();
    let mut buffer = [0u8; 200];
    let len = volume_mgr.read(file, &mut buffer).expect("read");
    assert_eq!(len, 200);
    for (i, b) in buffer.iter().enumerate() {
        assert_eq!(*b, utils::readme_byte(450 + i));
    }

    // The whole file in one call
    volume_mgr.file_seek_from_start(file, 0).unwrap();
    let mut buffer = vec![0u8; 2048];
    let len = volume_mgr.read(file, &mut buffer).expect("read all");
    assert_eq!(len, utils::README_LEN);
    for i in 0..len {
        assert_eq!(buffer[i], utils::readme_byte(i));
    }
    assert_eq!(volume_mgr.read(file, &mut buffer).expect("read at eof"), 0);
}

#[test]
fn no_extension_file_reads_back() {
    let disk = utils::make_block_device();
    let mut volume_mgr = VolumeManager::new(disk);
    let volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("open volume");
    let file = volume_mgr
        .open_file_by_name(volume, "NOTES")
        .expect("open file");
    let mut buffer = [0u8; 32];
    let len = volume_mgr.read(file, &mut buffer).expect("read");
    assert_eq!(&buffer[..len], utils::NOTES_CONTENT);
}

#[test]
fn size_beyond_chain_is_an_error() {
    // Claim HELLO.TXT is 600 bytes; its chain is a single 512-byte
    // cluster, so a full read runs off the end of the chain.
    let disk = utils::make_block_device_patched(|image| {
        let slot = 512 * utils::ROOT_DIR_BLOCK + 32;
        image[slot + 28..slot + 32].copy_from_slice(&600u32.to_le_bytes());
    });
    let mut volume_mgr = VolumeManager::new(disk);
    let volume = volume_mgr
        .open_raw_volume(BlockIdx(0))
        .expect("open volume");
    let file = volume_mgr
        .open_file_by_name(volume, "HELLO.TXT")
        .expect("open file");
    let mut buffer = [0u8; 600];
    assert!(matches!(
        volume_mgr.read(file, &mut buffer),
        Err(DeviceError::InvalidOffset)
    ));
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
