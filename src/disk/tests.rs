// Block device tests

use super::*;
use crate::types::BLOCK_SIZE;

#[test]
fn test_mem_disk_unwritten_blocks_read_zero() {
    let disk = MemDisk::new();
    let mut buf = vec![0xaau8; BLOCK_SIZE];
    disk.read_block(1, 7, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0));
    assert_eq!(disk.block_count(), 0);
}

#[test]
fn test_mem_disk_roundtrip() {
    let disk = MemDisk::new();
    let mut data = vec![0u8; BLOCK_SIZE];
    data[0] = 0x42;
    data[BLOCK_SIZE - 1] = 0x24;
    disk.write_block(2, 9, &data).unwrap();

    let mut back = vec![0u8; BLOCK_SIZE];
    disk.read_block(2, 9, &mut back).unwrap();
    assert_eq!(back, data);
    assert_eq!(disk.block_count(), 1);

    // Same block number on another device is a distinct block.
    disk.read_block(3, 9, &mut back).unwrap();
    assert!(back.iter().all(|&b| b == 0));
}

#[test]
fn test_mem_disk_rejects_wrong_buffer_size() {
    let disk = MemDisk::new();
    let mut small = vec![0u8; BLOCK_SIZE - 1];
    let err = disk.read_block(1, 0, &mut small).unwrap_err();
    assert!(matches!(err, DiskError::InvalidArgument(_)));
    let err = disk.write_block(1, 0, &small).unwrap_err();
    assert!(matches!(err, DiskError::InvalidArgument(_)));
}

#[test]
fn test_image_header_checksum() {
    let mut header = ImageHeader::new();
    header.init_checksum();
    assert!(header.is_valid());
    assert!(header.verify_checksum());

    // Modify header and verify checksum fails
    header.block_size = 9999;
    assert!(!header.verify_checksum());
}

#[test]
fn test_file_disk_create_open_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let disk = FileDisk::new(dir.path());

    disk.create_device(1).unwrap();
    disk.open_device(1).unwrap();

    let mut data = vec![0u8; BLOCK_SIZE];
    for (i, b) in data.iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    disk.write_block(1, 3, &data).unwrap();

    let mut back = vec![0u8; BLOCK_SIZE];
    disk.read_block(1, 3, &mut back).unwrap();
    assert_eq!(back, data);
}

#[test]
fn test_file_disk_unwritten_block_reads_zero() {
    let dir = tempfile::tempdir().unwrap();
    let disk = FileDisk::new(dir.path());
    disk.create_device(4).unwrap();

    let mut buf = vec![0x55u8; BLOCK_SIZE];
    disk.read_block(4, 100, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn test_file_disk_missing_device() {
    let dir = tempfile::tempdir().unwrap();
    let disk = FileDisk::new(dir.path());
    let mut buf = vec![0u8; BLOCK_SIZE];
    let err = disk.read_block(9, 0, &mut buf).unwrap_err();
    assert!(matches!(err, DiskError::NotFound(_)));
}

#[test]
fn test_file_disk_detects_corrupt_header() {
    let dir = tempfile::tempdir().unwrap();
    let disk = FileDisk::new(dir.path());
    disk.create_device(2).unwrap();

    // Flip a magic byte in place.
    let path = dir.path().join("dev_2.img");
    let mut image = std::fs::read(&path).unwrap();
    image[0] ^= 0xff;
    std::fs::write(&path, &image).unwrap();

    let err = disk.open_device(2).unwrap_err();
    assert!(matches!(err, DiskError::CorruptImage(_)));
}

#[test]
fn test_file_disk_detects_checksum_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let disk = FileDisk::new(dir.path());
    disk.create_device(5).unwrap();

    // Corrupt a non-magic header field so only the checksum disagrees.
    let path = dir.path().join("dev_5.img");
    let mut image = std::fs::read(&path).unwrap();
    image[4] ^= 0x01;
    std::fs::write(&path, &image).unwrap();

    let err = disk.open_device(5).unwrap_err();
    assert!(matches!(err, DiskError::CorruptImage(_)));
}
