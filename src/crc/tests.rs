//! Tests for CRC module

use super::*;

#[test]
fn test_crc32c_check_value() {
    assert_eq!(crc32c(b"123456789"), 0xE306_9283);
}

#[test]
fn test_crc32c_empty_data() {
    assert_eq!(crc32c(b""), 0);
}

#[test]
fn test_crc32c_deterministic() {
    let data = b"test data";
    assert_eq!(crc32c(data), crc32c(data));
}

#[test]
fn test_crc32c_different_data() {
    assert_ne!(crc32c(b"data1"), crc32c(b"data2"));
}

#[test]
fn test_crc32c_order_matters() {
    assert_ne!(crc32c(b"abc"), crc32c(b"bca"));
}

#[test]
fn test_crc32c_digest_update() {
    let mut digest = CRC32C.digest();
    digest.update(b"hello");
    digest.update(b" world");
    let checksum1 = digest.finalize();

    let checksum2 = crc32c(b"hello world");

    // Incremental update should produce same result
    assert_eq!(checksum1, checksum2);
}

#[test]
fn test_crc32c_zero_bytes() {
    // 32 zero bytes, from the iSCSI test vectors
    assert_eq!(crc32c(&[0u8; 32]), 0x8A91_36AA);
}

#[test]
fn test_crc32c_all_ones() {
    assert_eq!(crc32c(&[0xFFu8; 32]), 0x62A8_AB43);
}
