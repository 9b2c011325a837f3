//! On-media record format.
//!
//! Every record is `[header: 2][payload: 18]` with an optional trailing
//! checksum byte when the `checksum` feature is enabled. The header packs the
//! total record size between two fixed tag nibbles:
//!
//! ```text
//! byte0 = 0xA | size[7:4]
//! byte1 = size[3:0] | 0x0
//! ```
//!
//! Erased flash (`0xFF 0xFF`) never carries the tags, which is how a written
//! record is told apart from blank space.

use super::{PAYLOAD_SIZE, Payload};

/// Tag in the high nibble of the first header byte
pub const HEADER_PREFIX: u8 = 0xA0;

/// Tag in the low nibble of the second header byte
pub const HEADER_SUFFIX: u8 = 0x00;

pub const HEADER_SIZE: usize = 2;

#[cfg(feature = "checksum")]
pub const CHECKSUM_SIZE: usize = 1;
#[cfg(not(feature = "checksum"))]
pub const CHECKSUM_SIZE: usize = 0;

/// Total bytes one record occupies on flash
pub const RECORD_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE + CHECKSUM_SIZE;

/// Worst-case size of the next record, used to decide when a page is full
pub const MAX_RECORD_SIZE: usize = RECORD_SIZE;

const _: () = assert!(RECORD_SIZE > 0 && RECORD_SIZE <= u8::MAX as usize);

pub type EncodedRecord = [u8; RECORD_SIZE];

/// Pack a record size into the two header bytes.
pub const fn encode_header(size: u8) -> [u8; HEADER_SIZE] {
    [HEADER_PREFIX | (size >> 4), (size << 4) | HEADER_SUFFIX]
}

/// Recover the record size from two header bytes.
///
/// Returns `None` when either tag nibble is wrong or the size is zero.
pub const fn decode_header(bytes: [u8; HEADER_SIZE]) -> Option<u8> {
    let size = ((bytes[0] & 0x0F) << 4) | ((bytes[1] & 0xF0) >> 4);

    if bytes[0] & 0xF0 == HEADER_PREFIX && bytes[1] & 0x0F == HEADER_SUFFIX && size > 0 {
        Some(size)
    } else {
        None
    }
}

/// Encode a payload into the full record written to the staging buffer.
pub fn encode(payload: &Payload) -> EncodedRecord {
    let mut record = [0u8; RECORD_SIZE];

    record[..HEADER_SIZE].copy_from_slice(&encode_header(RECORD_SIZE as u8));
    record[HEADER_SIZE..HEADER_SIZE + PAYLOAD_SIZE].copy_from_slice(payload);

    #[cfg(feature = "checksum")]
    {
        record[RECORD_SIZE - 1] = checksum8(&record[..RECORD_SIZE - 1]);
    }

    record
}

/// Extract the payload from a record whose header has already been checked.
pub fn payload_of(record: &EncodedRecord) -> Payload {
    let mut payload = [0u8; PAYLOAD_SIZE];
    payload.copy_from_slice(&record[HEADER_SIZE..HEADER_SIZE + PAYLOAD_SIZE]);
    payload
}

/// Two's complement of the byte sum, so a valid record sums to zero.
pub fn checksum8(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |sum, &b| sum.wrapping_add(b))
        .wrapping_neg()
}

/// Check the trailing checksum byte. Always true without the `checksum` feature.
pub fn verify(record: &EncodedRecord) -> bool {
    if CHECKSUM_SIZE == 0 {
        return true;
    }
    record.iter().fold(0u8, |sum, &b| sum.wrapping_add(b)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_size() {
        #[cfg(not(feature = "checksum"))]
        assert_eq!(RECORD_SIZE, 20);
        #[cfg(feature = "checksum")]
        assert_eq!(RECORD_SIZE, 21);
    }

    #[test]
    fn test_header_layout() {
        assert_eq!(encode_header(20), [0xA1, 0x40]);
        assert_eq!(encode_header(21), [0xA1, 0x50]);
        assert_eq!(encode_header(0xFF), [0xAF, 0xF0]);
        assert_eq!(encode_header(0x0F), [0xA0, 0xF0]);
    }

    #[test]
    fn test_header_size_survives_encoding() {
        let record = encode(&[0x5A; PAYLOAD_SIZE]);
        let header = [record[0], record[1]];
        assert_eq!(decode_header(header), Some(RECORD_SIZE as u8));
    }

    #[test]
    fn test_decode_rejects_erased_and_foreign_bytes() {
        assert_eq!(decode_header([0xFF, 0xFF]), None);
        assert_eq!(decode_header([0x00, 0x00]), None);
        // Right tags, size zero.
        assert_eq!(decode_header([0xA0, 0x00]), None);
        // Wrong suffix nibble.
        assert_eq!(decode_header([0xA1, 0x41]), None);
        // Wrong prefix nibble.
        assert_eq!(decode_header([0xB1, 0x40]), None);
    }

    #[test]
    fn test_encode_places_payload_after_header() {
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload[0] = 7;
        payload[PAYLOAD_SIZE - 1] = 9;
        let record = encode(&payload);

        assert_eq!(record[2], 7);
        assert_eq!(record[HEADER_SIZE + PAYLOAD_SIZE - 1], 9);
        assert_eq!(payload_of(&record), payload);
        assert!(verify(&record));
    }

    #[test]
    fn test_checksum8_balances_sum() {
        let bytes = [0xA1, 0x50, 0x10, 0x20];
        let sum = bytes.iter().fold(0u8, |s, &b| s.wrapping_add(b));
        assert_eq!(sum.wrapping_add(checksum8(&bytes)), 0);
    }

    #[cfg(feature = "checksum")]
    #[test]
    fn test_verify_detects_flipped_bit() {
        let mut record = encode(&[0x11; PAYLOAD_SIZE]);
        record[5] ^= 0x04;
        assert!(!verify(&record));
    }
}
