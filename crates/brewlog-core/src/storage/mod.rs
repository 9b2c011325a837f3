pub mod accumulator;
pub mod datalogger;
pub mod device;
pub mod ram_flash;
pub mod record;
pub mod scanner;
pub mod schedule;

use core::fmt::Display;

pub use datalogger::*;
pub use device::{BlockDevice, StagingBuffer};
pub use scanner::{ScanOutcome, ScanReport, StoredRecord};

/// Size of one flash page in bytes (AT45DB-style 528-byte page mode)
pub const PAGE_SIZE: usize = 528;

/// Highest page index on the default device
pub const MAX_PAGE_INDEX: u16 = 0x1FFF;

/// Value every byte reads as after a page erase
pub const ERASED_BYTE: u8 = 0xFF;

/// Bytes of time fields at the start of every payload (month, day, hour, minute)
pub const TIMESTAMP_SIZE: usize = 4;

/// Number of 16-bit sensor readings per data set
pub const READING_COUNT: usize = 7;

/// Size of the record payload in bytes
pub const PAYLOAD_SIZE: usize = TIMESTAMP_SIZE + READING_COUNT * 2;

/// The raw payload of one data set as it is written to flash
pub type Payload = [u8; PAYLOAD_SIZE];

/// Wall-clock stamp stored in the first four payload bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

/// Typed view of one logged data set.
///
/// Binary format (18 bytes):
/// - month, day, hour, minute: 1 byte each
/// - readings: 14 bytes (7 × u16, big-endian)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataSet {
    pub stamp: Timestamp,
    /// Sensor readings, already truncated to 16 bits by the acquisition side
    pub readings: [u16; READING_COUNT],
}

impl DataSet {
    pub fn new(stamp: Timestamp, readings: [u16; READING_COUNT]) -> Self {
        Self { stamp, readings }
    }

    /// Converts the data set to the payload bytes written to flash.
    pub fn to_payload(&self) -> Payload {
        let mut bytes = [0u8; PAYLOAD_SIZE];

        bytes[0] = self.stamp.month;
        bytes[1] = self.stamp.day;
        bytes[2] = self.stamp.hour;
        bytes[3] = self.stamp.minute;

        for (i, &value) in self.readings.iter().enumerate() {
            let offset = TIMESTAMP_SIZE + (i * 2);
            bytes[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        }

        bytes
    }

    /// Creates a data set from payload bytes.
    pub fn from_payload(bytes: &Payload) -> Self {
        let stamp = Timestamp {
            month: bytes[0],
            day: bytes[1],
            hour: bytes[2],
            minute: bytes[3],
        };

        let mut readings = [0u16; READING_COUNT];
        for (i, reading) in readings.iter_mut().enumerate() {
            let offset = TIMESTAMP_SIZE + (i * 2);
            *reading = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        }

        Self { stamp, readings }
    }
}

impl From<&Payload> for DataSet {
    fn from(bytes: &Payload) -> Self {
        Self::from_payload(bytes)
    }
}

impl Display for DataSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[DataSet] {:02}-{:02} {:02}:{:02} readings: {:?}",
            self.stamp.month, self.stamp.day, self.stamp.hour, self.stamp.minute, self.readings
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_size() {
        assert_eq!(PAYLOAD_SIZE, 18, "payload must stay 18 bytes on media");
    }

    #[test]
    fn test_data_set_layout_is_big_endian() {
        let stamp = Timestamp {
            month: 2,
            day: 17,
            hour: 14,
            minute: 30,
        };
        let set = DataSet::new(stamp, [0x1234, 0, 0, 0, 0, 0, 0xBEEF]);
        let bytes = set.to_payload();

        assert_eq!(&bytes[..4], &[2, 17, 14, 30]);
        assert_eq!(&bytes[4..6], &[0x12, 0x34]);
        assert_eq!(&bytes[16..18], &[0xBE, 0xEF]);
        assert_eq!(DataSet::from_payload(&bytes), set);
    }
}
