use super::{PAYLOAD_SIZE, Payload, TIMESTAMP_SIZE, Timestamp};

/// Fold one sample into a running average.
///
/// Every 16-bit big-endian field after the timestamp prefix moves towards the
/// sample by `(new - old) / (sample_index + 1)`, rounded half away from zero.
/// Starting from `sample_index = 0` this tracks the arithmetic mean of all
/// samples folded since the last reset without storing them. The timestamp
/// bytes of `current` are carried through unchanged.
pub fn fold(current: &Payload, sample: &Payload, sample_index: u16) -> Payload {
    let mut updated = *current;
    let divisor = sample_index as i32 + 1;

    for i in (TIMESTAMP_SIZE..PAYLOAD_SIZE).step_by(2) {
        let old = u16::from_be_bytes([current[i], current[i + 1]]) as i32;
        let new = u16::from_be_bytes([sample[i], sample[i + 1]]) as i32;

        let value = old + rounded_div(new - old, divisor);

        // Always between old and new, so it fits back into 16 bits.
        updated[i..i + 2].copy_from_slice(&(value as u16).to_be_bytes());
    }

    updated
}

/// `delta / divisor` rounded half away from zero, symmetric in sign.
fn rounded_div(delta: i32, divisor: i32) -> i32 {
    let magnitude = (((delta.abs() << 1) / divisor) + 1) >> 1;
    if delta < 0 { -magnitude } else { magnitude }
}

/// The pending data set being averaged between two saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningAverage {
    buffer: Payload,
    samples: u16,
}

impl Default for RunningAverage {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningAverage {
    pub const fn new() -> Self {
        Self {
            buffer: [0; PAYLOAD_SIZE],
            samples: 0,
        }
    }

    /// Fold a new raw sample into the average.
    pub fn fold_in(&mut self, sample: &Payload) {
        self.buffer = fold(&self.buffer, sample, self.samples);
        self.samples = self.samples.saturating_add(1);
    }

    /// Write the save time into the timestamp prefix.
    pub fn stamp(&mut self, stamp: Timestamp) {
        self.buffer[0] = stamp.month;
        self.buffer[1] = stamp.day;
        self.buffer[2] = stamp.hour;
        self.buffer[3] = stamp.minute;
    }

    /// Clear the buffer, time fields included, and the sample counter.
    pub fn reset(&mut self) {
        self.buffer = [0; PAYLOAD_SIZE];
        self.samples = 0;
    }

    /// Number of samples folded since the last reset
    pub fn samples(&self) -> u16 {
        self.samples
    }

    pub fn payload(&self) -> &Payload {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DataSet;

    fn payload_with(value: u16) -> Payload {
        DataSet::new(Timestamp::default(), [value; 7]).to_payload()
    }

    fn first_reading(payload: &Payload) -> u16 {
        DataSet::from_payload(payload).readings[0]
    }

    #[test]
    fn test_fold_rounds_positive_delta() {
        let avg = fold(&payload_with(100), &payload_with(110), 1);
        assert_eq!(first_reading(&avg), 105);
    }

    #[test]
    fn test_fold_is_symmetric_for_negative_delta() {
        let avg = fold(&payload_with(100), &payload_with(90), 1);
        assert_eq!(first_reading(&avg), 95);
    }

    #[test]
    fn test_fold_rounds_half_away_from_zero() {
        // +3 / 2 = 1.5 -> 2, -3 / 2 = -1.5 -> -2
        assert_eq!(first_reading(&fold(&payload_with(100), &payload_with(103), 1)), 102);
        assert_eq!(first_reading(&fold(&payload_with(100), &payload_with(97), 1)), 98);
        // +1 / 3 = 0.33 -> 0
        assert_eq!(first_reading(&fold(&payload_with(100), &payload_with(101), 2)), 100);
    }

    #[test]
    fn test_fold_handles_full_range() {
        let avg = fold(&payload_with(0), &payload_with(u16::MAX), 0);
        assert_eq!(first_reading(&avg), u16::MAX);

        let avg = fold(&payload_with(u16::MAX), &payload_with(0), 1);
        assert_eq!(first_reading(&avg), 32767);
    }

    #[test]
    fn test_fold_leaves_timestamp_alone() {
        let mut current = payload_with(10);
        current[..4].copy_from_slice(&[1, 2, 3, 4]);
        let mut sample = payload_with(20);
        sample[..4].copy_from_slice(&[9, 9, 9, 9]);

        let avg = fold(&current, &sample, 0);
        assert_eq!(&avg[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_running_average_tracks_mean() {
        let mut avg = RunningAverage::new();
        for value in [100, 200, 300, 400, 500, 600] {
            avg.fold_in(&payload_with(value));
        }

        assert_eq!(avg.samples(), 6);
        assert_eq!(first_reading(avg.payload()), 350);
    }

    #[test]
    fn test_first_sample_replaces_cleared_buffer() {
        let mut avg = RunningAverage::new();
        avg.fold_in(&payload_with(1234));
        assert_eq!(first_reading(avg.payload()), 1234);
    }

    #[test]
    fn test_reset_clears_counter_and_stamp() {
        let mut avg = RunningAverage::new();
        avg.fold_in(&payload_with(42));
        avg.stamp(Timestamp {
            month: 3,
            day: 4,
            hour: 5,
            minute: 30,
        });
        assert_eq!(&avg.payload()[..4], &[3, 4, 5, 30]);

        avg.reset();
        assert_eq!(avg.samples(), 0);
        assert_eq!(avg.payload(), &[0; PAYLOAD_SIZE]);
    }
}
