//! Wall-clock interface consumed by the datalogger schedule

/// Calendar time as reported by the real-time clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeAndDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    /// Day of week, 1-7
    pub dow: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimeAndDate {
    /// Convenience constructor for the fields the datalogger actually stores.
    pub const fn at(month: u8, day: u8, hour: u8, minute: u8) -> Self {
        Self {
            year: 0,
            month,
            day,
            dow: 1,
            hour,
            minute,
            second: 0,
        }
    }
}

/// Source of the current wall-clock time.
///
/// Minute granularity drives all datalogger scheduling.
pub trait Clock {
    fn now(&mut self) -> TimeAndDate;
}
