use crate::config::DataloggerConfig;

/// Minute-of-hour schedule for sampling and saving.
///
/// Both phases are aligned to multiples of their interval. Intervals must
/// divide 60, which [`DataloggerConfig::validate`] enforces, so adding the
/// interval modulo 60 always lands back on an aligned minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    sample_interval: u8,
    save_interval: u8,
    next_sample_minute: u8,
    next_save_minute: u8,
}

impl Schedule {
    /// Schedule the first sample and save after `minute`.
    pub fn starting_at(minute: u8, config: &DataloggerConfig) -> Self {
        Self {
            sample_interval: config.sample_interval_minutes,
            save_interval: config.save_interval_minutes,
            next_sample_minute: next_aligned(minute, config.sample_interval_minutes),
            next_save_minute: next_aligned(minute, config.save_interval_minutes),
        }
    }

    pub fn next_sample_minute(&self) -> u8 {
        self.next_sample_minute
    }

    pub fn next_save_minute(&self) -> u8 {
        self.next_save_minute
    }

    pub fn sample_due(&self, minute: u8) -> bool {
        minute == self.next_sample_minute
    }

    pub fn save_due(&self, minute: u8) -> bool {
        minute == self.next_save_minute
    }

    pub fn advance_sample(&mut self) {
        self.next_sample_minute = (self.next_sample_minute + self.sample_interval) % 60;
    }

    pub fn advance_save(&mut self) {
        self.next_save_minute = (self.next_save_minute + self.save_interval) % 60;
    }
}

/// First multiple of `interval` strictly after `minute`, wrapping to 0.
fn next_aligned(minute: u8, interval: u8) -> u8 {
    let interval = interval.max(1) as u16;
    let next = (minute as u16 / interval + 1) * interval;
    if next > 59 { 0 } else { next as u8 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_phases_are_aligned() {
        let schedule = Schedule::starting_at(17, &DataloggerConfig::default());
        assert_eq!(schedule.next_sample_minute(), 20);
        assert_eq!(schedule.next_save_minute(), 30);
    }

    #[test]
    fn test_start_on_boundary_waits_for_next_one() {
        let schedule = Schedule::starting_at(30, &DataloggerConfig::default());
        assert_eq!(schedule.next_sample_minute(), 35);
        assert_eq!(schedule.next_save_minute(), 0);
    }

    #[test]
    fn test_late_start_wraps_to_top_of_hour() {
        let schedule = Schedule::starting_at(58, &DataloggerConfig::default());
        assert_eq!(schedule.next_sample_minute(), 0);
        assert_eq!(schedule.next_save_minute(), 0);
    }

    #[test]
    fn test_advance_wraps_modulo_hour() {
        let mut schedule = Schedule::starting_at(50, &DataloggerConfig::default());
        assert_eq!(schedule.next_sample_minute(), 55);
        schedule.advance_sample();
        assert_eq!(schedule.next_sample_minute(), 0);
        schedule.advance_sample();
        assert_eq!(schedule.next_sample_minute(), 5);

        assert!(schedule.save_due(0));
        schedule.advance_save();
        assert!(schedule.save_due(30));
        assert!(!schedule.save_due(0));
    }
}
