use core::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Initialization options for the datalogger, combined as a bitmask.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct InitMode(u8);

impl InitMode {
    /// Search for previously written data sets and append after them.
    pub const APPEND: Self = Self(0x01);
    /// Restart data collection at page 0, offset 0.
    pub const OVERWRITE: Self = Self(0x02);
    /// If the device is full, restart data collection at page 0, offset 0.
    pub const RESTART_IF_FULL: Self = Self(0x04);
    /// If the device is full, do not start collecting data.
    pub const STOP_IF_FULL: Self = Self(0x08);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for InitMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for InitMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Datalogger timing and startup configuration.
///
/// Both intervals are minutes within the hour and must divide 60 evenly:
/// the schedule advances by simple modulo-60 arithmetic on the clock minute.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct DataloggerConfig {
    /// Minutes between samples folded into the running average
    pub sample_interval_minutes: u8,
    /// Minutes between averaged records written to flash
    pub save_interval_minutes: u8,
    /// Mode used when the logger is brought up at boot
    pub init_mode: InitMode,
}

impl Default for DataloggerConfig {
    fn default() -> Self {
        Self {
            sample_interval_minutes: 5,
            save_interval_minutes: 30,
            init_mode: InitMode::APPEND | InitMode::RESTART_IF_FULL,
        }
    }
}

impl DataloggerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !divides_hour(self.sample_interval_minutes) {
            return Err(ConfigError::InvalidSampleInterval(
                self.sample_interval_minutes,
            ));
        }
        if !divides_hour(self.save_interval_minutes) {
            return Err(ConfigError::InvalidSaveInterval(self.save_interval_minutes));
        }
        Ok(())
    }
}

// An interval of 60 would schedule the next event on the same minute again.
const fn divides_hour(minutes: u8) -> bool {
    minutes > 0 && minutes < 60 && 60 % minutes == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DataloggerConfig::default();
        assert_eq!(config.sample_interval_minutes, 5);
        assert_eq!(config.save_interval_minutes, 30);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_rejects_intervals_not_dividing_hour() {
        let config = DataloggerConfig {
            save_interval_minutes: 25,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidSaveInterval(25)));

        let config = DataloggerConfig {
            sample_interval_minutes: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidSampleInterval(0)));

        let config = DataloggerConfig {
            save_interval_minutes: 60,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidSaveInterval(60)));
    }

    #[test]
    fn test_init_mode_flags() {
        let mode = InitMode::APPEND | InitMode::RESTART_IF_FULL;
        assert!(mode.contains(InitMode::APPEND));
        assert!(mode.contains(InitMode::RESTART_IF_FULL));
        assert!(!mode.contains(InitMode::OVERWRITE));
        assert_eq!(mode.bits(), 0x05);
    }

    #[test]
    fn test_config_from_json_uses_defaults_for_missing_fields() {
        let config: DataloggerConfig =
            serde_json::from_str(r#"{ "save_interval_minutes": 15, "init_mode": 2 }"#).unwrap();

        assert_eq!(config.sample_interval_minutes, 5);
        assert_eq!(config.save_interval_minutes, 15);
        assert_eq!(config.init_mode, InitMode::OVERWRITE);
    }
}
