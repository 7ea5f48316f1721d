//! Per-device configuration and rolling aggregation window.

use crate::reading::Reading;
use serde::Deserialize;

/// Static settings of one sensor, as loaded from `devices.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub mac: String,
    pub sensor_topic: String,
    #[serde(alias = "availability_topic")]
    pub avail_topic: String,
    /// Samples of both temperature and humidity required per window.
    pub average: u32,
    /// Loaded and validated, not used by the pipeline.
    pub timeout: u32,
    #[serde(deserialize_with = "crate::config::flag")]
    pub retain: bool,
}

/// Live state of one sensor: its configuration plus the current window.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub config: DeviceConfig,
    pub temp_sum: f64,
    pub temp_count: u32,
    pub rh_sum: f64,
    pub rh_count: u32,
    /// Last reported battery level, overwritten rather than averaged.
    pub battery: f64,
    /// Set once this device has published during the current duty cycle.
    pub window_published: bool,
}

impl DeviceState {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            temp_sum: 0.0,
            temp_count: 0,
            rh_sum: 0.0,
            rh_count: 0,
            battery: 0.0,
            window_published: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Fold one observation into the window.
    pub fn apply_reading(&mut self, reading: Reading) {
        match reading {
            Reading::Temperature(v) => {
                self.temp_sum += v;
                self.temp_count += 1;
            }
            Reading::Humidity(v) => {
                self.rh_sum += v;
                self.rh_count += 1;
            }
            Reading::Battery(v) => self.battery = v,
        }
    }

    /// True once enough temperature and humidity samples and a battery level have arrived.
    pub fn is_window_complete(&self) -> bool {
        let window = self.config.average;
        self.temp_count >= window && self.rh_count >= window && self.battery > 0.0
    }

    pub fn average_temp(&self) -> f64 {
        round1(self.temp_sum / f64::from(self.temp_count))
    }

    pub fn average_rh(&self) -> f64 {
        round1(self.rh_sum / f64::from(self.rh_count))
    }

    /// Clear accumulators and battery. Leaves `window_published` alone.
    pub fn reset_window(&mut self) {
        self.temp_sum = 0.0;
        self.temp_count = 0;
        self.rh_sum = 0.0;
        self.rh_count = 0;
        self.battery = 0.0;
    }
}

/// One decimal, ties to even.
fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::device_config;

    fn state(average: u32) -> DeviceState {
        DeviceState::new(device_config("kitchen", "A4:C1:38:00:00:01", average))
    }

    #[test]
    fn test_apply_reading_accumulates() {
        let mut device = state(2);
        device.apply_reading(Reading::Temperature(22.0));
        device.apply_reading(Reading::Temperature(23.0));
        device.apply_reading(Reading::Humidity(45.0));
        assert_eq!(device.temp_sum, 45.0);
        assert_eq!(device.temp_count, 2);
        assert_eq!(device.rh_sum, 45.0);
        assert_eq!(device.rh_count, 1);
    }

    #[test]
    fn test_battery_is_last_write_wins() {
        let mut device = state(1);
        device.apply_reading(Reading::Battery(90.0));
        device.apply_reading(Reading::Battery(85.0));
        assert_eq!(device.battery, 85.0);
    }

    #[test]
    fn test_window_incomplete_until_all_conditions_hold() {
        for average in 1..=3 {
            let mut device = state(average);
            assert!(!device.is_window_complete());

            for _ in 0..average {
                device.apply_reading(Reading::Temperature(20.0));
            }
            assert!(!device.is_window_complete(), "humidity missing");

            for _ in 0..average - 1 {
                device.apply_reading(Reading::Humidity(40.0));
            }
            device.apply_reading(Reading::Battery(50.0));
            assert!(!device.is_window_complete(), "humidity short by one");

            device.apply_reading(Reading::Humidity(40.0));
            assert!(device.is_window_complete());

            device.apply_reading(Reading::Battery(0.0));
            assert!(!device.is_window_complete(), "battery not positive");
        }
    }

    #[test]
    fn test_averages_round_to_one_decimal() {
        let mut device = state(3);
        for v in [22.0, 22.1, 22.3] {
            device.apply_reading(Reading::Temperature(v));
        }
        for v in [45.0, 45.5, 46.0] {
            device.apply_reading(Reading::Humidity(v));
        }
        assert_eq!(device.average_temp(), 22.1);
        assert_eq!(device.average_rh(), 45.5);
    }

    #[test]
    fn test_average_ties_round_to_even() {
        let mut device = state(2);
        device.apply_reading(Reading::Temperature(22.2));
        device.apply_reading(Reading::Temperature(22.3));
        device.apply_reading(Reading::Humidity(45.0));
        device.apply_reading(Reading::Humidity(45.1));
        assert_eq!(device.average_temp(), 22.2);
        assert_eq!(device.average_rh(), 45.0);

        device.reset_window();
        device.apply_reading(Reading::Temperature(22.3));
        device.apply_reading(Reading::Temperature(22.4));
        assert_eq!(device.average_temp(), 22.4);
    }

    #[test]
    fn test_reset_window_is_idempotent() {
        let mut device = state(1);
        device.apply_reading(Reading::Temperature(22.0));
        device.apply_reading(Reading::Humidity(45.0));
        device.apply_reading(Reading::Battery(90.0));
        device.window_published = true;

        device.reset_window();
        let once = device.clone();
        device.reset_window();

        assert_eq!(device, once);
        assert_eq!(device.temp_sum, 0.0);
        assert_eq!(device.rh_sum, 0.0);
        assert_eq!(device.temp_count, 0);
        assert_eq!(device.rh_count, 0);
        assert_eq!(device.battery, 0.0);
        assert!(device.window_published);
    }
}
