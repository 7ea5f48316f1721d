//! Diagnostics about the bridge host itself.

use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Default Linux thermal zone exposing the SoC temperature in millidegrees.
pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

const RESET_TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month padding:none]-[day padding:none]-[hour padding:none]-[minute padding:none]-[second padding:none]"
);

/// Source of the board's own temperature.
pub trait BoardSensor: Send + Sync {
    /// Temperature in Celsius, or `None` when unavailable.
    fn temperature(&self) -> Option<f64>;
}

/// Reads the temperature from a sysfs thermal zone.
#[derive(Debug, Clone)]
pub struct ThermalZone {
    path: PathBuf,
}

impl ThermalZone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BoardSensor for ThermalZone {
    fn temperature(&self) -> Option<f64> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let millis: f64 = raw.trim().parse().ok()?;
        Some(millis / 1000.0)
    }
}

/// Payload published to the board telemetry topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardTelemetry {
    pub temperature: f64,
    pub last_reset_ts: String,
}

impl BoardTelemetry {
    /// Sample the sensor; an unreadable sensor reports 0.0.
    pub fn sample(sensor: &dyn BoardSensor, last_reset_ts: &str) -> Self {
        let temperature = match sensor.temperature() {
            Some(t) => (t * 100.0).round_ties_even() / 100.0,
            None => {
                log::warn!("Unable to read board temperature");
                0.0
            }
        };
        Self {
            temperature,
            last_reset_ts: last_reset_ts.to_string(),
        }
    }
}

/// Format the start-up time as `Y-M-D-h-m-s` without zero padding.
pub fn format_reset_timestamp(at: OffsetDateTime) -> String {
    at.format(RESET_TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    struct Fixed(Option<f64>);

    impl BoardSensor for Fixed {
        fn temperature(&self) -> Option<f64> {
            self.0
        }
    }

    #[test]
    fn test_format_reset_timestamp() {
        let at = datetime!(2024-03-07 09:05:02 +3);
        assert_eq!(format_reset_timestamp(at), "2024-3-7-9-5-2");

        let at = datetime!(2024-12-31 23:59:59 UTC);
        assert_eq!(format_reset_timestamp(at), "2024-12-31-23-59-59");
    }

    #[test]
    fn test_sample_rounds_to_two_decimals() {
        let telemetry = BoardTelemetry::sample(&Fixed(Some(41.2345)), "2024-3-7-9-5-2");
        assert_eq!(telemetry.temperature, 41.23);
        assert_eq!(telemetry.last_reset_ts, "2024-3-7-9-5-2");
    }

    #[test]
    fn test_sample_ties_round_to_even() {
        let telemetry = BoardTelemetry::sample(&Fixed(Some(41.125)), "ts");
        assert_eq!(telemetry.temperature, 41.12);
    }

    #[test]
    fn test_sample_missing_sensor_is_zero() {
        let telemetry = BoardTelemetry::sample(&Fixed(None), "ts");
        assert_eq!(telemetry.temperature, 0.0);
    }

    #[test]
    fn test_thermal_zone_missing_file() {
        let zone = ThermalZone::new("/nonexistent/thermal_zone0/temp");
        assert_eq!(zone.temperature(), None);
    }

    #[test]
    fn test_serialized_shape() {
        let telemetry = BoardTelemetry {
            temperature: 40.5,
            last_reset_ts: "2024-3-7-9-5-2".into(),
        };
        assert_eq!(
            serde_json::to_string(&telemetry).unwrap(),
            r#"{"temperature":40.5,"last_reset_ts":"2024-3-7-9-5-2"}"#
        );
    }
}
