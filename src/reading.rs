//! Sensor observations decoded from a single advertisement.

/// One observation from a MiJia sensor, already scaled to its decimal value.
///
/// - Temperature in Celsius
/// - Relative humidity in percent
/// - Battery level in percent (as reported, after the digit-count scaling)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Temperature(f64),
    Humidity(f64),
    Battery(f64),
}

impl Reading {
    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Reading::Temperature(_) => "temperature",
            Reading::Humidity(_) => "humidity",
            Reading::Battery(_) => "battery",
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            Reading::Temperature(v) | Reading::Humidity(v) | Reading::Battery(v) => v,
        }
    }
}
