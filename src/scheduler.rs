//! Two-speed duty cycling between advertisements.
//!
//! After every processed advertisement the bridge sleeps either briefly (more
//! windows still open) or for a long interval (every device has published
//! this cycle). When the scanner delivered nothing, it waits a separate,
//! much shorter listen interval before polling again.

use crate::registry::Registry;
use std::time::Duration;

pub const DEFAULT_SHORT_SLEEP: Duration = Duration::from_secs(1);
pub const DEFAULT_LONG_SLEEP: Duration = Duration::from_secs(60);
pub const DEFAULT_LISTEN_INTERVAL: Duration = Duration::from_millis(50);

/// What to do before the next scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepMode {
    /// At least one device still has an open window.
    Short,
    /// A full cycle across all devices completed.
    Long,
    /// No advertisement arrived during the scan tick.
    Listen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycle {
    pub short: Duration,
    pub long: Duration,
    pub listen: Duration,
}

impl Default for DutyCycle {
    fn default() -> Self {
        Self {
            short: DEFAULT_SHORT_SLEEP,
            long: DEFAULT_LONG_SLEEP,
            listen: DEFAULT_LISTEN_INTERVAL,
        }
    }
}

impl DutyCycle {
    /// Pick the sleep after a processed advertisement.
    ///
    /// Once every device has published, all flags are cleared together and the
    /// next cycle starts after a long sleep.
    pub fn after_advertisement(&self, registry: &mut Registry) -> SleepMode {
        if registry.all_published() {
            registry.reset_all_window_flags();
            SleepMode::Long
        } else {
            SleepMode::Short
        }
    }

    pub fn duration(&self, mode: SleepMode) -> Duration {
        match mode {
            SleepMode::Short => self.short,
            SleepMode::Long => self.long,
            SleepMode::Listen => self.listen,
        }
    }
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use mijia_bridge::scheduler::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("50ms").unwrap(), Duration::from_millis(50));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let number = |num: &str, unit: &str| -> Result<u64, String> {
        num.trim()
            .parse()
            .map_err(|_| format!("invalid {}: {}", unit, num))
    };

    let scaled = |num: &str, unit: &str, secs: u64| -> Result<Duration, String> {
        number(num, unit)?
            .checked_mul(secs)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("{} out of range: {}", unit, num.trim()))
    };

    if let Some(num) = src.strip_suffix("ms") {
        return Ok(Duration::from_millis(number(num, "milliseconds")?));
    }
    if let Some(num) = src.strip_suffix('h') {
        return scaled(num, "hours", 3600);
    }
    if let Some(num) = src.strip_suffix('m') {
        return scaled(num, "minutes", 60);
    }
    if let Some(num) = src.strip_suffix('s') {
        return Ok(Duration::from_secs(number(num, "seconds")?));
    }

    Ok(Duration::from_secs(number(src, "duration")?))
}
