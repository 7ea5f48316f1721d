//! Core bridge loop (business logic) for `mijia-bridge`.
//!
//! This module is decoupled from CLI wiring and process exit codes: the
//! [`Bridge`] owns the registry and the publish pipeline and is driven by an
//! [`AdvertisementStream`], so it can be tested with injected advertisements
//! and an in-memory broker.

use crate::board::DEFAULT_THERMAL_ZONE;
use crate::config::ConfigError;
use crate::frame::AdvertisementFrame;
use crate::publish::{PublishOutcome, Publisher, RetryPolicy};
use crate::registry::Registry;
use crate::scanner::{AdvertisementStream, DEFAULT_NAME_PREFIX, RawAdvertisement, ScanError};
use crate::scheduler::{DutyCycle, SleepMode, parse_duration};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration for the bridge process.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Device registry (JSON list of sensors).
    #[arg(long, default_value = "devices.json")]
    pub devices: PathBuf,

    /// Broker settings (JSON).
    #[arg(long, default_value = "mqtt.json")]
    pub mqtt: PathBuf,

    /// Only advertisements from devices whose name starts with this prefix are decoded.
    #[arg(long, default_value = DEFAULT_NAME_PREFIX)]
    pub name_prefix: String,

    /// Sleep after an advertisement while some device window is still open.
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub short_sleep: Duration,

    /// Sleep after every device has published once.
    #[arg(long, default_value = "1m", value_parser = parse_duration)]
    pub long_sleep: Duration,

    /// Wait before polling again when no advertisement was pending.
    #[arg(long, default_value = "50ms", value_parser = parse_duration)]
    pub listen_interval: Duration,

    /// Publish attempts per window before the bridge restarts.
    #[arg(long, default_value_t = crate::publish::DEFAULT_RETRY_ATTEMPTS,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub retry_attempts: u32,

    /// Delay between publish attempts.
    #[arg(long, default_value = "2s", value_parser = parse_duration)]
    pub retry_delay: Duration,

    /// Offset from UTC, in seconds, for the last-reset timestamp.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub utc_offset: i32,

    /// File holding the board temperature in millidegrees Celsius.
    #[arg(long, default_value = DEFAULT_THERMAL_ZONE)]
    pub thermal_zone: PathBuf,

    /// Verbose output, log every decoded reading and dropped frame
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Options {
    pub fn duty_cycle(&self) -> DutyCycle {
        DutyCycle {
            short: self.short_sleep,
            long: self.long_sleep,
            listen: self.listen_interval,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            delay: self.retry_delay,
        }
    }
}

/// Errors returned by the bridge.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// Publishing kept failing; only a full restart recovers the link.
    #[error("publish retries exhausted for {device}, restart required")]
    RestartRequired { device: String },
}

/// The bridge context: every piece of mutable state the loop touches.
pub struct Bridge {
    registry: Registry,
    publisher: Publisher,
    cycle: DutyCycle,
}

impl Bridge {
    pub fn new(registry: Registry, publisher: Publisher, cycle: DutyCycle) -> Self {
        Self {
            registry,
            publisher,
            cycle,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Decode, aggregate and maybe publish one advertisement, then pick the next sleep.
    ///
    /// Unknown devices, unknown data types and malformed frames are dropped
    /// here; only an exhausted publish budget is an error.
    pub async fn handle_advertisement(
        &mut self,
        adv: &RawAdvertisement,
    ) -> Result<SleepMode, RunError> {
        log::debug!(
            "{}: service data {}",
            adv.name,
            hex::encode(&adv.service_data)
        );
        self.process(adv).await?;
        Ok(self.cycle.after_advertisement(&mut self.registry))
    }

    async fn process(&mut self, adv: &RawAdvertisement) -> Result<(), RunError> {
        let frame = match AdvertisementFrame::parse(&adv.service_data) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("{}: dropping frame: {}", adv.name, e);
                return Ok(());
            }
        };

        let Some(device) = self.registry.lookup(&frame.mac) else {
            log::debug!("{} is not registered, ignoring", frame.mac);
            return Ok(());
        };

        let readings = match frame.readings() {
            Ok(readings) => readings,
            Err(e) => {
                log::warn!(
                    "{}: dropping {} frame: {}",
                    device.name(),
                    frame.data_type,
                    e
                );
                return Ok(());
            }
        };
        if readings.is_empty() {
            log::debug!(
                "{}: ignoring data type {}",
                device.name(),
                frame.data_type
            );
        }
        for reading in readings {
            log::debug!(
                "{}: {} {}",
                device.name(),
                reading.kind(),
                reading.value()
            );
            device.apply_reading(reading);
        }

        match self.publisher.try_publish_if_ready(device).await {
            PublishOutcome::RetriesExhausted => Err(RunError::RestartRequired {
                device: device.name().to_string(),
            }),
            PublishOutcome::NotReady | PublishOutcome::Published => Ok(()),
        }
    }

    /// Run until the scanner closes or publishing fails for good.
    pub async fn run(&mut self, stream: &mut AdvertisementStream) -> Result<(), RunError> {
        loop {
            let mode = match stream.try_next() {
                Ok(Some(adv)) => self.handle_advertisement(&adv).await?,
                Ok(None) => SleepMode::Listen,
                Err(ScanError::Closed) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            if mode == SleepMode::Long {
                log::info!(
                    "All {} devices published, sleeping {:?}",
                    self.registry.len(),
                    self.cycle.long
                );
            }
            tokio::time::sleep(self.cycle.duration(mode)).await;
        }
    }

    /// Mark every device offline before shutting down.
    pub async fn shutdown(&self) {
        self.publisher.announce_offline(&self.registry).await;
    }
}
