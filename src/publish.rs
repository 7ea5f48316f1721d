//! Outbound messages and the bounded-retry publish pipeline.
//!
//! A completed window produces an ordered batch: the averaged reading, an
//! availability marker and, when configured, board telemetry. The batch is
//! sent as one attempt; a failure anywhere in it retries the whole batch.

use crate::board::{BoardSensor, BoardTelemetry};
use crate::device::DeviceState;
use crate::registry::Registry;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("not connected to broker")]
    NotConnected,
    #[error("broker client error: {0}")]
    Client(String),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Capability to hand one message to the broker.
pub trait Broker: Send + Sync {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a [u8],
        retain: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>>;
}

/// Averaged reading published to a device's sensor topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorPayload {
    pub temperature: f64,
    pub humidity: f64,
    pub battery: f64,
    pub average: u32,
}

impl SensorPayload {
    pub fn from_window(device: &DeviceState) -> Self {
        Self {
            temperature: device.average_temp(),
            humidity: device.average_rh(),
            battery: device.battery,
            average: device.config.average,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    /// JSON-encoded payload.
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl OutboundMessage {
    pub fn json<T: Serialize + ?Sized>(
        topic: &str,
        payload: &T,
        retain: bool,
    ) -> Result<Self, PublishError> {
        Ok(Self {
            topic: topic.to_string(),
            payload: serde_json::to_vec(payload)?,
            retain,
        })
    }
}

impl fmt::Display for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <- {}{}",
            self.topic,
            String::from_utf8_lossy(&self.payload),
            if self.retain { " (retained)" } else { "" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Board telemetry destination and its data sources.
pub struct BoardTarget {
    pub topic: String,
    pub sensor: Box<dyn BoardSensor>,
    pub last_reset_ts: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The window is still open; nothing was sent.
    NotReady,
    /// The batch was delivered and the window reset.
    Published,
    /// Every attempt failed. The window is left untouched.
    RetriesExhausted,
}

pub struct Publisher {
    broker: Arc<dyn Broker>,
    retry: RetryPolicy,
    board: Option<BoardTarget>,
}

impl Publisher {
    pub fn new(broker: Arc<dyn Broker>, retry: RetryPolicy, board: Option<BoardTarget>) -> Self {
        Self {
            broker,
            retry,
            board,
        }
    }

    /// Build the batch for a device whose window is complete.
    pub fn build_messages(
        &self,
        device: &DeviceState,
    ) -> Result<Vec<OutboundMessage>, PublishError> {
        let retain = device.config.retain;
        let mut messages = vec![
            OutboundMessage::json(
                &device.config.sensor_topic,
                &SensorPayload::from_window(device),
                retain,
            )?,
            OutboundMessage::json(&device.config.avail_topic, ONLINE, retain)?,
        ];

        if let Some(board) = &self.board {
            let telemetry = BoardTelemetry::sample(board.sensor.as_ref(), &board.last_reset_ts);
            messages.push(OutboundMessage::json(&board.topic, &telemetry, true)?);
        }

        Ok(messages)
    }

    /// Publish the device's window if it is complete.
    pub async fn try_publish_if_ready(&self, device: &mut DeviceState) -> PublishOutcome {
        if !device.is_window_complete() {
            return PublishOutcome::NotReady;
        }

        let messages = match self.build_messages(device) {
            Ok(messages) => messages,
            Err(e) => {
                log::error!("{}: could not build messages: {}", device.name(), e);
                return PublishOutcome::RetriesExhausted;
            }
        };

        for attempt in 1..=self.retry.attempts {
            match self.send_all(&messages).await {
                Ok(()) => {
                    for message in &messages {
                        log::info!("{}: sent {}", device.name(), message);
                    }
                    device.window_published = true;
                    device.reset_window();
                    return PublishOutcome::Published;
                }
                Err(e) => {
                    log::warn!(
                        "{}: publish attempt {}/{} failed: {}",
                        device.name(),
                        attempt,
                        self.retry.attempts,
                        e
                    );
                    if attempt < self.retry.attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }

        log::error!(
            "{}: retry attempts exceeded, giving up on broker",
            device.name()
        );
        PublishOutcome::RetriesExhausted
    }

    async fn send_all(&self, messages: &[OutboundMessage]) -> Result<(), PublishError> {
        for message in messages {
            self.broker
                .publish(&message.topic, &message.payload, message.retain)
                .await?;
        }
        Ok(())
    }

    /// Mark every device offline. Best effort, single attempt per device.
    pub async fn announce_offline(&self, registry: &Registry) {
        for (_, device) in registry.iter() {
            let result = match OutboundMessage::json(
                &device.config.avail_topic,
                OFFLINE,
                device.config.retain,
            ) {
                Ok(message) => self.send_all(std::slice::from_ref(&message)).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                log::warn!("{}: could not announce offline: {}", device.name(), e);
            }
        }
    }
}
