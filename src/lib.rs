//! `mijia-bridge` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, wiring the real
//! scanner, broker and board sensor, and process exit codes. The decode →
//! aggregate → publish loop lives in [`crate::app`] where it can be tested
//! deterministically with injected advertisements and an in-memory broker.

pub mod app;
pub mod board;
pub mod config;
pub mod device;
pub mod frame;
pub mod mac_address;
pub mod mqtt;
pub mod publish;
pub mod reading;
pub mod registry;
pub mod scanner;
pub mod scheduler;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use app::{Bridge, Options, RunError};
pub use device::{DeviceConfig, DeviceState};
pub use frame::{AdvertisementFrame, DataType, DecodeError, decode_service_data, scale};
pub use mac_address::MacAddress;
pub use publish::{Broker, OutboundMessage, PublishError, PublishOutcome, Publisher, RetryPolicy};
pub use reading::Reading;
pub use registry::Registry;
pub use scanner::{AdvertisementStream, RawAdvertisement, ScanError};
pub use scheduler::{DutyCycle, SleepMode, parse_duration};
