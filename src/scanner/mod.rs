//! BLE advertisement source for MiJia sensors.
//!
//! Backends push matching advertisements into a bounded channel; the bridge
//! drains it one advertisement at a time through [`AdvertisementStream`].

#[cfg(feature = "bluer")]
pub mod bluer;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Advertised local name prefix of the MiJia thermometers.
pub const DEFAULT_NAME_PREFIX: &str = "MJ_HT_V";

/// Channel buffer size for pending advertisements.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// The backend stopped delivering advertisements
    #[error("scanner closed")]
    Closed,
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// An advertisement from a device whose name matched the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAdvertisement {
    pub name: String,
    /// Service data as broadcast: 16-bit UUID (little-endian) followed by the frame body.
    pub service_data: Vec<u8>,
}

/// Receiving end of a scanner backend.
#[derive(Debug)]
pub struct AdvertisementStream {
    rx: mpsc::Receiver<RawAdvertisement>,
}

impl AdvertisementStream {
    pub fn new(rx: mpsc::Receiver<RawAdvertisement>) -> Self {
        Self { rx }
    }

    /// A stream and the sender feeding it.
    pub fn channel() -> (mpsc::Sender<RawAdvertisement>, Self) {
        let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);
        (tx, Self::new(rx))
    }

    /// Take the next pending advertisement without waiting.
    ///
    /// Returns `Ok(None)` when nothing is pending and [`ScanError::Closed`]
    /// once the backend has gone away and the buffer is drained.
    pub fn try_next(&mut self) -> Result<Option<RawAdvertisement>, ScanError> {
        match self.rx.try_recv() {
            Ok(adv) => Ok(Some(adv)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ScanError::Closed),
        }
    }
}

/// Whether an advertised local name belongs to a supported sensor.
pub fn matches_prefix(name: Option<&str>, prefix: &str) -> bool {
    name.is_some_and(|n| n.starts_with(prefix))
}

/// Rebuild raw service data from a 16-bit service UUID and its payload.
pub fn service_data_bytes(uuid16: u16, data: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(data.len() + 2);
    bytes.extend_from_slice(&uuid16.to_le_bytes());
    bytes.extend_from_slice(data);
    bytes
}

/// Start scanning with the compiled-in backend.
pub async fn start_scan(name_prefix: &str) -> Result<AdvertisementStream, ScanError> {
    #[cfg(feature = "bluer")]
    return bluer::start_scan(name_prefix.to_string()).await;

    #[cfg(not(feature = "bluer"))]
    {
        let _ = name_prefix;
        Err(ScanError::BackendNotAvailable("bluer".into()))
    }
}
