//! BlueZ D-Bus backend for MiJia scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{
    ADVERTISEMENT_CHANNEL_BUFFER_SIZE, AdvertisementStream, RawAdvertisement, ScanError,
    matches_prefix, service_data_bytes,
};
use crate::mac_address::MacAddress;
use bluer::{
    Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session, UuidExt,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start an LE discovery and forward service data from devices whose name
/// starts with `name_prefix`.
///
/// Duplicate reports are enabled so every broadcast arrives, not only the
/// first one per device. Advertisements arriving while the buffer is full
/// are dropped.
pub async fn start_scan(name_prefix: String) -> Result<AdvertisementStream, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        })
        .await?;

    let mut events = adapter.discover_devices_with_changes().await?;
    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);
    log::info!(
        "Scanning on {} for devices named {}*",
        adapter.name(),
        name_prefix
    );

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        let _session = session;

        while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };
            match process_device(&adapter, address, &name_prefix, &tx).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => log::debug!("{}: {}", MacAddress::from(address), e),
            }
        }
        log::warn!("BLE discovery stream ended");
    });

    Ok(AdvertisementStream::new(rx))
}

/// Forward a device's service data. Returns `false` once the receiver is gone.
async fn process_device(
    adapter: &Adapter,
    address: Address,
    name_prefix: &str,
    tx: &mpsc::Sender<RawAdvertisement>,
) -> Result<bool, ScanError> {
    let device = adapter.device(address)?;
    let name = device.name().await?;
    if !matches_prefix(name.as_deref(), name_prefix) {
        return Ok(true);
    }

    let Some(service_data) = device.service_data().await? else {
        return Ok(true);
    };

    for (uuid, data) in service_data {
        let Some(uuid16) = uuid.as_u16() else {
            continue;
        };
        let adv = RawAdvertisement {
            name: name.clone().unwrap_or_default(),
            service_data: service_data_bytes(uuid16, &data),
        };
        match tx.try_send(adv) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::debug!("advertisement buffer full, dropping {}", address)
            }
            Err(TrySendError::Closed(_)) => return Ok(false),
        }
    }

    Ok(true)
}
