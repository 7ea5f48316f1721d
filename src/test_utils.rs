use crate::device::{DeviceConfig, DeviceState};
use crate::mac_address::MacAddress;
use crate::publish::{Broker, OutboundMessage, PublishError};
use crate::registry::Registry;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xA4, 0xC1, 0x38, 0x0A, 0x0B, 0x0C]);

/// Build raw service data for `mac` with the given data type and payload.
pub fn frame_bytes(mac: MacAddress, data_type: [u8; 2], payload: &[u8]) -> Vec<u8> {
    let len = payload.len();
    let mut data = vec![0x95, 0xfe, 0x50, 0x20, 0xaa, 0x01, 0x42];
    data.extend_from_slice(&mac.reversed());
    data.extend_from_slice(&data_type);
    data.push((((len / 10) << 4) | (len % 10)) as u8);
    data.extend_from_slice(payload);
    data
}

/// Device settings with topics derived from `name`.
pub fn device_config(name: &str, mac: &str, average: u32) -> DeviceConfig {
    DeviceConfig {
        name: name.to_string(),
        mac: mac.to_string(),
        sensor_topic: format!("home/{name}/sensor"),
        avail_topic: format!("home/{name}/status"),
        average,
        timeout: 300,
        retain: true,
    }
}

/// Registry from `(name, mac, average)` triples.
pub fn registry(devices: &[(&str, &str, u32)]) -> Registry {
    Registry::new(devices.iter().map(|&(name, mac, average)| {
        (
            mac.parse().unwrap(),
            DeviceState::new(device_config(name, mac, average)),
        )
    }))
}

/// Records every publish; the first `fail_first` calls fail.
#[derive(Debug, Default)]
pub struct FakeBroker {
    fail_first: usize,
    calls: AtomicUsize,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl FakeBroker {
    pub fn failing(fail_first: usize) -> Self {
        Self {
            fail_first,
            ..Default::default()
        }
    }

    /// Number of publish calls, failed or not.
    pub fn attempts(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl Broker for FakeBroker {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a [u8],
        retain: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(PublishError::NotConnected);
            }
            self.sent.lock().unwrap().push(OutboundMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                retain,
            });
            Ok(())
        })
    }
}
