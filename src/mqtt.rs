//! `rumqttc` implementation of the [`Broker`] capability.
//!
//! The rumqttc event loop is driven by a background task which also tracks
//! the connection state. Publishing while disconnected fails immediately so
//! the caller's retry budget reflects the real link state instead of piling
//! messages into the client's request queue.

use crate::config::BrokerConfig;
use crate::publish::{Broker, PublishError};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Capacity of the client request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Pause between reconnection attempts after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub fn mqtt_options(config: &BrokerConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    opts.set_keep_alive(Duration::from_secs(config.keep_alive));
    if let Some(user) = &config.user {
        opts.set_credentials(user.clone(), config.password.clone().unwrap_or_default());
    }
    opts
}

pub struct MqttBroker {
    client: AsyncClient,
    connected: watch::Receiver<bool>,
    eventloop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBroker {
    /// Create the client and spawn the task driving its event loop.
    pub fn connect(config: &BrokerConfig) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CHANNEL_CAPACITY);
        let (state_tx, connected) = watch::channel(false);
        let target = format!("{}:{}", config.host, config.port);
        let handle = tokio::spawn(drive(eventloop, state_tx, target));
        Self {
            client,
            connected,
            eventloop: Mutex::new(Some(handle)),
        }
    }

    /// Flush queued publishes, send DISCONNECT and stop the event loop.
    ///
    /// Publishing only queues a request for the event loop, so this must run
    /// before the process exits or queued messages are lost. Gives up after
    /// `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        let Some(task) = self.eventloop.lock().ok().and_then(|mut t| t.take()) else {
            return;
        };
        if !self.is_connected() {
            task.abort();
            return;
        }

        let finished = tokio::time::timeout(grace, async {
            if let Err(e) = self.client.disconnect().await {
                log::warn!("Could not request MQTT disconnect: {}", e);
            }
            task.await
        })
        .await;

        match finished {
            Ok(Ok(())) => log::info!("Disconnected from MQTT broker"),
            Ok(Err(e)) => log::warn!("MQTT event loop task failed: {}", e),
            Err(_) => log::warn!("MQTT event loop did not stop within {:?}", grace),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait up to `timeout` for the first successful connection.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut connected = self.connected.clone();
        matches!(
            tokio::time::timeout(timeout, connected.wait_for(|c| *c)).await,
            Ok(Ok(_))
        )
    }
}

impl Broker for MqttBroker {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: &'a [u8],
        retain: bool,
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
        Box::pin(async move {
            if !self.is_connected() {
                return Err(PublishError::NotConnected);
            }
            self.client
                .publish(topic, QoS::AtMostOnce, retain, payload.to_vec())
                .await
                .map_err(|e| PublishError::Client(e.to_string()))
        })
    }
}

async fn drive(mut eventloop: EventLoop, state: watch::Sender<bool>, target: String) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    log::info!("Connected to MQTT broker at {}", target);
                    state.send_replace(true);
                } else {
                    log::warn!("MQTT broker at {} refused connection: {:?}", target, ack.code);
                    state.send_replace(false);
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                log::warn!("MQTT broker at {} disconnected", target);
                state.send_replace(false);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                state.send_replace(false);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                if state.send_replace(false) {
                    log::warn!("Lost connection to MQTT broker at {}: {}", target, e);
                } else {
                    log::warn!("MQTT connection to {} failed: {}", target, e);
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
