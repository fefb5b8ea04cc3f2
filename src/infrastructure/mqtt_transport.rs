// MQTT transport - QoS 0 publisher and channel-backed subscriber over rumqttc
use crate::application::errors::StartupError;
use crate::application::telemetry_repository::{InboundMessage, TelemetryPublisher};
use crate::infrastructure::config::AppConfig;
use anyhow::Context;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const REQUEST_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 256;
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Fire-and-forget publisher. Publishing never waits on the broker: when the
/// outgoing queue is full (for example while disconnected) the sample is
/// refused and the caller logs the drop.
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl TelemetryPublisher for MqttPublisher {
    async fn publish(&self, payload: Vec<u8>) -> anyhow::Result<()> {
        self.client
            .try_publish(self.topic.as_str(), QoS::AtMostOnce, false, payload)
            .with_context(|| format!("publish to '{}' refused", self.topic))
    }
}

impl MqttPublisher {
    /// Queue a DISCONNECT and wait up to `grace` for the event loop to send it
    /// and exit. Returns true when the loop finished in time.
    pub async fn disconnect(&self, grace: Duration) -> bool {
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "mqtt disconnect request not queued");
        }

        let handle = match self.event_loop.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return true;
        };

        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => {
                tracing::info!("mqtt disconnected");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "mqtt event loop task failed");
                false
            }
            Err(_) => {
                tracing::warn!(?grace, "mqtt disconnect not flushed in time");
                false
            }
        }
    }
}

pub fn client_id(cfg: &AppConfig, role: &str) -> String {
    cfg.mqtt_client_id
        .clone()
        .unwrap_or_else(|| format!("eaf-{}-{}", role, std::process::id()))
}

/// Connect and wait for the broker's ConnAck. Anything else within the
/// configured timeout is a fatal startup condition.
async fn connect(cfg: &AppConfig, client_id: String) -> Result<(AsyncClient, EventLoop), StartupError> {
    let mut options = MqttOptions::new(client_id, cfg.mqtt_host.as_str(), cfg.mqtt_port);
    options.set_keep_alive(KEEP_ALIVE);
    let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

    let handshake = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(_) => continue,
                Err(e) => return Err(e.to_string()),
            }
        }
    };

    let failure = |reason: String| StartupError::TransportConnect {
        addr: cfg.mqtt_addr(),
        reason,
    };
    let outcome = tokio::time::timeout(cfg.mqtt_connect_timeout(), handshake).await;
    match outcome {
        Ok(Ok(())) => {
            tracing::info!(addr = %cfg.mqtt_addr(), "connected to MQTT broker");
            Ok((client, eventloop))
        }
        Ok(Err(reason)) => Err(failure(reason)),
        Err(_) => Err(failure(format!("no ConnAck within {:?}", cfg.mqtt_connect_timeout()))),
    }
}

pub async fn connect_publisher(cfg: &AppConfig) -> Result<MqttPublisher, StartupError> {
    let (client, mut eventloop) = connect(cfg, client_id(cfg, "simulator")).await?;

    // Keep the connection serviced; rumqttc reconnects on the next poll after an error.
    let event_loop = tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => tracing::info!("mqtt reconnected"),
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "mqtt connection lost; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    });

    Ok(MqttPublisher {
        client,
        topic: cfg.mqtt_topic.clone(),
        event_loop: Mutex::new(Some(event_loop)),
    })
}

/// Connect, subscribe, and forward every publish on the topic into a bounded
/// channel. The subscription is renewed on every reconnect. The forwarding
/// task ends once the returned receiver is dropped.
pub async fn connect_subscriber(cfg: &AppConfig) -> Result<mpsc::Receiver<InboundMessage>, StartupError> {
    let (client, mut eventloop) = connect(cfg, client_id(cfg, "ingestion")).await?;
    let topic = cfg.mqtt_topic.clone();
    subscribe(&client, &topic);

    let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload,
                    };
                    if tx.send(message).await.is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("mqtt reconnected");
                    subscribe(&client, &topic);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "mqtt connection lost; retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
        tracing::debug!("mqtt subscriber task finished");
    });

    Ok(rx)
}

fn subscribe(client: &AsyncClient, topic: &str) {
    match client.try_subscribe(topic, QoS::AtMostOnce) {
        Ok(()) => tracing::info!(topic, "subscribed"),
        Err(e) => tracing::error!(topic, error = %e, "subscribe request not queued"),
    }
}
