//! MQTT session: discovery, command handling and state reports

use crate::config::{BridgeConfig, DeviceConfig};
use crate::discovery::{DiscoveryPayload, Topics, PAYLOAD_OFF, PAYLOAD_ON};
use crate::error::BridgeError;
use crate::relay::Pulser;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Outgoing side of the MQTT connection
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), BridgeError>;

    async fn subscribe(&self, topic: &str) -> Result<(), BridgeError>;
}

#[async_trait]
impl Publisher for AsyncClient {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), BridgeError> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), BridgeError> {
        AsyncClient::subscribe(self, topic, QoS::AtLeastOnce).await?;
        Ok(())
    }
}

/// One garage door console exposed as a Home Assistant switch
#[derive(Clone)]
pub struct Bridge {
    topics: Topics,
    discovery: Arc<str>,
    publisher: Arc<dyn Publisher>,
    relay: Arc<dyn Pulser>,
}

impl Bridge {
    pub fn new(
        device: &DeviceConfig,
        publisher: Arc<dyn Publisher>,
        relay: Arc<dyn Pulser>,
    ) -> Result<Self, BridgeError> {
        let topics = Topics::for_device(&device.id);
        let discovery = DiscoveryPayload::new(device, &topics).to_json()?;
        Ok(Self {
            topics,
            discovery: discovery.into(),
            publisher,
            relay,
        })
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Current switch state as reported over MQTT
    pub fn state(&self) -> &'static str {
        if self.relay.is_active() {
            PAYLOAD_ON
        } else {
            PAYLOAD_OFF
        }
    }

    /// Subscribe to commands, then announce the device and its state
    ///
    /// Runs after every (re)connect; the discovery and state messages are
    /// retained so Home Assistant picks them up whenever it starts.
    pub async fn announce(&self) -> Result<(), BridgeError> {
        self.publisher.subscribe(&self.topics.command).await?;
        self.publisher
            .publish(&self.topics.discovery, &self.discovery, true)
            .await?;
        self.publish_state(self.state()).await?;
        info!(topic = %self.topics.command, "Announced garage door switch");
        Ok(())
    }

    /// Press the console button for any command payload
    ///
    /// The console toggles the door on every press, so `ON` and `OFF` are
    /// treated alike. Besides the `OFF` report after the press, the switch
    /// also reports `ON` while the relay is held; that extra retained `ON`
    /// goes beyond a plain press-then-report cycle.
    pub async fn handle_command(&self, payload: &[u8]) -> Result<(), BridgeError> {
        info!(payload = %String::from_utf8_lossy(payload), "Garage door command received");

        self.publish_state(PAYLOAD_ON).await?;
        let pulsed = self.relay.pulse().await;
        self.publish_state(PAYLOAD_OFF).await?;

        pulsed?;
        Ok(())
    }

    async fn publish_state(&self, state: &str) -> Result<(), BridgeError> {
        debug!(state, "Publishing switch state");
        self.publisher.publish(&self.topics.state, state, true).await
    }
}

fn mqtt_options(config: &BridgeConfig) -> MqttOptions {
    let mqtt = &config.mqtt;
    let mut options = MqttOptions::new(config.client_id(), mqtt.broker.clone(), mqtt.port);
    options.set_keep_alive(config.keepalive());
    if let Some(username) = &mqtt.username {
        options.set_credentials(username.clone(), mqtt.password.clone().unwrap_or_default());
    }
    options
}

/// Run the bridge until `shutdown` resolves
///
/// Connection errors are logged and retried; the event loop reconnects on
/// the next poll.
pub async fn run(
    config: &BridgeConfig,
    relay: Arc<dyn Pulser>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), BridgeError> {
    let (client, mut event_loop) = AsyncClient::new(mqtt_options(config), REQUEST_CHANNEL_CAPACITY);
    let bridge = Bridge::new(&config.device, Arc::new(client.clone()), relay)?;

    info!(
        broker = %config.mqtt.broker,
        port = config.mqtt.port,
        device = %config.device.id,
        "Connecting to MQTT broker"
    );

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down bridge");
                break;
            }
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to MQTT broker");
                    // Requests are queued on the client; awaiting them here
                    // would stall the event loop that drains the queue.
                    let bridge = bridge.clone();
                    tokio::spawn(async move {
                        if let Err(err) = bridge.announce().await {
                            error!(%err, "Failed to announce device");
                        }
                    });
                }
                Ok(Event::Incoming(Packet::Publish(publish)))
                    if publish.topic == bridge.topics().command =>
                {
                    let bridge = bridge.clone();
                    tokio::spawn(async move {
                        if let Err(err) = bridge.handle_command(&publish.payload).await {
                            error!(%err, "Failed to operate garage door");
                        }
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "MQTT connection error, retrying");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    if let Err(err) = client.try_disconnect() {
        debug!(%err, "Disconnect request not sent");
    }
    Ok(())
}
