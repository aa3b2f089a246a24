use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::message_manager::MqttMessage;

/// Every subscription and publish uses the "exactly once" level
pub const QOS: QoS = QoS::ExactlyOnce;

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("MQTT client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("MQTT connection failed: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct MqttStatus {
    pub messages_received: usize,
    pub publishes_sent: usize,
    pub publishes_completed: usize,
    pub last_activity: Option<chrono::DateTime<chrono::Local>>,
}

/// Publishing side of the client, shared with whoever handles operator input
pub trait Publisher {
    fn publish_text(
        &self,
        topic: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), MqttError>> + Send;
}

/// Cloneable request side of the connection
#[derive(Clone)]
pub struct MqttHandle {
    client: AsyncClient,
    subbed_topics: Vec<String>,
    state: watch::Receiver<ConnectionState>,
    publishes_queued: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl MqttHandle {
    pub async fn subscribe_all(&self) -> Result<(), MqttError> {
        for topic in &self.subbed_topics {
            self.client.subscribe(topic.as_str(), QOS).await?;
            info!("Subscribed to {}", topic);
        }
        Ok(())
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Asks the event loop to finish every queued publish, disconnect and
    /// return.
    pub fn request_shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.cancel();
    }
}

impl Publisher for MqttHandle {
    async fn publish_text(&self, topic: &str, text: &str) -> Result<(), MqttError> {
        debug!("Publishing {:?} to {}", text, topic);
        self.client
            .publish(topic, QOS, false, text.as_bytes().to_vec())
            .await?;
        self.publishes_queued.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Owns the rumqttc event loop. Must be driven with [`MqttHandler::run`],
/// otherwise no request issued through the handle reaches the broker.
pub struct MqttHandler {
    client: AsyncClient,
    eventloop: EventLoop,
    state: watch::Sender<ConnectionState>,
    status: MqttStatus,
    publishes_queued: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl MqttHandler {
    pub fn new(config: &MqttConfig) -> (MqttHandle, MqttHandler) {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        mqtt_options.set_keep_alive(config.keep_alive);

        info!(
            "Connecting to {}:{} as {}",
            config.host, config.port, config.client_id
        );
        let (client, eventloop) = AsyncClient::new(mqtt_options, config.channel_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let publishes_queued = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();

        let handle = MqttHandle {
            client: client.clone(),
            subbed_topics: config.subbed_topics.clone(),
            state: state_rx,
            publishes_queued: publishes_queued.clone(),
            shutdown: shutdown.clone(),
        };
        let handler = MqttHandler {
            client,
            eventloop,
            state: state_tx,
            status: MqttStatus::default(),
            publishes_queued,
            shutdown,
        };
        (handle, handler)
    }

    /// Drives the connection, forwarding every received publish on `msg_out`.
    ///
    /// Returns `Ok` after a requested shutdown or once the receiving side is
    /// dropped, and the connection error otherwise; there is no reconnect.
    pub async fn run(mut self, msg_out: mpsc::Sender<MqttMessage>) -> Result<(), MqttError> {
        let result = self.drive(msg_out).await;
        info!(
            "MQTT session ended: {} received, {} of {} publishes completed, last activity {:?}",
            self.status.messages_received,
            self.status.publishes_completed,
            self.status.publishes_sent,
            self.status.last_activity
        );
        result
    }

    async fn drive(&mut self, msg_out: mpsc::Sender<MqttMessage>) -> Result<(), MqttError> {
        let mut stopping = false;
        let mut disconnecting = false;

        loop {
            let polled = tokio::select! {
                polled = self.eventloop.poll() => polled,
                _ = self.shutdown.cancelled(), if !stopping => {
                    stopping = true;
                    if self.publishes_drained() {
                        disconnecting = self.disconnect()?;
                    }
                    continue;
                }
            };

            let event = match polled {
                Ok(event) => event,
                Err(e) if disconnecting => {
                    debug!("Connection closed after disconnect: {}", e);
                    self.state.send_replace(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(e) => {
                    error!("Connection error: {}", e);
                    self.state.send_replace(ConnectionState::Failed);
                    return Err(e.into());
                }
            };

            match event {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    info!("Connected to broker: {:?}", ack.code);
                    self.state.send_replace(ConnectionState::Connected);
                }
                Event::Incoming(Packet::SubAck(ack)) => {
                    debug!("Subscription acknowledged: {:?}", ack.return_codes);
                }
                Event::Incoming(Packet::Publish(publish)) => {
                    let msg = MqttMessage::from_publish(publish.topic.clone(), &publish.payload);
                    self.status.messages_received += 1;
                    self.status.last_activity = Some(chrono::Local::now());
                    debug!(
                        "Received message #{} on {}",
                        self.status.messages_received, msg.topic
                    );
                    if msg_out.send(msg).await.is_err() {
                        warn!("Message receiver dropped, stopping event loop");
                        self.state.send_replace(ConnectionState::Disconnected);
                        return Ok(());
                    }
                }
                Event::Incoming(Packet::PubComp(comp)) => {
                    self.status.publishes_completed += 1;
                    self.status.last_activity = Some(chrono::Local::now());
                    debug!("Publish complete (pkid {})", comp.pkid);
                }
                Event::Incoming(Packet::Disconnect) => {
                    warn!("Broker sent disconnect");
                    self.state.send_replace(ConnectionState::Disconnected);
                }
                Event::Outgoing(Outgoing::Publish(pkid)) => {
                    self.status.publishes_sent += 1;
                    self.status.last_activity = Some(chrono::Local::now());
                    debug!("Publish sent (pkid {})", pkid);
                }
                Event::Outgoing(Outgoing::Disconnect) => {
                    info!("Disconnected from broker");
                    self.state.send_replace(ConnectionState::Disconnected);
                    return Ok(());
                }
                _ => {}
            }

            if stopping && !disconnecting && self.publishes_drained() {
                disconnecting = self.disconnect()?;
            }
        }
    }

    /// Every publish queued through the handle went out and finished its
    /// QoS 2 handshake
    fn publishes_drained(&self) -> bool {
        let queued = self.publishes_queued.load(Ordering::Acquire);
        self.status.publishes_sent >= queued
            && self.status.publishes_completed >= self.status.publishes_sent
    }

    // try_ variant: awaiting here would block on the channel this loop drains
    fn disconnect(&self) -> Result<bool, MqttError> {
        debug!("All publishes completed, disconnecting");
        self.client.try_disconnect()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
        let header = stream.read_u8().await.ok()?;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.ok()?;
            len |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; len];
        stream.read_exact(&mut body).await.ok()?;
        Some((header, body))
    }

    // skips keep-alive pings
    async fn next_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
        loop {
            let packet = read_packet(stream).await?;
            if packet.0 != 0xc0 {
                return Some(packet);
            }
            stream.write_all(&[0xd0, 0x00]).await.ok()?;
        }
    }

    fn read_str(body: &[u8], at: usize) -> (String, usize) {
        let len = u16::from_be_bytes([body[at], body[at + 1]]) as usize;
        let text = String::from_utf8(body[at + 2..at + 2 + len].to_vec()).unwrap();
        (text, at + 2 + len)
    }

    fn local_config(port: u16) -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port,
            keep_alive: Duration::from_secs(5),
            client_id: "sensor-console-test".to_string(),
            subbed_topics: vec!["sensor1/light".to_string(), "sensor1/temperature".to_string()],
            channel_capacity: 10,
        }
    }

    #[tokio::test]
    async fn handle_starts_disconnected() {
        let config = MqttConfig::from_app_config(&AppConfig::default());
        let (handle, _handler) = MqttHandler::new(&config);

        assert_eq!(*handle.state().borrow(), ConnectionState::Disconnected);
        assert_eq!(
            handle.subbed_topics,
            vec!["sensor1/light", "sensor1/temperature"]
        );
    }

    #[tokio::test]
    async fn subscribes_and_publishes_exactly_once_then_drains_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (handle, handler) = MqttHandler::new(&local_config(port));
        let (msg_tx, _msg_rx) = mpsc::channel(10);
        let event_loop = tokio::spawn(handler.run(msg_tx));

        handle.subscribe_all().await.unwrap();
        handle.publish_text("sensor1/ledState", "ON").await.unwrap();

        let broker = async {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (header, _) = next_packet(&mut stream).await.unwrap();
            assert_eq!(header, 0x10, "expected CONNECT");
            stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

            let mut subscribed = Vec::new();
            for _ in 0..2 {
                let (header, body) = next_packet(&mut stream).await.unwrap();
                assert_eq!(header, 0x82, "expected SUBSCRIBE");
                let (topic, end) = read_str(&body, 2);
                assert_eq!(body[end] & 0x03, 2, "subscription QoS for {}", topic);
                subscribed.push(topic);
            }
            assert_eq!(subscribed, vec!["sensor1/light", "sensor1/temperature"]);

            let (header, body) = next_packet(&mut stream).await.unwrap();
            assert_eq!(header & 0xf0, 0x30, "expected PUBLISH");
            assert_eq!((header >> 1) & 0x03, 2, "publish QoS");
            assert_eq!(header & 0x01, 0, "publish must not be retained");
            let (topic, end) = read_str(&body, 0);
            assert_eq!(topic, "sensor1/ledState");
            let pkid = [body[end], body[end + 1]];
            assert_eq!(&body[end + 2..], b"ON");

            handle.request_shutdown();
            // shutdown must wait for the handshake to finish
            stream.write_all(&[0x50, 0x02, pkid[0], pkid[1]]).await.unwrap();
            let (header, _) = next_packet(&mut stream).await.unwrap();
            assert_eq!(header, 0x62, "expected PUBREL");
            stream.write_all(&[0x70, 0x02, pkid[0], pkid[1]]).await.unwrap();

            if let Some((header, _)) = next_packet(&mut stream).await {
                assert_eq!(header, 0xe0, "expected DISCONNECT");
            }
        };

        tokio::time::timeout(Duration::from_secs(10), broker)
            .await
            .expect("broker exchange timed out");
        let result = tokio::time::timeout(Duration::from_secs(10), event_loop)
            .await
            .expect("event loop did not stop")
            .unwrap();
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(*handle.state().borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn refused_connection_is_returned() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let (handle, handler) = MqttHandler::new(&local_config(port));
        let (msg_tx, _msg_rx) = mpsc::channel(10);

        let result = tokio::time::timeout(Duration::from_secs(10), handler.run(msg_tx))
            .await
            .expect("event loop did not stop");

        assert!(matches!(result, Err(MqttError::Connection(_))));
        assert_eq!(*handle.state().borrow(), ConnectionState::Failed);
    }
}
