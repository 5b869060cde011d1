//! MQTT channel, the transport seam of the device client.
//!
//! The device client is single-threaded and pumps inbound messages one at
//! a time, so the `Channel` trait is synchronous: publishes are queued
//! without waiting and `try_recv` never blocks. `MqttChannel` bridges this
//! onto a rumqttc `AsyncClient` whose event loop runs on a tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::runtime::Handle;

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};
use crate::tls;

// ── Channel trait ─────────────────────────────────────────────

/// A publish received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Per-connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Access token, or the provisioning sentinel.
    pub username: String,
    pub password: Option<String>,
}

/// Abstraction for MQTT connect, publish, subscribe and receive.
///
/// Enables mocking in tests without a real MQTT broker. Delivery is
/// at-most-once; callers own any retry policy.
pub trait Channel {
    /// Open a session and authenticate. Replaces any previous session.
    fn connect(&self, params: &ConnectParams) -> MqttResult<()>;

    /// Close the current session, if any.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Publish a raw payload to a topic.
    fn publish(&self, topic: &str, payload: &[u8]) -> MqttResult<()>;

    /// Subscribe to a topic filter.
    fn subscribe(&self, filter: &str) -> MqttResult<()>;

    /// Remove a topic filter.
    fn unsubscribe(&self, filter: &str) -> MqttResult<()>;

    /// Take the next pending inbound message without blocking.
    fn try_recv(&self) -> Option<InboundMessage>;
}

impl<C: Channel + ?Sized> Channel for Arc<C> {
    fn connect(&self, params: &ConnectParams) -> MqttResult<()> {
        (**self).connect(params)
    }

    fn disconnect(&self) {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> MqttResult<()> {
        (**self).publish(topic, payload)
    }

    fn subscribe(&self, filter: &str) -> MqttResult<()> {
        (**self).subscribe(filter)
    }

    fn unsubscribe(&self, filter: &str) -> MqttResult<()> {
        (**self).unsubscribe(filter)
    }

    fn try_recv(&self) -> Option<InboundMessage> {
        (**self).try_recv()
    }
}

// ── MqttChannel ───────────────────────────────────────────────

/// MQTT channel backed by rumqttc.
///
/// Each `connect` creates a fresh `AsyncClient` and spawns its event loop
/// on the supplied runtime. Inbound publishes are forwarded over a std
/// channel so `try_recv` can be called from a plain thread.
pub struct MqttChannel {
    config: MqttConfig,
    runtime: Handle,
    session: Mutex<Option<Session>>,
}

struct Session {
    client: AsyncClient,
    inbound: mpsc::Receiver<InboundMessage>,
    connected: Arc<AtomicBool>,
}

impl MqttChannel {
    pub fn new(config: MqttConfig, runtime: Handle) -> Self {
        Self {
            config,
            runtime,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn options(&self, params: &ConnectParams) -> MqttResult<MqttOptions> {
        let mut options = MqttOptions::new(&params.client_id, &params.host, params.port);
        options.set_keep_alive(Duration::from_secs(self.config.keepalive_secs.into()));
        options.set_max_packet_size(self.config.max_packet_size, self.config.max_packet_size);
        options.set_clean_session(true);
        options.set_credentials(
            params.username.clone(),
            params.password.clone().unwrap_or_default(),
        );

        if self.config.use_tls {
            options.set_transport(tls::load_tls_transport(&self.config)?);
        } else {
            tracing::debug!(host = %params.host, "MQTT plaintext mode (no TLS)");
        }
        Ok(options)
    }
}

impl Channel for MqttChannel {
    fn connect(&self, params: &ConnectParams) -> MqttResult<()> {
        self.disconnect();

        let options = self.options(params)?;
        let (client, eventloop) = AsyncClient::new(options, 64);
        let (inbound_tx, inbound_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let connected = Arc::new(AtomicBool::new(false));

        self.runtime.spawn(drive(
            eventloop,
            inbound_tx,
            ready_tx,
            Arc::clone(&connected),
        ));

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(())) => {
                tracing::info!(host = %params.host, port = params.port, "MQTT connected");
                *self.session() = Some(Session {
                    client,
                    inbound: inbound_rx,
                    connected,
                });
                Ok(())
            }
            Ok(Err(reason)) => Err(MqttError::Connection(reason)),
            Err(_) => {
                // Dropping the client closes the request channel and stops the loop.
                let _ = client.try_disconnect();
                Err(MqttError::Connection(format!(
                    "no CONNACK within {}s",
                    self.config.connect_timeout_secs
                )))
            }
        }
    }

    fn disconnect(&self) {
        if let Some(session) = self.session().take() {
            session.connected.store(false, Ordering::SeqCst);
            if let Err(e) = session.client.try_disconnect() {
                tracing::debug!(error = %e, "MQTT disconnect request not queued");
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.session()
            .as_ref()
            .is_some_and(|s| s.connected.load(Ordering::SeqCst))
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> MqttResult<()> {
        let guard = self.session();
        let session = guard.as_ref().ok_or(MqttError::NotConnected)?;
        session
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    fn subscribe(&self, filter: &str) -> MqttResult<()> {
        let guard = self.session();
        let session = guard.as_ref().ok_or(MqttError::NotConnected)?;
        session
            .client
            .try_subscribe(filter, QoS::AtMostOnce)
            .map_err(|e| MqttError::Subscribe(e.to_string()))
    }

    fn unsubscribe(&self, filter: &str) -> MqttResult<()> {
        let guard = self.session();
        let session = guard.as_ref().ok_or(MqttError::NotConnected)?;
        session
            .client
            .try_unsubscribe(filter)
            .map_err(|e| MqttError::Unsubscribe(e.to_string()))
    }

    fn try_recv(&self) -> Option<InboundMessage> {
        self.session().as_ref()?.inbound.try_recv().ok()
    }
}

/// Drive one session's event loop until the connection drops.
///
/// The first CONNACK (or the first error before it) is reported on
/// `ready`. The loop does not reconnect: the host decides when to retry.
async fn drive(
    mut eventloop: EventLoop,
    inbound: mpsc::Sender<InboundMessage>,
    ready: mpsc::Sender<Result<(), String>>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::SeqCst);
                let _ = ready.send(Ok(()));
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                if inbound.send(message).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                if !connected.swap(false, Ordering::SeqCst) {
                    let _ = ready.send(Err(e.to_string()));
                }
                tracing::warn!(error = %e, "MQTT event loop stopped");
                break;
            }
        }
    }
}
