//! Mock MQTT channel for testing without a real broker.
//!
//! Records all connects, publishes and subscription changes for assertion
//! in tests, and can play a scripted broker: queued inbound messages plus
//! an optional responder that reacts to each publish.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::channel::{Channel, ConnectParams, InboundMessage};
use crate::error::{MqttError, MqttResult};

/// A recorded publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// Payload decoded as JSON (`Null` if it is not JSON).
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

type Responder = Box<dyn FnMut(&PublishedMessage) -> Vec<InboundMessage> + Send>;

#[derive(Default)]
struct State {
    connected: bool,
    connects: Vec<ConnectParams>,
    published: Vec<PublishedMessage>,
    subscriptions: Vec<String>,
    unsubscribed: Vec<String>,
    inbound: VecDeque<InboundMessage>,
    refuse_connect: bool,
    fail_subscribe: Option<String>,
    fail_publish_prefix: Option<String>,
}

/// Mock implementation of the `Channel` trait.
///
/// Stores everything in memory behind a `Mutex` (fine for test contexts).
pub struct MockChannel {
    state: Mutex<State>,
    responder: Mutex<Option<Responder>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            responder: Mutex::new(None),
        }
    }

    // ── Scripting ────────────────────────────────────────────

    /// Queue an inbound message for the next `try_recv`.
    pub fn push_inbound(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .unwrap()
            .inbound
            .push_back(InboundMessage::new(topic, payload));
    }

    /// React to every publish with zero or more inbound messages.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(&PublishedMessage) -> Vec<InboundMessage> + Send + 'static,
    {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    /// Make every subsequent `connect` fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_connect = refuse;
    }

    /// Make `subscribe` fail for one filter.
    pub fn fail_subscribe(&self, filter: &str) {
        self.state.lock().unwrap().fail_subscribe = Some(filter.to_string());
    }

    /// Make `publish` fail for topics starting with `prefix`.
    pub fn fail_publish(&self, prefix: &str) {
        self.state.lock().unwrap().fail_publish_prefix = Some(prefix.to_string());
    }

    /// Simulate the broker dropping the connection.
    pub fn drop_connection(&self) {
        self.state.lock().unwrap().connected = false;
    }

    // ── Inspection ───────────────────────────────────────────

    /// Get all connect calls, in order.
    pub fn connects(&self) -> Vec<ConnectParams> {
        self.state.lock().unwrap().connects.clone()
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().published.clone()
    }

    /// Get the last published message.
    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.state.lock().unwrap().published.last().cloned()
    }

    /// Get published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Get published messages whose topic starts with `prefix`.
    pub fn published_with_prefix(&self, prefix: &str) -> Vec<PublishedMessage> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|m| m.topic.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Get the currently installed subscription filters.
    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    /// Get every filter passed to `unsubscribe`, in order.
    pub fn unsubscribed(&self) -> Vec<String> {
        self.state.lock().unwrap().unsubscribed.clone()
    }

    /// Check whether a subscription is installed for the given filter.
    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .any(|f| f == filter)
    }

    /// Number of inbound messages not yet received.
    pub fn pending_inbound(&self) -> usize {
        self.state.lock().unwrap().inbound.len()
    }

    /// Clear all recorded state (scripted failures are kept).
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.connects.clear();
        state.published.clear();
        state.subscriptions.clear();
        state.unsubscribed.clear();
        state.inbound.clear();
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for MockChannel {
    fn connect(&self, params: &ConnectParams) -> MqttResult<()> {
        let mut state = self.state.lock().unwrap();
        state.connects.push(params.clone());
        if state.refuse_connect {
            state.connected = false;
            return Err(MqttError::Connection("connection refused".into()));
        }
        state.connected = true;
        Ok(())
    }

    fn disconnect(&self) {
        self.state.lock().unwrap().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> MqttResult<()> {
        let message = PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        {
            let mut state = self.state.lock().unwrap();
            if !state.connected {
                return Err(MqttError::NotConnected);
            }
            if state
                .fail_publish_prefix
                .as_deref()
                .is_some_and(|prefix| topic.starts_with(prefix))
            {
                return Err(MqttError::Publish(format!("rejected publish to {topic}")));
            }
            state.published.push(message.clone());
        }

        // Responder runs outside the state lock.
        let replies = match self.responder.lock().unwrap().as_mut() {
            Some(responder) => responder(&message),
            None => Vec::new(),
        };
        self.state.lock().unwrap().inbound.extend(replies);
        Ok(())
    }

    fn subscribe(&self, filter: &str) -> MqttResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(MqttError::NotConnected);
        }
        if state.fail_subscribe.as_deref() == Some(filter) {
            return Err(MqttError::Subscribe(format!("rejected filter {filter}")));
        }
        if !state.subscriptions.iter().any(|f| f == filter) {
            state.subscriptions.push(filter.to_string());
        }
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> MqttResult<()> {
        let mut state = self.state.lock().unwrap();
        state.unsubscribed.push(filter.to_string());
        if !state.connected {
            return Err(MqttError::NotConnected);
        }
        state.subscriptions.retain(|f| f != filter);
        Ok(())
    }

    fn try_recv(&self) -> Option<InboundMessage> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return None;
        }
        state.inbound.pop_front()
    }
}
