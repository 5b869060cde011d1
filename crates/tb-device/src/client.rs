//! The device client: session lifecycle, inbound routing and the
//! outbound publishing API.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tb_mqtt_channel::{Channel, ConnectParams, IncomingMessage, classify};
use tb_protocol::attributes::AttributeRequest;
use tb_protocol::claim::ClaimRequest;
use tb_protocol::firmware::{FirmwareInfo, FirmwareState, FirmwareStateReport};
use tb_protocol::provision::{CredentialsType, PROVISION_SENTINEL, ProvisionRequest, ProvisionResponse};
use tb_protocol::value::to_object;
use tb_protocol::{DEFAULT_PAYLOAD_CAPACITY, KeyValue, encode_capped, topics};

use crate::attributes::{AttributeFetch, SharedAttributeSnapshot};
use crate::callbacks::{CallbackTable, Callbacks};
use crate::clock::{Clock, SystemClock};
use crate::config_store::ConfigStore;
use crate::error::{ClientError, ClientResult};
use crate::firmware::{FirmwareDescriptor, FirmwareTransfer, FirmwareUpdate};
use crate::flash::FlashWriter;
use crate::flow::{POLL_INTERVAL_MS, Poll};
use crate::provision::{ProvisionFlow, ProvisionOutcome, ProvisioningState};
use crate::rpc;

/// How the device authenticates on connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Normal mode. The token `"provision"` still selects provisioning mode.
    AccessToken(String),
    /// Provisioning mode with the identity to register.
    Provision(ProvisionRequest),
}

impl Credential {
    pub fn provision(device_name: &str, key: &str, secret: &str) -> Self {
        Self::Provision(ProvisionRequest {
            device_name: device_name.to_string(),
            provision_device_key: key.to_string(),
            provision_device_secret: secret.to_string(),
        })
    }

    /// MQTT username presented to the broker.
    pub fn username(&self) -> &str {
        match self {
            Self::AccessToken(token) => token,
            Self::Provision(_) => PROVISION_SENTINEL,
        }
    }

    pub fn is_provisioning(&self) -> bool {
        self.username() == PROVISION_SENTINEL
    }
}

/// Where a single key/value goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataScope {
    Telemetry,
    Attributes,
}

impl DataScope {
    fn topic(self) -> &'static str {
        match self {
            Self::Telemetry => topics::TELEMETRY,
            Self::Attributes => topics::ATTRIBUTES,
        }
    }
}

/// Device-side protocol client over a `Channel`.
///
/// Single-threaded: the host calls `pump` (or one of the blocking flows)
/// and every handler runs to completion on the calling thread.
pub struct DeviceClient<C: Channel> {
    channel: C,
    clock: Box<dyn Clock>,
    flash: Option<Box<dyn FlashWriter>>,
    store: Option<Box<dyn ConfigStore>>,
    callbacks: CallbackTable,
    routing_active: bool,
    provisioning_mode: bool,
    provisioning: ProvisioningState,
    attribute_request_id: u32,
    attribute_messages: u64,
    last_attributes: Option<Map<String, JsonValue>>,
    snapshot: SharedAttributeSnapshot,
    transfer: FirmwareTransfer,
    payload_capacity: usize,
}

impl<C: Channel> DeviceClient<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            clock: Box::new(SystemClock::new()),
            flash: None,
            store: None,
            callbacks: CallbackTable::default(),
            routing_active: false,
            provisioning_mode: false,
            provisioning: ProvisioningState::NotSent,
            attribute_request_id: 0,
            attribute_messages: 0,
            last_attributes: None,
            snapshot: SharedAttributeSnapshot::default(),
            transfer: FirmwareTransfer::default(),
            payload_capacity: DEFAULT_PAYLOAD_CAPACITY,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_flash(mut self, flash: impl FlashWriter + 'static) -> Self {
        self.flash = Some(Box::new(flash));
        self
    }

    pub fn with_config_store(mut self, store: impl ConfigStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_payload_capacity(mut self, capacity: usize) -> Self {
        self.payload_capacity = capacity;
        self
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Whether the current session was opened with the provisioning sentinel.
    pub fn is_provisioning_mode(&self) -> bool {
        self.provisioning_mode
    }

    pub fn is_subscribed(&self) -> bool {
        self.routing_active
    }

    pub fn provisioning_state(&self) -> ProvisioningState {
        self.provisioning
    }

    pub fn shared_attributes(&self) -> &SharedAttributeSnapshot {
        &self.snapshot
    }

    pub fn transfer(&self) -> &FirmwareTransfer {
        &self.transfer
    }

    /// Number of attribute messages routed so far.
    pub fn attribute_messages(&self) -> u64 {
        self.attribute_messages
    }

    pub fn last_attributes(&self) -> Option<&Map<String, JsonValue>> {
        self.last_attributes.as_ref()
    }

    // ── Session ───────────────────────────────────────────────

    /// Open a session, replacing any previous one.
    ///
    /// Previous subscriptions and callbacks are dropped first. On failure
    /// no session remains.
    pub fn connect(
        &mut self,
        host: &str,
        credential: &Credential,
        port: u16,
        client_id: &str,
    ) -> ClientResult<()> {
        if host.is_empty() {
            return Err(ClientError::InvalidArgument("host"));
        }

        self.teardown();

        self.provisioning_mode = credential.is_provisioning();
        if self.provisioning_mode {
            self.provisioning = ProvisioningState::NotSent;
        }

        let params = ConnectParams {
            host: host.to_string(),
            port,
            client_id: client_id.to_string(),
            username: credential.username().to_string(),
            password: None,
        };
        if let Err(e) = self.channel.connect(&params) {
            self.channel.disconnect();
            tracing::error!(host, port, error = %e, "connect failed");
            return Err(e.into());
        }

        tracing::info!(host, port, provisioning = self.provisioning_mode, "session opened");
        Ok(())
    }

    /// Install callbacks and subscribe the fixed topic set.
    ///
    /// A failure part-way leaves the earlier filters subscribed; the next
    /// `connect` or `disconnect` removes them.
    pub fn subscribe(&mut self, callbacks: Callbacks) -> ClientResult<()> {
        if self.routing_active {
            return Err(ClientError::AlreadySubscribed);
        }
        let table = CallbackTable::install(callbacks)?;
        if !self.channel.is_connected() {
            return Err(ClientError::NotConnected);
        }

        for filter in topics::SUBSCRIPTIONS {
            self.channel.subscribe(filter)?;
        }

        tracing::info!(rpc_handlers = table.len(), "subscriptions active");
        self.callbacks = table;
        self.routing_active = true;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.teardown();
        tracing::info!("session closed");
    }

    fn teardown(&mut self) {
        if self.channel.is_connected() {
            for filter in topics::SUBSCRIPTIONS {
                if let Err(e) = self.channel.unsubscribe(filter) {
                    tracing::debug!(filter, error = %e, "unsubscribe failed");
                }
            }
        }
        self.channel.disconnect();
        self.callbacks = CallbackTable::default();
        self.routing_active = false;
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Route at most one pending inbound message. Returns whether one was
    /// taken off the channel.
    pub fn pump(&mut self) -> bool {
        let Some(message) = self.channel.try_recv() else {
            return false;
        };
        if !self.routing_active {
            tracing::debug!(topic = %message.topic, "routing inactive, message dropped");
            return true;
        }

        match classify(message) {
            IncomingMessage::RpcRequest { topic, request } => {
                let reply = rpc::dispatch(&mut self.callbacks, &topic, &request, self.payload_capacity);
                if let Some(reply) = reply {
                    if let Err(e) = self.channel.publish(&reply.topic, &reply.payload) {
                        tracing::warn!(topic = %reply.topic, error = %e, "RPC reply not sent");
                    }
                }
            }
            IncomingMessage::AttributeUpdate(update) => self.on_attributes(update),
            IncomingMessage::ProvisionResponse(response) => self.on_provision_response(response),
            IncomingMessage::FirmwareChunk { index, data } => {
                let flash = self.flash.as_deref_mut().map(|f| f as &mut dyn FlashWriter);
                self.transfer.handle_chunk(index, &data, flash);
            }
            IncomingMessage::Malformed { topic, reason } => {
                tracing::warn!(topic = %topic, reason = %reason, "malformed message dropped");
            }
            IncomingMessage::Unknown { topic } => {
                tracing::debug!(topic = %topic, "ignoring unrecognized message");
            }
        }
        true
    }

    fn on_attributes(&mut self, update: Map<String, JsonValue>) {
        tracing::debug!(keys = update.len(), "attribute update received");
        self.snapshot.merge(&update);
        self.attribute_messages += 1;
        if let Some(handler) = self.callbacks.attribute_handler() {
            handler(&update);
        }
        self.last_attributes = Some(update);
    }

    fn on_provision_response(&mut self, response: ProvisionResponse) {
        if self.provisioning.is_processed() {
            tracing::warn!(status = %response.status, "provisioning already processed, response ignored");
            return;
        }

        let outcome = if response.is_success() {
            tracing::info!(credentials = ?response.credentials_type, "provisioning accepted");
            self.apply_credentials(&response)
        } else {
            tracing::error!(
                status = %response.status,
                error = response.error_msg.as_deref().unwrap_or(""),
                "provisioning rejected"
            );
            ProvisionOutcome::Error
        };
        self.provisioning
            .advance(ProvisioningState::Processed(outcome));
    }

    fn apply_credentials(&mut self, response: &ProvisionResponse) -> ProvisionOutcome {
        match response.credentials_type {
            Some(CredentialsType::AccessToken) => match response.access_token() {
                Some(token) => self.persist_access_token(token),
                None => {
                    tracing::error!("ACCESS_TOKEN response without a token");
                    ProvisionOutcome::Error
                }
            },
            Some(CredentialsType::MqttBasic) => {
                // TODO: reconnect with the issued clientId/userName/password.
                tracing::warn!("MQTT_BASIC credentials are not implemented");
                ProvisionOutcome::Success
            }
            Some(CredentialsType::X509Certificate) => {
                tracing::error!("X509 certificate credentials are not supported");
                ProvisionOutcome::Success
            }
            Some(CredentialsType::Unknown) | None => {
                tracing::warn!("provisioning response has no usable credentials type");
                ProvisionOutcome::Success
            }
        }
    }

    fn persist_access_token(&mut self, token: &str) -> ProvisionOutcome {
        let Some(store) = self.store.as_ref() else {
            tracing::error!("no config store, provisioned token not saved");
            return ProvisionOutcome::Error;
        };
        let result = store.load().and_then(|mut config| {
            config.access_token = token.to_string();
            store.save(&config)
        });
        match result {
            Ok(()) => {
                tracing::info!("provisioned access token saved");
                ProvisionOutcome::Success
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to save provisioned token");
                ProvisionOutcome::Error
            }
        }
    }

    // ── Outbound ──────────────────────────────────────────────

    pub(crate) fn publish_raw(&self, topic: &str, payload: &[u8]) -> ClientResult<()> {
        if !self.channel.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.channel.publish(topic, payload)?;
        Ok(())
    }

    fn publish_json<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> ClientResult<()> {
        let payload = encode_capped(value, self.payload_capacity)?;
        self.publish_raw(topic, &payload)
    }

    pub fn send_telemetry(&self, pairs: &[KeyValue]) -> ClientResult<()> {
        self.publish_json(topics::TELEMETRY, &to_object(pairs))
    }

    pub fn send_telemetry_json(&self, document: &JsonValue) -> ClientResult<()> {
        self.publish_json(topics::TELEMETRY, document)
    }

    pub fn send_attributes(&self, pairs: &[KeyValue]) -> ClientResult<()> {
        self.publish_json(topics::ATTRIBUTES, &to_object(pairs))
    }

    pub fn send_attributes_json(&self, document: &JsonValue) -> ClientResult<()> {
        self.publish_json(topics::ATTRIBUTES, document)
    }

    pub fn send_keyval(&self, scope: DataScope, pair: &KeyValue) -> ClientResult<()> {
        self.publish_json(scope.topic(), pair)
    }

    /// Ask for shared attributes. Returns the request number used in the
    /// topic; responses are not correlated with it.
    pub fn request_shared_attributes(&mut self, keys: &[&str]) -> ClientResult<u32> {
        self.attribute_request_id = self.attribute_request_id.wrapping_add(1);
        let id = self.attribute_request_id;
        let request = AttributeRequest::new(keys.iter().copied());
        self.publish_json(&topics::attributes_request(id), &request)?;
        Ok(id)
    }

    pub fn send_provision_request(&mut self, device_name: &str, key: &str, secret: &str) -> ClientResult<()> {
        let request = ProvisionRequest {
            device_name: device_name.to_string(),
            provision_device_key: key.to_string(),
            provision_device_secret: secret.to_string(),
        };
        self.publish_json(topics::PROVISION_REQUEST, &request)?;
        self.provisioning.advance(ProvisioningState::Sent);
        tracing::info!(device = device_name, "provisioning request sent");
        Ok(())
    }

    pub fn send_claim_request(&self, secret_key: &str, duration_ms: u64) -> ClientResult<()> {
        let request = ClaimRequest {
            secret_key: secret_key.to_string(),
            duration_ms,
        };
        self.publish_json(topics::CLAIM, &request)
    }

    pub fn send_firmware_info(&self, title: &str, version: &str) -> ClientResult<()> {
        let info = FirmwareInfo {
            current_fw_title: title.to_string(),
            current_fw_version: version.to_string(),
        };
        self.publish_json(topics::TELEMETRY, &info)
    }

    pub fn send_firmware_state(&self, state: FirmwareState) -> ClientResult<()> {
        self.publish_json(
            topics::TELEMETRY,
            &FirmwareStateReport {
                current_fw_state: state,
            },
        )
    }

    // ── Blocking flows ────────────────────────────────────────

    /// Run the provisioning handshake to completion. `None` on timeout.
    pub fn provision(
        &mut self,
        device_name: &str,
        key: &str,
        secret: &str,
    ) -> ClientResult<Option<ProvisionOutcome>> {
        let mut flow = ProvisionFlow::new(device_name, key, secret);
        loop {
            match flow.poll(self)? {
                Poll::Pending => self.clock.sleep(POLL_INTERVAL_MS),
                Poll::Done(outcome) => return Ok(Some(outcome)),
                Poll::TimedOut => return Ok(None),
            }
        }
    }

    /// Request shared attributes and wait for a reply. `None` on timeout.
    pub fn fetch_shared_attributes(
        &mut self,
        keys: &[&str],
        timeout_ms: u64,
    ) -> ClientResult<Option<Map<String, JsonValue>>> {
        let mut fetch = AttributeFetch::new(keys, timeout_ms);
        loop {
            match fetch.poll(self)? {
                Poll::Pending => self.clock.sleep(POLL_INTERVAL_MS),
                Poll::Done(attributes) => return Ok(Some(attributes)),
                Poll::TimedOut => return Ok(None),
            }
        }
    }

    /// Run one OTA update attempt and return the reported final state.
    pub fn firmware_update(&mut self, current_title: &str, current_version: &str) -> ClientResult<FirmwareState> {
        let mut update = FirmwareUpdate::new(current_title, current_version);
        loop {
            match update.poll(self)? {
                Poll::Pending => self.clock.sleep(POLL_INTERVAL_MS),
                Poll::Done(state) => return Ok(state),
                Poll::TimedOut => return Ok(FirmwareState::Failed),
            }
        }
    }

    // ── Firmware engine hooks ─────────────────────────────────

    pub(crate) fn begin_firmware_check(&mut self) {
        self.transfer.disarm(self.flash.as_deref_mut().map(|f| f as &mut dyn FlashWriter));
        self.snapshot.clear();
    }

    pub(crate) fn arm_transfer(&mut self, descriptor: FirmwareDescriptor) {
        self.transfer.arm(descriptor);
    }

    pub(crate) fn end_firmware_check(&mut self) {
        self.transfer.disarm(self.flash.as_deref_mut().map(|f| f as &mut dyn FlashWriter));
    }

    pub(crate) fn clear_last_chunk(&mut self) {
        self.transfer.clear_last_chunk();
    }

    pub(crate) fn last_chunk(&self) -> Option<u32> {
        self.transfer.last_chunk()
    }

    pub(crate) fn transfer_status(&self) -> Option<FirmwareState> {
        self.transfer.status()
    }
}
