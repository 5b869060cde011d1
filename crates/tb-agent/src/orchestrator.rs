//! Connection orchestration: provisioning, normal sessions, and the
//! periodic work done while online.
//!
//! The agent is a single-threaded loop around one `DeviceClient`. Every
//! call to `tick` does a bounded amount of work, so a shutdown request is
//! noticed within one poll interval (or one blocking flow).

use chrono::{DateTime, Utc};
use tb_device::flow::POLL_INTERVAL_MS;
use tb_device::{
    Callbacks, Clock, ConfigStore, Credential, DeviceClient, DeviceConfig, FlashWriter, Poll,
    ProvisionFlow, ProvisionOutcome,
};
use tb_mqtt_channel::Channel;
use tb_protocol::firmware::FirmwareState;

use crate::client_attributes;
use crate::config::AgentConfig;
use crate::handlers;
use crate::signals::AgentSignals;
use crate::telemetry::{self, TelemetryTimer};

/// Why the agent loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Shutdown,
    /// A restart was requested, by RPC or after a firmware install.
    Reboot,
}

pub struct Agent<C: Channel, S: ConfigStore + Clone + 'static> {
    client: DeviceClient<C>,
    store: S,
    config: AgentConfig,
    signals: AgentSignals,
    booted_at: DateTime<Utc>,
    started_ms: u64,
    telemetry: TelemetryTimer,
    retry_at_ms: Option<u64>,
}

impl<C: Channel, S: ConfigStore + Clone + 'static> Agent<C, S> {
    pub fn new(
        channel: C,
        store: S,
        flash: impl FlashWriter + 'static,
        clock: impl Clock + 'static,
        config: AgentConfig,
        signals: AgentSignals,
    ) -> Self {
        let client = DeviceClient::new(channel)
            .with_clock(clock)
            .with_flash(flash)
            .with_config_store(store.clone());
        let started_ms = client.now_ms();
        let telemetry = TelemetryTimer::new(config.telemetry_interval_secs, started_ms);
        Self {
            client,
            store,
            config,
            signals,
            booted_at: Utc::now(),
            started_ms,
            telemetry,
            retry_at_ms: None,
        }
    }

    pub fn client(&self) -> &DeviceClient<C> {
        &self.client
    }

    pub fn signals(&self) -> &AgentSignals {
        &self.signals
    }

    /// Run until shutdown or a reboot request.
    pub fn run(&mut self) -> Exit {
        tracing::info!(
            title = %self.config.firmware_title,
            version = %self.config.firmware_version,
            "agent loop started"
        );
        loop {
            if let Some(exit) = self.tick() {
                tracing::info!(?exit, "agent loop stopped");
                return exit;
            }
        }
    }

    /// Do one unit of work.
    pub fn tick(&mut self) -> Option<Exit> {
        if self.signals.shutdown_requested() {
            self.client.disconnect();
            return Some(Exit::Shutdown);
        }

        if !self.client.is_connected() || !self.client.is_subscribed() {
            self.reconnect();
            return None;
        }

        if !self.client.pump() {
            self.client.clock().sleep(POLL_INTERVAL_MS);
        }

        if self.signals.take_reboot() {
            self.client.disconnect();
            return Some(Exit::Reboot);
        }
        if self.signals.take_attribute_sync() {
            self.sync_attributes();
        }
        if self.signals.take_firmware_check() && self.check_firmware() {
            self.client.disconnect();
            return Some(Exit::Reboot);
        }
        if self.telemetry.due(self.client.now_ms()) {
            let uptime_secs = self.client.now_ms().saturating_sub(self.started_ms) / 1000;
            if let Err(e) = telemetry::report(&self.client, uptime_secs) {
                tracing::warn!(error = %e, "failed to publish telemetry");
            }
        }
        None
    }

    fn reconnect(&mut self) {
        let now = self.client.now_ms();
        if self.retry_at_ms.is_some_and(|at| now < at) {
            self.client.clock().sleep(POLL_INTERVAL_MS);
            return;
        }
        match self.establish() {
            Ok(true) => self.retry_at_ms = None,
            Ok(false) => self.schedule_retry(),
            Err(e) => {
                tracing::warn!(error = %e, "connection attempt failed");
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        let delay_ms = self.config.reconnect_interval_secs.saturating_mul(1000);
        self.retry_at_ms = Some(self.client.now_ms().saturating_add(delay_ms));
        tracing::debug!(delay_ms, "next connection attempt scheduled");
    }

    /// Returns `Ok(true)` when the next tick may proceed without waiting.
    fn establish(&mut self) -> anyhow::Result<bool> {
        let mut device = self.store.load()?;

        if device.has_access_token() {
            self.go_online(&device)?;
            return Ok(true);
        }
        if device.prov_sent {
            tracing::warn!(device = %device.name, "provisioning request sent but no token stored, will provision again");
            device.prov_sent = false;
            self.store.save(&device)?;
            return Ok(false);
        }
        self.provision(&device)
    }

    fn go_online(&mut self, device: &DeviceConfig) -> anyhow::Result<()> {
        let credential = Credential::AccessToken(device.access_token.clone());
        self.client
            .connect(&device.broker, &credential, device.port, &self.config.mqtt.client_id)?;
        self.client.subscribe(handlers::device_callbacks(
            self.store.clone(),
            self.signals.clone(),
        ))?;

        self.signals.request_firmware_check();
        self.signals.request_attribute_sync();
        tracing::info!(device = %device.name, broker = %device.broker, "device online");
        Ok(())
    }

    fn provision(&mut self, device: &DeviceConfig) -> anyhow::Result<bool> {
        if device.provision_device_key.is_empty() || device.provision_device_secret.is_empty() {
            tracing::warn!(device = %device.name, "no access token and no provisioning credentials");
            return Ok(false);
        }

        let credential = Credential::provision(
            &device.name,
            &device.provision_device_key,
            &device.provision_device_secret,
        );
        self.client
            .connect(&device.broker, &credential, device.port, &self.config.mqtt.client_id)?;
        let outcome = self.run_provisioning(device);
        self.client.disconnect();

        match outcome? {
            Some(ProvisionOutcome::Success) => {
                tracing::info!(device = %device.name, "device provisioned");
                Ok(true)
            }
            Some(ProvisionOutcome::Error) | None => Ok(false),
        }
    }

    fn run_provisioning(&mut self, device: &DeviceConfig) -> anyhow::Result<Option<ProvisionOutcome>> {
        self.client.subscribe(Callbacks::new())?;

        let mut flow = ProvisionFlow::new(
            &device.name,
            &device.provision_device_key,
            &device.provision_device_secret,
        );
        let mut marked = false;
        loop {
            let poll = flow.poll(&mut self.client)?;
            if !marked {
                self.mark_provision_sent()?;
                marked = true;
            }
            match poll {
                Poll::Pending => self.client.clock().sleep(POLL_INTERVAL_MS),
                Poll::Done(outcome) => return Ok(Some(outcome)),
                Poll::TimedOut => return Ok(None),
            }
        }
    }

    /// Reload before writing: the client may already have stored a token.
    fn mark_provision_sent(&self) -> anyhow::Result<()> {
        let mut device = self.store.load()?;
        device.prov_sent = true;
        self.store.save(&device)?;
        Ok(())
    }

    fn sync_attributes(&self) {
        let device = match self.store.load() {
            Ok(device) => device,
            Err(e) => {
                tracing::warn!(error = %e, "cannot load device config for attribute sync");
                return;
            }
        };
        if let Err(e) = client_attributes::sync(&self.client, &self.config, &device, self.booted_at) {
            tracing::warn!(error = %e, "client attribute sync failed");
        }
    }

    /// Returns whether a new image was installed.
    fn check_firmware(&mut self) -> bool {
        let title = self.config.firmware_title.clone();
        let version = self.config.firmware_version.clone();
        match self.client.firmware_update(&title, &version) {
            Ok(FirmwareState::Success) => {
                tracing::info!("firmware installed, restart required");
                true
            }
            Ok(state) => {
                tracing::info!(state = %state, "firmware check finished");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "firmware check failed");
                false
            }
        }
    }
}
