//! tb-agent: provisioning, telemetry, RPC and OTA updates for one device.

use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

use tb_agent::config::{AgentConfig, log_directive};
use tb_agent::flash::FileFlash;
use tb_agent::signals::AgentSignals;
use tb_agent::store::FileConfigStore;
use tb_agent::{Agent, Exit};
use tb_device::{ConfigStore, SystemClock};
use tb_mqtt_channel::MqttChannel;

/// Exit status asking the service manager to start the agent again.
const RESTART_EXIT_CODE: i32 = 75;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/tb-agent/agent.toml".to_string());
    let config = AgentConfig::from_file(&config_path)?;

    let store = FileConfigStore::new(&config.state_path, &config.device_name);
    let device = store.load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_directive(device.log_level))),
        )
        .json()
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        device = %device.name,
        broker = %device.broker,
        port = device.port,
        "tb-agent starting"
    );

    // ── Wire collaborators ──────────────────────────────────────
    let signals = AgentSignals::new();
    let channel = MqttChannel::new(config.mqtt.clone(), Handle::current());
    let flash = FileFlash::new(&config.staging_path, &config.image_path);

    // The agent loop blocks; the runtime keeps driving the MQTT event loop.
    let agent_signals = signals.clone();
    let mut agent_task = tokio::task::spawn_blocking(move || {
        let mut agent = Agent::new(channel, store, flash, SystemClock::new(), config, agent_signals);
        agent.run()
    });

    let exit = tokio::select! {
        joined = &mut agent_task => joined?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            signals.request_shutdown();
            agent_task.await?
        }
    };

    match exit {
        Exit::Shutdown => {
            tracing::info!("tb-agent stopped");
            Ok(())
        }
        Exit::Reboot => {
            tracing::warn!("tb-agent restarting");
            std::process::exit(RESTART_EXIT_CODE);
        }
    }
}
