//! Periodic device telemetry.

use tb_device::{ClientResult, DeviceClient};
use tb_mqtt_channel::Channel;
use tb_protocol::KeyValue;

/// Fires once per interval on the client clock.
///
/// The first report is due one full interval after `start`.
#[derive(Debug, Clone)]
pub struct TelemetryTimer {
    interval_ms: u64,
    next_due_ms: u64,
}

impl TelemetryTimer {
    pub fn new(interval_secs: u64, start_ms: u64) -> Self {
        let interval_ms = interval_secs.saturating_mul(1000).max(1);
        Self {
            interval_ms,
            next_due_ms: start_ms.saturating_add(interval_ms),
        }
    }

    /// Whether a report is due at `now_ms`. Missed intervals collapse into one.
    pub fn due(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_due_ms {
            return false;
        }
        while self.next_due_ms <= now_ms {
            self.next_due_ms = self.next_due_ms.saturating_add(self.interval_ms);
        }
        true
    }
}

/// Publish one telemetry sample.
pub fn report<C: Channel>(client: &DeviceClient<C>, uptime_secs: u64) -> ClientResult<()> {
    let uptime = i64::try_from(uptime_secs).unwrap_or(i64::MAX);
    client.send_telemetry(&[KeyValue::new("uptime", uptime)])?;
    tracing::debug!(uptime_secs, "telemetry sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_device::{Credential, ManualClock};
    use tb_mqtt_channel::MockChannel;

    #[test]
    fn first_report_after_one_interval() {
        let mut timer = TelemetryTimer::new(60, 1_000);
        assert!(!timer.due(1_000));
        assert!(!timer.due(60_999));
        assert!(timer.due(61_000));
        assert!(!timer.due(61_001));
        assert!(timer.due(121_000));
    }

    #[test]
    fn missed_intervals_collapse() {
        let mut timer = TelemetryTimer::new(1, 0);
        assert!(timer.due(10_500));
        assert!(!timer.due(10_900));
        assert!(timer.due(11_000));
    }

    #[test]
    fn report_publishes_uptime() {
        let mut client = DeviceClient::new(MockChannel::new()).with_clock(ManualClock::new());
        client
            .connect("localhost", &Credential::AccessToken("T".into()), 1883, "dev")
            .unwrap();
        report(&client, 42).unwrap();
        let sent = client.channel().last_published().unwrap();
        assert_eq!(sent.topic, "v1/devices/me/telemetry");
        assert_eq!(sent.json(), serde_json::json!({"uptime": 42}));
    }
}
