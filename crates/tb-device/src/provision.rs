//! Provisioning state machine and handshake flow.

use tb_mqtt_channel::Channel;
use tb_protocol::provision::ProvisionRequest;

use crate::client::DeviceClient;
use crate::error::ClientResult;
use crate::flow::{self, Poll};

/// Default wait for a provisioning response.
pub const PROVISION_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Success,
    Error,
}

/// Where the current provisioning flow stands.
///
/// Moves forward only: `NotSent -> Sent -> Processed`. A response may
/// also arrive before the request was recorded as sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisioningState {
    #[default]
    NotSent,
    Sent,
    Processed(ProvisionOutcome),
}

impl ProvisioningState {
    fn rank(self) -> u8 {
        match self {
            Self::NotSent => 0,
            Self::Sent => 1,
            Self::Processed(_) => 2,
        }
    }

    /// Move to `next` if it is strictly ahead. Returns whether it moved.
    pub(crate) fn advance(&mut self, next: Self) -> bool {
        if next.rank() > self.rank() {
            *self = next;
            true
        } else {
            false
        }
    }

    pub fn is_processed(self) -> bool {
        matches!(self, Self::Processed(_))
    }
}

/// Poll-driven provisioning handshake: send the request, then pump until
/// the response is processed or the timeout passes.
#[derive(Debug, Clone)]
pub struct ProvisionFlow {
    request: ProvisionRequest,
    timeout_ms: u64,
    deadline_ms: Option<u64>,
}

impl ProvisionFlow {
    pub fn new(device_name: &str, key: &str, secret: &str) -> Self {
        Self {
            request: ProvisionRequest {
                device_name: device_name.to_string(),
                provision_device_key: key.to_string(),
                provision_device_secret: secret.to_string(),
            },
            timeout_ms: PROVISION_TIMEOUT_MS,
            deadline_ms: None,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn poll<C: Channel>(
        &mut self,
        client: &mut DeviceClient<C>,
    ) -> ClientResult<Poll<ProvisionOutcome>> {
        let deadline = match self.deadline_ms {
            Some(deadline) => deadline,
            None => {
                let req = &self.request;
                client.send_provision_request(
                    &req.device_name,
                    &req.provision_device_key,
                    &req.provision_device_secret,
                )?;
                let deadline = client.now_ms() + self.timeout_ms;
                self.deadline_ms = Some(deadline);
                deadline
            }
        };

        client.pump();

        if let ProvisioningState::Processed(outcome) = client.provisioning_state() {
            return Ok(Poll::Done(outcome));
        }
        if flow::expired(client.now_ms(), deadline) {
            tracing::warn!(
                device = %self.request.device_name,
                timeout_ms = self.timeout_ms,
                "no provisioning response"
            );
            return Ok(Poll::TimedOut);
        }
        Ok(Poll::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_moves_forward_only() {
        let mut state = ProvisioningState::NotSent;
        assert!(state.advance(ProvisioningState::Sent));
        assert!(!state.advance(ProvisioningState::NotSent));
        assert_eq!(state, ProvisioningState::Sent);

        assert!(state.advance(ProvisioningState::Processed(ProvisionOutcome::Error)));
        assert!(!state.advance(ProvisioningState::Sent));
        assert!(!state.advance(ProvisioningState::Processed(ProvisionOutcome::Success)));
        assert_eq!(state, ProvisioningState::Processed(ProvisionOutcome::Error));
    }

    #[test]
    fn response_can_skip_sent() {
        let mut state = ProvisioningState::default();
        assert!(state.advance(ProvisioningState::Processed(ProvisionOutcome::Success)));
        assert!(state.is_processed());
    }
}
