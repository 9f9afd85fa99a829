//! Transfer parameters shared by both ends of a session.

use std::time::Duration;

use crate::error::ConfigError;
use crate::packet::MAX_PAYLOAD;
use crate::simulator::SimulatorConfig;

/// Default retransmission timeout.
pub const RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default time-wait period after the final ACK.
pub const TIME_WAIT_DURATION: Duration = Duration::from_millis(1520);

/// Knobs for one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferConfig {
    /// Go-Back-N window (N): packets that may be in flight at once.
    pub window_size: usize,
    /// Largest payload placed in one data packet.
    pub max_payload: usize,
    /// How long the oldest unacknowledged packet may wait for its ACK.
    /// The client also uses it as the request retry interval.
    pub retransmit_timeout: Duration,
    /// How long the receiver lingers after acknowledging the final packet.
    pub time_wait: Duration,
    /// Fault injection applied to every received frame.
    pub simulator: SimulatorConfig,
    /// Consecutive timeouts without progress before giving up.
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            window_size: 1,
            max_payload: MAX_PAYLOAD,
            retransmit_timeout: RETRANSMIT_TIMEOUT,
            time_wait: TIME_WAIT_DURATION,
            simulator: SimulatorConfig::default(),
            max_retries: None,
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD {
            return Err(ConfigError::MaxPayload {
                got: self.max_payload,
                max: MAX_PAYLOAD,
            });
        }
        if self.retransmit_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("retransmit timeout"));
        }
        if self.time_wait.is_zero() {
            return Err(ConfigError::ZeroDuration("time-wait"));
        }
        self.simulator.validate()
    }
}
