//! Retransmission timer.
//!
//! Reliable delivery requires that unacknowledged packets are re-sent if no
//! ACK arrives within a bounded time.  Go-Back-N needs exactly one timer per
//! session, guarding the oldest unacknowledged packet.
//!
//! [`RetransmitTimer`] is a plain deadline: arming it stores
//! `now + timeout`, disarming clears it, and [`RetransmitTimer::expired`] is
//! a future that completes when the deadline passes (or never, while
//! disarmed).  The sender's control loop races that future against the
//! socket in `tokio::select!`, so timer expiry and ACK arrival are serialised
//! into one loop without shared state.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// A single cancellable retransmission deadline.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl RetransmitTimer {
    /// A disarmed timer with the given retransmission timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start a fresh timeout period from now, replacing any pending deadline.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Completes once the armed deadline has passed; pends forever while
    /// disarmed.
    ///
    /// Does not disarm the timer.  Cancel-safe: dropping the future loses
    /// nothing, so it can be recreated on every loop iteration.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
