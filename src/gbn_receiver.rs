//! Go-Back-N receive-side state machine.
//!
//! [`DeliveryEngine`] implements the receiver side of Go-Back-N:
//!
//! - Only **in-order** packets are accepted (`seq == expected_seq`).
//! - Corrupt, out-of-order and duplicate packets are discarded and answered
//!   with a duplicate cumulative ACK for `expected_seq - 1`.
//! - Simulated or real loss is answered with nothing; the sender's timer
//!   alone drives recovery.
//! - After the `FinalData` packet is accepted and its ACK sent, the caller
//!   starts time-wait (see [`crate::state::ReceiverState`]).  Nothing is
//!   accepted past the final packet.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (see [`crate::receiver`]).

use std::time::Duration;

use tokio::time::Instant;

use crate::packet::{Packet, PacketKind};
use crate::state::ReceiverState;

/// How a frame was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// In order and intact; payload handed to the sink.
    Accepted,
    /// Failed checksum or decoding.
    Corrupt,
    /// Intact data packet with the wrong sequence number.
    OutOfOrder,
    /// Not a data packet, or arrived after the session ended.
    Ignored,
}

/// What the caller must do in response to one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub verdict: Verdict,
    /// Cumulative ACK number to send back, if any.
    pub ack: Option<i32>,
    /// Bytes to append to the sink, in order.
    pub payload: Option<Vec<u8>>,
    /// The final packet was just accepted.  Once its ACK is on the wire the
    /// caller starts time-wait with [`DeliveryEngine::start_time_wait`].
    pub completes: bool,
}

impl Delivery {
    fn ignored() -> Self {
        Self {
            verdict: Verdict::Ignored,
            ack: None,
            payload: None,
            completes: false,
        }
    }

    fn rejected(verdict: Verdict, ack: i32) -> Self {
        Self {
            verdict,
            ack: Some(ack),
            payload: None,
            completes: false,
        }
    }
}

/// Receive-side state for one transfer.
#[derive(Debug)]
pub struct DeliveryEngine {
    /// Next sequence number that will be accepted.
    expected_seq: i32,
    /// Kind of the most recently accepted packet.
    last_delivered: Option<PacketKind>,
    state: ReceiverState,
    time_wait: Duration,
}

impl DeliveryEngine {
    pub fn new(time_wait: Duration) -> Self {
        Self {
            expected_seq: 0,
            last_delivered: None,
            state: ReceiverState::Receiving,
            time_wait,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn expected_seq(&self) -> i32 {
        self.expected_seq
    }

    pub fn last_delivered(&self) -> Option<PacketKind> {
        self.last_delivered
    }

    /// The cumulative ACK number: last sequence accepted, `-1` if none.
    pub fn cumulative_ack(&self) -> i32 {
        self.expected_seq - 1
    }

    /// A frame arrived but could not be trusted.
    pub fn on_corrupt(&mut self) -> Delivery {
        if self.state.is_done() {
            return Delivery::ignored();
        }
        Delivery::rejected(Verdict::Corrupt, self.cumulative_ack())
    }

    /// An intact packet arrived.
    pub fn on_packet(&mut self, packet: Packet) -> Delivery {
        if self.state.is_done() || !packet.kind.carries_data() {
            return Delivery::ignored();
        }

        let in_order = packet.seq == self.expected_seq
            && self.state == ReceiverState::Receiving
            && !self.final_accepted();
        if !in_order {
            return Delivery::rejected(Verdict::OutOfOrder, self.cumulative_ack());
        }

        self.expected_seq += 1;
        self.last_delivered = Some(packet.kind);
        let completes = packet.kind == PacketKind::FinalData;
        Delivery {
            verdict: Verdict::Accepted,
            ack: Some(self.cumulative_ack()),
            payload: Some(packet.into_payload()),
            completes,
        }
    }

    fn final_accepted(&self) -> bool {
        self.last_delivered == Some(PacketKind::FinalData)
    }

    /// Enter time-wait, measured from `now`, the moment the final ACK was
    /// sent.  No effect before the final packet is accepted or once
    /// time-wait has started.
    pub fn start_time_wait(&mut self, now: Instant) {
        if self.state == ReceiverState::Receiving && self.final_accepted() {
            self.state = ReceiverState::FinalAckSent {
                deadline: now + self.time_wait,
            };
        }
    }

    /// The time-wait deadline, while one is pending.
    pub fn time_wait_deadline(&self) -> Option<Instant> {
        match self.state {
            ReceiverState::FinalAckSent { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Move to [`ReceiverState::Done`] if the time-wait deadline has passed.
    /// Returns `true` once the session is done.
    pub fn poll_time_wait(&mut self, now: Instant) -> bool {
        if let ReceiverState::FinalAckSent { deadline } = self.state {
            if now >= deadline {
                self.state = ReceiverState::Done;
            }
        }
        self.state.is_done()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
