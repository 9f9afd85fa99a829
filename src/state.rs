//! Receiver finite-state machine types.
//!
//! Transitions are driven by [`crate::gbn_receiver::DeliveryEngine`]:
//!
//! ```text
//!  RECEIVING ──FinalData accepted, ACK sent──▶ FINAL_ACK_SENT ──deadline──▶ DONE
//!      │ ▲                                        │ ▲
//!      └─┘ data / corrupt / out-of-order          └─┘ late FinalData → re-ACK
//! ```

use tokio::time::Instant;

/// All possible states of a receiving session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// Accepting data packets in order.
    #[default]
    Receiving,
    /// The final packet has been accepted and acknowledged; the session
    /// lingers until `deadline` to re-ACK retransmissions of it.
    FinalAckSent { deadline: Instant },
    /// Terminal; the sink has been flushed.
    Done,
}

impl ReceiverState {
    pub fn is_done(&self) -> bool {
        matches!(self, ReceiverState::Done)
    }
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReceiverState::Receiving => "RECEIVING",
            ReceiverState::FinalAckSent { .. } => "FINAL_ACK_SENT",
            ReceiverState::Done => "DONE",
        };
        f.write_str(name)
    }
}
