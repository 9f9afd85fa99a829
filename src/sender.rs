//! Sender control loop.
//!
//! [`run`] drives one transfer to completion using Go-Back-N with cumulative
//! ACKs.  It owns the [`SendWindow`] and the [`RetransmitTimer`] outright;
//! a single `tokio::select!` loop serialises the two event sources:
//!
//! ```text
//!            ┌──────────── fill window: send [next_seq, base+N) ◀─┐
//!            ▼                                                    │
//!     select! ├── channel.recv() ─▶ Ack(n ≥ base): base = n+1, re-arm/disarm
//!            │                      stale / corrupt / other: nothing
//!            └── timer.expired() ─▶ resend [base, next_seq), re-arm
//! ```
//!
//! The loop ends when the `FinalData` packet is acknowledged.  Dropping the
//! returned future abandons the session and releases the timer.

use std::net::SocketAddr;
use std::time::Duration;

use crate::channel::{Channel, Inbound};
use crate::error::{is_transient_io_error, ConfigError, TransferError};
use crate::gbn_sender::{AckOutcome, SendWindow};
use crate::packet::{Packet, PacketKind};
use crate::socket::Transport;
use crate::timer::RetransmitTimer;

/// Parameters of one sender run.
#[derive(Debug, Clone, Copy)]
pub struct SenderOptions {
    pub window_size: usize,
    pub timeout: Duration,
    /// Consecutive timeouts without progress before giving up.
    pub max_retries: Option<u32>,
}

/// Counters collected over one sender run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Packets in the transfer.
    pub packets: usize,
    /// Data packet transmissions, retransmissions included.
    pub data_sends: usize,
    /// Data packet transmissions caused by timeouts.
    pub retransmissions: usize,
    /// Timer expiries.
    pub timeouts: usize,
    /// ACKs that moved `base`.
    pub acks_advanced: usize,
    /// ACKs for already-retired packets.
    pub acks_stale: usize,
    /// Frames that failed verification.
    pub corrupt: usize,
    /// Largest `next_seq - base` observed.
    pub max_in_flight: usize,
}

/// Transmit `packets` to `peer` until all are acknowledged.
///
/// Transport errors on send are fatal.  Receive errors that a datagram
/// socket reports for transient conditions count as loss.
pub async fn run<T: Transport>(
    channel: &mut Channel<T>,
    peer: SocketAddr,
    packets: Vec<Packet>,
    opts: SenderOptions,
) -> Result<SendReport, TransferError> {
    if opts.window_size == 0 {
        return Err(ConfigError::ZeroWindow.into());
    }
    let mut window = SendWindow::new(packets, opts.window_size);
    let mut timer = RetransmitTimer::new(opts.timeout);
    let mut retries = 0u32;
    let mut report = SendReport {
        packets: window.len(),
        ..SendReport::default()
    };

    log::info!(
        "[send] → {peer}: {} packet(s), window {}",
        window.len(),
        window.window_size()
    );

    while !window.is_complete() {
        // ── Fill the window ────────────────────────────────────────────
        while window.can_send() {
            let was_idle = !window.has_unacked();
            let Some(pkt) = window.send_next() else { break };
            channel.send(pkt, peer).await?;
            log::debug!("[send] → {} seq={} len={}", pkt.kind, pkt.seq, pkt.payload().len());
            report.data_sends += 1;
            // Arm the timer when the first packet of an empty window goes out.
            if was_idle {
                timer.arm();
            }
        }
        report.max_in_flight = report.max_in_flight.max(window.in_flight());

        tokio::select! {
            // ── Incoming frame ─────────────────────────────────────────
            inbound = channel.recv() => {
                let inbound = match inbound {
                    Ok(inbound) => inbound,
                    Err(e) if is_transient_io_error(&e) => {
                        log::debug!("[send] receive error treated as loss: {e}");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                match inbound {
                    Inbound::Packet { packet, from } if from == peer => {
                        if packet.kind != PacketKind::Ack {
                            log::debug!("[send] ignoring {} from {from}", packet.kind);
                            continue;
                        }
                        match window.on_ack(packet.seq) {
                            AckOutcome::Advanced { retired } => {
                                report.acks_advanced += 1;
                                retries = 0;
                                log::debug!(
                                    "[send] ← ACK {} (retired {retired}, base={})",
                                    packet.seq,
                                    window.base()
                                );
                                if window.has_unacked() {
                                    timer.arm();
                                } else {
                                    timer.disarm();
                                }
                            }
                            AckOutcome::Stale => {
                                report.acks_stale += 1;
                                log::debug!("[send] ← stale ACK {} (base={})", packet.seq, window.base());
                            }
                            AckOutcome::Unsent => {
                                log::warn!(
                                    "[send] ← ACK {} for unsent packet (next_seq={}); ignored",
                                    packet.seq,
                                    window.next_seq()
                                );
                            }
                        }
                    }
                    Inbound::Packet { packet, from } => {
                        log::debug!("[send] ignoring {} from stranger {from}", packet.kind);
                    }
                    Inbound::Corrupt { .. } => {
                        report.corrupt += 1;
                        log::warn!("[send] corrupt ACK discarded; waiting");
                    }
                    Inbound::Lost => {}
                }
            }

            // ── Retransmission timeout ─────────────────────────────────
            _ = timer.expired() => {
                report.timeouts += 1;
                retries += 1;
                if let Some(max) = opts.max_retries {
                    if retries > max {
                        log::error!("[send] {peer} unresponsive; abandoning after {max} retries");
                        return Err(TransferError::PeerUnresponsive(max));
                    }
                }

                // Go-Back-N: retransmit every unacked packet from base.
                let outstanding = window.outstanding();
                log::info!(
                    "[send] timeout — retransmitting {} packet(s) from seq {}",
                    outstanding.len(),
                    window.base()
                );
                for pkt in outstanding {
                    channel.send(pkt, peer).await?;
                }
                report.data_sends += outstanding.len();
                report.retransmissions += outstanding.len();
                window.on_retransmit();
                timer.arm();
            }
        }
    }

    log::info!(
        "[send] done {peer}: {} packet(s), {} send(s), {} timeout(s)",
        report.packets,
        report.data_sends,
        report.timeouts
    );
    Ok(report)
}
