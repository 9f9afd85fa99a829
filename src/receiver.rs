//! Receiver control loop.
//!
//! [`receive`] feeds every frame arriving from `peer` through a
//! [`DeliveryEngine`], writes accepted payloads to the sink in order, and
//! sends whatever ACK the engine asks for.  After the final packet is
//! acknowledged it lingers for the time-wait period, re-ACKing late
//! retransmissions, then flushes the sink and returns.
//!
//! When a request packet is supplied it is sent first and re-sent every
//! `retry_interval` until the first data packet is accepted.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep_until, Instant};

use crate::channel::{Channel, Inbound};
use crate::error::{is_transient_io_error, TransferError};
use crate::gbn_receiver::{DeliveryEngine, Verdict};
use crate::packet::Packet;
use crate::socket::Transport;
use crate::timer::RetransmitTimer;

/// Parameters of one receiver run.
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    pub time_wait: Duration,
    /// Request to send before any data arrives.
    pub request: Option<Packet>,
    pub retry_interval: Duration,
    /// Request re-sends before giving up.  `None` retries forever.
    pub max_retries: Option<u32>,
}

impl ReceiverOptions {
    /// Options for a receiver that sends no request.
    pub fn new(time_wait: Duration) -> Self {
        Self {
            time_wait,
            request: None,
            retry_interval: crate::config::RETRANSMIT_TIMEOUT,
            max_retries: None,
        }
    }
}

/// Counters collected over one receiver run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    pub bytes_delivered: u64,
    pub packets_accepted: usize,
    pub corrupt: usize,
    pub out_of_order: usize,
    /// Frames discarded by the channel simulator.
    pub lost: usize,
    pub acks_sent: usize,
    pub request_retries: usize,
}

/// Receive one transfer from `peer` into `sink`.
pub async fn receive<T, W>(
    channel: &mut Channel<T>,
    peer: SocketAddr,
    sink: &mut W,
    opts: ReceiverOptions,
) -> Result<ReceiveReport, TransferError>
where
    T: Transport,
    W: AsyncWrite + Unpin + Send,
{
    let mut engine = DeliveryEngine::new(opts.time_wait);
    let mut report = ReceiveReport::default();
    let mut request_timer = RetransmitTimer::new(opts.retry_interval);
    let mut retries = 0u32;

    if let Some(request) = &opts.request {
        channel.send(request, peer).await?;
        request_timer.arm();
        log::info!("[recv] → REQUEST {peer}");
    }

    loop {
        if engine.poll_time_wait(Instant::now()) {
            break;
        }
        let time_wait = engine.time_wait_deadline();

        tokio::select! {
            inbound = channel.recv() => {
                let inbound = match inbound {
                    Ok(inbound) => inbound,
                    Err(e) if is_transient_io_error(&e) => {
                        log::debug!("[recv] receive error treated as loss: {e}");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };

                let delivery = match inbound {
                    Inbound::Lost => {
                        // Nothing arrived, so there is nothing to acknowledge.
                        report.lost += 1;
                        log::debug!("[recv] frame lost; no ACK");
                        continue;
                    }
                    Inbound::Corrupt { from } if from == peer => engine.on_corrupt(),
                    Inbound::Packet { packet, from } if from == peer => {
                        let (kind, seq) = (packet.kind, packet.seq);
                        let delivery = engine.on_packet(packet);
                        log::trace!("[recv] ← {kind} seq={seq} {:?}", delivery.verdict);
                        delivery
                    }
                    Inbound::Corrupt { from } | Inbound::Packet { from, .. } => {
                        log::debug!("[recv] ignoring frame from stranger {from}");
                        continue;
                    }
                };

                match delivery.verdict {
                    Verdict::Accepted => {
                        report.packets_accepted += 1;
                        request_timer.disarm();
                    }
                    Verdict::Corrupt => {
                        report.corrupt += 1;
                        log::warn!("[recv] corrupt frame discarded; re-ACK {:?}", delivery.ack);
                    }
                    Verdict::OutOfOrder => {
                        report.out_of_order += 1;
                        log::debug!(
                            "[recv] out-of-order frame discarded (expected {}); re-ACK {:?}",
                            engine.expected_seq(),
                            delivery.ack
                        );
                    }
                    Verdict::Ignored => {}
                }

                if let Some(bytes) = delivery.payload {
                    sink.write_all(&bytes).await?;
                    report.bytes_delivered += bytes.len() as u64;
                }
                if let Some(ack) = delivery.ack {
                    channel.send(&Packet::ack(ack), peer).await?;
                    report.acks_sent += 1;
                    log::debug!("[recv] → ACK {ack}");
                }
                // Time-wait runs from the final ACK, not from acceptance.
                if delivery.completes {
                    engine.start_time_wait(Instant::now());
                    log::info!("[recv] final packet acknowledged; time-wait {:?}", opts.time_wait);
                }
            }

            _ = request_timer.expired() => {
                retries += 1;
                if let Some(max) = opts.max_retries {
                    if retries > max {
                        log::error!("[recv] {peer} never answered the request");
                        return Err(TransferError::PeerUnresponsive(max));
                    }
                }
                if let Some(request) = &opts.request {
                    log::info!("[recv] no data yet; re-sending request (attempt {})", retries + 1);
                    channel.send(request, peer).await?;
                    report.request_retries += 1;
                }
                request_timer.arm();
            }

            _ = sleep_until(time_wait.unwrap_or_else(Instant::now)), if time_wait.is_some() => {}
        }
    }

    sink.flush().await?;
    log::info!(
        "[recv] done: {} byte(s) in {} packet(s), {} corrupt, {} out-of-order",
        report.bytes_delivered,
        report.packets_accepted,
        report.corrupt,
        report.out_of_order
    );
    Ok(report)
}
