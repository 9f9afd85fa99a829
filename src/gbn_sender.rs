//! Go-Back-N send-side state machine.
//!
//! [`SendWindow`] owns the packets of one transfer and the two indices that
//! describe the sliding window:
//!
//! ```text
//!    base             next_seq        base + window_size
//!      │                  │                  │
//!  ────┼──────────────────┼──────────────────┼──────▶ packet index
//!  acked │ <── in flight ──▶│ <── sendable ───▶│ not yet
//! ```
//!
//! # Protocol contract
//!
//! - `base <= next_seq <= base + window_size` at all times.
//! - ACKs are **cumulative**: `Ack(n)` retires every packet `<= n` at once.
//! - On timeout, the caller retransmits **all** of `[base, next_seq)`.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (see [`crate::sender`]).

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ConfigError, TransferError};
use crate::packet::{Packet, PacketKind, MAX_PAYLOAD};

// ---------------------------------------------------------------------------
// prepare
// ---------------------------------------------------------------------------

/// Split `source` into sealed packets of at most `max_payload` bytes.
///
/// Packets are numbered from 0; the last is tagged
/// [`PacketKind::FinalData`], all others [`PacketKind::Data`].  An empty
/// source yields a single empty `FinalData` packet.
pub async fn prepare<R>(source: &mut R, max_payload: usize) -> Result<Vec<Packet>, TransferError>
where
    R: AsyncRead + Unpin,
{
    check_max_payload(max_payload)?;
    let mut chunks = Vec::new();
    loop {
        let chunk = read_chunk(source, max_payload).await?;
        let short = chunk.len() < max_payload;
        if !chunk.is_empty() || chunks.is_empty() {
            chunks.push(chunk);
        }
        if short {
            break;
        }
    }
    packetize(chunks)
}

/// In-memory variant of [`prepare`].
pub fn prepare_bytes(data: &[u8], max_payload: usize) -> Result<Vec<Packet>, TransferError> {
    check_max_payload(max_payload)?;
    if data.is_empty() {
        return packetize(vec![Vec::new()]);
    }
    packetize(data.chunks(max_payload).map(<[u8]>::to_vec).collect())
}

fn check_max_payload(max_payload: usize) -> Result<(), ConfigError> {
    if max_payload == 0 || max_payload > MAX_PAYLOAD {
        return Err(ConfigError::MaxPayload {
            got: max_payload,
            max: MAX_PAYLOAD,
        });
    }
    Ok(())
}

/// Read until `max` bytes are collected or the source is exhausted.
async fn read_chunk<R>(source: &mut R, max: usize) -> Result<Vec<u8>, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; max];
    let mut filled = 0;
    while filled < max {
        let n = source.read(&mut chunk[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    chunk.truncate(filled);
    Ok(chunk)
}

fn packetize(chunks: Vec<Vec<u8>>) -> Result<Vec<Packet>, TransferError> {
    let count = chunks.len();
    if i32::try_from(count).is_err() {
        return Err(TransferError::SourceTooLarge(count));
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let kind = if i + 1 == count {
                PacketKind::FinalData
            } else {
                PacketKind::Data
            };
            // i < count <= i32::MAX
            Packet::new(i as i32, kind, chunk).map_err(TransferError::from)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// SendWindow
// ---------------------------------------------------------------------------

/// What an incoming ACK did to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// `base` moved forward, retiring `retired` packets.
    Advanced { retired: usize },
    /// The ACK is for a packet already retired (or is `-1`).
    Stale,
    /// The ACK names a packet that was never sent.
    Unsent,
}

/// Go-Back-N send-side state for one transfer.
#[derive(Debug)]
pub struct SendWindow {
    packets: Vec<Packet>,
    /// Index of the **oldest** unacked packet (left window edge).
    base: usize,
    /// Index of the next packet never sent before.
    next_seq: usize,
    /// Maximum number of packets that may be in flight simultaneously (N).
    window_size: usize,
    /// Transmissions per packet, first send included.
    tx_counts: Vec<u32>,
}

impl SendWindow {
    /// Create a window over `packets`.
    ///
    /// `window_size` must be at least 1.
    pub fn new(packets: Vec<Packet>, window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        let tx_counts = vec![0; packets.len()];
        Self {
            packets,
            base: 0,
            next_seq: 0,
            window_size,
            tx_counts,
        }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn next_seq(&self) -> usize {
        self.next_seq
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Total number of packets in the transfer.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Number of packets sent but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.next_seq - self.base
    }

    /// `true` when at least one packet is awaiting acknowledgement.
    pub fn has_unacked(&self) -> bool {
        self.base < self.next_seq
    }

    /// `true` once every packet, including the final one, is acknowledged.
    pub fn is_complete(&self) -> bool {
        self.base == self.packets.len()
    }

    /// `true` when there is an unsent packet and room in the window for it.
    pub fn can_send(&self) -> bool {
        self.next_seq < self.packets.len() && self.next_seq < self.base + self.window_size
    }

    /// Hand out the next never-sent packet and advance `next_seq`.
    ///
    /// Returns `None` when the window is full or every packet has been sent.
    pub fn send_next(&mut self) -> Option<&Packet> {
        if !self.can_send() {
            return None;
        }
        let idx = self.next_seq;
        self.next_seq += 1;
        self.tx_counts[idx] += 1;
        debug_assert!(self.in_flight() <= self.window_size);
        Some(&self.packets[idx])
    }

    /// Process a cumulative ACK.
    ///
    /// `Ack(n)` with `base <= n < next_seq` moves `base` to `n + 1` in one
    /// step.  Anything lower is stale; anything at or beyond `next_seq` was
    /// never sent and is ignored.
    pub fn on_ack(&mut self, ack: i32) -> AckOutcome {
        let Ok(n) = usize::try_from(ack) else {
            return AckOutcome::Stale;
        };
        if n < self.base {
            return AckOutcome::Stale;
        }
        if n >= self.next_seq {
            return AckOutcome::Unsent;
        }
        let retired = n + 1 - self.base;
        self.base = n + 1;
        AckOutcome::Advanced { retired }
    }

    /// All in-flight packets from oldest to newest: the Go-Back-N
    /// retransmission set.
    pub fn outstanding(&self) -> &[Packet] {
        &self.packets[self.base..self.next_seq]
    }

    /// Count one more transmission for every in-flight packet.
    ///
    /// Call this immediately after retransmitting the whole window.
    pub fn on_retransmit(&mut self) {
        for count in &mut self.tx_counts[self.base..self.next_seq] {
            *count += 1;
        }
    }

    /// How many times packet `seq` has been transmitted.
    pub fn tx_count(&self, seq: usize) -> u32 {
        self.tx_counts.get(seq).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
