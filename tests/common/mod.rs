//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use gbn_transfer::packet::{Packet, PacketKind};
use gbn_transfer::socket::Transport;

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// One outgoing frame as seen by a [`Faulty`] transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sent {
    pub kind: PacketKind,
    pub seq: i32,
    pub at: Instant,
    pub dropped: bool,
}

/// Shared record of outgoing frames, readable after the transport has been
/// moved into a channel.
#[derive(Debug, Clone, Default)]
pub struct SendLog(Arc<Mutex<Vec<Sent>>>);

impl SendLog {
    pub fn entries(&self) -> Vec<Sent> {
        self.0.lock().unwrap().clone()
    }

    /// `(kind, seq)` of every frame that left, dropped or not.
    pub fn frames(&self) -> Vec<(PacketKind, i32)> {
        self.entries().iter().map(|s| (s.kind, s.seq)).collect()
    }

    /// Sequence numbers of data-carrying frames, in send order.
    pub fn data_seqs(&self) -> Vec<i32> {
        self.entries()
            .iter()
            .filter(|s| s.kind.carries_data())
            .map(|s| s.seq)
            .collect()
    }

    pub fn acks(&self) -> Vec<i32> {
        self.entries()
            .iter()
            .filter(|s| s.kind == PacketKind::Ack)
            .map(|s| s.seq)
            .collect()
    }
}

/// Decides whether to drop an outgoing packet given how many times the same
/// `(kind, seq)` was sent before.
pub type DropPolicy = Box<dyn Fn(&Packet, usize) -> bool + Send + Sync>;

/// A transport that loses chosen outgoing packets and logs everything it sends.
pub struct Faulty<T> {
    inner: T,
    policy: DropPolicy,
    attempts: Mutex<HashMap<(i32, i32), usize>>,
    log: SendLog,
}

impl<T: Transport> Faulty<T> {
    pub fn new(inner: T, policy: DropPolicy) -> (Self, SendLog) {
        let log = SendLog::default();
        let faulty = Self {
            inner,
            policy,
            attempts: Mutex::new(HashMap::new()),
            log: log.clone(),
        };
        (faulty, log)
    }

    /// Logs but never drops.
    pub fn recording(inner: T) -> (Self, SendLog) {
        Self::new(inner, Box::new(|_: &Packet, _: usize| false))
    }

    fn should_drop(&self, frame: &[u8]) -> bool {
        let Ok(packet) = Packet::decode(frame) else {
            return false;
        };
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry((packet.kind.code(), packet.seq)).or_insert(0);
            let attempt = *n;
            *n += 1;
            attempt
        };
        let dropped = (self.policy)(&packet, attempt);
        self.log.0.lock().unwrap().push(Sent {
            kind: packet.kind,
            seq: packet.seq,
            at: Instant::now(),
            dropped,
        });
        dropped
    }
}

impl<T: Transport> Transport for Faulty<T> {
    async fn send_to(&self, frame: &[u8], dest: SocketAddr) -> io::Result<()> {
        if self.should_drop(frame) {
            return Ok(());
        }
        self.inner.send_to(frame, dest).await
    }

    async fn recv_from(&mut self) -> io::Result<(Vec<u8>, SocketAddr)> {
        self.inner.recv_from().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Deterministic test content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
