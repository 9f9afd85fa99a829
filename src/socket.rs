//! Datagram transport abstraction.
//!
//! [`Transport`] is the send/receive port both engines are written against.
//! Two implementations live here:
//! - [`Socket`] — a thin wrapper around `tokio::net::UdpSocket`.
//! - [`MemorySocket`] — one end of an in-process datagram pipe built by
//!   [`memory_pair`], used to run both engines inside a single runtime.
//!
//! This module owns only byte I/O; framing lives in [`crate::packet`] and
//! fault injection in [`crate::simulator`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Receive buffer size; anything longer than a frame is malformed anyway.
const RECV_BUF: usize = 2048;

/// Connectionless send/receive primitives.
///
/// Receiving is cancel-safe for every implementation in this crate, so a
/// pending `recv_from` may be raced against a timer in `tokio::select!`.
pub trait Transport: Send + Sync {
    /// Send one datagram to `dest`.
    fn send_to(&self, frame: &[u8], dest: SocketAddr) -> impl Future<Output = io::Result<()>> + Send;

    /// Wait for the next datagram.
    fn recv_from(&mut self) -> impl Future<Output = io::Result<(Vec<u8>, SocketAddr)>> + Send;

    /// Address peers use to reach this endpoint.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async UDP socket.
///
/// All I/O methods take `&self`, so a socket can be shared across tasks
/// behind an `Arc`.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Send `frame` as a single UDP datagram to `dest`.
    pub async fn send_datagram(&self, frame: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(frame, dest).await?;
        Ok(())
    }

    /// Receive the next datagram, truncated to the receive buffer.
    pub async fn recv_datagram(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; RECV_BUF];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}

impl Transport for Socket {
    async fn send_to(&self, frame: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.send_datagram(frame, dest).await
    }

    async fn recv_from(&mut self) -> io::Result<(Vec<u8>, SocketAddr)> {
        self.recv_datagram().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}

// ---------------------------------------------------------------------------
// MemorySocket
// ---------------------------------------------------------------------------

/// One end of an in-process datagram pipe.
///
/// Like UDP, sending to an address other than the peer, or to a peer that has
/// gone away, silently discards the datagram; receiving from a vanished peer
/// simply never completes.
#[derive(Debug)]
pub struct MemorySocket {
    local: SocketAddr,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Build two connected [`MemorySocket`]s posing as `a` and `b`.
pub fn memory_pair(a: SocketAddr, b: SocketAddr) -> (MemorySocket, MemorySocket) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemorySocket { local: a, peer: b, tx: a_tx, rx: a_rx },
        MemorySocket { local: b, peer: a, tx: b_tx, rx: b_rx },
    )
}

impl Transport for MemorySocket {
    async fn send_to(&self, frame: &[u8], dest: SocketAddr) -> io::Result<()> {
        if dest == self.peer {
            let _ = self.tx.send(frame.to_vec());
        }
        Ok(())
    }

    async fn recv_from(&mut self) -> io::Result<(Vec<u8>, SocketAddr)> {
        match self.rx.recv().await {
            Some(frame) => Ok((frame, self.peer)),
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}
