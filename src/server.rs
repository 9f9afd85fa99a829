//! File server.
//!
//! One UDP socket serves every client.  The server task reads all datagrams
//! and routes them by source address:
//!
//! ```text
//!                          ┌─▶ inbox ─▶ session task (SendWindow + timer) ─┐
//!  Socket ─▶ server loop ──┼─▶ inbox ─▶ session task                       ├─▶ Socket
//!                          └─▶ no session: parse as REQUEST, spawn one     ┘
//! ```
//!
//! Each request gets an independent sender session with its own window and
//! timer; sessions share nothing but the socket.  Requests from unknown peers
//! pass through the configured simulator.  A peer whose transfer completed is
//! ignored for one time-wait so delayed duplicate requests start nothing.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;

use crate::channel::{classify, Channel, Inbound};
use crate::config::TransferConfig;
use crate::error::{is_transient_io_error, TransferError};
use crate::gbn_sender::prepare;
use crate::packet::PacketKind;
use crate::sender::{self, SendReport, SenderOptions};
use crate::simulator::Simulator;
use crate::socket::{Socket, Transport};

/// Datagrams buffered per session before the router starts dropping them.
const INBOX_DEPTH: usize = 256;

type Datagram = (Vec<u8>, SocketAddr);
type SessionResult = Result<SendReport, TransferError>;

/// A session's view of the shared socket: sends go straight out, receives
/// come from the router.
#[derive(Debug)]
struct RoutedSocket {
    socket: Arc<Socket>,
    inbox: mpsc::Receiver<Datagram>,
}

impl Transport for RoutedSocket {
    async fn send_to(&self, frame: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.socket.send_datagram(frame, dest).await
    }

    async fn recv_from(&mut self) -> io::Result<Datagram> {
        match self.inbox.recv().await {
            Some(datagram) => Ok(datagram),
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.socket.local_addr)
    }
}

/// Router bookkeeping: live sessions by peer and by task, plus peers whose
/// transfer just finished.
#[derive(Debug, Default)]
struct Sessions {
    inboxes: HashMap<SocketAddr, mpsc::Sender<Datagram>>,
    peers: HashMap<task::Id, SocketAddr>,
    /// Until when stale requests from a finished peer are ignored.
    lingering: HashMap<SocketAddr, Instant>,
}

impl Sessions {
    fn inbox(&self, peer: &SocketAddr) -> Option<&mpsc::Sender<Datagram>> {
        self.inboxes.get(peer)
    }

    fn open(&mut self, peer: SocketAddr, id: task::Id, inbox: mpsc::Sender<Datagram>) {
        self.lingering.remove(&peer);
        self.inboxes.insert(peer, inbox);
        self.peers.insert(id, peer);
    }

    /// Forget the session run by task `id`, returning its peer.
    fn close(&mut self, id: task::Id) -> Option<SocketAddr> {
        let peer = self.peers.remove(&id)?;
        self.inboxes.remove(&peer);
        Some(peer)
    }

    fn linger(&mut self, peer: SocketAddr, until: Instant) {
        let now = Instant::now();
        self.lingering.retain(|_, t| *t > now);
        self.lingering.insert(peer, until);
    }

    fn is_lingering(&mut self, peer: &SocketAddr, now: Instant) -> bool {
        match self.lingering.get(peer) {
            Some(&until) if now < until => true,
            Some(_) => {
                self.lingering.remove(peer);
                false
            }
            None => false,
        }
    }

    /// Release a finished session task.  Peers whose transfer completed
    /// linger for `linger` so delayed duplicate requests start nothing.
    fn reap(&mut self, joined: Result<(task::Id, SessionResult), JoinError>, linger: Duration) {
        match joined {
            Ok((id, result)) => {
                let Some(peer) = self.close(id) else {
                    log::error!("[server] finished task {id} had no session");
                    return;
                };
                match result {
                    Ok(report) => {
                        log::info!(
                            "[server] {peer}: sent {} packet(s) in {} transmission(s)",
                            report.packets,
                            report.data_sends
                        );
                        self.linger(peer, Instant::now() + linger);
                    }
                    Err(e) => log::error!("[server] {peer}: session failed: {e}"),
                }
            }
            Err(e) => match self.close(e.id()) {
                Some(peer) => log::error!("[server] {peer}: session task died: {e}"),
                None => log::error!("[server] session task died: {e}"),
            },
        }
    }
}

/// Serves files from a root directory to any client that asks.
#[derive(Debug)]
pub struct Server {
    socket: Arc<Socket>,
    root: PathBuf,
    config: TransferConfig,
    /// Applied to datagrams from peers without a session.
    simulator: Simulator,
}

impl Server {
    /// Bind the server socket.  Fails on invalid configuration.
    pub async fn bind(
        addr: SocketAddr,
        root: impl Into<PathBuf>,
        config: TransferConfig,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        let simulator = Simulator::new(config.simulator.clone())?;
        let socket = Socket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            root: root.into(),
            config,
            simulator,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Serve until the socket fails.
    pub async fn serve(self) -> Result<(), TransferError> {
        self.serve_until(std::future::pending::<()>()).await
    }

    /// Serve until `shutdown` completes; in-flight sessions are abandoned.
    pub async fn serve_until<F>(mut self, shutdown: F) -> Result<(), TransferError>
    where
        F: Future<Output = ()>,
    {
        let mut sessions = Sessions::default();
        let mut tasks: JoinSet<SessionResult> = JoinSet::new();
        tokio::pin!(shutdown);

        log::info!("[server] serving {} on {}", self.root.display(), self.local_addr());

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("[server] shutting down; abandoning {} session(s)", tasks.len());
                    tasks.shutdown().await;
                    return Ok(());
                }

                Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    sessions.reap(joined, self.config.time_wait);
                }

                received = self.socket.recv_datagram() => {
                    let (frame, from) = match received {
                        Ok(datagram) => datagram,
                        Err(e) if is_transient_io_error(&e) => {
                            log::debug!("[server] receive error ignored: {e}");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };

                    if let Some(inbox) = sessions.inbox(&from) {
                        if inbox.try_send((frame, from)).is_err() {
                            log::debug!("[server] {from}: session inbox unavailable; datagram dropped");
                        }
                        continue;
                    }
                    if sessions.is_lingering(&from, Instant::now()) {
                        log::debug!("[server] {from}: transfer just finished; stale datagram ignored");
                        continue;
                    }

                    let Some(path) = self.parse_request(&frame, from) else {
                        continue;
                    };
                    let (tx, rx) = mpsc::channel(INBOX_DEPTH);
                    let transport = RoutedSocket {
                        socket: Arc::clone(&self.socket),
                        inbox: rx,
                    };
                    let handle = tasks.spawn(session(transport, from, path, self.config.clone()));
                    sessions.open(from, handle.id(), tx);
                }
            }
        }
    }

    /// Validate a datagram from an unknown peer as a file request.
    ///
    /// The frame passes through the simulator like any other.  Malformed
    /// requests are logged and yield `None`.
    fn parse_request(&mut self, frame: &[u8], from: SocketAddr) -> Option<PathBuf> {
        let packet = match classify(&mut self.simulator, frame, from) {
            Inbound::Packet { packet, .. } => packet,
            Inbound::Lost => {
                log::debug!("[server] request from {from} lost");
                return None;
            }
            Inbound::Corrupt { .. } => {
                log::warn!("[server] corrupt request from {from}; ignored");
                return None;
            }
        };

        match packet.kind {
            PacketKind::Request => {}
            PacketKind::Data | PacketKind::FinalData | PacketKind::Ack => {
                log::warn!("[server] expected REQUEST from {from}, got {}; ignored", packet.kind);
                return None;
            }
        }

        let name = String::from_utf8_lossy(packet.payload());
        match resolve(&self.root, &name) {
            Ok(path) => {
                log::info!("[server] {from} requested {name:?}");
                Some(path)
            }
            Err(e) => {
                log::warn!("[server] bad request from {from}: {e}; ignored");
                None
            }
        }
    }
}

/// One sender session: load the file, then run Go-Back-N to `peer`.
async fn session(
    transport: RoutedSocket,
    peer: SocketAddr,
    path: PathBuf,
    config: TransferConfig,
) -> SessionResult {
    let mut file = tokio::fs::File::open(&path)
        .await
        .map_err(|source| TransferError::File { path: path.clone(), source })?;
    let packets = prepare(&mut file, config.max_payload).await?;
    let mut channel = Channel::new(transport, Simulator::new(config.simulator.clone())?);
    let opts = SenderOptions {
        window_size: config.window_size,
        timeout: config.retransmit_timeout,
        max_retries: config.max_retries,
    };
    sender::run(&mut channel, peer, packets, opts).await
}

/// Map a requested name onto a path under `root`.
///
/// Only plain relative paths are accepted: no root, prefix, `.` or `..`
/// components.
pub fn resolve(root: &Path, name: &str) -> Result<PathBuf, TransferError> {
    let requested = Path::new(name);
    let plain = !name.is_empty()
        && requested
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !plain {
        return Err(TransferError::InvalidFileName(name.to_owned()));
    }
    Ok(root.join(requested))
}
