//! `gbn-transfer` — reliable file transfer over UDP using Go-Back-N.
//!
//! # Architecture
//!
//! ```text
//!  byte source                                                 byte sink
//!      │                                                           ▲
//!  ┌───▼──────────┐   DATA / FINAL   ┌──────────────────────┐      │
//!  │ gbn_sender   │─────────────────▶│ gbn_receiver         │──────┘
//!  │ (SendWindow) │                  │ (DeliveryEngine)     │
//!  └───▲──────────┘◀─────────────────└──────────────────────┘
//!      │ sender::run      ACKs             receiver::receive │
//!  ┌───┴────────────────────────────────────────────────────▼──┐
//!  │ Channel: packet codec + simulator (loss, corruption)       │
//!  └───┬───────────────────────────────────────────────────────┘
//!      │ raw datagrams
//!  ┌───▼──────┐
//!  │ Transport│  (tokio UdpSocket, or an in-memory pair)
//!  └──────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]        — wire format, checksum
//! - [`simulator`]     — optional loss/corruption injection
//! - [`socket`]        — datagram transport abstraction
//! - [`channel`]       — codec + simulator + transport, inbound classification
//! - [`timer`]         — the single retransmission timer
//! - [`state`]         — receiver finite-state-machine types
//! - [`gbn_sender`]    — packetisation and the sliding window
//! - [`gbn_receiver`]  — in-order delivery and cumulative ACKs
//! - [`sender`]        — sender control loop
//! - [`receiver`]      — receiver control loop with time-wait
//! - [`server`]        — file server, one session per request
//! - [`client`]        — file fetch
//! - [`config`]        — transfer parameters
//! - [`error`]         — error types

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use config::TransferConfig;
pub use error::{ConfigError, TransferError};
pub use packet::{Packet, PacketKind, MAX_PAYLOAD};
