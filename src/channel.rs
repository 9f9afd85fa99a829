//! Packet-level view of an unreliable channel.
//!
//! A [`Channel`] glues the three lower layers together so the engines only
//! ever see whole packets:
//!
//! ```text
//!  send:  Packet ─▶ encode ───────────────────────────────▶ Transport
//!  recv:  Transport ─▶ decode ─▶ Simulator (drop, corrupt) ─▶ verify ─▶ Inbound
//! ```
//!
//! Frames that fail to decode are reported exactly like checksum failures:
//! either way the bytes that arrived cannot be trusted.

use std::io;
use std::net::SocketAddr;

use crate::packet::Packet;
use crate::simulator::Simulator;
use crate::socket::Transport;

/// Classification of one received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// The simulator discarded the frame; nothing was received.
    Lost,
    /// A frame arrived but failed decoding or checksum verification.
    Corrupt { from: SocketAddr },
    /// A frame arrived intact.
    Packet { packet: Packet, from: SocketAddr },
}

/// A transport wrapped with the packet codec and the channel simulator.
#[derive(Debug)]
pub struct Channel<T> {
    transport: T,
    simulator: Simulator,
}

impl<T: Transport> Channel<T> {
    pub fn new(transport: T, simulator: Simulator) -> Self {
        Self { transport, simulator }
    }

    /// A channel that injects no faults of its own.
    pub fn reliable(transport: T) -> Self {
        Self::new(transport, Simulator::passthrough())
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Encode `packet` (checksum attached) and send it to `dest`.
    pub async fn send(&self, packet: &Packet, dest: SocketAddr) -> io::Result<()> {
        self.transport.send_to(&packet.encode(), dest).await
    }

    /// Wait for the next datagram and classify it.
    ///
    /// Only transport errors are returned as `Err`.  Cancel-safe.
    pub async fn recv(&mut self) -> io::Result<Inbound> {
        let (frame, from) = self.transport.recv_from().await?;
        Ok(classify(&mut self.simulator, &frame, from))
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

/// Judge one raw datagram from `from`: decode it, let `simulator` drop or
/// damage it, then verify the checksum.
pub fn classify(simulator: &mut Simulator, frame: &[u8], from: SocketAddr) -> Inbound {
    let mut packet = match Packet::decode(frame) {
        Ok(packet) => packet,
        Err(e) => {
            // Loss is still drawn first so the draw order stays fixed.
            if simulator.maybe_drop() {
                return Inbound::Lost;
            }
            log::trace!("undecodable frame from {from}: {e}");
            return Inbound::Corrupt { from };
        }
    };

    if simulator.maybe_drop() {
        log::trace!("simulated loss of {} seq={}", packet.kind, packet.seq);
        return Inbound::Lost;
    }
    if simulator.maybe_corrupt(&mut packet) {
        log::trace!("simulated corruption of {} seq={}", packet.kind, packet.seq);
    }

    if packet.verify() {
        Inbound::Packet { packet, from }
    } else {
        Inbound::Corrupt { from }
    }
}
