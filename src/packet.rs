//! Wire-format definitions for protocol packets.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the fixed-size on-wire binary layout.
//! - Serialising a [`Packet`] into a frame with its checksum attached.
//! - Parsing a frame back into a [`Packet`], returning errors for frames
//!   whose structure is unusable (wrong size, unknown type, bad length).
//! - Verifying the checksum of a parsed packet.
//!
//! No I/O happens here — this is pure data transformation.  Decoding does
//! **not** reject checksum mismatches; callers run [`Packet::verify`] after
//! any channel simulation so that corruption is detected where it is handled.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.  Every frame is exactly
//! [`FRAME_LEN`] bytes; unused payload bytes are zero.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Sequence / ACK number (i32)                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Type code (i32)                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Payload length (i32)                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Payload (MAX_PAYLOAD bytes) ...               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Checksum           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The checksum covers the 12 header bytes followed by the first
//! `payload length` payload bytes; the checksum trailer is not covered.

use thiserror::Error;

/// Maximum number of payload bytes carried by one packet.
pub const MAX_PAYLOAD: usize = 100;

/// Byte length of the header (sequence + type + payload length).
pub const HEADER_LEN: usize = 12;

/// Byte length of every frame on the wire.
pub const FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD + 2;

// Byte offsets of each field within the serialised frame.
const OFF_SEQ: usize = 0;
const OFF_TYPE: usize = 4;
const OFF_LEN: usize = 8;
const OFF_PAYLOAD: usize = HEADER_LEN;
const OFF_CHECKSUM: usize = HEADER_LEN + MAX_PAYLOAD;

/// The four packet types carried in the type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// A data packet that is not the last one of its transfer.
    Data,
    /// The last data packet of a transfer.
    FinalData,
    /// A file request; the payload is the requested file name.
    Request,
    /// A cumulative acknowledgement; `seq` is the acknowledged number.
    Ack,
}

impl PacketKind {
    /// Type code written to the wire.
    pub fn code(self) -> i32 {
        match self {
            PacketKind::Data => 0,
            PacketKind::FinalData => 1,
            PacketKind::Request => 2,
            PacketKind::Ack => 3,
        }
    }

    /// `true` for [`PacketKind::Data`] and [`PacketKind::FinalData`].
    pub fn carries_data(self) -> bool {
        matches!(self, PacketKind::Data | PacketKind::FinalData)
    }
}

impl TryFrom<i32> for PacketKind {
    type Error = PacketError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(PacketKind::Data),
            1 => Ok(PacketKind::FinalData),
            2 => Ok(PacketKind::Request),
            3 => Ok(PacketKind::Ack),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PacketKind::Data => "DATA",
            PacketKind::FinalData => "FINAL",
            PacketKind::Request => "REQUEST",
            PacketKind::Ack => "ACK",
        };
        f.write_str(name)
    }
}

/// A protocol packet: header fields, payload, and the checksum it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence number for data packets, acknowledged number for ACKs.
    ///
    /// An ACK of `-1` means "nothing accepted yet".
    pub seq: i32,
    pub kind: PacketKind,
    /// Valid payload bytes; never longer than [`MAX_PAYLOAD`].  Private so
    /// its length can only be set through [`Packet::new`] or decoding.
    payload: Vec<u8>,
    /// Checksum as last sealed or as read off the wire.
    pub checksum: u16,
}

impl Packet {
    /// Build a packet and seal its checksum.
    ///
    /// Returns [`PacketError::PayloadTooLong`] when `payload` exceeds
    /// [`MAX_PAYLOAD`].
    pub fn new(seq: i32, kind: PacketKind, payload: Vec<u8>) -> Result<Self, PacketError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLong(payload.len()));
        }
        let mut packet = Packet {
            seq,
            kind,
            payload,
            checksum: 0,
        };
        packet.seal();
        Ok(packet)
    }

    /// A cumulative acknowledgement for `seq`.
    pub fn ack(seq: i32) -> Self {
        let mut packet = Packet {
            seq,
            kind: PacketKind::Ack,
            payload: Vec::new(),
            checksum: 0,
        };
        packet.seal();
        packet
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Mutable view of the payload bytes; the length stays fixed.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// A request for the file called `name`.
    pub fn request(name: &str) -> Result<Self, PacketError> {
        Packet::new(0, PacketKind::Request, name.as_bytes().to_vec())
    }

    /// Recompute the checksum from the current fields and store it.
    pub fn seal(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// `true` when the stored checksum matches the packet's contents.
    ///
    /// Any mismatch means the packet was corrupted in transit.
    pub fn verify(&self) -> bool {
        self.compute_checksum() == self.checksum
    }

    /// Serialise into a fixed-size frame.
    ///
    /// The checksum is recomputed from the fields and written to the frame;
    /// use [`Packet::seal`] beforehand if the stored field should match.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        self.write_header(&mut frame);
        frame[OFF_PAYLOAD..OFF_PAYLOAD + self.payload.len()].copy_from_slice(&self.payload);

        let csum = internet_checksum(&frame[..OFF_PAYLOAD + self.payload.len()]);
        frame[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());
        frame
    }

    /// Parse a [`Packet`] from a raw frame.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is not exactly [`FRAME_LEN`] bytes,
    /// - the type code is unknown, or
    /// - the payload length is negative or above [`MAX_PAYLOAD`].
    ///
    /// The checksum is carried over unverified.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() != FRAME_LEN {
            return Err(PacketError::WrongLength(buf.len()));
        }

        let seq = read_i32(buf, OFF_SEQ);
        let kind = PacketKind::try_from(read_i32(buf, OFF_TYPE))?;
        let len = read_i32(buf, OFF_LEN);
        let len = usize::try_from(len)
            .ok()
            .filter(|&n| n <= MAX_PAYLOAD)
            .ok_or(PacketError::BadPayloadLength(len))?;
        let checksum = u16::from_be_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]);

        Ok(Packet {
            seq,
            kind,
            payload: buf[OFF_PAYLOAD..OFF_PAYLOAD + len].to_vec(),
            checksum,
        })
    }

    fn write_header(&self, frame: &mut [u8]) {
        frame[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        frame[OFF_TYPE..OFF_TYPE + 4].copy_from_slice(&self.kind.code().to_be_bytes());
        // payload.len() <= MAX_PAYLOAD, so the cast cannot truncate.
        frame[OFF_LEN..OFF_LEN + 4].copy_from_slice(&(self.payload.len() as i32).to_be_bytes());
    }

    fn compute_checksum(&self) -> u16 {
        let mut covered = Vec::with_capacity(HEADER_LEN + self.payload.len());
        covered.resize(HEADER_LEN, 0);
        self.write_header(&mut covered);
        covered.extend_from_slice(&self.payload);
        internet_checksum(&covered)
    }
}

/// Errors that can arise when parsing or building a packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("frame is {0} bytes, expected {FRAME_LEN}")]
    WrongLength(usize),
    #[error("unknown packet type code {0}")]
    UnknownType(i32),
    #[error("payload length field {0} outside 0..={MAX_PAYLOAD}")]
    BadPayloadLength(i32),
    #[error("payload of {0} bytes exceeds {MAX_PAYLOAD}")]
    PayloadTooLong(usize),
}

fn read_i32(buf: &[u8], off: usize) -> i32 {
    i32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Compute the Internet checksum (RFC 1071) over `data`.
///
/// Sum consecutive 16-bit big-endian words, fold the carry, return the
/// one's-complement.
///
/// Known blind spots: swapping two aligned 16-bit words, or turning a word
/// of `0x0000` into `0xFFFF` (and back), leaves the sum unchanged.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);

    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    // Odd trailing byte — pad with a zero byte on the right.
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}
