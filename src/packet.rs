//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw datagram back into a [`Packet`].
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             Flags             |          Window Size          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  Payload (0..=1024 bytes) ...                 |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 12 bytes.
//!
//! There is no length field: the payload is whatever follows the header in
//! the datagram, so the transport must preserve message boundaries.

use thiserror::Error;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Synchronise sequence numbers (handshake initiation).
    pub const SYN: u16 = 0x1;
    /// Acknowledgement field is valid.
    pub const ACK: u16 = 0x2;
    /// Finish: sender has no more data to send.
    pub const FIN: u16 = 0x4;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 12;

/// Largest payload a single packet may carry.
pub const MAX_PAYLOAD: usize = 1024;

/// Largest datagram this protocol ever produces.
pub const MAX_DATAGRAM: usize = HEADER_LEN + MAX_PAYLOAD;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_FLAGS: usize = 8;
const OFF_WINDOW: usize = 10;

/// Fixed-size protocol header.
///
/// Fields are in host byte order; [`Packet::encode`] converts to big-endian
/// on the wire and [`Packet::decode`] converts back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Sequence number of the first payload byte in this segment.
    pub seq: u32,
    /// Acknowledgement number (next expected sequence number from the peer).
    pub ack: u32,
    /// Bitmask of [`flags`] constants.
    pub flags: u16,
    /// Advertised receive-window size in bytes.
    pub window: u16,
}

impl Header {
    /// `true` when every bit of `flag` is set.
    pub fn has(&self, flag: u16) -> bool {
        self.flags & flag == flag
    }
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    /// A packet with no payload, used for SYN / ACK / FIN.
    pub fn control(seq: u32, ack: u32, flags: u16, window: u16) -> Self {
        Self {
            header: Header {
                seq,
                ack,
                flags,
                window,
            },
            payload: Vec::new(),
        }
    }

    /// `true` when every bit of `flag` is set in the header.
    pub fn has(&self, flag: u16) -> bool {
        self.header.has(flag)
    }

    /// Sequence number one past the last payload byte.
    pub fn seq_end(&self) -> u32 {
        self.header.seq.wrapping_add(self.payload.len() as u32)
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// Only the bytes actually used are produced: `HEADER_LEN + payload.len()`.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge(self.payload.len()));
        }

        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.header.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.header.ack.to_be_bytes());
        buf[OFF_FLAGS..OFF_FLAGS + 2].copy_from_slice(&self.header.flags.to_be_bytes());
        buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&self.header.window.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        Ok(buf)
    }

    /// Parse a [`Packet`] from one received datagram.
    ///
    /// Returns [`Err`] if `buf` is shorter than [`HEADER_LEN`] or carries more
    /// than [`MAX_PAYLOAD`] bytes after the header.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::Truncated(buf.len()));
        }
        let payload_len = buf.len() - HEADER_LEN;
        if payload_len > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge(payload_len));
        }

        let seq = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let ack = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let flags = u16::from_be_bytes([buf[OFF_FLAGS], buf[OFF_FLAGS + 1]]);
        let window = u16::from_be_bytes([buf[OFF_WINDOW], buf[OFF_WINDOW + 1]]);

        Ok(Packet {
            header: Header {
                seq,
                ack,
                flags,
                window,
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }

    /// Short label for diagnostics, e.g. `SYN-ACK` or `DATA`.
    pub fn kind(&self) -> &'static str {
        let f = self.header.flags;
        if f & flags::FIN != 0 {
            "FIN"
        } else if f & (flags::SYN | flags::ACK) == flags::SYN | flags::ACK {
            "SYN-ACK"
        } else if f & flags::SYN != 0 {
            "SYN"
        } else if !self.payload.is_empty() {
            "DATA"
        } else if f & flags::ACK != 0 {
            "ACK"
        } else {
            "EMPTY"
        }
    }
}

/// Errors that can arise when encoding or parsing a datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Datagram shorter than the fixed header size.
    #[error("datagram of {0} bytes is shorter than the 12-byte header")]
    Truncated(usize),
    /// Payload exceeds [`MAX_PAYLOAD`].
    #[error("payload of {0} bytes exceeds the 1024-byte limit")]
    PayloadTooLarge(usize),
}
