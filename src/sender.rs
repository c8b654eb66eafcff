//! Outbound segment state for stop-and-wait reliability.
//!
//! [`Sender`] tracks the stream offset and the single in-flight unit.
//! It does **not** touch the socket; [`crate::connection::Connection`] calls
//! these methods and owns the actual send/receive loop.
//!
//! # Stop-and-Wait contract
//! - At most **one** unit is in flight at any moment (`unacked`).
//! - A new unit may only be sent once `unacked` is `None`.
//! - On an ACK covering the unit: advance `next_seq` by the unit length;
//!   clear `unacked`.
//! - On timeout: increment `tx_count`; resend the same packet unchanged.

use crate::packet::{flags, Header, Packet};
use crate::seq::seq_ge;

/// A unit that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    /// The unit on the wire.
    pub packet: Packet,
    /// How many times this unit has been transmitted (1 = first send).
    pub tx_count: u32,
}

/// Stop-and-wait send-side state for one connection.
#[derive(Debug)]
pub struct Sender {
    /// Stream offset of the **next** unit to send.
    ///
    /// Advances by the unit length each time an ACK covers the unit in
    /// flight; remains unchanged while a unit is outstanding.
    pub next_seq: u32,

    /// The in-flight unit, or `None` when the sender is idle.
    pub unacked: Option<RetransmitEntry>,
}

impl Sender {
    /// Create a new [`Sender`] whose first unit will carry `next_seq`.
    ///
    /// After the handshake this is `ISN + 1`: the SYN consumed one number.
    pub fn new(next_seq: u32) -> Self {
        Self {
            next_seq,
            unacked: None,
        }
    }

    /// Build a data packet for the current offset.
    ///
    /// Data units piggyback an ACK of the peer's stream.  The caller must
    /// subsequently call [`record_sent`](Self::record_sent).
    pub fn build_data_packet(&self, payload: Vec<u8>, ack: u32, window: u16) -> Packet {
        Packet {
            header: Header {
                seq: self.next_seq,
                ack,
                flags: flags::ACK,
                window,
            },
            payload,
        }
    }

    /// Move `packet` into the in-flight slot (first transmission).
    ///
    /// Panics in debug mode if a unit is already in flight.
    pub fn record_sent(&mut self, packet: Packet) {
        debug_assert!(
            self.unacked.is_none(),
            "record_sent called while a unit is already in flight"
        );
        self.unacked = Some(RetransmitEntry {
            packet,
            tx_count: 1,
        });
    }

    /// Process an inbound cumulative ACK number.
    ///
    /// Returns `true` if `ack_num` is at or past the end of the in-flight
    /// unit (wrap-around aware).  Returns `false` for a stale or unrelated
    /// ACK, or when nothing is in flight.
    ///
    /// On success `next_seq` advances by the unit length, not to `ack_num`.
    pub fn on_ack(&mut self, ack_num: u32) -> bool {
        let Some(entry) = &self.unacked else {
            return false;
        };
        let end = entry.packet.seq_end();
        if seq_ge(ack_num, end) {
            self.next_seq = end;
            self.unacked = None;
            true
        } else {
            false
        }
    }

    /// Increment the retransmit count for the in-flight unit.
    pub fn on_retransmit(&mut self) {
        if let Some(ref mut e) = self.unacked {
            e.tx_count += 1;
        }
    }

    /// Number of times the in-flight unit has been sent, `0` when idle.
    pub fn transmit_count(&self) -> u32 {
        self.unacked.as_ref().map_or(0, |e| e.tx_count)
    }

    /// `true` when a unit is waiting for an ACK.
    pub fn has_unacked(&self) -> bool {
        self.unacked.is_some()
    }

    /// Abandon the in-flight unit without advancing the offset.
    pub fn abandon(&mut self) -> Option<RetransmitEntry> {
        self.unacked.take()
    }
}
