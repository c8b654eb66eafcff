//! Inbound segment acceptance for stop-and-wait reliability.
//!
//! - Only **in-order** segments are accepted (`seq == rcv_nxt`).
//! - Duplicates and segments beyond a gap are discarded; there is no
//!   out-of-order buffering.
//! - After every data segment, accepted or not, the caller sends a
//!   **cumulative ACK** carrying [`ack_number`](Receiver::ack_number).  Re-ACKing
//!   a duplicate is what lets a sender whose earlier ACK was lost make
//!   progress.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility (same pattern as [`crate::sender::Sender`]).

/// Receive-side state for one connection.
#[derive(Debug)]
pub struct Receiver {
    /// Next expected sequence number (`RCV.NXT`).
    ///
    /// Advances by `payload.len()` each time an in-order segment is accepted.
    pub rcv_nxt: u32,

    /// Advertised receive window.  Not used for flow control on this side.
    window: u16,
}

impl Receiver {
    /// Create a new [`Receiver`].
    ///
    /// `rcv_nxt` is the first sequence number expected from the peer.  After
    /// a completed 3-way handshake this is `peer_isn + 1`.
    pub fn new(rcv_nxt: u32, window: u16) -> Self {
        Self { rcv_nxt, window }
    }

    /// Process an inbound data segment.
    ///
    /// Returns `true` if the segment was **accepted** (`seq == rcv_nxt`); the
    /// caller then owns delivering `payload` to the application.  Returns
    /// `false` for a duplicate or out-of-order segment, which must not be
    /// delivered.
    pub fn on_segment(&mut self, seq: u32, payload: &[u8]) -> bool {
        if seq == self.rcv_nxt {
            self.rcv_nxt = self.rcv_nxt.wrapping_add(payload.len() as u32);
            true
        } else {
            false
        }
    }

    /// Cumulative ACK number to place in the next outbound packet (`RCV.NXT`).
    pub fn ack_number(&self) -> u32 {
        self.rcv_nxt
    }

    /// Advertised receive window to place in outbound packets.
    pub fn window_size(&self) -> u16 {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let r = Receiver::new(42, 65535);
        assert_eq!(r.ack_number(), 42);
        assert_eq!(r.window_size(), 65535);
    }

    #[test]
    fn in_order_segment_accepted() {
        let mut r = Receiver::new(100, 0);
        assert!(r.on_segment(100, b"hello"));
        assert_eq!(r.ack_number(), 105);
    }

    #[test]
    fn out_of_order_segment_discarded() {
        let mut r = Receiver::new(100, 0);
        assert!(!r.on_segment(110, b"future"));
        assert_eq!(r.ack_number(), 100);
    }

    #[test]
    fn duplicate_segment_discarded() {
        let mut r = Receiver::new(100, 0);
        assert!(r.on_segment(100, b"hello"));
        assert!(!r.on_segment(100, b"hello"));
        assert_eq!(r.ack_number(), 105);
    }

    #[test]
    fn duplicates_do_not_change_reconstructed_stream() {
        let units: [(u32, &[u8]); 3] = [(0, b"abc"), (3, b"de"), (5, b"fghi")];
        let deliveries = [0usize, 0, 1, 0, 1, 2, 2, 1];

        let mut r = Receiver::new(0, 0);
        let mut stream = Vec::new();
        for &i in &deliveries {
            let (seq, payload) = units[i];
            if r.on_segment(seq, payload) {
                stream.extend_from_slice(payload);
            }
        }
        assert_eq!(stream, b"abcdefghi");
        assert_eq!(r.ack_number(), 9);
    }

    #[test]
    fn empty_in_order_segment_does_not_advance() {
        let mut r = Receiver::new(7, 0);
        assert!(r.on_segment(7, b""));
        assert_eq!(r.ack_number(), 7);
    }

    #[test]
    fn seq_wrap_around() {
        let start = u32::MAX - 2;
        let mut r = Receiver::new(start, 0);
        assert!(r.on_segment(start, b"abcde"));
        assert_eq!(r.rcv_nxt, start.wrapping_add(5));
        assert!(r.on_segment(2, b"f"));
        assert_eq!(r.rcv_nxt, 3);
    }
}
