//! Connection finite-state machine (FSM) types.
//!
//! This module defines every phase a [`crate::connection::Connection`] can
//! occupy.  Transitions are driven by [`crate::connection`]; this module only
//! names them and checks which ones are legal.
//!
//! ```text
//!  Initiator:  CLOSED ──SYN sent──▶ SYN_SENT ──SYN-ACK / ACK sent──▶ ESTABLISHED
//!  Responder:  CLOSED ──SYN rcvd──▶ SYN_RECEIVED ──ACK rcvd───────▶ ESTABLISHED
//!
//!  ESTABLISHED ──FIN sent──▶ FIN_SENT ──▶ CLOSED
//!  ESTABLISHED ──FIN rcvd──────────────▶ CLOSED
//! ```
//!
//! There is no FIN acknowledgement, so no TIME_WAIT or CLOSE_WAIT phases.

/// All possible phases of the connection FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection exists; initial and final state.
    #[default]
    Closed,
    /// SYN has been sent; waiting for SYN-ACK.
    SynSent,
    /// SYN received; SYN-ACK sent; waiting for ACK.
    SynReceived,
    /// Three-way handshake complete; data may flow.
    Established,
    /// FIN sent; the sender is about to close locally.
    FinSent,
}

impl ConnectionState {
    /// `true` if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Closed, SynSent)
                | (Closed, SynReceived)
                | (SynSent, Established)
                | (SynReceived, Established)
                | (Established, FinSent)
                | (Established, Closed)
                | (FinSent, Closed)
                | (SynSent, Closed)
                | (SynReceived, Closed)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RECEIVED",
            Self::Established => "ESTABLISHED",
            Self::FinSent => "FIN_SENT",
        };
        f.write_str(name)
    }
}
