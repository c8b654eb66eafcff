//! `sham`: a minimal reliable transport over UDP, with file transfer and
//! line-based chat on top.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  ┌──────────────┐
//!  │   transfer   │  │     chat     │   applications
//!  └──────┬───────┘  └──────┬───────┘
//!         └────────┬────────┘
//!          ┌───────▼────────┐
//!          │    session     │   role + mode over one handshake
//!          └───────┬────────┘
//!  ┌───────────────▼───────────────────┐
//!  │           Connection              │
//!  │  (state machine, ARQ, teardown)   │──▶ EventLog
//!  └──┬──────────┬──────────┬──────────┘
//!     │ Sender   │ Receiver │ RetransmitTimer
//!  ┌──▼──────────▼──────────▼──┐
//!  │  Socket                   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]     : wire format (serialise / deserialise)
//! - [`seq`]        : wrap-around sequence comparisons
//! - [`state`]      : finite-state-machine types
//! - [`socket`]     : async UDP socket abstraction
//! - [`sender`]     : stop-and-wait outbound unit state
//! - [`receiver`]   : stop-and-wait inbound acceptance
//! - [`timer`]      : retransmission policy and back-off
//! - [`connection`] : handshake, reliable units, FIN, raw datagrams
//! - [`simulator`]  : receive-side loss injection
//! - [`transfer`]   : file transfer: name unit, data units, rename, digest
//! - [`chat`]       : unreliable line messaging
//! - [`session`]    : role and mode selection
//! - [`digest`]     : MD5 and SHA-256 of the received file
//! - [`event_log`]  : optional timestamped protocol event log
//! - [`config`]     : defaults and environment overrides

pub mod chat;
pub mod config;
pub mod connection;
pub mod digest;
pub mod event_log;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod seq;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;
pub mod transfer;
