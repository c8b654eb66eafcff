//! Per-connection lifecycle manager.
//!
//! A [`Connection`] owns the complete state for one peer-to-peer session:
//! - Driving the finite-state machine (see [`crate::state`]).
//! - The three-way handshake, from either side.
//! - Coordinating [`crate::sender`] and [`crate::receiver`] for the
//!   stop-and-wait data channel.
//! - Retransmission on timeout according to [`crate::timer`].
//! - The one-sided FIN teardown.
//! - Raw, unacknowledged datagrams for the messaging mode.
//!
//! Connection objects are created either by an active open
//! ([`Connection::connect`], Initiator) or by accepting a peer's SYN
//! ([`Connection::accept`], Responder).  Each process handles exactly one
//! peer; packets from any other address are ignored once the peer is known.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::time::{timeout, timeout_at, Instant};

use crate::config::Config;
use crate::event_log::{Event, EventLog};
use crate::packet::{flags, Header, Packet, MAX_PAYLOAD};
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::simulator::LossSimulator;
use crate::socket::{Socket, SocketError};
use crate::state::ConnectionState;
use crate::timer::RetransmitTimer;

/// Why a handshake was abandoned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("expected SYN as first packet, got {0}")]
    ExpectedSyn(&'static str),
    #[error("expected SYN-ACK, got {0}")]
    ExpectedSynAck(&'static str),
    #[error("expected ACK of SYN-ACK, got {0}")]
    ExpectedAck(&'static str),
    #[error("handshake acknowledges {got}, expected {expected}")]
    AckMismatch { expected: u32, got: u32 },
    #[error("no SYN-ACK after {0} SYN transmission(s)")]
    TimedOut(u32),
}

/// Errors surfaced by a [`Connection`].
#[derive(Debug, Error)]
pub enum ConnError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("unit at seq {seq} unacknowledged after {attempts} transmission(s)")]
    RetriesExhausted { seq: u32, attempts: u32 },
    #[error("operation not valid in state {0}")]
    BadState(ConnectionState),
    #[error("unit of {0} bytes exceeds the maximum payload")]
    UnitTooLarge(usize),
}

/// What the reliable receive path produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// An in-order data unit, already acknowledged.
    Data(Vec<u8>),
    /// The peer finished its stream.
    Fin,
}

/// A handle to a single connection over UDP.
#[derive(Debug)]
pub struct Connection {
    /// Current FSM state.
    pub state: ConnectionState,
    /// Outbound stream offset and in-flight unit.
    pub sender: Sender,
    /// Inbound expected offset.
    pub receiver: Receiver,
    socket: Socket,
    peer: SocketAddr,
    /// Window most recently advertised by the peer; `0` until one is seen.
    peer_window: u16,
    timer: RetransmitTimer,
    events: EventLog,
}

impl Connection {
    // -----------------------------------------------------------------------
    // Opening
    // -----------------------------------------------------------------------

    /// Active open (Initiator) with a random initial sequence number.
    pub async fn connect(
        socket: Socket,
        peer: SocketAddr,
        config: &Config,
        events: EventLog,
    ) -> Result<Self, ConnError> {
        Self::connect_with_isn(socket, peer, config, events, rand::random()).await
    }

    /// Active open (Initiator) starting from `isn`.
    ///
    /// `CLOSED → SYN_SENT → ESTABLISHED`.  A reply that is not a SYN-ACK, or
    /// that does not acknowledge `isn + 1`, aborts the handshake.
    pub async fn connect_with_isn(
        socket: Socket,
        peer: SocketAddr,
        config: &Config,
        events: EventLog,
        isn: u32,
    ) -> Result<Self, ConnError> {
        let mut conn = Self::new(socket, peer, config, events, isn, 0);

        let syn = Packet::control(isn, 0, flags::SYN, config.window);
        conn.socket.send_to(&syn, peer).await?;
        conn.events.record(Event::SndSyn { seq: isn });
        conn.transition(ConnectionState::SynSent);
        log::debug!("[conn] → SYN seq={isn} to {peer}");

        let mut transmissions = 1u32;
        let reply = loop {
            let next = match config.handshake_timeout {
                None => Some(conn.recv_from_peer().await?),
                Some(wait) => timeout(wait, conn.recv_from_peer()).await.ok().transpose()?,
            };
            match next {
                Some(pkt) => break pkt,
                None if transmissions > config.handshake_retries => {
                    conn.transition(ConnectionState::Closed);
                    return Err(HandshakeError::TimedOut(transmissions).into());
                }
                None => {
                    conn.socket.send_to(&syn, peer).await?;
                    conn.events.record(Event::SndSyn { seq: isn });
                    transmissions += 1;
                    log::debug!("[conn] SYN timeout; → SYN seq={isn} (attempt {transmissions})");
                }
            }
        };

        if !reply.has(flags::SYN | flags::ACK) {
            conn.transition(ConnectionState::Closed);
            return Err(HandshakeError::ExpectedSynAck(reply.kind()).into());
        }
        let expected = isn.wrapping_add(1);
        if reply.header.ack != expected {
            conn.transition(ConnectionState::Closed);
            return Err(HandshakeError::AckMismatch {
                expected,
                got: reply.header.ack,
            }
            .into());
        }

        let peer_isn = reply.header.seq;
        conn.events.record(Event::RcvSynAck {
            seq: peer_isn,
            ack: reply.header.ack,
        });
        conn.peer_window = reply.header.window;
        conn.sender = Sender::new(expected);
        conn.receiver = Receiver::new(peer_isn.wrapping_add(1), config.window);

        let ack = Packet::control(
            conn.sender.next_seq,
            conn.receiver.ack_number(),
            flags::ACK,
            config.window,
        );
        conn.socket.send_to(&ack, peer).await?;
        conn.events.record(Event::SndAckForSyn {
            ack: conn.receiver.ack_number(),
        });
        conn.transition(ConnectionState::Established);
        log::info!("[conn] established with {peer} (isn={isn}, peer_isn={peer_isn})");
        Ok(conn)
    }

    /// Passive open (Responder) with a random initial sequence number.
    pub async fn accept(
        socket: Socket,
        config: &Config,
        events: EventLog,
    ) -> Result<Self, ConnError> {
        Self::accept_with_isn(socket, config, events, rand::random()).await
    }

    /// Passive open (Responder) starting from `isn`.
    ///
    /// The first decodable datagram fixes the peer address and must carry SYN.
    /// `CLOSED → SYN_RECEIVED → ESTABLISHED`.
    pub async fn accept_with_isn(
        socket: Socket,
        config: &Config,
        mut events: EventLog,
        isn: u32,
    ) -> Result<Self, ConnError> {
        let (syn, peer) = loop {
            match socket.recv_from().await {
                Ok(v) => break v,
                Err(e) if e.is_malformed() => log::debug!("[conn] ignoring datagram: {e}"),
                Err(e) => return Err(e.into()),
            }
        };
        if !syn.has(flags::SYN) {
            return Err(HandshakeError::ExpectedSyn(syn.kind()).into());
        }
        let peer_isn = syn.header.seq;
        events.record(Event::RcvSyn { seq: peer_isn });

        let mut conn = Self::new(socket, peer, config, events, isn, peer_isn.wrapping_add(1));
        conn.peer_window = syn.header.window;
        conn.transition(ConnectionState::SynReceived);

        let syn_ack = Packet::control(
            isn,
            conn.receiver.ack_number(),
            flags::SYN | flags::ACK,
            config.window,
        );
        conn.send_syn_ack(&syn_ack).await?;

        let expected = isn.wrapping_add(1);
        loop {
            let pkt = conn.recv_from_peer().await?;
            if pkt.has(flags::SYN) && !pkt.has(flags::ACK) && pkt.header.seq == peer_isn {
                // Our SYN-ACK was lost or slow; the Initiator retried.
                conn.send_syn_ack(&syn_ack).await?;
                continue;
            }
            if !pkt.has(flags::ACK) {
                conn.transition(ConnectionState::Closed);
                return Err(HandshakeError::ExpectedAck(pkt.kind()).into());
            }
            if pkt.header.ack != expected {
                conn.transition(ConnectionState::Closed);
                return Err(HandshakeError::AckMismatch {
                    expected,
                    got: pkt.header.ack,
                }
                .into());
            }
            conn.events.record(Event::RcvAckForSyn {
                ack: pkt.header.ack,
            });
            if !pkt.payload.is_empty() {
                log::debug!(
                    "[conn] handshake completed by data seq={}; awaiting retransmission",
                    pkt.header.seq
                );
            }
            break;
        }

        conn.sender = Sender::new(expected);
        conn.transition(ConnectionState::Established);
        log::info!("[conn] established with {peer} (isn={isn}, peer_isn={peer_isn})");
        Ok(conn)
    }

    fn new(
        socket: Socket,
        peer: SocketAddr,
        config: &Config,
        events: EventLog,
        isn: u32,
        rcv_nxt: u32,
    ) -> Self {
        Self {
            state: ConnectionState::Closed,
            sender: Sender::new(isn),
            receiver: Receiver::new(rcv_nxt, config.window),
            socket,
            peer,
            peer_window: 0,
            timer: RetransmitTimer::new(config.retransmit),
            events,
        }
    }

    async fn send_syn_ack(&mut self, syn_ack: &Packet) -> Result<(), ConnError> {
        self.socket.send_to(syn_ack, self.peer).await?;
        self.events.record(Event::SndSynAck {
            seq: syn_ack.header.seq,
            ack: syn_ack.header.ack,
        });
        log::debug!(
            "[conn] → SYN-ACK seq={} ack={}",
            syn_ack.header.seq,
            syn_ack.header.ack
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reliable data channel
    // -----------------------------------------------------------------------

    /// Deliver one unit reliably: send, then retransmit on every RTO expiry
    /// until an ACK at or past the end of the unit arrives.
    ///
    /// Replies that acknowledge less are stale and do not restart the timer.
    /// With a retry ceiling configured, exhaustion yields
    /// [`ConnError::RetriesExhausted`] and the offset does not advance.
    pub async fn send_unit(&mut self, payload: Vec<u8>) -> Result<(), ConnError> {
        self.expect_state(ConnectionState::Established)?;
        if payload.len() > MAX_PAYLOAD {
            return Err(ConnError::UnitTooLarge(payload.len()));
        }

        let len = payload.len();
        let pkt = self.sender.build_data_packet(
            payload,
            self.receiver.ack_number(),
            self.receiver.window_size(),
        );
        let seq = pkt.header.seq;
        self.socket.send_to(&pkt, self.peer).await?;
        self.events.record(Event::SndData { seq, len });
        log::debug!("[conn] → DATA seq={seq} len={len}");
        self.sender.record_sent(pkt);

        self.timer.reset();
        let mut deadline = Instant::now() + self.timer.current_rto();

        loop {
            match timeout_at(deadline, self.socket.recv_from()).await {
                Err(_elapsed) => {
                    self.events.record(Event::Timeout { seq });
                    let Some(rto) = self.timer.on_timeout() else {
                        let attempts = self.sender.transmit_count();
                        self.sender.abandon();
                        log::warn!("[conn] giving up on seq={seq} after {attempts} transmission(s)");
                        return Err(ConnError::RetriesExhausted { seq, attempts });
                    };
                    self.retransmit().await?;
                    self.events.record(Event::Retx { seq, len });
                    deadline = Instant::now() + rto;
                }
                Ok(Err(e)) if e.is_malformed() => {
                    log::debug!("[conn] ignoring datagram: {e}");
                }
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok((reply, addr))) => {
                    if addr != self.peer {
                        log::debug!("[conn] ignoring packet from stranger {addr}");
                        continue;
                    }
                    if reply.has(flags::ACK) {
                        self.note_window(reply.header.window);
                        if self.sender.on_ack(reply.header.ack) {
                            self.events.record(Event::RcvAck {
                                ack: reply.header.ack,
                            });
                            log::debug!("[conn] ← ACK ack={}", reply.header.ack);
                            return Ok(());
                        }
                    }
                    self.events.record(Event::RcvStale {
                        ack: reply.header.ack,
                    });
                    log::debug!(
                        "[conn] ← stale {} ack={} while seq={seq} in flight",
                        reply.kind(),
                        reply.header.ack
                    );
                }
            }
        }
    }

    async fn retransmit(&mut self) -> Result<(), ConnError> {
        if let Some(entry) = &self.sender.unacked {
            self.socket.send_to(&entry.packet, self.peer).await?;
            log::debug!(
                "[conn] timeout, retransmitting seq={} (rto={:?})",
                entry.packet.header.seq,
                self.timer.current_rto()
            );
        }
        self.sender.on_retransmit();
        Ok(())
    }

    /// Wait for the next in-order data unit or the peer's FIN.
    ///
    /// Every data packet that survives `loss` is answered with a cumulative
    /// ACK, including duplicates and packets beyond a gap, which are not
    /// delivered.  A packet dropped by `loss` is neither processed nor
    /// acknowledged.  FIN is never subject to `loss` and is not acknowledged.
    pub async fn recv_segment(
        &mut self,
        mut loss: Option<&mut LossSimulator>,
    ) -> Result<Segment, ConnError> {
        self.expect_state(ConnectionState::Established)?;

        loop {
            let pkt = self.recv_from_peer().await?;
            let seq = pkt.header.seq;

            if pkt.has(flags::FIN) {
                self.events.record(Event::RcvFin { seq });
                log::debug!("[conn] ← FIN seq={seq}");
                self.transition(ConnectionState::Closed);
                return Ok(Segment::Fin);
            }
            if pkt.payload.is_empty() {
                log::debug!("[conn] ignoring empty {} seq={seq}", pkt.kind());
                continue;
            }
            if let Some(sim) = loss.as_deref_mut() {
                if sim.should_drop() {
                    self.events.record(Event::Drop { seq });
                    log::debug!("[conn] simulated loss of seq={seq}");
                    continue;
                }
            }

            self.events.record(Event::RcvData {
                seq,
                len: pkt.payload.len(),
            });
            let accepted = self.receiver.on_segment(seq, &pkt.payload);
            self.send_ack().await?;

            if accepted {
                return Ok(Segment::Data(pkt.payload));
            }
            log::debug!(
                "[conn] ← out-of-order seq={seq}, expected {}",
                self.receiver.ack_number()
            );
        }
    }

    async fn send_ack(&mut self) -> Result<(), ConnError> {
        let ack = Packet::control(
            self.sender.next_seq,
            self.receiver.ack_number(),
            flags::ACK,
            self.receiver.window_size(),
        );
        self.socket.send_to(&ack, self.peer).await?;
        self.events.record(Event::SndAck {
            ack: ack.header.ack,
            win: ack.header.window,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Send a single FIN at the current offset and close locally.
    ///
    /// The FIN itself is not acknowledged; if it is lost the peer never
    /// learns the stream ended.
    pub async fn close(&mut self) -> Result<(), ConnError> {
        self.expect_state(ConnectionState::Established)?;
        if self.sender.has_unacked() {
            return Err(ConnError::BadState(self.state));
        }
        let seq = self.sender.next_seq;
        let fin = Packet::control(
            seq,
            self.receiver.ack_number(),
            flags::FIN,
            self.receiver.window_size(),
        );
        self.socket.send_to(&fin, self.peer).await?;
        self.events.record(Event::SndFin { seq });
        self.transition(ConnectionState::FinSent);
        log::debug!("[conn] → FIN seq={seq}");
        self.transition(ConnectionState::Closed);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Unreliable datagrams
    // -----------------------------------------------------------------------

    /// Send `payload` once, with no flags, no ACK and no retransmission.
    pub async fn send_datagram(&mut self, payload: &[u8]) -> Result<(), ConnError> {
        self.expect_state(ConnectionState::Established)?;
        if payload.len() > MAX_PAYLOAD {
            return Err(ConnError::UnitTooLarge(payload.len()));
        }
        let pkt = Packet {
            header: Header {
                seq: self.sender.next_seq,
                ack: 0,
                flags: 0,
                window: self.receiver.window_size(),
            },
            payload: payload.to_vec(),
        };
        self.socket.send_to(&pkt, self.peer).await?;
        Ok(())
    }

    /// Wait for the next datagram from the peer and return its payload.
    ///
    /// Late handshake or teardown packets (any flag set) are skipped.  This
    /// future is cancel-safe.
    pub async fn recv_datagram(&mut self) -> Result<Vec<u8>, ConnError> {
        self.expect_state(ConnectionState::Established)?;
        loop {
            let pkt = self.recv_from_peer().await?;
            if pkt.header.flags == 0 {
                return Ok(pkt.payload);
            }
            log::debug!("[conn] ignoring {} during messaging", pkt.kind());
        }
    }

    /// Mark a messaging session as finished.
    pub fn shutdown(&mut self) {
        if self.state != ConnectionState::Closed {
            self.transition(ConnectionState::Closed);
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Next byte offset this side will send.
    pub fn local_seq(&self) -> u32 {
        self.sender.next_seq
    }

    /// Next byte offset expected from the peer.
    pub fn peer_expected_seq(&self) -> u32 {
        self.receiver.ack_number()
    }

    /// Window most recently advertised by the peer, `0` if none yet.
    pub fn peer_window(&self) -> u16 {
        self.peer_window
    }

    /// Largest unit the peer's advertised window allows, at most
    /// [`MAX_PAYLOAD`].  A window of zero means none was advertised.
    pub fn max_unit(&self) -> usize {
        match self.peer_window {
            0 => MAX_PAYLOAD,
            w => MAX_PAYLOAD.min(w as usize),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Receive the next decodable packet from the peer, skipping strangers
    /// and malformed datagrams.  Cancel-safe.
    async fn recv_from_peer(&mut self) -> Result<Packet, SocketError> {
        loop {
            match self.socket.recv_from().await {
                Ok((pkt, addr)) if addr == self.peer => return Ok(pkt),
                Ok((_, addr)) => log::debug!("[conn] ignoring packet from stranger {addr}"),
                Err(e) if e.is_malformed() => log::debug!("[conn] ignoring datagram: {e}"),
                Err(e) => return Err(e),
            }
        }
    }

    fn note_window(&mut self, window: u16) {
        if window != self.peer_window {
            log::debug!("[conn] peer window {} → {}", self.peer_window, window);
            self.peer_window = window;
        }
    }

    fn expect_state(&self, wanted: ConnectionState) -> Result<(), ConnError> {
        if self.state == wanted {
            Ok(())
        } else {
            Err(ConnError::BadState(self.state))
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} → {}",
            self.state,
            next
        );
        log::debug!("[conn] {} → {}", self.state, next);
        self.state = next;
    }
}
