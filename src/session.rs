//! One endpoint's run: a handshake, then exactly one [`Mode`] over the
//! resulting [`Connection`].
//!
//! The binaries only choose a role and a mode; handshake and teardown live
//! in [`crate::connection`] and are shared by every mode.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::chat::{run_chat, ChatEnd, ChatError};
use crate::config::Config;
use crate::connection::{ConnError, Connection};
use crate::event_log::EventLog;
use crate::simulator::LossSimulator;
use crate::socket::Socket;
use crate::transfer::{receive_body, receive_name, send_path, ReceivedFile, SendReport, TransferError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Conn(#[from] ConnError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("{0} is not available to the {1}")]
    WrongRole(&'static str, Role),
}

/// Which end of the handshake this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends the SYN; the `client` binary.
    Initiator,
    /// Answers the SYN; the `server` binary.
    Responder,
}

impl Role {
    /// Label shown in front of messages received from the other side.
    pub fn peer_label(self) -> &'static str {
        match self {
            Role::Initiator => "Server",
            Role::Responder => "Client",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

/// Direction of a file transfer.
#[derive(Debug)]
pub enum Transfer {
    /// Initiator: send `input` to be stored as `remote_name`.
    Send { input: PathBuf, remote_name: String },
    /// Responder: store the incoming file in `output_dir`, dropping data
    /// units according to `loss`.
    Receive {
        output_dir: PathBuf,
        loss: LossSimulator,
    },
}

/// What to do once the connection is established.
#[derive(Debug)]
pub enum Mode {
    FileTransfer(Transfer),
    Chat,
}

/// Milestones reported while a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<'a> {
    /// The remote file name was received.
    ReceivingFile(&'a str),
    /// Chat has started; local lines are now forwarded.
    ChatStarted,
}

/// How a session finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sent(SendReport),
    Received(ReceivedFile),
    Chat(ChatEnd),
}

/// An established connection and the role that produced it.
#[derive(Debug)]
pub struct Session {
    role: Role,
    conn: Connection,
}

impl Session {
    /// Handshake as the Initiator.
    pub async fn initiate(
        socket: Socket,
        peer: SocketAddr,
        config: &Config,
        events: EventLog,
    ) -> Result<Self, SessionError> {
        let conn = Connection::connect(socket, peer, config, events).await?;
        Ok(Self {
            role: Role::Initiator,
            conn,
        })
    }

    /// Handshake as the Responder.
    pub async fn respond(
        socket: Socket,
        config: &Config,
        events: EventLog,
    ) -> Result<Self, SessionError> {
        let conn = Connection::accept(socket, config, events).await?;
        Ok(Self {
            role: Role::Responder,
            conn,
        })
    }

    /// Wrap a connection that was opened directly.
    pub fn from_connection(role: Role, conn: Connection) -> Self {
        Self { role, conn }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer(&self) -> SocketAddr {
        self.conn.peer()
    }

    /// Run `mode` to completion.
    ///
    /// `input` and `output` are the console used by [`Mode::Chat`]; file modes
    /// ignore them.  `progress` is called at each [`Progress`] milestone.
    pub async fn run<I, W, F>(
        mut self,
        mode: Mode,
        input: I,
        output: &mut W,
        mut progress: F,
    ) -> Result<Outcome, SessionError>
    where
        I: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: FnMut(Progress<'_>),
    {
        match (mode, self.role) {
            (Mode::FileTransfer(Transfer::Send { input, remote_name }), Role::Initiator) => {
                let report = send_path(&mut self.conn, &input, &remote_name).await?;
                Ok(Outcome::Sent(report))
            }
            (
                Mode::FileTransfer(Transfer::Receive {
                    output_dir,
                    mut loss,
                }),
                Role::Responder,
            ) => {
                let name = receive_name(&mut self.conn).await?;
                progress(Progress::ReceivingFile(&name));
                let file = receive_body(&mut self.conn, &output_dir, &name, &mut loss).await?;
                Ok(Outcome::Received(file))
            }
            (Mode::FileTransfer(Transfer::Send { .. }), role) => {
                Err(SessionError::WrongRole("sending a file", role))
            }
            (Mode::FileTransfer(Transfer::Receive { .. }), role) => {
                Err(SessionError::WrongRole("receiving a file", role))
            }
            (Mode::Chat, role) => {
                progress(Progress::ChatStarted);
                let end = run_chat(&mut self.conn, input, output, role.peer_label()).await?;
                Ok(Outcome::Chat(end))
            }
        }
    }
}
