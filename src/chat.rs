//! Unreliable line-oriented messaging over an established connection.
//!
//! Each local line becomes one or more NUL-terminated datagrams with no flags
//! and no retransmission.  The local line source and the socket are awaited
//! together with `tokio::select!`; both futures are cancel-safe, so a line
//! arriving while a datagram is in progress is never lost locally.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::connection::{ConnError, Connection};
use crate::packet::MAX_PAYLOAD;

/// Command that ends the session on either side.
pub const QUIT: &str = "/quit";

/// Longest text carried by one datagram, leaving room for the NUL.
pub const MAX_TEXT: usize = MAX_PAYLOAD - 1;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Conn(#[from] ConnError),
    #[error("console I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which side ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatEnd {
    /// Local `/quit`, or the local line source reached its end.
    Local,
    /// The peer sent `/quit`.
    Peer,
}

/// Relay lines between `input`/`output` and the peer until either side quits.
///
/// Received messages are written as `"{peer_label}: {text}"`.
pub async fn run_chat<I, W>(
    conn: &mut Connection,
    input: I,
    output: &mut W,
    peer_label: &str,
) -> Result<ChatEnd, ChatError>
where
    I: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let end = loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line?;
                let text = match &line {
                    Some(l) => l.trim_end_matches('\r'),
                    None => {
                        log::debug!("[chat] local input closed");
                        QUIT
                    }
                };
                for datagram in encode_message(text) {
                    conn.send_datagram(&datagram).await?;
                }
                if text == QUIT {
                    break ChatEnd::Local;
                }
            }
            payload = conn.recv_datagram() => {
                let text = decode_message(&payload?);
                output
                    .write_all(format!("{peer_label}: {text}\n").as_bytes())
                    .await?;
                output.flush().await?;
                if text == QUIT {
                    break ChatEnd::Peer;
                }
            }
        }
    };

    conn.shutdown();
    log::info!("[chat] session ended ({end:?})");
    Ok(end)
}

/// Split `text` into NUL-terminated datagrams of at most [`MAX_PAYLOAD`]
/// bytes, never cutting a UTF-8 sequence.  An empty line is one datagram.
pub fn encode_message(text: &str) -> Vec<Vec<u8>> {
    let mut datagrams = Vec::new();
    let mut rest = text;
    loop {
        let mut cut = rest.len().min(MAX_TEXT);
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (head, tail) = rest.split_at(cut);
        let mut d = Vec::with_capacity(head.len() + 1);
        d.extend_from_slice(head.as_bytes());
        d.push(0);
        datagrams.push(d);
        if tail.is_empty() {
            return datagrams;
        }
        rest = tail;
    }
}

/// Text up to the first NUL; invalid UTF-8 is replaced.
pub fn decode_message(payload: &[u8]) -> String {
    let text = payload.split(|&b| b == 0).next().unwrap_or_default();
    String::from_utf8_lossy(text).into_owned()
}
