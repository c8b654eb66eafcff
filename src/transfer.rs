//! File transfer over the reliable data channel.
//!
//! # Stream layout
//!
//! ```text
//!  offset ISN+1                 ISN+1+name_len+1
//!     │                              │
//!     ▼                              ▼
//!     ┌──────────────────────────────┬──────────┬──────────┬─────┐
//!     │ remote name, NUL-terminated  │  unit 1  │  unit 2  │ ... │ FIN
//!     └──────────────────────────────┴──────────┴──────────┴─────┘
//! ```
//!
//! The name is one unit, acknowledged like any other.  File bytes follow in
//! units of at most [`Connection::max_unit`] bytes.  The Responder writes into
//! [`TEMP_FILE_NAME`] and renames it once the FIN arrives, so a half-received
//! file never carries the final name.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::connection::{ConnError, Connection, Segment};
use crate::digest::{digest_file, FileDigest};
use crate::packet::MAX_PAYLOAD;
use crate::simulator::LossSimulator;

/// Scratch file the Responder writes into before the final rename.
pub const TEMP_FILE_NAME: &str = "received_file.tmp";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Conn(#[from] ConnError),
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid remote file name {0:?}")]
    InvalidName(String),
    #[error("peer finished before naming the file")]
    MissingName,
}

/// Initiator-side summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub remote_name: String,
    /// File bytes delivered, excluding the name unit.
    pub bytes: u64,
    /// Data units delivered, excluding the name unit.
    pub units: u64,
}

/// Responder-side summary of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Name announced by the Initiator, reduced to its final component.
    pub name: String,
    /// Where the file was finally stored.
    pub path: PathBuf,
    pub bytes: u64,
    /// Digests of the stored file.
    pub digest: FileDigest,
}

// ---------------------------------------------------------------------------
// Initiator
// ---------------------------------------------------------------------------

/// Open `input` and send it under `remote_name`, then FIN.
pub async fn send_path(
    conn: &mut Connection,
    input: &Path,
    remote_name: &str,
) -> Result<SendReport, TransferError> {
    let file = tokio::fs::File::open(input).await?;
    send_file(conn, file, remote_name).await
}

/// Send the name unit, every unit read from `reader`, then FIN.
///
/// End of input ends the unit loop; no empty unit is ever sent.
pub async fn send_file<R>(
    conn: &mut Connection,
    mut reader: R,
    remote_name: &str,
) -> Result<SendReport, TransferError>
where
    R: AsyncRead + Unpin,
{
    conn.send_unit(encode_name(remote_name)?).await?;
    log::info!("[xfer] name {remote_name:?} acknowledged");

    let mut bytes = 0u64;
    let mut units = 0u64;
    let mut buf = vec![0u8; MAX_PAYLOAD];
    loop {
        let unit = conn.max_unit();
        let n = read_unit(&mut reader, &mut buf[..unit]).await?;
        if n == 0 {
            break;
        }
        conn.send_unit(buf[..n].to_vec()).await?;
        bytes += n as u64;
        units += 1;
    }

    conn.close().await?;
    log::info!("[xfer] sent {bytes} bytes in {units} unit(s)");
    Ok(SendReport {
        remote_name: remote_name.to_string(),
        bytes,
        units,
    })
}

/// Fill `buf` from `reader`, stopping early only at end of input.
async fn read_unit<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

/// Receive the leading name unit.  Never subject to simulated loss.
pub async fn receive_name(conn: &mut Connection) -> Result<String, TransferError> {
    match conn.recv_segment(None).await? {
        Segment::Data(payload) => decode_name(&payload),
        Segment::Fin => Err(TransferError::MissingName),
    }
}

/// Receive file units into `dir` until FIN, then rename to `name` and hash.
///
/// `loss` filters every data unit before it is processed.  On failure the
/// scratch file is removed.
pub async fn receive_body(
    conn: &mut Connection,
    dir: &Path,
    name: &str,
    loss: &mut LossSimulator,
) -> Result<ReceivedFile, TransferError> {
    let temp = dir.join(TEMP_FILE_NAME);
    let result = write_body(conn, &temp, loss).await;
    let bytes = match result {
        Ok(n) => n,
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e);
        }
    };

    let path = dir.join(name);
    if let Err(e) = tokio::fs::rename(&temp, &path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e.into());
    }
    let digest = digest_file(&path).await?;
    log::info!("[xfer] stored {bytes} bytes as {}", path.display());

    Ok(ReceivedFile {
        name: name.to_string(),
        path,
        bytes,
        digest,
    })
}

async fn write_body(
    conn: &mut Connection,
    temp: &Path,
    loss: &mut LossSimulator,
) -> Result<u64, TransferError> {
    let mut file = tokio::fs::File::create(temp).await?;
    let mut bytes = 0u64;
    loop {
        match conn.recv_segment(Some(&mut *loss)).await? {
            Segment::Data(payload) => {
                file.write_all(&payload).await?;
                bytes += payload.len() as u64;
            }
            Segment::Fin => break,
        }
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(bytes)
}

/// Name unit, then body.
pub async fn receive_file(
    conn: &mut Connection,
    dir: &Path,
    loss: &mut LossSimulator,
) -> Result<ReceivedFile, TransferError> {
    let name = receive_name(conn).await?;
    receive_body(conn, dir, &name, loss).await
}

// ---------------------------------------------------------------------------
// Name unit
// ---------------------------------------------------------------------------

/// `name` followed by a NUL, checked to fit in one unit.
pub fn encode_name(name: &str) -> Result<Vec<u8>, TransferError> {
    if name.is_empty() || name.len() >= MAX_PAYLOAD || name.contains('\0') {
        return Err(TransferError::InvalidName(name.to_string()));
    }
    let mut unit = Vec::with_capacity(name.len() + 1);
    unit.extend_from_slice(name.as_bytes());
    unit.push(0);
    Ok(unit)
}

/// Text up to the first NUL, reduced to its final path component.
///
/// Only a bare file name is ever honoured, so a peer cannot direct the write
/// outside the output directory.
pub fn decode_name(unit: &[u8]) -> Result<String, TransferError> {
    let raw = unit.split(|&b| b == 0).next().unwrap_or_default();
    let text = std::str::from_utf8(raw)
        .map_err(|_| TransferError::InvalidName(String::from_utf8_lossy(raw).into_owned()))?;
    Path::new(text)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != TEMP_FILE_NAME)
        .map(str::to_string)
        .ok_or_else(|| TransferError::InvalidName(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_unit_is_nul_terminated() {
        let unit = encode_name("report.pdf").unwrap();
        assert_eq!(unit, b"report.pdf\0");
        assert_eq!(unit.len(), "report.pdf".len() + 1);
    }

    #[test]
    fn unencodable_names_rejected() {
        assert!(encode_name("").is_err());
        assert!(encode_name("a\0b").is_err());
        assert!(encode_name(&"x".repeat(MAX_PAYLOAD)).is_err());
        assert!(encode_name(&"x".repeat(MAX_PAYLOAD - 1)).is_ok());
    }

    #[test]
    fn decode_stops_at_nul() {
        assert_eq!(decode_name(b"out.bin\0garbage").unwrap(), "out.bin");
        assert_eq!(decode_name(b"no-terminator").unwrap(), "no-terminator");
    }

    #[test]
    fn decode_keeps_only_final_component() {
        assert_eq!(decode_name(b"../../etc/passwd\0").unwrap(), "passwd");
        assert_eq!(decode_name(b"/tmp/x.txt\0").unwrap(), "x.txt");
    }

    #[test]
    fn decode_rejects_unusable_names() {
        assert!(decode_name(b"\0").is_err());
        assert!(decode_name(b"..\0").is_err());
        assert!(decode_name(b".\0").is_err());
        assert!(decode_name(b"\xff\xfe\0").is_err());
        assert!(decode_name(b"received_file.tmp\0").is_err());
    }

    #[tokio::test]
    async fn read_unit_fills_across_short_reads() {
        let (mut tx, mut rx) = tokio::io::duplex(4);
        let writer = tokio::spawn(async move {
            tx.write_all(b"0123456789").await.unwrap();
        });
        let mut buf = [0u8; 8];
        let n = read_unit(&mut rx, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"01234567");
        writer.await.unwrap();
    }
}
