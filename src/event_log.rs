//! Protocol event log.
//!
//! An [`EventLog`] is an explicit handle owned by the connection.  When
//! enabled it appends one timestamped line per protocol event and flushes
//! after every write:
//!
//! ```text
//! [2026-10-16 09:12:44.031552] [LOG] SND DATA SEQ=4821 LEN=1024
//! [2026-10-16 09:12:44.532020] [LOG] TIMEOUT SEQ=4821
//! [2026-10-16 09:12:44.532101] [LOG] RETX DATA SEQ=4821 LEN=1024
//! ```
//!
//! The disabled handle is a `None` check and nothing else.  The log is purely
//! diagnostic; nothing in the protocol reads it back.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// One loggable protocol event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    SndSyn { seq: u32 },
    RcvSyn { seq: u32 },
    SndSynAck { seq: u32, ack: u32 },
    RcvSynAck { seq: u32, ack: u32 },
    SndAckForSyn { ack: u32 },
    RcvAckForSyn { ack: u32 },
    SndData { seq: u32, len: usize },
    RcvData { seq: u32, len: usize },
    SndAck { ack: u32, win: u16 },
    RcvAck { ack: u32 },
    /// Reply that did not acknowledge the unit in flight.
    RcvStale { ack: u32 },
    Drop { seq: u32 },
    Timeout { seq: u32 },
    Retx { seq: u32, len: usize },
    SndFin { seq: u32 },
    RcvFin { seq: u32 },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Event::SndSyn { seq } => write!(f, "SND SYN SEQ={seq}"),
            Event::RcvSyn { seq } => write!(f, "RCV SYN SEQ={seq}"),
            Event::SndSynAck { seq, ack } => write!(f, "SND SYN-ACK SEQ={seq} ACK={ack}"),
            Event::RcvSynAck { seq, ack } => write!(f, "RCV SYN-ACK SEQ={seq} ACK={ack}"),
            Event::SndAckForSyn { ack } => write!(f, "SND ACK FOR SYN ACK={ack}"),
            Event::RcvAckForSyn { ack } => write!(f, "RCV ACK FOR SYN ACK={ack}"),
            Event::SndData { seq, len } => write!(f, "SND DATA SEQ={seq} LEN={len}"),
            Event::RcvData { seq, len } => write!(f, "RCV DATA SEQ={seq} LEN={len}"),
            Event::SndAck { ack, win } => write!(f, "SND ACK={ack} WIN={win}"),
            Event::RcvAck { ack } => write!(f, "RCV ACK={ack}"),
            Event::RcvStale { ack } => write!(f, "RCV STALE ACK={ack}"),
            Event::Drop { seq } => write!(f, "DROP DATA SEQ={seq}"),
            Event::Timeout { seq } => write!(f, "TIMEOUT SEQ={seq}"),
            Event::Retx { seq, len } => write!(f, "RETX DATA SEQ={seq} LEN={len}"),
            Event::SndFin { seq } => write!(f, "SND FIN SEQ={seq}"),
            Event::RcvFin { seq } => write!(f, "RCV FIN SEQ={seq}"),
        }
    }
}

/// Append-only event sink, or nothing at all.
pub struct EventLog {
    sink: Option<Box<dyn Write + Send>>,
}

impl EventLog {
    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Truncate or create `path` and log into it.
    pub fn to_file(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::to_writer(BufWriter::new(file)))
    }

    /// Log into an arbitrary writer.
    pub fn to_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Some(Box::new(writer)),
        }
    }

    /// Open `path` when given, otherwise return a disabled log.
    ///
    /// A file that cannot be opened is reported and the run continues without
    /// an event log, since the log never affects correctness.
    pub fn open(path: Option<&Path>) -> Self {
        match path {
            None => Self::disabled(),
            Some(p) => Self::to_file(p).unwrap_or_else(|e| {
                log::warn!("cannot open event log {}: {e}", p.display());
                Self::disabled()
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Write `event` with a local timestamp and flush.
    pub fn record(&mut self, event: Event) {
        log::trace!("[event] {event}");
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
        let result = writeln!(sink, "[{ts}] [LOG] {event}").and_then(|()| sink.flush());
        if let Err(e) = result {
            log::warn!("event log write failed, disabling: {e}");
            self.sink = None;
        }
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Shared in-memory sink; clones see the same buffer.
///
/// Handy for inspecting the event log of an endpoint that has been moved into
/// another task.
#[derive(Debug, Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<u8>>>);

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Number of lines containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.contents().lines().filter(|l| l.contains(needle)).count()
    }
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_lines_match_protocol_vocabulary() {
        assert_eq!(Event::SndSyn { seq: 9 }.to_string(), "SND SYN SEQ=9");
        assert_eq!(
            Event::RcvSynAck { seq: 1, ack: 10 }.to_string(),
            "RCV SYN-ACK SEQ=1 ACK=10"
        );
        assert_eq!(Event::Drop { seq: 3 }.to_string(), "DROP DATA SEQ=3");
        assert_eq!(
            Event::Retx { seq: 3, len: 1024 }.to_string(),
            "RETX DATA SEQ=3 LEN=1024"
        );
        assert_eq!(
            Event::SndAck { ack: 7, win: 65535 }.to_string(),
            "SND ACK=7 WIN=65535"
        );
    }

    #[test]
    fn enabled_log_writes_timestamped_lines() {
        let sink = MemorySink::new();
        let mut log = EventLog::to_writer(sink.clone());
        log.record(Event::Timeout { seq: 77 });
        log.record(Event::SndFin { seq: 78 });

        let text = sink.contents();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] [LOG] TIMEOUT SEQ=77"));
        assert!(lines[1].ends_with("SND FIN SEQ=78"));
    }

    #[test]
    fn disabled_log_is_inert() {
        let mut log = EventLog::disabled();
        assert!(!log.is_enabled());
        log.record(Event::RcvFin { seq: 1 });
        assert!(!EventLog::open(None).is_enabled());
    }

    #[test]
    fn count_matches_substrings() {
        let sink = MemorySink::new();
        let mut log = EventLog::to_writer(sink.clone());
        log.record(Event::Drop { seq: 1 });
        log.record(Event::Drop { seq: 2 });
        log.record(Event::RcvAck { ack: 2 });
        assert_eq!(sink.count("DROP"), 2);
        assert_eq!(sink.count("RCV ACK="), 1);
    }
}
