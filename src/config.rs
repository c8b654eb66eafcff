//! Runtime configuration: built-in defaults, then environment overrides.
//!
//! | Variable                    | Meaning                                   |
//! |-----------------------------|-------------------------------------------|
//! | `SHAM_RTO_MS`               | base retransmission timeout (ms)          |
//! | `SHAM_MAX_RETRIES`          | retransmissions per unit (`none` = ∞)     |
//! | `SHAM_BACKOFF`              | `fixed` or `exponential`                  |
//! | `SHAM_MAX_RTO_MS`           | cap for exponential back-off (ms)         |
//! | `SHAM_HANDSHAKE_TIMEOUT_MS` | SYN wait before re-sending (unset = ∞)    |
//! | `SHAM_HANDSHAKE_RETRIES`    | SYN re-sends before giving up             |
//! | `SHAM_WINDOW`               | advertised receive window (bytes)         |
//! | `RUDP_LOG`                  | `1` enables the protocol event log        |
//! | `SHAM_LOG_PATH`             | event log file, overrides the role default|

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::timer::{Backoff, RetransmitPolicy, DEFAULT_MAX_RTO};

/// Receive window the Responder advertises by default.
pub const DEFAULT_WINDOW: u16 = u16::MAX;

/// Errors produced while building a [`Config`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
    #[error("loss rate {0} is outside [0.0, 1.0]")]
    LossRate(f64),
}

/// Endpoint configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Data-unit retransmission policy.
    pub retransmit: RetransmitPolicy,
    /// How long the Initiator waits for SYN-ACK before re-sending SYN.
    /// `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// SYN re-sends allowed when `handshake_timeout` is set.
    pub handshake_retries: u32,
    /// Receive window advertised in SYN-ACK and ACK packets.
    pub window: u16,
    /// Event log destination; `None` disables the event log.
    pub event_log: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retransmit: RetransmitPolicy::default(),
            handshake_timeout: None,
            handshake_retries: 0,
            window: DEFAULT_WINDOW,
            event_log: None,
        }
    }
}

impl Config {
    /// Defaults overridden by the process environment.
    ///
    /// `default_log` is the event log file used when `RUDP_LOG=1` and
    /// `SHAM_LOG_PATH` is unset.
    pub fn from_env(default_log: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(default_log, |var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup, so the
    /// parsing can be tested without touching the real environment.
    pub fn from_lookup<F>(default_log: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut c = Config::default();

        if let Some(rto) = parse_millis(&lookup, "SHAM_RTO_MS")? {
            c.retransmit.rto = rto;
        }
        if let Some(v) = lookup("SHAM_MAX_RETRIES") {
            c.retransmit.max_retries = if v.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_value("SHAM_MAX_RETRIES", &v)?)
            };
        }
        let max_rto = parse_millis(&lookup, "SHAM_MAX_RTO_MS")?.unwrap_or(DEFAULT_MAX_RTO);
        if let Some(v) = lookup("SHAM_BACKOFF") {
            c.retransmit.backoff = match v.to_ascii_lowercase().as_str() {
                "fixed" => Backoff::Fixed,
                "exponential" => Backoff::Exponential { max: max_rto },
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "SHAM_BACKOFF",
                        value: v,
                    })
                }
            };
        }
        if let Some(wait) = parse_millis(&lookup, "SHAM_HANDSHAKE_TIMEOUT_MS")? {
            c.handshake_timeout = Some(wait);
        }
        if let Some(n) = parse_var(&lookup, "SHAM_HANDSHAKE_RETRIES")? {
            c.handshake_retries = n;
        }
        if let Some(w) = parse_var(&lookup, "SHAM_WINDOW")? {
            c.window = w;
        }
        if lookup("RUDP_LOG").as_deref() == Some("1") {
            let path = lookup("SHAM_LOG_PATH").unwrap_or_else(|| default_log.to_string());
            c.event_log = Some(PathBuf::from(path));
        }

        Ok(c)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(var).map(|v| parse_value(var, &v)).transpose()
}

/// A timeout in milliseconds.  Zero would fire before any reply could arrive.
fn parse_millis<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(v) => match parse_value::<u64>(var, &v)? {
            0 => Err(ConfigError::Invalid { var, value: v }),
            ms => Ok(Some(Duration::from_millis(ms))),
        },
    }
}

fn parse_value<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
    })
}
