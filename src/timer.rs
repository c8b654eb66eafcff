//! Retransmission timeout management.
//!
//! Reliable delivery requires that an unacknowledged unit is re-sent if no
//! ACK arrives within a bounded time.  This module provides:
//! - [`RetransmitPolicy`]: the configured RTO, retry ceiling and back-off.
//! - [`RetransmitTimer`]: per-unit bookkeeping of the current RTO and how
//!   many retransmissions have already happened.
//!
//! The default policy retransmits every 500 ms forever.  A ceiling, when
//! configured, turns a permanently silent peer into
//! [`crate::connection::ConnError::RetriesExhausted`] instead of a hang.

use std::time::Duration;

/// Default retransmission timeout.
pub const DEFAULT_RTO: Duration = Duration::from_millis(500);

/// Upper bound for exponential back-off when none is configured.
pub const DEFAULT_MAX_RTO: Duration = Duration::from_secs(60);

/// How the RTO evolves across consecutive timeouts of the same unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Every retransmission waits the base RTO.
    Fixed,
    /// The RTO doubles after every timeout, capped at `max`.
    Exponential { max: Duration },
}

/// Retransmission parameters shared by every unit of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitPolicy {
    /// Base retransmission timeout.
    pub rto: Duration,
    /// Maximum number of retransmissions per unit; `None` retries forever.
    pub max_retries: Option<u32>,
    /// RTO growth between retransmissions.
    pub backoff: Backoff,
}

impl Default for RetransmitPolicy {
    fn default() -> Self {
        Self {
            rto: DEFAULT_RTO,
            max_retries: None,
            backoff: Backoff::Fixed,
        }
    }
}

/// Retransmit bookkeeping for the unit currently in flight.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    policy: RetransmitPolicy,
    /// RTO to arm for the next wait.
    current_rto: Duration,
    /// Retransmissions performed for the current unit.
    retries: u32,
}

impl RetransmitTimer {
    pub fn new(policy: RetransmitPolicy) -> Self {
        Self {
            policy,
            current_rto: policy.rto,
            retries: 0,
        }
    }

    /// RTO to wait before the next retransmission.
    pub fn current_rto(&self) -> Duration {
        self.current_rto
    }

    /// Retransmissions performed since the last [`reset`](Self::reset).
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Account for a timeout.
    ///
    /// Returns the RTO to arm for the retransmission, or `None` when the retry
    /// ceiling has been reached and the unit must be abandoned.
    pub fn on_timeout(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_retries {
            if self.retries >= max {
                return None;
            }
        }
        self.retries += 1;
        if let Backoff::Exponential { max } = self.policy.backoff {
            self.current_rto = (self.current_rto * 2).min(max);
        }
        Some(self.current_rto)
    }

    /// Restore the base RTO and clear the retry count for a new unit.
    pub fn reset(&mut self) {
        self.current_rto = self.policy.rto;
        self.retries = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_never_grows() {
        let mut t = RetransmitTimer::new(RetransmitPolicy::default());
        for _ in 0..10 {
            assert_eq!(t.on_timeout(), Some(DEFAULT_RTO));
        }
        assert_eq!(t.retries(), 10);
    }

    #[test]
    fn exponential_doubles_up_to_cap() {
        let mut t = RetransmitTimer::new(RetransmitPolicy {
            rto: Duration::from_millis(100),
            max_retries: None,
            backoff: Backoff::Exponential {
                max: Duration::from_millis(350),
            },
        });
        assert_eq!(t.on_timeout(), Some(Duration::from_millis(200)));
        assert_eq!(t.on_timeout(), Some(Duration::from_millis(350)));
        assert_eq!(t.on_timeout(), Some(Duration::from_millis(350)));
    }

    #[test]
    fn ceiling_reports_exhaustion() {
        let mut t = RetransmitTimer::new(RetransmitPolicy {
            max_retries: Some(2),
            ..RetransmitPolicy::default()
        });
        assert!(t.on_timeout().is_some());
        assert!(t.on_timeout().is_some());
        assert_eq!(t.on_timeout(), None);
        assert_eq!(t.retries(), 2);
    }

    #[test]
    fn reset_restores_base() {
        let mut t = RetransmitTimer::new(RetransmitPolicy {
            rto: Duration::from_millis(10),
            max_retries: Some(1),
            backoff: Backoff::Exponential {
                max: DEFAULT_MAX_RTO,
            },
        });
        t.on_timeout();
        assert_eq!(t.on_timeout(), None);
        t.reset();
        assert_eq!(t.current_rto(), Duration::from_millis(10));
        assert_eq!(t.retries(), 0);
        assert_eq!(t.on_timeout(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn zero_ceiling_never_retransmits() {
        let mut t = RetransmitTimer::new(RetransmitPolicy {
            max_retries: Some(0),
            ..RetransmitPolicy::default()
        });
        assert_eq!(t.on_timeout(), None);
    }
}
