//! Responder-side packet-loss simulation.
//!
//! Real networks drop packets.  To exercise the retransmission path without
//! depending on actual network conditions, the receiving end of a file
//! transfer asks a [`LossSimulator`] whether to pretend each arriving data
//! packet never showed up.  A dropped packet is neither processed nor
//! acknowledged.
//!
//! Only data packets inside the transfer loop are filtered: handshake, FIN
//! and the leading file-name unit always get through.  With
//! `loss_rate == 0.0` the simulator never drops anything and never consumes
//! randomness in a way that matters.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ConfigError;

/// Probabilistic packet dropper.
#[derive(Debug, Clone)]
pub struct LossSimulator {
    loss_rate: f64,
    rng: StdRng,
}

impl LossSimulator {
    /// A simulator seeded from the operating system.
    ///
    /// `loss_rate` must lie in `[0.0, 1.0]`.
    pub fn new(loss_rate: f64) -> Result<Self, ConfigError> {
        Self::with_rng(loss_rate, StdRng::from_os_rng())
    }

    /// A simulator with a fixed seed, for reproducible runs.
    pub fn seeded(loss_rate: f64, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(loss_rate, StdRng::seed_from_u64(seed))
    }

    /// A simulator that never drops.
    pub fn disabled() -> Self {
        Self {
            loss_rate: 0.0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    fn with_rng(loss_rate: f64, rng: StdRng) -> Result<Self, ConfigError> {
        validate_loss_rate(loss_rate)?;
        Ok(Self { loss_rate, rng })
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }

    /// Draw a uniform value in `[0, 1)` and report whether the packet at hand
    /// should be dropped.
    pub fn should_drop(&mut self) -> bool {
        if self.loss_rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < self.loss_rate
    }
}

/// Reject NaN and values outside `[0.0, 1.0]`.
pub fn validate_loss_rate(loss_rate: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&loss_rate) {
        Ok(loss_rate)
    } else {
        Err(ConfigError::LossRate(loss_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_never_drops() {
        let mut sim = LossSimulator::seeded(0.0, 7).unwrap();
        assert!((0..10_000).all(|_| !sim.should_drop()));
    }

    #[test]
    fn full_rate_always_drops() {
        let mut sim = LossSimulator::seeded(1.0, 7).unwrap();
        assert!((0..1_000).all(|_| sim.should_drop()));
    }

    #[test]
    fn observed_rate_is_close_to_configured() {
        let mut sim = LossSimulator::seeded(0.3, 42).unwrap();
        let drops = (0..10_000).filter(|_| sim.should_drop()).count();
        assert!((2_700..3_300).contains(&drops), "dropped {drops} of 10000");
    }

    #[test]
    fn same_seed_same_decisions() {
        let mut a = LossSimulator::seeded(0.5, 99).unwrap();
        let mut b = LossSimulator::seeded(0.5, 99).unwrap();
        let da: Vec<bool> = (0..64).map(|_| a.should_drop()).collect();
        let db: Vec<bool> = (0..64).map(|_| b.should_drop()).collect();
        assert_eq!(da, db);
    }

    #[test]
    fn out_of_range_rates_rejected() {
        assert!(LossSimulator::new(-0.1).is_err());
        assert!(LossSimulator::new(1.5).is_err());
        assert!(LossSimulator::new(f64::NAN).is_err());
    }

    #[test]
    fn disabled_reports_zero() {
        let mut sim = LossSimulator::disabled();
        assert_eq!(sim.loss_rate(), 0.0);
        assert!(!sim.should_drop());
    }
}
