//! Optional channel simulator for exercising the reliability logic.
//!
//! Real networks drop and corrupt packets.  To exercise the recovery
//! mechanisms without depending on actual network conditions, [`Simulator`]
//! is consulted for every received frame, applying a configurable fault
//! model:
//!
//! | Fault       | Description                                            |
//! |-------------|--------------------------------------------------------|
//! | Loss        | Discard a frame with probability `loss_rate`.          |
//! | Corruption  | Flip one byte of a frame with probability `corrupt_rate`. |
//!
//! The draw order is fixed (loss first, then corruption) so a seeded run is
//! reproducible.  With both rates at zero the simulator is a pass-through and
//! only real loss and corruption are observed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ConfigError;
use crate::packet::Packet;

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Probability that any given frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that a frame that survived loss is corrupted.
    pub corrupt_rate: f64,
    /// RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default — simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    /// Check that both probabilities lie in `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("loss_rate", self.loss_rate)?;
        check_probability("corrupt_rate", self.corrupt_rate)
    }

    /// `true` when no fault can ever be injected.
    pub fn is_passthrough(&self) -> bool {
        self.loss_rate == 0.0 && self.corrupt_rate == 0.0
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Probability { name, value })
    }
}

/// A probabilistic loss and corruption injector.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
}

impl Simulator {
    /// Build a simulator; rejects probabilities outside `[0, 1]`.
    pub fn new(config: SimulatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self { config, rng })
    }

    /// A simulator that never injects faults.
    pub fn passthrough() -> Self {
        Self {
            config: SimulatorConfig::default(),
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Returns `true` with probability `loss_rate`; the frame must then be
    /// discarded without any response.
    pub fn maybe_drop(&mut self) -> bool {
        if self.config.loss_rate == 0.0 {
            return false;
        }
        self.rng.random_bool(self.config.loss_rate)
    }

    /// With probability `corrupt_rate`, damage `packet` so that
    /// [`Packet::verify`] fails.  Returns whether the packet was touched.
    ///
    /// One payload byte is XORed with a random non-zero mask; packets with an
    /// empty payload have their checksum field damaged instead.
    pub fn maybe_corrupt(&mut self, packet: &mut Packet) -> bool {
        if self.config.corrupt_rate == 0.0 || !self.rng.random_bool(self.config.corrupt_rate) {
            return false;
        }
        let mask: u8 = self.rng.random_range(1..=u8::MAX);
        if packet.payload().is_empty() {
            packet.checksum ^= u16::from(mask);
        } else {
            let payload = packet.payload_mut();
            let idx = self.rng.random_range(0..payload.len());
            payload[idx] ^= mask;
        }
        true
    }
}
