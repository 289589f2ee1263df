//! Noise models for fibres, memories and gates.
//!
//! Every model reduces to a single-qubit Kraus channel applied exactly to the
//! density matrix of the affected qubit. Models differ only in how they turn
//! a physical quantity into a probability: fibres use their length, memories
//! the time a qubit has idled, gates their duration.

use crate::SimError;
use crate::qstate::{Matrix2, QubitId, QubitStore, gates};
use qnet_common::defaults;

/// A single-qubit noise channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoiseChannel {
    /// ρ → (1-p)ρ + p·I/2.
    /// Kraus: {√(1-3p/4)·I, √(p/4)·X, √(p/4)·Y, √(p/4)·Z}
    Depolarizing { p: f64 },

    /// ρ → (1-p)ρ + p·ZρZ.
    /// Kraus: {√(1-p)·I, √p·Z}
    Dephasing { p: f64 },
}

impl NoiseChannel {
    /// Error probability of the channel.
    pub fn probability(&self) -> f64 {
        match *self {
            NoiseChannel::Depolarizing { p } | NoiseChannel::Dephasing { p } => p,
        }
    }

    /// Generate the Kraus operators for this channel.
    pub fn kraus_operators(&self) -> Vec<Matrix2> {
        match *self {
            NoiseChannel::Depolarizing { p } => {
                let p = p.clamp(0.0, 1.0);
                let k = (p / 4.0).sqrt();
                vec![
                    gates::scaled(gates::identity(), (1.0 - 3.0 * p / 4.0).sqrt()),
                    gates::scaled(gates::pauli_x(), k),
                    gates::scaled(gates::pauli_y(), k),
                    gates::scaled(gates::pauli_z(), k),
                ]
            }
            NoiseChannel::Dephasing { p } => {
                let p = p.clamp(0.0, 1.0);
                vec![
                    gates::scaled(gates::identity(), (1.0 - p).sqrt()),
                    gates::scaled(gates::pauli_z(), p.sqrt()),
                ]
            }
        }
    }

    /// Applies the channel to `q`. A zero-probability channel is a no-op.
    pub fn apply(&self, store: &mut QubitStore, q: QubitId) -> Result<(), SimError> {
        if self.probability() <= 0.0 {
            return Ok(());
        }
        store.apply_channel(q, &self.kraus_operators())
    }
}

/// Checks that `value` is a probability.
pub fn check_probability(name: &'static str, value: f64) -> Result<f64, SimError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SimError::InvalidProbability { name, value })
    }
}

/// Checks that `length` is a usable fibre length in km.
pub fn check_length(length: f64) -> Result<f64, SimError> {
    if length.is_finite() && length >= 0.0 {
        Ok(length)
    } else {
        Err(SimError::InvalidLength(length))
    }
}

/// Length-dependent fibre depolarization.
///
/// Non-physical model used to show the effect of entanglement swapping. A
/// qubit entering a fibre of `length` km is depolarized with
///
/// `p = 1 - (1 - p_depol_init) * 10^(-length^2 * p_depol_length / 10)`
///
/// Both parameters are validated on construction; with a valid length the
/// probability always lies in `[p_depol_init, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FibreDepolarizeModel {
    p_depol_init: f64,
    p_depol_length: f64,
}

impl Default for FibreDepolarizeModel {
    fn default() -> Self {
        Self {
            p_depol_init: defaults::P_DEPOL_INIT,
            p_depol_length: defaults::P_DEPOL_LENGTH,
        }
    }
}

impl FibreDepolarizeModel {
    /// Creates a fibre model, rejecting parameters outside `[0, 1]`.
    pub fn new(p_depol_init: f64, p_depol_length: f64) -> Result<Self, SimError> {
        Ok(Self {
            p_depol_init: check_probability("p_depol_init", p_depol_init)?,
            p_depol_length: check_probability("p_depol_length", p_depol_length)?,
        })
    }

    /// Depolarization probability of a fibre of `length` km.
    pub fn probability(&self, length: f64) -> Result<f64, SimError> {
        let length = check_length(length)?;
        let survive = 10f64.powf(-length * length * self.p_depol_length / 10.0);
        Ok((1.0 - (1.0 - self.p_depol_init) * survive).clamp(0.0, 1.0))
    }

    /// Depolarizes each of `qubits` independently for a traversal of a fibre
    /// of `length` km.
    pub fn error_operation(
        &self,
        store: &mut QubitStore,
        qubits: &[QubitId],
        length: f64,
    ) -> Result<(), SimError> {
        let channel = NoiseChannel::Depolarizing {
            p: self.probability(length)?,
        };
        for &q in qubits {
            channel.apply(store, q)?;
        }
        Ok(())
    }
}

/// A noise model whose strength grows with elapsed time.
///
/// The probability after `delta_ns` nanoseconds is `1 - exp(-delta * rate)`
/// with the rate in Hz.
pub trait TimedNoiseModel {
    /// Rate of the process, in Hz.
    fn rate_hz(&self) -> f64;

    /// Channel applied with probability `p`.
    fn channel(&self, p: f64) -> NoiseChannel;

    fn probability(&self, delta_ns: f64) -> f64 {
        if delta_ns <= 0.0 {
            return 0.0;
        }
        1.0 - (-delta_ns * self.rate_hz() * 1e-9).exp()
    }

    fn error_operation(
        &self,
        store: &mut QubitStore,
        q: QubitId,
        delta_ns: f64,
    ) -> Result<(), SimError> {
        self.channel(self.probability(delta_ns)).apply(store, q)
    }
}

fn check_rate(name: &str, rate_hz: f64) -> Result<f64, SimError> {
    if rate_hz.is_finite() && rate_hz >= 0.0 {
        Ok(rate_hz)
    } else {
        Err(SimError::InvalidConfig(format!(
            "{name} must be a finite non-negative rate, got {rate_hz} Hz"
        )))
    }
}

/// Time-based depolarization of idle memory qubits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepolarNoiseModel {
    rate_hz: f64,
}

impl DepolarNoiseModel {
    /// Creates the model, rejecting negative or non-finite rates.
    pub fn new(rate_hz: f64) -> Result<Self, SimError> {
        Ok(Self {
            rate_hz: check_rate("memory noise rate", rate_hz)?,
        })
    }
}

impl TimedNoiseModel for DepolarNoiseModel {
    fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    fn channel(&self, p: f64) -> NoiseChannel {
        NoiseChannel::Depolarizing { p }
    }
}

/// Time-based dephasing, applied to gate targets over the gate duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DephaseNoiseModel {
    rate_hz: f64,
}

impl DephaseNoiseModel {
    /// Creates the model, rejecting negative or non-finite rates.
    pub fn new(rate_hz: f64) -> Result<Self, SimError> {
        Ok(Self {
            rate_hz: check_rate("gate noise rate", rate_hz)?,
        })
    }
}

impl TimedNoiseModel for DephaseNoiseModel {
    fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    fn channel(&self, p: f64) -> NoiseChannel {
        NoiseChannel::Dephasing { p }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_gives_initial_probability() {
        let model = FibreDepolarizeModel::default();
        let p = model.probability(0.0).unwrap();
        assert!((p - defaults::P_DEPOL_INIT).abs() < 1e-12);
    }

    #[test]
    fn probability_is_monotone_in_length() {
        let model = FibreDepolarizeModel::default();
        let mut last = 0.0;
        for step in 0..200 {
            let p = model.probability(step as f64 * 0.25).unwrap();
            assert!(p >= last, "p decreased at length {}", step as f64 * 0.25);
            assert!((0.0..=1.0).contains(&p));
            last = p;
        }
    }

    #[test]
    fn known_value_for_ten_km() {
        let model = FibreDepolarizeModel::default();
        let expected = 1.0 - 0.991 * 10f64.powf(-0.25);
        assert!((model.probability(10.0).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn invalid_parameters_are_rejected_up_front() {
        assert!(matches!(
            FibreDepolarizeModel::new(1.5, 0.025),
            Err(SimError::InvalidProbability { name: "p_depol_init", .. })
        ));
        assert!(matches!(
            FibreDepolarizeModel::new(0.009, -0.1),
            Err(SimError::InvalidProbability { name: "p_depol_length", .. })
        ));
        assert!(FibreDepolarizeModel::new(f64::NAN, 0.0).is_err());
        assert_eq!(
            FibreDepolarizeModel::default().probability(-1.0),
            Err(SimError::InvalidLength(-1.0))
        );
        assert!(DepolarNoiseModel::new(-5.0).is_err());
    }

    #[test]
    fn full_depolarization_destroys_correlation() {
        let mut store = QubitStore::new();
        let (a, b) = store.create_bell_pair();
        NoiseChannel::Depolarizing { p: 1.0 }.apply(&mut store, b).unwrap();
        let f = store.fidelity_phi_plus(a, b).unwrap();
        assert!((f - 0.25).abs() < 1e-12);
    }

    #[test]
    fn depolarizing_one_half_matches_werner_fidelity() {
        let mut store = QubitStore::new();
        let (a, b) = store.create_bell_pair();
        let p = 0.3;
        NoiseChannel::Depolarizing { p }.apply(&mut store, a).unwrap();
        let f = store.fidelity_phi_plus(a, b).unwrap();
        assert!((f - (1.0 - 3.0 * p / 4.0)).abs() < 1e-12);
    }

    #[test]
    fn dephasing_flips_phase_with_probability_p() {
        let mut store = QubitStore::new();
        let (a, b) = store.create_bell_pair();
        NoiseChannel::Dephasing { p: 0.2 }.apply(&mut store, a).unwrap();
        assert!((store.fidelity_phi_plus(a, b).unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn timed_models_grow_with_elapsed_time() {
        let mem = DepolarNoiseModel::new(200.0).unwrap();
        assert_eq!(mem.probability(0.0), 0.0);
        let p1 = mem.probability(1_000.0);
        let p2 = mem.probability(1_000_000.0);
        assert!(p1 > 0.0 && p2 > p1 && p2 < 1.0);
        assert!((p2 - (1.0 - (-0.2f64).exp())).abs() < 1e-12);
        assert_eq!(DephaseNoiseModel::new(0.0).unwrap().probability(1e9), 0.0);
    }
}
