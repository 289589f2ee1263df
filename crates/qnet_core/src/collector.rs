//! Fidelity samples gathered at the end of every round.

use crate::SimError;
use crate::qstate::{QubitId, QubitStore};
use crate::routing::PathId;
use log::warn;

/// Fidelity of one completed round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FidelitySample {
    pub path: PathId,
    /// Zero-based index of the round on its path.
    pub round: u64,
    pub time_ns: f64,
    pub fidelity: f64,
}

/// Accumulates [`FidelitySample`]s over a run.
///
/// Measures ⟨Φ+|ρ|Φ+⟩ of the two end qubits without consuming them. A round
/// whose end positions are not both filled is skipped with a warning.
#[derive(Debug, Clone, Default)]
pub struct FidelityCollector {
    samples: Vec<FidelitySample>,
    missed: usize,
}

impl FidelityCollector {
    /// Creates a collector with no samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the fidelity between `alice` and `bob` for a completed round.
    ///
    /// # Returns
    ///
    /// The recorded fidelity, `None` if a qubit was missing, or an error if a
    /// handle no longer refers to a live qubit.
    pub fn collect(
        &mut self,
        path: PathId,
        round: u64,
        time_ns: f64,
        alice: Option<QubitId>,
        bob: Option<QubitId>,
        store: &QubitStore,
    ) -> Result<Option<f64>, SimError> {
        let (Some(a), Some(b)) = (alice, bob) else {
            warn!("path {path}: round {round} finished with an empty end position, no sample");
            self.missed += 1;
            return Ok(None);
        };
        let fidelity = store.fidelity_phi_plus(a, b)?;
        self.samples.push(FidelitySample {
            path,
            round,
            time_ns,
            fidelity,
        });
        Ok(Some(fidelity))
    }

    /// Samples in collection order, which is simulated-time order.
    pub fn samples(&self) -> &[FidelitySample] {
        &self.samples
    }

    /// Number of rounds that finished without both end qubits present.
    pub fn missed(&self) -> usize {
        self.missed
    }

    /// Consumes the collector, returning its samples.
    pub fn into_samples(self) -> Vec<FidelitySample> {
        self.samples
    }
}
