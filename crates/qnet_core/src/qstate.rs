//! Density-matrix tracking of entangled qubit groups.
//!
//! Qubits are opaque handles. The store keeps one density matrix per group of
//! qubits that share a joint state; a freshly emitted Bell pair forms a group
//! of two, a swap briefly merges two pairs into a group of four, and the
//! Bell measurement leaves a group of two again. Keeping groups small keeps
//! every matrix at most 16 x 16.
//!
//! Basis ordering is big-endian over a group's qubit list: the first qubit of
//! a group is the most significant bit of the basis index.

use crate::SimError;
use num_complex::Complex64;
use qnet_common::BellIndex;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;

/// A single-qubit operator stored row-major as [m00, m01, m10, m11].
pub type Matrix2 = [Complex64; 4];

/// Stable identity of a simulated qubit.
///
/// Noise and gates change the state a qubit participates in, never its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QubitId(u64);

impl fmt::Display for QubitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Standard single-qubit gates.
pub mod gates {
    use super::Matrix2;
    use num_complex::Complex64;
    use std::f64::consts::FRAC_1_SQRT_2;

    const ZERO: Complex64 = Complex64::new(0.0, 0.0);
    const ONE: Complex64 = Complex64::new(1.0, 0.0);

    /// Identity.
    pub fn identity() -> Matrix2 {
        [ONE, ZERO, ZERO, ONE]
    }

    /// Bit flip.
    pub fn pauli_x() -> Matrix2 {
        [ZERO, ONE, ONE, ZERO]
    }

    /// Combined bit and phase flip.
    pub fn pauli_y() -> Matrix2 {
        [
            ZERO,
            Complex64::new(0.0, -1.0),
            Complex64::new(0.0, 1.0),
            ZERO,
        ]
    }

    /// Phase flip.
    pub fn pauli_z() -> Matrix2 {
        [ONE, ZERO, ZERO, -ONE]
    }

    /// Hadamard, mapping the Z basis onto the X basis.
    pub fn hadamard() -> Matrix2 {
        let h = Complex64::new(FRAC_1_SQRT_2, 0.0);
        [h, h, h, -h]
    }

    /// Scales every entry of `m` by the real factor `k`.
    pub fn scaled(m: Matrix2, k: f64) -> Matrix2 {
        m.map(|v| v * k)
    }
}

/// Inserts `value` as bit number `bit` of `index`, shifting higher bits up.
#[inline(always)]
fn insert_bit(index: usize, bit: usize, value: usize) -> usize {
    let low = index & ((1 << bit) - 1);
    let high = index >> bit;
    (high << (bit + 1)) | (value << bit) | low
}

/// Joint state of a group of qubits.
#[derive(Debug, Clone)]
pub struct DensityMatrix {
    qubits: Vec<QubitId>,
    dim: usize,
    data: Vec<Complex64>,
}

impl DensityMatrix {
    /// The maximally entangled state |Φ+⟩ = (|00⟩ + |11⟩)/√2 on `(a, b)`.
    pub fn phi_plus(a: QubitId, b: QubitId) -> Self {
        let mut data = vec![Complex64::new(0.0, 0.0); 16];
        for &(i, j) in &[(0, 0), (0, 3), (3, 0), (3, 3)] {
            data[i * 4 + j] = Complex64::new(0.5, 0.0);
        }
        Self {
            qubits: vec![a, b],
            dim: 4,
            data,
        }
    }

    /// Qubits of the state, most significant bit first.
    pub fn qubits(&self) -> &[QubitId] {
        &self.qubits
    }

    /// Side length of the matrix, `2^k` for `k` qubits.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Entry at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> Complex64 {
        self.data[row * self.dim + col]
    }

    /// Real part of the trace. Stays at 1 under every channel and gate.
    pub fn trace(&self) -> f64 {
        (0..self.dim).map(|i| self.get(i, i).re).sum()
    }

    fn position(&self, q: QubitId) -> Option<usize> {
        self.qubits.iter().position(|&x| x == q)
    }

    /// Bit number of the qubit at list position `pos`.
    fn bit(&self, pos: usize) -> usize {
        self.qubits.len() - 1 - pos
    }

    /// ρ ← U ρ U† for a single-qubit `u` on list position `pos`.
    fn apply_single(&mut self, pos: usize, u: &Matrix2) {
        let mask = 1 << self.bit(pos);
        let dim = self.dim;
        let d = &mut self.data;

        for col in 0..dim {
            for row in (0..dim).filter(|r| r & mask == 0) {
                let r1 = row | mask;
                let a0 = d[row * dim + col];
                let a1 = d[r1 * dim + col];
                d[row * dim + col] = u[0] * a0 + u[1] * a1;
                d[r1 * dim + col] = u[2] * a0 + u[3] * a1;
            }
        }
        for row in 0..dim {
            for col in (0..dim).filter(|c| c & mask == 0) {
                let c1 = col | mask;
                let b0 = d[row * dim + col];
                let b1 = d[row * dim + c1];
                d[row * dim + col] = b0 * u[0].conj() + b1 * u[1].conj();
                d[row * dim + c1] = b0 * u[2].conj() + b1 * u[3].conj();
            }
        }
    }

    /// ρ ← Σ K ρ K† over the Kraus operators `kraus`.
    fn apply_kraus(&mut self, pos: usize, kraus: &[Matrix2]) {
        let mut acc = vec![Complex64::new(0.0, 0.0); self.data.len()];
        for k in kraus {
            let mut branch = self.clone();
            branch.apply_single(pos, k);
            for (a, b) in acc.iter_mut().zip(&branch.data) {
                *a += *b;
            }
        }
        self.data = acc;
    }

    fn apply_cnot(&mut self, control: usize, target: usize) {
        let cm = 1 << self.bit(control);
        let tm = 1 << self.bit(target);
        let perm = |i: usize| if i & cm != 0 { i ^ tm } else { i };
        let dim = self.dim;
        let old = std::mem::take(&mut self.data);
        self.data = (0..dim * dim)
            .map(|idx| old[perm(idx / dim) * dim + perm(idx % dim)])
            .collect();
    }

    /// Joint state self ⊗ other, with `other`'s qubits appended last.
    fn tensor(self, other: DensityMatrix) -> DensityMatrix {
        let dim = self.dim * other.dim;
        let mut data = vec![Complex64::new(0.0, 0.0); dim * dim];
        for ia in 0..self.dim {
            for ja in 0..self.dim {
                let a = self.get(ia, ja);
                if a == Complex64::new(0.0, 0.0) {
                    continue;
                }
                for ib in 0..other.dim {
                    for jb in 0..other.dim {
                        let row = ia * other.dim + ib;
                        let col = ja * other.dim + jb;
                        data[row * dim + col] = a * other.get(ib, jb);
                    }
                }
            }
        }
        let mut qubits = self.qubits;
        qubits.extend(other.qubits);
        DensityMatrix { qubits, dim, data }
    }

    fn prob_one(&self, pos: usize) -> f64 {
        let mask = 1 << self.bit(pos);
        (0..self.dim)
            .filter(|i| i & mask != 0)
            .map(|i| self.get(i, i).re)
            .sum()
    }

    /// Removes the qubit at `pos`. With `Some(value)` only the block where it
    /// reads `value` is kept and renormalized (measurement); with `None` both
    /// blocks are summed (partial trace).
    fn reduce(&self, pos: usize, value: Option<usize>) -> DensityMatrix {
        let bit = self.bit(pos);
        let dim = self.dim / 2;
        let mut data = vec![Complex64::new(0.0, 0.0); dim * dim];
        let values: &[usize] = match value {
            Some(0) => &[0],
            Some(_) => &[1],
            None => &[0, 1],
        };
        for i in 0..dim {
            for j in 0..dim {
                data[i * dim + j] = values
                    .iter()
                    .map(|&v| self.get(insert_bit(i, bit, v), insert_bit(j, bit, v)))
                    .sum();
            }
        }
        let mut qubits = self.qubits.clone();
        qubits.remove(pos);
        let mut out = DensityMatrix { qubits, dim, data };
        if value.is_some() {
            let norm = out.trace();
            if norm > 0.0 {
                out.data.iter_mut().for_each(|v| *v /= norm);
            }
        }
        out
    }

    /// Reorders the qubit list so that new position k holds old position
    /// `order[k]`.
    fn permuted(&self, order: &[usize]) -> DensityMatrix {
        let n = self.qubits.len();
        let map = |new_idx: usize| {
            order.iter().enumerate().fold(0, |old_idx, (k, &old_pos)| {
                let v = (new_idx >> (n - 1 - k)) & 1;
                old_idx | (v << (n - 1 - old_pos))
            })
        };
        let dim = self.dim;
        let data = (0..dim * dim)
            .map(|idx| self.get(map(idx / dim), map(idx % dim)))
            .collect();
        DensityMatrix {
            qubits: order.iter().map(|&p| self.qubits[p]).collect(),
            dim,
            data,
        }
    }

    /// Reduced state of `keep`, in that order.
    pub fn reduced(&self, keep: &[QubitId]) -> Option<DensityMatrix> {
        let mut out = self.clone();
        while let Some(pos) = out.qubits.iter().position(|q| !keep.contains(q)) {
            out = out.reduce(pos, None);
        }
        let order = keep
            .iter()
            .map(|q| out.position(*q))
            .collect::<Option<Vec<_>>>()?;
        Some(out.permuted(&order))
    }
}

/// Owner of every qubit's quantum state.
///
/// Qubits live here from emission until they are measured or discarded.
/// Memories and channels only hold [`QubitId`] handles.
#[derive(Debug, Default)]
pub struct QubitStore {
    groups: HashMap<u64, DensityMatrix>,
    owner: HashMap<QubitId, u64>,
    next_qubit: u64,
    next_group: u64,
}

impl QubitStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live qubits.
    pub fn len(&self) -> usize {
        self.owner.len()
    }

    /// Returns true if no qubit is live.
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
    }

    /// Returns true if `q` is live.
    pub fn contains(&self, q: QubitId) -> bool {
        self.owner.contains_key(&q)
    }

    /// Number of qubits sharing a joint state with `q`, including `q`.
    pub fn group_size(&self, q: QubitId) -> Option<usize> {
        let g = self.owner.get(&q)?;
        self.groups.get(g).map(|m| m.qubits.len())
    }

    /// Emits a fresh |Φ+⟩ pair.
    pub fn create_bell_pair(&mut self) -> (QubitId, QubitId) {
        let a = self.fresh_id();
        let b = self.fresh_id();
        self.insert_group(DensityMatrix::phi_plus(a, b));
        (a, b)
    }

    fn fresh_id(&mut self) -> QubitId {
        let id = QubitId(self.next_qubit);
        self.next_qubit += 1;
        id
    }

    fn insert_group(&mut self, m: DensityMatrix) {
        if m.qubits.is_empty() {
            return;
        }
        let g = self.next_group;
        self.next_group += 1;
        for &q in &m.qubits {
            self.owner.insert(q, g);
        }
        self.groups.insert(g, m);
    }

    fn take_group(&mut self, q: QubitId) -> Result<DensityMatrix, SimError> {
        let g = self.owner.get(&q).copied().ok_or(SimError::UnknownQubit(q))?;
        let m = self.groups.remove(&g).ok_or(SimError::UnknownQubit(q))?;
        for q in &m.qubits {
            self.owner.remove(q);
        }
        Ok(m)
    }

    /// Takes the group(s) holding `a` and `b`, merged into one matrix.
    fn take_joint(&mut self, a: QubitId, b: QubitId) -> Result<DensityMatrix, SimError> {
        let ga = self.owner.get(&a).copied().ok_or(SimError::UnknownQubit(a))?;
        let gb = self.owner.get(&b).copied().ok_or(SimError::UnknownQubit(b))?;
        let first = self.take_group(a)?;
        if ga == gb {
            Ok(first)
        } else {
            let second = self.take_group(b)?;
            Ok(first.tensor(second))
        }
    }

    /// Applies a unitary single-qubit gate.
    pub fn apply_gate(&mut self, q: QubitId, u: &Matrix2) -> Result<(), SimError> {
        self.apply_channel(q, std::slice::from_ref(u))
    }

    /// Applies a single-qubit channel given by its Kraus operators.
    pub fn apply_channel(&mut self, q: QubitId, kraus: &[Matrix2]) -> Result<(), SimError> {
        let g = self.owner.get(&q).copied().ok_or(SimError::UnknownQubit(q))?;
        let m = self.groups.get_mut(&g).ok_or(SimError::UnknownQubit(q))?;
        let pos = m.position(q).ok_or(SimError::UnknownQubit(q))?;
        if let [u] = kraus {
            m.apply_single(pos, u);
        } else {
            m.apply_kraus(pos, kraus);
        }
        Ok(())
    }

    /// Applies a CNOT with `control` and `target`, merging their states.
    ///
    /// Fails if either qubit is not live.
    pub fn apply_cnot(&mut self, control: QubitId, target: QubitId) -> Result<(), SimError> {
        let mut m = self.take_joint(control, target)?;
        // Both positions exist: take_joint only succeeds for tracked qubits.
        let c = m.position(control).ok_or(SimError::UnknownQubit(control))?;
        let t = m.position(target).ok_or(SimError::UnknownQubit(target))?;
        m.apply_cnot(c, t);
        self.insert_group(m);
        Ok(())
    }

    /// Measures `q` in the Z basis and removes it from the store.
    pub fn measure<R: Rng + ?Sized>(&mut self, q: QubitId, rng: &mut R) -> Result<bool, SimError> {
        let m = self.take_group(q)?;
        let pos = m.position(q).ok_or(SimError::UnknownQubit(q))?;
        let p1 = m.prob_one(pos);
        let p1 = if p1.is_finite() { p1.clamp(0.0, 1.0) } else { 0.5 };
        let outcome = rng.gen_bool(p1);
        self.insert_group(m.reduce(pos, Some(outcome as usize)));
        Ok(outcome)
    }

    /// Bell-basis measurement of `a` and `b`, consuming both qubits.
    pub fn bell_measure<R: Rng + ?Sized>(
        &mut self,
        a: QubitId,
        b: QubitId,
        rng: &mut R,
    ) -> Result<BellIndex, SimError> {
        self.apply_cnot(a, b)?;
        self.apply_gate(a, &gates::hadamard())?;
        let phase = self.measure(a, rng)?;
        let parity = self.measure(b, rng)?;
        Ok(BellIndex::from_bits(phase, parity))
    }

    /// Drops `q`, tracing it out of whatever state it shares.
    pub fn discard(&mut self, q: QubitId) -> Result<(), SimError> {
        let m = self.take_group(q)?;
        let pos = m.position(q).ok_or(SimError::UnknownQubit(q))?;
        self.insert_group(m.reduce(pos, None));
        Ok(())
    }

    /// Reduced density matrix of `qubits`, in that order.
    pub fn reduced_state(&self, qubits: &[QubitId]) -> Result<DensityMatrix, SimError> {
        let mut joint: Option<DensityMatrix> = None;
        let mut seen = Vec::new();
        for &q in qubits {
            let g = self.owner.get(&q).copied().ok_or(SimError::UnknownQubit(q))?;
            if seen.contains(&g) {
                continue;
            }
            seen.push(g);
            let m = self.groups.get(&g).ok_or(SimError::UnknownQubit(q))?;
            let keep: Vec<QubitId> = qubits.iter().copied().filter(|x| m.qubits.contains(x)).collect();
            let part = m.reduced(&keep).ok_or(SimError::UnknownQubit(q))?;
            joint = Some(match joint {
                Some(acc) => acc.tensor(part),
                None => part,
            });
        }
        let joint = joint.ok_or_else(|| SimError::InvalidConfig("no qubits requested".into()))?;
        joint.reduced(qubits).ok_or(SimError::UnknownQubit(qubits[0]))
    }

    /// Fidelity ⟨Φ+|ρ_ab|Φ+⟩ of the pair `(a, b)`.
    pub fn fidelity_phi_plus(&self, a: QubitId, b: QubitId) -> Result<f64, SimError> {
        let rho = self.reduced_state(&[a, b])?;
        let f = 0.5 * (rho.get(0, 0) + rho.get(0, 3) + rho.get(3, 0) + rho.get(3, 3)).re;
        Ok(f.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const EPS: f64 = 1e-9;

    #[test]
    fn fresh_pair_is_perfect_bell_state() {
        let mut store = QubitStore::new();
        let (a, b) = store.create_bell_pair();
        assert!((store.fidelity_phi_plus(a, b).unwrap() - 1.0).abs() < EPS);
        assert_eq!(store.group_size(a), Some(2));
    }

    #[test]
    fn pauli_errors_leave_orthogonal_bell_states() {
        let mut store = QubitStore::new();
        let (a, b) = store.create_bell_pair();
        store.apply_gate(b, &gates::pauli_x()).unwrap();
        assert!(store.fidelity_phi_plus(a, b).unwrap().abs() < EPS);
        store.apply_gate(b, &gates::pauli_x()).unwrap();
        assert!((store.fidelity_phi_plus(a, b).unwrap() - 1.0).abs() < EPS);
    }

    #[test]
    fn swap_with_outcome_correction_restores_phi_plus() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let mut store = QubitStore::new();
            let (alice, left) = store.create_bell_pair();
            let (right, bob) = store.create_bell_pair();

            let outcome = store.bell_measure(left, right, &mut rng).unwrap();
            assert!(!store.contains(left) && !store.contains(right));
            assert_eq!(store.group_size(alice), Some(2));

            if outcome.x_parity() {
                store.apply_gate(bob, &gates::pauli_x()).unwrap();
            }
            if outcome.z_parity() {
                store.apply_gate(bob, &gates::pauli_z()).unwrap();
            }
            let f = store.fidelity_phi_plus(alice, bob).unwrap();
            assert!((f - 1.0).abs() < EPS, "outcome {outcome} gave F={f}");
        }
    }

    #[test]
    fn all_bell_outcomes_occur() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = [false; 4];
        for _ in 0..200 {
            let mut store = QubitStore::new();
            let (_, l) = store.create_bell_pair();
            let (r, _) = store.create_bell_pair();
            seen[store.bell_measure(l, r, &mut rng).unwrap() as usize] = true;
        }
        assert_eq!(seen, [true; 4]);
    }

    #[test]
    fn discarding_half_a_pair_leaves_maximally_mixed_partner() {
        let mut store = QubitStore::new();
        let (a, b) = store.create_bell_pair();
        store.discard(a).unwrap();
        assert!(!store.contains(a));
        let rho = store.reduced_state(&[b]).unwrap();
        assert!((rho.get(0, 0).re - 0.5).abs() < EPS);
        assert!((rho.get(1, 1).re - 0.5).abs() < EPS);
        assert!(rho.get(0, 1).norm() < EPS);
    }

    #[test]
    fn reduced_state_respects_requested_order() {
        let mut store = QubitStore::new();
        let (a, b) = store.create_bell_pair();
        // |Ψ+⟩-like state after X on b; reversing the order must keep it symmetric.
        store.apply_gate(b, &gates::pauli_x()).unwrap();
        let ab = store.reduced_state(&[a, b]).unwrap();
        let ba = store.reduced_state(&[b, a]).unwrap();
        assert!((ab.get(1, 2) - ba.get(2, 1)).norm() < EPS);

        // An asymmetric product state distinguishes the two orders.
        let mut store = QubitStore::new();
        let (p, q) = store.create_bell_pair();
        let m = store.measure(p, &mut StdRng::seed_from_u64(0)).unwrap() as usize;
        let (c, d) = store.create_bell_pair();
        store.discard(d).unwrap();

        let qc = store.reduced_state(&[q, c]).unwrap();
        let cq = store.reduced_state(&[c, q]).unwrap();
        assert!((qc.get(2 * m, 2 * m).re - 0.5).abs() < EPS);
        assert!((qc.get(2 * m + 1, 2 * m + 1).re - 0.5).abs() < EPS);
        assert!((cq.get(m, m).re - 0.5).abs() < EPS);
        assert!((cq.get(2 + m, 2 + m).re - 0.5).abs() < EPS);
    }

    #[test]
    fn unknown_qubit_is_reported() {
        let mut store = QubitStore::new();
        let (a, _) = store.create_bell_pair();
        store.discard(a).unwrap();
        assert_eq!(store.discard(a), Err(SimError::UnknownQubit(a)));
    }
}
