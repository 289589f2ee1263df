//! Node quantum memory executing instruction programs.
//!
//! Implements the quantum processor every grid node carries: a fixed number
//! of addressable positions, each holding at most one qubit, plus a small
//! instruction set (Bell measurement, Pauli X, Pauli Z) with a physical
//! duration and optional noise per instruction. Programs run atomically: the
//! positions a program touches stay locked until its last instruction has
//! finished, and a second program touching a locked position is rejected.

use crate::SimError;
use crate::noise::{DephaseNoiseModel, DepolarNoiseModel, TimedNoiseModel};
use crate::qstate::{QubitId, QubitStore, gates};
use qnet_common::BellIndex;
use qnet_common::isa::{Instruction, Opcode};
use rand::Rng;

/// A single addressable memory position.
#[derive(Debug, Clone, Default)]
pub struct MemoryPosition {
    /// Qubit currently held, if any.
    qubit: Option<QubitId>,

    /// Simulated time up to which memory noise has been applied to the held
    /// qubit.
    ///
    /// Set when the qubit arrives and advanced every time a program touches
    /// the position, so idle noise is never applied twice for the same
    /// interval.
    noise_applied_ns: f64,

    /// Simulated time until which a running program owns this position.
    locked_until_ns: f64,
}

/// Result of a program run on a memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramResult {
    /// Simulated time at which the last instruction completes.
    pub finish_ns: f64,

    /// Bell outcomes, one per `MeasureBell` instruction, in program order.
    pub outcomes: Vec<BellIndex>,
}

/// Quantum memory with instruction execution.
///
/// Maintains the positions of one node together with the noise models of
/// its hardware: depolarization of idle qubits and dephasing on Pauli gate
/// targets. Bell measurements are noiseless apart from the memory noise the
/// measured qubits have accumulated.
#[derive(Debug, Clone)]
pub struct QuantumMemory {
    positions: Vec<MemoryPosition>,
    mem_noise: DepolarNoiseModel,
    gate_noise: DephaseNoiseModel,
    gate_duration_ns: f64,
}

impl QuantumMemory {
    /// Creates a memory with `num_positions` empty positions.
    ///
    /// # Arguments
    ///
    /// * `num_positions` - Number of addressable positions
    /// * `mem_noise` - Depolarization applied to qubits while they idle
    /// * `gate_noise` - Dephasing applied to Pauli gate targets
    /// * `gate_duration_ns` - Duration of every instruction
    pub fn new(
        num_positions: usize,
        mem_noise: DepolarNoiseModel,
        gate_noise: DephaseNoiseModel,
        gate_duration_ns: f64,
    ) -> Self {
        Self {
            positions: vec![MemoryPosition::default(); num_positions],
            mem_noise,
            gate_noise,
            gate_duration_ns,
        }
    }

    fn position(&self, slot: usize) -> Result<&MemoryPosition, SimError> {
        self.positions.get(slot).ok_or(SimError::SlotOutOfRange {
            slot,
            size: self.positions.len(),
        })
    }

    fn position_mut(&mut self, slot: usize) -> Result<&mut MemoryPosition, SimError> {
        let size = self.positions.len();
        self.positions
            .get_mut(slot)
            .ok_or(SimError::SlotOutOfRange { slot, size })
    }

    /// Stores an arriving qubit.
    ///
    /// A qubit already held in the position is displaced and returned; the
    /// caller decides what happens to it (normally it is discarded).
    pub fn put(
        &mut self,
        slot: usize,
        qubit: QubitId,
        now_ns: f64,
    ) -> Result<Option<QubitId>, SimError> {
        let pos = self.position_mut(slot)?;
        let displaced = pos.qubit.replace(qubit);
        pos.noise_applied_ns = now_ns;
        Ok(displaced)
    }

    /// Non-destructive look at a position. No noise is applied.
    ///
    /// Meant for bookkeeping only. Anything that reads the quantum state of
    /// the held qubit goes through [`QuantumMemory::peek_refreshed`].
    pub fn peek(&self, slot: usize) -> Result<Option<QubitId>, SimError> {
        Ok(self.position(slot)?.qubit)
    }

    /// Non-destructive look at a position that first brings the held qubit
    /// up to date with the memory noise it accumulated while idle.
    ///
    /// The qubit stays in place. Noise is only ever applied up to `now_ns`
    /// once, so repeated calls at the same time leave the state unchanged.
    pub fn peek_refreshed(
        &mut self,
        slot: usize,
        now_ns: f64,
        store: &mut QubitStore,
    ) -> Result<Option<QubitId>, SimError> {
        if self.position(slot)?.qubit.is_none() {
            return Ok(None);
        }
        self.refresh(slot, now_ns, store).map(Some)
    }

    /// Returns true if `slot` exists and holds a qubit.
    pub fn is_occupied(&self, slot: usize) -> bool {
        matches!(self.peek(slot), Ok(Some(_)))
    }

    /// Returns true if a program holds `slot` at `now_ns`.
    pub fn is_busy(&self, slot: usize, now_ns: f64) -> bool {
        self.position(slot)
            .map(|p| p.locked_until_ns > now_ns)
            .unwrap_or(false)
    }

    /// Removes and returns the qubit in `slot`, applying the memory noise it
    /// accumulated while idle.
    pub fn pop(
        &mut self,
        slot: usize,
        now_ns: f64,
        store: &mut QubitStore,
    ) -> Result<QubitId, SimError> {
        let q = self.refresh(slot, now_ns, store)?;
        self.position_mut(slot)?.qubit = None;
        Ok(q)
    }

    /// Brings the qubit in `slot` up to date with idle noise.
    fn refresh(
        &mut self,
        slot: usize,
        now_ns: f64,
        store: &mut QubitStore,
    ) -> Result<QubitId, SimError> {
        let mem_noise = self.mem_noise;
        let pos = self.position_mut(slot)?;
        let q = pos.qubit.ok_or(SimError::EmptySlot(slot))?;
        // A program may have advanced the noise clock past `now_ns`.
        let idle = (now_ns - pos.noise_applied_ns).max(0.0);
        pos.noise_applied_ns = pos.noise_applied_ns.max(now_ns);
        mem_noise.error_operation(store, q, idle)?;
        Ok(q)
    }

    /// Checks that `program` can run in full at `now_ns`.
    ///
    /// Every addressed position must exist, be free of other programs and
    /// hold a qubit at the moment the instruction reaches it.
    fn validate(&self, program: &[Instruction], now_ns: f64) -> Result<(), SimError> {
        let mut occupied: Vec<bool> = self.positions.iter().map(|p| p.qubit.is_some()).collect();
        for instr in program {
            let (slots, n) = instr.positions();
            for &slot in &slots[..n] {
                let pos = self.position(slot)?;
                if pos.locked_until_ns > now_ns {
                    return Err(SimError::MemoryBusy {
                        slot,
                        until_ns: pos.locked_until_ns,
                    });
                }
                if !occupied[slot] {
                    return Err(SimError::EmptySlot(slot));
                }
            }
            if instr.opcode == Opcode::MeasureBell {
                occupied[instr.operand_1] = false;
                occupied[instr.operand_2] = false;
            }
        }
        Ok(())
    }

    /// Runs a program starting at `now_ns`.
    ///
    /// The quantum effect of every instruction is applied immediately; the
    /// returned [`ProgramResult::finish_ns`] is when the caller may treat the
    /// program as done. Positions touched by the program stay locked until
    /// then. Nothing is applied if validation fails.
    ///
    /// # Returns
    ///
    /// The finish time and the Bell outcomes produced, or an error if a
    /// position is out of range, empty, or busy.
    pub fn execute<R: Rng + ?Sized>(
        &mut self,
        program: &[Instruction],
        now_ns: f64,
        store: &mut QubitStore,
        rng: &mut R,
    ) -> Result<ProgramResult, SimError> {
        self.validate(program, now_ns)?;

        let mut t = now_ns;
        let mut outcomes = Vec::new();
        let mut touched = Vec::new();

        for instr in program {
            match instr.opcode {
                Opcode::MeasureBell => {
                    let a = self.pop(instr.operand_1, t, store)?;
                    let b = self.pop(instr.operand_2, t, store)?;
                    outcomes.push(store.bell_measure(a, b, rng)?);
                    touched.extend([instr.operand_1, instr.operand_2]);
                }
                Opcode::PauliX | Opcode::PauliZ => {
                    let q = self.refresh(instr.operand_1, t, store)?;
                    let gate = if instr.opcode == Opcode::PauliX {
                        gates::pauli_x()
                    } else {
                        gates::pauli_z()
                    };
                    store.apply_gate(q, &gate)?;
                    self.gate_noise
                        .error_operation(store, q, self.gate_duration_ns)?;
                    touched.push(instr.operand_1);
                }
            }
            t += self.gate_duration_ns;
        }

        for slot in touched {
            let pos = self.position_mut(slot)?;
            pos.locked_until_ns = pos.locked_until_ns.max(t);
            if pos.qubit.is_some() {
                pos.noise_applied_ns = t;
            }
        }

        Ok(ProgramResult {
            finish_ns: t,
            outcomes,
        })
    }
}
