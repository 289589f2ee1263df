//! Repeater and end-node protocols.
//!
//! Both protocols are explicit state machines driven by the simulation
//! loop. They never schedule anything themselves: every handler returns the
//! [`Signal`]s the driver has to turn into events (a program finishing later,
//! a message to relay, a completed round).

use crate::SimError;
use crate::memory::QuantumMemory;
use crate::pauli_frame::{FrameStatus, PauliFrame};
use crate::qstate::QubitStore;
use crate::routing::PathId;
use log::debug;
use qnet_common::BellIndex;
use qnet_common::isa::Instruction;
use rand::Rng;
use std::collections::VecDeque;

/// Classical message carried along a path towards Bob.
///
/// A well-formed message holds exactly one Bell outcome. Anything else is
/// dropped by the receiving protocol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub items: Vec<BellIndex>,
}

impl Message {
    /// Well-formed message carrying one outcome.
    pub fn outcome(outcome: BellIndex) -> Self {
        Self {
            items: vec![outcome],
        }
    }

    /// The single outcome carried, or `None` if the message is malformed.
    pub fn single(&self) -> Option<BellIndex> {
        match self.items.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

/// Effects a protocol handler asks the driver to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// A memory program was started; report back at `finish_ns`.
    ProgramStarted { finish_ns: f64, outcomes: Vec<BellIndex> },
    /// Send a classical message towards Bob.
    Forward(Message),
    /// The current round of the path is finished.
    RoundComplete,
}

/// State of a repeater's swap cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    /// Waiting for both incoming positions to hold a qubit.
    AwaitBoth,
    /// A Bell measurement is running.
    Measuring,
}

/// Entanglement swapping at a repeater.
///
/// Loops over await-both, measure and forward. Both qubits are consumed by
/// the measurement; only the outcome leaves the node.
#[derive(Debug, Clone)]
pub struct SwapProtocol {
    pub path: PathId,
    left_slot: usize,
    right_slot: usize,
    state: SwapState,
    swaps: u64,
}

impl SwapProtocol {
    /// Creates the protocol for the repeater of `path` whose incoming qubits
    /// land in `left_slot` and `right_slot`.
    pub fn new(path: PathId, left_slot: usize, right_slot: usize) -> Self {
        Self {
            path,
            left_slot,
            right_slot,
            state: SwapState::AwaitBoth,
            swaps: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> SwapState {
        self.state
    }

    /// Number of measurements completed so far.
    pub fn swaps(&self) -> u64 {
        self.swaps
    }

    /// Wakes the protocol after a qubit arrived at one of its positions.
    ///
    /// Starts the Bell measurement if both positions are filled and free;
    /// otherwise keeps waiting.
    pub fn on_qubit_arrival<R: Rng + ?Sized>(
        &mut self,
        memory: &mut QuantumMemory,
        store: &mut QubitStore,
        rng: &mut R,
        now_ns: f64,
    ) -> Result<Vec<Signal>, SimError> {
        if self.state != SwapState::AwaitBoth {
            return Ok(Vec::new());
        }
        let (l, r) = (self.left_slot, self.right_slot);
        if !memory.is_occupied(l) || !memory.is_occupied(r) {
            return Ok(Vec::new());
        }
        if memory.is_busy(l, now_ns) || memory.is_busy(r, now_ns) {
            return Ok(Vec::new());
        }

        let result = memory.execute(&[Instruction::measure_bell(l, r)], now_ns, store, rng)?;
        self.state = SwapState::Measuring;
        debug!(
            "path {}: swap started at t={now_ns} ns, done at t={} ns",
            self.path, result.finish_ns
        );
        Ok(vec![Signal::ProgramStarted {
            finish_ns: result.finish_ns,
            outcomes: result.outcomes,
        }])
    }

    /// Handles the end of the Bell measurement and forwards its outcome.
    ///
    /// Qubits that arrived while the measurement ran are picked up
    /// immediately.
    pub fn on_program_done<R: Rng + ?Sized>(
        &mut self,
        outcomes: &[BellIndex],
        memory: &mut QuantumMemory,
        store: &mut QubitStore,
        rng: &mut R,
        now_ns: f64,
    ) -> Result<Vec<Signal>, SimError> {
        self.state = SwapState::AwaitBoth;
        self.swaps += 1;
        let mut signals = vec![Signal::Forward(Message {
            items: outcomes.to_vec(),
        })];
        signals.extend(self.on_qubit_arrival(memory, store, rng, now_ns)?);
        Ok(signals)
    }
}

/// State of the receiving end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectState {
    /// Waiting for outcomes.
    Listening,
    /// The correction program is running; incoming messages are queued.
    Correcting,
}

/// Pauli correction at Bob.
///
/// Gathers one Bell outcome per repeater, then applies the net correction
/// to the qubit in `slot` and signals the end of the round. A direct link
/// (two-node path) has nothing to correct and completes as soon as its
/// qubit arrives.
#[derive(Debug, Clone)]
pub struct CorrectProtocol {
    pub path: PathId,
    slot: usize,
    frame: PauliFrame,
    state: CorrectState,
    queued: VecDeque<Message>,
    rounds: u64,
}

impl CorrectProtocol {
    /// Creates the protocol for a path of `num_nodes` nodes.
    pub fn new(path: PathId, num_nodes: usize, slot: usize) -> Self {
        Self {
            path,
            slot,
            frame: PauliFrame::new(num_nodes.saturating_sub(2)),
            state: CorrectState::Listening,
            queued: VecDeque::new(),
            rounds: 0,
        }
    }

    /// Current state.
    ///
    /// Stays [`CorrectState::Listening`] for the whole run on a direct link.
    pub fn state(&self) -> CorrectState {
        self.state
    }

    /// Outcomes gathered for the round in progress.
    pub fn frame(&self) -> &PauliFrame {
        &self.frame
    }

    /// Number of rounds completed.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Messages held back while a correction runs.
    ///
    /// They are replayed in arrival order once the correction finishes.
    pub fn num_queued(&self) -> usize {
        self.queued.len()
    }

    fn is_direct(&self) -> bool {
        self.frame.expected() == 0
    }

    /// Wakes the protocol after a qubit arrived at its position.
    ///
    /// Only a direct link reacts: the arrival itself completes the round.
    pub fn on_qubit_arrival(&mut self) -> Vec<Signal> {
        if !self.is_direct() {
            return Vec::new();
        }
        self.rounds += 1;
        vec![Signal::RoundComplete]
    }

    /// Handles a classical message from a repeater.
    pub fn on_message<R: Rng + ?Sized>(
        &mut self,
        message: Message,
        memory: &mut QuantumMemory,
        store: &mut QubitStore,
        rng: &mut R,
        now_ns: f64,
    ) -> Result<Vec<Signal>, SimError> {
        if self.state == CorrectState::Correcting {
            self.queued.push_back(message);
            return Ok(Vec::new());
        }
        let Some(outcome) = message.single() else {
            debug!(
                "path {}: dropping message with {} items",
                self.path,
                message.items.len()
            );
            return Ok(Vec::new());
        };

        let correction = match self.frame.record(outcome)? {
            FrameStatus::Pending { .. } => return Ok(Vec::new()),
            FrameStatus::Complete(correction) => correction,
        };
        if correction.is_identity() {
            return Ok(self.finish_round());
        }

        let result = memory.execute(&correction.program(self.slot), now_ns, store, rng)?;
        self.state = CorrectState::Correcting;
        debug!(
            "path {}: applying x={} z={} until t={} ns",
            self.path, correction.x, correction.z, result.finish_ns
        );
        Ok(vec![Signal::ProgramStarted {
            finish_ns: result.finish_ns,
            outcomes: result.outcomes,
        }])
    }

    /// Handles the end of the correction program: completes the round,
    /// resets, then replays messages queued meanwhile in arrival order.
    pub fn on_program_done<R: Rng + ?Sized>(
        &mut self,
        memory: &mut QuantumMemory,
        store: &mut QubitStore,
        rng: &mut R,
        now_ns: f64,
    ) -> Result<Vec<Signal>, SimError> {
        self.state = CorrectState::Listening;
        let mut signals = self.finish_round();
        while self.state == CorrectState::Listening {
            let Some(message) = self.queued.pop_front() else {
                break;
            };
            signals.extend(self.on_message(message, memory, store, rng, now_ns)?);
        }
        Ok(signals)
    }

    fn finish_round(&mut self) -> Vec<Signal> {
        self.frame.reset();
        self.rounds += 1;
        vec![Signal::RoundComplete]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::{DephaseNoiseModel, DepolarNoiseModel};
    use crate::qstate::QubitId;
    use qnet_common::BellIndex::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct Bench {
        memory: QuantumMemory,
        store: QubitStore,
        rng: StdRng,
    }

    impl Bench {
        fn new() -> Self {
            Self {
                memory: QuantumMemory::new(
                    4,
                    DepolarNoiseModel::new(0.0).unwrap(),
                    DephaseNoiseModel::new(0.0).unwrap(),
                    1.0,
                ),
                store: QubitStore::new(),
                rng: StdRng::seed_from_u64(5),
            }
        }

        /// Puts the second half of a fresh pair into `slot`, returning the
        /// first half.
        fn deliver(&mut self, slot: usize, now_ns: f64) -> QubitId {
            let (far, near) = self.store.create_bell_pair();
            self.memory.put(slot, near, now_ns).unwrap();
            far
        }

        fn message(&mut self, p: &mut CorrectProtocol, m: Message, now_ns: f64) -> Vec<Signal> {
            p.on_message(m, &mut self.memory, &mut self.store, &mut self.rng, now_ns)
                .unwrap()
        }
    }

    #[test]
    fn swap_waits_for_both_qubits() {
        let mut b = Bench::new();
        let mut swap = SwapProtocol::new(0, 0, 1);

        b.deliver(1, 0.0);
        let signals = swap
            .on_qubit_arrival(&mut b.memory, &mut b.store, &mut b.rng, 0.0)
            .unwrap();
        assert!(signals.is_empty());
        assert_eq!(swap.state(), SwapState::AwaitBoth);
        assert!(b.memory.is_occupied(1));

        b.deliver(0, 3.0);
        let signals = swap
            .on_qubit_arrival(&mut b.memory, &mut b.store, &mut b.rng, 3.0)
            .unwrap();
        let [Signal::ProgramStarted { finish_ns, outcomes }] = signals.as_slice() else {
            panic!("expected a started measurement, got {signals:?}");
        };
        assert_eq!(*finish_ns, 4.0);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(swap.state(), SwapState::Measuring);
        assert!(!b.memory.is_occupied(0) && !b.memory.is_occupied(1));

        let done = swap
            .on_program_done(outcomes, &mut b.memory, &mut b.store, &mut b.rng, 4.0)
            .unwrap();
        assert_eq!(done, vec![Signal::Forward(Message::outcome(outcomes[0]))]);
        assert_eq!(swap.state(), SwapState::AwaitBoth);
        assert_eq!(swap.swaps(), 1);
    }

    #[test]
    fn swap_ignores_wakeups_while_measuring() {
        let mut b = Bench::new();
        let mut swap = SwapProtocol::new(0, 2, 3);
        b.deliver(2, 0.0);
        b.deliver(3, 0.0);
        swap.on_qubit_arrival(&mut b.memory, &mut b.store, &mut b.rng, 0.0)
            .unwrap();

        // Next round's qubits land before the measurement reports back.
        b.deliver(2, 0.5);
        b.deliver(3, 0.5);
        let signals = swap
            .on_qubit_arrival(&mut b.memory, &mut b.store, &mut b.rng, 0.5)
            .unwrap();
        assert!(signals.is_empty());

        let done = swap
            .on_program_done(&[B00], &mut b.memory, &mut b.store, &mut b.rng, 1.0)
            .unwrap();
        assert_eq!(done.len(), 2);
        assert!(matches!(done[1], Signal::ProgramStarted { .. }));
    }

    #[test]
    fn direct_link_completes_on_arrival() {
        let mut p = CorrectProtocol::new(0, 2, 0);
        assert_eq!(p.on_qubit_arrival(), vec![Signal::RoundComplete]);
        assert_eq!(p.rounds(), 1);
        assert_eq!(p.frame().parities(), (false, false));
    }

    #[test]
    fn repeater_path_ignores_arrivals() {
        let mut p = CorrectProtocol::new(0, 4, 0);
        assert!(p.on_qubit_arrival().is_empty());
        assert_eq!(p.rounds(), 0);
    }

    #[test]
    fn all_zero_outcomes_complete_without_correction() {
        let mut b = Bench::new();
        let mut p = CorrectProtocol::new(0, 4, 1);
        b.deliver(1, 0.0);
        assert!(b.message(&mut p, Message::outcome(B00), 1.0).is_empty());
        assert_eq!(
            b.message(&mut p, Message::outcome(B00), 2.0),
            vec![Signal::RoundComplete]
        );
        assert_eq!(p.state(), CorrectState::Listening);
        assert_eq!(p.frame().received(), 0);
        assert!(!b.memory.is_busy(1, 2.0));
    }

    #[test]
    fn odd_parity_runs_a_correction_then_completes() {
        let mut b = Bench::new();
        let mut p = CorrectProtocol::new(0, 3, 1);
        b.deliver(1, 0.0);

        let signals = b.message(&mut p, Message::outcome(B11), 10.0);
        assert!(matches!(
            signals.as_slice(),
            [Signal::ProgramStarted { finish_ns, .. }] if *finish_ns == 12.0
        ));
        assert_eq!(p.state(), CorrectState::Correcting);
        assert_eq!(p.rounds(), 0);

        let done = p
            .on_program_done(&mut b.memory, &mut b.store, &mut b.rng, 12.0)
            .unwrap();
        assert_eq!(done, vec![Signal::RoundComplete]);
        assert_eq!(p.rounds(), 1);
        assert_eq!(p.frame().received(), 0);
        assert!(b.memory.is_occupied(1));
    }

    #[test]
    fn empty_message_changes_nothing() {
        let mut b = Bench::new();
        let mut p = CorrectProtocol::new(0, 4, 1);
        b.deliver(1, 0.0);
        b.message(&mut p, Message::outcome(B01), 1.0);

        let before = p.frame().clone();
        assert!(b.message(&mut p, Message::default(), 2.0).is_empty());
        assert!(
            b.message(&mut p, Message { items: vec![B10, B10] }, 3.0)
                .is_empty()
        );
        assert_eq!(p.frame(), &before);
        assert_eq!(p.frame().received(), 1);
        assert_eq!(p.frame().parities(), (true, false));
    }

    #[test]
    fn messages_during_correction_are_replayed_after_reset() {
        let mut b = Bench::new();
        let mut p = CorrectProtocol::new(0, 3, 1);
        b.deliver(1, 0.0);

        b.message(&mut p, Message::outcome(B01), 1.0);
        // Next round's outcome arrives while the X gate runs.
        assert!(b.message(&mut p, Message::outcome(B00), 1.5).is_empty());
        assert_eq!(p.num_queued(), 1);

        let done = p
            .on_program_done(&mut b.memory, &mut b.store, &mut b.rng, 2.0)
            .unwrap();
        assert_eq!(done, vec![Signal::RoundComplete, Signal::RoundComplete]);
        assert_eq!(p.rounds(), 2);
        assert_eq!(p.num_queued(), 0);
    }

    #[test]
    fn correction_against_missing_qubit_is_an_error() {
        let mut b = Bench::new();
        let mut p = CorrectProtocol::new(0, 3, 1);
        let err = p
            .on_message(
                Message::outcome(B10),
                &mut b.memory,
                &mut b.store,
                &mut b.rng,
                0.0,
            )
            .unwrap_err();
        assert_eq!(err, SimError::EmptySlot(1));
    }
}
