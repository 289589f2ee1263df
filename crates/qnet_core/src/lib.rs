//! Core entanglement distribution engine for the grid quantum network.
//!
//! This crate provides the density-matrix qubit store, the fibre and memory
//! noise models, node quantum memories that execute instruction programs,
//! the repeater swap and end-node correction protocols, the discrete-event
//! scheduler that drives them, and the fidelity collector. Everything runs
//! on a single simulated timeline and is reproducible for a given seed.

use qnet_common::Coord;
use qstate::QubitId;
use thiserror::Error;

/// Fidelity data collection on round completion.
///
/// Reads the two endpoint qubits of a path without disturbing them and
/// records their fidelity against |Φ+⟩ once per completed round.
pub mod collector;

/// Grid network graph: nodes, links and memory position bindings.
///
/// Builds the n x n grid, allocates one memory position per link endpoint,
/// and answers adjacency queries for path validation.
pub mod graph;

/// Per-node quantum memory executing instruction programs.
///
/// Holds qubits in addressable positions, applies time-based memory noise,
/// and runs Bell measurement and Pauli programs atomically with respect to
/// other programs touching the same positions.
pub mod memory;

/// Channel, memory and gate noise models.
///
/// Converts physical quantities (fibre length, idle time, gate duration)
/// into depolarizing or dephasing probabilities and applies the matching
/// Kraus channel to qubits in the store.
pub mod noise;

/// Pauli correction accumulator for end nodes.
///
/// Tracks how many Bell outcomes of the current round have arrived and the
/// X and Z correction parities they imply. Only parity matters, so arrival
/// order is irrelevant.
pub mod pauli_frame;

/// Repeater and end-node protocol state machines.
///
/// The swap protocol measures a repeater's two incoming qubits and forwards
/// the outcome toward the receiver; the correction protocol accumulates the
/// outcomes and applies the net correction at the receiving end.
pub mod protocol;

/// Density-matrix representation of qubit groups.
///
/// Each group of entangled qubits shares one density matrix. Groups merge
/// when a two-qubit operation spans them and shrink when qubits are measured
/// or discarded.
pub mod qstate;

/// Validated paths through the grid and random route selection.
pub mod routing;

/// Discrete-event scheduler ordered by simulated time.
///
/// Ties at the same timestamp are resolved by insertion order so that a run
/// is fully deterministic.
pub mod scheduler;

/// Simulation driver wiring the network, protocols and collectors together.
///
/// Validates configuration and traffic before any event runs, clocks the
/// entangled pair sources, and advances the timeline for the estimated
/// runtime times the configured number of iterations.
pub mod sim;

/// Error types returned by the simulation engine.
///
/// Configuration and topology errors are raised before the simulation starts.
/// Memory and protocol errors abort a running simulation; samples gathered
/// up to that point are kept in the report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// A probability parameter is outside [0, 1] or not finite.
    #[error("{name} must be a probability in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    /// A channel length is negative or not finite.
    #[error("channel length must be finite and non-negative, got {0} km")]
    InvalidLength(f64),

    /// A configuration value is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A coordinate does not name a node of the grid.
    #[error("node {0} is not part of the network")]
    UnknownNode(Coord),

    /// Two consecutive path nodes have no connection between them.
    #[error("nodes {0} and {1} are not connected")]
    NotAdjacent(Coord, Coord),

    /// A path has fewer than two nodes.
    #[error("a path needs at least two nodes, got {0}")]
    PathTooShort(usize),

    /// A path visits the same node twice.
    #[error("path visits node {0} more than once")]
    RepeatedNode(Coord),

    /// A node has no free memory position left for another link.
    #[error("node {0} has no free memory position for another link")]
    SlotExhausted(Coord),

    /// Two paths reserve the same memory position of a node.
    #[error("memory position {slot} of node {node} is reserved by more than one path")]
    SlotConflict { node: Coord, slot: usize },

    /// A memory position index exceeds the memory size.
    #[error("memory position {slot} out of range for memory of size {size}")]
    SlotOutOfRange { slot: usize, size: usize },

    /// A program addressed a memory position that holds no qubit.
    #[error("memory position {0} is empty")]
    EmptySlot(usize),

    /// A program touched a position locked by a program still running.
    #[error("memory position {slot} is busy until t={until_ns} ns")]
    MemoryBusy { slot: usize, until_ns: f64 },

    /// A qubit handle no longer refers to a live qubit.
    #[error("qubit {0} is not tracked by the state store")]
    UnknownQubit(QubitId),

    /// More Bell outcomes arrived for a round than the path has repeaters.
    #[error("received {received} correction messages, expected {expected}")]
    CountMismatch { expected: usize, received: usize },
}
