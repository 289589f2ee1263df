//! Common definitions shared across the quantum network simulator.
//!
//! This crate provides the typed node coordinate, the Bell outcome labels that
//! travel on classical channels, the instruction set understood by node
//! quantum memories, and the physical default constants used by the engine,
//! the I/O layer, and the command-line host.

#![no_std]

use core::fmt;

// Physical defaults for the grid network.
//
// The noise parameters are illustrative and chosen to make the effect of
// entanglement swapping visible, not calibrated to any hardware. Every value
// here can be overridden through the simulator configuration.
pub mod defaults {
    /// Probability of depolarization on entering a fibre.
    pub const P_DEPOL_INIT: f64 = 0.009;

    /// Length-dependent depolarization coefficient of a fibre.
    ///
    /// Enters the channel model as `10^(-length^2 * p_depol_length / 10)`.
    pub const P_DEPOL_LENGTH: f64 = 0.025;

    /// Depolarization rate of qubits idling in memory, in Hz.
    pub const MEMORY_NOISE_RATE_HZ: f64 = 200.0;

    /// Dephasing rate applied to the target of a Pauli gate, in Hz.
    pub const GATE_NOISE_RATE_HZ: f64 = 200.0;

    /// Duration of every physical instruction, in nanoseconds.
    pub const GATE_DURATION_NS: f64 = 1.0;

    /// Side length of the grid.
    pub const GRID_SIZE: u16 = 3;

    /// Number of memory positions per node.
    ///
    /// Four positions cover the up to four grid neighbours of an interior
    /// node, one incoming link per position.
    pub const NUM_POSITIONS: usize = 4;

    /// Distance between neighbouring grid nodes, in km.
    pub const NODE_DISTANCE_KM: f64 = 20.0;

    /// Entangled pair source frequency, in Hz.
    pub const SOURCE_FREQUENCY_HZ: f64 = 1_000.0;

    /// Propagation delay of light in fibre, in ns per km (200 000 km/s).
    pub const FIBRE_DELAY_NS_PER_KM: f64 = 5_000.0;

    /// Number of simulated iterations of the estimated round time.
    pub const NUM_ITERS: usize = 100;
}

/// Position of a node in the n x n grid.
///
/// Nodes are identified by this value everywhere in the simulator; it is
/// never encoded into or parsed back out of a name string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord {
    pub row: u16,
    pub col: u16,
}

impl Coord {
    pub const fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }

    /// Returns true if `other` is one grid step away horizontally or vertically.
    pub fn is_adjacent(&self, other: &Coord) -> bool {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col) == 1
    }

    /// Grid neighbours inside an `n` x `n` grid.
    ///
    /// Visited in the order (r+1, c), (r-1, c), (r, c+1), (r, c-1). Topology
    /// assembly allocates memory positions in this order, so the order is
    /// part of the slot layout.
    pub fn neighbours(&self, n: u16) -> impl Iterator<Item = Coord> + use<> {
        let Coord { row, col } = *self;
        let candidates = [
            (row.checked_add(1).filter(|r| *r < n), Some(col)),
            (row.checked_sub(1), Some(col)),
            (Some(row), col.checked_add(1).filter(|c| *c < n)),
            (Some(row), col.checked_sub(1)),
        ];
        candidates.into_iter().filter_map(|pair| match pair {
            (Some(r), Some(c)) => Some(Coord::new(r, c)),
            _ => None,
        })
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

impl From<(u16, u16)> for Coord {
    fn from((row, col): (u16, u16)) -> Self {
        Self::new(row, col)
    }
}

/// Outcome of a Bell-state measurement.
///
/// The two label bits are `(phase, parity)`: the phase bit calls for a Pauli
/// Z correction and the parity bit for a Pauli X correction on the far end of
/// the swapped pair.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BellIndex {
    /// |Φ+⟩, no correction.
    B00 = 0b00,
    /// |Ψ+⟩, X correction.
    B01 = 0b01,
    /// |Φ-⟩, Z correction.
    B10 = 0b10,
    /// |Ψ-⟩, X and Z corrections.
    B11 = 0b11,
}

impl BellIndex {
    pub const ALL: [BellIndex; 4] = [
        BellIndex::B00,
        BellIndex::B01,
        BellIndex::B10,
        BellIndex::B11,
    ];

    /// Builds the label from the two measured bits.
    pub fn from_bits(phase: bool, parity: bool) -> Self {
        match (phase, parity) {
            (false, false) => BellIndex::B00,
            (false, true) => BellIndex::B01,
            (true, false) => BellIndex::B10,
            (true, true) => BellIndex::B11,
        }
    }

    /// Decodes a raw two-bit label. Values above 3 are not Bell outcomes.
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0b00 => Some(BellIndex::B00),
            0b01 => Some(BellIndex::B01),
            0b10 => Some(BellIndex::B10),
            0b11 => Some(BellIndex::B11),
            _ => None,
        }
    }

    /// True if the outcome calls for an X correction.
    pub fn x_parity(self) -> bool {
        (self as u8) & 0b01 != 0
    }

    /// True if the outcome calls for a Z correction.
    pub fn z_parity(self) -> bool {
        (self as u8) & 0b10 != 0
    }
}

impl fmt::Display for BellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{:02b}", *self as u8)
    }
}

/// Instruction set understood by node quantum memories.
///
/// Programs are short fixed sequences of these instructions addressed to
/// memory positions. Each instruction has a physical duration and may carry
/// a noise model; both are properties of the memory, not of the instruction.
pub mod isa {
    /// Opcode enumeration for memory instructions.
    #[repr(u8)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Opcode {
        /// Joint Bell-basis measurement of two positions.
        ///
        /// Consumes both qubits and produces one Bell outcome. Implemented
        /// as CNOT(a, b), H(a) followed by Z-basis readout of both qubits.
        MeasureBell = 0x01,

        /// Apply Pauli X to a position.
        PauliX = 0x02,

        /// Apply Pauli Z to a position.
        PauliZ = 0x03,
    }

    /// A single memory instruction.
    ///
    /// `operand_2` is only read by two-position instructions; single-qubit
    /// gates ignore it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Instruction {
        pub opcode: Opcode,
        pub operand_1: usize,
        pub operand_2: usize,
    }

    impl Instruction {
        /// Constructs a new instruction with the specified opcode and operands.
        pub fn new(opcode: Opcode, op1: usize, op2: usize) -> Self {
            Self {
                opcode,
                operand_1: op1,
                operand_2: op2,
            }
        }

        /// Bell measurement of the qubits in positions `a` and `b`.
        pub fn measure_bell(a: usize, b: usize) -> Self {
            Self::new(Opcode::MeasureBell, a, b)
        }

        /// Bit flip on position `q`.
        pub fn pauli_x(q: usize) -> Self {
            Self::new(Opcode::PauliX, q, 0)
        }

        /// Phase flip on position `q`.
        pub fn pauli_z(q: usize) -> Self {
            Self::new(Opcode::PauliZ, q, 0)
        }

        /// Positions touched by this instruction.
        pub fn positions(&self) -> ([usize; 2], usize) {
            match self.opcode {
                Opcode::MeasureBell => ([self.operand_1, self.operand_2], 2),
                Opcode::PauliX | Opcode::PauliZ => ([self.operand_1, self.operand_1], 1),
            }
        }
    }
}
