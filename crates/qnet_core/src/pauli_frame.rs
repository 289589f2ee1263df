//! Pauli correction tracking for the receiving end of a path.
//!
//! Every entanglement swap on a path leaves the far qubit off by a known
//! Pauli operator, selected by the repeater's Bell outcome. Paulis commute up
//! to a global phase, so the net correction only depends on how many X and Z
//! contributions arrived, not on their order. The frame records those counts
//! for one round and reports the correction once every repeater has been
//! heard from.

use crate::SimError;
use qnet_common::BellIndex;
use qnet_common::isa::Instruction;

/// Net Pauli correction for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Correction {
    pub x: bool,
    pub z: bool,
}

impl Correction {
    /// Returns true if no gate needs to run.
    pub fn is_identity(&self) -> bool {
        !self.x && !self.z
    }

    /// Memory program applying this correction to position `slot`.
    ///
    /// X is applied before Z; the two orders differ only by a global phase.
    pub fn program(&self, slot: usize) -> Vec<Instruction> {
        let mut program = Vec::with_capacity(2);
        if self.x {
            program.push(Instruction::pauli_x(slot));
        }
        if self.z {
            program.push(Instruction::pauli_z(slot));
        }
        program
    }
}

/// Progress of the round a frame is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// More outcomes are needed before the round can be corrected.
    Pending { received: usize, expected: usize },
    /// Every repeater reported; this correction finalizes the round.
    Complete(Correction),
}

/// Correction accumulator for one path.
///
/// Holds the number of Bell outcomes received this round and how many of
/// them requested X and Z corrections. Created with the number of repeaters
/// on the path. Once the expected count is reached the frame is complete and
/// rejects further outcomes until [`PauliFrame::reset`] starts the next
/// round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauliFrame {
    expected: usize,
    received: usize,
    x_corr: usize,
    z_corr: usize,
}

impl PauliFrame {
    /// Creates an empty frame expecting `expected` outcomes per round.
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            received: 0,
            x_corr: 0,
            z_corr: 0,
        }
    }

    /// Outcomes that make up one round, one per repeater.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Outcomes folded in since the last [`PauliFrame::reset`].
    pub fn received(&self) -> usize {
        self.received
    }

    /// Current (X parity, Z parity).
    pub fn parities(&self) -> (bool, bool) {
        (self.x_corr % 2 == 1, self.z_corr % 2 == 1)
    }

    /// Net correction for the outcomes received so far.
    ///
    /// Only meaningful once the round is complete; a partial frame gives
    /// the correction of the repeaters heard from.
    pub fn correction(&self) -> Correction {
        let (x, z) = self.parities();
        Correction { x, z }
    }

    /// Whether the round is complete, and if so which correction applies.
    pub fn status(&self) -> FrameStatus {
        if self.received == self.expected {
            FrameStatus::Complete(self.correction())
        } else {
            FrameStatus::Pending {
                received: self.received,
                expected: self.expected,
            }
        }
    }

    /// Folds one Bell outcome into the frame.
    ///
    /// # Returns
    ///
    /// The frame status after the outcome, or `CountMismatch` if the round
    /// was already complete.
    pub fn record(&mut self, outcome: BellIndex) -> Result<FrameStatus, SimError> {
        if self.received >= self.expected {
            return Err(SimError::CountMismatch {
                expected: self.expected,
                received: self.received + 1,
            });
        }
        if outcome.x_parity() {
            self.x_corr += 1;
        }
        if outcome.z_parity() {
            self.z_corr += 1;
        }
        self.received += 1;
        Ok(self.status())
    }

    /// Starts the next round: all counters back to zero.
    pub fn reset(&mut self) {
        self.received = 0;
        self.x_corr = 0;
        self.z_corr = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_common::BellIndex::*;

    fn run(frame: &mut PauliFrame, outcomes: &[BellIndex]) -> FrameStatus {
        let mut status = frame.status();
        for &o in outcomes {
            status = frame.record(o).unwrap();
        }
        status
    }

    #[test]
    fn single_outcome_maps_to_its_parities() {
        for (outcome, x, z) in [
            (B00, false, false),
            (B01, true, false),
            (B10, false, true),
            (B11, true, true),
        ] {
            let mut frame = PauliFrame::new(1);
            assert_eq!(
                frame.record(outcome).unwrap(),
                FrameStatus::Complete(Correction { x, z })
            );
        }
    }

    #[test]
    fn accumulation_is_order_independent() {
        let outcomes = [B01, B11, B10, B01, B00];
        let mut reference = PauliFrame::new(outcomes.len());
        let expected = run(&mut reference, &outcomes);

        // Every rotation and the reversal of the arrival order.
        for shift in 0..outcomes.len() {
            let mut rotated = outcomes;
            rotated.rotate_left(shift);
            let mut frame = PauliFrame::new(outcomes.len());
            assert_eq!(run(&mut frame, &rotated), expected);

            rotated.reverse();
            let mut frame = PauliFrame::new(outcomes.len());
            assert_eq!(run(&mut frame, &rotated), expected);
        }
        assert_eq!(expected, FrameStatus::Complete(Correction { x: true, z: false }));
    }

    #[test]
    fn all_zero_outcomes_need_no_correction() {
        let mut frame = PauliFrame::new(3);
        let status = run(&mut frame, &[B00, B00, B00]);
        assert_eq!(status, FrameStatus::Complete(Correction::default()));
        assert!(frame.correction().program(1).is_empty());
    }

    #[test]
    fn pending_until_every_repeater_reported() {
        let mut frame = PauliFrame::new(2);
        assert_eq!(
            frame.record(B11).unwrap(),
            FrameStatus::Pending {
                received: 1,
                expected: 2
            }
        );
        assert!(matches!(frame.record(B01).unwrap(), FrameStatus::Complete(_)));
    }

    #[test]
    fn extra_outcome_is_a_count_mismatch() {
        let mut frame = PauliFrame::new(1);
        frame.record(B10).unwrap();
        assert_eq!(
            frame.record(B00),
            Err(SimError::CountMismatch {
                expected: 1,
                received: 2
            })
        );
    }

    #[test]
    fn reset_isolates_consecutive_rounds() {
        let mut frame = PauliFrame::new(2);
        run(&mut frame, &[B11, B01]);
        frame.reset();
        assert_eq!(frame.received(), 0);
        assert_eq!(frame.parities(), (false, false));
        let status = run(&mut frame, &[B00, B10]);
        assert_eq!(status, FrameStatus::Complete(Correction { x: false, z: true }));
    }

    #[test]
    fn correction_program_applies_x_before_z() {
        let both = Correction { x: true, z: true };
        assert_eq!(
            both.program(2),
            vec![Instruction::pauli_x(2), Instruction::pauli_z(2)]
        );
    }
}
