//! Phase tracking for the multi-round protocols.

use std::fmt::Display;

use tracing::warn;

use crate::{Error, Result};

/// The phase of a protocol instance.
///
/// A fresh instance is [`Phase::Idle`]. Generating or aggregating a share of
/// round `r` moves it to the phase of round `r`, and is only allowed from the
/// phase of round `r - 1` or from the phase of round `r` itself. Finalizing is
/// only allowed after the last round, and moves the instance to
/// [`Phase::Finalized`], after which every operation is rejected until the
/// instance is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// No share was generated or aggregated yet.
    Idle,
    /// First round in progress.
    RoundOne,
    /// Second round in progress.
    RoundTwo,
    /// Third round in progress.
    RoundThree,
    /// The output artifact was produced.
    Finalized,
}

impl Phase {
    /// The phase of a given round, starting at 1.
    pub fn of_round(round: usize) -> Option<Self> {
        match round {
            1 => Some(Phase::RoundOne),
            2 => Some(Phase::RoundTwo),
            3 => Some(Phase::RoundThree),
            _ => None,
        }
    }

    /// The phase preceding a given round.
    fn before_round(round: usize) -> Option<Self> {
        match round {
            0 => None,
            1 => Some(Phase::Idle),
            r => Self::of_round(r - 1),
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::RoundOne => write!(f, "Round 1"),
            Phase::RoundTwo => write!(f, "Round 2"),
            Phase::RoundThree => write!(f, "Round 3"),
            Phase::Finalized => write!(f, "Finalized"),
        }
    }
}

/// Checked phase transitions of a protocol with a fixed number of rounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RoundTracker {
    phase: Phase,
    rounds: usize,
}

impl RoundTracker {
    pub(crate) fn new(rounds: usize) -> Self {
        Self {
            phase: Phase::Idle,
            rounds,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    /// Check that an operation of `round` is allowed, without moving.
    pub(crate) fn check(&self, round: usize, operation: &'static str) -> Result<Phase> {
        let target = Phase::of_round(round).filter(|_| round <= self.rounds);
        let previous = Phase::before_round(round);
        match (target, previous) {
            (Some(target), Some(previous))
                if self.phase == previous || self.phase == target =>
            {
                Ok(target)
            }
            _ => Err(self.reject(operation)),
        }
    }

    /// Move to the phase of `round`, or reject the operation.
    ///
    /// Protocols call this once the operation succeeded, so that a failed
    /// operation leaves the phase unchanged.
    pub(crate) fn enter(&mut self, round: usize, operation: &'static str) -> Result<()> {
        self.phase = self.check(round, operation)?;
        Ok(())
    }

    /// Check that the last round was reached.
    pub(crate) fn check_final(&self, operation: &'static str) -> Result<()> {
        if Phase::of_round(self.rounds) == Some(self.phase) {
            Ok(())
        } else {
            Err(self.reject(operation))
        }
    }

    pub(crate) fn finish(&mut self) {
        self.phase = Phase::Finalized
    }

    pub(crate) fn reset(&mut self) {
        self.phase = Phase::Idle
    }

    fn reject(&self, operation: &'static str) -> Error {
        warn!(operation, phase = %self.phase, "operation rejected by the protocol phase");
        Error::InvalidPhase {
            operation,
            phase: self.phase,
        }
    }
}
