//! Simulation engine contract.
//!
//! The harness hands two launched [`Participant`]s and the [`MatchSetup`] to a
//! [`SimulationEngine`], and blocks until the engine returns its outcome or fails. Turn
//! sequencing, per-agent timeouts and game rules all belong to the engine.
//!
//! [`TurnBasedEngine`] is provided for any two-player [`Game`].

use std::sync::Arc;

use crate::agent::Participant;
use crate::run_configuration::RunConfiguration;
use crate::workspace::Workspace;

pub mod turn_based;

pub use turn_based::{Disqualification, Game, GameFactory, MatchOutcome, TurnBasedEngine};

/// Per-run state shared by the agents and the engine.
#[derive(Debug, Clone)]
pub struct MatchSetup {
    /// Read-only options of the match.
    pub config: Arc<RunConfiguration>,
    /// Debug artifacts directory, empty when the match starts.
    pub workspace: Workspace,
}

/// Executes one match end-to-end.
pub trait SimulationEngine {
    /// The result of a completed match. Opaque to the harness.
    type Outcome;

    /// Play the match between `players` (player 0 first) and return its outcome.
    ///
    /// # Error
    /// Returned when the engine itself fails. Misbehaving agents are part of the outcome.
    fn run_match(
        &mut self,
        players: [Participant; 2],
        setup: &MatchSetup,
    ) -> anyhow::Result<Self::Outcome>;
}
