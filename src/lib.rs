//! # Duel Harness
//!
//! A local harness running one match between two agents of a two-player game.
//!
//! It provides:
//! - An agent registry mapping names to in-process bots or external command lines ([`registry`])
//! - A per-run debug directory, emptied before every match ([`workspace`])
//! - Validated run options, `leagueLevel` and `isLocalTest` ([`run_configuration`])
//! - A match orchestrator handing both agents to a simulation engine ([`orchestrator`])
//! - A reference turn-based engine and a rock-paper-scissors game with a few bots
//!
//! External agents are OS processes talking over stdin/stdout, one line per message. They get
//! the run options through their environment (`LEAGUE_LEVEL`, `IS_LOCAL_TEST`) and the
//! workspace path through `DUEL_WORKSPACE`.
//!
//! # Documentation Overview
//!
//! - For the run lifecycle and its failure modes, see [`MatchOrchestrator`](crate::orchestrator::MatchOrchestrator)
//! and [`HarnessError`](crate::error::HarnessError).
//! - For harness behaviors (verbosity, logging, workspace path), see [`Configuration`](crate::configuration::Configuration).
//! - For plugging in your own game, see the [`Game`](crate::engine::Game) and
//! [`GameFactory`](crate::engine::GameFactory) traits, or implement
//! [`SimulationEngine`](crate::engine::SimulationEngine) directly.
//!
//! # Usage Example
//!
//! ```no_run
//! use duel_harness::games::rock_paper_scissors::RockPaperScissors;
//! use duel_harness::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut registry = AgentRegistry::new();
//!     register_builtin_bots(&mut registry);
//!     registry.register_command("mine", "python3 /home/user/player.py");
//!
//!     let config = Configuration::from_env();
//!     let engine = TurnBasedEngine::<RockPaperScissors, _>::new(RpsFactory);
//!     let mut orchestrator = MatchOrchestrator::new(registry, engine, config);
//!
//!     let pairing = Pairing::new("counter", "mine")
//!         .with_option("leagueLevel", 2)
//!         .with_option("isLocalTest", true);
//!     let outcome = orchestrator.run_match(&pairing)?;
//!     println!("{outcome}");
//!     Ok(())
//! }
//! ```
//!
//! # Example Agent
//!
//! An external agent for the built-in rock-paper-scissors game reads one line per round and
//! answers one line:
//!
//! ```no_run
//! use std::io::{self, BufRead, Write};
//!
//! fn main() -> io::Result<()> {
//!     let league: u32 = std::env::var("LEAGUE_LEVEL")
//!         .ok()
//!         .and_then(|l| l.parse().ok())
//!         .unwrap_or(1);
//!     let mut stdout = io::stdout();
//!     for line in io::stdin().lock().lines() {
//!         // <round> <my_score> <their_score> <their_last_move|NONE>
//!         let line = line?;
//!         let answer = if league > 1 && line.ends_with("ROCK") { "PAPER" } else { "ROCK" };
//!         writeln!(stdout, "{answer}")?;
//!         stdout.flush()?;
//!     }
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;

pub mod agent;
pub mod configuration;
pub mod engine;
pub mod error;
pub mod games;
pub mod logger;
pub mod orchestrator;
mod process;
pub mod registry;
pub mod run_configuration;
pub mod workspace;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use duel_harness::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{AgentContext, Bot};
    pub use crate::configuration::Configuration;
    pub use crate::engine::{Game, GameFactory, MatchOutcome, SimulationEngine, TurnBasedEngine};
    pub use crate::error::HarnessError;
    pub use crate::games::rock_paper_scissors::{register_builtin_bots, RpsFactory};
    pub use crate::orchestrator::{MatchOrchestrator, MatchPhase, Pairing};
    pub use crate::registry::AgentRegistry;
    pub use crate::run_configuration::{RunConfiguration, RunOptions};
    pub use crate::workspace::Workspace;
}
