//! Rock-paper-scissors, played in `2 * league + 1` simultaneous rounds.
//!
//! Each turn a player reads one line:
//!
//! ```text
//! <round> <my_score> <their_score> <their_last_move|NONE>
//! ```
//!
//! and answers `ROCK`, `PAPER` or `SCISSORS`. A round won is worth one point.

use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    str::FromStr,
};

use anyhow::{bail, Context};
use rand::seq::SliceRandom;
use tracing::warn;

use crate::agent::{AgentContext, Bot};
use crate::engine::{Game, GameFactory};
use crate::registry::AgentRegistry;
use crate::run_configuration::RunConfiguration;

/// A move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpsAction {
    /// Beats scissors.
    Rock,
    /// Beats rock.
    Paper,
    /// Beats paper.
    Scissors,
}

impl RpsAction {
    /// All moves.
    pub const ALL: [RpsAction; 3] = [RpsAction::Rock, RpsAction::Paper, RpsAction::Scissors];

    /// The move beating `self`.
    pub fn beaten_by(self) -> RpsAction {
        match self {
            RpsAction::Rock => RpsAction::Paper,
            RpsAction::Paper => RpsAction::Scissors,
            RpsAction::Scissors => RpsAction::Rock,
        }
    }

    /// `true` if `self` wins against `other`.
    pub fn beats(self, other: RpsAction) -> bool {
        other.beaten_by() == self
    }
}

impl fmt::Display for RpsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpsAction::Rock => "ROCK",
            RpsAction::Paper => "PAPER",
            RpsAction::Scissors => "SCISSORS",
        };
        f.write_str(s)
    }
}

impl FromStr for RpsAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ROCK" => Ok(RpsAction::Rock),
            "PAPER" => Ok(RpsAction::Paper),
            "SCISSORS" => Ok(RpsAction::Scissors),
            other => Err(format!("unknown move '{other}'")),
        }
    }
}

/// What a player sees at the start of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerState {
    /// Round number, from 1.
    pub round: u32,
    /// Own score.
    pub my_score: u32,
    /// Opponent score.
    pub their_score: u32,
    /// Opponent previous move.
    pub their_last_move: Option<RpsAction>,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} ", self.round, self.my_score, self.their_score)?;
        match self.their_last_move {
            Some(action) => write!(f, "{action}"),
            None => f.write_str("NONE"),
        }
    }
}

impl FromStr for PlayerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = s.split_whitespace().collect::<Vec<_>>();
        let [round, my_score, their_score, last] = tokens[..] else {
            return Err(format!("expected 4 tokens, got '{s}'"));
        };
        let number = |t: &str| t.parse::<u32>().map_err(|e| format!("'{t}': {e}"));
        Ok(PlayerState {
            round: number(round)?,
            my_score: number(my_score)?,
            their_score: number(their_score)?,
            their_last_move: match last {
                "NONE" => None,
                action => Some(action.parse()?),
            },
        })
    }
}

/// A match of rock-paper-scissors.
#[derive(Debug, Clone)]
pub struct RockPaperScissors {
    rounds: u32,
    round: u32,
    scores: [u32; 2],
    last_moves: Option<[RpsAction; 2]>,
}

impl RockPaperScissors {
    /// A game of `rounds` rounds.
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds,
            round: 0,
            scores: [0, 0],
            last_moves: None,
        }
    }

    /// Number of rounds of the game.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}

impl Game for RockPaperScissors {
    type Action = RpsAction;

    fn observation(&self, player_number: usize) -> String {
        let opponent = 1 - player_number;
        PlayerState {
            round: self.round + 1,
            my_score: self.scores[player_number],
            their_score: self.scores[opponent],
            their_last_move: self.last_moves.map(|moves| moves[opponent]),
        }
        .to_string()
    }

    fn apply_actions(&mut self, actions: [RpsAction; 2]) -> anyhow::Result<()> {
        if self.is_finished() {
            bail!("game already finished");
        }
        if actions[0].beats(actions[1]) {
            self.scores[0] += 1;
        } else if actions[1].beats(actions[0]) {
            self.scores[1] += 1;
        }
        self.last_moves = Some(actions);
        self.round += 1;
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.round >= self.rounds
    }

    fn player_score(&self, player_number: usize) -> f32 {
        self.scores[player_number] as f32
    }
}

/// Creates games whose length depends on the league level.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpsFactory;

impl GameFactory<RockPaperScissors> for RpsFactory {
    fn new_game(&self, config: &RunConfiguration) -> RockPaperScissors {
        RockPaperScissors::new(2 * u32::from(config.league_level().get()) + 1)
    }
}

fn parse_state(observation: &str) -> anyhow::Result<PlayerState> {
    observation
        .parse::<PlayerState>()
        .map_err(anyhow::Error::msg)
        .context("could not read game state")
}

/// Always plays rock.
pub struct AlwaysRock;

impl Bot for AlwaysRock {
    fn play_turn(&mut self, observation: &str) -> anyhow::Result<String> {
        parse_state(observation)?;
        Ok(RpsAction::Rock.to_string())
    }
}

/// Plays rock, paper, scissors, rock...
#[derive(Default)]
pub struct Cycle {
    next: usize,
}

impl Bot for Cycle {
    fn play_turn(&mut self, observation: &str) -> anyhow::Result<String> {
        parse_state(observation)?;
        let action = RpsAction::ALL[self.next % RpsAction::ALL.len()];
        self.next += 1;
        Ok(action.to_string())
    }
}

/// Plays what beats the opponent previous move. On local tests, explains itself in the workspace.
pub struct Counter {
    debug_log: Option<BufWriter<File>>,
}

impl Counter {
    /// Create the bot for the match described by `context`.
    pub fn new(context: &AgentContext) -> Self {
        let debug_log = if context.config.is_local_test() {
            let name = format!("counter_player{}.log", context.player_number);
            match context.workspace.create_artifact(&name) {
                Ok(file) => Some(BufWriter::new(file)),
                Err(e) => {
                    warn!("counter bot cannot write its debug log: {e}");
                    None
                }
            }
        } else {
            None
        };
        Self { debug_log }
    }
}

impl Bot for Counter {
    fn play_turn(&mut self, observation: &str) -> anyhow::Result<String> {
        let state = parse_state(observation)?;
        let action = state
            .their_last_move
            .map_or(RpsAction::Rock, RpsAction::beaten_by);
        if let Some(log) = &mut self.debug_log {
            writeln!(
                log,
                "round {}: they played {}, playing {action}",
                state.round,
                state
                    .their_last_move
                    .map_or_else(|| "nothing".to_string(), |a| a.to_string())
            )
            .and_then(|()| log.flush())
            .context("could not write debug log")?;
        }
        Ok(action.to_string())
    }
}

/// Plays uniformly at random.
pub struct RandomMove;

impl Bot for RandomMove {
    fn play_turn(&mut self, observation: &str) -> anyhow::Result<String> {
        parse_state(observation)?;
        let action = RpsAction::ALL
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(RpsAction::Rock);
        Ok(action.to_string())
    }
}

/// Register `rock`, `cycle`, `counter` and `random`.
pub fn register_builtin_bots(registry: &mut AgentRegistry) -> &mut AgentRegistry {
    registry
        .register_bot("rock", |_: &AgentContext| Box::new(AlwaysRock) as Box<dyn Bot>)
        .register_bot("cycle", |_: &AgentContext| {
            Box::new(Cycle::default()) as Box<dyn Bot>
        })
        .register_bot("counter", |context: &AgentContext| {
            Box::new(Counter::new(context)) as Box<dyn Bot>
        })
        .register_bot("random", |_: &AgentContext| Box::new(RandomMove) as Box<dyn Bot>)
}
