//! Traits a game needs to implement to be played by the [`TurnBasedEngine`], and the engine.
//!
//! Turns are simultaneous: every turn, each player is sent its observation and answers with
//! its action. Once both actions are collected, they are applied together.
//!
//! A player that does not answer in time, closes its output or answers something that does not
//! parse as an action is disqualified: the match stops, its score is `-1` and the other player
//! wins.

use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    marker::PhantomData,
    str::FromStr,
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use tracing::{info, instrument, trace, warn};

use crate::agent::Participant;
use crate::engine::{MatchSetup, SimulationEngine};
use crate::run_configuration::RunConfiguration;
use crate::workspace::Workspace;

/// What the game should implement
pub trait Game {
    /// What should be returned by players to make the game progress.
    type Action: FromStr;

    /// Input given once to `player_number` before the first turn, if any.
    fn initial_input(&self, _player_number: usize) -> Option<String> {
        None
    }

    /// The current state as seen by `player_number`.
    fn observation(&self, player_number: usize) -> String;

    /// Number of lines a player answers per turn.
    fn expected_output_lines(&self) -> usize {
        1
    }

    /// Apply the actions of both players, player 0 first.
    ///
    /// # Error
    /// Returned when the game cannot go on. This aborts the match.
    fn apply_actions(&mut self, actions: [Self::Action; 2]) -> anyhow::Result<()>;

    /// True if game is finished
    fn is_finished(&self) -> bool;

    /// Used at the end of the game to collect players score
    fn player_score(&self, player_number: usize) -> f32;
}

/// What will be given to the engine to allow it to create games
pub trait GameFactory<G: Game> {
    /// Returns an initialized game for the options of the match.
    fn new_game(&self, config: &RunConfiguration) -> G;
}

/// A player removed from the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disqualification {
    /// Player number.
    pub player_number: usize,
    /// What the player did wrong.
    pub reason: String,
}

/// Result of a completed match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Agent names, by player number.
    pub players: [String; 2],
    /// Final scores, by player number. Disqualified players score `-1`.
    pub scores: [f32; 2],
    /// Winning player number, `None` on a draw.
    pub winner: Option<usize>,
    /// Number of turns played.
    pub turns: u32,
    /// Players removed before the end of the game.
    pub disqualifications: Vec<Disqualification>,
}

impl MatchOutcome {
    fn new(
        players: [String; 2],
        mut scores: [f32; 2],
        turns: u32,
        disqualifications: Vec<Disqualification>,
    ) -> Self {
        for d in &disqualifications {
            scores[d.player_number] = -1.0;
        }
        let winner = match disqualifications.as_slice() {
            [] if scores[0] > scores[1] => Some(0),
            [] if scores[1] > scores[0] => Some(1),
            [] => None,
            [d] => Some(1 - d.player_number),
            _ => None,
        };
        Self {
            players,
            scores,
            winner,
            turns,
            disqualifications,
        }
    }

    /// Name of the winning agent, `None` on a draw.
    pub fn winner_name(&self) -> Option<&str> {
        self.winner.map(|n| self.players[n].as_str())
    }

    /// `true` if no player won.
    pub fn is_draw(&self) -> bool {
        self.winner.is_none()
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} - {} {}",
            self.players[0], self.scores[0], self.scores[1], self.players[1]
        )?;
        match self.winner_name() {
            Some(name) => write!(f, ", winner: {name}")?,
            None => write!(f, ", draw")?,
        }
        write!(f, " ({} turns)", self.turns)?;
        for d in &self.disqualifications {
            write!(
                f,
                "; {} disqualified: {}",
                self.players[d.player_number], d.reason
            )?;
        }
        Ok(())
    }
}

/// Plays any [`Game`] created by a [`GameFactory`].
pub struct TurnBasedEngine<G, F> {
    factory: F,
    action_timeout: Duration,
    max_turns: u32,
    _game: PhantomData<fn() -> G>,
}

impl<G: Game, F: GameFactory<G>> TurnBasedEngine<G, F> {
    /// Time given to a player to answer one turn, unless changed.
    pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(1);
    /// Turn limit, unless changed.
    pub const DEFAULT_MAX_TURNS: u32 = 200;

    /// Create an engine playing the games of `factory`.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            action_timeout: Self::DEFAULT_ACTION_TIMEOUT,
            max_turns: Self::DEFAULT_MAX_TURNS,
            _game: PhantomData,
        }
    }

    /// Sets the time given to a player to answer one turn.
    #[must_use]
    pub fn with_action_timeout(self, action_timeout: Duration) -> Self {
        Self {
            action_timeout,
            ..self
        }
    }

    /// Sets the number of turns after which the game stops, finished or not.
    #[must_use]
    pub fn with_max_turns(self, max_turns: u32) -> Self {
        Self { max_turns, ..self }
    }
}

impl<G: Game, F: GameFactory<G>> SimulationEngine for TurnBasedEngine<G, F> {
    type Outcome = MatchOutcome;

    #[instrument(skip_all, fields(player_0 = players[0].name(), player_1 = players[1].name()))]
    fn run_match(
        &mut self,
        mut players: [Participant; 2],
        setup: &MatchSetup,
    ) -> anyhow::Result<MatchOutcome> {
        let mut game = self.factory.new_game(&setup.config);
        let mut turn_log = if setup.config.is_local_test() {
            Some(TurnLog::create(&setup.workspace)?)
        } else {
            None
        };
        let names = players.each_ref().map(|p| p.name().to_string());
        let mut disqualifications = vec![];

        for (n, player) in players.iter_mut().enumerate() {
            let Some(input) = game.initial_input(n) else {
                continue;
            };
            if let Some(log) = &mut turn_log {
                log.record(0, &names[n], "<", &input)?;
            }
            if let Err(e) = player.send_initial_input(&input) {
                warn!(player = %names[n], "initial input refused: {e:#}");
                disqualifications.push(Disqualification {
                    player_number: n,
                    reason: format!("{e:#}"),
                });
            }
        }

        let mut turns = 0;
        while disqualifications.is_empty() && !game.is_finished() {
            if turns >= self.max_turns {
                info!(turns, "turn limit reached");
                break;
            }
            turns += 1;
            trace!(turn = turns, "new turn");

            let mut actions = Vec::with_capacity(2);
            for (n, player) in players.iter_mut().enumerate() {
                let observation = game.observation(n);
                let answer = player.exchange(
                    &observation,
                    game.expected_output_lines(),
                    self.action_timeout,
                );
                if let Some(log) = &mut turn_log {
                    log.record(turns, &names[n], "<", &observation)?;
                    if let Ok(lines) = &answer {
                        log.record(turns, &names[n], ">", &lines.join("\n"))?;
                    }
                }
                match answer.and_then(|lines| parse_action::<G::Action>(&lines)) {
                    Ok(action) => actions.push(action),
                    Err(e) => {
                        warn!(player = %names[n], turn = turns, "{e:#}");
                        disqualifications.push(Disqualification {
                            player_number: n,
                            reason: format!("{e:#}"),
                        });
                    }
                }
            }
            if !disqualifications.is_empty() {
                break;
            }

            let Ok(actions) = <[G::Action; 2]>::try_from(actions) else {
                bail!("turn {turns}: expected one action per player");
            };
            game.apply_actions(actions)
                .with_context(|| format!("turn {turns}: game rules failed"))?;
        }

        for player in players {
            let name = player.name().to_string();
            if let Err(e) = player.shutdown() {
                warn!(player = %name, "could not stop agent: {e:#}");
            }
        }
        if let Some(log) = turn_log {
            log.finish()?;
        }

        let scores = [game.player_score(0), game.player_score(1)];
        let outcome = MatchOutcome::new(names, scores, turns, disqualifications);
        info!(%outcome, "match over");
        Ok(outcome)
    }
}

fn parse_action<A: FromStr>(lines: &[String]) -> anyhow::Result<A> {
    let text = lines.join("\n");
    A::from_str(&text).map_err(|_| anyhow!("invalid action '{text}'"))
}

/// Turn by turn record of a local test match.
struct TurnLog {
    file: BufWriter<File>,
}

impl TurnLog {
    const FILE_NAME: &'static str = "turns.log";

    fn create(workspace: &Workspace) -> anyhow::Result<TurnLog> {
        let file = workspace
            .create_artifact(Self::FILE_NAME)
            .context("could not create turn log")?;
        Ok(TurnLog {
            file: BufWriter::new(file),
        })
    }

    fn record(&mut self, turn: u32, player: &str, direction: &str, text: &str) -> anyhow::Result<()> {
        writeln!(
            self.file,
            "[turn {turn}] {player} {direction} {}",
            text.replace('\n', " | ")
        )
        .context("could not write turn log")
    }

    fn finish(mut self) -> anyhow::Result<()> {
        self.file.flush().context("could not write turn log")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::agent::{AgentContext, AgentHandle, AgentKind, Bot, BotFactory};
    use crate::run_configuration::RunOptions;

    /// Each player adds a number to its score, for `3 * league` turns.
    struct SumGame {
        scores: [u32; 2],
        turn: u32,
        last_turn: u32,
    }

    struct SumFactory;

    impl GameFactory<SumGame> for SumFactory {
        fn new_game(&self, config: &RunConfiguration) -> SumGame {
            SumGame {
                scores: [0, 0],
                turn: 0,
                last_turn: 3 * u32::from(config.league_level().get()),
            }
        }
    }

    impl Game for SumGame {
        type Action = u32;

        fn initial_input(&self, player_number: usize) -> Option<String> {
            Some(format!("you are {player_number}"))
        }

        fn observation(&self, player_number: usize) -> String {
            format!("{} {}", self.turn, self.scores[player_number])
        }

        fn apply_actions(&mut self, actions: [u32; 2]) -> anyhow::Result<()> {
            if actions.iter().any(|&a| a > 100) {
                bail!("action out of bounds");
            }
            self.scores[0] += actions[0];
            self.scores[1] += actions[1];
            self.turn += 1;
            Ok(())
        }

        fn is_finished(&self) -> bool {
            self.turn >= self.last_turn
        }

        fn player_score(&self, player_number: usize) -> f32 {
            self.scores[player_number] as f32
        }
    }

    struct Constant(&'static str, Duration);

    impl Bot for Constant {
        fn play_turn(&mut self, _observation: &str) -> anyhow::Result<String> {
            thread::sleep(self.1);
            Ok(self.0.to_string())
        }
    }

    fn constant(name: &str, answer: &'static str, delay: Duration) -> AgentHandle {
        let factory: BotFactory =
            Arc::new(move |_: &AgentContext| Box::new(Constant(answer, delay)) as Box<dyn Bot>);
        AgentHandle::new(name, AgentKind::InProcess(factory))
    }

    fn play(
        engine: &mut TurnBasedEngine<SumGame, SumFactory>,
        a: AgentHandle,
        b: AgentHandle,
        options: RunOptions,
    ) -> (tempfile::TempDir, MatchSetup, anyhow::Result<MatchOutcome>) {
        let root = tempfile::tempdir().unwrap();
        let setup = MatchSetup {
            config: Arc::new(RunConfiguration::build(&options).unwrap()),
            workspace: Workspace::reset(root.path().join("ws")).unwrap(),
        };
        let players = [
            a.launch(0, &setup, false).unwrap(),
            b.launch(1, &setup, false).unwrap(),
        ];
        let outcome = engine.run_match(players, &setup);
        (root, setup, outcome)
    }

    #[test]
    fn higher_sum_wins() {
        let mut engine = TurnBasedEngine::new(SumFactory);
        let (_root, _setup, outcome) = play(
            &mut engine,
            constant("low", "1", Duration::ZERO),
            constant("high", "2", Duration::ZERO),
            RunOptions::new(),
        );
        let outcome = outcome.unwrap();
        assert_eq!(outcome.turns, 3);
        assert_eq!(outcome.scores, [3.0, 6.0]);
        assert_eq!(outcome.winner_name(), Some("high"));
        assert!(outcome.disqualifications.is_empty());
    }

    #[test]
    fn league_level_reaches_the_game() {
        let mut engine = TurnBasedEngine::new(SumFactory);
        let (_root, _setup, outcome) = play(
            &mut engine,
            constant("a", "1", Duration::ZERO),
            constant("b", "1", Duration::ZERO),
            RunOptions::new().with("leagueLevel", 2),
        );
        let outcome = outcome.unwrap();
        assert_eq!(outcome.turns, 6);
        assert!(outcome.is_draw());
    }

    #[test]
    fn unparsable_answer_disqualifies() {
        let mut engine = TurnBasedEngine::new(SumFactory);
        let (_root, _setup, outcome) = play(
            &mut engine,
            constant("good", "1", Duration::ZERO),
            constant("bad", "WAIT", Duration::ZERO),
            RunOptions::new(),
        );
        let outcome = outcome.unwrap();
        assert_eq!(outcome.turns, 1);
        assert_eq!(outcome.winner, Some(0));
        assert_eq!(outcome.scores[1], -1.0);
        assert_eq!(outcome.disqualifications[0].player_number, 1);
        assert!(outcome.disqualifications[0].reason.contains("WAIT"));
    }

    #[test]
    fn slow_bot_is_disqualified() {
        let mut engine =
            TurnBasedEngine::new(SumFactory).with_action_timeout(Duration::from_millis(10));
        let start = std::time::Instant::now();
        let (_root, _setup, outcome) = play(
            &mut engine,
            constant("slow", "1", Duration::from_secs(3)),
            constant("fast", "1", Duration::ZERO),
            RunOptions::new(),
        );
        assert!(start.elapsed() < Duration::from_secs(1));
        let outcome = outcome.unwrap();
        assert_eq!(outcome.winner_name(), Some("fast"));
        assert!(outcome.disqualifications[0].reason.contains("timeout"));
    }

    #[test]
    fn rule_failure_is_an_engine_error() {
        let mut engine = TurnBasedEngine::new(SumFactory);
        let (_root, _setup, outcome) = play(
            &mut engine,
            constant("a", "1", Duration::ZERO),
            constant("b", "1000", Duration::ZERO),
            RunOptions::new(),
        );
        assert!(outcome.is_err());
    }

    #[test]
    fn turn_limit_stops_the_game() {
        let mut engine = TurnBasedEngine::new(SumFactory).with_max_turns(2);
        let (_root, _setup, outcome) = play(
            &mut engine,
            constant("a", "1", Duration::ZERO),
            constant("b", "2", Duration::ZERO),
            RunOptions::new(),
        );
        let outcome = outcome.unwrap();
        assert_eq!(outcome.turns, 2);
        assert_eq!(outcome.winner, Some(1));
    }

    #[test]
    fn local_test_writes_turn_log() {
        let mut engine = TurnBasedEngine::new(SumFactory);
        let (_root, setup, outcome) = play(
            &mut engine,
            constant("a", "1", Duration::ZERO),
            constant("b", "2", Duration::ZERO),
            RunOptions::new().with("isLocalTest", true),
        );
        outcome.unwrap();
        let log = std::fs::read_to_string(setup.workspace.artifact_path("turns.log")).unwrap();
        assert!(log.contains("[turn 0] a < you are 0"));
        assert!(log.contains("[turn 3] b > 2"));
    }

    #[test]
    fn production_run_writes_nothing() {
        let mut engine = TurnBasedEngine::new(SumFactory);
        let (_root, setup, outcome) = play(
            &mut engine,
            constant("a", "1", Duration::ZERO),
            constant("b", "2", Duration::ZERO),
            RunOptions::new(),
        );
        outcome.unwrap();
        assert_eq!(
            std::fs::read_dir(setup.workspace.path()).unwrap().count(),
            0
        );
    }

    #[test]
    fn outcome_display() {
        let outcome = MatchOutcome::new(
            ["a".into(), "b".into()],
            [2.0, 1.0],
            3,
            vec![Disqualification {
                player_number: 1,
                reason: "timeout".into(),
            }],
        );
        assert_eq!(
            outcome.to_string(),
            "a 2 - -1 b, winner: a (3 turns); b disqualified: timeout"
        );
    }
}
