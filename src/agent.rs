//! Match participants.
//!
//! An agent is either an in-process [`Bot`] built by a registered factory, or an external
//! process started from a command line. Both are resolved into an [`AgentHandle`] and launched
//! into a [`Participant`], which is what the simulation engine talks to.

use std::{
    fmt,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context};
use tracing::{debug, instrument, trace, warn};

use crate::engine::MatchSetup;
use crate::error::{HarnessError, Result};
use crate::process::{sanitize_file_name, stderr_file, AgentProcess, StderrTarget};
use crate::run_configuration::RunConfiguration;
use crate::workspace::Workspace;

/// What an in-process agent implements: given the observed game state, produce a move.
///
/// Observations and moves use the same text lines an external agent would read and write.
pub trait Bot: Send {
    /// Called once before the first turn with the game initial input, if the game has one.
    fn init(&mut self, _initial_input: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Answer one turn. Multi-line moves are separated by `'\n'`.
    fn play_turn(&mut self, observation: &str) -> anyhow::Result<String>;
}

/// What a bot factory is given when a match starts.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// Player number of the bot in the match (0 or 1).
    pub player_number: usize,
    /// Options of the match.
    pub config: Arc<RunConfiguration>,
    /// Directory for debug artifacts.
    pub workspace: Workspace,
}

/// Builds a fresh bot for each match it takes part in.
pub type BotFactory = Arc<dyn Fn(&AgentContext) -> Box<dyn Bot> + Send + Sync>;

/// How an agent is launched.
#[derive(Clone)]
pub enum AgentKind {
    /// Runs inside the harness.
    InProcess(BotFactory),
    /// Runs as an OS process started from a command line.
    External(String),
}

impl fmt::Debug for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::InProcess(_) => f.write_str("InProcess"),
            AgentKind::External(command_line) => {
                f.debug_tuple("External").field(command_line).finish()
            }
        }
    }
}

/// One resolved participant of a match. Launching it starts the agent.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    name: String,
    kind: AgentKind,
}

impl AgentHandle {
    /// Handle on `name` launched as `kind`.
    pub fn new(name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Launch strategy.
    pub fn kind(&self) -> &AgentKind {
        &self.kind
    }

    /// `true` for external processes.
    pub fn is_external(&self) -> bool {
        matches!(self.kind, AgentKind::External(_))
    }

    /// The command line of an external agent, the registered name of an in-process one.
    pub fn reference(&self) -> &str {
        match &self.kind {
            AgentKind::InProcess(_) => &self.name,
            AgentKind::External(command_line) => command_line,
        }
    }

    /// Start the agent as player `player_number`.
    ///
    /// External agents get the match options in their environment and a stderr that is
    /// captured in the workspace on local tests, forwarded if `forward_stderr`, dropped otherwise.
    ///
    /// # Errors
    /// [`HarnessError::AgentLaunch`] if the command line is invalid or the process cannot be
    /// started.
    #[instrument(skip_all, fields(agent = %self.name, player_number = player_number))]
    pub fn launch(
        &self,
        player_number: usize,
        setup: &MatchSetup,
        forward_stderr: bool,
    ) -> Result<Participant> {
        let endpoint = match &self.kind {
            AgentKind::InProcess(factory) => {
                let context = AgentContext {
                    player_number,
                    config: setup.config.clone(),
                    workspace: setup.workspace.clone(),
                };
                let worker = BotWorker::start(factory(&context), &self.name, player_number)
                    .map_err(|source| HarnessError::AgentLaunch {
                        name: self.name.clone(),
                        source,
                    })?;
                Endpoint::Bot(worker)
            }
            AgentKind::External(command_line) => {
                let process = self
                    .spawn(command_line, player_number, setup, forward_stderr)
                    .map_err(|source| HarnessError::AgentLaunch {
                        name: self.name.clone(),
                        source,
                    })?;
                debug!(pid = process.id(), "agent process started");
                Endpoint::Process(process)
            }
        };

        Ok(Participant {
            name: self.name.clone(),
            player_number,
            endpoint,
        })
    }

    fn spawn(
        &self,
        command_line: &str,
        player_number: usize,
        setup: &MatchSetup,
        forward_stderr: bool,
    ) -> anyhow::Result<AgentProcess> {
        let stderr = if setup.config.is_local_test() {
            let file_name = format!(
                "player{player_number}_{}.stderr.txt",
                sanitize_file_name(&self.name)
            );
            stderr_file(&setup.workspace.artifact_path(&file_name))?
        } else if forward_stderr {
            StderrTarget::Inherit
        } else {
            StderrTarget::Null
        };

        let mut envs = setup.config.agent_env().to_vec();
        envs.push((
            "DUEL_WORKSPACE",
            setup.workspace.path().display().to_string(),
        ));

        AgentProcess::launch(command_line, &envs, stderr)
    }
}

enum Endpoint {
    Bot(BotWorker),
    Process(AgentProcess),
}

enum BotRequest {
    Init(String),
    Turn(String),
}

/// An in-process bot running on its own thread, so that its answers can be awaited with a
/// deadline like the ones of an external process.
struct BotWorker {
    requests: Option<Sender<BotRequest>>,
    answers: Receiver<anyhow::Result<String>>,
    thread: Option<JoinHandle<()>>,
    // a turn timed out and the bot may still be computing it
    stuck: bool,
}

impl BotWorker {
    fn start(mut bot: Box<dyn Bot>, name: &str, player_number: usize) -> anyhow::Result<BotWorker> {
        let (request_tx, request_rx) = mpsc::channel::<BotRequest>();
        let (answer_tx, answer_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(format!("bot-{name}-{player_number}"))
            .spawn(move || {
                let mut init_error = None;
                for request in request_rx {
                    match request {
                        BotRequest::Init(input) => init_error = bot.init(&input).err(),
                        BotRequest::Turn(observation) => {
                            let answer = match init_error.take() {
                                Some(e) => Err(e.context("bot initialization failed")),
                                None => bot.play_turn(&observation),
                            };
                            if answer_tx.send(answer).is_err() {
                                break;
                            }
                        }
                    }
                }
                trace!(player_number, "bot stopped");
            })
            .context("could not spawn bot thread")?;

        Ok(BotWorker {
            requests: Some(request_tx),
            answers: answer_rx,
            thread: Some(thread),
            stuck: false,
        })
    }

    fn request(&self, request: BotRequest) -> anyhow::Result<()> {
        if self.stuck {
            bail!("bot is still busy with a previous turn");
        }
        self.requests
            .as_ref()
            .context("bot is stopped")?
            .send(request)
            .map_err(|_| anyhow!("bot stopped unexpectedly"))
    }

    fn play_turn(&mut self, observation: &str, timeout: Duration) -> anyhow::Result<String> {
        self.request(BotRequest::Turn(observation.to_string()))?;
        match self.answers.recv_timeout(timeout) {
            Ok(answer) => answer.context("bot error"),
            Err(RecvTimeoutError::Timeout) => {
                self.stuck = true;
                Err(anyhow!("timeout: no answer in {timeout:?}"))
            }
            Err(RecvTimeoutError::Disconnected) => bail!("bot stopped unexpectedly"),
        }
    }

    fn shutdown(mut self) -> anyhow::Result<()> {
        drop(self.requests.take());
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        if self.stuck {
            // cannot interrupt a bot, its thread ends whenever the turn does
            warn!("leaving a stuck bot behind");
            return Ok(());
        }
        thread
            .join()
            .map_err(|_| anyhow!("bot panicked"))
    }
}

/// A launched agent.
pub struct Participant {
    name: String,
    player_number: usize,
    endpoint: Endpoint,
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.endpoint {
            Endpoint::Bot(_) => "bot",
            Endpoint::Process(_) => "process",
        };
        f.debug_struct("Participant")
            .field("name", &self.name)
            .field("player_number", &self.player_number)
            .field("kind", &kind)
            .finish()
    }
}

impl Participant {
    /// Registered name of the agent.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Player number in the match.
    pub fn player_number(&self) -> usize {
        self.player_number
    }

    /// Hand the game initial input to the agent.
    ///
    /// Bots process it on their own thread. A failure is reported by their first turn.
    pub fn send_initial_input(&mut self, input: &str) -> anyhow::Result<()> {
        match &mut self.endpoint {
            Endpoint::Bot(worker) => worker.request(BotRequest::Init(input.to_string())),
            Endpoint::Process(process) => process.send(input),
        }
    }

    /// Send `observation` and collect exactly `expected_lines` lines of answer within `timeout`.
    pub fn exchange(
        &mut self,
        observation: &str,
        expected_lines: usize,
        timeout: Duration,
    ) -> anyhow::Result<Vec<String>> {
        match &mut self.endpoint {
            Endpoint::Bot(worker) => {
                let output = worker.play_turn(observation, timeout)?;
                let lines = output.lines().map(str::to_owned).collect::<Vec<_>>();
                if lines.len() != expected_lines {
                    bail!(
                        "expected {expected_lines} line(s) of output, got {}",
                        lines.len()
                    );
                }
                Ok(lines)
            }
            Endpoint::Process(process) => {
                process.send(observation)?;
                let deadline = Instant::now() + timeout;
                (0..expected_lines)
                    .map(|_| process.recv_line(deadline))
                    .collect()
            }
        }
    }

    /// Stop the agent. External processes are given a short delay to exit before being killed.
    pub fn shutdown(self) -> anyhow::Result<()> {
        match self.endpoint {
            Endpoint::Bot(worker) => worker.shutdown(),
            Endpoint::Process(process) => process.shutdown(),
        }
    }
}
