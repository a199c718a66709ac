//! Match orchestration.
//!
//! A [`MatchOrchestrator`] runs one [`Pairing`] at a time:
//!
//! 1. the workspace is reset,
//! 2. the [`RunConfiguration`] is built from the pairing options,
//! 3. agent A then agent B are resolved through the [`AgentRegistry`], then launched in the
//!    same order,
//! 4. the [`SimulationEngine`] plays the match,
//! 5. its outcome is returned.
//!
//! Any failure aborts the run with a classified [`HarnessError`]. The engine is never invoked
//! unless both agents are running.

use std::{fmt, sync::Arc};

use tracing::{error, info, instrument};

use crate::configuration::Configuration;
use crate::engine::{MatchSetup, SimulationEngine};
use crate::error::{HarnessError, Result};
use crate::registry::AgentRegistry;
use crate::run_configuration::{OptionValue, RunConfiguration, RunOptions};
use crate::workspace::Workspace;

/// Where a run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPhase {
    /// Nothing ran yet.
    #[default]
    Idle,
    /// The workspace exists and is empty.
    WorkspacePrepared,
    /// The run options are validated.
    ConfigurationBuilt,
    /// Both agents are launched.
    AgentsResolved,
    /// The engine is playing.
    Running,
    /// The engine returned an outcome.
    Completed,
    /// The run failed.
    Aborted,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which agents play and with which options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    /// Selector of player 0.
    pub agent_a: String,
    /// Selector of player 1.
    pub agent_b: String,
    /// Run options, validated when the match starts.
    pub options: RunOptions,
}

impl Pairing {
    /// `agent_a` against `agent_b`, default options.
    pub fn new(agent_a: impl Into<String>, agent_b: impl Into<String>) -> Self {
        Self {
            agent_a: agent_a.into(),
            agent_b: agent_b.into(),
            options: RunOptions::new(),
        }
    }

    /// `agent` against itself.
    pub fn self_play(agent: impl Into<String>) -> Self {
        let agent = agent.into();
        Self::new(agent.clone(), agent)
    }

    /// Replace all options.
    #[must_use]
    pub fn with_options(self, options: RunOptions) -> Self {
        Self { options, ..self }
    }

    /// Set one option.
    #[must_use]
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(name, value);
        self
    }
}

impl fmt::Display for Pairing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} VS {}]", self.agent_a, self.agent_b)
    }
}

/// Runs matches between registered agents on a [`SimulationEngine`].
pub struct MatchOrchestrator<E> {
    registry: AgentRegistry,
    engine: E,
    config: Configuration,
    phase: MatchPhase,
}

impl<E: SimulationEngine> MatchOrchestrator<E> {
    /// Create an orchestrator over `registry` and `engine`.
    pub fn new(registry: AgentRegistry, engine: E, config: Configuration) -> Self {
        Self {
            registry,
            engine,
            config,
            phase: MatchPhase::Idle,
        }
    }

    /// Last phase reached. [`MatchPhase::Completed`] or [`MatchPhase::Aborted`] after a run.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Harness configuration.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The agents that can be selected.
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Register more agents between runs.
    pub fn registry_mut(&mut self) -> &mut AgentRegistry {
        &mut self.registry
    }

    /// The engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The engine, mutably.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Shorthand for [`run_match`](Self::run_match).
    pub fn run(
        &mut self,
        agent_a: &str,
        agent_b: &str,
        options: RunOptions,
    ) -> Result<E::Outcome> {
        self.run_match(&Pairing::new(agent_a, agent_b).with_options(options))
    }

    /// Play one match and return the engine outcome.
    ///
    /// # Errors
    /// - [`HarnessError::Workspace`] if the workspace cannot be reset,
    /// - [`HarnessError::InvalidOption`] if the options are rejected,
    /// - [`HarnessError::UnknownAgent`] or [`HarnessError::AgentLaunch`] for agent A, then B,
    /// - [`HarnessError::Engine`] if the engine fails.
    #[instrument(skip_all, fields(pairing = %pairing))]
    pub fn run_match(&mut self, pairing: &Pairing) -> Result<E::Outcome> {
        self.phase = MatchPhase::Idle;
        if self.config.verbose {
            println!("\x1b[32mRunning...:\x1b[39m {pairing}");
        }

        let res = self.try_run(pairing);
        match &res {
            Ok(_) => self.enter(MatchPhase::Completed),
            Err(e) => {
                error!("match aborted in phase {}: {e}", self.phase);
                self.enter(MatchPhase::Aborted);
            }
        }
        res
    }

    fn try_run(&mut self, pairing: &Pairing) -> Result<E::Outcome> {
        let workspace = Workspace::reset(&self.config.workspace)?;
        self.enter(MatchPhase::WorkspacePrepared);

        let config = Arc::new(RunConfiguration::build(&pairing.options)?);
        info!(%config, "run configuration built");
        self.enter(MatchPhase::ConfigurationBuilt);

        let setup = MatchSetup { config, workspace };
        let handle_a = self.registry.resolve(&pairing.agent_a)?;
        let handle_b = self.registry.resolve(&pairing.agent_b)?;
        let forward_stderr = self.config.debug_agent_stderr();
        let player_a = handle_a.launch(0, &setup, forward_stderr)?;
        // dropping player A kills it if B cannot start
        let player_b = handle_b.launch(1, &setup, forward_stderr)?;
        self.enter(MatchPhase::AgentsResolved);

        self.enter(MatchPhase::Running);
        self.engine
            .run_match([player_a, player_b], &setup)
            .map_err(HarnessError::Engine)
    }

    fn enter(&mut self, phase: MatchPhase) {
        info!(from = %self.phase, to = %phase, "match phase");
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::bail;

    use super::*;
    use crate::agent::{AgentContext, Bot, Participant};
    use crate::run_configuration::LeagueLevel;

    struct Idle;

    impl Bot for Idle {
        fn play_turn(&mut self, _observation: &str) -> anyhow::Result<String> {
            Ok("PASS".into())
        }
    }

    /// What the engine saw on one call.
    #[derive(Debug)]
    struct Seen {
        players: [String; 2],
        config: RunConfiguration,
        workspace_entries: usize,
        workspace: PathBuf,
    }

    #[derive(Default)]
    struct RecordingEngine {
        calls: Vec<Seen>,
        fail: bool,
    }

    impl SimulationEngine for RecordingEngine {
        type Outcome = String;

        fn run_match(
            &mut self,
            players: [Participant; 2],
            setup: &MatchSetup,
        ) -> anyhow::Result<String> {
            let seen = Seen {
                players: players.each_ref().map(|p| p.name().to_string()),
                config: *setup.config,
                workspace_entries: std::fs::read_dir(setup.workspace.path())?.count(),
                workspace: setup.workspace.path().to_path_buf(),
            };
            let outcome = format!("{} beats {}", seen.players[0], seen.players[1]);
            self.calls.push(seen);
            if self.fail {
                bail!("board exploded");
            }
            Ok(outcome)
        }
    }

    fn orchestrator(root: &tempfile::TempDir) -> MatchOrchestrator<RecordingEngine> {
        let mut registry = AgentRegistry::new();
        registry
            .register_bot("A", |_: &AgentContext| Box::new(Idle) as Box<dyn Bot>)
            .register_bot("B", |_: &AgentContext| Box::new(Idle) as Box<dyn Bot>)
            .register_command("ghost", "surely-not-an-existing-program-4242");
        let config = Configuration::new()
            .with_verbose(false)
            .with_workspace(root.path().join("debug_img"));
        MatchOrchestrator::new(registry, RecordingEngine::default(), config)
    }

    #[test]
    fn self_play_with_default_options() {
        let root = tempfile::tempdir().unwrap();
        let workspace = root.path().join("debug_img");
        std::fs::create_dir_all(workspace.join("old/nested")).unwrap();
        std::fs::write(workspace.join("stale.png"), b"x").unwrap();

        let mut orchestrator = orchestrator(&root);
        assert_eq!(orchestrator.phase(), MatchPhase::Idle);
        let outcome = orchestrator.run_match(&Pairing::self_play("A")).unwrap();

        assert_eq!(outcome, "A beats A");
        assert_eq!(orchestrator.phase(), MatchPhase::Completed);
        let calls = &orchestrator.engine().calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].workspace_entries, 0);
        assert_eq!(calls[0].workspace, workspace);
        assert!(!calls[0].config.is_local_test());
        assert_eq!(calls[0].config.league_level(), LeagueLevel::default());
        assert!(workspace.is_dir());
    }

    #[test]
    fn options_reach_the_engine() {
        let root = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(&root);
        let pairing = Pairing::new("A", "B")
            .with_option("isLocalTest", true)
            .with_option("leagueLevel", 3);
        assert_eq!(pairing.to_string(), "[A VS B]");
        orchestrator.run_match(&pairing).unwrap();

        let seen = &orchestrator.engine().calls[0];
        assert_eq!(seen.players, ["A".to_string(), "B".to_string()]);
        assert!(seen.config.is_local_test());
        assert_eq!(seen.config.league_level().get(), 3);
    }

    #[test]
    fn unknown_agent_never_reaches_the_engine() {
        let root = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(&root);
        match orchestrator.run("A", "nobody", RunOptions::new()) {
            Err(HarnessError::UnknownAgent(name)) => assert_eq!(name, "nobody"),
            other => panic!("expected UnknownAgent, got {other:?}"),
        }
        assert_eq!(orchestrator.phase(), MatchPhase::Aborted);
        assert!(orchestrator.engine().calls.is_empty());
    }

    #[test]
    fn launch_failure_never_reaches_the_engine() {
        let root = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(&root);
        match orchestrator.run("ghost", "A", RunOptions::new()) {
            Err(HarnessError::AgentLaunch { name, .. }) => assert_eq!(name, "ghost"),
            other => panic!("expected AgentLaunch, got {other:?}"),
        }
        assert!(orchestrator.engine().calls.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn failed_launch_of_b_kills_a() {
        let root = tempfile::tempdir().unwrap();
        let pid_file = root.path().join("sleeper.pid");
        let mut orchestrator = orchestrator(&root);
        orchestrator.registry_mut().register_command(
            "sleeper",
            format!("sh -c 'echo $$ > {}; exec sleep 30'", pid_file.display()),
        );

        match orchestrator.run("sleeper", "ghost", RunOptions::new()) {
            Err(HarnessError::AgentLaunch { name, .. }) => assert_eq!(name, "ghost"),
            other => panic!("expected AgentLaunch, got {other:?}"),
        }
        assert!(orchestrator.engine().calls.is_empty());

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let alive = std::process::Command::new("kill")
            .args(["-0", pid.trim()])
            .stderr(std::process::Stdio::null())
            .status()
            .unwrap()
            .success();
        assert!(!alive, "sleeper {} survived the aborted run", pid.trim());
    }

    #[cfg(unix)]
    #[test]
    fn unknown_b_does_not_start_a() {
        let root = tempfile::tempdir().unwrap();
        let marker = root.path().join("started");
        let mut orchestrator = orchestrator(&root);
        orchestrator.registry_mut().register_command(
            "sleeper",
            format!("sh -c 'touch {}; exec sleep 30'", marker.display()),
        );

        let res = orchestrator.run("sleeper", "nobody", RunOptions::new());
        assert!(matches!(res, Err(HarnessError::UnknownAgent(_))));
        assert!(!marker.exists());
    }

    #[test]
    fn invalid_option_aborts_before_agents() {
        let root = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(&root);
        let res = orchestrator.run_match(&Pairing::new("A", "nobody").with_option("leage", 2));
        assert!(matches!(res, Err(HarnessError::InvalidOption { .. })));
        assert_eq!(orchestrator.phase(), MatchPhase::Aborted);
        assert!(orchestrator.engine().calls.is_empty());
    }

    #[test]
    fn engine_failure_is_classified() {
        let root = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(&root);
        orchestrator.engine_mut().fail = true;
        let err = orchestrator.run_match(&Pairing::self_play("B")).unwrap_err();
        assert!(matches!(err, HarnessError::Engine(_)));
        assert!(err.to_string().contains("board exploded"));
        assert_eq!(orchestrator.phase(), MatchPhase::Aborted);
    }

    #[test]
    fn workspace_error_aborts_first() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not_a_dir");
        std::fs::write(&file, b"x").unwrap();
        let mut orchestrator = MatchOrchestrator::new(
            AgentRegistry::new(),
            RecordingEngine::default(),
            Configuration::new().with_verbose(false).with_workspace(&file),
        );
        let res = orchestrator.run_match(&Pairing::self_play("A"));
        assert!(matches!(res, Err(HarnessError::Workspace { .. })));
        assert!(orchestrator.engine().calls.is_empty());
    }

    #[test]
    fn runs_do_not_leak_configuration() {
        let root = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(&root);
        orchestrator
            .run_match(&Pairing::self_play("A").with_option("isLocalTest", true))
            .unwrap();
        std::fs::write(root.path().join("debug_img/artifact.txt"), b"x").unwrap();
        orchestrator.run_match(&Pairing::self_play("A")).unwrap();

        let calls = &orchestrator.engine().calls;
        assert!(calls[0].config.is_local_test());
        assert!(!calls[1].config.is_local_test());
        assert_eq!(calls[1].workspace_entries, 0);
    }
}
