//! `duel-harness`: run one rock-paper-scissors match between two agents.
//!
//! Agents are the built-in bots (`rock`, `cycle`, `counter`, `random`) or external programs
//! registered with `--agent NAME=COMMAND`. The process exit code tells which phase failed.

use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Context;
use clap::Parser;
use duel_harness::{
    error::exit_codes, games::rock_paper_scissors::RockPaperScissors, logger::init_logger,
    prelude::*,
};
use tracing::debug;

/// Run one match between two agents and print its outcome.
#[derive(Parser, Debug)]
#[command(name = "duel-harness")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Agent playing first (player 0).
    #[arg(required_unless_present = "list_agents")]
    agent_a: Option<String>,

    /// Agent playing second (player 1). May be the same as AGENT_A.
    #[arg(required_unless_present = "list_agents")]
    agent_b: Option<String>,

    /// Run option, e.g. `leagueLevel=2` or `isLocalTest=true`. Overrides DUEL_* variables.
    #[arg(short = 'o', long = "option", value_name = "NAME=VALUE")]
    options: Vec<String>,

    /// Register an external agent started with COMMAND.
    #[arg(short = 'a', long = "agent", value_name = "NAME=COMMAND", value_parser = parse_agent)]
    agents: Vec<(String, String)>,

    /// Debug artifacts directory, emptied before the match.
    #[arg(short = 'w', long)]
    workspace: Option<PathBuf>,

    /// Write every log event to a timestamped file in the current directory.
    #[arg(long)]
    log: bool,

    /// Do not print match progress.
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Forward the stderr of external agents (ignored on local tests, where it is saved in the workspace).
    #[arg(long)]
    debug_agent_stderr: bool,

    /// Time given to an agent to answer one turn.
    #[arg(long, value_name = "MS")]
    action_timeout_ms: Option<u64>,

    /// Stop the game after N turns.
    #[arg(long, value_name = "N")]
    max_turns: Option<u32>,

    /// Print the registered agents and exit.
    #[arg(long)]
    list_agents: bool,
}

fn parse_agent(assignment: &str) -> Result<(String, String), String> {
    let (name, command) = assignment
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=COMMAND, got '{assignment}'"))?;
    let (name, command) = (name.trim(), command.trim());
    if name.is_empty() || command.is_empty() {
        return Err(format!("expected NAME=COMMAND, got '{assignment}'"));
    }
    Ok((name.to_string(), command.to_string()))
}

impl Cli {
    fn configuration(&self) -> Configuration {
        let mut config = Configuration::from_env();
        if self.quiet {
            config = config.with_verbose(false);
        }
        if self.log {
            config = config.with_log(true);
        }
        if self.debug_agent_stderr {
            config = config.with_debug_agent_stderr(true);
        }
        if let Some(workspace) = &self.workspace {
            config = config.with_workspace(workspace);
        }
        config
    }

    fn registry(&self) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        register_builtin_bots(&mut registry);
        for (name, command) in &self.agents {
            registry.register_command(name, command);
        }
        registry
    }

    fn pairing(&self) -> anyhow::Result<Pairing> {
        let mut assigned = RunOptions::new();
        for assignment in &self.options {
            assigned.insert_assignment(assignment)?;
        }
        let options = RunOptions::from_env().merged_with(&assigned);
        let agent_a = self.agent_a.clone().context("missing AGENT_A")?;
        let agent_b = self.agent_b.clone().context("missing AGENT_B")?;
        Ok(Pairing::new(agent_a, agent_b).with_options(options))
    }

    fn engine(&self) -> TurnBasedEngine<RockPaperScissors, RpsFactory> {
        let mut engine = TurnBasedEngine::<RockPaperScissors, _>::new(RpsFactory);
        if let Some(ms) = self.action_timeout_ms {
            engine = engine.with_action_timeout(Duration::from_millis(ms));
        }
        if let Some(max_turns) = self.max_turns {
            engine = engine.with_max_turns(max_turns);
        }
        engine
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.configuration();
    let registry = cli.registry();

    if cli.list_agents {
        for (name, kind) in registry.iter() {
            println!("{name}\t{kind:?}");
        }
        return Ok(());
    }

    init_logger(&config)?;
    debug!(?cli, ?config);

    let pairing = cli.pairing()?;
    let verbose = config.verbose();
    let mut orchestrator = MatchOrchestrator::new(registry, cli.engine(), config);
    let outcome = orchestrator.run_match(&pairing)?;

    if verbose {
        // green match, default outcome
        println!("\x1b[32m{pairing}: \x1b[39m{outcome}");
    }
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<HarnessError>()
        .map_or(exit_codes::FAILURE, HarnessError::exit_code)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err(err) => {
            // red error, default
            eprintln!("\x1b[31mError:\x1b[39m {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
