//! External agent processes.
//!
//! An [`AgentProcess`] is a child process talking over its standard input/output, one line per
//! message. Lines written by the child are read on a dedicated thread so that reads can be
//! bounded by a deadline.
//!
//! Child process is killed on drop.

use std::{
    io::{BufRead, BufReader, Write},
    path::Path,
    process::{Child, ChildStdin, Command, Stdio},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context};
use tracing::{trace, warn};

/// Where the stderr of a child process goes.
#[derive(Debug)]
pub enum StderrTarget {
    /// Discarded.
    Null,
    /// Shared with the harness.
    Inherit,
    /// Written to a file.
    File(std::fs::File),
}

impl From<StderrTarget> for Stdio {
    fn from(target: StderrTarget) -> Self {
        match target {
            StderrTarget::Null => Stdio::null(),
            StderrTarget::Inherit => Stdio::inherit(),
            StderrTarget::File(file) => Stdio::from(file),
        }
    }
}

/// Split a command line with shell quoting rules. The first word is the program.
pub fn split_command_line(command_line: &str) -> anyhow::Result<(String, Vec<String>)> {
    let mut words = shell_words::split(command_line)
        .with_context(|| format!("invalid command line '{command_line}'"))?
        .into_iter();
    let program = words.next().context("empty command line")?;
    Ok((program, words.collect()))
}

fn create_process(
    command: &str,
    args: &[String],
    envs: &[(&str, String)],
    stderr: StderrTarget,
) -> anyhow::Result<Child> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .envs(envs.iter().map(|(key, value)| (*key, value)))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(stderr);
    cmd.spawn()
        .with_context(|| format!("command '{command}' could not be started"))
}

/// A running external agent.
#[derive(Debug)]
pub struct AgentProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<std::io::Result<String>>,
    cleaned_up: bool,
}

impl AgentProcess {
    const CLEANUP_DURATION: Duration = Duration::from_secs(1);

    /// Start `command_line` with the given extra environment.
    pub fn launch(
        command_line: &str,
        envs: &[(&str, String)],
        stderr: StderrTarget,
    ) -> anyhow::Result<AgentProcess> {
        let (program, args) = split_command_line(command_line)?;
        let mut child = create_process(&program, &args, envs, stderr)?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (tx, rx) = mpsc::channel();
        let process = AgentProcess {
            child,
            stdin,
            lines: rx,
            cleaned_up: false,
        };

        // from here on, dropping `process` kills the child
        let stdout = stdout.context("child stdout is not piped")?;
        let pid = process.id();
        thread::Builder::new()
            .name(format!("agent-{pid}-stdout"))
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let failed = line.is_err();
                    if tx.send(line).is_err() || failed {
                        break;
                    }
                }
                trace!(pid, "agent output closed");
            })
            .context("could not spawn agent reader thread")?;

        Ok(process)
    }

    /// OS process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Write `msg` followed by a newline.
    pub fn send(&mut self, msg: &str) -> anyhow::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .context("agent input is already closed")?;
        writeln!(stdin, "{msg}")
            .and_then(|()| stdin.flush())
            .context("I/O error while sending msg")
    }

    /// Read one line, waiting until `deadline` at most.
    pub fn recv_line(&mut self, deadline: Instant) -> anyhow::Result<String> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.lines.recv_timeout(remaining) {
            Ok(Ok(line)) => Ok(line),
            Ok(Err(e)) => Err(e).context("error while reading agent output"),
            Err(RecvTimeoutError::Timeout) => Err(anyhow!("timeout: no answer in time")),
            Err(RecvTimeoutError::Disconnected) => bail!("connection closed by agent"),
        }
    }

    /// Close the agent input, give it `max_duration` to exit, then kill it.
    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
        drop(self.stdin.take());

        let deadline = Instant::now() + max_duration;
        loop {
            if self
                .child
                .try_wait()
                .context("could not poll process")?
                .is_some()
            {
                break;
            }
            if Instant::now() >= deadline {
                self.child.kill().context("could not kill process")?;
                self.child.wait().context("could not reap process")?;
                break;
            }
            thread::sleep(Duration::from_millis(10).min(max_duration / 10));
        }
        self.cleaned_up = true;
        Ok(())
    }

    /// Stop the agent.
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        self.try_kill(Self::CLEANUP_DURATION)
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(Self::CLEANUP_DURATION) {
                warn!(pid = self.child.id(), "could not kill agent process on drop: {e:#}");
            }
        }
    }
}

/// File name friendly version of an agent name.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Open `path` for the stderr of an agent.
pub(crate) fn stderr_file(path: &Path) -> anyhow::Result<StderrTarget> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("could not create '{}'", path.display()))?;
    Ok(StderrTarget::File(file))
}
