//! Config for the harness behaviors
//!
//! This module provides configuration options for controlling how the harness itself behaves,
//! independently of the options of a given match (see [`run_configuration`](crate::run_configuration)).
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional, and flags are case-insensitive. Set a flag to `"true"` to enable it.
//!
//! - `DUEL_VERBOSE`: Print match progress to stdout (default: `true`)
//! - `DUEL_LOG`: Enable logging to a file (default: `false`)
//! - `DUEL_DEBUG_AGENT_STDERR`: Forward external agents stderr (default: `false`)
//! - `DUEL_WORKSPACE`: Debug artifacts directory (default: `./debug_img`)

use std::path::{Path, PathBuf};

use crate::workspace::DEFAULT_WORKSPACE;

/// Configuration for harness behaviors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) debug_agent_stderr: bool,
    pub(crate) workspace: PathBuf,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The harness will print match progress to stdout.
    /// - Logging to file is disabled.
    /// - External agents stderr is discarded (unless the match is a local test).
    /// - Debug artifacts are written to `./debug_img`.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            debug_agent_stderr: false,
            workspace: PathBuf::from(DEFAULT_WORKSPACE),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// The following environment variables are recognized:
    /// - `DUEL_VERBOSE`: if set to `"true"`, enables verbose output (default: `true`)
    /// - `DUEL_LOG`: if set to `"true"`, enables logging to file (default: `false`)
    /// - `DUEL_DEBUG_AGENT_STDERR`: if set to `"true"`, forwards agent stderr (default: `false`)
    /// - `DUEL_WORKSPACE`: path of the workspace directory (default: `./debug_img`)
    ///
    /// Any other value (including unset) will result in using the default value for each flag.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        let workspace = std::env::var_os("DUEL_WORKSPACE")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE));

        Self {
            verbose: get_env_flag("DUEL_VERBOSE", true),
            log: get_env_flag("DUEL_LOG", false),
            debug_agent_stderr: get_env_flag("DUEL_DEBUG_AGENT_STDERR", false),
            workspace,
        }
    }

    /// Enable or disable verbose mode.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable agent stderr output (debug purposes only).
    ///
    /// Local test runs always capture stderr into the workspace instead.
    pub fn with_debug_agent_stderr(mut self, value: bool) -> Self {
        self.debug_agent_stderr = value;
        self
    }

    /// Directory receiving the debug artifacts of a run. Cleared at the start of every run.
    pub fn with_workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace = path.into();
        self
    }

    /// Workspace directory path.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Whether progress is printed to stdout.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Whether events are logged to a file.
    pub fn log(&self) -> bool {
        self.log
    }

    /// Whether the stderr of external agents is forwarded outside of local tests.
    pub fn debug_agent_stderr(&self) -> bool {
        self.debug_agent_stderr
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
