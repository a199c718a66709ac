//! Error classification for a single match run.
//!
//! Every failure aborts the current run. The variant tells which phase failed:
//! workspace preparation, configuration, agent resolution/launch or the engine itself.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of one match run.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The workspace directory could not be cleared or created.
    #[error("workspace error at '{}': {source}", path.display())]
    Workspace {
        /// Workspace directory being reset.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// A run option is not recognized, or its value is not acceptable.
    #[error("invalid option '{name}': {reason}")]
    InvalidOption {
        /// Option name as supplied by the caller.
        name: String,
        /// Why the option was rejected.
        reason: String,
    },

    /// The selector is not registered.
    #[error("unknown agent '{0}'")]
    UnknownAgent(String),

    /// The agent could not be started.
    #[error("could not launch agent '{name}': {source:#}")]
    AgentLaunch {
        /// Registered name of the agent.
        name: String,
        /// Launch failure.
        #[source]
        source: anyhow::Error,
    },

    /// The simulation engine failed or could not complete the match.
    #[error("engine error: {0:#}")]
    Engine(#[source] anyhow::Error),
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Process exit codes of the `duel-harness` binary.
pub mod exit_codes {
    /// The match completed.
    pub const SUCCESS: u8 = 0;
    /// Any failure outside of a match run, such as the logger setup.
    pub const FAILURE: u8 = 1;
    /// Bad flags, unknown agent or invalid option.
    pub const USER_ERROR: u8 = 2;
    /// An external agent could not be started.
    pub const AGENT_LAUNCH_FAILURE: u8 = 3;
    /// The workspace could not be reset.
    pub const WORKSPACE_FAILURE: u8 = 4;
    /// The engine failed.
    pub const ENGINE_FAILURE: u8 = 5;
}

impl HarnessError {
    /// Exit code of the binary when a run fails with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::InvalidOption { .. } | HarnessError::UnknownAgent(_) => {
                exit_codes::USER_ERROR
            }
            HarnessError::AgentLaunch { .. } => exit_codes::AGENT_LAUNCH_FAILURE,
            HarnessError::Workspace { .. } => exit_codes::WORKSPACE_FAILURE,
            HarnessError::Engine(_) => exit_codes::ENGINE_FAILURE,
        }
    }

    pub(crate) fn invalid_option(name: impl Into<String>, reason: impl Into<String>) -> Self {
        HarnessError::InvalidOption {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_option_names_the_option() {
        let err = HarnessError::invalid_option("leagueLvl", "unrecognized option");
        assert_eq!(
            err.to_string(),
            "invalid option 'leagueLvl': unrecognized option"
        );
    }

    #[test]
    fn agent_launch_includes_cause_chain() {
        let cause = anyhow::anyhow!("No such file or directory").context("command 'nope' not found");
        let err = HarnessError::AgentLaunch {
            name: "ext".to_string(),
            source: cause,
        };
        let msg = err.to_string();
        assert!(msg.starts_with("could not launch agent 'ext'"));
        assert!(msg.contains("No such file or directory"));
    }

    #[test]
    fn exit_codes_tell_phases_apart() {
        let errors = [
            HarnessError::UnknownAgent("x".into()),
            HarnessError::AgentLaunch {
                name: "x".into(),
                source: anyhow::anyhow!("boom"),
            },
            HarnessError::Workspace {
                path: PathBuf::from("w"),
                source: std::io::Error::other("boom"),
            },
            HarnessError::Engine(anyhow::anyhow!("boom")),
        ];
        let codes = errors.iter().map(HarnessError::exit_code).collect::<Vec<_>>();
        assert_eq!(codes, vec![2, 3, 4, 5]);
        assert_eq!(
            HarnessError::invalid_option("a", "b").exit_code(),
            exit_codes::USER_ERROR
        );
    }

    #[test]
    fn workspace_error_mentions_path() {
        let err = HarnessError::Workspace {
            path: PathBuf::from("debug_img"),
            source: std::io::Error::other("permission denied"),
        };
        assert!(err.to_string().contains("debug_img"));
    }
}
