//! Options of a single match.
//!
//! A [`RunConfiguration`] is built once per run from a set of named [`RunOptions`], before any
//! agent is launched. Two options are recognized:
//!
//! - `leagueLevel`: difficulty / rule-set tier, an integer from 1 (lowest, default) to 255
//! - `isLocalTest`: `true` for local debug runs that emit debug artifacts (default: `false`)
//!
//! Any other name is rejected with [`HarnessError::InvalidOption`].
//!
//! Once built, the configuration is shared as `Arc<RunConfiguration>` and only exposes getters.
//! External agents see it through their environment (see [`RunConfiguration::agent_env`]).
//!
//! # Example
//!
//! ```
//! use duel_harness::run_configuration::{RunConfiguration, RunOptions};
//!
//! let options = RunOptions::new()
//!     .with("isLocalTest", true)
//!     .with("leagueLevel", 3);
//! let config = RunConfiguration::build(&options).unwrap();
//! assert_eq!(config.league_level().get(), 3);
//! assert!(config.is_local_test());
//! ```

use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::error::{HarnessError, Result};

/// Name of the league level option.
pub const LEAGUE_LEVEL: &str = "leagueLevel";
/// Name of the local test option.
pub const IS_LOCAL_TEST: &str = "isLocalTest";

/// Environment variable holding the league level of external agents.
pub const LEAGUE_LEVEL_ENV: &str = "LEAGUE_LEVEL";
/// Environment variable holding the local test flag of external agents.
pub const IS_LOCAL_TEST_ENV: &str = "IS_LOCAL_TEST";

/// Ordinal tier selecting the difficulty / rule-set of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeagueLevel(u8);

impl LeagueLevel {
    /// The lowest tier, used when no level is given.
    pub const LOWEST: LeagueLevel = LeagueLevel(1);

    /// Returns `None` for 0, which is not a tier.
    pub fn new(level: u8) -> Option<LeagueLevel> {
        (level >= Self::LOWEST.0).then_some(LeagueLevel(level))
    }

    /// Numeric value of the tier.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for LeagueLevel {
    fn default() -> Self {
        Self::LOWEST
    }
}

impl fmt::Display for LeagueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw value of a run option, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// A flag.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// Anything else.
    Text(String),
}

impl OptionValue {
    fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "boolean",
            OptionValue::Int(_) => "integer",
            OptionValue::Text(_) => "text",
        }
    }

    /// Type a textual value: `true`/`false` (any case) are flags, integers are integers.
    pub fn from_text(s: &str) -> OptionValue {
        let s = s.trim();
        if s.eq_ignore_ascii_case("true") {
            OptionValue::Bool(true)
        } else if s.eq_ignore_ascii_case("false") {
            OptionValue::Bool(false)
        } else if let Ok(n) = s.parse::<i64>() {
            OptionValue::Int(n)
        } else {
            OptionValue::Text(s.to_string())
        }
    }
}

impl FromStr for OptionValue {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(OptionValue::from_text(s))
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Int(n) => write!(f, "{n}"),
            OptionValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(value.into())
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

/// Named options requested for a run. Nothing is validated until [`RunConfiguration::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions(BTreeMap<String, OptionValue>);

impl RunOptions {
    /// No option: every recognized option takes its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read options from environment variables.
    ///
    /// - `DUEL_LEAGUE_LEVEL` sets `leagueLevel`
    /// - `DUEL_IS_LOCAL_TEST` sets `isLocalTest`
    ///
    /// Unset or empty variables are ignored. Values are typed as in [`OptionValue::from_text`].
    pub fn from_env() -> Self {
        let mut options = Self::new();
        for (var, name) in [
            ("DUEL_LEAGUE_LEVEL", LEAGUE_LEVEL),
            ("DUEL_IS_LOCAL_TEST", IS_LOCAL_TEST),
        ] {
            if let Ok(raw) = std::env::var(var) {
                if !raw.trim().is_empty() {
                    options.insert(name, OptionValue::from_text(&raw));
                }
            }
        }
        options
    }

    /// Set an option, replacing a previous value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set an option, replacing a previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Parse a `NAME=VALUE` assignment and set it.
    pub fn insert_assignment(&mut self, assignment: &str) -> Result<()> {
        let Some((name, value)) = assignment.split_once('=') else {
            return Err(HarnessError::invalid_option(
                assignment,
                "expected NAME=VALUE",
            ));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(HarnessError::invalid_option(assignment, "empty option name"));
        }
        self.insert(name, OptionValue::from_text(value));
        Ok(())
    }

    /// Options from `other` override the ones of `self`.
    #[must_use]
    pub fn merged_with(mut self, other: &RunOptions) -> Self {
        for (name, value) in other.iter() {
            self.insert(name, value.clone());
        }
        self
    }

    /// Iterate over the options, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// `true` if no option is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for RunOptions {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut options = RunOptions::new();
        for (name, value) in iter {
            options.insert(name, value);
        }
        options
    }
}

impl fmt::Display for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{{{s}}}")
    }
}

/// Validated, read-only options of one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunConfiguration {
    league_level: LeagueLevel,
    is_local_test: bool,
}

impl RunConfiguration {
    /// Validate `options` and build the configuration.
    ///
    /// Options that are not given take their default (lowest league, not a local test).
    ///
    /// # Errors
    /// [`HarnessError::InvalidOption`] if a name is not recognized, or if a value has the wrong
    /// type or is out of range. No configuration is produced in that case.
    pub fn build(options: &RunOptions) -> Result<RunConfiguration> {
        let mut config = RunConfiguration::default();
        for (name, value) in options.iter() {
            match name {
                LEAGUE_LEVEL => config.league_level = parse_league_level(value)?,
                IS_LOCAL_TEST => config.is_local_test = parse_flag(name, value)?,
                _ => {
                    return Err(HarnessError::invalid_option(
                        name,
                        format!("unrecognized option (expected '{LEAGUE_LEVEL}' or '{IS_LOCAL_TEST}')"),
                    ))
                }
            }
        }
        Ok(config)
    }

    /// Difficulty / rule-set tier of the match.
    pub fn league_level(&self) -> LeagueLevel {
        self.league_level
    }

    /// `true` for local debug runs, which may write debug artifacts.
    pub fn is_local_test(&self) -> bool {
        self.is_local_test
    }

    /// Environment variables handed to external agents.
    pub fn agent_env(&self) -> [(&'static str, String); 2] {
        [
            (LEAGUE_LEVEL_ENV, self.league_level.to_string()),
            (IS_LOCAL_TEST_ENV, self.is_local_test.to_string()),
        ]
    }
}

impl fmt::Display for RunConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{LEAGUE_LEVEL}={}, {IS_LOCAL_TEST}={}",
            self.league_level, self.is_local_test
        )
    }
}

/// Same as [`RunConfiguration::build`].
pub fn build_configuration(options: &RunOptions) -> Result<RunConfiguration> {
    RunConfiguration::build(options)
}

fn parse_league_level(value: &OptionValue) -> Result<LeagueLevel> {
    let OptionValue::Int(n) = value else {
        return Err(HarnessError::invalid_option(
            LEAGUE_LEVEL,
            format!("expected an integer, got {} {value}", value.type_name()),
        ));
    };
    u8::try_from(*n)
        .ok()
        .and_then(LeagueLevel::new)
        .ok_or_else(|| {
            HarnessError::invalid_option(LEAGUE_LEVEL, format!("{n} is not between 1 and 255"))
        })
}

fn parse_flag(name: &str, value: &OptionValue) -> Result<bool> {
    match value {
        OptionValue::Bool(b) => Ok(*b),
        other => Err(HarnessError::invalid_option(
            name,
            format!("expected a boolean, got {} {other}", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_options_use_defaults() {
        let config = RunConfiguration::build(&RunOptions::new()).unwrap();
        assert_eq!(config.league_level(), LeagueLevel::LOWEST);
        assert_eq!(config.league_level().get(), 1);
        assert!(!config.is_local_test());
    }

    #[test]
    fn explicit_values_are_kept() {
        let options = RunOptions::new()
            .with(IS_LOCAL_TEST, true)
            .with(LEAGUE_LEVEL, 3);
        let config = build_configuration(&options).unwrap();
        assert_eq!(config.league_level().get(), 3);
        assert!(config.is_local_test());
    }

    #[test]
    fn only_given_options_are_overridden() {
        let config = RunConfiguration::build(&RunOptions::new().with(IS_LOCAL_TEST, true)).unwrap();
        assert_eq!(config.league_level(), LeagueLevel::LOWEST);
        assert!(config.is_local_test());
    }

    #[test]
    fn unknown_option_is_rejected() {
        let options = RunOptions::new().with("leaguelevel", 2);
        match RunConfiguration::build(&options) {
            Err(HarnessError::InvalidOption { name, .. }) => assert_eq!(name, "leaguelevel"),
            other => panic!("expected InvalidOption, got {other:?}"),
        }
    }

    #[test]
    fn wrong_types_are_rejected() {
        let bad_level = RunOptions::new().with(LEAGUE_LEVEL, true);
        assert!(matches!(
            RunConfiguration::build(&bad_level),
            Err(HarnessError::InvalidOption { .. })
        ));

        let bad_flag = RunOptions::new().with(IS_LOCAL_TEST, "yes");
        assert!(matches!(
            RunConfiguration::build(&bad_flag),
            Err(HarnessError::InvalidOption { .. })
        ));
    }

    #[test]
    fn league_level_range() {
        for level in [0, -1, 256] {
            let options = RunOptions::new().with(LEAGUE_LEVEL, level);
            assert!(
                RunConfiguration::build(&options).is_err(),
                "level {level} should be rejected"
            );
        }
        let options = RunOptions::new().with(LEAGUE_LEVEL, 255);
        assert_eq!(RunConfiguration::build(&options).unwrap().league_level().get(), 255);
    }

    #[test]
    fn assignments_are_typed() {
        let mut options = RunOptions::new();
        options.insert_assignment("leagueLevel=2").unwrap();
        options.insert_assignment("isLocalTest=TRUE").unwrap();
        let config = RunConfiguration::build(&options).unwrap();
        assert_eq!(config.league_level().get(), 2);
        assert!(config.is_local_test());

        assert!(options.insert_assignment("isLocalTest").is_err());
        assert!(options.insert_assignment("=3").is_err());
    }

    #[test]
    fn later_options_override_earlier_ones() {
        let base = RunOptions::new().with(LEAGUE_LEVEL, 2).with(IS_LOCAL_TEST, true);
        let merged = base.merged_with(&RunOptions::new().with(LEAGUE_LEVEL, 4));
        let config = RunConfiguration::build(&merged).unwrap();
        assert_eq!(config.league_level().get(), 4);
        assert!(config.is_local_test());
    }

    #[test]
    fn agent_env_exports_both_values() {
        let config = RunConfiguration::build(&RunOptions::new().with(LEAGUE_LEVEL, 2)).unwrap();
        assert_eq!(
            config.agent_env(),
            [
                (LEAGUE_LEVEL_ENV, "2".to_string()),
                (IS_LOCAL_TEST_ENV, "false".to_string())
            ]
        );
    }
}
