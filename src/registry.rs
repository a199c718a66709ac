//! Symbolic agent names.
//!
//! The [`AgentRegistry`] maps a name to either an in-process bot factory or an external command
//! line. Resolving a name gives an independent [`AgentHandle`] every time, so the same name can
//! be used for both players of a match.

use std::{collections::BTreeMap, sync::Arc};

use tracing::{trace, warn};

use crate::agent::{AgentContext, AgentHandle, AgentKind, Bot};
use crate::error::{HarnessError, Result};

/// Registered agents, by name.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentKind>,
}

impl AgentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process bot. `factory` builds a new bot for every match.
    ///
    /// A previous agent with the same name is replaced.
    pub fn register_bot<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&AgentContext) -> Box<dyn Bot> + Send + Sync + 'static,
    {
        self.insert(name.into(), AgentKind::InProcess(Arc::new(factory)))
    }

    /// Register an external agent started with `command_line`.
    ///
    /// The command line is only checked when the agent is launched.
    /// A previous agent with the same name is replaced.
    pub fn register_command(
        &mut self,
        name: impl Into<String>,
        command_line: impl Into<String>,
    ) -> &mut Self {
        self.insert(name.into(), AgentKind::External(command_line.into()))
    }

    fn insert(&mut self, name: String, kind: AgentKind) -> &mut Self {
        trace!(%name, ?kind, "agent registered");
        if self.agents.insert(name.clone(), kind).is_some() {
            warn!("agent '{name}' registered twice, keeping the last one");
        }
        self
    }

    /// Resolve `selector` into a fresh handle.
    ///
    /// # Errors
    /// [`HarnessError::UnknownAgent`] if nothing is registered under `selector`.
    pub fn resolve(&self, selector: &str) -> Result<AgentHandle> {
        self.agents
            .get(selector)
            .map(|kind| AgentHandle::new(selector, kind.clone()))
            .ok_or_else(|| HarnessError::UnknownAgent(selector.to_string()))
    }

    /// `true` if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    /// Registered agents, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AgentKind)> {
        self.agents.iter().map(|(name, kind)| (name.as_str(), kind))
    }
}
