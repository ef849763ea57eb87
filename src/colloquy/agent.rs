//! Agent model
//!
//! An [`Agent`] is a named participant in a conversation: an immutable role
//! context (produced by `{topic}` substitution at run setup), an optional set
//! of tool capabilities, and an append-only turn history.
//!
//! Agents deliberately carry no behavior of their own — the next message for
//! an agent always comes from the [`TurnOracle`](crate::TurnOracle), and tool
//! side effects always go through the [`ToolRegistry`](crate::ToolRegistry).
//! The caller/executor distinction is a capability flag on this struct rather
//! than a type hierarchy.
//!
//! # Lifecycle
//!
//! Agents are created once per topic run by the orchestrator and dropped when
//! the run completes. They are owned exclusively by that run; no cross-run
//! sharing. History is append-only within a conversation — clearing is only
//! legal at conversation boundaries, which the orchestrator enforces by being
//! the sole caller of [`Agent::clear_history`].

use std::collections::HashSet;

use crate::colloquy::oracle::Turn;

/// A named conversation participant with a role context, capability set, and
/// turn history.
pub struct Agent {
    /// Unique identifier within a run's roster.
    pub name: String,
    /// Resolved instruction text; immutable after creation.
    role_context: String,
    /// Tool ids this agent may request. Empty for pure responder or executor
    /// roles.
    capabilities: HashSet<String>,
    /// Ordered turns this agent has seen or produced.
    history: Vec<Turn>,
}

impl Agent {
    /// Create an agent with its resolved role context.
    pub fn new(name: impl Into<String>, role_context: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role_context: role_context.into(),
            capabilities: HashSet::new(),
            history: Vec::new(),
        }
    }

    /// The agent's resolved instruction text.
    pub fn role_context(&self) -> &str {
        &self.role_context
    }

    /// Grant permission to request a tool. Called during run setup when a
    /// registry binding names this agent as the caller.
    pub fn grant_capability(&mut self, tool_id: impl Into<String>) {
        self.capabilities.insert(tool_id.into());
    }

    /// Whether the agent may request the given tool.
    pub fn has_capability(&self, tool_id: &str) -> bool {
        self.capabilities.contains(tool_id)
    }

    /// The full capability set.
    pub fn capabilities(&self) -> &HashSet<String> {
        &self.capabilities
    }

    /// Append a turn to the agent's history.
    pub fn record(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// The agent's history so far.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Reset the history. Only legal at conversation boundaries; the
    /// orchestrator calls this when a sequential leg sets `clear_history`.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
