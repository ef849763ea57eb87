//! Tool Registry & Routing
//!
//! The registry binds each tool id to the agent authorized to request it (the
//! caller) and the agent that performs the side effect (the executor). The
//! separation exists so that an agent whose role is "decide what to do" never
//! directly performs side-effecting actions — every invocation is mediated
//! here, keeping authorization and observability in one place.
//!
//! # Architecture
//!
//! ```text
//! Conversation → ToolRegistry → ToolHandler (trait) → [note store | messenger | user-defined]
//! ```
//!
//! The handler map is read-only after setup and may be shared read-only across
//! concurrent runs (`Arc<ToolRegistry>`); nothing in the invoke path mutates
//! registry state.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Trait for implementing the action behind a tool id.
///
/// Handlers receive the opaque argument payload the oracle produced and return
/// an opaque result payload. Application failures should be returned as `Err`;
/// the engine records them into the transcript as a failed `tool_result` turn
/// so the calling agent can adapt.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(
        &self,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>>;
}

/// The result of a mediated tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Whether the handler completed successfully.
    pub success: bool,
    /// The output payload from the handler.
    pub output: serde_json::Value,
    /// Optional error message if execution failed.
    pub error: Option<String>,
}

impl ToolOutcome {
    /// Convenience constructor for successful execution.
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    /// Convenience constructor for failed execution.
    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error),
        }
    }
}

/// A fully resolved request to run a tool on behalf of a caller.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool_id: String,
    /// The agent that requested the tool.
    pub caller: String,
    /// The agent registered to perform the action. Fixed per registration,
    /// never the caller.
    pub executor: String,
    /// Opaque argument payload forwarded to the handler.
    pub arguments: serde_json::Value,
}

/// Error types for registration and routing.
#[derive(Debug, Clone)]
pub enum ToolRoutingError {
    /// Requested tool id is not registered.
    UnknownTool(String),
    /// The tool id is already bound to a different executor.
    CapabilityConflict {
        tool_id: String,
        existing_executor: String,
        attempted_executor: String,
    },
    /// The requesting agent lacks the capability for this tool.
    UnauthorizedCaller { tool_id: String, caller: String },
    /// The executor's handler failed; wraps the underlying error.
    Execution(String),
    /// The handler exceeded the configured per-call timeout.
    Timeout(Duration),
}

impl fmt::Display for ToolRoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolRoutingError::UnknownTool(id) => write!(f, "Tool not found: {}", id),
            ToolRoutingError::CapabilityConflict {
                tool_id,
                existing_executor,
                attempted_executor,
            } => write!(
                f,
                "Tool '{}' is already bound to executor '{}' (attempted '{}')",
                tool_id, existing_executor, attempted_executor
            ),
            ToolRoutingError::UnauthorizedCaller { tool_id, caller } => {
                write!(f, "Agent '{}' is not authorized to call tool '{}'", caller, tool_id)
            }
            ToolRoutingError::Execution(msg) => write!(f, "Tool execution failed: {}", msg),
            ToolRoutingError::Timeout(d) => write!(f, "Tool call timed out after {:?}", d),
        }
    }
}

impl Error for ToolRoutingError {}

/// A registered tool: its fixed executor, the callers allowed to request it,
/// and the handler that performs the action.
struct ToolBinding {
    executor: String,
    callers: HashSet<String>,
    handler: Arc<dyn ToolHandler>,
}

/// Registry binding tool ids to authorized callers and fixed executors.
#[derive(Default)]
pub struct ToolRegistry {
    bindings: HashMap<String, ToolBinding>,
}

impl ToolRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Register a tool with an authorized caller and a fixed executor.
    ///
    /// Re-registering the same tool id with the same executor is idempotent —
    /// the additional caller is granted the capability and no error is raised.
    /// Registering it with a *different* executor fails with
    /// [`ToolRoutingError::CapabilityConflict`].
    pub fn register(
        &mut self,
        tool_id: impl Into<String>,
        caller: impl Into<String>,
        executor: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ToolRoutingError> {
        let tool_id = tool_id.into();
        let caller = caller.into();
        let executor = executor.into();

        match self.bindings.get_mut(&tool_id) {
            Some(binding) if binding.executor != executor => Err(ToolRoutingError::CapabilityConflict {
                tool_id,
                existing_executor: binding.executor.clone(),
                attempted_executor: executor,
            }),
            Some(binding) => {
                binding.callers.insert(caller);
                Ok(())
            }
            None => {
                let mut callers = HashSet::new();
                callers.insert(caller);
                self.bindings.insert(
                    tool_id,
                    ToolBinding {
                        executor,
                        callers,
                        handler,
                    },
                );
                Ok(())
            }
        }
    }

    /// The executor bound to a tool id, if registered.
    pub fn executor_of(&self, tool_id: &str) -> Option<&str> {
        self.bindings.get(tool_id).map(|b| b.executor.as_str())
    }

    /// Whether the given agent may request the given tool.
    pub fn is_authorized(&self, tool_id: &str, caller: &str) -> bool {
        self.bindings
            .get(tool_id)
            .map(|b| b.callers.contains(caller))
            .unwrap_or(false)
    }

    /// Every (caller, tool id) capability grant in the registry. Used at run
    /// setup to populate agent capability sets.
    pub fn grants(&self) -> Vec<(String, String)> {
        let mut grants = Vec::new();
        for (tool_id, binding) in &self.bindings {
            for caller in &binding.callers {
                grants.push((caller.clone(), tool_id.clone()));
            }
        }
        grants
    }

    /// Agent names referenced by any binding (callers and executors). Setup
    /// validation checks these against the roster.
    pub fn referenced_agents(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        for binding in self.bindings.values() {
            names.insert(binding.executor.clone());
            names.extend(binding.callers.iter().cloned());
        }
        names
    }

    /// Resolve a tool request into a routable invocation, checking that the
    /// caller holds the capability. Fails before any transcript mutation so an
    /// unauthorized request leaves no trace.
    pub fn prepare(
        &self,
        tool_id: &str,
        caller: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolInvocation, ToolRoutingError> {
        let binding = self
            .bindings
            .get(tool_id)
            .ok_or_else(|| ToolRoutingError::UnknownTool(tool_id.to_string()))?;

        if !binding.callers.contains(caller) {
            return Err(ToolRoutingError::UnauthorizedCaller {
                tool_id: tool_id.to_string(),
                caller: caller.to_string(),
            });
        }

        Ok(ToolInvocation {
            tool_id: tool_id.to_string(),
            caller: caller.to_string(),
            executor: binding.executor.clone(),
            arguments,
        })
    }

    /// Execute a prepared invocation through the bound handler.
    ///
    /// Authorization is re-checked so the method upholds its contract even for
    /// hand-built invocations. Handler failures come back as
    /// [`ToolRoutingError::Execution`]; slow handlers as
    /// [`ToolRoutingError::Timeout`].
    pub async fn invoke(
        &self,
        invocation: &ToolInvocation,
        timeout: Duration,
    ) -> Result<ToolOutcome, ToolRoutingError> {
        let binding = self
            .bindings
            .get(&invocation.tool_id)
            .ok_or_else(|| ToolRoutingError::UnknownTool(invocation.tool_id.clone()))?;

        if !binding.callers.contains(&invocation.caller) {
            return Err(ToolRoutingError::UnauthorizedCaller {
                tool_id: invocation.tool_id.clone(),
                caller: invocation.caller.clone(),
            });
        }

        let call = binding.handler.invoke(invocation.arguments.clone());
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(output)) => Ok(ToolOutcome::success(output)),
            Ok(Err(err)) => Err(ToolRoutingError::Execution(err.to_string())),
            Err(_) => Err(ToolRoutingError::Timeout(timeout)),
        }
    }
}
