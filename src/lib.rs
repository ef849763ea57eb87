//! # Colloquy
//!
//! Colloquy is a multi-agent conversation orchestration engine. Given a roster of
//! named agents — each with a role context, an optional tool capability set, and a
//! shared reasoning oracle behind them — it drives the agents through bounded,
//! ordered exchanges until a termination condition is met, routes every tool call
//! from the agent that requested it to the agent registered to execute it, and
//! reduces each finished conversation into a compact summary for the next stage of
//! a pipeline.
//!
//! The crate provides carefully layered abstractions for:
//!
//! * **Turn Oracle**: the [`TurnOracle`] trait is the seam to whatever reasoning
//!   service produces the next message for an agent. The engine treats it as an
//!   opaque, potentially slow call with per-call timeout and bounded retry.
//! * **Agents**: [`Agent`] is a data-carrying participant — a name, an immutable
//!   role context produced by `{topic}` substitution, a capability set, and an
//!   append-only turn history. Behavior lives in the oracle, not in a type
//!   hierarchy.
//! * **Conversations**: [`Conversation`] is a `Pending → Running → Terminated`
//!   state machine that alternates oracle turns, runs the tool-call sub-protocol
//!   when requested, and stops on max-turns, a termination predicate, or an idle
//!   oracle.
//! * **Tool Routing**: [`ToolRegistry`] binds each tool id to an authorized
//!   caller and a fixed executor, so an agent that decides to act never performs
//!   the side effect itself.
//! * **Summaries**: [`Summarizer`] strategies ([`ReflectiveSummarizer`],
//!   [`VerbatimSummarizer`]) reduce a transcript to a [`Summary`] handed to the
//!   next conversation or to the external caller.
//! * **Orchestration**: [`Orchestrator`] owns the roster for one run and
//!   sequences conversations in either sequential hand-off or shared group mode,
//!   selected via [`SequencingMode`].
//! * **Trigger Dispatch**: the [`trigger`] module accepts external topic events,
//!   filters them by channel, and launches runs fire-and-forget with cancellation
//!   support. An optional `webhook-server` feature exposes the same surface over
//!   HTTP via axum.
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use colloquy::{Orchestrator, RunConfig, ToolRegistry, TurnOracle};
//!
//! # async fn example(oracle: Arc<dyn TurnOracle>) -> Result<(), Box<dyn std::error::Error>> {
//! colloquy::init_logger();
//!
//! let config = RunConfig::research_pipeline();
//! let registry = ToolRegistry::new();
//!
//! let orchestrator = Orchestrator::new(config, oracle)?.with_registry(registry);
//! let result = orchestrator.run("quantum error correction").await?;
//!
//! for conversation in &result.conversations {
//!     println!("[{:?}] {}", conversation.reason, conversation.summary.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Continue exploring the modules re-exported from the crate root for the full
//! conversation, registry, and trigger surfaces.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// The helper is intentionally lightweight so that applications embedding
/// Colloquy can opt in to simple `RUST_LOG` driven diagnostics without having to
/// choose a specific logging backend upfront.
///
/// ```rust
/// colloquy::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `colloquy` module.
pub mod colloquy;

// Re-exporting key items for easier external access.
pub use crate::colloquy::agent::Agent;
pub use crate::colloquy::config;
pub use crate::colloquy::config::{
    CallLimits, ConversationPlan, RoleSpec, RunConfig, SequencingMode, SummaryMode, TaskSpec,
};
pub use crate::colloquy::conversation;
pub use crate::colloquy::conversation::{
    Conversation, ConversationError, ConversationState, TerminationPredicate, TerminationReason,
};
pub use crate::colloquy::oracle;
pub use crate::colloquy::oracle::{OracleError, OracleReply, Role, Turn, TurnKind, TurnOracle};
pub use crate::colloquy::orchestrator;
pub use crate::colloquy::orchestrator::{
    ConversationSummary, Orchestrator, OrchestratorError, RunResult,
};
pub use crate::colloquy::registry;
pub use crate::colloquy::registry::{
    ToolHandler, ToolInvocation, ToolOutcome, ToolRegistry, ToolRoutingError,
};
pub use crate::colloquy::summarizer;
pub use crate::colloquy::summarizer::{
    ReflectiveSummarizer, Summarizer, SummarizerError, Summary, VerbatimSummarizer,
};
pub use crate::colloquy::trigger;
pub use crate::colloquy::trigger::{CancelToken, DispatchAck, Dispatcher, TriggerEvent};
