use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::colloquy::config::CallLimits;

/// A TurnOracle is the seam to whatever reasoning service produces the next
/// message for an agent. It provides a common interface for the engine to
/// request turns. It does not keep track of the conversation — agents own
/// their histories, and the engine passes the relevant slice into every call.

/// Represents the possible roles for a turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    // an incoming message addressed to an agent (opening tasks, tool results)
    User,
    // content generated by an agent in response to an incoming message
    Assistant,
}

/// What kind of turn this is. Tool calls and tool results are distinct from
/// plain content turns so downstream consumers (and the oracle itself, on the
/// next invocation) can tell them apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnKind {
    /// A plain content message.
    Text,
    /// An agent requested a tool invocation; content holds the arguments.
    ToolCall { tool_id: String },
    /// The outcome of a tool invocation; content holds the payload.
    ToolResult { tool_id: String, success: bool },
}

/// A single turn in a conversation transcript or an agent's history.
#[derive(Clone, Debug)]
pub struct Turn {
    /// UTC timestamp recorded when the turn was created.
    pub timestamp: DateTime<Utc>,
    /// Name of the agent that produced the turn.
    pub speaker: String,
    /// Conversation role of the turn content.
    pub role: Role,
    /// Text, tool call, or tool result.
    pub kind: TurnKind,
    /// The turn body. Stored as `Arc<str>` so cloning turns is cheap.
    pub content: Arc<str>,
}

impl Turn {
    /// Create a plain content turn.
    pub fn text(speaker: impl Into<String>, role: Role, content: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            speaker: speaker.into(),
            role,
            kind: TurnKind::Text,
            content: Arc::from(content),
        }
    }

    /// Create a tool-call request turn. The content is the serialized argument
    /// payload so transcripts stay auditable.
    pub fn tool_call(speaker: impl Into<String>, tool_id: &str, arguments: &serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            speaker: speaker.into(),
            role: Role::Assistant,
            kind: TurnKind::ToolCall {
                tool_id: tool_id.to_string(),
            },
            content: Arc::from(arguments.to_string().as_str()),
        }
    }

    /// Create a tool-result turn attributed to the executing agent.
    pub fn tool_result(
        executor: impl Into<String>,
        tool_id: &str,
        success: bool,
        payload: &serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            speaker: executor.into(),
            role: Role::User,
            kind: TurnKind::ToolResult {
                tool_id: tool_id.to_string(),
                success,
            },
            content: Arc::from(payload.to_string().as_str()),
        }
    }

    /// Whether this is a plain content turn.
    pub fn is_text(&self) -> bool {
        self.kind == TurnKind::Text
    }
}

/// What the oracle produced for a turn.
#[derive(Clone, Debug, PartialEq)]
pub enum OracleReply {
    /// The next message content. An empty string here is a caller-side
    /// contract violation — the engine rejects it rather than advancing.
    Content(String),
    /// The agent wants a tool invoked before it continues.
    ToolCall {
        tool_id: String,
        arguments: serde_json::Value,
    },
    /// The oracle has nothing further to add.
    Idle,
}

/// Errors surfaced by oracle calls.
#[derive(Debug, Clone)]
pub enum OracleError {
    /// The reasoning service could not be reached.
    Unavailable(String),
    /// The call exceeded the configured per-call timeout.
    Timeout(Duration),
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Unavailable(msg) => write!(f, "Oracle unavailable: {}", msg),
            OracleError::Timeout(d) => write!(f, "Oracle call timed out after {:?}", d),
        }
    }
}

impl Error for OracleError {}

/// Trait defining the interface to the external reasoning service.
///
/// The engine treats every call as blocking and potentially slow: each call is
/// wrapped in a timeout and retried with bounded backoff on transient failure
/// (see [`call_with_retry`]).
#[async_trait]
pub trait TurnOracle: Send + Sync {
    /// Produce the next turn for an agent.
    ///
    /// - `role_context`: the agent's resolved instruction text.
    /// - `history`: the agent's turn history so far.
    /// - `incoming`: the latest message addressed to the agent.
    async fn next_turn(
        &self,
        role_context: &str,
        history: &[Turn],
        incoming: &str,
    ) -> Result<OracleReply, OracleError>;

    /// Cheap reachability check used during the orchestrator's all-or-nothing
    /// setup phase. Oracles that cannot probe cheaply inherit the default Ok.
    async fn probe(&self) -> Result<(), OracleError> {
        Ok(())
    }
}

/// Invoke the oracle with a per-call timeout and bounded retry with backoff.
///
/// Each failed attempt doubles the backoff. After the attempt budget is
/// exhausted the last error is returned; the conversation layer maps that to
/// an `OracleIdle` termination with a degraded summary.
pub(crate) async fn call_with_retry(
    oracle: &Arc<dyn TurnOracle>,
    role_context: &str,
    history: &[Turn],
    incoming: &str,
    limits: &CallLimits,
) -> Result<OracleReply, OracleError> {
    let mut backoff = limits.retry_backoff;
    let mut attempt: u32 = 0;
    loop {
        let outcome =
            match tokio::time::timeout(limits.oracle_timeout, oracle.next_turn(role_context, history, incoming))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout(limits.oracle_timeout)),
            };

        match outcome {
            Ok(reply) => return Ok(reply),
            Err(err) => {
                attempt += 1;
                if attempt > limits.retry_attempts {
                    return Err(err);
                }
                log::warn!(
                    "oracle call failed (attempt {}/{}): {}; retrying in {:?}",
                    attempt,
                    limits.retry_attempts,
                    err,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }
}
