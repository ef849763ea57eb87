//! Conversation state machine.
//!
//! A [`Conversation`] is one bounded exchange between two or more agents: a
//! transcript, a turn counter, and a three-state lifecycle
//! (`Pending -> Running -> Terminated`). Termination is monotonic; a
//! terminated conversation never produces further turns.
//!
//! The turn loop asks the [`TurnOracle`](crate::TurnOracle) for each active
//! agent's next move. Content turns advance the round-robin and count against
//! the turn bound; tool exchanges resolve inline without consuming a turn, so
//! an agent that needs three tool calls to answer still costs one turn.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::colloquy::agent::Agent;
use crate::colloquy::config::CallLimits;
use crate::colloquy::oracle::{call_with_retry, OracleReply, Role, Turn, TurnOracle};
use crate::colloquy::registry::{ToolRegistry, ToolRoutingError};
use crate::colloquy::trigger::CancelToken;

/// Default content marker that ends a conversation.
pub const DEFAULT_TERMINATION_MARKER: &str = "TERMINATE";

/// Why a conversation terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The turn bound was reached before any other condition fired.
    MaxTurnsReached,
    /// A content turn matched the termination predicate.
    PredicateMatched,
    /// The oracle signalled it had nothing further, or stopped answering.
    OracleIdle,
}

/// Lifecycle of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// Constructed but not yet run.
    Pending,
    /// The turn loop is in progress.
    Running,
    /// Finished; the reason is final.
    Terminated(TerminationReason),
}

/// Decides whether a content turn ends the conversation.
///
/// The default checks whether the message, after trimming trailing
/// whitespace, ends with [`DEFAULT_TERMINATION_MARKER`]. Suffix matching is
/// deliberate: an agent that merely mentions the marker mid-sentence keeps
/// talking.
pub struct TerminationPredicate(Box<dyn Fn(&str) -> bool + Send + Sync>);

impl TerminationPredicate {
    /// Match messages whose trimmed content ends with `marker`.
    pub fn suffix_marker(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        Self(Box::new(move |content| {
            content.trim_end().ends_with(marker.as_str())
        }))
    }

    /// Arbitrary predicate over message content.
    pub fn custom(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Evaluate the predicate against a content turn.
    pub fn matches(&self, content: &str) -> bool {
        (self.0)(content)
    }
}

impl Default for TerminationPredicate {
    fn default() -> Self {
        Self::suffix_marker(DEFAULT_TERMINATION_MARKER)
    }
}

impl fmt::Debug for TerminationPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TerminationPredicate(..)")
    }
}

/// Errors that abort a conversation rather than terminating it normally.
#[derive(Debug)]
pub enum ConversationError {
    /// The conversation was constructed or invoked with invalid parameters.
    InvalidConfiguration(String),
    /// An agent produced an empty message, which violates the turn contract.
    EmptyMessage { speaker: String },
    /// Tool routing failed in a way that is not recoverable within the
    /// conversation (unknown tool, unauthorized caller).
    ToolRouting(ToolRoutingError),
    /// The run was cancelled externally mid-conversation.
    Cancelled,
}

impl fmt::Display for ConversationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationError::InvalidConfiguration(msg) => {
                write!(f, "Invalid conversation configuration: {}", msg)
            }
            ConversationError::EmptyMessage { speaker } => {
                write!(f, "Agent '{}' produced an empty message", speaker)
            }
            ConversationError::ToolRouting(err) => write!(f, "Tool routing failed: {}", err),
            ConversationError::Cancelled => write!(f, "Conversation cancelled"),
        }
    }
}

impl Error for ConversationError {}

impl From<ToolRoutingError> for ConversationError {
    fn from(err: ToolRoutingError) -> Self {
        ConversationError::ToolRouting(err)
    }
}

/// One bounded exchange between named participants.
pub struct Conversation {
    participants: Vec<String>,
    max_turns: usize,
    turn_count: usize,
    state: ConversationState,
    transcript: Vec<Turn>,
    predicate: TerminationPredicate,
    degraded: bool,
}

impl Conversation {
    /// Create a pending conversation. Requires at least two participants and
    /// a turn bound of at least one.
    pub fn new(
        participants: Vec<String>,
        max_turns: usize,
    ) -> Result<Self, ConversationError> {
        if participants.len() < 2 {
            return Err(ConversationError::InvalidConfiguration(format!(
                "a conversation needs at least two participants, got {}",
                participants.len()
            )));
        }
        if max_turns == 0 {
            return Err(ConversationError::InvalidConfiguration(
                "max_turns must be at least 1".into(),
            ));
        }
        Ok(Self {
            participants,
            max_turns,
            turn_count: 0,
            state: ConversationState::Pending,
            transcript: Vec::new(),
            predicate: TerminationPredicate::default(),
            degraded: false,
        })
    }

    /// Replace the default termination predicate.
    pub fn with_predicate(mut self, predicate: TerminationPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// The ordered transcript of every turn so far.
    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Content turns completed so far. Tool exchanges do not count.
    pub fn turn_count(&self) -> usize {
        self.turn_count
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    /// Whether the conversation ended abnormally (oracle stopped answering)
    /// and its transcript should be summarized in degraded form.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    fn terminate(&mut self, reason: TerminationReason) -> TerminationReason {
        self.state = ConversationState::Terminated(reason);
        reason
    }

    fn agent_mut<'a>(
        agents: &'a mut HashMap<String, Agent>,
        name: &str,
    ) -> Result<&'a mut Agent, ConversationError> {
        agents.get_mut(name).ok_or_else(|| {
            ConversationError::InvalidConfiguration(format!(
                "participant '{}' has no corresponding agent",
                name
            ))
        })
    }

    /// Execute the turn loop until a termination condition fires.
    ///
    /// The first participant speaks `opening` as the initial incoming
    /// message; turn-taking then round-robins through the participant list.
    /// The bound is a scheduling guard: no turn is requested once
    /// `turn_count` has reached `max_turns`, while the predicate and idle
    /// checks run after each completed turn, so a final message carrying the
    /// termination marker wins over the bound.
    pub async fn run(
        &mut self,
        agents: &mut HashMap<String, Agent>,
        oracle: &Arc<dyn TurnOracle>,
        registry: &ToolRegistry,
        opening: &str,
        limits: &CallLimits,
        cancel: &CancelToken,
    ) -> Result<TerminationReason, ConversationError> {
        if self.state != ConversationState::Pending {
            return Err(ConversationError::InvalidConfiguration(format!(
                "conversation already started (state {:?})",
                self.state
            )));
        }
        for name in &self.participants {
            if !agents.contains_key(name) {
                return Err(ConversationError::InvalidConfiguration(format!(
                    "participant '{}' has no corresponding agent",
                    name
                )));
            }
        }
        if opening.is_empty() {
            return Err(ConversationError::EmptyMessage {
                speaker: self.participants[0].clone(),
            });
        }
        self.state = ConversationState::Running;

        let initiator = self.participants[0].clone();
        let opening_turn = Turn::text(initiator.as_str(), Role::User, opening);
        self.transcript.push(opening_turn.clone());
        for name in &self.participants {
            Self::agent_mut(agents, name)?.record(opening_turn.clone());
        }

        let mut latest = opening.to_string();
        let mut active_idx = 1 % self.participants.len();

        loop {
            if self.turn_count >= self.max_turns {
                log::debug!(
                    "conversation reached the turn bound of {} turns",
                    self.max_turns
                );
                return Ok(self.terminate(TerminationReason::MaxTurnsReached));
            }
            if cancel.is_cancelled() {
                log::info!("conversation cancelled after {} turns", self.turn_count);
                return Err(ConversationError::Cancelled);
            }

            let speaker = self.participants[active_idx].clone();
            let reply = {
                let agent = Self::agent_mut(agents, &speaker)?;
                call_with_retry(oracle, agent.role_context(), agent.history(), &latest, limits)
                    .await
            };

            let reply = match reply {
                Ok(reply) => reply,
                Err(err) => {
                    log::warn!(
                        "oracle gave up for agent '{}' after retries: {}; terminating",
                        speaker,
                        err
                    );
                    self.degraded = true;
                    return Ok(self.terminate(TerminationReason::OracleIdle));
                }
            };

            match reply {
                OracleReply::Idle => {
                    log::debug!("oracle signalled idle for agent '{}'", speaker);
                    return Ok(self.terminate(TerminationReason::OracleIdle));
                }
                OracleReply::ToolCall { tool_id, arguments } => {
                    // Authorization is checked before the transcript is
                    // touched; a rejected call leaves no trace.
                    let invocation = registry.prepare(&tool_id, &speaker, arguments.clone())?;
                    let executor = invocation.executor.clone();

                    let call_turn = Turn::tool_call(speaker.as_str(), &tool_id, &arguments);
                    self.transcript.push(call_turn.clone());
                    Self::agent_mut(agents, &speaker)?.record(call_turn);

                    let (success, payload) =
                        match registry.invoke(&invocation, limits.tool_timeout).await {
                            Ok(outcome) => (outcome.success, outcome.output),
                            Err(ToolRoutingError::Execution(msg)) => {
                                log::warn!("tool '{}' failed: {}", tool_id, msg);
                                (false, serde_json::json!({ "error": msg }))
                            }
                            Err(ToolRoutingError::Timeout(d)) => {
                                log::warn!("tool '{}' timed out after {:?}", tool_id, d);
                                (
                                    false,
                                    serde_json::json!({
                                        "error": format!("timed out after {:?}", d)
                                    }),
                                )
                            }
                            Err(other) => return Err(other.into()),
                        };

                    let result_turn =
                        Turn::tool_result(executor.as_str(), &tool_id, success, &payload);
                    self.transcript.push(result_turn.clone());
                    Self::agent_mut(agents, &speaker)?.record(result_turn.clone());
                    if executor != speaker {
                        Self::agent_mut(agents, &executor)?.record(result_turn);
                    }

                    // The same agent speaks next, with the result in hand.
                    // Tool exchanges do not consume a turn.
                    latest = format!("Tool '{}' result: {}", tool_id, payload);
                }
                OracleReply::Content(text) => {
                    if text.is_empty() {
                        return Err(ConversationError::EmptyMessage { speaker });
                    }
                    let recipient_idx = (active_idx + 1) % self.participants.len();
                    let recipient = self.participants[recipient_idx].clone();

                    let turn = Turn::text(speaker.as_str(), Role::Assistant, &text);
                    self.transcript.push(turn.clone());
                    Self::agent_mut(agents, &speaker)?.record(turn.clone());
                    if recipient != speaker {
                        Self::agent_mut(agents, &recipient)?.record(turn);
                    }
                    self.turn_count += 1;

                    if self.predicate.matches(&text) {
                        log::debug!(
                            "agent '{}' matched the termination predicate at turn {}",
                            speaker,
                            self.turn_count
                        );
                        return Ok(self.terminate(TerminationReason::PredicateMatched));
                    }

                    latest = text;
                    active_idx = recipient_idx;
                }
            }
        }
    }
}
