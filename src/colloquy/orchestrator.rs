//! Run-level coordination of agents, conversations, and tools.
//!
//! The [`Orchestrator`] owns one validated [`RunConfig`] plus a shared oracle
//! and tool registry, and executes topic runs against them. Setup is
//! all-or-nothing: the configuration is validated, the oracle is probed, and
//! every agent is built and granted its capabilities before the first
//! conversation starts. A failure at any of those steps aborts the run with
//! no partial roster left behind.
//!
//! In sequential mode each leg's summary is woven into the opening message of
//! the next leg. In group mode every role shares one conversation and turns
//! round-robin in registration order.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::colloquy::agent::Agent;
use crate::colloquy::config::{
    substitute_topic, RunConfig, SequencingMode, SummaryMode,
};
use crate::colloquy::conversation::{Conversation, ConversationError, TerminationReason};
use crate::colloquy::oracle::{OracleError, TurnOracle};
use crate::colloquy::registry::ToolRegistry;
use crate::colloquy::summarizer::{
    ReflectiveSummarizer, Summarizer, SummarizerError, Summary, VerbatimSummarizer,
};
use crate::colloquy::trigger::CancelToken;

/// Errors that abort a run.
#[derive(Debug)]
pub enum OrchestratorError {
    /// The configuration failed validation, or referenced agents that do not
    /// exist in the roster.
    Configuration(String),
    /// The oracle probe failed during setup.
    OracleUnavailable(OracleError),
    /// A conversation aborted with a non-recoverable error.
    Conversation(ConversationError),
    /// A transcript could not be summarized.
    Summarization(SummarizerError),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::Configuration(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            OrchestratorError::OracleUnavailable(err) => {
                write!(f, "Oracle unreachable during setup: {}", err)
            }
            OrchestratorError::Conversation(err) => write!(f, "Conversation failed: {}", err),
            OrchestratorError::Summarization(err) => write!(f, "Summarization failed: {}", err),
        }
    }
}

impl Error for OrchestratorError {}

impl From<ConversationError> for OrchestratorError {
    fn from(err: ConversationError) -> Self {
        OrchestratorError::Conversation(err)
    }
}

impl From<SummarizerError> for OrchestratorError {
    fn from(err: SummarizerError) -> Self {
        OrchestratorError::Summarization(err)
    }
}

/// The reduced record of one finished conversation within a run.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    /// Task name for sequential legs, manager name for group runs.
    pub label: String,
    pub reason: TerminationReason,
    pub turn_count: usize,
    pub summary: Summary,
}

/// The outcome of one topic run.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: Uuid,
    pub topic: String,
    /// One entry per finished conversation, in execution order.
    pub conversations: Vec<ConversationSummary>,
    /// Set when the run was cancelled before all conversations finished;
    /// `conversations` then holds only the legs that completed.
    pub cancelled: bool,
}

impl RunResult {
    /// The summary of the final finished conversation, if any.
    pub fn final_summary(&self) -> Option<&Summary> {
        self.conversations.last().map(|c| &c.summary)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

/// Coordinates agents, conversations, and tool routing for topic runs.
pub struct Orchestrator {
    config: RunConfig,
    oracle: Arc<dyn TurnOracle>,
    registry: ToolRegistry,
}

impl Orchestrator {
    /// Create an orchestrator over a validated configuration.
    pub fn new(
        config: RunConfig,
        oracle: Arc<dyn TurnOracle>,
    ) -> Result<Self, OrchestratorError> {
        config
            .validate()
            .map_err(OrchestratorError::Configuration)?;
        Ok(Self {
            config,
            oracle,
            registry: ToolRegistry::default(),
        })
    }

    /// Attach a pre-built tool registry. Bindings that name roles missing
    /// from the roster are caught at run setup, not here.
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute a run for `topic` with a fresh cancel token and run id.
    pub async fn run(&self, topic: &str) -> Result<RunResult, OrchestratorError> {
        self.run_tagged(Uuid::new_v4(), topic, &CancelToken::new())
            .await
    }

    /// Execute a run that can be cancelled externally.
    pub async fn run_with_cancel(
        &self,
        topic: &str,
        cancel: &CancelToken,
    ) -> Result<RunResult, OrchestratorError> {
        self.run_tagged(Uuid::new_v4(), topic, cancel).await
    }

    /// Execute a run under a caller-chosen id, so dispatchers can hand the id
    /// out before the run finishes.
    pub async fn run_tagged(
        &self,
        run_id: Uuid,
        topic: &str,
        cancel: &CancelToken,
    ) -> Result<RunResult, OrchestratorError> {
        log::info!("starting run {} for topic '{}'", run_id, topic);

        self.oracle
            .probe()
            .await
            .map_err(OrchestratorError::OracleUnavailable)?;

        let mut agents = self.build_roster(topic)?;

        let mut result = RunResult {
            run_id,
            topic: topic.to_string(),
            conversations: Vec::new(),
            cancelled: false,
        };

        match &self.config.sequencing {
            SequencingMode::Sequential { legs } => {
                let mut carried: Option<Summary> = None;
                for leg in legs {
                    if cancel.is_cancelled() {
                        log::info!("run {} cancelled before leg '{}'", run_id, leg.task);
                        result.cancelled = true;
                        return Ok(result);
                    }
                    if leg.clear_history {
                        for name in [&leg.initiator, &leg.recipient] {
                            if let Some(agent) = agents.get_mut(name.as_str()) {
                                agent.clear_history();
                            }
                        }
                    }

                    let task = self.config.task(&leg.task).ok_or_else(|| {
                        OrchestratorError::Configuration(format!(
                            "leg references unknown task '{}'",
                            leg.task
                        ))
                    })?;
                    let mut opening = substitute_topic(&task.description, topic);
                    if let Some(prior) = &carried {
                        opening.push_str("\n\nContext from the previous conversation:\n");
                        opening.push_str(&prior.text);
                    }

                    let mut conversation = Conversation::new(
                        vec![leg.initiator.clone(), leg.recipient.clone()],
                        leg.max_turns,
                    )?;

                    let reason = match conversation
                        .run(
                            &mut agents,
                            &self.oracle,
                            &self.registry,
                            &opening,
                            &self.config.limits,
                            cancel,
                        )
                        .await
                    {
                        Ok(reason) => reason,
                        Err(ConversationError::Cancelled) => {
                            result.cancelled = true;
                            return Ok(result);
                        }
                        Err(err) => return Err(err.into()),
                    };

                    let summary = self.summarize(&conversation, leg.summary).await?;
                    if summary.degraded {
                        log::warn!(
                            "leg '{}' produced a degraded summary; feeding it forward anyway",
                            leg.task
                        );
                    }
                    carried = Some(summary.clone());
                    result.conversations.push(ConversationSummary {
                        label: leg.task.clone(),
                        reason,
                        turn_count: conversation.turn_count(),
                        summary,
                    });
                }
            }
            SequencingMode::Group {
                manager,
                task,
                max_turns,
                summary: mode,
            } => {
                let task = self.config.task(task).ok_or_else(|| {
                    OrchestratorError::Configuration(format!(
                        "group mode references unknown task '{}'",
                        task
                    ))
                })?;
                let opening = substitute_topic(&task.description, topic);

                // Manager first, then the rest of the roster in registration
                // order; turn-taking round-robins through this list.
                let mut participants = vec![manager.clone()];
                participants.extend(
                    self.config
                        .roles
                        .iter()
                        .filter(|r| &r.name != manager)
                        .map(|r| r.name.clone()),
                );

                let mut conversation = Conversation::new(participants, *max_turns)?;
                let reason = match conversation
                    .run(
                        &mut agents,
                        &self.oracle,
                        &self.registry,
                        &opening,
                        &self.config.limits,
                        cancel,
                    )
                    .await
                {
                    Ok(reason) => reason,
                    Err(ConversationError::Cancelled) => {
                        result.cancelled = true;
                        return Ok(result);
                    }
                    Err(err) => return Err(err.into()),
                };

                let summary = self.summarize(&conversation, *mode).await?;
                result.conversations.push(ConversationSummary {
                    label: manager.clone(),
                    reason,
                    turn_count: conversation.turn_count(),
                    summary,
                });
            }
        }

        log::info!(
            "run {} finished with {} conversation(s)",
            run_id,
            result.conversations.len()
        );
        Ok(result)
    }

    /// Build every agent for the run and wire tool capabilities. All
    /// validation happens before the first agent would be observable, so a
    /// failure leaves nothing half-constructed.
    fn build_roster(&self, topic: &str) -> Result<HashMap<String, Agent>, OrchestratorError> {
        for name in self.registry.referenced_agents() {
            if self.config.role(&name).is_none() {
                return Err(OrchestratorError::Configuration(format!(
                    "tool registry references role '{}' that is not in the roster",
                    name
                )));
            }
        }

        let mut agents = HashMap::new();
        for role in &self.config.roles {
            let context = substitute_topic(&role.system_prompt, topic);
            agents.insert(role.name.clone(), Agent::new(role.name.clone(), context));
        }
        for (caller, tool_id) in self.registry.grants() {
            if let Some(agent) = agents.get_mut(&caller) {
                agent.grant_capability(tool_id);
            }
        }
        Ok(agents)
    }

    async fn summarize(
        &self,
        conversation: &Conversation,
        mode: SummaryMode,
    ) -> Result<Summary, OrchestratorError> {
        // A conversation whose oracle stopped answering gets a verbatim
        // fallback regardless of the configured mode.
        if conversation.is_degraded() {
            let fallback = VerbatimSummarizer
                .summarize(conversation.transcript())
                .await?;
            return Ok(Summary::degraded(fallback.text));
        }
        let summary = match mode {
            SummaryMode::Reflective => {
                ReflectiveSummarizer::new(self.oracle.clone(), self.config.limits.clone())
                    .summarize(conversation.transcript())
                    .await?
            }
            SummaryMode::Verbatim => {
                VerbatimSummarizer
                    .summarize(conversation.transcript())
                    .await?
            }
        };
        Ok(summary)
    }
}
