//! Configuration for a Colloquy run.
//!
//! A [`RunConfig`] carries the named role and task templates (with `{topic}`
//! placeholders), the sequencing mode, and the external-call limits. It is
//! loaded once per run, validated eagerly by the orchestrator, and never
//! mutated afterwards.
//!
//! The library itself never reads files. Config types derive `Deserialize` so
//! embedding applications can parse them with serde from whatever format they
//! keep their role/task catalogs in.

use serde::Deserialize;
use std::time::Duration;

/// Default turn bound for the shared group conversation.
pub const DEFAULT_GROUP_MAX_TURNS: usize = 50;

/// A named agent role with a `{topic}`-templated instruction text.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    pub system_prompt: String,
}

/// A named task with a `{topic}`-templated description used as a
/// conversation's opening message.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub description: String,
}

/// Which summarization strategy a conversation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMode {
    /// One extra oracle call compresses the transcript. Non-deterministic,
    /// used for human-readable hand-off recaps.
    Reflective,
    /// The last content turn, unmodified. Deterministic, used when downstream
    /// consumers need the raw final payload.
    Verbatim,
}

fn default_summary_mode() -> SummaryMode {
    SummaryMode::Reflective
}

fn default_group_max_turns() -> usize {
    DEFAULT_GROUP_MAX_TURNS
}

/// One leg of a sequential hand-off run.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationPlan {
    /// Role that speaks the opening task message.
    pub initiator: String,
    /// Role the conversation is addressed to.
    pub recipient: String,
    /// Task whose (topic-substituted) description opens the leg.
    pub task: String,
    /// Turn bound for this leg.
    pub max_turns: usize,
    /// Clear both participants' histories at the start of the leg.
    #[serde(default)]
    pub clear_history: bool,
    /// How this leg's transcript is reduced to a summary.
    #[serde(default = "default_summary_mode")]
    pub summary: SummaryMode,
}

/// How conversations are sequenced within a run, selected at construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SequencingMode {
    /// Conversations run one after another in declared order; each leg's
    /// summary becomes contextual input to the next leg's opening message.
    Sequential { legs: Vec<ConversationPlan> },

    /// One shared conversation includes every roster agent plus a
    /// coordinating manager; turns round-robin in registration order and the
    /// manager's termination check runs after every turn.
    Group {
        /// Role that coordinates the group and speaks the opening message.
        manager: String,
        /// Task whose description opens the shared conversation.
        task: String,
        #[serde(default = "default_group_max_turns")]
        max_turns: usize,
        #[serde(default = "default_summary_mode")]
        summary: SummaryMode,
    },
}

/// Timeouts and retry bounds for external calls (oracle and tool handlers).
#[derive(Debug, Clone)]
pub struct CallLimits {
    pub oracle_timeout: Duration,
    pub tool_timeout: Duration,
    /// Additional attempts after the first failed oracle call.
    pub retry_attempts: u32,
    /// Initial backoff between attempts; doubles per attempt.
    pub retry_backoff: Duration,
}

impl Default for CallLimits {
    fn default() -> Self {
        Self {
            oracle_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Everything the orchestrator needs to execute one topic run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Agent roles in registration order. Order matters: group mode
    /// round-robins through it.
    pub roles: Vec<RoleSpec>,
    /// Task catalog referenced by sequencing plans.
    pub tasks: Vec<TaskSpec>,
    pub sequencing: SequencingMode,
    #[serde(skip, default)]
    pub limits: CallLimits,
}

impl RunConfig {
    /// Look up a role by name.
    pub fn role(&self, name: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// Look up a task by name.
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Eager validation of the whole configuration. Any failure here aborts
    /// the run before a single agent is created.
    pub fn validate(&self) -> Result<(), String> {
        if self.roles.is_empty() {
            return Err("no roles configured".into());
        }
        for (i, role) in self.roles.iter().enumerate() {
            if role.system_prompt.trim().is_empty() {
                return Err(format!("role '{}' has an empty system prompt", role.name));
            }
            if self.roles[..i].iter().any(|r| r.name == role.name) {
                return Err(format!("duplicate role name '{}'", role.name));
            }
        }

        match &self.sequencing {
            SequencingMode::Sequential { legs } => {
                if legs.is_empty() {
                    return Err("sequential mode requires at least one leg".into());
                }
                for leg in legs {
                    if leg.max_turns == 0 {
                        return Err(format!("leg for task '{}' has max_turns of 0", leg.task));
                    }
                    if leg.initiator == leg.recipient {
                        return Err(format!(
                            "leg for task '{}' names '{}' as both initiator and recipient",
                            leg.task, leg.initiator
                        ));
                    }
                    for name in [&leg.initiator, &leg.recipient] {
                        if self.role(name).is_none() {
                            return Err(format!("leg references unknown role '{}'", name));
                        }
                    }
                    if self.task(&leg.task).is_none() {
                        return Err(format!("leg references unknown task '{}'", leg.task));
                    }
                }
            }
            SequencingMode::Group {
                manager,
                task,
                max_turns,
                ..
            } => {
                if *max_turns == 0 {
                    return Err("group mode has max_turns of 0".into());
                }
                if self.role(manager).is_none() {
                    return Err(format!("group mode references unknown manager role '{}'", manager));
                }
                if self.task(task).is_none() {
                    return Err(format!("group mode references unknown task '{}'", task));
                }
                if self.roles.len() < 2 {
                    return Err("group mode requires at least two roles".into());
                }
            }
        }
        Ok(())
    }

    /// The observed research pipeline roster: a researcher and a reporting
    /// analyst produce findings, a notes agent files them, a messaging agent
    /// announces them, and a user proxy supervises task completion and
    /// executes tool actions on behalf of the capability-holding agents.
    pub fn research_pipeline() -> Self {
        let terminate_instruction =
            "TERMINATE ONCE YOU ARE DONE WITH YOUR JOB by saying TERMINATE";
        Self {
            roles: vec![
                RoleSpec {
                    name: "researcher".into(),
                    system_prompt: format!(
                        "You are a senior researcher investigating {{topic}}. Gather the most \
                         relevant findings and developments and present them clearly. {}",
                        terminate_instruction
                    ),
                },
                RoleSpec {
                    name: "reporting_analyst".into(),
                    system_prompt: format!(
                        "You are a reporting analyst. Turn research findings about {{topic}} into \
                         a detailed, well-structured report. {}",
                        terminate_instruction
                    ),
                },
                RoleSpec {
                    name: "notion_agent".into(),
                    system_prompt: format!(
                        "You file reports about {{topic}} into the team's note workspace using \
                         the tools available to you. {}",
                        terminate_instruction
                    ),
                },
                RoleSpec {
                    name: "slack_agent".into(),
                    system_prompt: format!(
                        "You announce completed reports about {{topic}} in the team channel using \
                         the tools available to you. {}",
                        terminate_instruction
                    ),
                },
                RoleSpec {
                    name: "user_proxy".into(),
                    system_prompt: "Your job is to act as the user and make sure each task is \
                                    completed. Check the output you receive; if the task was \
                                    completed, reply with TERMINATE. Never send empty output."
                        .into(),
                },
            ],
            tasks: vec![
                TaskSpec {
                    name: "research_task".into(),
                    description: "Conduct thorough research about {topic} and list the most \
                                  relevant findings."
                        .into(),
                },
                TaskSpec {
                    name: "reporting_task".into(),
                    description: "Review the research about {topic} and expand it into a full \
                                  report with sections for each finding."
                        .into(),
                },
                TaskSpec {
                    name: "notion_task".into(),
                    description: "File the report about {topic} as a new page in the team \
                                  workspace."
                        .into(),
                },
                TaskSpec {
                    name: "slack_task".into(),
                    description: "Post a short announcement about the {topic} report in the team \
                                  channel."
                        .into(),
                },
            ],
            sequencing: SequencingMode::Sequential {
                legs: vec![
                    ConversationPlan {
                        initiator: "user_proxy".into(),
                        recipient: "researcher".into(),
                        task: "research_task".into(),
                        max_turns: 6,
                        clear_history: true,
                        summary: SummaryMode::Reflective,
                    },
                    ConversationPlan {
                        initiator: "user_proxy".into(),
                        recipient: "reporting_analyst".into(),
                        task: "reporting_task".into(),
                        max_turns: 6,
                        clear_history: false,
                        summary: SummaryMode::Reflective,
                    },
                    ConversationPlan {
                        initiator: "user_proxy".into(),
                        recipient: "notion_agent".into(),
                        task: "notion_task".into(),
                        max_turns: 15,
                        clear_history: false,
                        summary: SummaryMode::Reflective,
                    },
                    ConversationPlan {
                        initiator: "user_proxy".into(),
                        recipient: "slack_agent".into(),
                        task: "slack_task".into(),
                        max_turns: 15,
                        clear_history: false,
                        summary: SummaryMode::Reflective,
                    },
                ],
            },
            limits: CallLimits::default(),
        }
    }
}

/// Substitute the `{topic}` placeholder in a role or task template.
pub fn substitute_topic(template: &str, topic: &str) -> String {
    template.replace("{topic}", topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_research_pipeline_validates() {
        let config = RunConfig::research_pipeline();
        config.validate().unwrap();
    }

    #[test]
    fn test_topic_substitution() {
        let resolved = substitute_topic("Research {topic} thoroughly. {topic} matters.", "rust");
        assert_eq!(resolved, "Research rust thoroughly. rust matters.");
    }

    #[test]
    fn test_unknown_task_fails_validation() {
        let mut config = RunConfig::research_pipeline();
        if let SequencingMode::Sequential { legs } = &mut config.sequencing {
            legs[0].task = "missing_task".into();
        }
        let err = config.validate().unwrap_err();
        assert!(err.contains("missing_task"));
    }

    #[test]
    fn test_group_config_deserializes_with_default_bound() {
        let raw = serde_json::json!({
            "roles": [
                { "name": "manager", "system_prompt": "coordinate" },
                { "name": "worker", "system_prompt": "work" }
            ],
            "tasks": [
                { "name": "group_task", "description": "do {topic}" }
            ],
            "sequencing": { "mode": "group", "manager": "manager", "task": "group_task" }
        });
        let config: RunConfig = serde_json::from_value(raw).unwrap();
        config.validate().unwrap();
        match config.sequencing {
            SequencingMode::Group { max_turns, .. } => {
                assert_eq!(max_turns, DEFAULT_GROUP_MAX_TURNS)
            }
            _ => panic!("expected group mode"),
        }
    }
}
