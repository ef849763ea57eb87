//! End-to-end orchestration tests: sequential hand-off with tool routing,
//! turn bounds, group round-robin, and degraded continuation when the oracle
//! stops answering.

use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;

use colloquy::{
    Agent, CallLimits, CancelToken, Conversation, ConversationPlan, OracleError, OracleReply,
    Orchestrator, RoleSpec, RunConfig, SequencingMode, SummaryMode, TaskSpec, TerminationReason,
    ToolHandler, ToolRegistry, Turn, TurnOracle,
};

const SUMMARY_INSTRUCTION_MARKER: &str = "condense finished conversations";

/// Plays back scripted replies for conversation turns and answers
/// summarization requests with a fixed recap. The summarizer identifies
/// itself through its instruction text, so the two call kinds are easy to
/// tell apart.
struct ScriptedOracle {
    replies: TokioMutex<Vec<OracleReply>>,
    seen_contexts: TokioMutex<Vec<String>>,
}

impl ScriptedOracle {
    fn shared(replies: Vec<OracleReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: TokioMutex::new(replies),
            seen_contexts: TokioMutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TurnOracle for ScriptedOracle {
    async fn next_turn(
        &self,
        role_context: &str,
        _history: &[Turn],
        _incoming: &str,
    ) -> Result<OracleReply, OracleError> {
        if role_context.contains(SUMMARY_INSTRUCTION_MARKER) {
            return Ok(OracleReply::Content("recap of the conversation".into()));
        }
        self.seen_contexts.lock().await.push(role_context.to_string());
        let mut replies = self.replies.lock().await;
        if replies.is_empty() {
            Ok(OracleReply::Idle)
        } else {
            Ok(replies.remove(0))
        }
    }
}

/// Records every invocation so tests can assert which tools actually ran.
struct RecordingHandler {
    label: &'static str,
    log: Arc<TokioMutex<Vec<String>>>,
}

#[async_trait]
impl ToolHandler for RecordingHandler {
    async fn invoke(
        &self,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
        self.log.lock().await.push(self.label.to_string());
        Ok(serde_json::json!({ "tool": self.label, "received": arguments }))
    }
}

fn fast_limits() -> CallLimits {
    CallLimits {
        oracle_timeout: Duration::from_millis(500),
        tool_timeout: Duration::from_millis(500),
        retry_attempts: 0,
        retry_backoff: Duration::from_millis(1),
    }
}

fn content(text: &str) -> OracleReply {
    OracleReply::Content(text.into())
}

fn tool_call(tool_id: &str) -> OracleReply {
    OracleReply::ToolCall {
        tool_id: tool_id.into(),
        arguments: serde_json::json!({ "origin": "test" }),
    }
}

#[tokio::test]
async fn research_pipeline_runs_all_legs_and_routes_tools() {
    let mut config = RunConfig::research_pipeline();
    config.limits = fast_limits();

    // Deterministic reply order across the four legs: the plain-content legs
    // finish in one turn, the tool-using legs in one tool exchange plus one
    // closing turn.
    let oracle = ScriptedOracle::shared(vec![
        content("Findings compiled. TERMINATE"),
        content("Report written. TERMINATE"),
        tool_call("notion_create_page"),
        content("Page filed. TERMINATE"),
        tool_call("slack_post_message"),
        content("Announcement posted. TERMINATE"),
    ]);

    let tool_log = Arc::new(TokioMutex::new(Vec::new()));
    let mut registry = ToolRegistry::new();
    registry
        .register(
            "notion_create_page",
            "notion_agent",
            "user_proxy",
            Arc::new(RecordingHandler {
                label: "notion_create_page",
                log: tool_log.clone(),
            }),
        )
        .unwrap();
    registry
        .register(
            "slack_post_message",
            "slack_agent",
            "user_proxy",
            Arc::new(RecordingHandler {
                label: "slack_post_message",
                log: tool_log.clone(),
            }),
        )
        .unwrap();

    let orchestrator = Orchestrator::new(config, oracle.clone())
        .unwrap()
        .with_registry(registry);

    let result = orchestrator.run("open source licensing").await.unwrap();

    assert!(!result.cancelled);
    assert_eq!(result.conversations.len(), 4);
    for conversation in &result.conversations {
        assert_eq!(conversation.reason, TerminationReason::PredicateMatched);
        assert_eq!(conversation.turn_count, 1);
    }
    assert_eq!(
        result
            .conversations
            .iter()
            .map(|c| c.label.as_str())
            .collect::<Vec<_>>(),
        vec!["research_task", "reporting_task", "notion_task", "slack_task"]
    );
    assert_eq!(
        *tool_log.lock().await,
        vec!["notion_create_page", "slack_post_message"]
    );

    // Topic substitution reached the agents' role contexts.
    let contexts = oracle.seen_contexts.lock().await;
    assert!(contexts.iter().any(|c| c.contains("open source licensing")));
}

#[tokio::test]
async fn endless_leg_stops_exactly_at_the_bound() {
    let config = RunConfig {
        roles: vec![
            RoleSpec {
                name: "user_proxy".into(),
                system_prompt: "Supervise.".into(),
            },
            RoleSpec {
                name: "researcher".into(),
                system_prompt: "Research {topic}.".into(),
            },
        ],
        tasks: vec![TaskSpec {
            name: "research_task".into(),
            description: "Research {topic}.".into(),
        }],
        sequencing: SequencingMode::Sequential {
            legs: vec![ConversationPlan {
                initiator: "user_proxy".into(),
                recipient: "researcher".into(),
                task: "research_task".into(),
                max_turns: 6,
                clear_history: false,
                summary: SummaryMode::Verbatim,
            }],
        },
        limits: fast_limits(),
    };

    let oracle = ScriptedOracle::shared(
        (0..50).map(|i| content(&format!("still going {}", i))).collect(),
    );
    let orchestrator = Orchestrator::new(config, oracle).unwrap();

    let result = orchestrator.run("anything").await.unwrap();
    assert_eq!(result.conversations.len(), 1);
    assert_eq!(
        result.conversations[0].reason,
        TerminationReason::MaxTurnsReached
    );
    assert_eq!(result.conversations[0].turn_count, 6);
    assert_eq!(
        result.final_summary().map(|s| s.text.as_str()),
        Some("still going 5")
    );
}

#[tokio::test]
async fn group_mode_round_robins_in_roster_order() {
    let config = RunConfig {
        roles: vec![
            RoleSpec {
                name: "manager".into(),
                system_prompt: "MANAGER coordinating {topic}".into(),
            },
            RoleSpec {
                name: "builder".into(),
                system_prompt: "BUILDER working on {topic}".into(),
            },
            RoleSpec {
                name: "reviewer".into(),
                system_prompt: "REVIEWER checking {topic}".into(),
            },
        ],
        tasks: vec![TaskSpec {
            name: "group_task".into(),
            description: "Collaborate on {topic}.".into(),
        }],
        sequencing: SequencingMode::Group {
            manager: "manager".into(),
            task: "group_task".into(),
            max_turns: 6,
            summary: SummaryMode::Verbatim,
        },
        limits: fast_limits(),
    };

    let oracle = ScriptedOracle::shared(
        (0..6).map(|i| content(&format!("contribution {}", i))).collect(),
    );
    let orchestrator = Orchestrator::new(config, oracle.clone()).unwrap();

    let result = orchestrator.run("the release").await.unwrap();
    assert_eq!(result.conversations[0].reason, TerminationReason::MaxTurnsReached);
    assert_eq!(result.conversations[0].turn_count, 6);

    // The manager opens, so the first requested turn belongs to the builder;
    // rotation then cycles through the whole roster.
    let contexts = oracle.seen_contexts.lock().await;
    let speakers: Vec<&str> = contexts
        .iter()
        .map(|c| c.split_whitespace().next().unwrap())
        .collect();
    assert_eq!(
        speakers,
        vec!["BUILDER", "REVIEWER", "MANAGER", "BUILDER", "REVIEWER", "MANAGER"]
    );
}

#[tokio::test]
async fn oracle_outage_degrades_the_leg_but_the_run_continues() {
    struct FailingThenScripted {
        fail_first_n: usize,
        calls: TokioMutex<usize>,
    }

    #[async_trait]
    impl TurnOracle for FailingThenScripted {
        async fn next_turn(
            &self,
            role_context: &str,
            _history: &[Turn],
            _incoming: &str,
        ) -> Result<OracleReply, OracleError> {
            if role_context.contains(SUMMARY_INSTRUCTION_MARKER) {
                return Ok(OracleReply::Content("recap".into()));
            }
            let mut calls = self.calls.lock().await;
            *calls += 1;
            if *calls <= self.fail_first_n {
                Err(OracleError::Unavailable("connection refused".into()))
            } else {
                Ok(OracleReply::Content("Recovered. TERMINATE".into()))
            }
        }
    }

    let config = RunConfig {
        roles: vec![
            RoleSpec {
                name: "user_proxy".into(),
                system_prompt: "Supervise.".into(),
            },
            RoleSpec {
                name: "researcher".into(),
                system_prompt: "Research {topic}.".into(),
            },
            RoleSpec {
                name: "reporting_analyst".into(),
                system_prompt: "Report on {topic}.".into(),
            },
        ],
        tasks: vec![
            TaskSpec {
                name: "research_task".into(),
                description: "Research {topic}.".into(),
            },
            TaskSpec {
                name: "reporting_task".into(),
                description: "Write the {topic} report.".into(),
            },
        ],
        sequencing: SequencingMode::Sequential {
            legs: vec![
                ConversationPlan {
                    initiator: "user_proxy".into(),
                    recipient: "researcher".into(),
                    task: "research_task".into(),
                    max_turns: 6,
                    clear_history: false,
                    summary: SummaryMode::Reflective,
                },
                ConversationPlan {
                    initiator: "user_proxy".into(),
                    recipient: "reporting_analyst".into(),
                    task: "reporting_task".into(),
                    max_turns: 6,
                    clear_history: false,
                    summary: SummaryMode::Verbatim,
                },
            ],
        },
        limits: fast_limits(),
    };

    // The first leg's only turn fails outright (no retries configured); the
    // second leg recovers.
    let oracle = Arc::new(FailingThenScripted {
        fail_first_n: 1,
        calls: TokioMutex::new(0),
    });
    let orchestrator = Orchestrator::new(config, oracle).unwrap();

    let result = orchestrator.run("databases").await.unwrap();
    assert_eq!(result.conversations.len(), 2);
    assert_eq!(result.conversations[0].reason, TerminationReason::OracleIdle);
    assert!(result.conversations[0].summary.degraded);
    assert_eq!(
        result.conversations[1].reason,
        TerminationReason::PredicateMatched
    );
    assert!(!result.conversations[1].summary.degraded);
}

#[tokio::test]
async fn clear_history_resets_participants_between_legs() {
    // Drive the conversation layer directly so agent histories stay visible.
    let oracle: Arc<dyn TurnOracle> =
        ScriptedOracle::shared(vec![content("First done. TERMINATE")]);
    let registry = ToolRegistry::new();
    let limits = fast_limits();
    let cancel = CancelToken::new();

    let mut agents: HashMap<String, Agent> = [
        ("a".to_string(), Agent::new("a", "ctx a")),
        ("b".to_string(), Agent::new("b", "ctx b")),
    ]
    .into();

    let mut convo = Conversation::new(vec!["a".into(), "b".into()], 4).unwrap();
    convo
        .run(&mut agents, &oracle, &registry, "start", &limits, &cancel)
        .await
        .unwrap();

    assert!(!agents["a"].history().is_empty());
    assert!(!agents["b"].history().is_empty());

    for agent in agents.values_mut() {
        agent.clear_history();
    }
    assert!(agents["a"].history().is_empty());
    assert!(agents["b"].history().is_empty());
}
