//! Transcript summarization strategies.
//!
//! Each conversation is reduced to a [`Summary`] that the orchestrator feeds
//! into the next sequential leg and collects into the run result. Two
//! strategies are provided: [`ReflectiveSummarizer`] makes one extra oracle
//! call to compress the transcript, [`VerbatimSummarizer`] returns the last
//! content turn unchanged.

use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::colloquy::config::CallLimits;
use crate::colloquy::oracle::{call_with_retry, OracleReply, Turn, TurnOracle};

/// The reduced form of a finished conversation.
#[derive(Debug, Clone)]
pub struct Summary {
    pub text: String,
    /// Set when the strategy could not do its real job and fell back to a
    /// weaker form (e.g. reflective summarization with an unreachable
    /// oracle).
    pub degraded: bool,
}

impl Summary {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            degraded: false,
        }
    }

    pub fn degraded(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            degraded: true,
        }
    }
}

/// Errors surfaced by summarization.
#[derive(Debug)]
pub enum SummarizerError {
    /// The transcript holds no content turns to summarize.
    EmptyTranscript,
    /// The oracle failed and no fallback text was available.
    OracleFailed(String),
}

impl fmt::Display for SummarizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummarizerError::EmptyTranscript => {
                write!(f, "Cannot summarize an empty transcript")
            }
            SummarizerError::OracleFailed(msg) => {
                write!(f, "Summarization oracle call failed: {}", msg)
            }
        }
    }
}

impl Error for SummarizerError {}

/// Strategy trait for reducing a transcript to a summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &[Turn]) -> Result<Summary, SummarizerError>;
}

fn last_content_turn(transcript: &[Turn]) -> Option<&Turn> {
    transcript.iter().rev().find(|t| t.is_text())
}

/// Compresses the transcript through one extra oracle call.
///
/// If the oracle fails, the summarizer degrades to the last content turn
/// rather than failing the leg; the summary is flagged so downstream
/// consumers know it was not reflectively produced.
pub struct ReflectiveSummarizer {
    oracle: Arc<dyn TurnOracle>,
    limits: CallLimits,
}

impl ReflectiveSummarizer {
    pub fn new(oracle: Arc<dyn TurnOracle>, limits: CallLimits) -> Self {
        Self { oracle, limits }
    }

    fn render_transcript(transcript: &[Turn]) -> String {
        let mut rendered = String::new();
        for turn in transcript {
            rendered.push_str(&format!("{}: {}\n", turn.speaker, turn.content));
        }
        rendered
    }
}

#[async_trait]
impl Summarizer for ReflectiveSummarizer {
    async fn summarize(&self, transcript: &[Turn]) -> Result<Summary, SummarizerError> {
        let last = last_content_turn(transcript).ok_or(SummarizerError::EmptyTranscript)?;

        let instruction = "You condense finished conversations. Reply with a concise \
                           summary of the outcome, suitable as context for a follow-up \
                           conversation.";
        let rendered = Self::render_transcript(transcript);

        match call_with_retry(&self.oracle, instruction, &[], &rendered, &self.limits).await {
            Ok(OracleReply::Content(text)) if !text.is_empty() => Ok(Summary::new(text)),
            Ok(_) => {
                log::warn!("summarization oracle returned no content; degrading to last turn");
                Ok(Summary::degraded(last.content.to_string()))
            }
            Err(err) => {
                log::warn!("summarization oracle failed: {}; degrading to last turn", err);
                Ok(Summary::degraded(last.content.to_string()))
            }
        }
    }
}

/// Returns the last content turn unchanged. Deterministic and oracle-free.
#[derive(Default)]
pub struct VerbatimSummarizer;

#[async_trait]
impl Summarizer for VerbatimSummarizer {
    async fn summarize(&self, transcript: &[Turn]) -> Result<Summary, SummarizerError> {
        let last = last_content_turn(transcript).ok_or(SummarizerError::EmptyTranscript)?;
        Ok(Summary::new(last.content.to_string()))
    }
}
