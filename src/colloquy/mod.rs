// src/colloquy/mod.rs

pub mod agent;
pub mod config;
pub mod conversation;
pub mod oracle;
pub mod orchestrator;
pub mod registry;
pub mod summarizer;
pub mod trigger;

// Explicitly export the workhorse types so callers can reach them as
// colloquy::colloquy::Conversation instead of digging through submodules.
pub use conversation::Conversation;
pub use orchestrator::Orchestrator;
