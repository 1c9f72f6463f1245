//! Streaming chat front-end for OpenAI-compatible completion endpoints.

pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod generation;
pub mod llm;
pub mod session;
pub mod streaming;
pub mod ui;

pub use config::Config;
pub use conversation::{Conversation, Role, Turn};
pub use error::{ChatError, Result};
pub use generation::{GenerationConfig, Model};
pub use llm::{CompletionClient, FragmentStream, OpenAiClient};
pub use session::{ChatSession, Startup};
pub use streaming::{accumulate, FragmentSink, StreamOutcome};
