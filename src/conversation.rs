//! Append-only conversation store for a single chat session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GREETING: &str = "Hey! I'm your Grok-inspired assistant — maximally truth-seeking, slightly rebellious, and ready to go deep. What’s on your mind today? 🚀";

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn avatar(&self) -> &'static str {
        match self {
            Role::User => "🧑‍💻",
            Role::Assistant => "🤖",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in the conversation. Fields are read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    role: Role,
    content: String,
    created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Role/content pair as sent to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Turn> for WireMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// Ordered list of turns, seeded with a greeting from the assistant.
#[derive(Debug, Clone)]
pub struct Conversation {
    greeting: String,
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn seeded(greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        let turns = vec![Turn::assistant(greeting.clone())];
        Self { greeting, turns }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Reset to the single greeting turn, whatever the current length.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.turns.push(Turn::assistant(self.greeting.clone()));
    }

    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn wire_messages(&self) -> Vec<WireMessage> {
        wire_messages(&self.turns)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::seeded(DEFAULT_GREETING)
    }
}

/// Strip display metadata from turns before they go on the wire.
pub fn wire_messages(turns: &[Turn]) -> Vec<WireMessage> {
    turns.iter().map(WireMessage::from).collect()
}
