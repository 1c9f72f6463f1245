use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::conversation::{Conversation, Turn};
use crate::error::{ChatError, Result};
use crate::generation::GenerationConfig;
use crate::llm::{CompletionClient, OpenAiClient};
use crate::streaming::{accumulate, FragmentSink, StreamOutcome};

const MAX_NOTICES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// User-visible status message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Everything one chat session owns: its conversation, its generation
/// settings and the notices shown to the user. Handlers receive it explicitly.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    conversation: Conversation,
    config: GenerationConfig,
    state: SessionState,
    notices: VecDeque<Notice>,
}

impl ChatSession {
    pub fn new(greeting: impl Into<String>, config: GenerationConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation: Conversation::seeded(greeting),
            config,
            state: SessionState::Idle,
            notices: VecDeque::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn turns(&self) -> &[Turn] {
        self.conversation.all()
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut GenerationConfig {
        &mut self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.back()
    }

    pub fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.notices.push_back(Notice {
            level,
            message: message.into(),
            at: Utc::now(),
        });
        while self.notices.len() > MAX_NOTICES {
            self.notices.pop_front();
        }
    }

    /// Append the user's turn and enter the streaming state.
    pub fn begin_turn(&mut self, text: &str) -> Result<()> {
        if self.is_streaming() {
            return Err(ChatError::Busy);
        }
        if text.trim().is_empty() {
            return Err(ChatError::EmptyPrompt);
        }

        self.conversation.append(Turn::user(text));
        self.state = SessionState::Streaming;
        info!(
            session = %self.id,
            model = %self.config.model(),
            turns = self.conversation.len(),
            "user turn submitted"
        );
        Ok(())
    }

    /// Commit the streamed reply, partial or not, and return to idle.
    pub fn finish_turn(&mut self, outcome: StreamOutcome) {
        if let Some(err) = &outcome.error {
            warn!(session = %self.id, error = %err, kept_chars = outcome.text.len(), "reply stream aborted");
            self.notify(NoticeLevel::Error, err.to_string());
        } else {
            info!(session = %self.id, fragments = outcome.fragments, "reply complete");
        }

        self.conversation.append(Turn::assistant(outcome.text));
        self.state = SessionState::Idle;
    }

    /// The request never produced a stream: commit an empty reply.
    pub fn fail_turn(&mut self, err: ChatError) {
        self.finish_turn(StreamOutcome {
            text: String::new(),
            error: Some(err),
            fragments: 0,
        });
    }

    /// Run one full exchange: user turn, streamed reply, assistant turn.
    ///
    /// Only submission guards (`EmptyPrompt`, `Busy`) are returned as errors;
    /// completion failures are recorded as notices and the session stays usable.
    pub async fn submit<C, S>(&mut self, client: &C, text: &str, sink: &mut S) -> Result<StreamOutcome>
    where
        C: CompletionClient + ?Sized,
        S: FragmentSink + ?Sized,
    {
        self.begin_turn(text)?;

        let span = info_span!("completion", session = %self.id);
        let outcome = async {
            match client.stream_completion(self.turns(), &self.config).await {
                Ok(stream) => accumulate(stream, sink).await,
                Err(err) => StreamOutcome {
                    text: String::new(),
                    error: Some(err),
                    fragments: 0,
                },
            }
        }
        .instrument(span)
        .await;

        self.finish_turn(outcome.clone());
        Ok(outcome)
    }

    /// Reset the conversation to its seeded greeting.
    pub fn clear(&mut self) {
        self.conversation.clear();
        self.notify(NoticeLevel::Success, "Conversation cleared!");
        info!(session = %self.id, "conversation cleared");
    }
}

/// Outcome of resolving configuration at startup.
pub enum Startup {
    Ready {
        session: ChatSession,
        client: OpenAiClient,
    },
    /// Terminal state: nothing can be submitted until the environment is fixed.
    Stopped(ChatError),
}

impl Startup {
    /// Resolve the credential and build the HTTP client. `env` looks up
    /// environment variables so callers can supply their own source.
    pub fn from_config<F>(config: &Config, generation: GenerationConfig, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(api_key) = config.resolve_api_key(env) else {
            warn!(env_var = %config.api_key_env, "no credential configured");
            return Startup::Stopped(ChatError::MissingCredential {
                env_var: config.api_key_env.clone(),
            });
        };

        match OpenAiClient::new(api_key, config.base_url.clone(), config.connect_timeout()) {
            Ok(client) => Startup::Ready {
                session: ChatSession::new(config.ui.greeting.clone(), generation),
                client,
            },
            Err(err) => Startup::Stopped(err),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Startup::Ready { .. })
    }
}
