use thiserror::Error;

/// Errors surfaced by the chat core.
///
/// `CompletionRequestFailed` is the only runtime failure of a turn; everything
/// from auth and rate limiting to a malformed stream collapses into it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("Completion request failed: {0}")]
    CompletionRequestFailed(String),

    #[error("Please set your {env_var} in the environment or the config file!")]
    MissingCredential { env_var: String },

    #[error("Temperature {0} is outside 0.0..=2.0")]
    InvalidTemperature(f32),

    #[error("Max tokens {0} is outside 100..=8192")]
    InvalidMaxTokens(u32),

    /// A slash command argument that does not parse as the expected value.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("Cannot submit an empty message")]
    EmptyPrompt,

    #[error("A reply is still streaming")]
    Busy,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChatError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::CompletionRequestFailed(message.into())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        Self::CompletionRequestFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
