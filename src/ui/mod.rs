//! Terminal UI components for the chat screen

pub mod app;
pub mod commands;
pub mod composer;
pub mod history;
pub mod settings;

pub use app::{run_tui, ChatApp};
pub use commands::{get_help_text, parse_slash_command, ParsedCommand, SlashCommand};
pub use composer::{Composer, ComposerResult};
pub use history::ConversationView;
pub use settings::{SettingsPanel, SettingsView};
