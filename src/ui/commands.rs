use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::error::{ChatError, Result};
use crate::generation::Model;

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Select the model for the next request
    Model,
    /// Set the sampling temperature
    Temp,
    /// Set the max tokens of the reply
    Tokens,
    /// Reset the conversation to the greeting
    Clear,
    /// Show help
    Help,
    /// Exit the application
    Bye,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// Model named by `/model <id>`; `None` when no argument was given.
    pub fn model_target(&self) -> Option<Result<Model>> {
        if self.command != SlashCommand::Model {
            return None;
        }
        self.argument().map(Model::parse)
    }

    pub fn temperature_target(&self) -> Option<Result<f32>> {
        if self.command != SlashCommand::Temp {
            return None;
        }
        let arg = self.argument()?;
        Some(
            arg.trim()
                .parse::<f32>()
                .map_err(|_| ChatError::InvalidArgument(format!("'{arg}' is not a temperature"))),
        )
    }

    pub fn max_tokens_target(&self) -> Option<Result<u32>> {
        if self.command != SlashCommand::Tokens {
            return None;
        }
        let arg = self.argument()?;
        Some(
            arg.trim()
                .parse::<u32>()
                .map_err(|_| ChatError::InvalidArgument(format!("'{arg}' is not a token count"))),
        )
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Model => "select a model (grok-beta, gpt-4o, gpt-4o-mini, o1-preview, o1-mini)",
            SlashCommand::Temp => "set temperature, 0.0 to 2.0",
            SlashCommand::Tokens => "set max tokens, 100 to 8192",
            SlashCommand::Clear => "clear the conversation",
            SlashCommand::Help => "show available commands",
            SlashCommand::Bye => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let input = input.trim();
    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].split_whitespace();
    let head = parts.next()?.to_lowercase();
    let rest: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(&head).ok().or_else(|| match head.as_str() {
        "q" | "quit" | "exit" => Some(SlashCommand::Bye),
        "m" | "models" => Some(SlashCommand::Model),
        "t" | "temperature" => Some(SlashCommand::Temp),
        "max-tokens" | "max_tokens" => Some(SlashCommand::Tokens),
        "reset" => Some(SlashCommand::Clear),
        _ => None,
    })?;

    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n");
    for command in SlashCommand::iter() {
        help.push_str(&format!("/{} - {}\n", command.command(), command.description()));
    }
    help.push_str("Aliases: /q /quit /exit for /bye, /m for /model, /t for /temp.\n");
    help.push_str("Tab switches to the settings panel; arrows adjust the selected setting.");
    help
}
