use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::error::{ChatError, Result};

pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;
pub const TEMPERATURE_STEP: f32 = 0.1;
pub const DEFAULT_TEMPERATURE: f32 = 0.9;

pub const MIN_MAX_TOKENS: u32 = 100;
pub const MAX_MAX_TOKENS: u32 = 8192;
pub const MAX_TOKENS_STEP: u32 = 100;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Models offered by the selector. The identifier sent on the wire is exactly
/// the serialized variant name.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    EnumIter,
    AsRefStr,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum Model {
    #[default]
    #[strum(serialize = "grok-beta")]
    #[serde(rename = "grok-beta")]
    GrokBeta,
    #[strum(serialize = "gpt-4o")]
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[strum(serialize = "gpt-4o-mini")]
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[strum(serialize = "o1-preview")]
    #[serde(rename = "o1-preview")]
    O1Preview,
    #[strum(serialize = "o1-mini")]
    #[serde(rename = "o1-mini")]
    O1Mini,
}

impl Model {
    pub fn id(&self) -> &'static str {
        (*self).into()
    }

    pub fn all() -> Vec<Model> {
        Model::iter().collect()
    }

    /// Parse a user-supplied identifier. Matching is exact apart from case and
    /// surrounding whitespace; there is no fallback model.
    pub fn parse(input: &str) -> Result<Model> {
        let normalized = input.trim().to_lowercase();
        Model::from_str(&normalized).map_err(|_| ChatError::UnknownModel(input.trim().to_string()))
    }

    /// Next model in selector order, wrapping around.
    pub fn next(&self) -> Model {
        let models = Model::all();
        let index = models.iter().position(|m| m == self).unwrap_or(0);
        models[(index + 1) % models.len()]
    }

    /// Previous model in selector order, wrapping around.
    pub fn previous(&self) -> Model {
        let models = Model::all();
        let index = models.iter().position(|m| m == self).unwrap_or(0);
        models[(index + models.len() - 1) % models.len()]
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// User-tunable parameters for a completion request.
///
/// The fields are private so every value that reaches the wire has passed
/// through either the rejecting constructor or the clamping setters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    model: Model,
    temperature: f32,
    max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: Model::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl GenerationConfig {
    /// Build a config, rejecting out-of-range values.
    pub fn new(model: Model, temperature: f32, max_tokens: u32) -> Result<Self> {
        Ok(Self {
            model,
            temperature: validate_temperature(temperature)?,
            max_tokens: validate_max_tokens(max_tokens)?,
        })
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn set_model(&mut self, model: Model) {
        self.model = model;
    }

    /// Slider semantics: values outside the range are clamped. Non-finite input
    /// is rejected and leaves the current value untouched.
    pub fn set_temperature(&mut self, temperature: f32) -> Result<f32> {
        if !temperature.is_finite() {
            return Err(ChatError::InvalidTemperature(temperature));
        }
        self.temperature = round_tenth(temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE));
        Ok(self.temperature)
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) -> u32 {
        self.max_tokens = max_tokens.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS);
        self.max_tokens
    }

    pub fn step_temperature(&mut self, steps: i32) -> f32 {
        let target = self.temperature + TEMPERATURE_STEP * steps as f32;
        // target is always finite here
        self.set_temperature(target).unwrap_or(self.temperature)
    }

    pub fn step_max_tokens(&mut self, steps: i32) -> u32 {
        let delta = i64::from(MAX_TOKENS_STEP) * i64::from(steps);
        let target = (i64::from(self.max_tokens) + delta)
            .clamp(i64::from(MIN_MAX_TOKENS), i64::from(MAX_MAX_TOKENS));
        self.set_max_tokens(target as u32)
    }
}

pub fn validate_temperature(temperature: f32) -> Result<f32> {
    if temperature.is_finite() && (MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
        Ok(temperature)
    } else {
        Err(ChatError::InvalidTemperature(temperature))
    }
}

pub fn validate_max_tokens(max_tokens: u32) -> Result<u32> {
    if (MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_tokens) {
        Ok(max_tokens)
    } else {
        Err(ChatError::InvalidMaxTokens(max_tokens))
    }
}

// Keeps slider arithmetic from drifting to values like 0.30000001.
fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
