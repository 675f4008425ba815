//! chat look + behaviour knobs. every field has a default so a partial json
//! file (or none at all) works.

use crate::bubble::{BubbleStyle, Role, Side};
use bevy::prelude::Resource;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Resource, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub player_color: [u8; 4],
    pub assistant_color: [u8; 4],
    pub font_color: [u8; 4],
    pub font_size: f32,
    pub bubble_width: f32,
    pub text_padding: f32,
    pub bubble_spacing: f32,
    /// visible rows in the input box.
    pub input_lines: u32,
    pub player_side: Side,
    pub assistant_side: Side,

    /// assistant placeholder while a response is pending.
    pub working_marker: String,
    pub loading_placeholder: String,
    pub ready_placeholder: String,
    pub degraded_placeholder: String,
    pub error_prefix: String,

    /// release input after a failed warm-up instead of staying blocked.
    pub allow_degraded_input: bool,
    /// stream partial text from the llm backend.
    pub stream: bool,
    /// sent once at startup by the llm backend; `None` skips the round trip.
    pub warmup_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            player_color: [81, 164, 81, 255],
            assistant_color: [29, 29, 73, 255],
            font_color: [255, 255, 255, 255],
            font_size: 16.0,
            bubble_width: 600.0,
            text_padding: 10.0,
            bubble_spacing: 10.0,
            input_lines: 4,
            player_side: Side::Left,
            assistant_side: Side::Right,
            working_marker: "...".into(),
            loading_placeholder: "Loading...".into(),
            ready_placeholder: "Message me".into(),
            degraded_placeholder: "Message me anyway".into(),
            error_prefix: "error: ".into(),
            allow_degraded_input: true,
            stream: true,
            warmup_prompt: None,
        }
    }
}

impl ChatConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn style_for(&self, role: Role) -> BubbleStyle {
        let (bubble_color, side) = match role {
            Role::User => (self.player_color, self.player_side),
            Role::Assistant => (self.assistant_color, self.assistant_side),
        };
        BubbleStyle {
            bubble_color,
            font_color: self.font_color,
            font_size: self.font_size,
            width: self.bubble_width,
            padding: self.text_padding,
            spacing: self.bubble_spacing,
            side,
        }
    }
}
