//! Conversation scripts.
//!
//! A script is a TOML list of `[[step]]` tables, each tagged by `action`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// A single scripted action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Admit `who` to `room` (or the default room), creating the participant.
    Join {
        who: String,
        #[serde(default)]
        room: Option<String>,
    },
    /// Broadcast from `who`.
    Say { who: String, text: String },
    /// Private message from `who` to `to`.
    Whisper { who: String, to: String, text: String },
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Script {
    #[serde(rename = "step", default)]
    pub steps: Vec<Step>,
}

impl Script {
    /// Parse a script from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid script.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse script")
    }

    /// Load a script from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("In script: {}", path.display()))
    }

    /// The built-in demo conversation.
    #[must_use]
    pub fn demo() -> Self {
        let join = |who: &str| Step::Join {
            who: who.to_string(),
            room: None,
        };
        let say = |who: &str, text: &str| Step::Say {
            who: who.to_string(),
            text: text.to_string(),
        };

        Self {
            steps: vec![
                join("Nasim"),
                join("Mehedi"),
                say("Nasim", "Hi"),
                say("Mehedi", "Hei, Nasim"),
                join("Shanto"),
                say("Shanto", "Hi, everyone"),
                Step::Whisper {
                    who: "Nasim".to_string(),
                    to: "Shanto".to_string(),
                    text: "Hei shanto".to_string(),
                },
            ],
        }
    }
}
