// src/types.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::controller::Mode;

/// Class discriminator attached to collected rows.
///
/// Integers sort before text, integers numerically, text lexicographically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Text(String),
}

impl Label {
    /// Parses operator input: integers stay integers, anything else is text.
    /// Blank input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(match trimmed.parse::<i64>() {
            Ok(value) => Label::Int(value),
            Err(_) => Label::Text(trimmed.to_owned()),
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Label::Text(text) if text.trim().is_empty())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(value) => write!(f, "{value}"),
            Label::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Label::Int(value)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label::Text(value.to_owned())
    }
}

/// One help line for a command.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandHelp {
    pub key: char,
    pub description: &'static str,
}

/// Controller -> operator notifications.
#[derive(Clone, Debug)]
pub enum ControllerEvent {
    ModeSwitched(Mode),
    CommandExecuted {
        key: char,
        summary: &'static str,
    },
    CommandNotFound(String),
    CommandFailed {
        key: char,
        error: String,
    },
    CollectionStatus {
        label: Option<Label>,
        steps: usize,
    },
    PredictionStatus {
        index: u64,
        label: Label,
        // (label, probability) in code order, only when probabilities are shown
        probabilities: Option<Vec<(Label, f64)>>,
    },
    Help {
        mode: Mode,
        commands: Vec<CommandHelp>,
    },
    Metadata(String),
    ClearScreen,
}
