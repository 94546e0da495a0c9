//! Error taxonomy and the closed set of raw error shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};

use super::SubtrackError;

/// Broad failure category used for messaging and recovery decisions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Network,
    Auth,
    Database,
    Permission,
    Unknown,
}

impl ErrorKind {
    /// Whether the user can do something about a failure of this kind.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::Validation | Self::Network | Self::Auth)
    }
}

/// A raw failure as handed to the error pipeline.
///
/// Remote collaborators report errors in several loose shapes; they are
/// normalised into one of these variants before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSource {
    /// A bare message string.
    Message(String),
    /// `{ message, code }` as returned by most remote stores.
    Structured {
        message: String,
        code: Option<String>,
    },
    /// `{ error: { ... } }` wrapper used by some providers.
    Nested(Box<ErrorSource>),
    /// Nothing readable could be extracted.
    Empty,
}

impl ErrorSource {
    /// Human-readable message, unwrapping nested shapes.
    pub fn message(&self) -> &str {
        match self {
            Self::Message(message) => message,
            Self::Structured { message, .. } => message,
            Self::Nested(inner) => inner.message(),
            Self::Empty => "",
        }
    }

    /// Provider code, if the shape carried one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Structured { code, .. } => code.as_deref(),
            Self::Nested(inner) => inner.code(),
            Self::Message(_) | Self::Empty => None,
        }
    }

    /// Normalise an arbitrary JSON error payload.
    ///
    /// A top-level `message` wins over a nested `error` object. Anything
    /// without a readable message becomes [`ErrorSource::Empty`].
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(message) => Self::Message(message.clone()),
            Value::Object(map) => {
                let message = ["message", "msg", "error_description"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str));
                if let Some(message) = message {
                    let code = map.get("code").and_then(|code| match code {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    });
                    return Self::Structured {
                        message: message.to_string(),
                        code,
                    };
                }
                match map.get("error") {
                    Some(inner @ (Value::Object(_) | Value::String(_))) => {
                        Self::Nested(Box::new(Self::from_json(inner)))
                    }
                    _ => Self::Empty,
                }
            }
            _ => Self::Empty,
        }
    }
}

impl From<&str> for ErrorSource {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<String> for ErrorSource {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<Value> for ErrorSource {
    fn from(value: Value) -> Self {
        Self::from_json(&value)
    }
}

impl From<&Value> for ErrorSource {
    fn from(value: &Value) -> Self {
        Self::from_json(value)
    }
}

impl From<&SubtrackError> for ErrorSource {
    fn from(error: &SubtrackError) -> Self {
        match error.code() {
            Some(code) => Self::Structured {
                message: error.to_string(),
                code: Some(code),
            },
            None => Self::Message(error.to_string()),
        }
    }
}

impl From<SubtrackError> for ErrorSource {
    fn from(error: SubtrackError) -> Self {
        Self::from(&error)
    }
}
