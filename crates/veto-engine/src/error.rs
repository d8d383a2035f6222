//! Construction-time errors surfaced synchronously to whoever registers rules.

use crate::request::CallbackId;

/// A glob, regex or URL pattern that could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid pattern '{pattern}': {reason}")]
pub struct PatternError {
    pub pattern: String,
    pub reason: String,
}

impl PatternError {
    pub fn new(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn from_regex(pattern: &str, err: regex::Error) -> Self {
        Self::new(pattern, err.to_string())
    }
}

/// Errors rejecting a rule registration. A rejected rule is never registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("Unknown request detail path '{0}'")]
    UnknownDetailPath(String),
    #[error("Invalid redirect URL '{url}': {reason}")]
    InvalidRedirect { url: String, reason: String },
    #[error("Callback id '{0}' is already registered")]
    DuplicateCallbackId(CallbackId),
    #[error("Dispatcher has been shut down")]
    ShutDown,
}
