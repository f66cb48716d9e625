//! Error types for the rules engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type RuleResult<T> = Result<T, RuleError>;

/// Errors raised while parsing, checking, or loading rules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("unsafe rule '{rule}': {message}")]
    Unsafe { rule: String, message: String },

    #[error("program is not stratifiable: negation cycle through '{0}'")]
    NotStratifiable(String),
}

impl RuleError {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        RuleError::Syntax {
            line,
            message: message.into(),
        }
    }
}
