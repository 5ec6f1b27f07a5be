use std::fmt;

/// An error in an action expression.
///
/// Carries the full source text and the byte offset of the failure so callers
/// can report both the consumed prefix and the unparsed remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
    pub source: String,
}

impl ParseError {
    pub fn new(source: &str, offset: usize, message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
            offset: offset.min(source.len()),
            source: source.to_owned(),
        }
    }

    /// Text successfully consumed before the failure.
    pub fn consumed(&self) -> &str {
        &self.source[..self.offset]
    }

    /// Text left unparsed at the failure.
    pub fn remainder(&self) -> &str {
        &self.source[self.offset..]
    }

    /// Two-line rendering of the source with a caret under the failure column.
    pub fn pointer(&self) -> String {
        let column = self.consumed().chars().count();
        format!("{}\n{}^", self.source, " ".repeat(column))
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)?;
        if !self.remainder().is_empty() {
            write!(f, " near '{}'", self.remainder().trim_end())?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Errors raised while discovering actions and grouping them into units.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid expression for action '{key}' in unit '{unit}': {error}")]
    Parse {
        unit: String,
        key: String,
        #[source]
        error: ParseError,
    },

    #[error("invalid action key '{key}'")]
    InvalidKey { key: String },

    #[error("action '{key}' in unit '{unit}' already has a variant with the same tags")]
    DuplicateVariant { unit: String, key: String },

    /// A source-specific failure (unreadable manifest, malformed registry, ...).
    #[error("{0}")]
    Source(String),
}
