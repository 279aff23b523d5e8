use thiserror::Error;

pub type Result<T> = std::result::Result<T, BinderyError>;

#[derive(Debug, Error)]
pub enum BinderyError {
    #[error("invalid controller definition `{name}`: {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("`{key}` is {slot} and has no setter")]
    NotWritable { key: String, slot: &'static str },

    #[error("unknown key `{key}`")]
    UnknownKey { key: String },

    #[error("path `{path}` does not hold an object at `{segment}`")]
    NotAnObject { path: String, segment: String },

    #[error("cannot apply `{kind}` binding: {reason}")]
    Apply { kind: String, reason: String },

    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BinderyError {
    #[must_use]
    pub fn invalid_definition(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn apply(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Apply {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            reason: reason.into(),
        }
    }

    /// Whether this error is fatal to controller construction.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidDefinition { .. })
    }
}
