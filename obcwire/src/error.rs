use thiserror::Error;

/// Framing and value errors raised while decoding wire bytes or JSON.
///
/// Unknown fields and unknown enum numbers are not errors; they never
/// reach this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// A varint did not terminate within 10 bytes or ran past the input.
    #[error("malformed varint")]
    MalformedVarint,
    /// A 64-bit value is outside the configured safe-integer range.
    #[error("integer {0} exceeds the safe integer range")]
    IntegerOverflow(i128),
    /// A field claimed more bytes than the message has left.
    #[error("truncated message: needed {needed} bytes, {remaining} remaining")]
    TruncatedMessage { needed: usize, remaining: usize },
    #[error("invalid wire type {0}")]
    InvalidWireType(u8),
    #[error("invalid tag {0:#x}")]
    InvalidTag(u64),
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    /// A zero or END_GROUP tag closed a nested message before its length ran out.
    #[error("nested message terminated at offset {pos}, before its declared end {end}")]
    UnexpectedEndTag { pos: usize, end: usize },
    /// Skipped groups nest deeper than the reader allows.
    #[error("groups nested deeper than {0} levels")]
    GroupTooDeep(usize),
    /// A JSON value could not be coerced to the field's type.
    #[error("invalid JSON at `{path}`: {reason}")]
    InvalidJson { path: String, reason: String },
}

impl WireError {
    pub(crate) fn json(reason: impl Into<String>) -> Self {
        WireError::InvalidJson {
            path: String::new(),
            reason: reason.into(),
        }
    }

    /// Prefix the JSON path of an `InvalidJson` error with `field`.
    pub(crate) fn within(self, field: &str) -> Self {
        match self {
            WireError::InvalidJson { path, reason } => {
                let path = if path.is_empty() {
                    field.to_string()
                } else {
                    format!("{}.{}", field, path)
                };
                WireError::InvalidJson { path, reason }
            }
            other => other,
        }
    }
}

/// Errors surfaced by a unary command call, on either end.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: WireError,
    },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
}

pub type Result<T> = core::result::Result<T, WireError>;
