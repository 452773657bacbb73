use serde::{Deserialize, Serialize};

use crate::error::{Result, WireError};

/// Largest integer a double-based JSON peer can represent exactly.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// How 64-bit integer fields are admitted at the wire and JSON boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Int64Policy {
    /// Reject magnitudes above 2^53-1 with `IntegerOverflow`.
    #[default]
    SafeInteger,
    /// Accept the full 64-bit range.
    Native,
}

/// Codec settings, passed explicitly to every reader and JSON import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub int64: Int64Policy,
}

impl CodecConfig {
    pub const fn native() -> Self {
        CodecConfig {
            int64: Int64Policy::Native,
        }
    }

    pub fn check_u64(&self, v: u64) -> Result<u64> {
        match self.int64 {
            Int64Policy::SafeInteger if v > MAX_SAFE_INTEGER => {
                Err(WireError::IntegerOverflow(v as i128))
            }
            _ => Ok(v),
        }
    }

    pub fn check_i64(&self, v: i64) -> Result<i64> {
        match self.int64 {
            Int64Policy::SafeInteger if v.unsigned_abs() > MAX_SAFE_INTEGER => {
                Err(WireError::IntegerOverflow(v as i128))
            }
            _ => Ok(v),
        }
    }
}
