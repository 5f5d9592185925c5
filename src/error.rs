//! Error handling for difficulty retargeting and target validation
//!
//! Three consensus-relevant error kinds (malformed compact targets,
//! insufficient work, invalid parameter sets) plus the plumbing errors the
//! CLI surfaces. All of them are reported to the caller; nothing is retried
//! internally.

use crate::types::{BlockHash, CompactBits, Target};
use thiserror::Error;

/// Result type alias for retargeting operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the retargeting library
#[derive(Error, Debug)]
pub enum Error {
    /// Compact encoding decodes to a negative, zero, overflowing, or
    /// out-of-range target. Callers must reject the block or header.
    #[error("malformed compact target {bits}: {reason}")]
    MalformedTarget { bits: CompactBits, reason: String },

    /// Block hash numerically exceeds the required target. Callers must
    /// reject the block.
    #[error("insufficient work: hash {hash} exceeds target {target}")]
    InsufficientWork { hash: BlockHash, target: Target },

    /// A parameter set violates its invariants. Detected at construction
    /// time and fatal at startup, never deferred to per-block checks.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Chain index errors (dangling previous links, missing ancestors)
    #[error("chain index error: {message}")]
    Chain { message: String },

    /// Parse errors for hex-encoded values
    #[error("parse error: {message}")]
    Parse { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML snapshot parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a malformed target error
    pub fn malformed_target(bits: CompactBits, reason: impl Into<String>) -> Self {
        Self::MalformedTarget {
            bits,
            reason: reason.into(),
        }
    }

    /// Create an insufficient work error
    pub fn insufficient_work(hash: BlockHash, target: Target) -> Self {
        Self::InsufficientWork { hash, target }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a chain index error
    pub fn chain(message: impl Into<String>) -> Self {
        Self::Chain {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// True for errors that reject a candidate block under consensus rules,
    /// as opposed to local configuration or plumbing failures.
    pub fn is_consensus_rejection(&self) -> bool {
        matches!(
            self,
            Error::MalformedTarget { .. } | Error::InsufficientWork { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::MalformedTarget { .. } => "malformed_target",
            Error::InsufficientWork { .. } => "insufficient_work",
            Error::Config { .. } => "config",
            Error::Chain { .. } => "chain",
            Error::Parse { .. } => "parse",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Io(_) => "io",
        }
    }
}
