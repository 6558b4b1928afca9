//! Error types for the reduction stack
//!
//! Per-record faults (`LabelError`) are reported and skipped by callers;
//! configuration and model-file errors surface at setup time.

use std::io;

/// Label codec failures
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    /// Fewer bytes than one label record; callers treat this as end of input
    #[error("short read: label record needs {needed} bytes, {available} available")]
    ShortRead { needed: usize, available: usize },

    /// Text label with more tokens than `<value> [weight]`
    #[error("malformed label: expected at most 2 tokens, got {tokens}")]
    Malformed { tokens: usize },
}

/// Setup-time configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// `--bs 0`
    #[error("bootstrap needs at least one replicate (got 0)")]
    ZeroReplicates,

    /// Neither the command line nor a loaded model supplied k
    #[error("replicate count is required: pass --bs or load a model that records it")]
    MissingReplicates,

    #[error("bit precision {bits} is out of range (1..={max})")]
    BitsOutOfRange { bits: u32, max: u32 },

    /// `2^bits * stride * k` does not fit the address space
    #[error("weight table of 2^{bits} x {stride} x {replicas} entries is too large")]
    WeightSpaceTooLarge { bits: u32, stride: u32, replicas: u64 },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Model file errors
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("invalid model file: bad magic")]
    BadMagic,

    #[error("unsupported model version: {0}")]
    UnsupportedVersion(u32),

    #[error("invalid model header: {0}")]
    Header(#[from] serde_json::Error),

    /// Weight count differs from what the persisted options imply
    #[error("weight dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The learner stack has no weight vector to load into or save from
    #[error("learner stack does not own a weight vector")]
    NoWeights,
}

/// Result type for model persistence
pub type ModelResult<T> = Result<T, ModelError>;
