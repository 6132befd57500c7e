use thiserror::Error;

/// Errors returned by the losses, the decoder, and the evaluation harness.
#[derive(Debug, Error)]
pub enum Error {
    /// Input slice is empty.
    #[error("empty input")]
    EmptyInput,

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable explanation.
        message: &'static str,
    },

    /// Points in a dataset have inconsistent dimensionality.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimensionality.
        expected: usize,
        /// Found dimensionality.
        found: usize,
    },

    /// Two per-point columns disagree on the number of points.
    #[error("length mismatch for {what}: expected {expected}, found {found}")]
    LengthMismatch {
        /// Which column was checked.
        what: &'static str,
        /// Expected number of rows.
        expected: usize,
        /// Found number of rows.
        found: usize,
    },

    /// A loss variant needs a network output that was not provided.
    #[error("missing network output: {0}")]
    MissingOutput(&'static str),

    /// A loss, kernel, or policy name that does not match any implementation.
    #[error("unknown {kind} `{name}`")]
    UnknownVariant {
        /// What was being looked up (e.g. "loss").
        kind: &'static str,
        /// The name that was requested.
        name: String,
    },

    /// Semantic class id outside the configured class range.
    #[error("semantic class {class} out of range (num_classes = {num_classes})")]
    InvalidClass {
        /// Offending class id.
        class: usize,
        /// Configured number of classes.
        num_classes: usize,
    },

    /// Malformed configuration document.
    #[error("config: {0}")]
    Config(#[from] serde_json::Error),

    /// Failure reading a configuration file.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
