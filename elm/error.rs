use thiserror::Error;

/// Every failure the ELM core can report. None of these are retried; they
/// propagate to the caller with the operation name and the shapes involved.
#[derive(Error, Debug)]
pub enum ElmError {
    #[error("Invalid input to {operation}: {reason}")]
    InvalidInput {
        operation: &'static str,
        reason: String,
    },

    #[error("Numerical instability in {operation}: {detail}")]
    NumericInstability {
        operation: &'static str,
        detail: String,
    },

    #[error("Shape mismatch in {operation}: expected {expected}, found {found}")]
    ShapeMismatch {
        operation: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("The array '{0}' was not found in the matrix archive. Please check the key name.")]
    MissingArray(String),

    #[error("Failed to read or write file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML file: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl ElmError {
    pub(crate) fn invalid(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn unstable(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::NumericInstability {
            operation,
            detail: detail.into(),
        }
    }
}
