//! Errors

use thiserror::Error;

/// Result type used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while compiling, preparing, binding or decoding statements.
///
/// `Build` and `Configuration` errors are always raised before a statement is
/// handed to the cache, so a failing call never partially executes.
#[derive(Error, Debug)]
pub enum Error {
    /// Entity metadata cannot be turned into SQL (unmapped type, malformed
    /// join table, DTO field without a matching property, missing identity).
    #[error("build error: {0}")]
    Build(String),

    /// The repository or query declaration is incomplete or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The operation is declared but deliberately not implemented.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A runtime value does not fit the shape it is bound or decoded into.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Raised by the cache or cursor collaborator and passed through as is.
    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn build(message: impl Into<String>) -> Self {
        Self::Build(message.into())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub(crate) fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Conversion(err.to_string())
    }
}
