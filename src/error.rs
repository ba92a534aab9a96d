// src/error.rs
//! Error handling for the culling engine.
//!
//! - Enum discriminant (cheap match), allocations only on error paths.
//! - World-access uncertainty is *not* an error: unloaded data is modelled
//!   as `Option` at the `WorldView` boundary and resolves fail-open.

use thiserror::Error;

/// Main error type. Lightweight, `Send + Sync + 'static`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Integer parsing failures (config hot reload).
    #[error("integer parse error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    /// Float parsing failures (config hot reload).
    #[error("float parse error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    /// Boolean parsing failures (config hot reload).
    #[error("boolean parse error: {0}")]
    ParseBool(#[from] std::str::ParseBoolError),

    /// A configuration key this engine does not know.
    #[error("unknown config option: {0}")]
    UnknownOption(String),

    /// Simple custom message (allocation only when the error happens).
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Create a custom error message.
    #[inline]
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::Custom(msg.into())
    }

    #[inline]
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            Error::ParseInt(_) | Error::ParseFloat(_) | Error::ParseBool(_)
        )
    }
}

/// Convenient `Result` alias; use `permafrost::Result<T>` everywhere.
pub type Result<T> = std::result::Result<T, Error>;
