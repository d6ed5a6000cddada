//! FFI Error Types
//!
//! Load-time failures ([`BindError`]) are kept apart from call-time failures
//! ([`CallError`]) so a missing symbol can never be mistaken for a failed
//! remote operation.

use thiserror::Error;

use super::types::FfiType;

/// Failure while loading the library or synthesizing a binding.
///
/// Fatal for the affected binding: no [`BoundFunction`](super::BoundFunction)
/// exists when one of these is returned.
#[derive(Debug, Clone, Error)]
pub enum BindError {
    #[error("Failed to load library '{path}': {message}")]
    LibraryLoad { path: String, message: String },

    #[error("Symbol '{symbol}' not found in '{library}'")]
    SymbolNotFound { symbol: String, library: String },

    #[error("Invalid symbol name: {0}")]
    InvalidSymbol(String),

    #[error("Invalid signature '{signature}': {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("Parameter '{param}' declared twice in '{function}'")]
    DuplicateParam { function: String, param: String },

    #[error("Symbol '{0}' registered twice")]
    DuplicateSymbol(String),

    #[error("Too many parameters for '{function}': {count} (max {max})")]
    TooManyParams {
        function: String,
        count: usize,
        max: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A checked libconcord call returned a nonzero code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("libconcord function '{function}' failed with error code {code} ({message})")]
pub struct RemoteOperationError {
    /// Name of the bound function that failed
    pub function: String,
    /// Raw code returned by the library
    pub code: i32,
    /// Message from the library's own lookup, or "Unknown"
    pub message: String,
}

/// An output parameter was given something other than an
/// [`OutSlot`](super::OutSlot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("output parameters must be passed as an OutSlot large enough for their type")]
pub struct MalformedHandle;

/// Failure of a single call through a bound function.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error(transparent)]
    Remote(#[from] RemoteOperationError),

    #[error("Malformed output handle for '{param}' in '{function}'")]
    MalformedHandle { function: String, param: String },

    #[error("Invalid argument count for '{function}': expected {expected}, got {got}")]
    InvalidArgCount {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid argument for '{param}' in '{function}': expected {expected}")]
    InvalidArgType {
        function: String,
        param: String,
        expected: FfiType,
    },

    #[error("Too many arguments: {0}")]
    TooManyArgs(usize),

    #[error("Function not bound: {0}")]
    UnknownFunction(String),
}

impl CallError {
    /// The remote failure, if this error came from the result checker.
    pub fn as_remote(&self) -> Option<&RemoteOperationError> {
        match self {
            CallError::Remote(err) => Some(err),
            _ => None,
        }
    }
}
