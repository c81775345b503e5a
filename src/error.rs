//! Dispatch errors

use thiserror::Error;

use crate::types::Kind;

/// Errors reported by the dispatcher.
///
/// Construction errors (`LibraryNotFound`, `InvalidHandle`) are fatal to the
/// instance being built. Everything else is per call and leaves the caches
/// exactly as they were before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Library '{name}' not found: {reason}")]
    LibraryNotFound { name: String, reason: String },

    #[error("Invalid library handle: null")]
    InvalidHandle,

    #[error("Symbol '{symbol}' not found: {reason}")]
    SymbolNotFound { symbol: String, reason: String },

    #[error(
        "Call to '{symbol}' must specify the return type or discard the result"
    )]
    AmbiguousReturnType { symbol: String },

    #[error("Unsupported signature {signature}: {reason}")]
    UnsupportedSignature { signature: String, reason: String },

    #[error("Invalid argument count: expected {expected}, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("Argument {index} contains an interior NUL byte")]
    InvalidString { index: usize },

    #[error("Return type mismatch: expected {expected}, got {got}")]
    ReturnMismatch { expected: Kind, got: Kind },

    #[error("Failed to close library: {0}")]
    CloseFailed(String),
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
