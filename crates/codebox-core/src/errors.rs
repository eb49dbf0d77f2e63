//! Error types for failure handling across the execution engine
//!
//! Every fault in the engine is expressed as a `SandboxError` and caught at
//! the executor boundary; nothing propagates past the dispatcher as an
//! unhandled error. The `#[error]` strings double as the caller-facing
//! category contract: validation failures begin with "Validation error:",
//! timeouts contain "timed out", memory failures contain "Memory limit
//! exceeded", and a missing interpreter is distinguishable from a guest
//! runtime error, so callers can branch without parsing stack traces.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SandboxError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("{0}")]
    Syntax(String),
    #[error("{0}")]
    Runtime(String),
    #[error("Execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Memory limit exceeded ({limit_mb}MB)")]
    MemoryLimit { limit_mb: u64 },
    #[error("{interpreter} interpreter not installed or not found: {detail}")]
    InterpreterMissing { interpreter: String, detail: String },
    #[error("no executor registered for language '{0}'")]
    UnsupportedLanguage(String),
    #[error("sandbox internal failure: {0}")]
    Internal(String),
}
