//! Request validation for the execution pipeline
//!
//! Every request is checked for shape and bounds before any sandbox resource
//! is allocated, which bounds the blast radius of malformed or hostile input
//! to O(1) work. Validation collects every violated constraint rather than
//! stopping at the first, so a caller can fix a bad request in one round trip.

use crate::core_types::{ExecutionRequest, Language, RawExecutionRequest};
use crate::errors::SandboxError;

pub const MAX_CODE_CHARS: usize = 100_000;

pub const MIN_TIMEOUT_MS: u64 = 100;
pub const MAX_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const MIN_MEMORY_LIMIT_MB: u64 = 8;
pub const MAX_MEMORY_LIMIT_MB: u64 = 512;
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 128;

/// Validate a raw request into an `ExecutionRequest`, applying defaults for
/// absent optional fields.
///
/// Returns a single `SandboxError::Validation` listing every violation,
/// joined with "; ".
pub fn validate_request(raw: &RawExecutionRequest) -> Result<ExecutionRequest, SandboxError> {
    let mut violations = Vec::new();

    if raw.code.trim().is_empty() {
        violations.push("code must not be empty".to_string());
    } else if raw.code.chars().count() > MAX_CODE_CHARS {
        violations.push(format!(
            "code exceeds maximum size of {} characters",
            MAX_CODE_CHARS
        ));
    }

    let language = match raw.language.parse::<Language>() {
        Ok(language) => Some(language),
        Err(e) => {
            violations.push(format!("{}, expected 'javascript' or 'python'", e));
            None
        }
    };

    let timeout_ms = raw.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
        violations.push(format!(
            "timeoutMs must be between {} and {}",
            MIN_TIMEOUT_MS, MAX_TIMEOUT_MS
        ));
    }

    let memory_limit_mb = raw.memory_limit_mb.unwrap_or(DEFAULT_MEMORY_LIMIT_MB);
    if !(MIN_MEMORY_LIMIT_MB..=MAX_MEMORY_LIMIT_MB).contains(&memory_limit_mb) {
        violations.push(format!(
            "memoryLimitMb must be between {} and {}",
            MIN_MEMORY_LIMIT_MB, MAX_MEMORY_LIMIT_MB
        ));
    }

    if !violations.is_empty() {
        let message = violations.join("; ");
        log::warn!("Rejected execution request: {}", message);
        return Err(SandboxError::Validation(message));
    }

    // language is Some whenever violations is empty
    let language = language.ok_or_else(|| {
        SandboxError::Internal("language missing after validation".to_string())
    })?;

    Ok(ExecutionRequest {
        code: raw.code.clone(),
        language,
        timeout_ms,
        memory_limit_mb,
    })
}
