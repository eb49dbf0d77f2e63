//! Registry-driven routing from validated requests to executors.
//!
//! The dispatcher is the engine's fault boundary: every outcome, including
//! internal faults and requests for a language nothing is registered for,
//! comes back as a failure `ExecutionResult` rather than an error or panic.

use std::time::Instant;

use crate::core_types::{ExecutionRequest, ExecutionResult, RawExecutionRequest};
use crate::errors::SandboxError;
use crate::executors::ExecutorRegistry;
use crate::normalize;
use crate::validation::validate_request;

pub struct SandboxDispatcher {
    registry: ExecutorRegistry,
}

impl SandboxDispatcher {
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self { registry }
    }

    /// Dispatcher preloaded with the executors for both supported languages.
    pub fn with_default_executors() -> Self {
        Self::new(ExecutorRegistry::with_default_executors())
    }

    /// Validate and execute a raw request. A validation rejection
    /// short-circuits with `executionTimeMs = 0` and echoes the declared
    /// language, whatever it was.
    pub async fn execute(&self, raw: &RawExecutionRequest) -> ExecutionResult {
        match validate_request(raw) {
            Ok(request) => self.execute_validated(&request).await,
            Err(e) => normalize::rejection(&raw.language, e),
        }
    }

    /// Execute an already validated request.
    pub async fn execute_validated(&self, request: &ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();
        log::info!(
            "Dispatching {} execution ({} chars, timeout {}ms, memory limit {}MB)",
            request.language,
            request.code.chars().count(),
            request.timeout_ms,
            request.memory_limit_mb
        );

        // A missing registry entry cannot occur post-validation with the
        // default registry, but a custom registry may not cover every
        // language.
        let outcome = match self.registry.get_executor(request.language) {
            Some(executor) => {
                executor
                    .run(&request.code, request.timeout_ms, request.memory_limit_mb)
                    .await
            }
            None => Err(SandboxError::UnsupportedLanguage(
                request.language.to_string(),
            )),
        };

        normalize::finish(request.language.as_str(), started, outcome)
    }
}

impl Default for SandboxDispatcher {
    fn default() -> Self {
        Self::with_default_executors()
    }
}
