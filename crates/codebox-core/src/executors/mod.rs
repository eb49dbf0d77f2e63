//! Execution environments for sandboxed guest-code evaluation.
//!
//! Provides isolated execution contexts for running untrusted code, either
//! in-process through a memory-capped V8 isolate or out-of-process through a
//! hardened interpreter subprocess. Executors are registered per guest
//! language; adding a language means registering another implementation, not
//! adding branches.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core_types::Language;
use crate::errors::SandboxError;

pub mod interpreter;
pub mod isolate;

pub use interpreter::InterpreterExecutor;
pub use isolate::IsolateExecutor;

/// What a successful run produced, before normalization.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub output: String,
    /// Best-effort heap usage; only the isolate executor can measure it.
    pub memory_used_mb: Option<f64>,
}

/// A sandboxed executor for one guest language.
///
/// Implementations create a fresh execution context per call and tear it
/// down before returning, win or lose. Every fault must come back as a
/// `SandboxError`; nothing may escape as a panic or unhandled error.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(
        &self,
        code: &str,
        timeout_ms: u64,
        memory_limit_mb: u64,
    ) -> Result<RunOutput, SandboxError>;
}

/// Registry mapping each guest language to its executor.
pub struct ExecutorRegistry {
    executors: HashMap<Language, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registry preloaded with the executors for both supported languages.
    pub fn with_default_executors() -> Self {
        let mut registry = Self::new();
        registry.register_executor(Language::JavaScript, Arc::new(IsolateExecutor::new()));
        registry.register_executor(Language::Python, Arc::new(InterpreterExecutor::new()));
        registry
    }

    pub fn register_executor(&mut self, language: Language, executor: Arc<dyn Executor>) {
        self.executors.insert(language, executor);
    }

    pub fn get_executor(&self, language: Language) -> Option<Arc<dyn Executor>> {
        self.executors.get(&language).cloned()
    }

    pub fn executor_count(&self) -> usize {
        self.executors.len()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::with_default_executors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let registry = ExecutorRegistry::new();
        assert_eq!(registry.executor_count(), 0);
        assert!(registry.get_executor(Language::JavaScript).is_none());
    }

    #[test]
    fn test_default_registry_covers_both_languages() {
        let registry = ExecutorRegistry::with_default_executors();
        assert_eq!(registry.executor_count(), 2);
        assert!(registry.get_executor(Language::JavaScript).is_some());
        assert!(registry.get_executor(Language::Python).is_some());
    }

    #[test]
    fn test_register_replaces_existing_executor() {
        let mut registry = ExecutorRegistry::with_default_executors();
        registry.register_executor(Language::Python, Arc::new(InterpreterExecutor::new()));
        assert_eq!(registry.executor_count(), 2);
    }
}
