//! Sandboxed execution engine for running untrusted guest code.
//!
//! This crate provides the core primitive an agent framework needs to let a
//! model request execution of short, untrusted code snippets and receive
//! captured output back, without that code gaining access to the host's
//! filesystem, network, environment variables, or ambient credentials.
//!
//! # Architecture Overview
//!
//! The engine is organized around a small, stateless pipeline:
//!
//! - **Request validation**: shape and bounds checks before any sandbox
//!   resource is allocated
//! - **Dispatch**: registry-driven routing from a validated request to the
//!   executor registered for its guest language
//! - **Execution environments**: a memory-capped V8 isolate for JavaScript
//!   and a hardened interpreter subprocess for Python, both torn down at the
//!   end of every call
//! - **Result normalization**: every path out of the engine, including
//!   rejections and internal faults, produces one `ExecutionResult` shape

pub mod core_types;
pub mod dispatcher;
pub mod errors;
pub mod executors;
pub mod normalize;
pub mod validation;

pub use core_types::{
    ExecutionRequest, ExecutionResult, Language, RawExecutionRequest, NO_OUTPUT,
};
pub use dispatcher::SandboxDispatcher;
pub use errors::SandboxError;
pub use executors::{Executor, ExecutorRegistry, RunOutput};
pub use validation::validate_request;
