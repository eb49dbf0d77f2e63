//! JavaScript executor backed by per-call V8 isolates.
//!
//! Each run gets a brand new `JsRuntime` with a hard heap ceiling and no
//! host capabilities: the bootstrap deletes `Deno`, pins the usual host
//! symbols (`require`, `process`, `fetch`, ...) to `undefined`, and installs
//! a frozen `console` whose calls are forwarded one line at a time into a
//! buffer owned by the current call. Wall-clock timeouts are enforced with an
//! engine-level interrupt from a watchdog thread; guest code is never trusted
//! to cooperate with its own termination.
//!
//! V8 isolates are `!Send`, so all JsRuntime operations run on a dedicated
//! thread with its own single-threaded tokio runtime. The public API is
//! fully async and `Send`-safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deno_core::{op2, v8, JsRuntime, OpState, PollEventLoopOptions, RuntimeOptions};

use super::{Executor, RunOutput};
use crate::errors::SandboxError;

/// Ordered log lines bridged out of the isolate, scoped to a single call.
#[derive(Default)]
struct ConsoleBuffer {
    lines: Vec<String>,
}

/// Completion value of the guest snippet, already formatted guest-side.
#[derive(Default)]
struct CompletionValue(Option<String>);

#[op2(fast)]
fn op_codebox_console_line(state: &mut OpState, #[string] line: String) {
    state.borrow_mut::<ConsoleBuffer>().lines.push(line);
}

#[op2(fast)]
fn op_codebox_complete(state: &mut OpState, #[string] value: String) {
    state.borrow_mut::<CompletionValue>().0 = Some(value);
}

deno_core::extension!(
    codebox_ext,
    ops = [op_codebox_console_line, op_codebox_complete],
);

/// Installs the console bridge and strips host capabilities. Objects are
/// pretty-printed, primitives stringified; warn/error lines are tagged.
/// References to host-only symbols must evaluate to `undefined` rather than
/// functioning or throwing.
const BOOTSTRAP: &str = r#"
((ops) => {
    const pushLine = (line) => ops.op_codebox_console_line(line);
    const report = (value) => ops.op_codebox_complete(value);

    const formatValue = (value) => {
        if (typeof value === "object" && value !== null) {
            try {
                return JSON.stringify(value, null, 2);
            } catch (_) {
                return String(value);
            }
        }
        return String(value);
    };
    const formatArgs = (args) => args.map(formatValue).join(" ");

    globalThis.console = Object.freeze({
        log: (...args) => pushLine(formatArgs(args)),
        info: (...args) => pushLine(formatArgs(args)),
        warn: (...args) => pushLine("[WARN] " + formatArgs(args)),
        error: (...args) => pushLine("[ERROR] " + formatArgs(args)),
    });

    globalThis.__codebox_complete = (value) => {
        if (value !== undefined && value !== null) {
            report(formatValue(value));
        }
    };

    delete globalThis.Deno;

    for (const name of [
        "require", "process", "module", "exports",
        "fetch", "XMLHttpRequest", "WebSocket",
    ]) {
        Object.defineProperty(globalThis, name, {
            value: undefined, writable: false, configurable: false,
        });
    }
})(Deno.core.ops);
"#;

/// State for the near-heap-limit callback.
struct HeapLimitState {
    handle: v8::IsolateHandle,
    triggered: AtomicBool,
}

/// V8 near-heap-limit callback. Terminates execution and grants 1MB grace
/// so the termination can propagate instead of aborting the process.
extern "C" fn near_heap_limit_callback(
    data: *mut std::ffi::c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` points to the Box<HeapLimitState> owned by `run_isolate`,
    // which outlives the runtime; V8 only invokes this callback while the
    // isolate is executing. `triggered` is atomic, so a shared reference is
    // sufficient even for re-entrant calls.
    let state = unsafe { &*(data as *const HeapLimitState) };
    if !state.triggered.swap(true, Ordering::SeqCst) {
        state.handle.terminate_execution();
    }
    current_heap_limit + 1024 * 1024
}

/// Executor for the JavaScript guest language.
pub struct IsolateExecutor;

impl IsolateExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IsolateExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for IsolateExecutor {
    async fn run(
        &self,
        code: &str,
        timeout_ms: u64,
        memory_limit_mb: u64,
    ) -> Result<RunOutput, SandboxError> {
        let code = code.to_string();

        // V8 isolates are !Send, so everything runs on a dedicated thread.
        let (tx, rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = tx.send(Err(SandboxError::Internal(format!(
                        "failed to build isolate thread runtime: {}",
                        e
                    ))));
                    return;
                }
            };
            let result = rt.block_on(run_isolate(&code, timeout_ms, memory_limit_mb));
            if tx.send(result).is_err() {
                log::warn!("isolate result receiver dropped before result was sent");
            }
        });

        rx.await
            .map_err(|_| SandboxError::Internal("isolate thread panicked".to_string()))?
    }
}

/// Run one snippet in a fresh isolate on the current thread. Must be called
/// from the dedicated isolate thread, not the caller's runtime.
async fn run_isolate(
    code: &str,
    timeout_ms: u64,
    memory_limit_mb: u64,
) -> Result<RunOutput, SandboxError> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);

    let create_params =
        v8::CreateParams::default().heap_limits(0, (memory_limit_mb as usize) * 1024 * 1024);
    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![codebox_ext::init_ops()],
        create_params: Some(create_params),
        ..Default::default()
    });
    runtime.op_state().borrow_mut().put(ConsoleBuffer::default());
    runtime.op_state().borrow_mut().put(CompletionValue::default());

    runtime
        .execute_script("[codebox:bootstrap]", BOOTSTRAP)
        .map_err(|e| SandboxError::Internal(format!("bootstrap failed: {}", e)))?;

    // --- Heap limit callback ---
    let heap_state = Box::new(HeapLimitState {
        handle: runtime.v8_isolate().thread_safe_handle(),
        triggered: AtomicBool::new(false),
    });
    runtime.v8_isolate().add_near_heap_limit_callback(
        near_heap_limit_callback,
        &*heap_state as *const HeapLimitState as *mut std::ffi::c_void,
    );

    // Expression-vs-statement: compile a non-invoking probe. If the snippet
    // parses as the body of an arrow function it is a bare expression and its
    // value is captured; otherwise it runs as an immediately invoked block so
    // declarations and control flow are legal.
    let probe = format!("(() => (\n{}\n))", code);
    let is_expression = runtime.execute_script("[codebox:probe]", probe).is_ok();

    let wrapped = if is_expression {
        format!("__codebox_complete((\n{}\n));", code)
    } else {
        format!("__codebox_complete((() => {{\n{}\n}})());", code)
    };

    // --- Watchdog: engine-level interrupt at the wall-clock deadline ---
    let watchdog_handle = runtime.v8_isolate().thread_safe_handle();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog_timed_out = timed_out.clone();
    let timeout = Duration::from_millis(timeout_ms);
    let (cancel_tx, cancel_rx) = std::sync::mpsc::channel::<()>();

    let watchdog = std::thread::spawn(move || {
        if let Err(std::sync::mpsc::RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(timeout) {
            watchdog_timed_out.store(true, Ordering::SeqCst);
            watchdog_handle.terminate_execution();
        }
    });

    // --- Execute, then drive the event loop within the remaining deadline ---
    let exec_error = match runtime.execute_script("[codebox:execute]", wrapped) {
        Ok(_) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(
                remaining,
                runtime.run_event_loop(PollEventLoopOptions::default()),
            )
            .await
            {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => {
                    timed_out.store(true, Ordering::SeqCst);
                    None
                }
            }
        }
        Err(e) => Some(e.to_string()),
    };

    // The watchdog must be joined before the runtime is dropped so the
    // IsolateHandle is not used after free.
    let _ = cancel_tx.send(());
    let _ = watchdog.join();

    let mut stats = v8::HeapStatistics::default();
    runtime.v8_isolate().get_heap_statistics(&mut stats);
    let memory_used_mb = stats.used_heap_size() as f64 / (1024.0 * 1024.0);

    let (lines, completion) = {
        let state_rc = runtime.op_state();
        let mut state = state_rc.borrow_mut();
        let buffer = state.take::<ConsoleBuffer>();
        let completion = state.take::<CompletionValue>();
        (buffer.lines, completion.0)
    };

    // Reclaim the isolate heap now rather than waiting on a collector.
    drop(runtime);

    if heap_state.triggered.load(Ordering::SeqCst) {
        return Err(SandboxError::MemoryLimit {
            limit_mb: memory_limit_mb,
        });
    }
    if timed_out.load(Ordering::SeqCst) {
        return Err(SandboxError::Timeout { timeout_ms });
    }
    if let Some(message) = exec_error {
        if message.contains("SyntaxError") {
            return Err(SandboxError::Syntax(message));
        }
        return Err(SandboxError::Runtime(message));
    }

    let mut output_lines = lines;
    if let Some(value) = completion {
        output_lines.push(value);
    }

    Ok(RunOutput {
        output: output_lines.join("\n"),
        memory_used_mb: Some(memory_used_mb),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> IsolateExecutor {
        IsolateExecutor::new()
    }

    #[tokio::test]
    async fn test_console_log_is_captured() {
        let result = executor()
            .run("console.log('Hello, World!');", 5000, 128)
            .await
            .unwrap();
        assert!(result.output.contains("Hello, World!"));
        assert!(result.memory_used_mb.is_some());
    }

    #[tokio::test]
    async fn test_bare_expression_value_is_captured() {
        let result = executor().run("1 + 1", 5000, 128).await.unwrap();
        assert_eq!(result.output, "2");
    }

    #[tokio::test]
    async fn test_statement_block_with_declarations() {
        let code = "const x = 21;\nconst y = x * 2;\nconsole.log(y);";
        let result = executor().run(code, 5000, 128).await.unwrap();
        assert_eq!(result.output, "42");
    }

    #[tokio::test]
    async fn test_explicit_return_from_statement_block() {
        let code = "const parts = ['a', 'b'];\nreturn parts.join('-');";
        let result = executor().run(code, 5000, 128).await.unwrap();
        assert_eq!(result.output, "a-b");
    }

    #[tokio::test]
    async fn test_objects_are_pretty_printed() {
        let result = executor()
            .run("console.log({answer: 42})", 5000, 128)
            .await
            .unwrap();
        assert!(result.output.contains("\"answer\": 42"));
    }

    #[tokio::test]
    async fn test_warn_and_error_lines_are_tagged() {
        let code = "console.warn('careful'); console.error('broken');";
        let result = executor().run(code, 5000, 128).await.unwrap();
        assert!(result.output.contains("[WARN] careful"));
        assert!(result.output.contains("[ERROR] broken"));
    }

    #[tokio::test]
    async fn test_undefined_completion_is_not_appended() {
        let result = executor().run("const x = 1;", 5000, 128).await.unwrap();
        assert_eq!(result.output, "");
    }

    #[tokio::test]
    async fn test_busy_loop_times_out() {
        let start = Instant::now();
        let err = executor()
            .run("while (true) {}", 500, 128)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { timeout_ms: 500 }));
        assert!(err.to_string().contains("timed out"));
        assert!(start.elapsed() < Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_heap_limit_is_enforced() {
        let code = r#"
            const chunks = [];
            while (true) {
                chunks.push(new Array(100000).fill('x'));
            }
        "#;
        let err = executor().run(code, 10000, 16).await.unwrap_err();
        assert!(matches!(err, SandboxError::MemoryLimit { limit_mb: 16 }));
        assert!(err.to_string().contains("Memory limit exceeded"));
    }

    #[tokio::test]
    async fn test_thrown_errors_are_reported() {
        let err = executor()
            .run("throw new Error('intentional test error');", 5000, 128)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Runtime(_)));
        assert!(err.to_string().contains("intentional test error"));
    }

    #[tokio::test]
    async fn test_parse_errors_are_classified_as_syntax() {
        let err = executor()
            .run("const = broken {", 5000, 128)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Syntax(_)));
    }

    #[tokio::test]
    async fn test_host_symbols_evaluate_to_undefined() {
        let code = "[typeof require, typeof process, typeof fetch].join(',')";
        let result = executor().run(code, 5000, 128).await.unwrap();
        assert_eq!(result.output, "undefined,undefined,undefined");
    }

    #[tokio::test]
    async fn test_deno_global_is_not_accessible() {
        let code = "Object.getOwnPropertyNames(globalThis).includes('Deno')";
        let result = executor().run(code, 5000, 128).await.unwrap();
        assert_eq!(result.output, "false");
    }

    #[tokio::test]
    async fn test_environment_is_not_readable() {
        // With process pinned to undefined, env access cannot resolve.
        let code = "typeof process === 'undefined' ? 'sealed' : process.env";
        let result = executor().run(code, 5000, 128).await.unwrap();
        assert_eq!(result.output, "sealed");
    }
}
