//! Python executor backed by a restricted interpreter subprocess.
//!
//! The child runs with an emptied environment and a composed script whose
//! preamble rebinds `open`, `eval`, `exec`, `compile`, and `__import__` to
//! disabled stubs before any user code executes. Standard out and standard
//! error are redirected into in-memory buffers; any raised exception becomes
//! a single `Error: {type}: {message}` line on stderr with a non-zero exit.
//! On timeout the process is asked to terminate, then killed after a grace
//! period if it does not comply.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use super::{Executor, RunOutput};
use crate::errors::SandboxError;

const DEFAULT_INTERPRETER: &str = "python3";
const DEFAULT_TERM_GRACE: Duration = Duration::from_secs(1);

/// Executor for the Python guest language.
pub struct InterpreterExecutor {
    interpreter: String,
    term_grace: Duration,
}

impl InterpreterExecutor {
    pub fn new() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            term_grace: DEFAULT_TERM_GRACE,
        }
    }

    /// Use a different interpreter binary (e.g. a pinned `python3.12`).
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// How long a timed-out process gets to exit voluntarily before it is
    /// forcefully killed.
    pub fn with_term_grace(mut self, grace: Duration) -> Self {
        self.term_grace = grace;
        self
    }
}

impl Default for InterpreterExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Compose the script handed to the interpreter: hardening preamble, the
/// user code indented into a try block, and stream/exception plumbing.
/// Uses %-formatting guest-side so no brace escaping is needed here.
fn compose_script(code: &str) -> String {
    let indented = code
        .lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"import sys as _sys, io as _io, builtins as _builtins

def _disabled(*_args, **_kwargs):
    raise PermissionError('disabled in this sandbox')

_builtins.open = _disabled
_builtins.eval = _disabled
_builtins.exec = _disabled
_builtins.compile = _disabled
_builtins.__import__ = _disabled

_out = _io.StringIO()
_err = _io.StringIO()
_sys.stdout = _out
_sys.stderr = _err
_status = 0
try:
{}
except BaseException as _exc:
    _err.write('Error: %s: %s\n' % (type(_exc).__name__, _exc))
    _status = 1
finally:
    _sys.stdout = _sys.__stdout__
    _sys.stderr = _sys.__stderr__
    _sys.stdout.write(_out.getvalue())
    _sys.stderr.write(_err.getvalue())
_sys.exit(_status)
"#,
        indented
    )
}

async fn drain(mut stream: impl AsyncReadExt + Unpin) -> String {
    let mut accumulated = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => accumulated.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&accumulated).into_owned()
}

#[cfg(unix)]
fn request_termination(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: plain kill(2) on the child's pid; the Child handle keeps the
        // pid from being reused until it is reaped.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn request_termination(_child: &Child) {
    // No graceful signal available; the grace period expires into a kill.
}

#[async_trait]
impl Executor for InterpreterExecutor {
    async fn run(
        &self,
        code: &str,
        timeout_ms: u64,
        _memory_limit_mb: u64,
    ) -> Result<RunOutput, SandboxError> {
        let binary = which::which(&self.interpreter).map_err(|e| {
            SandboxError::InterpreterMissing {
                interpreter: self.interpreter.clone(),
                detail: e.to_string(),
            }
        })?;

        let script = compose_script(code);

        let mut child = Command::new(&binary)
            .arg("-c")
            .arg(&script)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SandboxError::InterpreterMissing {
                        interpreter: self.interpreter.clone(),
                        detail: e.to_string(),
                    }
                } else {
                    SandboxError::Internal(format!("failed to spawn interpreter: {}", e))
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Internal("child stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::Internal("child stderr not captured".to_string()))?;

        let stdout_task = tokio::spawn(drain(stdout));
        let stderr_task = tokio::spawn(drain(stderr));

        let status = match tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait())
            .await
        {
            Ok(status) => status.map_err(|e| {
                SandboxError::Internal(format!("failed to wait on interpreter: {}", e))
            })?,
            Err(_) => {
                log::warn!(
                    "Interpreter run exceeded {}ms, requesting termination",
                    timeout_ms
                );
                request_termination(&child);
                if tokio::time::timeout(self.term_grace, child.wait()).await.is_err() {
                    log::warn!("Interpreter ignored termination request, killing");
                    let _ = child.kill().await;
                }
                return Err(SandboxError::Timeout { timeout_ms });
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let stderr_trimmed = stderr.trim();

        if status.success() && stderr_trimmed.is_empty() {
            return Ok(RunOutput {
                output: stdout,
                memory_used_mb: None,
            });
        }

        if stderr_trimmed.contains("SyntaxError") {
            return Err(SandboxError::Syntax(stderr_trimmed.to_string()));
        }
        if stderr_trimmed.is_empty() {
            return Err(SandboxError::Runtime(format!(
                "process exited with code {}",
                status.code().unwrap_or(-1)
            )));
        }
        Err(SandboxError::Runtime(stderr_trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn python_available() -> bool {
        which::which(DEFAULT_INTERPRETER).is_ok()
    }

    #[tokio::test]
    async fn test_print_is_captured() {
        if !python_available() {
            return; // skip if python3 not available
        }
        let result = InterpreterExecutor::new()
            .run("print('Hello, World!')", 10000, 128)
            .await
            .unwrap();
        assert!(result.output.contains("Hello, World!"));
        assert!(result.memory_used_mb.is_none());
    }

    #[tokio::test]
    async fn test_raised_exception_is_formatted() {
        if !python_available() {
            return;
        }
        let err = InterpreterExecutor::new()
            .run("raise ValueError('boom')", 10000, 128)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Error: ValueError: boom"));
    }

    #[tokio::test]
    async fn test_syntax_errors_are_classified() {
        if !python_available() {
            return;
        }
        let err = InterpreterExecutor::new()
            .run("def (broken", 10000, 128)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Syntax(_)));
    }

    #[tokio::test]
    async fn test_busy_loop_times_out() {
        if !python_available() {
            return;
        }
        let start = Instant::now();
        let err = InterpreterExecutor::new()
            .run("while True:\n    pass", 500, 128)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { timeout_ms: 500 }));
        // timeout + grace period, with headroom for a slow host
        assert!(start.elapsed() < Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_open_is_disabled() {
        if !python_available() {
            return;
        }
        let err = InterpreterExecutor::new()
            .run("print(open('/etc/passwd').read())", 10000, 128)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("PermissionError"));
    }

    #[tokio::test]
    async fn test_imports_are_disabled() {
        if !python_available() {
            return;
        }
        let err = InterpreterExecutor::new()
            .run("import os\nprint(os.environ)", 10000, 128)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("PermissionError"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_distinct() {
        let err = InterpreterExecutor::new()
            .with_interpreter("definitely-not-a-real-interpreter")
            .run("print('hi')", 10000, 128)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::InterpreterMissing { .. }));
        assert!(err.to_string().contains("not installed or not found"));
    }

    #[test]
    fn test_composed_script_indents_user_code() {
        let script = compose_script("a = 1\nprint(a)");
        assert!(script.contains("    a = 1\n    print(a)"));
        assert!(script.contains("_builtins.__import__ = _disabled"));
    }
}
