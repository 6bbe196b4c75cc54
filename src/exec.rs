//! External command execution behind a mockable seam.
//!
//! Speech engines and OCR shell out to system tools; everything goes
//! through [`CommandExecutor`] so tests never spawn processes.

use crate::error::{DrishtiError, Result};
use std::collections::VecDeque;
use std::process::Command;
use std::sync::Mutex;

/// Trait for executing system commands.
///
/// Object-safe, Send + Sync for use in concurrent contexts.
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments and wait for it to exit.
    ///
    /// Returns the stdout of the command on success.
    /// Returns an error if the command fails or is not found.
    fn execute(&self, command: &str, args: &[&str]) -> Result<String>;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for std::sync::Arc<T> {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        (**self).execute(command, args)
    }
}

/// Production command executor using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        tracing::trace!(command, ?args, "exec");
        let output = Command::new(command).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DrishtiError::ToolNotFound {
                    tool: command.to_string(),
                }
            } else {
                DrishtiError::CommandFailed {
                    message: format!("Failed to execute {}: {}", command, e),
                }
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DrishtiError::CommandFailed {
                message: format!(
                    "{} failed with status {:?}: {}",
                    command,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Mock command executor.
///
/// Records every call and replays queued responses; once the queue is empty
/// every call succeeds with empty stdout.
#[derive(Debug, Default)]
pub struct MockCommandExecutor {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    responses: Mutex<VecDeque<Result<String>>>,
}

impl MockCommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a successful response to the queue.
    pub fn with_response(self, response: &str) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(response.to_string()));
        self
    }

    /// Add an error response to the queue.
    pub fn with_error(self, error: DrishtiError) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
        self
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Get the number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Get a specific call by index.
    pub fn call(&self, index: usize) -> Option<(String, Vec<String>)> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(index)
            .cloned()
    }
}

impl CommandExecutor for MockCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push((
            command.to_string(),
            args.iter().map(|s| s.to_string()).collect(),
        ));

        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_command_executor_is_object_safe() {
        let executor: Box<dyn CommandExecutor> = Box::new(MockCommandExecutor::new());
        let result = executor.execute("echo", &["test"]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_mock_executor_records_calls() {
        let mock = MockCommandExecutor::new();

        mock.execute("espeak-ng", &["-s", "180", "hello"]).unwrap();
        mock.execute("paplay", &["/tmp/a.wav"]).unwrap();

        assert_eq!(mock.call_count(), 2);
        let call1 = mock.call(0).unwrap();
        assert_eq!(call1.0, "espeak-ng");
        assert_eq!(call1.1, vec!["-s", "180", "hello"]);
        assert_eq!(mock.call(1).unwrap().0, "paplay");
        assert!(mock.call(2).is_none());
    }

    #[test]
    fn test_mock_executor_replays_responses_then_defaults() {
        let mock = MockCommandExecutor::new()
            .with_response("output1")
            .with_error(DrishtiError::ToolNotFound {
                tool: "tesseract".to_string(),
            });

        assert_eq!(mock.execute("a", &[]).unwrap(), "output1");
        assert!(matches!(
            mock.execute("b", &[]),
            Err(DrishtiError::ToolNotFound { .. })
        ));
        assert_eq!(mock.execute("c", &[]).unwrap(), "");
    }

    #[test]
    fn test_arc_executor_delegates() {
        let mock = Arc::new(MockCommandExecutor::new().with_response("shared"));
        let executor: Arc<dyn CommandExecutor> = mock.clone();
        assert_eq!(executor.execute("x", &[]).unwrap(), "shared");
        assert_eq!(mock.call_count(), 1);
    }

    #[test]
    fn test_system_executor_missing_tool() {
        let executor = SystemCommandExecutor::new();
        let err = executor
            .execute("drishti-definitely-not-a-real-tool", &[])
            .unwrap_err();
        assert!(matches!(err, DrishtiError::ToolNotFound { .. }));
    }

    #[test]
    fn test_system_executor_captures_stdout() {
        let executor = SystemCommandExecutor::new();
        let out = executor.execute("echo", &["hello"]).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn test_system_executor_reports_failure_status() {
        let executor = SystemCommandExecutor::new();
        let err = executor.execute("false", &[]).unwrap_err();
        assert!(matches!(err, DrishtiError::CommandFailed { .. }));
    }
}
