//! The Worker abstraction: a stateless, single-use execution unit. A worker
//! receives a minimal context bundle and one task id, returns a structured
//! report, and is discarded. Keeping the trait free of shared mutable state
//! is what allows parallel execution to be added later without redesign.
//!
//! The default `ProcessWorker` speaks JSON over a subprocess's stdin/stdout:
//! request on stdin, report on stdout, stderr passed through.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Contract types
// ---------------------------------------------------------------------------

/// The bundle a worker starts with — and all it ever sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub task_id: TaskId,
    pub description: String,
    #[serde(default)]
    pub subtasks: Vec<String>,
    pub context_summary: String,
    #[serde(default)]
    pub filtered_references: Vec<String>,
    #[serde(default)]
    pub relevant_standards: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Pass,
    Fail,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub status: WorkerStatus,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default)]
    pub test_results: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker timed out")]
    Timeout,
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
    #[error("worker produced invalid output: {0}")]
    InvalidOutput(String),
}

pub trait Worker {
    fn execute(&self, request: &WorkerRequest) -> Result<WorkerReport, WorkerError>;
}

// ---------------------------------------------------------------------------
// ProcessWorker
// ---------------------------------------------------------------------------

/// Runs a configured shell command per task: `WorkerRequest` JSON on stdin,
/// `WorkerReport` JSON expected on stdout. The child is killed once the
/// wall-clock budget expires.
pub struct ProcessWorker {
    command: String,
    timeout: Duration,
}

impl ProcessWorker {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

impl Worker for ProcessWorker {
    fn execute(&self, request: &WorkerRequest) -> Result<WorkerReport, WorkerError> {
        let input = serde_json::to_string(request)
            .map_err(|e| WorkerError::InvalidOutput(e.to_string()))?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // stderr flows through so worker log lines reach the terminal
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        // Feed the request and drain the report on their own threads. Either
        // pipe can exceed the kernel buffer; blocking on one inside the
        // polling loop deadlocks against the child and surfaces as a timeout.
        let stdin = child.stdin.take();
        let writer = std::thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // A worker that ignores stdin closes the pipe early; that is
                // its choice, not an engine failure.
                let _ = stdin.write_all(input.as_bytes());
                // Dropping stdin closes the pipe so the worker sees EOF.
            }
        });
        let stdout = child.stdout.take();
        let reader = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut out) = stdout {
                let _ = out.read_to_string(&mut buf);
            }
            buf
        });

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        // Killing the child closes both pipes, so the helper
                        // threads finish promptly.
                        let _ = writer.join();
                        let _ = reader.join();
                        return Err(WorkerError::Timeout);
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => return Err(WorkerError::Spawn(e.to_string())),
            }
        }

        let _ = writer.join();
        let stdout = reader.join().unwrap_or_default();

        serde_json::from_str(&stdout)
            .map_err(|e| WorkerError::InvalidOutput(format!("{e}: {}", truncate(&stdout, 200))))
    }
}

fn truncate(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
