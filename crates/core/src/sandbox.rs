//! Execution context and resource bounding around tool bodies.
//!
//! The registry spawns every tool body as its own task and hands the join
//! handle to a [`Sandbox`]. The default [`DeadlineSandbox`] enforces the
//! execution timeout; stronger isolation (cgroups, containers) plugs in by
//! implementing the same trait.

use crate::error::ToolError;
use crate::types::ToolOutput;
use async_trait::async_trait;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Resource limits applied to a single execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub timeout: Option<Duration>,
    /// Advisory ceiling for sandboxes that can enforce it.
    pub max_memory_bytes: Option<u64>,
}

impl ExecutionLimits {
    pub fn unbounded() -> Self {
        Self {
            timeout: None,
            max_memory_bytes: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            max_memory_bytes: Some(100 * 1024 * 1024),
        }
    }
}

/// Per-invocation context handed to tool bodies.
#[derive(Debug, Clone)]
pub struct ToolContext {
    tool: String,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ToolContext {
    pub fn new(tool: impl Into<String>, limits: &ExecutionLimits) -> Self {
        Self {
            tool: tool.into(),
            cancel: CancellationToken::new(),
            deadline: limits.timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the execution has been cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Hook invoked around every tool body.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(
        &self,
        ctx: &ToolContext,
        task: JoinHandle<anyhow::Result<ToolOutput>>,
    ) -> Result<ToolOutput, ToolError>;
}

/// Deadline-bound execution: on expiry the context is cancelled, the task
/// aborted and a `Timeout` reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadlineSandbox;

#[async_trait]
impl Sandbox for DeadlineSandbox {
    async fn run(
        &self,
        ctx: &ToolContext,
        mut task: JoinHandle<anyhow::Result<ToolOutput>>,
    ) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let joined = match ctx.deadline() {
            Some(deadline) => match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    ctx.cancel.cancel();
                    task.abort();
                    return Err(ToolError::Timeout {
                        tool: ctx.tool.clone(),
                        elapsed: started.elapsed(),
                    });
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(ToolError::Execution {
                tool: ctx.tool.clone(),
                message: format!("{err:#}"),
            }),
            Err(join_err) => Err(ToolError::Execution {
                tool: ctx.tool.clone(),
                message: panic_message(join_err),
            }),
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if err.is_cancelled() {
        return "execution cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(msg) = payload.downcast_ref::<&str>() {
                format!("tool panicked: {msg}")
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                format!("tool panicked: {msg}")
            } else {
                "tool panicked".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}
