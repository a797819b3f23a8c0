//! Trait and types for running shell commands on a remote host out of band.

use anyhow::Result;

use super::inventory::InstanceId;

/// Handle to one dispatched command on one instance.
///
/// Not `Clone`: [`RemoteExecutor::await_terminal`] consumes it, so each
/// execution's output is read at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct ExecutionHandle {
    pub command_id: String,
    pub instance_id: InstanceId,
}

/// How a remote execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Success,
    Failed,
    TimedOut,
}

/// Terminal classification plus captured output of a remote execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub state: TerminalState,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.state == TerminalState::Success
    }
}

/// Out-of-band remote execution channel (e.g. AWS Systems Manager Run Command).
#[async_trait::async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Sends `command` for execution on `instance`. Fails if the channel
    /// rejects the request.
    async fn dispatch(&self, instance: &InstanceId, command: &str) -> Result<ExecutionHandle>;

    /// Blocks until the execution reaches a terminal state or the channel's
    /// own wait bound is exhausted (reported as [`TerminalState::TimedOut`]).
    ///
    /// An `Err` means the channel itself could not be queried.
    async fn await_terminal(&self, handle: ExecutionHandle) -> Result<ExecutionOutcome>;
}
