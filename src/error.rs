//! Failure classes of a single rotation run.

use thiserror::Error;

/// Why a rotation run ended without idling or publishing a new credential.
///
/// Every variant is terminal for the run. Nothing is retried here; the
/// external trigger is expected to invoke the rotator again later.
#[derive(Debug, Error)]
pub enum RotationError {
    /// No running host carries the control-plane role tag.
    #[error("no running instance tagged '{role}'")]
    InstanceNotFound { role: String },

    /// Reading or writing the credential parameter failed for a reason other
    /// than the parameter being absent.
    #[error("parameter store error: {0}")]
    ParameterStore(String),

    /// The remote-execution channel rejected the command outright.
    #[error("remote dispatch failed: {0}")]
    RemoteDispatch(String),

    /// The command ran (or could not be observed) and did not succeed.
    #[error("remote execution failed: {0}")]
    RemoteExecution(String),

    /// The channel gave up waiting for the command to finish.
    #[error("remote execution timed out (command {command_id})")]
    RemoteTimeout { command_id: String },
}

impl RotationError {
    /// Process exit code for this failure class. `0` and `1` are reserved for
    /// success and generic failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            RotationError::InstanceNotFound { .. } => 2,
            RotationError::ParameterStore(_) => 3,
            RotationError::RemoteDispatch(_) => 4,
            RotationError::RemoteExecution(_) => 5,
            RotationError::RemoteTimeout { .. } => 6,
        }
    }

    /// Short machine-friendly label, used as the `class` field in logs.
    pub fn class(&self) -> &'static str {
        match self {
            RotationError::InstanceNotFound { .. } => "instance_not_found",
            RotationError::ParameterStore(_) => "parameter_store_failure",
            RotationError::RemoteDispatch(_) => "remote_dispatch_failure",
            RotationError::RemoteExecution(_) => "remote_execution_failure",
            RotationError::RemoteTimeout { .. } => "remote_timeout",
        }
    }
}
