//! The join-token refresh run: locate, evaluate, rotate, publish.
//!
//! One [`RefreshOrchestrator`] serves exactly one trigger. It owns the clients
//! it was built with and is consumed by [`RefreshOrchestrator::run`]. Steps are
//! strictly sequential and nothing is retried; a failure at any step ends the
//! run and is returned to the caller.
//!
//! Overlapping runs are not coordinated. Two runs that read the same stale
//! credential will both rotate it, and the later write wins.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{info, warn};

use crate::config::RotationSettings;
use crate::error::RotationError;
use crate::freshness::FreshnessVerdict;
use crate::locator::{InstanceLocator, Located};
use crate::services::{InstanceId, InstanceInventory, ParameterStore, RemoteExecutor, TerminalState};

/// States of a run, logged as the `state` field on each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Start,
    LocateInstance,
    NoInstance,
    EvaluateFreshness,
    Fresh,
    NeedsRefresh,
    DispatchCommand,
    AwaitCompletion,
    Fail,
    PublishCredential,
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RefreshState::Start => "start",
            RefreshState::LocateInstance => "locate_instance",
            RefreshState::NoInstance => "no_instance",
            RefreshState::EvaluateFreshness => "evaluate_freshness",
            RefreshState::Fresh => "fresh",
            RefreshState::NeedsRefresh => "needs_refresh",
            RefreshState::DispatchCommand => "dispatch_command",
            RefreshState::AwaitCompletion => "await_completion",
            RefreshState::Fail => "fail",
            RefreshState::PublishCredential => "publish_credential",
        };
        f.write_str(s)
    }
}

/// Successful end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshReport {
    /// The stored credential was fresh; nothing was dispatched or written.
    Idle { instance: InstanceId },
    /// A new credential was generated on `instance` and published.
    Rotated {
        instance: InstanceId,
        command_id: String,
        verdict: FreshnessVerdict,
    },
}

pub struct RefreshOrchestrator<S, I, R> {
    settings: RotationSettings,
    store: S,
    locator: InstanceLocator<I>,
    executor: R,
}

impl<S, I, R> RefreshOrchestrator<S, I, R>
where
    S: ParameterStore,
    I: InstanceInventory,
    R: RemoteExecutor,
{
    pub fn new(
        settings: RotationSettings,
        store: S,
        locator: InstanceLocator<I>,
        executor: R,
    ) -> Self {
        Self {
            settings,
            store,
            locator,
            executor,
        }
    }

    /// Runs the state machine once, evaluating freshness as of `now`.
    #[tracing::instrument(
        skip(self),
        fields(parameter = %self.settings.parameter_name, role = %self.settings.role_tag_value)
    )]
    pub async fn run(self, now: DateTime<Utc>) -> Result<RefreshReport, RotationError> {
        info!(state = %RefreshState::Start, "Rotation triggered");

        info!(state = %RefreshState::LocateInstance, "Locating control-plane instance");
        let instance = match self.locator.locate(&self.settings.role_tag_value).await {
            Located::Found(instance) => instance,
            Located::NotFound => {
                info!(state = %RefreshState::NoInstance, "No running control-plane instance found");
                return Err(fail(RotationError::InstanceNotFound {
                    role: self.settings.role_tag_value.clone(),
                }));
            }
        };
        info!(instance_id = %instance, "Located control-plane instance");

        let stored = self
            .store
            .get(&self.settings.parameter_name)
            .await
            .map_err(|e| fail(RotationError::ParameterStore(format!("{e:#}"))))?;

        let verdict = self.settings.policy.evaluate(stored.as_ref(), now);
        match &stored {
            Some(current) => info!(
                state = %RefreshState::EvaluateFreshness,
                %verdict,
                last_modified = %current.last_modified,
                always_rotate = self.settings.policy.always_rotate,
                "Evaluated stored credential"
            ),
            None => info!(
                state = %RefreshState::EvaluateFreshness,
                %verdict,
                "Credential parameter not found"
            ),
        }

        if !verdict.needs_refresh() {
            info!(state = %RefreshState::Fresh, "Credential is still valid");
            return Ok(RefreshReport::Idle { instance });
        }

        info!(state = %RefreshState::NeedsRefresh, %verdict, "Generating a new credential");
        let (command_id, join_command) = self.generate(&instance).await?;

        self.store
            .put(&self.settings.parameter_name, &join_command, true)
            .await
            .map_err(|e| fail(RotationError::ParameterStore(format!("{e:#}"))))?;
        info!(
            state = %RefreshState::PublishCredential,
            command_id = %command_id,
            credential = %redact(&join_command),
            "New credential published"
        );

        Ok(RefreshReport::Rotated {
            instance,
            command_id,
            verdict,
        })
    }

    /// Dispatches the join command and waits for it. Returns the command id
    /// and the trimmed captured output.
    async fn generate(&self, instance: &InstanceId) -> Result<(String, String), RotationError> {
        let handle = self
            .executor
            .dispatch(instance, &self.settings.join_command)
            .await
            .map_err(|e| fail(RotationError::RemoteDispatch(format!("{e:#}"))))?;
        let command_id = handle.command_id.clone();
        info!(
            state = %RefreshState::DispatchCommand,
            instance_id = %instance,
            command_id = %command_id,
            "Command dispatched"
        );

        info!(state = %RefreshState::AwaitCompletion, command_id = %command_id, "Waiting for command");
        let outcome = self.executor.await_terminal(handle).await.map_err(|e| {
            fail(RotationError::RemoteExecution(format!(
                "could not observe command {command_id}: {e:#}"
            )))
        })?;

        match outcome.state {
            TerminalState::Success => {}
            TerminalState::Failed => {
                return Err(fail(RotationError::RemoteExecution(format!(
                    "command {command_id} failed: {}",
                    outcome.stderr.trim()
                ))));
            }
            TerminalState::TimedOut => {
                return Err(fail(RotationError::RemoteTimeout { command_id }));
            }
        }

        let join_command = outcome.stdout.trim().to_string();
        if join_command.is_empty() {
            return Err(fail(RotationError::RemoteExecution(format!(
                "command {command_id} succeeded but printed nothing"
            ))));
        }
        info!(command_id = %command_id, bytes = join_command.len(), "Command succeeded");

        Ok((command_id, join_command))
    }
}

/// Logs the failure transition and hands the error back.
fn fail(err: RotationError) -> RotationError {
    warn!(state = %RefreshState::Fail, class = err.class(), error = %err, "Rotation step failed");
    err
}

/// Keeps the first few characters of a credential for log correlation.
fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(12).collect();
    format!("{prefix}… ({} bytes)", value.len())
}
