use anyhow::{Context, Result, anyhow};
use aws_sdk_ssm::types::{CommandInvocationStatus, ParameterType};
use chrono::{DateTime, Utc};
use kube_join_rotator::config::WaitPolicy;
use kube_join_rotator::services::{
    ExecutionHandle, ExecutionOutcome, InstanceId, ParameterStore, RemoteExecutor,
    StoredParameter, TerminalState,
};
use tracing::{debug, warn};

use super::to_utc;

/// Reads and writes parameters in AWS SSM Parameter Store.
///
/// Parameters are fetched with decryption enabled, so `SecureString` values
/// work as long as the process has `ssm:GetParameter` and the corresponding
/// KMS permissions.
pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_ssm::Client::new(config),
        }
    }
}

#[async_trait::async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get(&self, name: &str) -> Result<Option<StoredParameter>> {
        let resp = match self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_parameter_not_found()) => {
                return Ok(None);
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("SSM GetParameter failed for '{name}'")));
            }
        };

        let parameter = resp
            .parameter
            .ok_or_else(|| anyhow!("SSM GetParameter returned no parameter for '{name}'"))?;
        let value = parameter
            .value
            .ok_or_else(|| anyhow!("SSM parameter '{name}' exists but has no value"))?;
        let last_modified = match parameter
            .last_modified_date
            .and_then(|t| to_utc(t.secs(), t.subsec_nanos()))
        {
            Some(t) => t,
            None => {
                warn!(parameter = name, "Parameter has no last-modified date, treating as oldest");
                DateTime::<Utc>::default()
            }
        };

        Ok(Some(StoredParameter {
            value,
            last_modified,
        }))
    }

    async fn put(&self, name: &str, value: &str, encrypted: bool) -> Result<()> {
        let kind = if encrypted {
            ParameterType::SecureString
        } else {
            ParameterType::String
        };

        self.client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(kind)
            .overwrite(true)
            .send()
            .await
            .with_context(|| format!("SSM PutParameter failed for '{name}'"))?;

        Ok(())
    }
}

/// Runs shell commands on managed instances through SSM Run Command.
///
/// The instance needs the SSM agent and an instance profile that allows it
/// to register; the rotator never connects to the instance directly.
pub struct SsmRemoteExecutor {
    client: aws_sdk_ssm::Client,
    document_name: String,
    wait: WaitPolicy,
}

impl SsmRemoteExecutor {
    pub fn new(config: &aws_config::SdkConfig, document_name: impl Into<String>, wait: WaitPolicy) -> Self {
        Self {
            client: aws_sdk_ssm::Client::new(config),
            document_name: document_name.into(),
            wait,
        }
    }
}

#[async_trait::async_trait]
impl RemoteExecutor for SsmRemoteExecutor {
    async fn dispatch(&self, instance: &InstanceId, command: &str) -> Result<ExecutionHandle> {
        let resp = self
            .client
            .send_command()
            .instance_ids(instance.as_str())
            .document_name(&self.document_name)
            .parameters("commands", vec![command.to_string()])
            .send()
            .await
            .with_context(|| format!("SSM SendCommand failed for instance '{instance}'"))?;

        let command_id = resp
            .command
            .and_then(|c| c.command_id)
            .ok_or_else(|| anyhow!("SSM SendCommand returned no command id"))?;

        Ok(ExecutionHandle {
            command_id,
            instance_id: instance.clone(),
        })
    }

    #[tracing::instrument(skip(self), fields(command_id = %handle.command_id, instance_id = %handle.instance_id))]
    async fn await_terminal(&self, handle: ExecutionHandle) -> Result<ExecutionOutcome> {
        for attempt in 1..=self.wait.max_attempts {
            tokio::time::sleep(self.wait.delay).await;

            let resp = match self
                .client
                .get_command_invocation()
                .command_id(&handle.command_id)
                .instance_id(handle.instance_id.as_str())
                .send()
                .await
            {
                Ok(resp) => resp,
                // The invocation is not visible until the agent picks it up.
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_invocation_does_not_exist()) =>
                {
                    debug!(attempt, "Invocation not registered yet");
                    continue;
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(format!(
                        "SSM GetCommandInvocation failed for command '{}'",
                        handle.command_id
                    )));
                }
            };

            let Some(state) = classify(resp.status()) else {
                debug!(attempt, status = ?resp.status(), "Command still running");
                continue;
            };

            return Ok(ExecutionOutcome {
                state,
                stdout: resp.standard_output_content().unwrap_or_default().to_string(),
                stderr: resp.standard_error_content().unwrap_or_default().to_string(),
            });
        }

        warn!(
            max_attempts = self.wait.max_attempts,
            delay_secs = self.wait.delay.as_secs(),
            "Gave up waiting for command"
        );
        Ok(exhausted(self.wait.max_attempts))
    }
}

/// Maps an invocation status to its terminal state, or `None` while the
/// command is still in flight.
fn classify(status: Option<&CommandInvocationStatus>) -> Option<TerminalState> {
    match status? {
        CommandInvocationStatus::Success => Some(TerminalState::Success),
        CommandInvocationStatus::Failed | CommandInvocationStatus::Cancelled => {
            Some(TerminalState::Failed)
        }
        CommandInvocationStatus::TimedOut => Some(TerminalState::TimedOut),
        _ => None,
    }
}

/// Outcome reported when the wait policy runs out before a terminal status.
fn exhausted(max_attempts: u32) -> ExecutionOutcome {
    ExecutionOutcome {
        state: TerminalState::TimedOut,
        stdout: String::new(),
        stderr: format!("no terminal status after {max_attempts} polls"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert_eq!(
            classify(Some(&CommandInvocationStatus::Success)),
            Some(TerminalState::Success)
        );
        assert_eq!(
            classify(Some(&CommandInvocationStatus::Failed)),
            Some(TerminalState::Failed)
        );
        assert_eq!(
            classify(Some(&CommandInvocationStatus::TimedOut)),
            Some(TerminalState::TimedOut)
        );
    }

    #[test]
    fn test_cancelled_is_a_failure_not_a_timeout() {
        assert_eq!(
            classify(Some(&CommandInvocationStatus::Cancelled)),
            Some(TerminalState::Failed)
        );
    }

    #[test]
    fn test_in_flight_statuses_keep_polling() {
        for status in [
            CommandInvocationStatus::Pending,
            CommandInvocationStatus::InProgress,
            CommandInvocationStatus::Delayed,
            CommandInvocationStatus::Cancelling,
        ] {
            assert_eq!(classify(Some(&status)), None, "{status:?}");
        }
        assert_eq!(classify(None), None);
        assert_eq!(classify(Some(&CommandInvocationStatus::from("Rebooting"))), None);
    }

    #[test]
    fn test_exhausted_wait_is_a_timeout() {
        let outcome = exhausted(20);
        assert_eq!(outcome.state, TerminalState::TimedOut);
        assert!(outcome.stdout.is_empty());
        assert!(outcome.stderr.contains("20 polls"));
    }
}
