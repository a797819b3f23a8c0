//! In-memory fakes for the service traits. Each fake is cheap to clone and
//! clones share state, so a test can keep a handle after giving one away.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use kube_join_rotator::config::RotationSettings;
use kube_join_rotator::freshness::FreshnessPolicy;
use kube_join_rotator::locator::{InstanceLocator, TieBreak};
use kube_join_rotator::orchestrator::RefreshOrchestrator;
use kube_join_rotator::services::{
    CreateResult, ExecutionHandle, ExecutionOutcome, InstanceId, InstanceInventory,
    InstanceRecord, ParameterStore, RemoteExecutor, SecretStore, StoredParameter, TerminalState,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const PARAMETER: &str = "/k8s/worker/join-command";
pub const ROLE: &str = "k8s-cp";
pub const JOIN_COMMAND: &str = "kubeadm token create --print-join-command";

pub fn settings(policy: FreshnessPolicy) -> RotationSettings {
    RotationSettings {
        parameter_name: PARAMETER.to_string(),
        role_tag_value: ROLE.to_string(),
        join_command: JOIN_COMMAND.to_string(),
        policy,
    }
}

pub fn orchestrator(
    policy: FreshnessPolicy,
    store: &FakeStore,
    inventory: &FakeInventory,
    executor: &FakeExecutor,
) -> RefreshOrchestrator<FakeStore, FakeInventory, FakeExecutor> {
    RefreshOrchestrator::new(
        settings(policy),
        store.clone(),
        InstanceLocator::new(inventory.clone(), "Name", TieBreak::MostRecentlyLaunched),
        executor.clone(),
    )
}

// --- parameter store --------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutCall {
    pub name: String,
    pub value: String,
    pub encrypted: bool,
}

#[derive(Default)]
struct StoreState {
    values: HashMap<String, StoredParameter>,
    gets: usize,
    puts: Vec<PutCall>,
    fail_get: bool,
    fail_put: bool,
}

#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<StoreState>>,
}

impl FakeStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_value(name: &str, value: &str, last_modified: DateTime<Utc>) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().values.insert(
            name.to_string(),
            StoredParameter {
                value: value.to_string(),
                last_modified,
            },
        );
        store
    }

    pub fn failing_reads(self) -> Self {
        self.state.lock().unwrap().fail_get = true;
        self
    }

    pub fn failing_writes(self) -> Self {
        self.state.lock().unwrap().fail_put = true;
        self
    }

    pub fn current(&self, name: &str) -> Option<StoredParameter> {
        self.state.lock().unwrap().values.get(name).cloned()
    }

    pub fn puts(&self) -> Vec<PutCall> {
        self.state.lock().unwrap().puts.clone()
    }

    pub fn gets(&self) -> usize {
        self.state.lock().unwrap().gets
    }
}

#[async_trait::async_trait]
impl ParameterStore for FakeStore {
    async fn get(&self, name: &str) -> Result<Option<StoredParameter>> {
        let mut state = self.state.lock().unwrap();
        state.gets += 1;
        if state.fail_get {
            return Err(anyhow!("AccessDeniedException: not authorized to GetParameter"));
        }
        Ok(state.values.get(name).cloned())
    }

    async fn put(&self, name: &str, value: &str, encrypted: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_put {
            return Err(anyhow!("ThrottlingException: rate exceeded"));
        }
        state.puts.push(PutCall {
            name: name.to_string(),
            value: value.to_string(),
            encrypted,
        });
        state.values.insert(
            name.to_string(),
            StoredParameter {
                value: value.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }
}

// --- inventory --------------------------------------------------------------

#[derive(Default)]
struct InventoryState {
    records: Vec<InstanceRecord>,
    queries: Vec<(String, String)>,
    fail: bool,
}

#[derive(Clone, Default)]
pub struct FakeInventory {
    state: Arc<Mutex<InventoryState>>,
}

impl FakeInventory {
    pub fn with_instances(ids: &[&str]) -> Self {
        let records = ids
            .iter()
            .map(|id| InstanceRecord {
                id: InstanceId::from(*id),
                launch_time: None,
            })
            .collect();
        Self::with_records(records)
    }

    pub fn with_records(records: Vec<InstanceRecord>) -> Self {
        let inventory = Self::default();
        inventory.state.lock().unwrap().records = records;
        inventory
    }

    pub fn failing() -> Self {
        let inventory = Self::default();
        inventory.state.lock().unwrap().fail = true;
        inventory
    }

    pub fn queries(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().queries.clone()
    }
}

#[async_trait::async_trait]
impl InstanceInventory for FakeInventory {
    async fn running_instances(
        &self,
        tag_key: &str,
        tag_value: &str,
    ) -> Result<Vec<InstanceRecord>> {
        let mut state = self.state.lock().unwrap();
        state
            .queries
            .push((tag_key.to_string(), tag_value.to_string()));
        if state.fail {
            return Err(anyhow!("RequestLimitExceeded"));
        }
        Ok(state.records.clone())
    }
}

// --- remote executor --------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub instance: InstanceId,
    pub command: String,
}

#[derive(Default)]
struct ExecutorState {
    /// Outcome for the n-th dispatch; the last entry repeats.
    script: Vec<ExecutionOutcome>,
    dispatches: Vec<Dispatch>,
    awaited: Vec<String>,
    reject_dispatch: bool,
    fail_wait: bool,
    yield_on_wait: bool,
}

#[derive(Clone, Default)]
pub struct FakeExecutor {
    state: Arc<Mutex<ExecutorState>>,
}

impl FakeExecutor {
    pub fn succeeding(stdout: &str) -> Self {
        Self::scripted(vec![outcome(TerminalState::Success, stdout, "")])
    }

    pub fn ending_in(state: TerminalState, stderr: &str) -> Self {
        Self::scripted(vec![outcome(state, "", stderr)])
    }

    pub fn scripted(script: Vec<ExecutionOutcome>) -> Self {
        let executor = Self::default();
        executor.state.lock().unwrap().script = script;
        executor
    }

    pub fn rejecting() -> Self {
        let executor = Self::default();
        executor.state.lock().unwrap().reject_dispatch = true;
        executor
    }

    pub fn unobservable() -> Self {
        let executor = Self::succeeding("unused");
        executor.state.lock().unwrap().fail_wait = true;
        executor
    }

    /// Makes `await_terminal` yield once so concurrent runs interleave.
    pub fn yielding(self) -> Self {
        self.state.lock().unwrap().yield_on_wait = true;
        self
    }

    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.state.lock().unwrap().dispatches.clone()
    }

    pub fn awaited(&self) -> Vec<String> {
        self.state.lock().unwrap().awaited.clone()
    }
}

pub fn outcome(state: TerminalState, stdout: &str, stderr: &str) -> ExecutionOutcome {
    ExecutionOutcome {
        state,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

#[async_trait::async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn dispatch(&self, instance: &InstanceId, command: &str) -> Result<ExecutionHandle> {
        let mut state = self.state.lock().unwrap();
        if state.reject_dispatch {
            return Err(anyhow!("InvalidInstanceId: instance is not a managed node"));
        }
        state.dispatches.push(Dispatch {
            instance: instance.clone(),
            command: command.to_string(),
        });
        Ok(ExecutionHandle {
            command_id: format!("cmd-{}", state.dispatches.len()),
            instance_id: instance.clone(),
        })
    }

    async fn await_terminal(&self, handle: ExecutionHandle) -> Result<ExecutionOutcome> {
        let yield_on_wait = self.state.lock().unwrap().yield_on_wait;
        if yield_on_wait {
            tokio::task::yield_now().await;
        }

        let mut state = self.state.lock().unwrap();
        state.awaited.push(handle.command_id.clone());
        if state.fail_wait {
            return Err(anyhow!("InternalServerError"));
        }

        let n: usize = handle
            .command_id
            .trim_start_matches("cmd-")
            .parse()
            .unwrap_or(1);
        let index = n.saturating_sub(1).min(state.script.len().saturating_sub(1));
        state
            .script
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted outcome"))
    }
}

// --- secret store -----------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeSecretStore {
    secrets: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeSecretStore {
    pub fn raw(&self, name: &str) -> Option<String> {
        self.secrets.lock().unwrap().get(name).cloned()
    }

    pub fn insert_raw(&self, name: &str, value: &str) {
        self.secrets
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SecretStore for FakeSecretStore {
    async fn create(&self, name: &str, secret_string: &str) -> Result<CreateResult> {
        let mut secrets = self.secrets.lock().unwrap();
        if secrets.contains_key(name) {
            return Ok(CreateResult::AlreadyExists);
        }
        secrets.insert(name.to_string(), secret_string.to_string());
        self.writes.lock().unwrap().push(format!("create {name}"));
        Ok(CreateResult::Created)
    }

    async fn put_value(&self, name: &str, secret_string: &str) -> Result<()> {
        let mut secrets = self.secrets.lock().unwrap();
        if !secrets.contains_key(name) {
            return Err(anyhow!("ResourceNotFoundException: {name}"));
        }
        secrets.insert(name.to_string(), secret_string.to_string());
        self.writes.lock().unwrap().push(format!("put {name}"));
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.secrets.lock().unwrap().get(name).cloned())
    }
}
