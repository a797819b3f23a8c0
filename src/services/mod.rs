//! Interfaces to the external systems the rotator talks to.
//!
//! Each trait has an AWS-backed implementation in the binary's `infra`
//! module; tests substitute in-memory fakes.

pub mod inventory;
pub mod parameter_store;
pub mod remote_exec;
pub mod secret_store;

pub use inventory::{InstanceId, InstanceInventory, InstanceRecord};
pub use parameter_store::{ParameterStore, StoredParameter};
pub use remote_exec::{ExecutionHandle, ExecutionOutcome, RemoteExecutor, TerminalState};
pub use secret_store::{CreateResult, SecretStore};
