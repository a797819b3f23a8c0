pub mod config;
pub mod error;
pub mod freshness;
pub mod locator;
pub mod manifest;
pub mod orchestrator;
pub mod secrets;
pub mod services;
