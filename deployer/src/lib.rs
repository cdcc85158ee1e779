//! dualdeploy library
//!
//! Provisioning pipeline, command execution and resource reconciliation
//! for deployments that span two cloud providers.

pub mod accounts;
pub mod app;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod storage;
pub mod utils;
