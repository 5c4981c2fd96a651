//! Kubernetes controllers for Scribe CRDs
//!
//! This module contains the controller implementations that watch for CRD changes
//! and trigger reconciliation.

mod data_mover_controller;

pub use data_mover_controller::run as run_data_mover_controller;

use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::config::MoverConfig;

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Mover settings shared by every Job reconciler
    pub config: Arc<MoverConfig>,
    /// Cancelled when the operator shuts down; aborts in-flight API calls
    pub shutdown: CancellationToken,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, config: MoverConfig, shutdown: CancellationToken) -> Self {
        Self {
            client,
            config: Arc::new(config),
            shutdown,
        }
    }
}
