//! Mover Job reconciliation
//!
//! - [`DesiredJob`]: immutable desired state, built once per reconcile
//! - [`merge`]: the label merge and the owned-field replacement
//! - [`JobReconciler`]: create-or-update against a [`JobClient`] plus the
//!   retry budget rule

mod client;
mod desired;
mod gate;
pub mod merge;
mod ownership;
mod reconciler;

pub use client::{map_write_error, JobClient, KubeJobClient};
pub use desired::{DesiredJob, DesiredJobBuilder};
pub use gate::RunGate;
pub use ownership::set_controller_reference;
pub use reconciler::{remove_job, JobReconciler, OperationResult, ReconcileOutcome};
