//! DataMover controller
//!
//! Watches DataMover resources and the Jobs they own, and triggers reconciliation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument};

use crate::controllers::Context;
use crate::crd::DataMover;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::data_mover as data_mover_reconciler;

/// Run the DataMover controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<DataMover> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("DataMover CRD not installed: {}", e);
        return;
    }

    info!("Starting DataMover controller");

    let jobs: Api<Job> = Api::all(client);

    Controller::new(api, WatcherConfig::default())
        .owns(jobs, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled DataMover"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["DataMover"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<DataMover>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["DataMover"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["DataMover"])
        .inc();

    // The Job carries an owner reference, so the garbage collector removes it
    if obj.metadata.deletion_timestamp.is_some() {
        info!("DataMover is being deleted, leaving Job cleanup to the garbage collector");
        return Ok(Action::await_change());
    }

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    info!(
        generation = obj.metadata.generation.unwrap_or(0),
        paused = obj.spec.paused,
        "Reconciling DataMover"
    );

    data_mover_reconciler::sync_job(
        &obj,
        &ctx.client,
        &namespace,
        ctx.config.clone(),
        &ctx.shutdown,
    )
    .await
}

/// Error policy for the controller
fn error_policy(obj: Arc<DataMover>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    error!(
        name = %name,
        error = %error,
        retryable = error.is_retryable(),
        "Reconciliation failed, scheduling retry"
    );

    Action::requeue(requeue_after(error))
}

/// How long to wait before retrying after `error`
fn requeue_after(error: &Error) -> Duration {
    match error {
        // lost an optimistic concurrency race; refetch soon
        Error::Conflict { .. } => Duration::from_secs(5),
        Error::Kube(_) | Error::Cancelled => Duration::from_secs(30),
        Error::OwnerReference(_) | Error::Invalid { .. } => Duration::from_secs(300),
        Error::Config(_) | Error::Validation(_) => Duration::from_secs(300),
        Error::Serialization(_) => Duration::from_secs(60),
    }
}
