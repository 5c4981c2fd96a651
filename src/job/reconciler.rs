//! Job reconciler
//!
//! Converges one mover Job to a [`DesiredJob`] and abandons it once its
//! failed attempts reach the retry budget.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::MoverConfig;
use crate::error::{Error, Result};

use super::client::JobClient;
use super::desired::DesiredJob;
use super::merge::merge_into;
use super::ownership::set_controller_reference;

/// What the API server did with the submitted Job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationResult::Created => "created",
            OperationResult::Updated => "updated",
            OperationResult::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// Result of a successful reconcile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The Job matches the desired state and is still in play
    Active(OperationResult),
    /// The Job ran out of retries and was deleted
    Abandoned,
}

impl ReconcileOutcome {
    pub fn is_active(&self) -> bool {
        matches!(self, ReconcileOutcome::Active(_))
    }
}

/// Reconciles a single Job owned by `owner`
pub struct JobReconciler<'a, K> {
    owner: &'a K,
    name: String,
    namespace: String,
    config: Arc<MoverConfig>,
}

impl<'a, K> JobReconciler<'a, K>
where
    K: Resource<DynamicType = ()>,
{
    pub fn new(
        owner: &'a K,
        name: impl Into<String>,
        namespace: impl Into<String>,
        config: Arc<MoverConfig>,
    ) -> Self {
        Self {
            owner,
            name: name.into(),
            namespace: namespace.into(),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Bring the Job in line with `desired`.
    ///
    /// Returns [`ReconcileOutcome::Abandoned`] once the Job has failed as
    /// many times as the retry budget allows; the Job is deleted in that case.
    /// Cancelling `cancel` aborts whichever API call is in flight.
    pub async fn reconcile<C>(
        &self,
        client: &C,
        desired: &DesiredJob,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome>
    where
        C: JobClient + ?Sized,
    {
        let (job, operation) = match self.create_or_update(client, desired, cancel).await {
            Ok(res) => res,
            Err(e) => {
                error!(
                    job = %self.name,
                    namespace = %self.namespace,
                    error = %e,
                    "job reconcile failed"
                );
                return Err(e);
            }
        };

        let failed = job.status.as_ref().and_then(|s| s.failed).unwrap_or(0);
        let budget = job
            .spec
            .as_ref()
            .and_then(|s| s.backoff_limit)
            .unwrap_or(self.config.backoff_limit);

        if failed >= budget {
            info!(
                job = %self.name,
                namespace = %self.namespace,
                failed,
                budget,
                "deleting job -- backoff limit exceeded"
            );
            cancellable(cancel, client.delete(&self.name, &self.namespace)).await?;
            return Ok(ReconcileOutcome::Abandoned);
        }

        info!(
            job = %self.name,
            namespace = %self.namespace,
            mover = desired.mover(),
            operation = %operation,
            "job reconciled"
        );
        Ok(ReconcileOutcome::Active(operation))
    }

    /// Fetch the Job (or start a new one), merge, and submit it.
    ///
    /// A merge that leaves the live object untouched is not submitted. An
    /// update the API server accepts without bumping the resourceVersion is
    /// reported as [`OperationResult::Unchanged`].
    pub async fn create_or_update<C>(
        &self,
        client: &C,
        desired: &DesiredJob,
        cancel: &CancellationToken,
    ) -> Result<(Job, OperationResult)>
    where
        C: JobClient + ?Sized,
    {
        let live = cancellable(cancel, client.get(&self.name, &self.namespace)).await?;

        match live {
            None => {
                let mut job = Job {
                    metadata: ObjectMeta {
                        name: Some(self.name.clone()),
                        namespace: Some(self.namespace.clone()),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                self.apply(&mut job, desired)?;
                let created = cancellable(cancel, client.create(&job)).await?;
                Ok((created, OperationResult::Created))
            }
            Some(live) => {
                let mut job = live.clone();
                self.apply(&mut job, desired)?;
                if job == live {
                    debug!(job = %self.name, "job already up to date");
                    return Ok((live, OperationResult::Unchanged));
                }
                let updated = cancellable(cancel, client.update(&job)).await?;
                // the server fills in defaults the desired template leaves out,
                // so an unchanged resourceVersion is the real no-op signal
                if updated.metadata.resource_version == live.metadata.resource_version {
                    debug!(job = %self.name, "update was a no-op");
                    return Ok((updated, OperationResult::Unchanged));
                }
                Ok((updated, OperationResult::Updated))
            }
        }
    }

    /// Merge the desired state into `job` in memory
    pub fn apply(&self, job: &mut Job, desired: &DesiredJob) -> Result<()> {
        if let Err(e) = set_controller_reference(self.owner, job) {
            error!(job = %self.name, error = %e, "unable to set controller reference");
            return Err(e);
        }
        merge_into(
            job,
            desired.template(),
            self.config.backoff_limit,
            desired.gate(),
        );
        Ok(())
    }
}

impl<K> fmt::Debug for JobReconciler<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobReconciler")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Delete a Job this owner no longer wants, e.g. after the mover changed.
///
/// A Job that is already gone is not an error.
pub async fn remove_job<C>(
    client: &C,
    name: &str,
    namespace: &str,
    cancel: &CancellationToken,
) -> Result<()>
where
    C: JobClient + ?Sized,
{
    info!(job = %name, namespace = %namespace, "deleting superseded job");
    cancellable(cancel, client.delete(name, namespace)).await
}

/// Run `fut` unless `cancel` fires first
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}
