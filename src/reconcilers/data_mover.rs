//! DataMover reconciler
//!
//! Turns a DataMover into a mover Job:
//! - Spec validation
//! - Mapping the spec onto a mover profile
//! - Running the Job reconciler
//! - Status updates

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::{
    api::{Patch, PatchParams},
    runtime::controller::Action,
    Api, Client, ResourceExt,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MoverConfig;
use crate::crd::{Condition, DataMover, DataMoverStatus, DirectionSpec, ResticActionSpec};
use crate::error::{Error, Result};
use crate::job::{remove_job, DesiredJob, JobReconciler, KubeJobClient, ReconcileOutcome};
use crate::metrics;
use crate::mover::{Direction, MoverProfile, RcloneParams, ResticAction, ResticParams, RsyncParams};

/// Field manager used for status patches
const FIELD_MANAGER: &str = "scribe-mover-operator";

const READY_CONDITION: &str = "Ready";

/// Validate the DataMover spec
pub fn validate(dm: &DataMover) -> Result<()> {
    let spec = &dm.spec;
    let selected: Vec<&str> = [
        spec.rsync.as_ref().map(|_| "rsync"),
        spec.restic.as_ref().map(|_| "restic"),
        spec.rclone.as_ref().map(|_| "rclone"),
    ]
    .into_iter()
    .flatten()
    .collect();

    match selected.len() {
        0 => {
            return Err(Error::validation(
                "One of rsync, restic or rclone must be specified",
            ))
        }
        1 => {}
        _ => {
            return Err(Error::validation(format!(
                "Only one mover may be specified, got: {}",
                selected.join(", ")
            )))
        }
    }

    if let Some(rsync) = &spec.rsync {
        require("rsync.dataVolumeClaim", &rsync.data_volume_claim)?;
        require("rsync.sshKeysSecret", &rsync.ssh_keys_secret)?;
    }
    if let Some(restic) = &spec.restic {
        require("restic.dataVolumeClaim", &restic.data_volume_claim)?;
        require("restic.cacheVolumeClaim", &restic.cache_volume_claim)?;
        require("restic.repositorySecret", &restic.repository_secret)?;
    }
    if let Some(rclone) = &spec.rclone {
        require("rclone.dataVolumeClaim", &rclone.data_volume_claim)?;
        require("rclone.destinationPath", &rclone.destination_path)?;
        require("rclone.configSection", &rclone.config_section)?;
        require("rclone.configSecret", &rclone.config_secret)?;
    }

    Ok(())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Pod labels for the rsync mover; the destination Service selects on these
pub fn rsync_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        "scribe-rsync".to_string(),
    );
    labels.insert("app.kubernetes.io/instance".to_string(), name.to_string());
    labels
}

fn direction(spec: DirectionSpec) -> Direction {
    Direction::from_is_source(spec == DirectionSpec::Source)
}

/// Map the spec onto the mover profile it selects
pub fn mover_profile(dm: &DataMover) -> Result<MoverProfile> {
    let spec = &dm.spec;
    if let Some(rsync) = &spec.rsync {
        return Ok(MoverProfile::Rsync(RsyncParams {
            direction: direction(rsync.direction),
            data_pvc: rsync.data_volume_claim.clone(),
            ssh_secret: rsync.ssh_keys_secret.clone(),
            labels: rsync_labels(&dm.name_any()),
        }));
    }
    if let Some(restic) = &spec.restic {
        let action = match restic.action {
            ResticActionSpec::BackupOnly => ResticAction::BackupOnly,
            ResticActionSpec::BackupAndPrune => ResticAction::BackupAndPrune,
            ResticActionSpec::Restore => ResticAction::Restore,
        };
        return Ok(MoverProfile::Restic(ResticParams {
            action,
            forget_options: restic.forget_options.clone(),
            data_pvc: restic.data_volume_claim.clone(),
            cache_pvc: restic.cache_volume_claim.clone(),
            repository_secret: restic.repository_secret.clone(),
        }));
    }
    if let Some(rclone) = &spec.rclone {
        return Ok(MoverProfile::Rclone(RcloneParams {
            direction: direction(rclone.direction),
            data_pvc: rclone.data_volume_claim.clone(),
            destination_path: rclone.destination_path.clone(),
            config_section: rclone.config_section.clone(),
            config_secret: rclone.config_secret.clone(),
        }));
    }
    Err(Error::validation(
        "One of rsync, restic or rclone must be specified",
    ))
}

/// Build the desired Job state for a DataMover
pub fn desired_job(dm: &DataMover, config: &MoverConfig) -> Result<DesiredJob> {
    let mut builder = DesiredJob::builder()
        .profile(mover_profile(dm)?)
        .paused(dm.spec.paused);
    if let Some(sa) = &dm.spec.service_account_name {
        builder = builder.service_account(sa.clone());
    }
    for (name, value) in &dm.spec.extra_env {
        builder = builder.env(name.clone(), value.clone());
    }
    builder.build(config)
}

/// Name of the mover Job for a DataMover
pub fn job_name(dm: &DataMover, mover: &str) -> String {
    format!("scribe-{}-{}", mover, dm.name_any())
}

/// Ready condition and summary fields written to the status
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub phase: &'static str,
    pub message: String,
    pub active: bool,
    pub job_name: Option<String>,
    pub last_operation: Option<String>,
    pub reason: &'static str,
}

impl StatusUpdate {
    fn ready(&self) -> &'static str {
        if self.active {
            "True"
        } else {
            "False"
        }
    }

    /// Whether `current` already says what this update would write
    pub fn is_recorded(&self, current: Option<&DataMoverStatus>, generation: Option<i64>) -> bool {
        let Some(current) = current else {
            return false;
        };
        current.phase.as_deref() == Some(self.phase)
            && current.message.as_deref() == Some(self.message.as_str())
            && current.active == self.active
            && current.job_name == self.job_name
            && current.last_operation == self.last_operation
            && current.observed_generation == generation
            && ready_condition(current).map(|c| c.status.as_str()) == Some(self.ready())
    }

    /// Build the status body, keeping the transition time while the
    /// condition status holds
    pub fn to_status(
        &self,
        current: Option<&DataMoverStatus>,
        generation: Option<i64>,
        now: DateTime<Utc>,
    ) -> DataMoverStatus {
        let last_transition_time = current
            .and_then(ready_condition)
            .filter(|c| c.status == self.ready())
            .map(|c| c.last_transition_time)
            .unwrap_or(now);

        DataMoverStatus {
            phase: Some(self.phase.to_string()),
            message: Some(self.message.clone()),
            active: self.active,
            job_name: self.job_name.clone(),
            last_operation: self.last_operation.clone(),
            last_reconcile_time: Some(now),
            observed_generation: generation,
            conditions: vec![Condition {
                condition_type: READY_CONDITION.to_string(),
                status: self.ready().to_string(),
                last_transition_time,
                reason: Some(self.reason.to_string()),
                message: Some(self.message.clone()),
            }],
        }
    }
}

fn ready_condition(status: &DataMoverStatus) -> Option<&Condition> {
    status
        .conditions
        .iter()
        .find(|c| c.condition_type == READY_CONDITION)
}

/// Job left behind by a previous mover selection, if any
pub fn superseded_job<'a>(dm: &'a DataMover, job_name: &str) -> Option<&'a str> {
    dm.status
        .as_ref()
        .and_then(|s| s.job_name.as_deref())
        .filter(|previous| *previous != job_name)
}

/// Reconcile the mover Job and record the outcome in the status
pub async fn sync_job(
    dm: &DataMover,
    client: &Client,
    namespace: &str,
    config: Arc<MoverConfig>,
    cancel: &CancellationToken,
) -> Result<Action> {
    let name = dm.name_any();

    let desired = match validate(dm).and_then(|_| desired_job(dm, &config)) {
        Ok(desired) => desired,
        Err(e) => {
            warn!(name = %name, error = %e, "Validation failed");
            update_status_failed(dm, client, namespace, None, &e.to_string()).await?;
            return Ok(Action::requeue(Duration::from_secs(300)));
        }
    };

    let job_name = job_name(dm, desired.mover());
    let jobs = KubeJobClient::new(client.clone());

    if let Some(previous) = superseded_job(dm, &job_name) {
        info!(name = %name, previous = %previous, job = %job_name, "Mover changed");
        remove_job(&jobs, previous, namespace, cancel).await?;
    }

    let reconciler = JobReconciler::new(dm, job_name.as_str(), namespace, config);
    let outcome = match reconciler.reconcile(&jobs, &desired, cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if !e.is_retryable() {
                update_status_failed(dm, client, namespace, Some(job_name.as_str()), &e.to_string())
                    .await?;
            }
            return Err(e);
        }
    };

    match outcome {
        ReconcileOutcome::Active(operation) => {
            metrics::JOB_OPERATIONS
                .with_label_values(&[desired.mover(), &operation.to_string()])
                .inc();

            let (phase, message) = if desired.gate().is_paused() {
                ("Paused", "Mover job is paused")
            } else {
                ("Running", "Mover job is reconciled")
            };
            let update = StatusUpdate {
                phase,
                message: message.to_string(),
                active: true,
                job_name: Some(job_name),
                last_operation: Some(operation.to_string()),
                reason: "JobReconciled",
            };
            update_status(dm, client, namespace, &update).await?;
            Ok(Action::requeue(Duration::from_secs(300)))
        }
        ReconcileOutcome::Abandoned => {
            info!(name = %name, job = %job_name, "Mover job abandoned after exhausting retries");
            metrics::JOBS_ABANDONED
                .with_label_values(&[namespace, desired.mover()])
                .inc();

            let update = StatusUpdate {
                phase: "Abandoned",
                message: "Mover job exceeded its retry budget and was deleted".to_string(),
                active: false,
                job_name: Some(job_name),
                last_operation: None,
                reason: "BackoffLimitExceeded",
            };
            update_status(dm, client, namespace, &update).await?;
            // the next cycle starts over with a fresh Job
            Ok(Action::requeue(Duration::from_secs(60)))
        }
    }
}

/// Update status to Failed
pub async fn update_status_failed(
    dm: &DataMover,
    client: &Client,
    namespace: &str,
    job_name: Option<&str>,
    error_message: &str,
) -> Result<()> {
    let update = StatusUpdate {
        phase: "Failed",
        message: error_message.to_string(),
        active: false,
        // keep tracking the last Job so a later mover change can remove it
        job_name: job_name
            .map(str::to_string)
            .or_else(|| dm.status.as_ref().and_then(|s| s.job_name.clone())),
        last_operation: None,
        reason: "ReconcileFailed",
    };
    update_status(dm, client, namespace, &update).await
}

/// Patch the status unless it already matches; every patch wakes the watcher
async fn update_status(
    dm: &DataMover,
    client: &Client,
    namespace: &str,
    update: &StatusUpdate,
) -> Result<()> {
    let current = dm.status.as_ref();
    let generation = dm.metadata.generation;
    if update.is_recorded(current, generation) {
        debug!(name = %dm.name_any(), phase = update.phase, "Status already up to date");
        return Ok(());
    }

    let status = update.to_status(current, generation, Utc::now());
    // cleared fields are sent as null so the merge patch removes them
    let body = json!({
        "status": {
            "phase": status.phase,
            "message": status.message,
            "active": status.active,
            "jobName": status.job_name,
            "lastOperation": status.last_operation,
            "lastReconcileTime": status.last_reconcile_time,
            "observedGeneration": status.observed_generation,
            "conditions": status.conditions,
        }
    });
    let api: Api<DataMover> = Api::namespaced(client.clone(), namespace);
    api.patch_status(
        &dm.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(body),
    )
    .await?;
    Ok(())
}
