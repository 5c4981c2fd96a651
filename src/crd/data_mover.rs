//! DataMover Custom Resource Definition

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// DataMover resource specification
///
/// Exactly one of `rsync`, `restic` or `rclone` must be set.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "scribe.dev",
    version = "v1alpha1",
    kind = "DataMover",
    plural = "datamovers",
    singular = "datamover",
    shortname = "dm",
    namespaced,
    status = "DataMoverStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Active", "type": "boolean", "jsonPath": ".status.active"}"#,
    printcolumn = r#"{"name": "Last Operation", "type": "string", "jsonPath": ".status.lastOperation"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DataMoverSpec {
    /// Stop scheduling new mover pods
    #[serde(default)]
    pub paused: bool,

    /// Service account the mover pod runs as
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Extra environment variables for the mover container
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_env: BTreeMap<String, String>,

    /// rsync over ssh
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsync: Option<RsyncSpec>,

    /// restic backup/restore
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restic: Option<ResticSpec>,

    /// rclone remote sync
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rclone: Option<RcloneSpec>,
}

/// Replication direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum DirectionSpec {
    #[default]
    Source,
    Destination,
}

/// rsync mover specification
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RsyncSpec {
    #[serde(default)]
    pub direction: DirectionSpec,
    /// PVC holding the data
    pub data_volume_claim: String,
    /// Secret holding the ssh keys
    pub ssh_keys_secret: String,
}

/// restic action
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ResticActionSpec {
    #[default]
    BackupOnly,
    BackupAndPrune,
    Restore,
}

/// restic mover specification
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResticSpec {
    #[serde(default)]
    pub action: ResticActionSpec,
    /// Retention options passed to `restic forget` (e.g. `--keep-daily 7`)
    #[serde(default)]
    pub forget_options: String,
    pub data_volume_claim: String,
    pub cache_volume_claim: String,
    /// Secret with RESTIC_REPOSITORY, RESTIC_PASSWORD and backend credentials
    pub repository_secret: String,
}

/// rclone mover specification
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RcloneSpec {
    #[serde(default)]
    pub direction: DirectionSpec,
    pub data_volume_claim: String,
    /// Remote path to sync with
    pub destination_path: String,
    /// Section of rclone.conf to use
    pub config_section: String,
    /// Secret containing rclone.conf
    pub config_secret: String,
}

/// DataMover status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataMoverStatus {
    /// Current phase (Running, Paused, Abandoned, Failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Whether the mover Job is still in play
    #[serde(default)]
    pub active: bool,

    /// Name of the mover Job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,

    /// What the last reconcile did to the Job (created, updated, unchanged)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<String>,

    /// Last time the Job was reconciled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<DateTime<Utc>>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    pub last_transition_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
