//! Merge operations applied to a live Job
//!
//! Labels are merged additively so labels added by the Job controller
//! (`controller-uid`, `job-name`) survive. Containers, volumes and the
//! service account are owned outright and replaced wholesale.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Volume};

use crate::mover::DesiredTemplate;

use super::RunGate;

/// Pods are never restarted in place; the Job retries with a new pod
pub const RESTART_POLICY_NEVER: &str = "Never";

/// Pod spec fields fully owned by the reconciler
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedFields {
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
    pub service_account_name: Option<String>,
}

impl From<&DesiredTemplate> for OwnedFields {
    fn from(template: &DesiredTemplate) -> Self {
        Self {
            containers: template.containers(),
            volumes: template.volumes().to_vec(),
            service_account_name: template.service_account_name().map(str::to_string),
        }
    }
}

/// Add `labels` to the pod template, keeping labels not in `labels`
pub fn merge_labels(template: &mut PodTemplateSpec, labels: &BTreeMap<String, String>) {
    let live = template
        .metadata
        .get_or_insert_with(Default::default)
        .labels
        .get_or_insert_with(BTreeMap::new);
    for (k, v) in labels {
        live.insert(k.clone(), v.clone());
    }
}

/// Overwrite the owned pod spec fields
pub fn replace_fields(pod_spec: &mut PodSpec, fields: OwnedFields) {
    pod_spec.containers = fields.containers;
    pod_spec.volumes = Some(fields.volumes);
    pod_spec.service_account_name = fields.service_account_name;
}

/// Set the retry budget, restart policy and parallelism
pub fn apply_execution_policy(job_spec: &mut JobSpec, backoff_limit: i32, gate: RunGate) {
    job_spec.backoff_limit = Some(backoff_limit);
    job_spec.parallelism = Some(gate.parallelism());
    job_spec
        .template
        .spec
        .get_or_insert_with(Default::default)
        .restart_policy = Some(RESTART_POLICY_NEVER.to_string());
}

/// Merge `desired` into `job`: labels, execution policy, then owned fields
pub fn merge_into(job: &mut Job, desired: &DesiredTemplate, backoff_limit: i32, gate: RunGate) {
    let spec = job.spec.get_or_insert_with(Default::default);
    merge_labels(&mut spec.template, desired.labels());
    apply_execution_policy(spec, backoff_limit, gate);
    replace_fields(
        spec.template.spec.get_or_insert_with(Default::default),
        OwnedFields::from(desired),
    );
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;
    use crate::config::MoverConfig;
    use crate::mover::{Direction, MoverProfile, RsyncParams};

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn desired(label_pairs: &[(&str, &str)]) -> DesiredTemplate {
        MoverProfile::Rsync(RsyncParams {
            direction: Direction::Source,
            data_pvc: "data".to_string(),
            ssh_secret: "keys".to_string(),
            labels: labels(label_pairs),
        })
        .build_template(&MoverConfig::default())
    }

    #[test]
    fn label_merge_is_additive() {
        let mut template = PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels(&[("a", "1")])),
                ..Default::default()
            }),
            spec: None,
        };
        merge_labels(&mut template, &labels(&[("b", "2")]));
        assert_eq!(
            template.metadata.unwrap().labels.unwrap(),
            labels(&[("a", "1"), ("b", "2")])
        );
    }

    #[test]
    fn label_merge_overwrites_same_key() {
        let mut template = PodTemplateSpec::default();
        merge_labels(&mut template, &labels(&[("a", "1")]));
        merge_labels(&mut template, &labels(&[("a", "2")]));
        assert_eq!(
            template.metadata.unwrap().labels.unwrap(),
            labels(&[("a", "2")])
        );
    }

    #[test]
    fn replace_drops_foreign_containers_and_volumes() {
        let mut pod_spec = PodSpec {
            containers: vec![
                Container {
                    name: "sidecar".to_string(),
                    ..Default::default()
                },
                Container {
                    name: "rsync".to_string(),
                    ..Default::default()
                },
            ],
            volumes: Some(vec![Volume {
                name: "scratch".to_string(),
                ..Default::default()
            }]),
            service_account_name: Some("someone-else".to_string()),
            node_name: Some("node-1".to_string()),
            ..Default::default()
        };
        let template = desired(&[]);
        replace_fields(&mut pod_spec, OwnedFields::from(&template));

        assert_eq!(pod_spec.containers.len(), 1);
        assert_eq!(pod_spec.containers[0], *template.primary_container());
        assert_eq!(pod_spec.volumes.as_deref(), Some(template.volumes()));
        assert_eq!(pod_spec.service_account_name, None);
        // fields outside the owned set are untouched
        assert_eq!(pod_spec.node_name.as_deref(), Some("node-1"));
    }

    #[test]
    fn execution_policy_follows_gate() {
        let mut spec = JobSpec::default();
        apply_execution_policy(&mut spec, 2, RunGate::Paused);
        assert_eq!(spec.parallelism, Some(0));
        assert_eq!(spec.backoff_limit, Some(2));
        assert_eq!(
            spec.template.spec.as_ref().unwrap().restart_policy.as_deref(),
            Some(RESTART_POLICY_NEVER)
        );

        apply_execution_policy(&mut spec, 5, RunGate::Running);
        assert_eq!(spec.parallelism, Some(1));
        assert_eq!(spec.backoff_limit, Some(5));
    }

    #[test]
    fn merge_into_empty_job() {
        let mut job = Job::default();
        let template = desired(&[("app", "scribe")]);
        merge_into(&mut job, &template, 2, RunGate::Running);

        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(2));
        assert_eq!(spec.parallelism, Some(1));
        let pod_template = spec.template;
        assert_eq!(
            pod_template.metadata.unwrap().labels.unwrap(),
            labels(&[("app", "scribe")])
        );
        assert_eq!(pod_template.spec.unwrap().containers.len(), 1);
    }

    #[test]
    fn merge_into_is_idempotent() {
        let template = desired(&[("app", "scribe")]);
        let mut once = Job::default();
        merge_into(&mut once, &template, 2, RunGate::Running);
        let mut twice = once.clone();
        merge_into(&mut twice, &template, 2, RunGate::Running);
        assert_eq!(once, twice);
    }
}
