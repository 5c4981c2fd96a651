//! Mover profiles
//!
//! Each mover (rsync, restic, rclone) turns its parameters into a
//! [`DesiredTemplate`]: the single container, its volumes and labels that
//! the Job should run. Builders are pure; they never talk to the API server.

mod env;
mod rclone;
mod restic;
mod rsync;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaimVolumeSource, SecretVolumeSource, Volume,
};

use crate::config::MoverConfig;

pub use env::{env_from_secret, env_value};
pub use rclone::RcloneParams;
pub use restic::{ResticAction, ResticParams};
pub use rsync::RsyncParams;

/// Name of the volume holding the data being replicated
pub const DATA_VOLUME_NAME: &str = "data";

/// File mode for secret volumes holding credentials (owner read/write)
const SECRET_FILE_MODE: i32 = 0o600;

/// Which side of the replication this Job is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Source,
    Destination,
}

impl Direction {
    pub fn from_is_source(is_source: bool) -> Self {
        if is_source {
            Direction::Source
        } else {
            Direction::Destination
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Source => "source",
            Direction::Destination => "destination",
        }
    }
}

/// The pod shape a mover wants the Job to run.
///
/// Movers are single-container pods, so the container is held directly
/// rather than in a list.
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredTemplate {
    labels: BTreeMap<String, String>,
    container: Container,
    volumes: Vec<Volume>,
    service_account_name: Option<String>,
}

impl DesiredTemplate {
    pub(crate) fn new(container: Container, volumes: Vec<Volume>) -> Self {
        Self {
            labels: BTreeMap::new(),
            container,
            volumes,
            service_account_name: None,
        }
    }

    pub(crate) fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn primary_container(&self) -> &Container {
        &self.container
    }

    pub fn primary_container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn service_account_name(&self) -> Option<&str> {
        self.service_account_name.as_deref()
    }

    pub fn set_service_account_name(&mut self, name: impl Into<String>) {
        self.service_account_name = Some(name.into());
    }

    /// Append an env var to the primary container
    pub fn push_env(&mut self, var: EnvVar) {
        self.container.env.get_or_insert_with(Vec::new).push(var);
    }

    /// The container list as it goes into the pod spec
    pub fn containers(&self) -> Vec<Container> {
        vec![self.container.clone()]
    }
}

/// One of the supported movers, with its parameters
#[derive(Clone, Debug, PartialEq)]
pub enum MoverProfile {
    Rsync(RsyncParams),
    Restic(ResticParams),
    Rclone(RcloneParams),
}

impl MoverProfile {
    pub fn name(&self) -> &'static str {
        match self {
            MoverProfile::Rsync(_) => "rsync",
            MoverProfile::Restic(_) => "restic",
            MoverProfile::Rclone(_) => "rclone",
        }
    }

    /// Build the pod template for this mover
    pub fn build_template(&self, config: &MoverConfig) -> DesiredTemplate {
        match self {
            MoverProfile::Rsync(params) => params.build(config),
            MoverProfile::Restic(params) => params.build(config),
            MoverProfile::Rclone(params) => params.build(config),
        }
    }
}

pub(crate) fn pvc_volume(name: &str, claim_name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim_name.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn secret_volume(name: &str, secret_name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            default_mode: Some(SECRET_FILE_MODE),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_profiles() -> Vec<MoverProfile> {
        vec![
            MoverProfile::Rsync(RsyncParams {
                direction: Direction::Source,
                data_pvc: "data-pvc".to_string(),
                ssh_secret: "ssh-keys".to_string(),
                labels: BTreeMap::new(),
            }),
            MoverProfile::Restic(ResticParams {
                action: ResticAction::BackupOnly,
                forget_options: "--keep-last 3".to_string(),
                data_pvc: "data-pvc".to_string(),
                cache_pvc: "cache-pvc".to_string(),
                repository_secret: "restic-repo".to_string(),
            }),
            MoverProfile::Rclone(RcloneParams {
                direction: Direction::Destination,
                data_pvc: "data-pvc".to_string(),
                destination_path: "bucket/path".to_string(),
                config_section: "s3".to_string(),
                config_secret: "rclone-conf".to_string(),
            }),
        ]
    }

    #[test]
    fn every_profile_mounts_data_at_fixed_path() {
        let config = MoverConfig::default();
        for profile in all_profiles() {
            let template = profile.build_template(&config);
            assert_eq!(template.containers().len(), 1, "{}", profile.name());

            let mounts = template.primary_container().volume_mounts.as_ref().unwrap();
            let data = mounts
                .iter()
                .find(|m| m.name == DATA_VOLUME_NAME)
                .unwrap_or_else(|| panic!("{} has no data mount", profile.name()));
            assert_eq!(data.mount_path, config.data_mount_path);

            let volume = template
                .volumes()
                .iter()
                .find(|v| v.name == DATA_VOLUME_NAME)
                .unwrap();
            assert_eq!(
                volume.persistent_volume_claim.as_ref().unwrap().claim_name,
                "data-pvc"
            );
        }
    }

    #[test]
    fn data_mount_follows_config() {
        let config = MoverConfig {
            data_mount_path: "/mnt/volume".to_string(),
            ..MoverConfig::default()
        };
        for profile in all_profiles() {
            let template = profile.build_template(&config);
            let mounts = template.primary_container().volume_mounts.clone().unwrap();
            assert!(mounts
                .iter()
                .any(|m| m.name == DATA_VOLUME_NAME && m.mount_path == "/mnt/volume"));
        }
    }

    #[test]
    fn push_env_appends_to_primary_container() {
        let mut template = all_profiles()[0].build_template(&MoverConfig::default());
        template.push_env(env_value("EXTRA", "1"));
        let env = template.primary_container().env.as_ref().unwrap();
        assert_eq!(env.last().unwrap().name, "EXTRA");
    }

    #[test]
    fn secret_volumes_are_owner_read_write() {
        let volume = secret_volume("keys", "ssh-keys");
        let secret = volume.secret.unwrap();
        assert_eq!(secret.default_mode, Some(0o600));
        assert_eq!(secret.secret_name.as_deref(), Some("ssh-keys"));
    }

    #[test]
    fn direction_strings() {
        assert_eq!(Direction::from_is_source(true).as_str(), "source");
        assert_eq!(Direction::from_is_source(false).as_str(), "destination");
    }
}
