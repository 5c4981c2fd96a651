//! rsync mover: push/pull directory sync over ssh

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Capabilities, Container, SecurityContext, VolumeMount};

use super::{pvc_volume, secret_volume, DesiredTemplate, Direction, DATA_VOLUME_NAME};
use crate::config::MoverConfig;

const KEYS_VOLUME_NAME: &str = "keys";

/// Parameters for the rsync mover
#[derive(Clone, Debug, PartialEq)]
pub struct RsyncParams {
    pub direction: Direction,
    /// PVC holding the data to sync
    pub data_pvc: String,
    /// Secret holding the ssh keys
    pub ssh_secret: String,
    /// Pod labels; the destination's Service selects on these
    pub labels: BTreeMap<String, String>,
}

impl RsyncParams {
    pub(crate) fn build(&self, config: &MoverConfig) -> DesiredTemplate {
        let script = match self.direction {
            Direction::Source => "/source.sh",
            Direction::Destination => "/destination.sh",
        };

        let container = Container {
            name: "rsync".to_string(),
            command: Some(vec![
                "/bin/bash".to_string(),
                "-c".to_string(),
                script.to_string(),
            ]),
            image: Some(config.rsync_image.clone()),
            security_context: Some(SecurityContext {
                capabilities: Some(Capabilities {
                    add: Some(vec!["AUDIT_WRITE".to_string(), "SYS_CHROOT".to_string()]),
                    ..Default::default()
                }),
                run_as_user: Some(config.rsync_run_as_user),
                ..Default::default()
            }),
            volume_mounts: Some(vec![
                VolumeMount {
                    name: DATA_VOLUME_NAME.to_string(),
                    mount_path: config.data_mount_path.clone(),
                    ..Default::default()
                },
                VolumeMount {
                    name: KEYS_VOLUME_NAME.to_string(),
                    mount_path: config.ssh_keys_mount_path.clone(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        let volumes = vec![
            pvc_volume(DATA_VOLUME_NAME, &self.data_pvc),
            secret_volume(KEYS_VOLUME_NAME, &self.ssh_secret),
        ];

        DesiredTemplate::new(container, volumes).with_labels(self.labels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(direction: Direction) -> RsyncParams {
        let mut labels = BTreeMap::new();
        labels.insert("app.kubernetes.io/name".to_string(), "scribe-rsync".to_string());
        RsyncParams {
            direction,
            data_pvc: "data-pvc".to_string(),
            ssh_secret: "ssh-keys".to_string(),
            labels,
        }
    }

    #[test]
    fn source_runs_source_script() {
        let template = params(Direction::Source).build(&MoverConfig::default());
        assert_eq!(
            template.primary_container().command.as_ref().unwrap(),
            &vec!["/bin/bash", "-c", "/source.sh"]
        );
    }

    #[test]
    fn destination_runs_destination_script() {
        let template = params(Direction::Destination).build(&MoverConfig::default());
        assert_eq!(
            template.primary_container().command.as_ref().unwrap(),
            &vec!["/bin/bash", "-c", "/destination.sh"]
        );
    }

    #[test]
    fn keeps_chroot_capabilities_as_unprivileged_user() {
        let config = MoverConfig::default();
        let template = params(Direction::Source).build(&config);
        let ctx = template.primary_container().security_context.as_ref().unwrap();
        assert_eq!(ctx.run_as_user, Some(config.rsync_run_as_user));
        assert_ne!(ctx.run_as_user, Some(0));
        assert_eq!(
            ctx.capabilities.as_ref().unwrap().add.as_ref().unwrap(),
            &vec!["AUDIT_WRITE", "SYS_CHROOT"]
        );
    }

    #[test]
    fn carries_caller_labels() {
        let template = params(Direction::Destination).build(&MoverConfig::default());
        assert_eq!(
            template.labels().get("app.kubernetes.io/name").map(String::as_str),
            Some("scribe-rsync")
        );
    }

    #[test]
    fn mounts_ssh_keys_secret() {
        let config = MoverConfig::default();
        let template = params(Direction::Source).build(&config);
        let mounts = template.primary_container().volume_mounts.as_ref().unwrap();
        assert!(mounts
            .iter()
            .any(|m| m.name == KEYS_VOLUME_NAME && m.mount_path == config.ssh_keys_mount_path));

        let keys = template
            .volumes()
            .iter()
            .find(|v| v.name == KEYS_VOLUME_NAME)
            .unwrap();
        let secret = keys.secret.as_ref().unwrap();
        assert_eq!(secret.secret_name.as_deref(), Some("ssh-keys"));
        assert_eq!(secret.default_mode, Some(0o600));
    }
}
