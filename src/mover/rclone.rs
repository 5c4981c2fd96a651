//! rclone mover: sync against a remote endpoint

use k8s_openapi::api::core::v1::{Container, SecurityContext, VolumeMount};

use super::{env_value, pvc_volume, secret_volume, DesiredTemplate, Direction, DATA_VOLUME_NAME};
use crate::config::MoverConfig;

const CONFIG_VOLUME_NAME: &str = "rclone-secret";

/// Parameters for the rclone mover
#[derive(Clone, Debug, PartialEq)]
pub struct RcloneParams {
    pub direction: Direction,
    pub data_pvc: String,
    /// Remote path to sync with
    pub destination_path: String,
    /// Section of rclone.conf describing the remote
    pub config_section: String,
    /// Secret holding rclone.conf
    pub config_secret: String,
}

impl RcloneParams {
    pub(crate) fn build(&self, config: &MoverConfig) -> DesiredTemplate {
        let config_file = format!(
            "{}/rclone.conf",
            config.rclone_config_mount_path.trim_end_matches('/')
        );

        let container = Container {
            name: "rclone".to_string(),
            env: Some(vec![
                env_value("RCLONE_DEST_PATH", &self.destination_path),
                env_value("DIRECTION", self.direction.as_str()),
                env_value("RCLONE_CONFIG", &config_file),
                env_value("RCLONE_CONFIG_SECTION", &self.config_section),
                env_value("MOUNT_PATH", &config.data_mount_path),
            ]),
            command: Some(vec![
                "/bin/bash".to_string(),
                "-c".to_string(),
                "./active.sh".to_string(),
            ]),
            image: Some(config.rclone_image.clone()),
            security_context: Some(SecurityContext {
                run_as_user: Some(0),
                ..Default::default()
            }),
            volume_mounts: Some(vec![
                VolumeMount {
                    name: DATA_VOLUME_NAME.to_string(),
                    mount_path: config.data_mount_path.clone(),
                    ..Default::default()
                },
                VolumeMount {
                    name: CONFIG_VOLUME_NAME.to_string(),
                    mount_path: config.rclone_config_mount_path.clone(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        let volumes = vec![
            pvc_volume(DATA_VOLUME_NAME, &self.data_pvc),
            secret_volume(CONFIG_VOLUME_NAME, &self.config_secret),
        ];

        DesiredTemplate::new(container, volumes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(direction: Direction) -> RcloneParams {
        RcloneParams {
            direction,
            data_pvc: "data-pvc".to_string(),
            destination_path: "scribe-bucket/app".to_string(),
            config_section: "aws-s3".to_string(),
            config_secret: "rclone-conf".to_string(),
        }
    }

    fn env(template: &DesiredTemplate, name: &str) -> Option<String> {
        template
            .primary_container()
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.clone())
    }

    #[test]
    fn passes_remote_settings_as_plain_env() {
        let config = MoverConfig::default();
        let template = params(Direction::Source).build(&config);
        assert_eq!(env(&template, "RCLONE_DEST_PATH").as_deref(), Some("scribe-bucket/app"));
        assert_eq!(env(&template, "DIRECTION").as_deref(), Some("source"));
        assert_eq!(env(&template, "RCLONE_CONFIG_SECTION").as_deref(), Some("aws-s3"));
        assert_eq!(
            env(&template, "RCLONE_CONFIG").as_deref(),
            Some("/rclone-config/rclone.conf")
        );
        assert_eq!(env(&template, "MOUNT_PATH"), Some(config.data_mount_path));
    }

    #[test]
    fn destination_direction_tag() {
        let template = params(Direction::Destination).build(&MoverConfig::default());
        assert_eq!(env(&template, "DIRECTION").as_deref(), Some("destination"));
    }

    #[test]
    fn mounts_config_secret_and_runs_as_root() {
        let config = MoverConfig::default();
        let template = params(Direction::Source).build(&config);
        let container = template.primary_container();
        assert_eq!(
            container.command.as_ref().unwrap(),
            &vec!["/bin/bash", "-c", "./active.sh"]
        );
        assert_eq!(
            container.security_context.as_ref().unwrap().run_as_user,
            Some(0)
        );
        let mounts = container.volume_mounts.as_ref().unwrap();
        assert!(mounts
            .iter()
            .any(|m| m.name == CONFIG_VOLUME_NAME && m.mount_path == config.rclone_config_mount_path));
        assert!(template.labels().is_empty());
    }
}
