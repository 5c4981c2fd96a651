//! restic mover: incremental backup with retention, and restore

use k8s_openapi::api::core::v1::{Container, EnvVar, SecurityContext, VolumeMount};

use super::{env_from_secret, env_value, pvc_volume, DesiredTemplate, DATA_VOLUME_NAME};
use crate::config::MoverConfig;

const CACHE_VOLUME_NAME: &str = "cache";

/// Variables that must be present in the repository Secret
const REQUIRED_SECRET_VARS: &[&str] = &["RESTIC_REPOSITORY", "RESTIC_PASSWORD"];

/// Backend credentials restic understands. Each is copied from the Secret
/// only if present, so unused backends contribute nothing.
/// See <https://restic.readthedocs.io/en/stable/040_backup.html#environment-variables>
const OPTIONAL_SECRET_VARS: &[&str] = &[
    // S3
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_DEFAULT_REGION",
    // Swift v1
    "ST_AUTH",
    "ST_USER",
    "ST_KEY",
    // OpenStack
    "OS_AUTH_URL",
    "OS_REGION_NAME",
    "OS_USERNAME",
    "OS_USER_ID",
    "OS_PASSWORD",
    "OS_TENANT_ID",
    "OS_TENANT_NAME",
    "OS_USER_DOMAIN_NAME",
    "OS_USER_DOMAIN_ID",
    "OS_PROJECT_NAME",
    "OS_PROJECT_DOMAIN_NAME",
    "OS_PROJECT_DOMAIN_ID",
    "OS_TRUST_ID",
    "OS_APPLICATION_CREDENTIAL_ID",
    "OS_APPLICATION_CREDENTIAL_NAME",
    "OS_APPLICATION_CREDENTIAL_SECRET",
    "OS_STORAGE_URL",
    "OS_AUTH_TOKEN",
    // Backblaze B2
    "B2_ACCOUNT_ID",
    "B2_ACCOUNT_KEY",
    // Azure
    "AZURE_ACCOUNT_NAME",
    "AZURE_ACCOUNT_KEY",
    // Google Cloud Storage
    "GOOGLE_PROJECT_ID",
    "GOOGLE_APPLICATION_CREDENTIALS",
];

/// What the restic Job should do
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResticAction {
    #[default]
    BackupOnly,
    BackupAndPrune,
    Restore,
}

impl ResticAction {
    /// Arguments passed to the mover entrypoint
    pub fn args(&self) -> Vec<String> {
        let verbs: &[&str] = match self {
            ResticAction::BackupOnly => &["backup"],
            ResticAction::BackupAndPrune => &["backup", "prune"],
            ResticAction::Restore => &["restore"],
        };
        verbs.iter().map(|v| v.to_string()).collect()
    }
}

/// Parameters for the restic mover
#[derive(Clone, Debug, PartialEq)]
pub struct ResticParams {
    pub action: ResticAction,
    /// Retention policy passed to `restic forget`
    pub forget_options: String,
    pub data_pvc: String,
    pub cache_pvc: String,
    /// Secret holding the repository location, password and backend credentials
    pub repository_secret: String,
}

impl ResticParams {
    pub(crate) fn build(&self, config: &MoverConfig) -> DesiredTemplate {
        let mut env: Vec<EnvVar> = vec![
            env_value("FORGET_OPTIONS", &self.forget_options),
            env_value("DATA_DIR", &config.data_mount_path),
            env_value("RESTIC_CACHE_DIR", &config.restic_cache_mount_path),
        ];
        env.extend(
            REQUIRED_SECRET_VARS
                .iter()
                .map(|key| env_from_secret(&self.repository_secret, key, false)),
        );
        env.extend(
            OPTIONAL_SECRET_VARS
                .iter()
                .map(|key| env_from_secret(&self.repository_secret, key, true)),
        );

        let container = Container {
            name: "restic".to_string(),
            env: Some(env),
            command: Some(vec!["/entry.sh".to_string()]),
            args: Some(self.action.args()),
            image: Some(config.restic_image.clone()),
            // root, so restores can recreate arbitrary file ownership
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
                    name: CACHE_VOLUME_NAME.to_string(),
                    mount_path: config.restic_cache_mount_path.clone(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        let volumes = vec![
            pvc_volume(DATA_VOLUME_NAME, &self.data_pvc),
            pvc_volume(CACHE_VOLUME_NAME, &self.cache_pvc),
        ];

        DesiredTemplate::new(container, volumes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(action: ResticAction) -> ResticParams {
        ResticParams {
            action,
            forget_options: "--keep-daily 7".to_string(),
            data_pvc: "data-pvc".to_string(),
            cache_pvc: "cache-pvc".to_string(),
            repository_secret: "restic-repo".to_string(),
        }
    }

    fn env_var<'a>(template: &'a DesiredTemplate, name: &str) -> &'a EnvVar {
        template
            .primary_container()
            .env
            .as_ref()
            .unwrap()
            .iter()
            .find(|e| e.name == name)
            .unwrap_or_else(|| panic!("missing env {}", name))
    }

    #[test]
    fn action_selects_args() {
        let config = MoverConfig::default();
        let args = |action| params(action).build(&config).primary_container().args.clone();
        assert_eq!(args(ResticAction::BackupOnly).unwrap(), vec!["backup"]);
        assert_eq!(
            args(ResticAction::BackupAndPrune).unwrap(),
            vec!["backup", "prune"]
        );
        assert_eq!(args(ResticAction::Restore).unwrap(), vec!["restore"]);
    }

    #[test]
    fn repository_and_password_are_mandatory() {
        let template = params(ResticAction::BackupOnly).build(&MoverConfig::default());
        for name in REQUIRED_SECRET_VARS {
            let selector = env_var(&template, name)
                .value_from
                .as_ref()
                .and_then(|s| s.secret_key_ref.as_ref())
                .unwrap();
            assert_eq!(selector.optional, Some(false), "{}", name);
        }
    }

    #[test]
    fn backend_credentials_are_optional() {
        let template = params(ResticAction::BackupOnly).build(&MoverConfig::default());
        let env = template.primary_container().env.as_ref().unwrap();
        let optional: Vec<_> = env
            .iter()
            .filter_map(|e| e.value_from.as_ref())
            .filter_map(|s| s.secret_key_ref.as_ref())
            .filter(|s| s.optional == Some(true))
            .collect();
        assert_eq!(optional.len(), OPTIONAL_SECRET_VARS.len());
        assert_eq!(env.len(), 3 + REQUIRED_SECRET_VARS.len() + OPTIONAL_SECRET_VARS.len());
    }

    #[test]
    fn plain_env_points_at_mounts() {
        let config = MoverConfig::default();
        let template = params(ResticAction::Restore).build(&config);
        assert_eq!(
            env_var(&template, "FORGET_OPTIONS").value.as_deref(),
            Some("--keep-daily 7")
        );
        assert_eq!(
            env_var(&template, "DATA_DIR").value.as_deref(),
            Some(config.data_mount_path.as_str())
        );
        assert_eq!(
            env_var(&template, "RESTIC_CACHE_DIR").value.as_deref(),
            Some(config.restic_cache_mount_path.as_str())
        );
    }

    #[test]
    fn cache_is_separate_volume() {
        let config = MoverConfig::default();
        let template = params(ResticAction::BackupOnly).build(&config);
        let cache = template
            .volumes()
            .iter()
            .find(|v| v.name == CACHE_VOLUME_NAME)
            .unwrap();
        assert_eq!(
            cache.persistent_volume_claim.as_ref().unwrap().claim_name,
            "cache-pvc"
        );
        assert_ne!(config.restic_cache_mount_path, config.data_mount_path);
    }

    #[test]
    fn runs_as_root() {
        let template = params(ResticAction::Restore).build(&MoverConfig::default());
        let ctx = template.primary_container().security_context.as_ref().unwrap();
        assert_eq!(ctx.run_as_user, Some(0));
    }
}
