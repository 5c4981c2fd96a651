//! Mover configuration
//!
//! A single immutable value holding the retry budget, the fixed mount paths
//! and the mover container images. It is built once at startup and shared
//! with every Job reconciler and profile builder.

use std::env;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default number of failed Job attempts tolerated before the Job is abandoned
pub const DEFAULT_BACKOFF_LIMIT: i32 = 2;

const DEFAULT_RSYNC_IMAGE: &str = "quay.io/backube/scribe-mover-rsync:latest";
const DEFAULT_RESTIC_IMAGE: &str = "quay.io/backube/scribe-mover-restic:latest";
const DEFAULT_RCLONE_IMAGE: &str = "quay.io/backube/scribe-mover-rclone:latest";

/// Settings shared by all movers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoverConfig {
    /// Failed attempts allowed before the Job is deleted
    pub backoff_limit: i32,
    /// Where the data volume is mounted, for every mover
    pub data_mount_path: String,
    /// Where restic keeps its cache volume
    pub restic_cache_mount_path: String,
    /// Where the rclone config secret is mounted
    pub rclone_config_mount_path: String,
    /// Where the rsync ssh keys secret is mounted
    pub ssh_keys_mount_path: String,
    /// Container image for the rsync mover
    pub rsync_image: String,
    /// Container image for the restic mover
    pub restic_image: String,
    /// Container image for the rclone mover
    pub rclone_image: String,
    /// Numeric uid the rsync mover runs as
    pub rsync_run_as_user: i64,
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            backoff_limit: DEFAULT_BACKOFF_LIMIT,
            data_mount_path: "/data".to_string(),
            restic_cache_mount_path: "/cache".to_string(),
            rclone_config_mount_path: "/rclone-config".to_string(),
            ssh_keys_mount_path: "/keys".to_string(),
            rsync_image: DEFAULT_RSYNC_IMAGE.to_string(),
            restic_image: DEFAULT_RESTIC_IMAGE.to_string(),
            rclone_image: DEFAULT_RCLONE_IMAGE.to_string(),
            rsync_run_as_user: 1000,
        }
    }
}

impl MoverConfig {
    /// Build the configuration from the process environment.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(limit) = parse_var::<i32>(&lookup, "SCRIBE_BACKOFF_LIMIT")? {
            config.backoff_limit = limit;
        }
        if let Some(uid) = parse_var::<i64>(&lookup, "SCRIBE_RSYNC_RUN_AS_USER")? {
            config.rsync_run_as_user = uid;
        }
        if let Some(image) = lookup("SCRIBE_RSYNC_IMAGE") {
            config.rsync_image = image;
        }
        if let Some(image) = lookup("SCRIBE_RESTIC_IMAGE") {
            config.restic_image = image;
        }
        if let Some(image) = lookup("SCRIBE_RCLONE_IMAGE") {
            config.rclone_image = image;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.backoff_limit < 1 {
            return Err(Error::config(format!(
                "backoff limit must be at least 1, got {}",
                self.backoff_limit
            )));
        }
        for (what, image) in [
            ("rsync", &self.rsync_image),
            ("restic", &self.restic_image),
            ("rclone", &self.rclone_image),
        ] {
            if image.is_empty() {
                return Err(Error::config(format!("{} image must not be empty", what)));
            }
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::config(format!("Invalid value '{}' for {}: {}", raw, key, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_budget_of_two() {
        let config = MoverConfig::default();
        assert_eq!(config.backoff_limit, 2);
        assert_eq!(config.data_mount_path, "/data");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = MoverConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, MoverConfig::default());
    }

    #[test]
    fn environment_overrides_images_and_budget() {
        let config = MoverConfig::from_lookup(lookup_from(&[
            ("SCRIBE_BACKOFF_LIMIT", "4"),
            ("SCRIBE_RESTIC_IMAGE", "registry.local/restic:v2"),
            ("SCRIBE_RSYNC_RUN_AS_USER", "65534"),
        ]))
        .unwrap();
        assert_eq!(config.backoff_limit, 4);
        assert_eq!(config.restic_image, "registry.local/restic:v2");
        assert_eq!(config.rsync_run_as_user, 65534);
        assert_eq!(config.rclone_image, DEFAULT_RCLONE_IMAGE);
    }

    #[test]
    fn unparsable_budget_is_config_error() {
        let err = MoverConfig::from_lookup(lookup_from(&[("SCRIBE_BACKOFF_LIMIT", "two")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("SCRIBE_BACKOFF_LIMIT"));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let err =
            MoverConfig::from_lookup(lookup_from(&[("SCRIBE_BACKOFF_LIMIT", "0")])).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }
}
