//! Environment variable bindings for mover containers

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, SecretKeySelector};

/// Bind `key` from the Secret `secret_name` to an env var of the same name.
///
/// The kubelet resolves the value when the pod starts. With `optional` set,
/// a Secret lacking the key leaves the variable unset instead of failing
/// container startup.
pub fn env_from_secret(secret_name: &str, key: &str, optional: bool) -> EnvVar {
    EnvVar {
        name: key.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret_name.to_owned().into(),
                key: key.to_string(),
                optional: Some(optional),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A plain name=value env var
pub fn env_value(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}
