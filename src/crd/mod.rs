//! Custom Resource Definitions for the Scribe mover operator

mod data_mover;

pub use data_mover::*;

use kube::CustomResourceExt;

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![serde_yaml::to_string(&DataMover::crd())?])
}
