//! Controller owner references
//!
//! The owner reference lets the garbage collector delete the Job when the
//! owning resource goes away. It is never used to mutate the owner.

use k8s_openapi::api::batch::v1::Job;
use kube::{Resource, ResourceExt};

use crate::error::{Error, Result};

/// Make `owner` the controller of `job`.
///
/// Fails if the owner is missing a name or uid, if a namespaced owner lives
/// in another namespace, or if the Job is already controlled by something
/// else. Other (non-controller) owner references are kept.
pub fn set_controller_reference<K>(owner: &K, job: &mut Job) -> Result<()>
where
    K: Resource<DynamicType = ()>,
{
    let owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
        Error::owner_reference(format!(
            "{} '{}' has no name or uid",
            K::kind(&()),
            owner.name_any()
        ))
    })?;

    if let Some(owner_ns) = owner.meta().namespace.as_deref() {
        let job_ns = job.meta().namespace.as_deref().unwrap_or_default();
        if owner_ns != job_ns {
            return Err(Error::owner_reference(format!(
                "cross-namespace owner references are not allowed: owner {}/{}, job {}/{}",
                owner_ns,
                owner_ref.name,
                job_ns,
                job.name_any()
            )));
        }
    }

    let refs = job.meta_mut().owner_references.get_or_insert_with(Vec::new);

    if let Some(existing) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner_ref.uid)
    {
        return Err(Error::owner_reference(format!(
            "job is already controlled by {} '{}'",
            existing.kind, existing.name
        )));
    }

    match refs.iter_mut().find(|r| r.uid == owner_ref.uid) {
        Some(existing) => *existing = owner_ref,
        None => refs.push(owner_ref),
    }
    Ok(())
}
