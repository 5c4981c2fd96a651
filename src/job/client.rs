//! Access to Job objects on the API server

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client, ResourceExt};

use crate::error::{Error, Result};

/// The Job operations the reconciler needs
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Fetch a Job, `None` if it does not exist
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<Job>>;

    /// Create a Job and return it as stored
    async fn create(&self, job: &Job) -> Result<Job>;

    /// Replace a Job. The object's resourceVersion must match the stored one.
    async fn update(&self, job: &Job) -> Result<Job>;

    /// Delete a Job, letting the garbage collector remove its pods in the background
    async fn delete(&self, name: &str, namespace: &str) -> Result<()>;
}

/// [`JobClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeJobClient {
    client: Client,
}

impl KubeJobClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl std::fmt::Debug for KubeJobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeJobClient").finish_non_exhaustive()
    }
}

#[async_trait]
impl JobClient for KubeJobClient {
    async fn get(&self, name: &str, namespace: &str) -> Result<Option<Job>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn create(&self, job: &Job) -> Result<Job> {
        let namespace = job.namespace().unwrap_or_default();
        self.api(&namespace)
            .create(&PostParams::default(), job)
            .await
            .map_err(|e| map_write_error(e, &job.name_any()))
    }

    async fn update(&self, job: &Job) -> Result<Job> {
        let name = job.name_any();
        let namespace = job.namespace().unwrap_or_default();
        self.api(&namespace)
            .replace(&name, &PostParams::default(), job)
            .await
            .map_err(|e| map_write_error(e, &name))
    }

    async fn delete(&self, name: &str, namespace: &str) -> Result<()> {
        match self.api(namespace).delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            // already gone
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Turn conflict and validation responses into their own error kinds
pub fn map_write_error(err: kube::Error, name: &str) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "Conflict" => {
            Error::Conflict {
                kind: "Job",
                name: name.to_string(),
            }
        }
        kube::Error::Api(resp) if resp.code == 422 => Error::Invalid {
            kind: "Job",
            name: name.to_string(),
            message: resp.message,
        },
        other => Error::Kube(other),
    }
}
