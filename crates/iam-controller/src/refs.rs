//! Lookups of other IAM resources referenced from a spec

use async_trait::async_trait;
use kube::{Api, Client};
#[cfg(test)]
use mockall::automock;

use iam_common::crd::{AccessGroup, CustomRole};
use iam_common::Result;

/// Reads resources an access policy refers to
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// AccessGroup resource by namespace and name
    async fn access_group(&self, namespace: &str, name: &str) -> Result<Option<AccessGroup>>;

    /// CustomRole resource by namespace and name
    async fn custom_role(&self, namespace: &str, name: &str) -> Result<Option<CustomRole>>;
}

/// [`ReferenceResolver`] backed by the Kubernetes API
pub struct KubeReferenceResolver {
    client: Client,
}

impl KubeReferenceResolver {
    /// Create a resolver using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferenceResolver for KubeReferenceResolver {
    async fn access_group(&self, namespace: &str, name: &str) -> Result<Option<AccessGroup>> {
        let api: Api<AccessGroup> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn custom_role(&self, namespace: &str, name: &str) -> Result<Option<CustomRole>> {
        let api: Api<CustomRole> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
