//! Persistence of managed resources
//!
//! Metadata/spec writes and status writes are separate operations so the
//! reconciler can move finalizers without touching status and vice versa.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use iam_common::{Error, Result};

use crate::kind::IamKind;

/// Namespace and name of a managed resource
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
}

impl ObjectKey {
    /// Key from its parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced object
    pub fn of<K: kube::Resource>(resource: &K) -> Result<Self> {
        let namespace = resource.namespace().ok_or_else(|| {
            Error::internal_with_context(
                "store",
                format!("{} has no namespace", resource.name_any()),
            )
        })?;
        Ok(Self::new(namespace, resource.name_any()))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Read and write access to resources of one kind
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Current object, `None` when it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>>;

    /// Write metadata and spec; returns the stored object
    async fn update(&self, resource: &K) -> Result<K>;

    /// Write status; returns the stored object
    async fn update_status(&self, resource: &K) -> Result<K>;
}

/// [`ResourceStore`] backed by the Kubernetes API
pub struct KubeResourceStore<K> {
    client: Client,
    field_manager: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeResourceStore<K> {
    /// Create a store; status patches are attributed to `field_manager`
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            _kind: PhantomData,
        }
    }
}

impl<K: IamKind> KubeResourceStore<K> {
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K: IamKind> ResourceStore<K> for KubeResourceStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>> {
        Ok(self.api(&key.namespace).get_opt(&key.name).await?)
    }

    async fn update(&self, resource: &K) -> Result<K> {
        let key = ObjectKey::of(resource)?;
        let updated = self
            .api(&key.namespace)
            .replace(&key.name, &PostParams::default(), resource)
            .await?;
        debug!(resource = %key, "Updated resource metadata");
        Ok(updated)
    }

    async fn update_status(&self, resource: &K) -> Result<K> {
        let key = ObjectKey::of(resource)?;
        let patch = json!({ "status": resource.status() });
        let updated = self
            .api(&key.namespace)
            .patch_status(
                &key.name,
                &PatchParams::apply(&self.field_manager),
                &Patch::Merge(&patch),
            )
            .await?;
        debug!(resource = %key, "Updated resource status");
        Ok(updated)
    }
}
