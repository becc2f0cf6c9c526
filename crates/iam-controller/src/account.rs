//! Account and session resolution
//!
//! Credentials and account context are read from a Secret and a ConfigMap in
//! the resource's namespace, falling back to a shared management namespace
//! named by a ConfigMap in the controller namespace. Turning credentials into
//! an authenticated session is delegated to a [`SessionFactory`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};
#[cfg(test)]
use mockall::automock;
use tracing::{debug, warn};

use iam_common::credentials::{
    management_object_name, IamCredentials, ResourceContext, CONTEXT_CONFIG_MAP,
    CREDENTIALS_SECRET, DEFAULT_NAMESPACE, MANAGEMENT_CONFIG_MAP, NAMESPACE_KEY,
};
use iam_common::{Error, IamError, Result};

use crate::iam::IamSession;

/// Resolves the remote session for resources in a namespace
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccountResolver: Send + Sync {
    /// Session and account for `namespace`
    async fn resolve(&self, namespace: &str) -> Result<IamSession>;
}

/// Read access to namespaced Secrets and ConfigMaps
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// String data of a Secret, `None` when it does not exist
    async fn secret_data(&self, namespace: &str, name: &str)
        -> Result<Option<BTreeMap<String, String>>>;

    /// Data of a ConfigMap, `None` when it does not exist
    async fn config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>>;
}

/// Opens an authenticated session from credentials
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Authenticate and locate the account described by `context`
    async fn open(
        &self,
        credentials: &IamCredentials,
        context: &ResourceContext,
    ) -> std::result::Result<IamSession, IamError>;
}

/// [`ConfigSource`] backed by the Kubernetes API
pub struct KubeConfigSource {
    client: Client,
}

impl KubeConfigSource {
    /// Create a source using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigSource for KubeConfigSource {
    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api.get_opt(name).await? else {
            return Ok(None);
        };
        let mut data: BTreeMap<String, String> = secret.string_data.unwrap_or_default();
        for (key, value) in secret.data.unwrap_or_default() {
            let value = String::from_utf8(value.0).map_err(|e| {
                Error::serialization_for_kind("Secret", format!("{namespace}/{name} key {key}: {e}"))
            })?;
            data.insert(key, value);
        }
        Ok(Some(data))
    }

    async fn config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .get_opt(name)
            .await?
            .map(|cm| cm.data.unwrap_or_default()))
    }
}

/// [`AccountResolver`] reading the operator Secret and ConfigMap per namespace
pub struct NamespacedAccountResolver {
    source: Arc<dyn ConfigSource>,
    sessions: Arc<dyn SessionFactory>,
    controller_namespace: String,
}

impl NamespacedAccountResolver {
    /// Create a resolver; `controller_namespace` holds the management ConfigMap
    pub fn new(
        source: Arc<dyn ConfigSource>,
        sessions: Arc<dyn SessionFactory>,
        controller_namespace: impl Into<String>,
    ) -> Self {
        Self {
            source,
            sessions,
            controller_namespace: controller_namespace.into(),
        }
    }

    async fn management_namespace(&self) -> String {
        match self
            .source
            .config_map_data(&self.controller_namespace, MANAGEMENT_CONFIG_MAP)
            .await
        {
            Ok(Some(data)) => data
                .get(NAMESPACE_KEY)
                .map(|ns| ns.trim())
                .filter(|ns| !ns.is_empty())
                .unwrap_or(DEFAULT_NAMESPACE)
                .to_string(),
            Ok(None) => DEFAULT_NAMESPACE.to_string(),
            Err(e) => {
                warn!(
                    error = %e,
                    namespace = %self.controller_namespace,
                    "Failed to read management config map, using default namespace"
                );
                DEFAULT_NAMESPACE.to_string()
            }
        }
    }

    async fn credentials(&self, namespace: &str) -> Result<IamCredentials> {
        if let Some(data) = self.source.secret_data(namespace, CREDENTIALS_SECRET).await? {
            return IamCredentials::from_secret(&data);
        }
        let management = self.management_namespace().await;
        let name = management_object_name(&management, namespace, CREDENTIALS_SECRET);
        let data = self
            .source
            .secret_data(&management, &name)
            .await?
            .ok_or_else(|| {
                Error::account(
                    namespace,
                    format!("secret {name} not found in namespace {management}"),
                )
            })?;
        IamCredentials::from_secret(&data)
    }

    async fn context(&self, namespace: &str) -> Result<ResourceContext> {
        if let Some(data) = self
            .source
            .config_map_data(namespace, CONTEXT_CONFIG_MAP)
            .await?
        {
            return Ok(ResourceContext::from_config_map(&data));
        }
        let management = self.management_namespace().await;
        let name = management_object_name(&management, namespace, CONTEXT_CONFIG_MAP);
        let data = self
            .source
            .config_map_data(&management, &name)
            .await?
            .ok_or_else(|| {
                Error::account(
                    namespace,
                    format!("config map {name} not found in namespace {management}"),
                )
            })?;
        Ok(ResourceContext::from_config_map(&data))
    }
}

#[async_trait]
impl AccountResolver for NamespacedAccountResolver {
    async fn resolve(&self, namespace: &str) -> Result<IamSession> {
        let credentials = self.credentials(namespace).await?;
        let context = self.context(namespace).await?;
        let session = self
            .sessions
            .open(&credentials, &context)
            .await
            .map_err(|e| Error::account(namespace, e.to_string()))?;
        debug!(
            namespace,
            account = %session.account.guid,
            region = %credentials.region,
            "Resolved IAM account"
        );
        Ok(session)
    }
}
