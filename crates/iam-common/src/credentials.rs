//! IAM credentials and account context
//!
//! Parsed from the string data of the operator's Secret and ConfigMap. Lookup
//! of those objects lives in the controller crate; this module only knows the
//! object names, keys and defaults.

use std::collections::BTreeMap;
use std::fmt;

use zeroize::Zeroizing;

use crate::{Error, Result};

/// Secret holding the API key
pub const CREDENTIALS_SECRET: &str = "secret-ibmcloud-iam-operator";
/// ConfigMap holding the account context (org, space, region, resource group)
pub const CONTEXT_CONFIG_MAP: &str = "config-ibmcloud-iam-operator";
/// ConfigMap in the controller namespace naming the management namespace
pub const MANAGEMENT_CONFIG_MAP: &str = "ibmcloud-iam-operator";

/// Key of the API key in the credentials secret
pub const API_KEY_KEY: &str = "api-key";
/// Key of the region in the credentials secret and context config map
pub const REGION_KEY: &str = "region";
/// Key of the management namespace in the management config map
pub const NAMESPACE_KEY: &str = "namespace";

/// Region used when the secret does not name one
pub const DEFAULT_REGION: &str = "us-south";
/// Resource group used when the context does not name one
pub const DEFAULT_RESOURCE_GROUP: &str = "default";
/// Namespace used when no management namespace is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// API key credentials for the remote IAM service
#[derive(Clone)]
pub struct IamCredentials {
    /// API key, wiped from memory on drop
    pub api_key: Zeroizing<String>,
    /// Region the key is scoped to
    pub region: String,
}

impl fmt::Debug for IamCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamCredentials")
            .field("api_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

impl IamCredentials {
    /// Load credentials from a K8s secret's string data
    pub fn from_secret(data: &BTreeMap<String, String>) -> Result<Self> {
        let api_key = data
            .get(API_KEY_KEY)
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::validation(
                    format!("{CREDENTIALS_SECRET}.{API_KEY_KEY}"),
                    "api key is missing",
                )
            })?;
        Ok(Self {
            api_key: Zeroizing::new(api_key.to_string()),
            region: value_or(data, REGION_KEY, DEFAULT_REGION),
        })
    }
}

/// Account context the remote entities are created in
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceContext {
    /// Cloud Foundry organization used to locate the account
    pub org: String,
    /// Cloud Foundry space
    pub space: String,
    /// Region
    pub region: String,
    /// Resource group
    pub resource_group: String,
}

impl ResourceContext {
    /// Load the context from a K8s config map's data
    pub fn from_config_map(data: &BTreeMap<String, String>) -> Self {
        Self {
            org: value_or(data, "org", ""),
            space: value_or(data, "space", ""),
            region: value_or(data, REGION_KEY, DEFAULT_REGION),
            resource_group: value_or(data, "resourceGroup", DEFAULT_RESOURCE_GROUP),
        }
    }
}

/// Name of an operator object as stored in the management namespace
///
/// Objects in a shared, non-default management namespace are prefixed with the
/// namespace of the resource they serve.
pub fn management_object_name(
    management_namespace: &str,
    resource_namespace: &str,
    name: &str,
) -> String {
    if management_namespace == DEFAULT_NAMESPACE {
        name.to_string()
    } else {
        format!("{resource_namespace}-{name}")
    }
}

fn value_or(data: &BTreeMap<String, String>, key: &str, default: &str) -> String {
    data.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}
