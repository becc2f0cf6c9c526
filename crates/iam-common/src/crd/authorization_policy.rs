//! AuthorizationPolicy CRD: grants one service access to another

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::{IamStatus, ResourceStatus};
use crate::{Error, Result};

/// AuthorizationPolicy declares a service-to-service authorization.
///
/// Example:
/// ```yaml
/// apiVersion: ibmcloud.ibm.com/v1alpha1
/// kind: AuthorizationPolicy
/// metadata:
///   name: cos-to-kms
/// spec:
///   source:
///     serviceClass: cloud-object-storage
///   roles: [Reader]
///   target:
///     serviceClass: kms
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ibmcloud.ibm.com",
    version = "v1alpha1",
    kind = "AuthorizationPolicy",
    plural = "authorizationpolicies",
    namespaced,
    status = "AuthorizationPolicyStatus",
    printcolumn = r#"{"name":"Source","type":"string","jsonPath":".spec.source.serviceClass"}"#,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.target.serviceClass"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPolicySpec {
    /// Service granted access
    pub source: ServiceInfo,
    /// Authorization roles by display name
    #[serde(default)]
    pub roles: Vec<String>,
    /// Service access is granted to
    pub target: ServiceInfo,
}

/// Service (and optionally a resource within it) on one side of the policy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    /// Service name
    #[serde(default)]
    pub service_class: String,
    /// Service instance; excludes `resourceGroup`
    #[serde(default, rename = "serviceID")]
    pub service_id: String,
    /// Resource type
    #[serde(default)]
    pub resource_name: String,
    /// Resource
    #[serde(default, rename = "resourceID")]
    pub resource_id: String,
    /// Free-form attribute name
    #[serde(default)]
    pub resource_key: String,
    /// Free-form attribute value
    #[serde(default)]
    pub resource_value: String,
    /// Resource group ID; excludes `serviceID`
    #[serde(default)]
    pub resource_group: String,
}

impl ServiceInfo {
    fn validate(&self, field: &str) -> Result<()> {
        if self.service_class.is_empty() {
            return Err(Error::validation(field, "serviceClass must be set"));
        }
        let has_group = !self.resource_group.is_empty();
        let has_instance = !self.service_id.is_empty();
        if has_group && has_instance {
            return Err(Error::validation(
                field,
                "resourceGroup and serviceID are mutually exclusive",
            ));
        }
        let narrows = !self.resource_name.is_empty()
            || !self.resource_id.is_empty()
            || !self.resource_key.is_empty()
            || !self.resource_value.is_empty();
        if narrows && !has_group && !has_instance {
            return Err(Error::validation(
                field,
                "resource attributes require resourceGroup or serviceID",
            ));
        }
        Ok(())
    }
}

impl AuthorizationPolicySpec {
    /// Check the spec is well-formed without contacting the remote service
    pub fn validate(&self) -> Result<()> {
        self.source.validate("spec.source")?;
        self.target.validate("spec.target")?;
        if self.roles.is_empty() {
            return Err(Error::validation("spec.roles", "at least one role must be set"));
        }
        super::no_blank_entries("spec.roles", &self.roles)
    }
}

/// AuthorizationPolicy status: state plus the last applied spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPolicyStatus {
    /// State and message
    #[serde(flatten)]
    pub resource: ResourceStatus,

    /// Remote policy ID
    #[serde(default, rename = "policyID")]
    pub policy_id: String,

    /// Last applied source
    #[serde(default)]
    pub source: ServiceInfo,

    /// Last applied roles
    #[serde(default)]
    pub roles: Vec<String>,

    /// Last applied target
    #[serde(default)]
    pub target: ServiceInfo,
}

impl AuthorizationPolicyStatus {
    /// Record `spec` as the last applied state
    pub fn record_spec(&mut self, spec: &AuthorizationPolicySpec) {
        self.source = spec.source.clone();
        self.roles = spec.roles.clone();
        self.target = spec.target.clone();
    }
}

impl IamStatus for AuthorizationPolicyStatus {
    fn resource_status(&self) -> &ResourceStatus {
        &self.resource
    }

    fn resource_status_mut(&mut self) -> &mut ResourceStatus {
        &mut self.resource
    }

    fn remote_id(&self) -> &str {
        &self.policy_id
    }

    fn clear_remote_id(&mut self) {
        self.policy_id.clear();
    }
}
