//! CustomRole CRD: an account-level custom role for a service

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::{IamStatus, ResourceStatus};
use crate::{Error, Result};

/// CustomRole declares a remote IAM custom role.
///
/// `roleName` and `serviceClass` cannot change once the role exists; edits to
/// them are reverted by the controller.
///
/// Example:
/// ```yaml
/// apiVersion: ibmcloud.ibm.com/v1alpha1
/// kind: CustomRole
/// metadata:
///   name: bucket-reader
/// spec:
///   roleName: BucketReader
///   serviceClass: cloud-object-storage
///   displayName: Bucket Reader
///   description: Read objects in buckets
///   actions: [cloud-object-storage.object.get]
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ibmcloud.ibm.com",
    version = "v1alpha1",
    kind = "CustomRole",
    namespaced,
    status = "CustomRoleStatus",
    printcolumn = r#"{"name":"Role","type":"string","jsonPath":".spec.roleName"}"#,
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.serviceClass"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CustomRoleSpec {
    /// Role name, immutable
    pub role_name: String,
    /// Service the role belongs to, immutable
    pub service_class: String,
    /// Display name used when policies reference the role
    pub display_name: String,
    /// Description (the ownership marker is added remotely)
    #[serde(default)]
    pub description: String,
    /// Service actions the role allows
    #[serde(default)]
    pub actions: Vec<String>,
}

impl CustomRoleSpec {
    /// Check the spec is well-formed without contacting the remote service
    pub fn validate(&self) -> Result<()> {
        if self.role_name.trim().is_empty() {
            return Err(Error::validation("spec.roleName", "role name must be set"));
        }
        if self.service_class.trim().is_empty() {
            return Err(Error::validation("spec.serviceClass", "service class must be set"));
        }
        if self.display_name.trim().is_empty() {
            return Err(Error::validation("spec.displayName", "display name must be set"));
        }
        if self.actions.is_empty() {
            return Err(Error::validation("spec.actions", "at least one action must be set"));
        }
        super::no_blank_entries("spec.actions", &self.actions)
    }
}

/// CustomRole status: state plus the last applied spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomRoleStatus {
    /// State and message
    #[serde(flatten)]
    pub resource: ResourceStatus,

    /// Remote role ID
    #[serde(default, rename = "roleID")]
    pub role_id: String,

    /// Remote role CRN
    #[serde(default, rename = "roleCRN")]
    pub role_crn: String,

    /// Last applied role name
    #[serde(default)]
    pub role_name: String,

    /// Last applied service class
    #[serde(default)]
    pub service_class: String,

    /// Last applied display name
    #[serde(default)]
    pub display_name: String,

    /// Last applied description
    #[serde(default)]
    pub description: String,

    /// Last applied actions
    #[serde(default)]
    pub actions: Vec<String>,
}

impl CustomRoleStatus {
    /// Record `spec` as the last applied state
    pub fn record_spec(&mut self, spec: &CustomRoleSpec) {
        self.role_name = spec.role_name.clone();
        self.service_class = spec.service_class.clone();
        self.display_name = spec.display_name.clone();
        self.description = spec.description.clone();
        self.actions = spec.actions.clone();
    }
}

impl IamStatus for CustomRoleStatus {
    fn resource_status(&self) -> &ResourceStatus {
        &self.resource
    }

    fn resource_status_mut(&mut self) -> &mut ResourceStatus {
        &mut self.resource
    }

    fn remote_id(&self) -> &str {
        &self.role_id
    }

    fn clear_remote_id(&mut self) {
        self.role_id.clear();
        self.role_crn.clear();
    }
}
