//! AccessPolicy CRD: grants roles on a target to a user, service ID or access group

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::{IamStatus, ResourceStatus};
use crate::{Error, Result};

/// AccessPolicy declares a remote IAM access policy.
///
/// Exactly one subject selector is set. Roles may come from the service's
/// defined roles, from existing custom roles by display name, or from
/// CustomRole resources managed by this operator.
///
/// Example:
/// ```yaml
/// apiVersion: ibmcloud.ibm.com/v1alpha1
/// kind: AccessPolicy
/// metadata:
///   name: devs-cos-writer
/// spec:
///   subject:
///     accessGroupDef:
///       accessGroupName: developers
///   roles:
///     definedRoles: [Viewer, Writer]
///   target:
///     serviceClass: cloud-object-storage
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ibmcloud.ibm.com",
    version = "v1alpha1",
    kind = "AccessPolicy",
    plural = "accesspolicies",
    namespaced,
    status = "AccessPolicyStatus",
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.target.serviceClass"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicySpec {
    /// Who the policy applies to
    pub subject: PolicySubject,
    /// Roles granted
    pub roles: PolicyRoles,
    /// What the policy applies to
    pub target: PolicyTarget,
}

/// Policy subject; exactly one selector is set
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicySubject {
    /// User email
    #[serde(default)]
    pub user_email: String,

    /// Service ID
    #[serde(default, rename = "serviceID")]
    pub service_id: String,

    /// Remote access group ID
    #[serde(default, rename = "accessGroupID")]
    pub access_group_id: String,

    /// Reference to an AccessGroup resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_group_def: Option<AccessGroupRef>,
}

impl PolicySubject {
    /// Names of the selectors that are set
    pub fn selectors(&self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if !self.user_email.is_empty() {
            set.push("userEmail");
        }
        if !self.service_id.is_empty() {
            set.push("serviceID");
        }
        if !self.access_group_id.is_empty() {
            set.push("accessGroupID");
        }
        if self
            .access_group_def
            .as_ref()
            .is_some_and(|def| !def.access_group_name.is_empty())
        {
            set.push("accessGroupDef");
        }
        set
    }
}

/// Reference to an AccessGroup resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct AccessGroupRef {
    /// Resource name
    pub access_group_name: String,
    /// Resource namespace, defaults to the policy's namespace
    #[serde(default)]
    pub access_group_namespace: String,
}

/// Roles granted by the policy
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRoles {
    /// Service or platform roles by display name
    #[serde(default)]
    pub defined_roles: Vec<String>,

    /// Existing custom roles by display name
    #[serde(default, rename = "customRolesDName")]
    pub custom_roles_d_name: Vec<String>,

    /// CustomRole resources managed by this operator
    #[serde(default)]
    pub custom_roles_def: Vec<CustomRoleRef>,
}

impl PolicyRoles {
    /// Whether no role is requested
    pub fn is_empty(&self) -> bool {
        self.defined_roles.is_empty()
            && self.custom_roles_d_name.is_empty()
            && self.custom_roles_def.is_empty()
    }
}

/// Reference to a CustomRole resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct CustomRoleRef {
    /// Resource name
    pub custom_role_name: String,
    /// Resource namespace, defaults to the policy's namespace
    #[serde(default)]
    pub custom_role_namespace: String,
}

/// Resource the policy applies to
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTarget {
    /// Resource group ID
    #[serde(default)]
    pub resource_group: String,
    /// Service name (e.g., cloud-object-storage)
    #[serde(default)]
    pub service_class: String,
    /// Service instance
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
    /// Region
    #[serde(default)]
    pub region: String,
}

impl AccessPolicySpec {
    /// Check the spec is well-formed without contacting the remote service
    pub fn validate(&self) -> Result<()> {
        let selectors = self.subject.selectors();
        if selectors.len() != 1 {
            return Err(Error::validation(
                "spec.subject",
                format!(
                    "exactly one of userEmail, serviceID, accessGroupID or accessGroupDef must be set, found [{}]",
                    selectors.join(", ")
                ),
            ));
        }
        if self.roles.is_empty() {
            return Err(Error::validation("spec.roles", "at least one role must be set"));
        }
        super::no_blank_entries("spec.roles.definedRoles", &self.roles.defined_roles)?;
        super::no_blank_entries("spec.roles.customRolesDName", &self.roles.custom_roles_d_name)?;
        if self
            .roles
            .custom_roles_def
            .iter()
            .any(|r| r.custom_role_name.is_empty())
        {
            return Err(Error::validation(
                "spec.roles.customRolesDef",
                "customRoleName must be set",
            ));
        }
        if self.target.resource_key.is_empty() != self.target.resource_value.is_empty() {
            return Err(Error::validation(
                "spec.target",
                "resourceKey and resourceValue must be set together",
            ));
        }
        Ok(())
    }
}

/// AccessPolicy status: state plus the last applied spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicyStatus {
    /// State and message
    #[serde(flatten)]
    pub resource: ResourceStatus,

    /// Remote policy ID
    #[serde(default, rename = "policyID")]
    pub policy_id: String,

    /// Last applied subject
    #[serde(default)]
    pub subject: PolicySubject,

    /// Last applied roles
    #[serde(default)]
    pub roles: PolicyRoles,

    /// Last applied target
    #[serde(default)]
    pub target: PolicyTarget,
}

impl AccessPolicyStatus {
    /// Record `spec` as the last applied state
    pub fn record_spec(&mut self, spec: &AccessPolicySpec) {
        self.subject = spec.subject.clone();
        self.roles = spec.roles.clone();
        self.target = spec.target.clone();
    }
}

impl IamStatus for AccessPolicyStatus {
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
