//! AccessGroup CRD: an IAM access group and its members

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::status::{IamStatus, ResourceStatus};
use crate::{Error, Result};

/// AccessGroup declares a remote IAM access group with user and service ID members.
///
/// Example:
/// ```yaml
/// apiVersion: ibmcloud.ibm.com/v1alpha1
/// kind: AccessGroup
/// metadata:
///   name: developers
/// spec:
///   name: developers
///   description: Application developers
///   userEmails: [dev@example.com]
///   serviceIDs: [ServiceId-1234]
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ibmcloud.ibm.com",
    version = "v1alpha1",
    kind = "AccessGroup",
    namespaced,
    status = "AccessGroupStatus",
    printcolumn = r#"{"name":"Group","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AccessGroupSpec {
    /// Name of the remote access group
    pub name: String,

    /// Description (the ownership marker is added remotely)
    #[serde(default)]
    pub description: String,

    /// Users to add, by email; users not yet in the account are invited
    #[serde(default)]
    pub user_emails: Vec<String>,

    /// Service IDs to add
    #[serde(default, rename = "serviceIDs")]
    pub service_ids: Vec<String>,
}

impl AccessGroupSpec {
    /// Check the spec is well-formed without contacting the remote service
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("spec.name", "access group name must be set"));
        }
        if self.user_emails.is_empty() && self.service_ids.is_empty() {
            return Err(Error::validation(
                "spec",
                "at least one of userEmails or serviceIDs must be set",
            ));
        }
        super::no_blank_entries("spec.userEmails", &self.user_emails)?;
        super::no_blank_entries("spec.serviceIDs", &self.service_ids)
    }
}

/// AccessGroup status: state plus the last applied spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessGroupStatus {
    /// State and message
    #[serde(flatten)]
    pub resource: ResourceStatus,

    /// Remote access group ID
    #[serde(default, rename = "groupID")]
    pub group_id: String,

    /// Last applied name
    #[serde(default)]
    pub name: String,

    /// Last applied description
    #[serde(default)]
    pub description: String,

    /// Last applied user emails
    #[serde(default)]
    pub user_emails: Vec<String>,

    /// Last applied service IDs
    #[serde(default, rename = "serviceIDs")]
    pub service_ids: Vec<String>,
}

impl AccessGroupStatus {
    /// Record `spec` as the last applied state
    pub fn record_spec(&mut self, spec: &AccessGroupSpec) {
        self.name = spec.name.clone();
        self.description = spec.description.clone();
        self.user_emails = spec.user_emails.clone();
        self.service_ids = spec.service_ids.clone();
    }
}

impl IamStatus for AccessGroupStatus {
    fn resource_status(&self) -> &ResourceStatus {
        &self.resource
    }

    fn resource_status_mut(&mut self) -> &mut ResourceStatus {
        &mut self.resource
    }

    fn remote_id(&self) -> &str {
        &self.group_id
    }

    fn clear_remote_id(&mut self) {
        self.group_id.clear();
    }
}
