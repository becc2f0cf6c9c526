//! Remote IAM entities as seen by the controller

use std::collections::BTreeMap;

/// Account the session is bound to
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountInfo {
    /// Account GUID
    pub guid: String,
}

/// Opaque concurrency token returned on read and required on update
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Etag(pub String);

impl Etag {
    /// Wrap a token value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

/// Name and description of an access group
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessGroupRequest {
    /// Group name
    pub name: String,
    /// Description, including the ownership marker
    pub description: String,
}

/// Access group as stored remotely
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteAccessGroup {
    /// Group ID
    pub id: String,
    /// Group name
    pub name: String,
    /// Description
    pub description: String,
}

/// Kind of access group member
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberKind {
    /// Account user
    User,
    /// Service ID
    Service,
}

/// Access group member, identified by IAM ID
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupMember {
    /// IAM ID
    pub id: String,
    /// Member kind
    pub kind: MemberKind,
}

impl GroupMember {
    /// A user member
    pub fn user(iam_id: impl Into<String>) -> Self {
        Self {
            id: iam_id.into(),
            kind: MemberKind::User,
        }
    }

    /// A service ID member
    pub fn service(iam_id: impl Into<String>) -> Self {
        Self {
            id: iam_id.into(),
            kind: MemberKind::Service,
        }
    }
}

/// State of a user who accepted no invitation yet
pub const PENDING_USER_STATE: &str = "PENDING";

/// User record in the account
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountUser {
    /// Account-scoped user record ID
    pub id: String,
    /// Login (email)
    pub user_id: String,
    /// IAM ID
    pub iam_id: String,
    /// Account membership state
    pub state: String,
}

impl AccountUser {
    /// Whether the user can be referenced by IAM ID
    pub fn is_usable(&self) -> bool {
        !self.user_id.is_empty() && !self.iam_id.is_empty() && self.state != PENDING_USER_STATE
    }
}

/// Service ID record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceId {
    /// Service ID
    pub id: String,
    /// IAM ID
    pub iam_id: String,
}

/// Role that can be granted by a policy
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct PolicyRole {
    /// Role CRN
    pub id: String,
    /// Display name
    pub name: String,
}

/// Attribute name of the account ID
pub const ACCOUNT_ID_ATTR: &str = "accountId";
/// Attribute name of a subject's IAM ID
pub const IAM_ID_ATTR: &str = "iam_id";
/// Attribute name of a subject's access group ID
pub const ACCESS_GROUP_ID_ATTR: &str = "access_group_id";
/// Attribute name of the service
pub const SERVICE_NAME_ATTR: &str = "serviceName";
/// Attribute name of the service instance
pub const SERVICE_INSTANCE_ATTR: &str = "serviceInstance";
/// Attribute name of the resource type
pub const RESOURCE_TYPE_ATTR: &str = "resourceType";
/// Attribute name of the resource
pub const RESOURCE_ATTR: &str = "resource";
/// Attribute name of the resource group
pub const RESOURCE_GROUP_ID_ATTR: &str = "resourceGroupId";
/// Attribute name of the region
pub const REGION_ATTR: &str = "region";

/// Name/value attributes of a policy subject or resource
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttributeSet(BTreeMap<String, String>);

impl AttributeSet {
    /// Set `name` to `value`; empty values are not recorded
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        if !value.is_empty() {
            self.0.insert(name.into(), value);
        }
        self
    }

    /// Builder form of [`AttributeSet::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Value of `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterate over attributes in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Policy type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolicyKind {
    /// Grants a subject roles on a resource
    #[default]
    Access,
    /// Grants a source service roles on a target service
    Authorization,
}

/// Policy body sent to and read from the remote service
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Policy {
    /// Policy type
    pub kind: PolicyKind,
    /// Subjects
    pub subjects: Vec<AttributeSet>,
    /// Granted roles
    pub roles: Vec<PolicyRole>,
    /// Resources
    pub resources: Vec<AttributeSet>,
}

/// Policy as stored remotely
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemotePolicy {
    /// Policy ID
    pub id: String,
    /// Policy body
    pub policy: Policy,
}

/// Custom role creation request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomRoleRequest {
    /// Role name, unique per account and service
    pub name: String,
    /// Service the role belongs to
    pub service_name: String,
    /// Owning account
    pub account_id: String,
    /// Display name
    pub display_name: String,
    /// Description, including the ownership marker
    pub description: String,
    /// Allowed actions
    pub actions: Vec<String>,
}

/// Mutable fields of a custom role
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomRoleUpdate {
    /// Display name
    pub display_name: String,
    /// Description, including the ownership marker
    pub description: String,
    /// Allowed actions
    pub actions: Vec<String>,
}

/// Custom role as stored remotely
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteCustomRole {
    /// Role ID
    pub id: String,
    /// Role CRN
    pub crn: String,
    /// Role name
    pub name: String,
    /// Service the role belongs to
    pub service_name: String,
    /// Display name
    pub display_name: String,
    /// Description
    pub description: String,
    /// Allowed actions
    pub actions: Vec<String>,
}

impl RemoteCustomRole {
    /// The role as a grantable policy role
    pub fn as_policy_role(&self) -> PolicyRole {
        PolicyRole {
            id: self.crn.clone(),
            name: self.display_name.clone(),
        }
    }
}
