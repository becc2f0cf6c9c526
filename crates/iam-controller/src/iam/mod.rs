//! Remote IAM service seams
//!
//! One trait per remote surface. Implementations live outside this crate
//! (they own authentication and the wire format); the reconciler only sees
//! these traits through an [`IamSession`].

mod models;

pub use models::*;

use std::sync::Arc;

use async_trait::async_trait;
use iam_common::IamError;
#[cfg(test)]
use mockall::automock;

/// Result of a remote adapter call
pub type IamResult<T> = std::result::Result<T, IamError>;

/// Access groups and their membership
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccessGroupApi: Send + Sync {
    /// Groups in the account with exactly this name
    async fn find_by_name(&self, name: &str, account_id: &str) -> IamResult<Vec<RemoteAccessGroup>>;

    /// Create a group
    async fn create(
        &self,
        request: &AccessGroupRequest,
        account_id: &str,
    ) -> IamResult<RemoteAccessGroup>;

    /// Read a group and its concurrency token
    async fn get(&self, id: &str) -> IamResult<(RemoteAccessGroup, Etag)>;

    /// Update name and description
    async fn update(
        &self,
        id: &str,
        request: &AccessGroupRequest,
        etag: &Etag,
    ) -> IamResult<RemoteAccessGroup>;

    /// Delete a group together with its memberships
    async fn delete(&self, id: &str) -> IamResult<()>;

    /// Current members
    async fn list_members(&self, id: &str) -> IamResult<Vec<GroupMember>>;

    /// Add members
    async fn add_members(&self, id: &str, members: Vec<GroupMember>) -> IamResult<()>;

    /// Remove one member by IAM ID
    async fn remove_member(&self, id: &str, member_id: &str) -> IamResult<()>;
}

/// Access and authorization policies
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PolicyApi: Send + Sync {
    /// Create a policy
    async fn create(&self, policy: &Policy) -> IamResult<RemotePolicy>;

    /// Read a policy and its concurrency token
    async fn get(&self, id: &str) -> IamResult<(RemotePolicy, Etag)>;

    /// Replace a policy
    async fn update(&self, id: &str, policy: &Policy, etag: &Etag) -> IamResult<RemotePolicy>;

    /// Delete a policy
    async fn delete(&self, id: &str) -> IamResult<()>;
}

/// Account custom roles
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CustomRoleApi: Send + Sync {
    /// Custom roles in the account; an empty `service_name` lists all services
    async fn list(&self, account_id: &str, service_name: &str) -> IamResult<Vec<RemoteCustomRole>>;

    /// Create a role
    async fn create(&self, request: &CustomRoleRequest) -> IamResult<RemoteCustomRole>;

    /// Read a role and its concurrency token
    async fn get(&self, id: &str) -> IamResult<(RemoteCustomRole, Etag)>;

    /// Update the mutable fields of a role
    async fn update(
        &self,
        id: &str,
        update: &CustomRoleUpdate,
        etag: &Etag,
    ) -> IamResult<RemoteCustomRole>;

    /// Delete a role
    async fn delete(&self, id: &str) -> IamResult<()>;
}

/// Built-in roles
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RoleCatalog: Send + Sync {
    /// Platform roles that apply to every service
    async fn system_roles(&self) -> IamResult<Vec<PolicyRole>>;

    /// Roles defined by one service
    async fn service_roles(&self, service_name: &str) -> IamResult<Vec<PolicyRole>>;

    /// Roles a source service can be granted on a target service
    async fn authorization_roles(
        &self,
        source_service: &str,
        target_service: &str,
    ) -> IamResult<Vec<PolicyRole>>;
}

/// Account users and service IDs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Invite a user to the account
    async fn invite_user(&self, account_id: &str, email: &str) -> IamResult<()>;

    /// Look up a user by login
    async fn find_user(&self, account_id: &str, email: &str) -> IamResult<Option<AccountUser>>;

    /// Remove a user record from the account
    async fn remove_user(&self, account_id: &str, user_id: &str) -> IamResult<()>;

    /// Look up a service ID
    async fn service_id(&self, id: &str) -> IamResult<ServiceId>;
}

/// Authenticated handles to the remote service for one account
#[derive(Clone)]
pub struct IamSession {
    /// Account the handles operate on
    pub account: AccountInfo,
    /// Access groups
    pub groups: Arc<dyn AccessGroupApi>,
    /// Policies
    pub policies: Arc<dyn PolicyApi>,
    /// Custom roles
    pub roles: Arc<dyn CustomRoleApi>,
    /// Built-in roles
    pub catalog: Arc<dyn RoleCatalog>,
    /// Users and service IDs
    pub identities: Arc<dyn IdentityApi>,
}

impl std::fmt::Debug for IamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IamSession")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}
