//! Per-kind strategies

mod access_group;
mod access_policy;
mod authorization_policy;
mod custom_role;

pub use access_group::{GroupSnapshot, GroupUpdate, ACCESS_GROUP_FINALIZER};
pub use access_policy::ACCESS_POLICY_FINALIZER;
pub use authorization_policy::AUTHORIZATION_POLICY_FINALIZER;
pub use custom_role::CUSTOM_ROLE_FINALIZER;

use iam_common::{Error, IamError, Result};

use crate::iam::{Etag, Policy};
use crate::kind::{RemoteRef, SyncScope};

// Both policy kinds share the remote policy surface.

async fn create_policy(scope: &SyncScope<'_>, policy: &Policy) -> Result<RemoteRef> {
    let created = scope
        .iam
        .policies
        .create(policy)
        .await
        .map_err(|e| Error::remote("create policy", e))?;
    Ok(RemoteRef::new(created.id))
}

async fn fetch_policy(scope: &SyncScope<'_>, id: &str) -> Result<(Policy, Etag)> {
    let (remote, etag) = scope
        .iam
        .policies
        .get(id)
        .await
        .map_err(|e| Error::remote("get policy", e))?;
    Ok((remote.policy, etag))
}

async fn update_policy(
    scope: &SyncScope<'_>,
    id: &str,
    policy: &Policy,
    etag: &Etag,
) -> Result<RemoteRef> {
    let updated = scope
        .iam
        .policies
        .update(id, policy, etag)
        .await
        .map_err(|e| Error::remote("update policy", e))?;
    Ok(RemoteRef::new(updated.id))
}

async fn delete_policy(scope: &SyncScope<'_>, id: &str) -> std::result::Result<(), IamError> {
    scope.iam.policies.delete(id).await
}
