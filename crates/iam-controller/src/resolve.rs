//! Resolution of spec references (emails, service IDs, role names) to remote IDs

use tracing::{debug, warn};

use iam_common::{Error, Result};

use crate::iam::{IamSession, PolicyRole};

/// How to treat users missing from the account
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserLookup {
    /// Invite missing users; unusable users are an error
    Invite,
    /// Read only; missing or unusable users resolve to `None`
    Existing,
}

/// IAM ID of the user with login `email`
pub async fn user_iam_id(
    iam: &IamSession,
    email: &str,
    lookup: UserLookup,
) -> Result<Option<String>> {
    let account = iam.account.guid.as_str();
    let find = || async {
        iam.identities
            .find_user(account, email)
            .await
            .map_err(|e| Error::remote("find account user", e))
    };

    let mut user = find().await?;
    if lookup == UserLookup::Existing {
        return Ok(user.filter(|u| u.is_usable()).map(|u| u.iam_id));
    }

    if user.is_none() {
        debug!(email, "Inviting user to account");
        iam.identities
            .invite_user(account, email)
            .await
            .map_err(|e| Error::remote("invite account user", e))?;
        user = find().await?;
    }

    match user {
        Some(u) if u.is_usable() => Ok(Some(u.iam_id)),
        Some(u) => {
            if let Err(e) = iam.identities.remove_user(account, &u.id).await {
                warn!(email, error = %e, "Failed to remove unusable user from account");
            }
            Err(Error::resolution(
                format!("user {email}"),
                "user email is not valid",
            ))
        }
        None => Err(Error::resolution(
            format!("user {email}"),
            "user not found after invitation",
        )),
    }
}

/// IAM ID of a service ID
pub async fn service_iam_id(iam: &IamSession, service_id: &str) -> Result<String> {
    iam.identities
        .service_id(service_id)
        .await
        .map(|s| s.iam_id)
        .map_err(|e| Error::remote("get service ID", e))
}

/// Pick the roles named in `names` from `available`, matching display names
pub fn select_roles(names: &[String], available: &[PolicyRole]) -> Result<Vec<PolicyRole>> {
    names
        .iter()
        .map(|name| {
            available
                .iter()
                .find(|role| role.name == *name)
                .cloned()
                .ok_or_else(|| {
                    Error::resolution(format!("role {name}"), "no role with this name is available")
                })
        })
        .collect()
}
