//! Access group strategy

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use iam_common::crd::{AccessGroup, AccessGroupStatus};
use iam_common::{owned_description, Error, IamError, Result};

use crate::drift;
use crate::iam::{AccessGroupRequest, Etag, GroupMember, IamSession, RemoteAccessGroup};
use crate::kind::{IamKind, RemoteRef, SyncScope};
use crate::resolve::{self, UserLookup};

/// Finalizer gating deletion of access groups
pub const ACCESS_GROUP_FINALIZER: &str = "accessgroup.ibmcloud.ibm.com";

/// Desired access group state for updates and drift checks
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupUpdate {
    /// Name and description
    pub request: AccessGroupRequest,
    /// IAM IDs of members that currently resolve
    pub member_ids: BTreeSet<String>,
}

/// Observed remote access group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupSnapshot {
    /// Group
    pub group: RemoteAccessGroup,
    /// Current members
    pub members: Vec<GroupMember>,
}

fn group_request(group: &AccessGroup) -> AccessGroupRequest {
    AccessGroupRequest {
        name: group.spec.name.clone(),
        description: owned_description(&group.spec.description),
    }
}

/// Resolve the spec's users and service IDs to members
async fn resolve_members(
    group: &AccessGroup,
    iam: &IamSession,
    lookup: UserLookup,
) -> Result<Vec<GroupMember>> {
    let mut members = Vec::new();
    for email in &group.spec.user_emails {
        match resolve::user_iam_id(iam, email, lookup).await? {
            Some(iam_id) => members.push(GroupMember::user(iam_id)),
            None => debug!(email = %email, "User does not resolve yet"),
        }
    }
    for service_id in &group.spec.service_ids {
        match resolve::service_iam_id(iam, service_id).await {
            Ok(iam_id) => members.push(GroupMember::service(iam_id)),
            Err(e) if lookup == UserLookup::Existing && e.is_not_found() => {
                debug!(service_id = %service_id, "Service ID does not resolve");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(members)
}

/// Add every spec member to a newly created group
async fn populate(group: &AccessGroup, scope: &SyncScope<'_>, group_id: &str) -> Result<()> {
    let members = resolve_members(group, scope.iam, UserLookup::Invite).await?;
    if members.is_empty() {
        return Ok(());
    }
    scope
        .iam
        .groups
        .add_members(group_id, members)
        .await
        .map_err(|e| Error::remote("add access group members", e))
}

#[async_trait]
impl IamKind for AccessGroup {
    type Status = AccessGroupStatus;
    type CreateRequest = AccessGroupRequest;
    type UpdateRequest = GroupUpdate;
    type Remote = GroupSnapshot;

    const FINALIZER: &'static str = ACCESS_GROUP_FINALIZER;
    const NOUN: &'static str = "access group";

    fn status(&self) -> Option<&AccessGroupStatus> {
        self.status.as_ref()
    }

    fn status_slot(&mut self) -> &mut Option<AccessGroupStatus> {
        &mut self.status
    }

    fn is_well_formed(&self) -> Result<()> {
        self.spec.validate()
    }

    fn spec_drifted(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| drift::access_group_spec_drift(&self.spec, status))
    }

    fn remote_drifted(&self, desired: &GroupUpdate, remote: &GroupSnapshot) -> bool {
        drift::access_group_remote_drift(
            &desired.request,
            &desired.member_ids,
            &remote.group,
            &remote.members,
        )
    }

    fn record_applied(&mut self, remote: &RemoteRef) {
        let status = self.status.get_or_insert_with(Default::default);
        status.group_id = remote.id.clone();
        status.record_spec(&self.spec);
    }

    async fn to_remote_create_request(&self, _scope: &SyncScope<'_>) -> Result<AccessGroupRequest> {
        Ok(group_request(self))
    }

    async fn to_remote_update_request(&self, scope: &SyncScope<'_>) -> Result<GroupUpdate> {
        let members = resolve_members(self, scope.iam, UserLookup::Existing).await?;
        Ok(GroupUpdate {
            request: group_request(self),
            member_ids: members.into_iter().map(|m| m.id).collect(),
        })
    }

    async fn create_remote(
        &self,
        scope: &SyncScope<'_>,
        request: &AccessGroupRequest,
    ) -> Result<RemoteRef> {
        let groups = &scope.iam.groups;
        let existing = groups
            .find_by_name(&request.name, scope.account_id())
            .await
            .map_err(|e| Error::remote("find access group", e))?;
        if !existing.is_empty() {
            return Err(Error::remote(
                "create access group",
                IamError::conflict(format!(
                    "access group {} already exists in the account",
                    request.name
                )),
            ));
        }

        let group = groups
            .create(request, scope.account_id())
            .await
            .map_err(|e| Error::remote("create access group", e))?;

        if let Err(err) = populate(self, scope, &group.id).await {
            warn!(group_id = %group.id, error = %err, "Failed to add members, deleting new access group");
            match groups.delete(&group.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    error!(group_id = %group.id, error = %e, "Failed to delete partially created access group")
                }
            }
            return Err(err);
        }

        info!(group_id = %group.id, name = %group.name, "Created access group");
        Ok(RemoteRef::new(group.id))
    }

    async fn fetch_remote(&self, scope: &SyncScope<'_>, id: &str) -> Result<(GroupSnapshot, Etag)> {
        let (group, etag) = scope
            .iam
            .groups
            .get(id)
            .await
            .map_err(|e| Error::remote("get access group", e))?;
        let members = scope
            .iam
            .groups
            .list_members(id)
            .await
            .map_err(|e| Error::remote("list access group members", e))?;
        Ok((GroupSnapshot { group, members }, etag))
    }

    async fn update_remote(
        &self,
        scope: &SyncScope<'_>,
        id: &str,
        desired: &GroupUpdate,
        remote: &GroupSnapshot,
        etag: &Etag,
    ) -> Result<RemoteRef> {
        let groups = &scope.iam.groups;
        groups
            .update(id, &desired.request, etag)
            .await
            .map_err(|e| Error::remote("update access group", e))?;

        let wanted = resolve_members(self, scope.iam, UserLookup::Invite).await?;
        let wanted_ids: BTreeSet<&str> = wanted.iter().map(|m| m.id.as_str()).collect();
        let current_ids: BTreeSet<&str> = remote.members.iter().map(|m| m.id.as_str()).collect();

        for member in remote.members.iter().filter(|m| !wanted_ids.contains(m.id.as_str())) {
            groups
                .remove_member(id, &member.id)
                .await
                .map_err(|e| Error::remote("remove access group member", e))?;
        }

        let additions: Vec<GroupMember> = wanted
            .iter()
            .filter(|m| !current_ids.contains(m.id.as_str()))
            .cloned()
            .collect();
        if !additions.is_empty() {
            groups
                .add_members(id, additions)
                .await
                .map_err(|e| Error::remote("add access group members", e))?;
        }
        Ok(RemoteRef::new(id))
    }

    async fn delete_remote(
        &self,
        scope: &SyncScope<'_>,
        id: &str,
    ) -> std::result::Result<(), IamError> {
        scope.iam.groups.delete(id).await
    }
}
