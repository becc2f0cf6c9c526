//! Custom role strategy

use async_trait::async_trait;
use tracing::{info, warn};

use iam_common::crd::{CustomRole, CustomRoleStatus};
use iam_common::{owned_description, Error, IamError, Result};

use crate::drift;
use crate::iam::{CustomRoleRequest, CustomRoleUpdate, Etag, RemoteCustomRole};
use crate::kind::{IamKind, RemoteRef, SyncScope};

/// Finalizer gating deletion of custom roles
pub const CUSTOM_ROLE_FINALIZER: &str = "customrole.ibmcloud.ibm.com";

fn role_update(role: &CustomRole) -> CustomRoleUpdate {
    CustomRoleUpdate {
        display_name: role.spec.display_name.clone(),
        description: owned_description(&role.spec.description),
        actions: role.spec.actions.clone(),
    }
}

fn applied(role: RemoteCustomRole) -> RemoteRef {
    RemoteRef {
        id: role.id,
        crn: Some(role.crn),
    }
}

#[async_trait]
impl IamKind for CustomRole {
    type Status = CustomRoleStatus;
    type CreateRequest = CustomRoleRequest;
    type UpdateRequest = CustomRoleUpdate;
    type Remote = RemoteCustomRole;

    const FINALIZER: &'static str = CUSTOM_ROLE_FINALIZER;
    const NOUN: &'static str = "custom role";

    fn status(&self) -> Option<&CustomRoleStatus> {
        self.status.as_ref()
    }

    fn status_slot(&mut self) -> &mut Option<CustomRoleStatus> {
        &mut self.status
    }

    fn is_well_formed(&self) -> Result<()> {
        self.spec.validate()
    }

    fn restore_immutable_fields(&mut self) -> bool {
        let Some(status) = self.status.as_ref() else {
            return false;
        };
        if !drift::custom_role_immutable_drift(&self.spec, status) {
            return false;
        }
        warn!(
            role_name = %status.role_name,
            service_class = %status.service_class,
            "roleName and serviceClass cannot change after creation, restoring"
        );
        self.spec.role_name = status.role_name.clone();
        self.spec.service_class = status.service_class.clone();
        true
    }

    fn spec_drifted(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| drift::custom_role_spec_drift(&self.spec, status))
    }

    fn remote_drifted(&self, desired: &CustomRoleUpdate, remote: &RemoteCustomRole) -> bool {
        drift::custom_role_remote_drift(desired, remote)
    }

    fn record_applied(&mut self, remote: &RemoteRef) {
        let status = self.status.get_or_insert_with(Default::default);
        status.role_id = remote.id.clone();
        if let Some(crn) = &remote.crn {
            status.role_crn = crn.clone();
        }
        status.record_spec(&self.spec);
    }

    async fn to_remote_create_request(&self, scope: &SyncScope<'_>) -> Result<CustomRoleRequest> {
        Ok(CustomRoleRequest {
            name: self.spec.role_name.clone(),
            service_name: self.spec.service_class.clone(),
            account_id: scope.account_id().to_string(),
            display_name: self.spec.display_name.clone(),
            description: owned_description(&self.spec.description),
            actions: self.spec.actions.clone(),
        })
    }

    async fn to_remote_update_request(&self, _scope: &SyncScope<'_>) -> Result<CustomRoleUpdate> {
        Ok(role_update(self))
    }

    async fn create_remote(
        &self,
        scope: &SyncScope<'_>,
        request: &CustomRoleRequest,
    ) -> Result<RemoteRef> {
        let roles = &scope.iam.roles;
        let existing = roles
            .list(&request.account_id, &request.service_name)
            .await
            .map_err(|e| Error::remote("list custom roles", e))?;
        if existing.iter().any(|role| role.name == request.name) {
            return Err(Error::remote(
                "create custom role",
                IamError::conflict(format!(
                    "custom role {} already exists for service {}",
                    request.name, request.service_name
                )),
            ));
        }

        let role = roles
            .create(request)
            .await
            .map_err(|e| Error::remote("create custom role", e))?;
        info!(role_id = %role.id, name = %role.name, "Created custom role");
        Ok(applied(role))
    }

    async fn fetch_remote(
        &self,
        scope: &SyncScope<'_>,
        id: &str,
    ) -> Result<(RemoteCustomRole, Etag)> {
        scope
            .iam
            .roles
            .get(id)
            .await
            .map_err(|e| Error::remote("get custom role", e))
    }

    async fn update_remote(
        &self,
        scope: &SyncScope<'_>,
        id: &str,
        desired: &CustomRoleUpdate,
        _remote: &RemoteCustomRole,
        etag: &Etag,
    ) -> Result<RemoteRef> {
        let role = scope
            .iam
            .roles
            .update(id, desired, etag)
            .await
            .map_err(|e| Error::remote("update custom role", e))?;
        Ok(applied(role))
    }

    async fn delete_remote(
        &self,
        scope: &SyncScope<'_>,
        id: &str,
    ) -> std::result::Result<(), IamError> {
        scope.iam.roles.delete(id).await
    }
}
