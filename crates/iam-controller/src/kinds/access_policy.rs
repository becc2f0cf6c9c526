//! Access policy strategy

use async_trait::async_trait;
use tracing::{debug, info};

use iam_common::crd::{AccessPolicy, AccessPolicyStatus, IamStatus, PolicyRoles, PolicySubject, PolicyTarget};
use iam_common::{Error, IamError, Result};

use crate::drift;
use crate::iam::{
    AttributeSet, Etag, Policy, PolicyKind, PolicyRole, ACCESS_GROUP_ID_ATTR, ACCOUNT_ID_ATTR,
    IAM_ID_ATTR, REGION_ATTR, RESOURCE_ATTR, RESOURCE_GROUP_ID_ATTR, RESOURCE_TYPE_ATTR,
    SERVICE_INSTANCE_ATTR, SERVICE_NAME_ATTR,
};
use crate::kind::{IamKind, RemoteRef, SyncScope};
use crate::resolve::{self, UserLookup};

/// Finalizer gating deletion of access policies
pub const ACCESS_POLICY_FINALIZER: &str = "accesspolicy.ibmcloud.ibm.com";

fn or_namespace<'a>(namespace: &'a str, fallback: &'a str) -> &'a str {
    if namespace.is_empty() {
        fallback
    } else {
        namespace
    }
}

async fn subject_attributes(scope: &SyncScope<'_>, subject: &PolicySubject) -> Result<AttributeSet> {
    let mut attributes = AttributeSet::default();
    if !subject.user_email.is_empty() {
        let iam_id = resolve::user_iam_id(scope.iam, &subject.user_email, UserLookup::Invite)
            .await?
            .ok_or_else(|| {
                Error::resolution(format!("user {}", subject.user_email), "user is not usable")
            })?;
        attributes.set(IAM_ID_ATTR, iam_id);
    } else if !subject.service_id.is_empty() {
        let iam_id = resolve::service_iam_id(scope.iam, &subject.service_id).await?;
        attributes.set(IAM_ID_ATTR, iam_id);
    } else if !subject.access_group_id.is_empty() {
        let (group, _) = scope
            .iam
            .groups
            .get(&subject.access_group_id)
            .await
            .map_err(|e| Error::remote("get access group", e))?;
        attributes.set(ACCESS_GROUP_ID_ATTR, group.id);
    } else if let Some(def) = &subject.access_group_def {
        let namespace = or_namespace(&def.access_group_namespace, scope.namespace);
        let resource = format!("access group {namespace}/{}", def.access_group_name);
        let group = scope
            .refs
            .access_group(namespace, &def.access_group_name)
            .await?
            .ok_or_else(|| Error::resolution(&resource, "resource does not exist"))?;
        let status = group
            .status
            .filter(|s| s.is_synced())
            .ok_or_else(|| Error::resolution(&resource, "access group is not synchronized yet"))?;
        attributes.set(ACCESS_GROUP_ID_ATTR, status.group_id);
    }
    Ok(attributes)
}

async fn policy_roles(
    scope: &SyncScope<'_>,
    roles: &PolicyRoles,
    service_class: &str,
) -> Result<Vec<PolicyRole>> {
    let mut granted = Vec::new();

    if !roles.defined_roles.is_empty() {
        let catalog = if service_class.is_empty() {
            scope.iam.catalog.system_roles().await
        } else {
            scope.iam.catalog.service_roles(service_class).await
        }
        .map_err(|e| Error::remote("list service roles", e))?;
        granted.extend(resolve::select_roles(&roles.defined_roles, &catalog)?);
    }

    if !roles.custom_roles_d_name.is_empty() {
        let custom = scope
            .iam
            .roles
            .list(scope.account_id(), "")
            .await
            .map_err(|e| Error::remote("list custom roles", e))?;
        let available: Vec<PolicyRole> = custom.iter().map(|r| r.as_policy_role()).collect();
        granted.extend(resolve::select_roles(&roles.custom_roles_d_name, &available)?);
    }

    for def in &roles.custom_roles_def {
        let namespace = or_namespace(&def.custom_role_namespace, scope.namespace);
        let role = scope
            .refs
            .custom_role(namespace, &def.custom_role_name)
            .await?
            .ok_or_else(|| {
                Error::resolution(
                    format!("custom role {namespace}/{}", def.custom_role_name),
                    "resource does not exist",
                )
            })?;
        let custom = scope
            .iam
            .roles
            .list(scope.account_id(), &role.spec.service_class)
            .await
            .map_err(|e| Error::remote("list custom roles", e))?;
        let available: Vec<PolicyRole> = custom.iter().map(|r| r.as_policy_role()).collect();
        granted.extend(resolve::select_roles(
            std::slice::from_ref(&role.spec.display_name),
            &available,
        )?);
    }

    Ok(granted)
}

fn target_attributes(target: &PolicyTarget, account_id: &str) -> AttributeSet {
    let mut attributes = AttributeSet::default();
    attributes
        .set(SERVICE_NAME_ATTR, target.service_class.as_str())
        .set(SERVICE_INSTANCE_ATTR, target.service_id.as_str())
        .set(RESOURCE_TYPE_ATTR, target.resource_name.as_str())
        .set(RESOURCE_ATTR, target.resource_id.as_str())
        .set(RESOURCE_GROUP_ID_ATTR, target.resource_group.as_str())
        .set(REGION_ATTR, target.region.as_str())
        .set(ACCOUNT_ID_ATTR, account_id);
    if !target.resource_key.is_empty() {
        attributes.set(target.resource_key.as_str(), target.resource_value.as_str());
    }
    attributes
}

async fn desired_policy(policy: &AccessPolicy, scope: &SyncScope<'_>) -> Result<Policy> {
    let spec = &policy.spec;
    let subject = subject_attributes(scope, &spec.subject).await?;
    let roles = policy_roles(scope, &spec.roles, &spec.target.service_class).await?;
    debug!(roles = roles.len(), "Resolved access policy roles");
    Ok(Policy {
        kind: PolicyKind::Access,
        subjects: vec![subject],
        roles,
        resources: vec![target_attributes(&spec.target, scope.account_id())],
    })
}

#[async_trait]
impl IamKind for AccessPolicy {
    type Status = AccessPolicyStatus;
    type CreateRequest = Policy;
    type UpdateRequest = Policy;
    type Remote = Policy;

    const FINALIZER: &'static str = ACCESS_POLICY_FINALIZER;
    const NOUN: &'static str = "access policy";

    fn status(&self) -> Option<&AccessPolicyStatus> {
        self.status.as_ref()
    }

    fn status_slot(&mut self) -> &mut Option<AccessPolicyStatus> {
        &mut self.status
    }

    fn is_well_formed(&self) -> Result<()> {
        self.spec.validate()
    }

    fn spec_drifted(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| drift::access_policy_spec_drift(&self.spec, status))
    }

    fn remote_drifted(&self, desired: &Policy, remote: &Policy) -> bool {
        drift::policy_remote_drift(desired, remote)
    }

    fn record_applied(&mut self, remote: &RemoteRef) {
        let status = self.status.get_or_insert_with(Default::default);
        status.policy_id = remote.id.clone();
        status.record_spec(&self.spec);
    }

    async fn to_remote_create_request(&self, scope: &SyncScope<'_>) -> Result<Policy> {
        desired_policy(self, scope).await
    }

    async fn to_remote_update_request(&self, scope: &SyncScope<'_>) -> Result<Policy> {
        desired_policy(self, scope).await
    }

    async fn create_remote(&self, scope: &SyncScope<'_>, request: &Policy) -> Result<RemoteRef> {
        let created = super::create_policy(scope, request).await?;
        info!(policy_id = %created.id, "Created access policy");
        Ok(created)
    }

    async fn fetch_remote(&self, scope: &SyncScope<'_>, id: &str) -> Result<(Policy, Etag)> {
        super::fetch_policy(scope, id).await
    }

    async fn update_remote(
        &self,
        scope: &SyncScope<'_>,
        id: &str,
        desired: &Policy,
        _remote: &Policy,
        etag: &Etag,
    ) -> Result<RemoteRef> {
        super::update_policy(scope, id, desired, etag).await
    }

    async fn delete_remote(
        &self,
        scope: &SyncScope<'_>,
        id: &str,
    ) -> std::result::Result<(), IamError> {
        super::delete_policy(scope, id).await
    }
}
