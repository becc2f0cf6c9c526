//! Authorization policy strategy

use async_trait::async_trait;
use tracing::info;

use iam_common::crd::{AuthorizationPolicy, AuthorizationPolicyStatus, ServiceInfo};
use iam_common::{Error, IamError, Result};

use crate::drift;
use crate::iam::{
    AttributeSet, Etag, Policy, PolicyKind, ACCOUNT_ID_ATTR, RESOURCE_ATTR,
    RESOURCE_GROUP_ID_ATTR, RESOURCE_TYPE_ATTR, SERVICE_INSTANCE_ATTR, SERVICE_NAME_ATTR,
};
use crate::kind::{IamKind, RemoteRef, SyncScope};
use crate::resolve;

/// Finalizer gating deletion of authorization policies
pub const AUTHORIZATION_POLICY_FINALIZER: &str = "authorizationpolicy.ibmcloud.ibm.com";

fn service_attributes(info: &ServiceInfo, account_id: &str) -> AttributeSet {
    let mut attributes = AttributeSet::default();
    attributes
        .set(SERVICE_NAME_ATTR, info.service_class.as_str())
        .set(SERVICE_INSTANCE_ATTR, info.service_id.as_str())
        .set(RESOURCE_TYPE_ATTR, info.resource_name.as_str())
        .set(RESOURCE_ATTR, info.resource_id.as_str())
        .set(RESOURCE_GROUP_ID_ATTR, info.resource_group.as_str())
        .set(ACCOUNT_ID_ATTR, account_id);
    if !info.resource_key.is_empty() {
        attributes.set(info.resource_key.as_str(), info.resource_value.as_str());
    }
    attributes
}

async fn desired_policy(policy: &AuthorizationPolicy, scope: &SyncScope<'_>) -> Result<Policy> {
    let spec = &policy.spec;
    let available = scope
        .iam
        .catalog
        .authorization_roles(&spec.source.service_class, &spec.target.service_class)
        .await
        .map_err(|e| Error::remote("list authorization roles", e))?;
    Ok(Policy {
        kind: PolicyKind::Authorization,
        subjects: vec![service_attributes(&spec.source, scope.account_id())],
        roles: resolve::select_roles(&spec.roles, &available)?,
        resources: vec![service_attributes(&spec.target, scope.account_id())],
    })
}

#[async_trait]
impl IamKind for AuthorizationPolicy {
    type Status = AuthorizationPolicyStatus;
    type CreateRequest = Policy;
    type UpdateRequest = Policy;
    type Remote = Policy;

    const FINALIZER: &'static str = AUTHORIZATION_POLICY_FINALIZER;
    const NOUN: &'static str = "authorization policy";

    fn status(&self) -> Option<&AuthorizationPolicyStatus> {
        self.status.as_ref()
    }

    fn status_slot(&mut self) -> &mut Option<AuthorizationPolicyStatus> {
        &mut self.status
    }

    fn is_well_formed(&self) -> Result<()> {
        self.spec.validate()
    }

    fn spec_drifted(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|status| drift::authorization_policy_spec_drift(&self.spec, status))
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
        info!(policy_id = %created.id, "Created authorization policy");
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
