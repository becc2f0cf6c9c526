//! Drift detection
//!
//! Pure comparisons between a spec, the last applied state recorded in status
//! and the observed remote entity. Lists whose order carries no meaning
//! (members, roles, actions) compare as sets. A resource that has never been
//! synced has no drift; the create path handles it.

use std::collections::BTreeSet;

use iam_common::crd::{
    AccessGroupSpec, AccessGroupStatus, AccessPolicySpec, AccessPolicyStatus,
    AuthorizationPolicySpec, AuthorizationPolicyStatus, CustomRoleSpec, CustomRoleStatus,
    IamStatus, PolicyRoles, PolicySubject, PolicyTarget, ServiceInfo,
};

use crate::iam::{
    AccessGroupRequest, CustomRoleUpdate, GroupMember, Policy, RemoteAccessGroup,
    RemoteCustomRole,
};

/// Order-independent equality
pub fn same_set<T: Ord>(a: &[T], b: &[T]) -> bool {
    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
}

// =============================================================================
// Access groups
// =============================================================================

/// Spec differs from the last applied access group
pub fn access_group_spec_drift(spec: &AccessGroupSpec, status: &AccessGroupStatus) -> bool {
    if !status.is_synced() {
        return false;
    }
    spec.name != status.name
        || spec.description != status.description
        || !same_set(&spec.user_emails, &status.user_emails)
        || !same_set(&spec.service_ids, &status.service_ids)
}

/// Remote group differs from the desired name, description or member IDs
pub fn access_group_remote_drift(
    desired: &AccessGroupRequest,
    desired_members: &BTreeSet<String>,
    remote: &RemoteAccessGroup,
    remote_members: &[GroupMember],
) -> bool {
    let remote_ids: BTreeSet<String> = remote_members.iter().map(|m| m.id.clone()).collect();
    desired.name != remote.name
        || desired.description != remote.description
        || *desired_members != remote_ids
}

// =============================================================================
// Policies
// =============================================================================

fn subject_changed(a: &PolicySubject, b: &PolicySubject) -> bool {
    a.user_email != b.user_email
        || a.service_id != b.service_id
        || a.access_group_id != b.access_group_id
        || a.access_group_def != b.access_group_def
}

fn roles_changed(a: &PolicyRoles, b: &PolicyRoles) -> bool {
    !same_set(&a.defined_roles, &b.defined_roles)
        || !same_set(&a.custom_roles_d_name, &b.custom_roles_d_name)
        || !same_set(&a.custom_roles_def, &b.custom_roles_def)
}

fn target_changed(a: &PolicyTarget, b: &PolicyTarget) -> bool {
    a.resource_group != b.resource_group
        || a.service_class != b.service_class
        || a.service_id != b.service_id
        || a.resource_name != b.resource_name
        || a.resource_id != b.resource_id
        || a.resource_key != b.resource_key
        || a.resource_value != b.resource_value
        || a.region != b.region
}

fn service_changed(a: &ServiceInfo, b: &ServiceInfo) -> bool {
    a.service_class != b.service_class
        || a.service_id != b.service_id
        || a.resource_name != b.resource_name
        || a.resource_id != b.resource_id
        || a.resource_key != b.resource_key
        || a.resource_value != b.resource_value
        || a.resource_group != b.resource_group
}

/// Spec differs from the last applied access policy
pub fn access_policy_spec_drift(spec: &AccessPolicySpec, status: &AccessPolicyStatus) -> bool {
    if !status.is_synced() {
        return false;
    }
    subject_changed(&spec.subject, &status.subject)
        || roles_changed(&spec.roles, &status.roles)
        || target_changed(&spec.target, &status.target)
}

/// Spec differs from the last applied authorization policy
pub fn authorization_policy_spec_drift(
    spec: &AuthorizationPolicySpec,
    status: &AuthorizationPolicyStatus,
) -> bool {
    if !status.is_synced() {
        return false;
    }
    service_changed(&spec.source, &status.source)
        || !same_set(&spec.roles, &status.roles)
        || service_changed(&spec.target, &status.target)
}

/// Remote policy differs in subjects, granted role IDs or resources
pub fn policy_remote_drift(desired: &Policy, remote: &Policy) -> bool {
    let role_ids = |p: &Policy| p.roles.iter().map(|r| r.id.clone()).collect::<BTreeSet<_>>();
    !same_set(&desired.subjects, &remote.subjects)
        || role_ids(desired) != role_ids(remote)
        || !same_set(&desired.resources, &remote.resources)
}

// =============================================================================
// Custom roles
// =============================================================================

/// Mutable spec fields differ from the last applied custom role
pub fn custom_role_spec_drift(spec: &CustomRoleSpec, status: &CustomRoleStatus) -> bool {
    if !status.is_synced() {
        return false;
    }
    spec.display_name != status.display_name
        || spec.description != status.description
        || !same_set(&spec.actions, &status.actions)
}

/// Immutable spec fields differ from the last applied custom role
pub fn custom_role_immutable_drift(spec: &CustomRoleSpec, status: &CustomRoleStatus) -> bool {
    status.is_synced()
        && (spec.role_name != status.role_name || spec.service_class != status.service_class)
}

/// Remote role differs in display name, description or actions
pub fn custom_role_remote_drift(desired: &CustomRoleUpdate, remote: &RemoteCustomRole) -> bool {
    desired.display_name != remote.display_name
        || desired.description != remote.description
        || !same_set(&desired.actions, &remote.actions)
}
