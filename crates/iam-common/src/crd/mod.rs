//! Custom Resource Definitions for the IAM operator
//!
//! Every kind lives in the `ibmcloud.ibm.com/v1alpha1` API group, is
//! namespaced and carries a status subresource owned by the controller.

mod access_group;
mod access_policy;
mod authorization_policy;
mod custom_role;
mod status;

pub use access_group::{AccessGroup, AccessGroupSpec, AccessGroupStatus};
pub use access_policy::{
    AccessGroupRef, AccessPolicy, AccessPolicySpec, AccessPolicyStatus, CustomRoleRef,
    PolicyRoles, PolicySubject, PolicyTarget,
};
pub use authorization_policy::{
    AuthorizationPolicy, AuthorizationPolicySpec, AuthorizationPolicyStatus, ServiceInfo,
};
pub use custom_role::{CustomRole, CustomRoleSpec, CustomRoleStatus};
pub use status::{IamStatus, ResourceState, ResourceStatus};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// Generated definitions for every IAM custom resource
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        AccessGroup::crd(),
        AccessPolicy::crd(),
        AuthorizationPolicy::crd(),
        CustomRole::crd(),
    ]
}

/// Reject a list that contains blank entries
fn no_blank_entries(field: &str, values: &[String]) -> crate::Result<()> {
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(crate::Error::validation(field, "entries must not be empty"));
    }
    Ok(())
}
