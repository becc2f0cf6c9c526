//! Per-kind strategy consumed by the reconciliation engine
//!
//! The engine owns the lifecycle (status, finalizers, create/update/delete
//! decisions); each kind supplies validation, drift rules and the calls that
//! translate its spec into remote requests.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use iam_common::crd::IamStatus;
use iam_common::{IamError, Result};

use crate::iam::{Etag, IamSession};
use crate::refs::ReferenceResolver;

/// Everything a kind may consult while building or applying remote requests
pub struct SyncScope<'a> {
    /// Remote session for the resource's account
    pub iam: &'a IamSession,
    /// Lookups of other IAM resources
    pub refs: &'a dyn ReferenceResolver,
    /// Namespace of the resource being reconciled
    pub namespace: &'a str,
}

impl SyncScope<'_> {
    /// GUID of the session's account
    pub fn account_id(&self) -> &str {
        &self.iam.account.guid
    }
}

/// Identity of a remote entity after a create or update
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteRef {
    /// Remote ID
    pub id: String,
    /// CRN, for kinds that record one
    pub crn: Option<String>,
}

impl RemoteRef {
    /// Reference by ID only
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            crn: None,
        }
    }
}

/// A custom resource kind synchronized with the remote IAM service
#[async_trait]
pub trait IamKind:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Controller-owned status
    type Status: IamStatus;
    /// Remote request derived from the spec for creation
    type CreateRequest: Send + Sync;
    /// Remote request derived from the spec for updates and drift checks
    type UpdateRequest: Send + Sync;
    /// Observed remote state
    type Remote: Send + Sync;

    /// Finalizer gating deletion of this kind
    const FINALIZER: &'static str;
    /// Human-readable kind name used in status messages
    const NOUN: &'static str;

    /// Current status
    fn status(&self) -> Option<&Self::Status>;

    /// Mutable status slot
    fn status_slot(&mut self) -> &mut Option<Self::Status>;

    /// Pure validity check over the spec
    fn is_well_formed(&self) -> Result<()>;

    /// Revert spec fields that cannot change once synced; true if anything changed
    fn restore_immutable_fields(&mut self) -> bool {
        false
    }

    /// Whether the spec differs from the last applied state
    fn spec_drifted(&self) -> bool;

    /// Whether the remote entity differs from the desired request
    fn remote_drifted(&self, desired: &Self::UpdateRequest, remote: &Self::Remote) -> bool;

    /// Whether an update is required
    fn compute_drift(&self, desired: &Self::UpdateRequest, remote: &Self::Remote) -> bool {
        self.spec_drifted() || self.remote_drifted(desired, remote)
    }

    /// Record the remote identity and mirror the spec into status
    fn record_applied(&mut self, remote: &RemoteRef);

    /// Build the creation request
    async fn to_remote_create_request(&self, scope: &SyncScope<'_>) -> Result<Self::CreateRequest>;

    /// Build the update request
    async fn to_remote_update_request(&self, scope: &SyncScope<'_>) -> Result<Self::UpdateRequest>;

    /// Create the remote entity
    async fn create_remote(
        &self,
        scope: &SyncScope<'_>,
        request: &Self::CreateRequest,
    ) -> Result<RemoteRef>;

    /// Read the remote entity and its concurrency token
    async fn fetch_remote(&self, scope: &SyncScope<'_>, id: &str) -> Result<(Self::Remote, Etag)>;

    /// Apply `desired` to the remote entity guarded by `etag`
    async fn update_remote(
        &self,
        scope: &SyncScope<'_>,
        id: &str,
        desired: &Self::UpdateRequest,
        remote: &Self::Remote,
        etag: &Etag,
    ) -> Result<RemoteRef>;

    /// Delete the remote entity
    async fn delete_remote(
        &self,
        scope: &SyncScope<'_>,
        id: &str,
    ) -> std::result::Result<(), IamError>;
}
