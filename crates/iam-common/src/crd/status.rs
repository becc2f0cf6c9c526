//! Status types shared by every IAM kind

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Lifecycle state of a managed resource
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ResourceState {
    /// Seen by the controller, not yet synced
    #[default]
    Pending,
    /// Remote entity exists and matches the spec
    Online,
    /// Last pass failed; see the message
    Failed,
    /// Remote entity removed during deletion
    Deleted,
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Online => "Online",
            Self::Failed => "Failed",
            Self::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// State and message common to every kind's status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceStatus {
    /// Current state
    #[serde(default)]
    pub state: ResourceState,
    /// Human-readable message describing the state
    #[serde(default)]
    pub message: String,
}

/// Access to the controller-owned parts of a kind's status
pub trait IamStatus:
    Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Shared state and message
    fn resource_status(&self) -> &ResourceStatus;

    /// Mutable shared state and message
    fn resource_status_mut(&mut self) -> &mut ResourceStatus;

    /// Identifier of the remote entity, empty until it exists
    fn remote_id(&self) -> &str;

    /// Forget the remote entity
    fn clear_remote_id(&mut self);

    /// Current state
    fn state(&self) -> ResourceState {
        self.resource_status().state
    }

    /// Whether a remote entity has been recorded
    fn is_synced(&self) -> bool {
        !self.remote_id().is_empty()
    }
}
