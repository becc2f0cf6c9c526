//! Status transitions and messages

use iam_common::crd::{IamStatus, ResourceState};

use crate::kind::IamKind;

/// Message recorded when a resource is first seen
pub const PROCESSING_MESSAGE: &str = "Processing Resource";

/// Whether the controller has never written status
pub fn is_unset<K: IamKind>(resource: &K) -> bool {
    resource
        .status()
        .map_or(true, |status| *status == K::Status::default())
}

/// Current state, `Pending` when no status exists
pub fn state<K: IamKind>(resource: &K) -> ResourceState {
    resource.status().map(|s| s.state()).unwrap_or_default()
}

/// Recorded remote ID, empty when none
pub fn remote_id<K: IamKind>(resource: &K) -> String {
    resource
        .status()
        .map(|s| s.remote_id().to_string())
        .unwrap_or_default()
}

/// Set state and message; returns false when both were already set
pub fn transition<K: IamKind>(
    resource: &mut K,
    state: ResourceState,
    message: impl Into<String>,
) -> bool {
    let message = message.into();
    let current = resource
        .status_slot()
        .get_or_insert_with(Default::default)
        .resource_status_mut();
    if current.state == state && current.message == message {
        return false;
    }
    current.state = state;
    current.message = message;
    true
}

/// Forget the remote ID; returns false when none was recorded
pub fn clear_remote_id<K: IamKind>(resource: &mut K) -> bool {
    match resource.status_slot() {
        Some(status) if status.is_synced() => {
            status.clear_remote_id();
            true
        }
        _ => false,
    }
}

/// Status message after creating the remote entity
pub fn created(noun: &str) -> String {
    format!("New IAM {noun} created")
}

/// Status message after updating the remote entity
pub fn updated(noun: &str) -> String {
    format!("IAM {noun} updated")
}

/// Status message after deleting the remote entity
pub fn deleted(noun: &str) -> String {
    format!("IAM {noun} deleted")
}

/// Status message when a pass finds nothing to change
pub fn synchronized(noun: &str) -> String {
    format!("IAM {noun} synchronized")
}

/// Status message for a failed step
pub fn failure(step: &str, error: &dyn std::fmt::Display) -> String {
    format!("{step}: {error}")
}
