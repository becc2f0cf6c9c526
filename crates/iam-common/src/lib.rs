//! Common types for the IAM operator: CRDs, errors, finalizers and configuration

#![deny(missing_docs)]

pub mod config;
pub mod credentials;
pub mod crd;
pub mod error;
pub mod finalizer;

pub use config::ControllerConfig;
pub use error::{Error, IamError};
pub use finalizer::FinalizerSet;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group shared by every IAM custom resource
pub const API_GROUP: &str = "ibmcloud.ibm.com";

/// Default interval between periodic drift-correction passes
pub const SYNC_PERIOD_SECS: u64 = 150;

/// Default requeue interval after a failed reconciliation pass
pub const ERROR_REQUEUE_SECS: u64 = 5;

/// Field manager used for server-side status patches
pub const FIELD_MANAGER: &str = "ibmcloud-iam-operator";

/// Marker prepended to every description written to the remote IAM service
pub const DESCRIPTION_PREFIX: &str = "OPERATOR OWNED: ";

/// Prefix a user-supplied description with the ownership marker
pub fn owned_description(description: &str) -> String {
    format!("{DESCRIPTION_PREFIX}{description}")
}
