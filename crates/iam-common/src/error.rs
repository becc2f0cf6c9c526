//! Error types for the IAM operator
//!
//! Errors carry the resource or operation they concern so a failed
//! reconciliation can be traced back without reading the whole log.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Failure reported by a remote IAM adapter
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IamError {
    /// The remote entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind (access group, policy, custom role, ...)
        entity: String,
        /// Identifier that was looked up
        id: String,
    },

    /// The request conflicts with existing remote state
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict
        message: String,
    },

    /// Any other request failure (network, authorization, server error)
    #[error("request failed: {message}")]
    Request {
        /// Description of what failed
        message: String,
        /// Whether retrying the same request may succeed
        retryable: bool,
    },
}

impl IamError {
    /// Create a not-found error for the given entity
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
        }
    }

    /// Create a retryable request error
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request {
            message: msg.into(),
            retryable: true,
        }
    }

    /// Whether this is the not-found kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Main error type for IAM operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Remote IAM adapter error
    #[error("{operation} failed: {source}")]
    Remote {
        /// Operation that was attempted (e.g., "create access group")
        operation: String,
        /// The adapter failure
        #[source]
        source: IamError,
    },

    /// Spec failed a well-formedness rule
    #[error("{field}: {message}")]
    Validation {
        /// Offending field path (e.g., "spec.subject")
        field: String,
        /// Description of the violated rule
        message: String,
    },

    /// Account or session context could not be resolved
    #[error("account resolution failed for namespace {namespace}: {message}")]
    Account {
        /// Namespace whose configuration was consulted
        namespace: String,
        /// Description of what failed
        message: String,
    },

    /// Desired remote state could not be derived from the spec
    #[error("cannot resolve {resource}: {message}")]
    Resolution {
        /// What was being resolved (role name, subject, referenced resource)
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "store", "config")
        context: String,
    },
}

impl Error {
    /// Wrap an adapter failure with the operation that produced it
    pub fn remote(operation: impl Into<String>, source: IamError) -> Self {
        Self::Remote {
            operation: operation.into(),
            source,
        }
    }

    /// Create a validation error for a spec field
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create an account resolution error
    pub fn account(namespace: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Account {
            namespace: namespace.into(),
            message: msg.into(),
        }
    }

    /// Create a resolution error
    pub fn resolution(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Resolution {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether the error reports a missing object (remote entity or Kubernetes resource)
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            Error::Remote { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need a spec fix. Remote errors
    /// follow the adapter's classification.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // 4xx responses will not change on retry
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Remote { source, .. } => match source {
                IamError::NotFound { .. } | IamError::Conflict { .. } => false,
                IamError::Request { retryable, .. } => *retryable,
            },
            Error::Validation { .. } => false,
            Error::Account { .. } => true,
            Error::Resolution { .. } => true,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}
