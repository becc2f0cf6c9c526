//! IAM operator controller
//!
//! Reconciles AccessGroup, AccessPolicy, AuthorizationPolicy and CustomRole
//! resources against the remote IAM service. The [`engine`] holds the single
//! state machine; [`kinds`] supplies per-kind validation, drift rules and
//! remote calls; [`runner`] binds the engine to the Kubernetes controller
//! runtime.
//!
//! Remote sessions are opened by a caller-supplied [`SessionFactory`].

#![deny(missing_docs)]

pub mod account;
pub mod drift;
pub mod engine;
pub mod iam;
pub mod kind;
pub mod kinds;
pub mod refs;
pub mod resolve;
pub mod runner;
pub mod status;
pub mod store;

#[cfg(test)]
mod testing;

pub use account::{AccountResolver, NamespacedAccountResolver, SessionFactory};
pub use engine::{reconcile, Context, ReconcileOutcome};
pub use iam::IamSession;
pub use kind::IamKind;
pub use runner::build_controllers;
pub use store::ObjectKey;
