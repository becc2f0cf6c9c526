//! Controller runner - builds one controller future per IAM kind
//!
//! The futures are returned to the caller, which owns the runtime and decides
//! how to drive them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};
use tracing::error;

use iam_common::crd::{AccessGroup, AccessPolicy, AuthorizationPolicy, CustomRole};
use iam_common::{ControllerConfig, Error, Result};

use crate::account::{AccountResolver, KubeConfigSource, NamespacedAccountResolver, SessionFactory};
use crate::engine::{self, Context};
use crate::kind::IamKind;
use crate::store::ObjectKey;

/// Server-side watch timeout in seconds. IAM resources change rarely, so
/// watches sit idle; the API server must end them before the client's 30s
/// read timeout does.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Reconcile entry point handed to the controller runtime
pub async fn reconcile<K: IamKind>(resource: Arc<K>, ctx: Arc<Context<K>>) -> Result<Action> {
    let key = ObjectKey::of(resource.as_ref())?;
    engine::reconcile(&key, &ctx).await.into_action()
}

/// Error policy: log and requeue after the configured error interval
pub fn error_policy<K: IamKind>(resource: Arc<K>, error: &Error, ctx: Arc<Context<K>>) -> Action {
    error!(
        kind = K::NOUN,
        resource = %resource.name_any(),
        namespace = ?resource.namespace(),
        error = %error,
        retryable = error.is_retryable(),
        "Reconciliation failed, will retry"
    );
    Action::requeue(ctx.config.error_requeue)
}

/// Build controller futures for every IAM kind
///
/// `sessions` opens authenticated remote sessions from the credentials found
/// for each resource's namespace.
pub fn build_controllers(
    client: Client,
    config: ControllerConfig,
    sessions: Arc<dyn SessionFactory>,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let source = Arc::new(KubeConfigSource::new(client.clone()));
    let accounts: Arc<dyn AccountResolver> = Arc::new(NamespacedAccountResolver::new(
        source,
        sessions,
        config.controller_namespace.clone(),
    ));

    vec![
        build_controller::<AccessGroup>(client.clone(), accounts.clone(), &config, "AccessGroup"),
        build_controller::<AccessPolicy>(client.clone(), accounts.clone(), &config, "AccessPolicy"),
        build_controller::<AuthorizationPolicy>(
            client.clone(),
            accounts.clone(),
            &config,
            "AuthorizationPolicy",
        ),
        build_controller::<CustomRole>(client, accounts, &config, "CustomRole"),
    ]
}

fn build_controller<K: IamKind>(
    client: Client,
    accounts: Arc<dyn AccountResolver>,
    config: &ControllerConfig,
    controller_name: &'static str,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(Context::<K>::kube(client.clone(), accounts, config.clone()));
    let resources: Api<K> = Api::all(client);

    tracing::info!("- {} controller", controller_name);

    Box::pin(
        Controller::new(
            resources,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(report_pass::<K, _, _>),
    )
}

/// Log the outcome the controller runtime reports for one pass of kind `K`
fn report_pass<K: IamKind, T: std::fmt::Debug, E: std::fmt::Debug>(
    outcome: std::result::Result<T, E>,
) -> std::future::Ready<()> {
    if let Err(e) = outcome {
        error!(kind = K::NOUN, error = ?e, "IAM controller pass failed");
    } else {
        tracing::trace!(kind = K::NOUN, "IAM controller pass finished");
    }
    std::future::ready(())
}
