//! Generic reconciliation engine
//!
//! One state machine drives every IAM kind:
//! - unset status → `Pending` (persisted before any remote call)
//! - malformed spec → `Failed`, periodic requeue
//! - deletion → remote delete, `Deleted`, finalizer removed
//! - remote ID recorded → fetch, compare, update on drift
//! - no remote ID → create, `Online`
//!
//! Per-kind behavior comes from [`IamKind`]. A pass keeps no state beyond the
//! resource's status and finalizers, so it is safe to re-run from the top.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::Client;
use tracing::{debug, error, info, instrument, warn};

use iam_common::crd::ResourceState;
use iam_common::{ControllerConfig, Error, FinalizerSet, Result};

use crate::account::AccountResolver;
use crate::kind::{IamKind, SyncScope};
use crate::refs::{KubeReferenceResolver, ReferenceResolver};
use crate::status;
use crate::store::{KubeResourceStore, ObjectKey, ResourceStore};

/// Shared state for reconciling one kind
pub struct Context<K> {
    /// Resource reads and writes
    pub store: Arc<dyn ResourceStore<K>>,
    /// Account and session lookup per namespace
    pub accounts: Arc<dyn AccountResolver>,
    /// Lookups of referenced resources
    pub refs: Arc<dyn ReferenceResolver>,
    /// Requeue intervals and naming
    pub config: ControllerConfig,
}

impl<K: IamKind> Context<K> {
    /// Create a context from explicit collaborators
    pub fn new(
        store: Arc<dyn ResourceStore<K>>,
        accounts: Arc<dyn AccountResolver>,
        refs: Arc<dyn ReferenceResolver>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            accounts,
            refs,
            config,
        }
    }

    /// Create a context backed by the Kubernetes API
    pub fn kube(client: Client, accounts: Arc<dyn AccountResolver>, config: ControllerConfig) -> Self {
        let store: Arc<dyn ResourceStore<K>> = Arc::new(KubeResourceStore::<K>::new(
            client.clone(),
            config.field_manager.clone(),
        ));
        let refs: Arc<dyn ReferenceResolver> = Arc::new(KubeReferenceResolver::new(client));
        Self::new(store, accounts, refs, config)
    }
}

/// Result of one pass: when to run again and what went wrong
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Run again after this interval; `None` waits for the next change
    pub requeue_after: Option<Duration>,
    /// Error surfaced to the scheduler for backoff
    pub error: Option<Error>,
}

impl ReconcileOutcome {
    fn done() -> Self {
        Self::default()
    }

    fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
            error: None,
        }
    }

    /// Convert to the controller runtime's result; an error wins over a requeue
    pub fn into_action(self) -> Result<Action> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(match self.requeue_after {
            Some(after) => Action::requeue(after),
            None => Action::await_change(),
        })
    }
}

/// Run one reconciliation pass for the resource at `key`
#[instrument(skip_all, fields(kind = K::NOUN, resource = %key))]
pub async fn reconcile<K: IamKind>(key: &ObjectKey, ctx: &Context<K>) -> ReconcileOutcome {
    match run(key, ctx).await {
        Ok(outcome) => outcome,
        Err(error) => ReconcileOutcome {
            requeue_after: None,
            error: Some(error),
        },
    }
}

async fn run<K: IamKind>(key: &ObjectKey, ctx: &Context<K>) -> Result<ReconcileOutcome> {
    let Some(mut resource) = ctx.store.get(key).await? else {
        debug!("Resource no longer exists");
        return Ok(ReconcileOutcome::done());
    };

    let deleting = resource.meta().deletion_timestamp.is_some();
    if deleting && !FinalizerSet::from_meta(resource.meta()).has(K::FINALIZER) {
        debug!("Resource is being deleted and holds no finalizer");
        return Ok(ReconcileOutcome::done());
    }

    if status::is_unset(&resource) {
        status::transition(&mut resource, ResourceState::Pending, status::PROCESSING_MESSAGE);
        resource = ctx.store.update_status(&resource).await?;
        info!(state = ?ResourceState::Pending, "Processing new resource");
    }

    match resource.is_well_formed() {
        Ok(()) => {}
        Err(err) if deleting && status::remote_id(&resource).is_empty() => {
            info!(error = %err, "Spec is not well-formed and nothing was created, removing finalizer");
            remove_finalizer(ctx, resource).await?;
            return Ok(ReconcileOutcome::done());
        }
        // Deletion goes by remote ID alone.
        Err(err) if deleting => {
            debug!(error = %err, "Spec is not well-formed, deleting by remote ID");
        }
        Err(err) => return fail_malformed(ctx, resource, err).await,
    }

    if !deleting && resource.restore_immutable_fields() {
        resource = ctx.store.update(&resource).await?;
    }

    let iam = match ctx.accounts.resolve(&key.namespace).await {
        Ok(iam) => iam,
        Err(err) if deleting => {
            // Remote entity may be orphaned; deletion of the resource wins.
            warn!(error = %err, "No account information while deleting, removing finalizer");
            remove_finalizer(ctx, resource).await?;
            return Ok(ReconcileOutcome::done());
        }
        Err(err) => {
            return fail(ctx, resource, "Error getting IAM account information", err).await;
        }
    };
    let scope = SyncScope {
        iam: &iam,
        refs: ctx.refs.as_ref(),
        namespace: &key.namespace,
    };

    if deleting {
        return delete(ctx, &scope, resource).await;
    }

    let mut finalizers = FinalizerSet::from_meta(resource.meta());
    if finalizers.add(K::FINALIZER) {
        finalizers.apply_to(resource.meta_mut());
        resource = ctx.store.update(&resource).await?;
        debug!(finalizer = K::FINALIZER, "Added finalizer");
    }

    let id = status::remote_id(&resource);
    if id.is_empty() {
        create(ctx, &scope, resource).await
    } else {
        sync(ctx, &scope, resource, &id).await
    }
}

async fn delete<K: IamKind>(
    ctx: &Context<K>,
    scope: &SyncScope<'_>,
    mut resource: K,
) -> Result<ReconcileOutcome> {
    let id = status::remote_id(&resource);
    if !id.is_empty() {
        match resource.delete_remote(scope, &id).await {
            Ok(()) => info!(remote_id = %id, "Deleted remote {}", K::NOUN),
            Err(e) if e.is_not_found() => {
                debug!(remote_id = %id, "Remote {} already gone", K::NOUN)
            }
            Err(e) => {
                let err = Error::remote(format!("delete {}", K::NOUN), e);
                let step = format!("Error deleting {}", K::NOUN);
                return fail(ctx, resource, &step, err).await;
            }
        }
    }

    status::transition(&mut resource, ResourceState::Deleted, status::deleted(K::NOUN));
    status::clear_remote_id(&mut resource);
    let resource = ctx.store.update_status(&resource).await?;
    remove_finalizer(ctx, resource).await?;
    Ok(ReconcileOutcome::done())
}

async fn create<K: IamKind>(
    ctx: &Context<K>,
    scope: &SyncScope<'_>,
    mut resource: K,
) -> Result<ReconcileOutcome> {
    let request = match resource.to_remote_create_request(scope).await {
        Ok(request) => request,
        Err(err) => {
            let step = format!("Error resolving {} request", K::NOUN);
            return fail(ctx, resource, &step, err).await;
        }
    };
    let created = match resource.create_remote(scope, &request).await {
        Ok(created) => created,
        Err(err) => {
            let step = format!("Error creating {}", K::NOUN);
            return fail(ctx, resource, &step, err).await;
        }
    };

    resource.record_applied(&created);
    status::transition(&mut resource, ResourceState::Online, status::created(K::NOUN));
    if let Err(persist_err) = ctx.store.update_status(&resource).await {
        warn!(remote_id = %created.id, error = %persist_err, "Failed to record new remote {}, deleting it", K::NOUN);
        match resource.delete_remote(scope, &created.id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => error!(remote_id = %created.id, error = %e, "Failed to delete unrecorded remote {}", K::NOUN),
        }
        return Err(persist_err);
    }
    info!(remote_id = %created.id, state = ?ResourceState::Online, "Created remote {}", K::NOUN);
    Ok(ReconcileOutcome::requeue(ctx.config.sync_period))
}

async fn sync<K: IamKind>(
    ctx: &Context<K>,
    scope: &SyncScope<'_>,
    mut resource: K,
    id: &str,
) -> Result<ReconcileOutcome> {
    let (remote, etag) = match resource.fetch_remote(scope, id).await {
        Ok(fetched) => fetched,
        Err(err) => {
            warn!(remote_id = %id, error = %err, "Failed to read remote {}, forgetting its ID", K::NOUN);
            let step = format!("Error retrieving {}", K::NOUN);
            status::transition(&mut resource, ResourceState::Failed, status::failure(&step, &err));
            status::clear_remote_id(&mut resource);
            ctx.store.update_status(&resource).await?;
            return Ok(ReconcileOutcome {
                requeue_after: Some(ctx.config.sync_period),
                error: Some(err),
            });
        }
    };

    let desired = match resource.to_remote_update_request(scope).await {
        Ok(desired) => desired,
        Err(err) => {
            let step = format!("Error resolving {} request", K::NOUN);
            return fail(ctx, resource, &step, err).await;
        }
    };

    if resource.compute_drift(&desired, &remote) {
        info!(remote_id = %id, "Drift detected, updating remote {}", K::NOUN);
        let applied = match resource.update_remote(scope, id, &desired, &remote, &etag).await {
            Ok(applied) => applied,
            Err(err) => {
                let step = format!("Error updating {}", K::NOUN);
                return fail(ctx, resource, &step, err).await;
            }
        };
        resource.record_applied(&applied);
        status::transition(&mut resource, ResourceState::Online, status::updated(K::NOUN));
        ctx.store.update_status(&resource).await?;
    } else if status::state(&resource) != ResourceState::Online {
        status::transition(
            &mut resource,
            ResourceState::Online,
            status::synchronized(K::NOUN),
        );
        ctx.store.update_status(&resource).await?;
    } else {
        debug!(remote_id = %id, "No drift");
    }

    Ok(ReconcileOutcome::requeue(ctx.config.sync_period))
}

/// Record `Failed` with the step and error, then surface the error
async fn fail<K: IamKind>(
    ctx: &Context<K>,
    mut resource: K,
    step: &str,
    err: Error,
) -> Result<ReconcileOutcome> {
    warn!(error = %err, "{step}");
    if status::transition(&mut resource, ResourceState::Failed, status::failure(step, &err)) {
        if let Err(e) = ctx.store.update_status(&resource).await {
            warn!(error = %e, "Failed to record failure in status");
        }
    }
    Err(err)
}

async fn fail_malformed<K: IamKind>(
    ctx: &Context<K>,
    mut resource: K,
    err: Error,
) -> Result<ReconcileOutcome> {
    warn!(error = %err, "Spec is not well-formed");
    if status::state(&resource) != ResourceState::Failed {
        status::transition(
            &mut resource,
            ResourceState::Failed,
            format!("spec is not well-formed: {err}"),
        );
        ctx.store.update_status(&resource).await?;
    }
    Ok(ReconcileOutcome::requeue(ctx.config.sync_period))
}

async fn remove_finalizer<K: IamKind>(ctx: &Context<K>, mut resource: K) -> Result<()> {
    let mut finalizers = FinalizerSet::from_meta(resource.meta());
    if finalizers.remove(K::FINALIZER) {
        finalizers.apply_to(resource.meta_mut());
        ctx.store.update(&resource).await?;
        info!(finalizer = K::FINALIZER, "Removed finalizer");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::MockAccountResolver;
    use crate::iam::{
        AccountUser, CustomRoleRequest, Etag, GroupMember, PolicyKind, PolicyRole,
        RemoteAccessGroup, RemoteCustomRole, RemotePolicy,
    };
    use crate::kind::RemoteRef;
    use crate::refs::MockReferenceResolver;
    use crate::testing::{self, access_group, IamMocks, MemoryStore};
    use iam_common::crd::{
        AccessGroup, AuthorizationPolicy, CustomRole, IamStatus, PolicySubject,
    };
    use iam_common::IamError;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SYNC: Duration = Duration::from_secs(150);

    fn context<K: IamKind>(store: Arc<MemoryStore<K>>, mocks: IamMocks) -> Context<K> {
        testing::init_tracing();
        let iam = testing::session(mocks);
        let mut accounts = MockAccountResolver::new();
        accounts
            .expect_resolve()
            .returning(move |_| Ok(iam.clone()));
        Context::new(
            store,
            Arc::new(accounts),
            Arc::new(MockReferenceResolver::new()),
            ControllerConfig::default(),
        )
    }

    fn context_without_account<K: IamKind>(store: Arc<MemoryStore<K>>) -> Context<K> {
        let mut accounts = MockAccountResolver::new();
        accounts
            .expect_resolve()
            .returning(|ns| Err(Error::account(ns, "secret secret-ibmcloud-iam-operator not found")));
        Context::new(
            store,
            Arc::new(accounts),
            Arc::new(MockReferenceResolver::new()),
            ControllerConfig::default(),
        )
    }

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new(testing::NAMESPACE, name)
    }

    /// A resource as it looks after a successful create
    fn online<K: IamKind>(mut resource: K, id: &str) -> K {
        resource.record_applied(&RemoteRef::new(id));
        status::transition(&mut resource, ResourceState::Online, status::created(K::NOUN));
        let mut finalizers = FinalizerSet::from_meta(resource.meta());
        finalizers.add(K::FINALIZER);
        finalizers.apply_to(resource.meta_mut());
        resource
    }

    fn active_user(email: &str) -> AccountUser {
        let local = email.split('@').next().unwrap_or_default();
        AccountUser {
            id: format!("u-{local}"),
            user_id: email.to_string(),
            iam_id: format!("IBMid-{local}"),
            state: "ACTIVE".to_string(),
        }
    }

    fn remote_group(id: &str) -> RemoteAccessGroup {
        RemoteAccessGroup {
            id: id.to_string(),
            name: "g1".to_string(),
            description: "OPERATOR OWNED: g1 team".to_string(),
        }
    }

    fn viewer() -> PolicyRole {
        PolicyRole {
            id: "crn:v1:bluemix:public:iam::::role:Viewer".to_string(),
            name: "Viewer".to_string(),
        }
    }

    fn reader() -> PolicyRole {
        PolicyRole {
            id: "crn:v1:bluemix:public:iam::::serviceRole:Reader".to_string(),
            name: "Reader".to_string(),
        }
    }

    fn expect_active_users(mocks: &mut IamMocks) {
        mocks
            .identities
            .expect_find_user()
            .returning(|_, email| Ok(Some(active_user(email))));
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// A new group is recorded as Pending before the remote service is
    /// touched, then created once and brought Online with its remote ID.
    #[tokio::test]
    async fn new_group_is_created_and_goes_online() {
        let store = MemoryStore::with(access_group("g1", &["a@x.com"]));
        let mut mocks = IamMocks::default();
        expect_active_users(&mut mocks);

        let observer = store.clone();
        mocks
            .groups
            .expect_find_by_name()
            .times(1)
            .returning(move |_, _| {
                assert_eq!(
                    observer.status_writes(),
                    vec![(ResourceState::Pending, "Processing Resource".to_string())]
                );
                Ok(vec![])
            });
        mocks
            .groups
            .expect_create()
            .times(1)
            .returning(|_, _| Ok(remote_group("abc")));
        mocks
            .groups
            .expect_add_members()
            .withf(|id, members| id == "abc" && members == &vec![GroupMember::user("IBMid-a")])
            .times(1)
            .returning(|_, _| Ok(()));
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.requeue_after, Some(SYNC));

        let stored = store.stored("g1").unwrap();
        let status = stored.status.as_ref().unwrap();
        assert_eq!(status.state(), ResourceState::Online);
        assert_eq!(status.group_id, "abc");
        assert_eq!(status.name, "g1");
        assert_eq!(status.resource.message, "New IAM access group created");
        assert!(FinalizerSet::from_meta(&stored.metadata).has(AccessGroup::FINALIZER));
    }

    /// Running the same pass again with nothing changed neither creates a
    /// second group nor rewrites status.
    #[tokio::test]
    async fn second_pass_is_idempotent() {
        let store = MemoryStore::with(access_group("g1", &["a@x.com"]));
        let mut mocks = IamMocks::default();
        expect_active_users(&mut mocks);
        mocks.groups.expect_find_by_name().times(1).returning(|_, _| Ok(vec![]));
        mocks
            .groups
            .expect_create()
            .times(1)
            .returning(|_, _| Ok(remote_group("abc")));
        mocks.groups.expect_add_members().times(1).returning(|_, _| Ok(()));
        mocks
            .groups
            .expect_get()
            .returning(|id| Ok((remote_group(id), Etag::new("v1"))));
        mocks
            .groups
            .expect_list_members()
            .returning(|_| Ok(vec![GroupMember::user("IBMid-a")]));
        mocks.groups.expect_update().never();
        let ctx = context(store.clone(), mocks);

        reconcile(&key("g1"), &ctx).await;
        let first = store.stored("g1").unwrap();
        let writes = store.status_writes().len();

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.requeue_after, Some(SYNC));
        assert_eq!(store.stored("g1").unwrap().status, first.status);
        assert_eq!(store.status_writes().len(), writes);
    }

    #[tokio::test]
    async fn missing_resource_is_done() {
        let store = MemoryStore::<AccessGroup>::empty();
        let ctx = context(store, IamMocks::default());

        let outcome = reconcile(&key("gone"), &ctx).await;
        assert!(outcome.error.is_none());
        assert!(outcome.requeue_after.is_none());
    }

    /// A status write that fails after the remote create deletes the new
    /// remote entity and surfaces the write error.
    #[tokio::test]
    async fn unrecorded_create_is_compensated() {
        let store = MemoryStore::with(testing::custom_role("rotator"));
        let mut mocks = IamMocks::default();
        mocks.roles.expect_list().returning(|_, _| Ok(vec![]));
        let observer = store.clone();
        mocks.roles.expect_create().times(1).returning(move |req: &CustomRoleRequest| {
            observer.fail_status_writes();
            Ok(RemoteCustomRole {
                id: "role-1".to_string(),
                crn: "crn:role:role-1".to_string(),
                name: req.name.clone(),
                ..Default::default()
            })
        });
        mocks
            .roles
            .expect_delete()
            .withf(|id| id == "role-1")
            .times(1)
            .returning(|_| Ok(()));
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("rotator"), &ctx).await;
        let err = outcome.error.expect("persist error surfaces");
        assert!(err.to_string().contains("status write rejected"));
        let stored = store.stored("rotator").unwrap();
        assert!(!stored.status.as_ref().unwrap().is_synced());
    }

    #[tokio::test]
    async fn create_failure_is_reported_in_status() {
        let store = MemoryStore::with(testing::custom_role("rotator"));
        let mut mocks = IamMocks::default();
        mocks.roles.expect_list().returning(|_, _| Ok(vec![]));
        mocks
            .roles
            .expect_create()
            .returning(|_| Err(IamError::request("service unavailable")));
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("rotator"), &ctx).await;
        assert!(outcome.error.is_some());
        let status = store.stored("rotator").unwrap().status.unwrap();
        assert_eq!(status.state(), ResourceState::Failed);
        assert!(status.resource.message.starts_with("Error creating custom role: "));
        assert!(status.resource.message.contains("service unavailable"));
    }

    // =========================================================================
    // Drift
    // =========================================================================

    /// A member added to the spec is drift; the update carries the etag from
    /// the read and only the missing member is added.
    #[tokio::test]
    async fn added_member_updates_group_with_etag() {
        let mut group = online(access_group("g1", &["a@x.com"]), "abc");
        group.spec.user_emails.push("b@x.com".to_string());
        let store = MemoryStore::with(group);

        let mut mocks = IamMocks::default();
        expect_active_users(&mut mocks);
        mocks
            .groups
            .expect_get()
            .returning(|id| Ok((remote_group(id), Etag::new("v42"))));
        mocks
            .groups
            .expect_list_members()
            .returning(|_| Ok(vec![GroupMember::user("IBMid-a")]));
        mocks
            .groups
            .expect_update()
            .withf(|id, _, etag| id == "abc" && etag == &Etag::new("v42"))
            .times(1)
            .returning(|id, _, _| Ok(remote_group(id)));
        mocks
            .groups
            .expect_add_members()
            .withf(|_, members| members == &vec![GroupMember::user("IBMid-b")])
            .times(1)
            .returning(|_, _| Ok(()));
        mocks.groups.expect_remove_member().never();
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_none());

        let status = store.stored("g1").unwrap().status.unwrap();
        assert_eq!(status.state(), ResourceState::Online);
        assert_eq!(status.resource.message, "IAM access group updated");
        assert_eq!(status.user_emails, vec!["a@x.com", "b@x.com"]);
    }

    /// A remote edit made outside the controller is reverted even when the
    /// spec did not change.
    #[tokio::test]
    async fn remote_edit_is_reverted() {
        let store = MemoryStore::with(online(access_group("g1", &["a@x.com"]), "abc"));
        let mut mocks = IamMocks::default();
        expect_active_users(&mut mocks);
        mocks.groups.expect_get().returning(|id| {
            let mut group = remote_group(id);
            group.description = "edited in the console".to_string();
            Ok((group, Etag::new("v2")))
        });
        mocks
            .groups
            .expect_list_members()
            .returning(|_| Ok(vec![GroupMember::user("IBMid-a")]));
        mocks
            .groups
            .expect_update()
            .withf(|_, req, _| req.description == "OPERATOR OWNED: g1 team")
            .times(1)
            .returning(|id, _, _| Ok(remote_group(id)));
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.requeue_after, Some(SYNC));
    }

    /// With no drift, a resource left Failed by an earlier pass is brought
    /// back Online without a remote update.
    #[tokio::test]
    async fn failed_resource_without_drift_is_synchronized() {
        let mut group = online(access_group("g1", &["a@x.com"]), "abc");
        status::transition(&mut group, ResourceState::Failed, "Error updating access group: timeout");
        let store = MemoryStore::with(group);
        let mut mocks = IamMocks::default();
        expect_active_users(&mut mocks);
        mocks
            .groups
            .expect_get()
            .returning(|id| Ok((remote_group(id), Etag::new("v1"))));
        mocks
            .groups
            .expect_list_members()
            .returning(|_| Ok(vec![GroupMember::user("IBMid-a")]));
        mocks.groups.expect_update().never();
        let ctx = context(store.clone(), mocks);

        reconcile(&key("g1"), &ctx).await;
        let status = store.stored("g1").unwrap().status.unwrap();
        assert_eq!(status.state(), ResourceState::Online);
        assert_eq!(status.resource.message, "IAM access group synchronized");
    }

    /// A remote entity that cannot be read is forgotten so that a later pass
    /// recreates it.
    #[tokio::test]
    async fn unreadable_remote_clears_id() {
        let store = MemoryStore::with(online(access_group("g1", &["a@x.com"]), "abc"));
        let mut mocks = IamMocks::default();
        mocks
            .groups
            .expect_get()
            .returning(|id| Err(IamError::not_found("access group", id)));
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_some());
        assert_eq!(outcome.requeue_after, Some(SYNC));

        let status = store.stored("g1").unwrap().status.unwrap();
        assert_eq!(status.state(), ResourceState::Failed);
        assert!(status.resource.message.starts_with("Error retrieving access group"));
        assert_eq!(status.group_id, "");
    }

    /// Renaming a synced custom role restores the recorded name in the spec
    /// and sends nothing to the remote service.
    #[tokio::test]
    async fn immutable_role_fields_are_restored() {
        let mut role = online(testing::custom_role("rotator"), "role-1");
        role.spec.role_name = "Renamed".to_string();
        let store = MemoryStore::with(role);

        let mut mocks = IamMocks::default();
        mocks.roles.expect_get().returning(|id| {
            Ok((
                RemoteCustomRole {
                    id: id.to_string(),
                    name: "KeyRotator".to_string(),
                    service_name: "kms".to_string(),
                    display_name: "Key Rotator".to_string(),
                    description: "OPERATOR OWNED: Rotates root keys".to_string(),
                    actions: vec!["kms.secrets.read".to_string(), "kms.secrets.rotate".to_string()],
                    ..Default::default()
                },
                Etag::new("r1"),
            ))
        });
        mocks.roles.expect_update().never();
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("rotator"), &ctx).await;
        assert!(outcome.error.is_none());

        let stored: CustomRole = store.stored("rotator").unwrap();
        assert_eq!(stored.spec.role_name, "KeyRotator");
        assert_eq!(store.metadata_writes(), 1);
    }

    // =========================================================================
    // Well-formedness
    // =========================================================================

    /// Conflicting subject selectors fail the resource without touching the
    /// account or the remote service; a second pass does not rewrite status.
    #[tokio::test]
    async fn conflicting_selectors_fail_without_remote_calls() {
        let mut policy = testing::access_policy("p1");
        policy.spec.subject = PolicySubject {
            user_email: "a@x.com".to_string(),
            service_id: "ServiceId-1".to_string(),
            ..Default::default()
        };
        let store = MemoryStore::with(policy);
        let mut accounts = MockAccountResolver::new();
        accounts.expect_resolve().never();
        let ctx = Context::new(
            store.clone(),
            Arc::new(accounts),
            Arc::new(MockReferenceResolver::new()),
            ControllerConfig::default(),
        );

        let outcome = reconcile(&key("p1"), &ctx).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.requeue_after, Some(SYNC));

        let status = store.stored("p1").unwrap().status.unwrap();
        assert_eq!(status.state(), ResourceState::Failed);
        assert!(status.resource.message.starts_with("spec is not well-formed: "));

        reconcile(&key("p1"), &ctx).await;
        assert_eq!(store.status_writes().len(), 2);
    }

    /// Emptying a synced group's members makes it malformed; deleting it
    /// afterwards still removes the remote group before the finalizer.
    #[tokio::test]
    async fn malformed_synced_resource_is_deleted_remotely() {
        let mut group = online(access_group("g1", &["a@x.com"]), "abc");
        group.spec.user_emails.clear();
        testing::mark_deleted(&mut group);
        let store = MemoryStore::with(group);
        let mut mocks = IamMocks::default();
        mocks
            .groups
            .expect_delete()
            .withf(|id| id == "abc")
            .times(1)
            .returning(|_| Ok(()));
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_none());
        assert!(store.stored("g1").is_none());

        let removed = store.removed("g1").unwrap();
        let status = removed.status.unwrap();
        assert_eq!(status.state(), ResourceState::Deleted);
        assert_eq!(status.group_id, "");
    }

    /// A malformed resource that never reached the remote service has
    /// nothing to clean up, so the account is never resolved.
    #[tokio::test]
    async fn malformed_unsynced_resource_drops_finalizer() {
        let mut group = access_group("g1", &[]);
        let mut finalizers = FinalizerSet::from_meta(&group.metadata);
        finalizers.add(AccessGroup::FINALIZER);
        finalizers.apply_to(&mut group.metadata);
        testing::mark_deleted(&mut group);
        let store = MemoryStore::with(group);
        let mut accounts = MockAccountResolver::new();
        accounts.expect_resolve().never();
        let ctx = Context::new(
            store.clone(),
            Arc::new(accounts),
            Arc::new(MockReferenceResolver::new()),
            ControllerConfig::default(),
        );

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_none());
        assert!(store.stored("g1").is_none());
        let removed = store.removed("g1").unwrap();
        assert!(!FinalizerSet::from_meta(&removed.metadata).has(AccessGroup::FINALIZER));
    }

    // =========================================================================
    // Account resolution
    // =========================================================================

    #[tokio::test]
    async fn missing_account_fails_resource() {
        let store = MemoryStore::with(access_group("g1", &["a@x.com"]));
        let ctx = context_without_account(store.clone());

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_some());
        assert!(outcome.requeue_after.is_none());

        let status = store.stored("g1").unwrap().status.unwrap();
        assert_eq!(status.state(), ResourceState::Failed);
        assert!(status
            .resource
            .message
            .starts_with("Error getting IAM account information"));
    }

    /// Without credentials a deletion cannot clean up remotely; the finalizer
    /// is removed anyway so the resource can go away.
    #[tokio::test]
    async fn missing_account_while_deleting_drops_finalizer() {
        let mut group = online(access_group("g1", &["a@x.com"]), "abc");
        testing::mark_deleted(&mut group);
        let store = MemoryStore::with(group);
        let ctx = context_without_account(store.clone());

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_none());
        assert!(store.stored("g1").is_none());
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// A remote entity that is already gone counts as deleted.
    #[tokio::test]
    async fn deletion_tolerates_missing_remote() {
        let mut group = online(access_group("g1", &["a@x.com"]), "abc");
        testing::mark_deleted(&mut group);
        let store = MemoryStore::with(group);
        let mut mocks = IamMocks::default();
        mocks
            .groups
            .expect_delete()
            .withf(|id| id == "abc")
            .times(1)
            .returning(|id| Err(IamError::not_found("access group", id)));
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_none());
        assert!(outcome.requeue_after.is_none());

        assert!(store.stored("g1").is_none());
        let removed = store.removed("g1").unwrap();
        let status = removed.status.unwrap();
        assert_eq!(status.state(), ResourceState::Deleted);
        assert_eq!(status.group_id, "");
        assert!(!FinalizerSet::from_meta(&removed.metadata).has(AccessGroup::FINALIZER));
    }

    /// Any other delete failure keeps the finalizer and the remote ID so the
    /// deletion is retried.
    #[tokio::test]
    async fn failed_remote_delete_keeps_finalizer() {
        let mut group = online(access_group("g1", &["a@x.com"]), "abc");
        testing::mark_deleted(&mut group);
        let store = MemoryStore::with(group);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let mut mocks = IamMocks::default();
        mocks.groups.expect_delete().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(IamError::request("connection reset"))
        });
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_some());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        let stored = store.stored("g1").unwrap();
        assert!(FinalizerSet::from_meta(&stored.metadata).has(AccessGroup::FINALIZER));
        assert_eq!(stored.status.unwrap().group_id, "abc");
    }

    #[tokio::test]
    async fn deletion_without_finalizer_is_done() {
        let mut group = access_group("g1", &["a@x.com"]);
        testing::mark_deleted(&mut group);
        let store = MemoryStore::with(group);
        let ctx = context_without_account(store.clone());

        let outcome = reconcile(&key("g1"), &ctx).await;
        assert!(outcome.error.is_none());
        assert!(store.status_writes().is_empty());
        assert_eq!(store.metadata_writes(), 0);
    }

    // =========================================================================
    // Policy lifecycle
    // =========================================================================

    /// An access policy is created from its resolved subject and roles, then
    /// deleted remotely by ID once the resource is marked for deletion.
    #[tokio::test]
    async fn access_policy_is_created_then_deleted() {
        let store = MemoryStore::with(testing::access_policy("p1"));
        let mut mocks = IamMocks::default();
        expect_active_users(&mut mocks);
        mocks
            .catalog
            .expect_service_roles()
            .with(eq("cloud-object-storage"))
            .returning(|_| Ok(vec![viewer()]));
        mocks
            .policies
            .expect_create()
            .withf(|policy| policy.kind == PolicyKind::Access && policy.roles == vec![viewer()])
            .times(1)
            .returning(|policy| {
                Ok(RemotePolicy {
                    id: "policy-1".to_string(),
                    policy: policy.clone(),
                })
            });
        mocks
            .policies
            .expect_delete()
            .withf(|id| id == "policy-1")
            .times(1)
            .returning(|_| Ok(()));
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("p1"), &ctx).await;
        assert!(outcome.error.is_none());
        let mut stored = store.stored("p1").unwrap();
        let status = stored.status.as_ref().unwrap();
        assert_eq!(status.state(), ResourceState::Online);
        assert_eq!(status.policy_id, "policy-1");

        testing::mark_deleted(&mut stored);
        store.put(stored);
        let outcome = reconcile(&key("p1"), &ctx).await;
        assert!(outcome.error.is_none());
        assert!(outcome.requeue_after.is_none());

        assert!(store.stored("p1").is_none());
        let status = store.removed("p1").unwrap().status.unwrap();
        assert_eq!(status.state(), ResourceState::Deleted);
        assert_eq!(status.policy_id, "");
    }

    #[tokio::test]
    async fn authorization_policy_is_created_then_deleted() {
        let store = MemoryStore::with(testing::authorization_policy("cos-to-kms"));
        let mut mocks = IamMocks::default();
        mocks
            .catalog
            .expect_authorization_roles()
            .with(eq("cloud-object-storage"), eq("kms"))
            .returning(|_, _| Ok(vec![reader()]));
        mocks
            .policies
            .expect_create()
            .withf(|policy| policy.kind == PolicyKind::Authorization)
            .times(1)
            .returning(|policy| {
                Ok(RemotePolicy {
                    id: "policy-2".to_string(),
                    policy: policy.clone(),
                })
            });
        mocks
            .policies
            .expect_delete()
            .withf(|id| id == "policy-2")
            .times(1)
            .returning(|_| Ok(()));
        let ctx = context(store.clone(), mocks);

        let outcome = reconcile(&key("cos-to-kms"), &ctx).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.requeue_after, Some(SYNC));
        let mut stored = store.stored("cos-to-kms").unwrap();
        let status = stored.status.as_ref().unwrap();
        assert_eq!(status.state(), ResourceState::Online);
        assert_eq!(status.policy_id, "policy-2");
        assert!(FinalizerSet::from_meta(&stored.metadata).has(AuthorizationPolicy::FINALIZER));

        testing::mark_deleted(&mut stored);
        store.put(stored);
        let outcome = reconcile(&key("cos-to-kms"), &ctx).await;
        assert!(outcome.error.is_none());

        assert!(store.stored("cos-to-kms").is_none());
        let status = store.removed("cos-to-kms").unwrap().status.unwrap();
        assert_eq!(status.state(), ResourceState::Deleted);
        assert_eq!(status.policy_id, "");
    }

    // =========================================================================
    // Outcome
    // =========================================================================

    #[test]
    fn error_wins_over_requeue() {
        let outcome = ReconcileOutcome {
            requeue_after: Some(SYNC),
            error: Some(Error::internal("boom")),
        };
        assert!(outcome.into_action().is_err());

        let action = ReconcileOutcome::requeue(SYNC).into_action().unwrap();
        assert_eq!(action, Action::requeue(SYNC));
        assert_eq!(
            ReconcileOutcome::done().into_action().unwrap(),
            Action::await_change()
        );
    }
}
