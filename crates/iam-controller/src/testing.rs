//! Fixtures shared by unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::ObjectMeta;

use iam_common::crd::{
    AccessGroup, AccessGroupSpec, AccessPolicy, AccessPolicySpec, AuthorizationPolicy,
    AuthorizationPolicySpec, CustomRole, CustomRoleSpec, IamStatus, PolicyRoles, PolicySubject,
    PolicyTarget, ResourceState, ServiceInfo,
};
use iam_common::{Error, Result};

use crate::iam::{
    AccountInfo, IamSession, MockAccessGroupApi, MockCustomRoleApi, MockIdentityApi,
    MockPolicyApi, MockRoleCatalog,
};
use crate::kind::{IamKind, SyncScope};
use crate::refs::ReferenceResolver;
use crate::store::{ObjectKey, ResourceStore};

/// Account every test session is bound to
pub const ACCOUNT_ID: &str = "acct-123";

/// Namespace of fixture resources
pub const NAMESPACE: &str = "team-a";

/// Remote mocks, configured by the test before building a session
#[derive(Default)]
pub struct IamMocks {
    pub groups: MockAccessGroupApi,
    pub policies: MockPolicyApi,
    pub roles: MockCustomRoleApi,
    pub catalog: MockRoleCatalog,
    pub identities: MockIdentityApi,
}

pub fn session(mocks: IamMocks) -> IamSession {
    IamSession {
        account: AccountInfo {
            guid: ACCOUNT_ID.to_string(),
        },
        groups: Arc::new(mocks.groups),
        policies: Arc::new(mocks.policies),
        roles: Arc::new(mocks.roles),
        catalog: Arc::new(mocks.catalog),
        identities: Arc::new(mocks.identities),
    }
}

pub fn scope<'a>(iam: &'a IamSession, refs: &'a dyn ReferenceResolver) -> SyncScope<'a> {
    SyncScope {
        iam,
        refs,
        namespace: NAMESPACE,
    }
}

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        ..Default::default()
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

pub fn access_group(name: &str, emails: &[&str]) -> AccessGroup {
    let mut group = AccessGroup::new(
        name,
        AccessGroupSpec {
            name: name.to_string(),
            description: format!("{name} team"),
            user_emails: strings(emails),
            service_ids: vec![],
        },
    );
    group.metadata = meta(name);
    group
}

pub fn access_policy(name: &str) -> AccessPolicy {
    let mut policy = AccessPolicy::new(
        name,
        AccessPolicySpec {
            subject: PolicySubject {
                user_email: "a@x.com".to_string(),
                ..Default::default()
            },
            roles: PolicyRoles {
                defined_roles: strings(&["Viewer"]),
                ..Default::default()
            },
            target: PolicyTarget {
                service_class: "cloud-object-storage".to_string(),
                ..Default::default()
            },
        },
    );
    policy.metadata = meta(name);
    policy
}

pub fn authorization_policy(name: &str) -> AuthorizationPolicy {
    let service = |class: &str| ServiceInfo {
        service_class: class.to_string(),
        ..Default::default()
    };
    let mut policy = AuthorizationPolicy::new(
        name,
        AuthorizationPolicySpec {
            source: service("cloud-object-storage"),
            roles: strings(&["Reader"]),
            target: service("kms"),
        },
    );
    policy.metadata = meta(name);
    policy
}

pub fn custom_role(name: &str) -> CustomRole {
    let mut role = CustomRole::new(
        name,
        CustomRoleSpec {
            role_name: "KeyRotator".to_string(),
            service_class: "kms".to_string(),
            display_name: "Key Rotator".to_string(),
            description: "Rotates root keys".to_string(),
            actions: strings(&["kms.secrets.rotate", "kms.secrets.read"]),
        },
    );
    role.metadata = meta(name);
    role
}

/// Request deletion the way the API server does
pub fn mark_deleted<K: IamKind>(resource: &mut K) {
    let timestamp = serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z"))
        .expect("valid timestamp");
    resource.meta_mut().deletion_timestamp = Some(timestamp);
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory [`ResourceStore`] that mimics the status subresource
pub struct MemoryStore<K> {
    objects: Mutex<HashMap<ObjectKey, K>>,
    removed: Mutex<Vec<K>>,
    status_writes: Mutex<Vec<(ResourceState, String)>>,
    metadata_writes: Mutex<usize>,
    fail_status: AtomicBool,
}

impl<K: IamKind> MemoryStore<K> {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(HashMap::new()),
            removed: Mutex::new(Vec::new()),
            status_writes: Mutex::new(Vec::new()),
            metadata_writes: Mutex::new(0),
            fail_status: AtomicBool::new(false),
        })
    }

    pub fn with(resource: K) -> Arc<Self> {
        let store = Self::empty();
        store.put(resource);
        store
    }

    /// Replace the stored object wholesale, as an out-of-band edit would
    pub fn put(&self, resource: K) {
        let key = ObjectKey::of(&resource).expect("fixture has a namespace");
        self.objects.lock().unwrap().insert(key, resource);
    }

    pub fn stored(&self, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&ObjectKey::new(NAMESPACE, name))
            .cloned()
    }

    /// Last state of an object whose finalizers were all removed during deletion
    pub fn removed(&self, name: &str) -> Option<K> {
        self.removed
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.meta().name.as_deref() == Some(name))
            .cloned()
    }

    /// Every persisted (state, message) pair in write order
    pub fn status_writes(&self) -> Vec<(ResourceState, String)> {
        self.status_writes.lock().unwrap().clone()
    }

    pub fn metadata_writes(&self) -> usize {
        *self.metadata_writes.lock().unwrap()
    }

    /// Make subsequent status writes fail
    pub fn fail_status_writes(&self) {
        self.fail_status.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl<K: IamKind> ResourceStore<K> for MemoryStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn update(&self, resource: &K) -> Result<K> {
        let key = ObjectKey::of(resource)?;
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get(&key)
            .ok_or_else(|| Error::internal(format!("{key} does not exist")))?;
        let mut updated = resource.clone();
        *updated.status_slot() = stored.status().cloned();
        *self.metadata_writes.lock().unwrap() += 1;

        let finalizers_empty = updated
            .meta()
            .finalizers
            .as_ref()
            .map_or(true, |f| f.is_empty());
        if updated.meta().deletion_timestamp.is_some() && finalizers_empty {
            objects.remove(&key);
            self.removed.lock().unwrap().push(updated.clone());
        } else {
            objects.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn update_status(&self, resource: &K) -> Result<K> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(Error::internal("status write rejected"));
        }
        let key = ObjectKey::of(resource)?;
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| Error::internal(format!("{key} does not exist")))?;
        *stored.status_slot() = resource.status().cloned();
        if let Some(status) = resource.status() {
            self.status_writes.lock().unwrap().push((
                status.state(),
                status.resource_status().message.clone(),
            ));
        }
        Ok(stored.clone())
    }
}
