//! Finalizer token set
//!
//! Kubernetes stores finalizers as an optional list of strings. `FinalizerSet`
//! gives the reconciler set semantics over that list (no duplicates, stable
//! order) and writes the result back to object metadata.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Ordered set of finalizer tokens taken from object metadata
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FinalizerSet {
    tokens: Vec<String>,
}

impl FinalizerSet {
    /// Read the finalizers of an object
    pub fn from_meta(meta: &ObjectMeta) -> Self {
        let mut set = Self::default();
        for token in meta.finalizers.iter().flatten() {
            set.add(token);
        }
        set
    }

    /// Whether `token` is present
    pub fn has(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// Add `token`, returning false if it was already present
    pub fn add(&mut self, token: &str) -> bool {
        if self.has(token) {
            return false;
        }
        self.tokens.push(token.to_string());
        true
    }

    /// Remove `token`, returning false if it was absent
    pub fn remove(&mut self, token: &str) -> bool {
        let before = self.tokens.len();
        self.tokens.retain(|t| t != token);
        self.tokens.len() != before
    }

    /// The set without `token`
    pub fn without(mut self, token: &str) -> Self {
        self.remove(token);
        self
    }

    /// Number of tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the set holds no tokens
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Write the set back into object metadata
    ///
    /// An empty set clears the field so the API server sees no finalizers.
    pub fn apply_to(self, meta: &mut ObjectMeta) {
        meta.finalizers = if self.tokens.is_empty() {
            None
        } else {
            Some(self.tokens)
        };
    }
}
