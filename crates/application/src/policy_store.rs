//! Versioned in-memory snapshot of the known access policies.
//!
//! Writers replace the whole snapshot; readers always see one complete
//! version, ordered by priority descending, then policy name ascending.

use std::sync::{PoisonError, RwLock};

use jitgate_domain::{AccessPolicy, AccessRequest, ClusterObject, ResourceScope, SubjectPolicy};

use crate::policy_resolver;

/// One rule set from a policy object, flattened for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    /// Name of the owning policy object.
    pub policy_name: String,
    /// Scope of the owning policy object.
    pub scope: ResourceScope,
    /// Position inside the owning policy object.
    pub index: usize,
    /// The rule set.
    pub policy: SubjectPolicy,
}

/// Immutable view of the policy set at one version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicySnapshot {
    version: u64,
    entries: Vec<PolicyEntry>,
}

impl PolicySnapshot {
    /// Returns the snapshot version; zero before the first update.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns every entry in resolution order.
    #[must_use]
    pub fn entries(&self) -> &[PolicyEntry] {
        self.entries.as_slice()
    }

    /// Returns the entries that govern requests in the given scope.
    ///
    /// Cluster requests see cluster policies; namespaced requests see the
    /// policies of their own namespace.
    pub fn applicable_to<'a>(
        &'a self,
        scope: &'a ResourceScope,
    ) -> impl Iterator<Item = &'a PolicyEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| &entry.scope == scope)
    }
}

/// Thread-safe holder of the current policy snapshot.
#[derive(Debug, Default)]
pub struct PolicyStore {
    snapshot: RwLock<PolicySnapshot>,
}

impl PolicyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the visible policy set and returns the new version.
    pub fn update(&self, policies: Vec<AccessPolicy>) -> u64 {
        let mut entries: Vec<PolicyEntry> = policies
            .into_iter()
            .flat_map(|policy| {
                let policy_name = policy.meta.name.clone();
                let scope = policy.scope();
                policy
                    .policies
                    .into_iter()
                    .enumerate()
                    .map(move |(index, subject_policy)| PolicyEntry {
                        policy_name: policy_name.clone(),
                        scope: scope.clone(),
                        index,
                        policy: subject_policy,
                    })
            })
            .collect();
        entries.sort_by(|left, right| {
            right
                .policy
                .priority
                .cmp(&left.policy.priority)
                .then_with(|| left.policy_name.cmp(&right.policy_name))
                .then_with(|| left.scope.namespace().cmp(&right.scope.namespace()))
                .then_with(|| left.index.cmp(&right.index))
        });

        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let version = snapshot.version.saturating_add(1);
        *snapshot = PolicySnapshot { version, entries };
        version
    }

    /// Returns a copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> PolicySnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolves the request against the policies applicable to its scope.
    ///
    /// Only the matched entry is copied out of the current snapshot.
    #[must_use]
    pub fn resolve(&self, request: &AccessRequest) -> Option<PolicyEntry> {
        let scope = request.scope();
        let snapshot = self
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        policy_resolver::resolve(request, snapshot.applicable_to(&scope)).cloned()
    }
}
