//! Group tree replication.
//!
//! Source groups arrive as a flat list keyed by `parent_id`. The tree is
//! rebuilt on the target parent-first with an explicit worklist, so a group
//! is only touched once its parent has a mapping entry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::TargetApi;
use crate::config::MigrationConfig;
use crate::mapping::{GroupMapping, MappedGroup, ROOT_KEY};
use crate::types::{CreateGroup, GroupRef, ReplicationSummary, SourceGroup, TargetGroup};

/// Decides which source groups are personal namespaces.
pub trait NamespaceFilter: Send + Sync {
    fn is_personal(&self, group: &SourceGroup) -> bool;
}

/// Treats no group as personal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPersonalNamespaces;

impl NamespaceFilter for NoPersonalNamespaces {
    fn is_personal(&self, _group: &SourceGroup) -> bool {
        false
    }
}

/// Treats groups at or below any of the given full paths as personal.
#[derive(Debug, Clone, Default)]
pub struct ExcludedPaths {
    prefixes: Vec<String>,
}

impl ExcludedPaths {
    pub fn new(prefixes: Vec<String>) -> Self {
        let prefixes = prefixes
            .into_iter()
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }
}

impl NamespaceFilter for ExcludedPaths {
    fn is_personal(&self, group: &SourceGroup) -> bool {
        self.prefixes.iter().any(|prefix| {
            group
                .full_path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

/// How source paths relate to the target root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootLayout {
    source_root: String,
    target_root: String,
}

impl RootLayout {
    pub fn new(source_root: &str, target_root: &str) -> Self {
        Self {
            source_root: source_root.trim_matches('/').to_string(),
            target_root: target_root.trim_matches('/').to_string(),
        }
    }

    pub fn target_root(&self) -> &str {
        &self.target_root
    }

    /// Path of a source group with the `<source_root>/` prefix removed.
    pub fn relative_path<'a>(&self, full_path: &'a str) -> &'a str {
        full_path
            .strip_prefix(self.source_root.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(full_path)
    }

    /// Whether the group stands for the target root itself.
    pub fn is_root_alias(&self, group: &SourceGroup) -> bool {
        group.full_path == self.source_root
            || self.relative_path(&group.full_path) == self.target_root
    }
}

/// Source groups indexed by parent id.
struct TreeIndex<'a> {
    children: HashMap<u64, Vec<&'a SourceGroup>>,
}

impl<'a> TreeIndex<'a> {
    fn new(groups: &'a [SourceGroup]) -> Self {
        let mut children: HashMap<u64, Vec<&SourceGroup>> = HashMap::new();
        for group in groups {
            children.entry(group.parent_id).or_default().push(group);
        }
        Self { children }
    }

    fn children(&self, parent_id: u64) -> &[&'a SourceGroup] {
        self.children
            .get(&parent_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// How a target group was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Created,
    Reused,
}

/// Rebuilds the source group tree under the target root.
pub struct GroupTreeReplicator {
    target: Arc<dyn TargetApi>,
    layout: RootLayout,
    filter: Box<dyn NamespaceFilter>,
}

impl GroupTreeReplicator {
    /// Create a replicator writing to `target`.
    pub fn new(target: Arc<dyn TargetApi>, config: &MigrationConfig) -> Self {
        Self {
            target,
            layout: config.root_layout(),
            filter: config.namespace_filter(),
        }
    }

    /// Replace the personal-namespace classification.
    pub fn with_filter(mut self, filter: Box<dyn NamespaceFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn layout(&self) -> &RootLayout {
        &self.layout
    }

    pub fn filter(&self) -> &dyn NamespaceFilter {
        self.filter.as_ref()
    }

    /// Create or reuse a target group for every reachable source group.
    ///
    /// `mapping` must already hold the root entry. Failures never abort the
    /// walk: an unresolvable group is recorded and its subtree is pruned.
    pub async fn replicate(
        &self,
        groups: &[SourceGroup],
        mapping: &mut GroupMapping,
    ) -> ReplicationSummary {
        let index = TreeIndex::new(groups);
        let mut summary = ReplicationSummary::default();
        let mut worklist = vec![ROOT_KEY];
        let mut expanded = HashSet::new();

        while let Some(parent_id) = worklist.pop() {
            if !expanded.insert(parent_id) {
                continue;
            }

            for group in index.children(parent_id) {
                if let Some(next) = self.replicate_group(group, mapping, &mut summary).await {
                    worklist.push(next);
                }
            }
        }

        for group in groups.iter().filter(|g| !expanded.contains(&g.parent_id)) {
            warn!(
                group = %group.full_path,
                parent_id = group.parent_id,
                "Parent group not replicated, skipping"
            );
            summary.skipped_orphaned += 1;
        }

        info!(
            created = summary.created,
            reused = summary.reused,
            aliased = summary.aliased,
            unresolved = summary.unresolved.len(),
            "Group tree replicated"
        );
        summary
    }

    /// Handle one group. Returns its id if its children should be visited.
    async fn replicate_group(
        &self,
        group: &SourceGroup,
        mapping: &mut GroupMapping,
        summary: &mut ReplicationSummary,
    ) -> Option<u64> {
        if self.filter.is_personal(group) {
            info!(group = %group.full_path, "Skipping personal namespace");
            summary.skipped_personal += 1;
            return None;
        }

        if mapping.contains(group.id) {
            debug!(group = %group.full_path, "Group already mapped");
            return Some(group.id);
        }

        let Some(parent) = mapping.get(group.parent_id).cloned() else {
            warn!(
                group = %group.full_path,
                parent_id = group.parent_id,
                "Parent group not found, skipping"
            );
            summary.skipped_orphaned += 1;
            return None;
        };

        if self.layout.is_root_alias(group) {
            let root = mapping.root().clone();
            info!(
                group = %group.full_path,
                target = %root.target_full_path,
                "Merging group into target root"
            );
            mapping.insert(group.id, root);
            summary.aliased += 1;
            return Some(group.id);
        }

        match self.create_or_reuse(group, &parent).await {
            Some((target, resolution)) => {
                info!(
                    group = %group.full_path,
                    target = %target.full_path,
                    target_id = target.id,
                    parent_id = parent.target_id,
                    ?resolution,
                    "Group replicated"
                );
                match resolution {
                    Resolution::Created => summary.created += 1,
                    Resolution::Reused => summary.reused += 1,
                }
                mapping.insert(group.id, MappedGroup::from(&target));
                Some(group.id)
            }
            None => {
                summary.unresolved.push(group.full_path.clone());
                None
            }
        }
    }

    async fn create_or_reuse(
        &self,
        group: &SourceGroup,
        parent: &MappedGroup,
    ) -> Option<(TargetGroup, Resolution)> {
        let request = CreateGroup::mirror(group, parent.target_id);
        match self.target.create_group(&request).await {
            Ok(created) => return Some((created, Resolution::Created)),
            Err(e) if e.is_conflict() => {
                debug!(group = %group.full_path, "Group exists on target, reusing");
            }
            Err(e) => {
                warn!(group = %group.full_path, error = %e, "Failed to create group");
            }
        }

        let expected = format!("{}/{}", parent.target_full_path, group.path);
        match self.target.get_group(&GroupRef::Path(expected.clone())).await {
            Ok(Some(existing)) => Some((existing, Resolution::Reused)),
            Ok(None) => {
                warn!(group = %group.full_path, expected = %expected, "Failed to get group");
                None
            }
            Err(e) => {
                warn!(group = %group.full_path, expected = %expected, error = %e, "Failed to get group");
                None
            }
        }
    }
}

/// What replication would do with one source group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Merged into the target root.
    MergeIntoRoot,
    /// Created (or reused) at the given target path.
    Create { target_path: String },
    /// Skipped as a personal namespace.
    SkipPersonal,
    /// Never reached because its parent is not replicated.
    SkipOrphaned,
}

/// One line of a replication plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedGroup {
    pub source_path: String,
    pub action: PlannedAction,
}

/// Compute the replication outcome without touching the target.
///
/// Groups are returned parent-first; unreachable groups come last.
pub fn plan_tree(
    groups: &[SourceGroup],
    layout: &RootLayout,
    filter: &dyn NamespaceFilter,
) -> Vec<PlannedGroup> {
    let index = TreeIndex::new(groups);
    let mut targets: HashMap<u64, String> = HashMap::new();
    targets.insert(ROOT_KEY, layout.target_root().to_string());

    let mut plan = Vec::with_capacity(groups.len());
    let mut worklist = vec![ROOT_KEY];
    let mut expanded = HashSet::new();

    while let Some(parent_id) = worklist.pop() {
        if !expanded.insert(parent_id) {
            continue;
        }
        let Some(parent_path) = targets.get(&parent_id).cloned() else {
            continue;
        };

        for group in index.children(parent_id) {
            if targets.contains_key(&group.id) {
                continue;
            }
            let action = if filter.is_personal(group) {
                PlannedAction::SkipPersonal
            } else if layout.is_root_alias(group) {
                targets.insert(group.id, layout.target_root().to_string());
                worklist.push(group.id);
                PlannedAction::MergeIntoRoot
            } else {
                let target_path = format!("{parent_path}/{}", group.path);
                targets.insert(group.id, target_path.clone());
                worklist.push(group.id);
                PlannedAction::Create { target_path }
            };
            plan.push(PlannedGroup {
                source_path: group.full_path.clone(),
                action,
            });
        }
    }

    for group in groups.iter().filter(|g| !expanded.contains(&g.parent_id)) {
        plan.push(PlannedGroup {
            source_path: group.full_path.clone(),
            action: PlannedAction::SkipOrphaned,
        });
    }

    plan
}
