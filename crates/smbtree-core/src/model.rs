//! In-memory network model.
//!
//! Items live in an arena keyed by [`ItemKey`]; the hierarchy is a
//! separate parent → children index whose lists are kept sorted by
//! case-insensitive name. Only the reconciler writes to the model.
//! Readers either hold a read guard briefly or take a snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;

use crate::types::{FileItem, Host, ItemKey, NetworkItem, Share, Workgroup};

#[derive(Debug, Clone)]
pub struct NetworkModel {
    items: HashMap<ItemKey, NetworkItem>,
    children: HashMap<ItemKey, Vec<ItemKey>>,
}

impl Default for NetworkModel {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkModel {
    pub fn new() -> Self {
        let mut children = HashMap::new();
        children.insert(ItemKey::Network, Vec::new());
        Self {
            items: HashMap::new(),
            children,
        }
    }

    /// Number of items, not counting the network root.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        *key == ItemKey::Network || self.items.contains_key(key)
    }

    pub fn get(&self, key: &ItemKey) -> Option<&NetworkItem> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: &ItemKey) -> Option<&mut NetworkItem> {
        self.items.get_mut(key)
    }

    /// Keys of the direct children of `parent`, in sibling order.
    pub fn child_keys(&self, parent: &ItemKey) -> &[ItemKey] {
        self.children.get(parent).map_or(&[], Vec::as_slice)
    }

    pub fn children<'a>(&'a self, parent: &ItemKey) -> impl Iterator<Item = &'a NetworkItem> + 'a {
        self.child_keys(parent)
            .iter()
            .filter_map(|key| self.items.get(key))
    }

    /// Insert or replace an item under its parent.
    ///
    /// Returns `false` and leaves the model untouched when the parent is not
    /// in the model.
    pub fn insert(&mut self, item: NetworkItem) -> bool {
        let key = item.key();
        let Some(parent) = key.parent() else {
            return false;
        };
        if !self.contains(&parent) {
            return false;
        }

        if self.items.insert(key.clone(), item).is_none() {
            self.children.entry(parent).or_default().push(key);
        }
        true
    }

    /// Remove an item and everything below it. Returns how many items went.
    pub fn remove(&mut self, key: &ItemKey) -> usize {
        if *key == ItemKey::Network || !self.items.contains_key(key) {
            return 0;
        }

        if let Some(parent) = key.parent() {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|k| k != key);
            }
        }
        self.remove_subtree(key)
    }

    fn remove_subtree(&mut self, key: &ItemKey) -> usize {
        let mut removed = 0;
        for child in self.children.remove(key).unwrap_or_default() {
            removed += self.remove_subtree(&child);
        }
        if self.items.remove(key).is_some() {
            removed += 1;
        }
        removed
    }

    /// Remove every child of `parent`, keeping `parent` itself.
    pub fn clear_children(&mut self, parent: &ItemKey) -> usize {
        let keys = self.child_keys(parent).to_vec();
        keys.iter().map(|key| self.remove(key)).sum()
    }

    /// Stable full resort of `parent`'s children by case-insensitive name.
    pub fn sort_children(&mut self, parent: &ItemKey) {
        let Some(mut keys) = self.children.remove(parent) else {
            return;
        };
        keys.sort_by_cached_key(|key| {
            self.items
                .get(key)
                .map(NetworkItem::sort_key)
                .unwrap_or_default()
        });
        self.children.insert(parent.clone(), keys);
    }

    // ── Typed queries ─────────────────────────────────────────────

    pub fn workgroups(&self) -> Vec<&Workgroup> {
        self.children(&ItemKey::Network)
            .filter_map(|item| match item {
                NetworkItem::Workgroup(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    pub fn hosts(&self, workgroup: &str) -> Vec<&Host> {
        self.children(&ItemKey::workgroup(workgroup))
            .filter_map(|item| match item {
                NetworkItem::Host(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    pub fn shares(&self, workgroup: &str, host: &str) -> Vec<&Share> {
        self.children(&ItemKey::host(workgroup, host))
            .filter_map(|item| match item {
                NetworkItem::Share(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn files(&self, parent: &ItemKey) -> Vec<&FileItem> {
        self.children(parent)
            .filter_map(|item| match item {
                NetworkItem::File(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    pub fn all_hosts(&self) -> Vec<&Host> {
        self.workgroups()
            .into_iter()
            .flat_map(|w| self.hosts(&w.name))
            .collect()
    }

    pub fn all_shares(&self) -> Vec<&Share> {
        self.all_hosts()
            .into_iter()
            .flat_map(|h| self.shares(&h.workgroup, &h.name))
            .collect()
    }

    pub fn find_workgroup(&self, name: &str) -> Option<&Workgroup> {
        match self.items.get(&ItemKey::workgroup(name)) {
            Some(NetworkItem::Workgroup(w)) => Some(w),
            _ => None,
        }
    }

    pub fn find_host(&self, workgroup: &str, name: &str) -> Option<&Host> {
        match self.items.get(&ItemKey::host(workgroup, name)) {
            Some(NetworkItem::Host(h)) => Some(h),
            _ => None,
        }
    }

    pub fn find_share(&self, workgroup: &str, host: &str, name: &str) -> Option<&Share> {
        match self.items.get(&ItemKey::share(workgroup, host, name)) {
            Some(NetworkItem::Share(s)) => Some(s),
            _ => None,
        }
    }

    /// Nested view of the subtree below `root`, for rendering and export.
    pub fn tree(&self, root: &ItemKey) -> Vec<TreeNode> {
        self.children(root)
            .map(|item| TreeNode {
                item: item.clone(),
                children: self.tree(&item.key()),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub item: NetworkItem,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

/// Shared handle to the model. Clone is cheap (inner Arc).
#[derive(Debug, Clone, Default)]
pub struct SharedModel {
    inner: Arc<RwLock<NetworkModel>>,
}

impl SharedModel {
    pub fn new(model: NetworkModel) -> Self {
        Self {
            inner: Arc::new(RwLock::new(model)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, NetworkModel> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, NetworkModel> {
        self.inner.write()
    }

    /// Copy of the current state, safe to hold across awaits.
    pub fn snapshot(&self) -> NetworkModel {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ShareType;

    fn seeded() -> NetworkModel {
        let mut model = NetworkModel::new();
        assert!(model.insert(NetworkItem::Workgroup(Workgroup::new("WG1"))));
        assert!(model.insert(NetworkItem::Host(Host::new("WG1", "SRV1"))));
        assert!(model.insert(NetworkItem::Share(Share::new("WG1", "SRV1", "DATA"))));
        let mut printer = Share::new("WG1", "SRV1", "PRINT");
        printer.share_type = ShareType::Printer;
        assert!(model.insert(NetworkItem::Share(printer)));
        model
    }

    #[test]
    fn insert_requires_parent() {
        let mut model = NetworkModel::new();
        assert!(!model.insert(NetworkItem::Host(Host::new("WG1", "SRV1"))));
        assert!(model.is_empty());
    }

    #[test]
    fn insert_replaces_without_duplicating_sibling() {
        let mut model = seeded();
        let mut host = Host::new("wg1", "srv1");
        host.comment = Some("file server".into());
        assert!(model.insert(NetworkItem::Host(host)));
        assert_eq!(model.hosts("WG1").len(), 1);
        assert_eq!(
            model.find_host("WG1", "SRV1").unwrap().comment.as_deref(),
            Some("file server")
        );
    }

    #[test]
    fn removing_workgroup_cascades() {
        let mut model = seeded();
        let removed = model.remove(&ItemKey::workgroup("wg1"));
        assert_eq!(removed, 4);
        assert!(model.is_empty());
        assert!(model.workgroups().is_empty());
    }

    #[test]
    fn removing_host_removes_its_shares_only() {
        let mut model = seeded();
        model.insert(NetworkItem::Host(Host::new("WG1", "SRV2")));
        assert_eq!(model.remove(&ItemKey::host("WG1", "SRV1")), 3);
        assert_eq!(model.hosts("WG1").len(), 1);
        assert!(model.find_share("WG1", "SRV1", "DATA").is_none());
    }

    #[test]
    fn sort_children_is_case_insensitive() {
        let mut model = NetworkModel::new();
        for name in ["delta", "Alpha", "charlie", "BRAVO"] {
            model.insert(NetworkItem::Workgroup(Workgroup::new(name)));
        }
        model.sort_children(&ItemKey::Network);
        let names: Vec<_> = model.workgroups().iter().map(|w| w.name.clone()).collect();
        assert_eq!(names, vec!["Alpha", "BRAVO", "charlie", "delta"]);
    }

    #[test]
    fn snapshot_is_detached() {
        let shared = SharedModel::new(seeded());
        let snapshot = shared.snapshot();
        shared.write().remove(&ItemKey::workgroup("WG1"));
        assert_eq!(snapshot.all_shares().len(), 2);
        assert!(shared.read().is_empty());
    }

    #[test]
    fn tree_nests_children() {
        let model = seeded();
        let tree = model.tree(&ItemKey::Network);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].children.len(), 2);
    }
}
