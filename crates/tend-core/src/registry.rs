//! All entity groups, plus the set of groups that need planning.

use crate::group::{EntityGroup, Merge};
use crate::resource::{GroupKey, Resource};
use crate::state::{InstallationState, ResourceSnapshot};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tend_schema::{ActiveTags, InstallableResource, ResourceKind, ResourceState, ResourceUrl};

/// Owned exclusively by the coordinator; providers never touch it directly.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    groups: BTreeMap<GroupKey, EntityGroup>,
    /// Which group each url lives in.
    index: HashMap<ResourceUrl, GroupKey>,
    dirty: BTreeSet<GroupKey>,
    tags: ActiveTags,
    next_sequence: u64,
    /// State changes made while merging intake, not yet reported.
    transitions: Vec<ResourceSnapshot>,
}

impl ResourceRegistry {
    pub fn new(tags: ActiveTags) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    pub fn tags(&self) -> &ActiveTags {
        &self.tags
    }

    /// Switch the active tags. Every group is re-sorted and re-planned.
    pub fn set_tags(&mut self, tags: ActiveTags) {
        if tags == self.tags {
            return;
        }
        self.tags = tags;
        for (key, group) in &mut self.groups {
            group.invalidate();
            self.dirty.insert(key.clone());
        }
    }

    pub fn add_or_update(&mut self, res: InstallableResource) -> Merge {
        let key = GroupKey::new(res.kind, res.entity.clone());

        // A url that moved to another entity is withdrawn from the old one.
        if let Some(previous) = self.index.get(&res.url) {
            if *previous != key {
                let previous = previous.clone();
                if let Some(group) = self.groups.get_mut(&previous) {
                    let before = group.get(&res.url).map(Resource::state);
                    group.remove(&res.url);
                    note_transition(&mut self.transitions, before, group.get(&res.url));
                }
                self.dirty.insert(previous);
            }
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.index.insert(res.url.clone(), key.clone());

        let url = res.url.clone();
        let group = self
            .groups
            .entry(key.clone())
            .or_insert_with(|| EntityGroup::new(key.clone()));
        let before = group.get(&url).map(Resource::state);
        let merge = group.add_or_update(res, sequence);
        note_transition(&mut self.transitions, before, group.get(&url));
        if merge.needs_planning() {
            self.dirty.insert(key);
        }
        merge
    }

    /// Withdraw a url. Unknown urls are ignored and return `false`.
    pub fn remove(&mut self, url: &ResourceUrl) -> bool {
        let Some(key) = self.index.get(url) else {
            return false;
        };
        let Some(group) = self.groups.get_mut(key) else {
            return false;
        };
        let before = group.get(url).map(Resource::state);
        let removed = group.remove(url);
        note_transition(&mut self.transitions, before, group.get(url));
        if removed {
            self.dirty.insert(key.clone());
        }
        removed
    }

    pub fn group_mut(&mut self, key: &GroupKey) -> Option<&mut EntityGroup> {
        self.groups.get_mut(key)
    }

    pub fn resource(&self, key: &GroupKey, url: &str) -> Option<&Resource> {
        self.groups.get(key)?.get(url)
    }

    pub fn find(&self, url: &str) -> Option<&Resource> {
        let key = self.index.get(url)?;
        self.resource(key, url)
    }

    /// Forget a resource entirely once it reached `UNINSTALLED`.
    pub(crate) fn purge(&mut self, key: &GroupKey, url: &str) -> Option<Resource> {
        let purged = self.groups.get_mut(key)?.purge(url)?;
        if self.index.get(url) == Some(key) {
            self.index.remove(url);
        }
        Some(purged)
    }

    /// Drop groups whose last resource has been purged.
    pub fn purge_empty(&mut self) -> usize {
        let before = self.groups.len();
        self.groups.retain(|_, group| !group.is_empty());
        before - self.groups.len()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn mark_dirty(&mut self, key: GroupKey) {
        if self.groups.contains_key(&key) {
            self.dirty.insert(key);
        }
    }

    /// Mark every group of one kind, e.g. after its backend appeared.
    pub fn mark_kind_dirty(&mut self, kind: ResourceKind) {
        let keys = self.groups.keys().filter(|k| k.kind == kind).cloned();
        self.dirty.extend(keys);
    }

    /// Drain the state changes made by `add_or_update` and `remove`.
    pub fn take_transitions(&mut self) -> Vec<ResourceSnapshot> {
        std::mem::take(&mut self.transitions)
    }

    pub fn take_dirty(&mut self) -> BTreeSet<GroupKey> {
        std::mem::take(&mut self.dirty)
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Active and shadowed resources of every group, in activation order.
    pub fn snapshot(&mut self) -> InstallationState {
        let mut state = InstallationState {
            tags: self.tags.clone(),
            pending: self.dirty.len(),
            ..InstallationState::default()
        };
        for group in self.groups.values_mut() {
            let mut ordered = group.ordered(&self.tags).iter();
            if let Some(active) = ordered.next() {
                state.active.push(active.snapshot());
            }
            state.shadowed.extend(ordered.map(Resource::snapshot));
        }
        state
    }
}

fn note_transition(
    transitions: &mut Vec<ResourceSnapshot>,
    before: Option<ResourceState>,
    after: Option<&Resource>,
) {
    if let (Some(before), Some(after)) = (before, after) {
        if before != after.state() {
            transitions.push(after.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tend_schema::{ConfigMap, ConfigValue, ResourceSpec};

    fn spec(entity: &str, url: &str) -> InstallableResource {
        ResourceSpec::config(entity, url, ConfigMap::new())
            .validate()
            .unwrap()
    }

    #[test]
    fn merges_mark_groups_dirty_once() {
        let mut registry = ResourceRegistry::default();
        assert_eq!(registry.add_or_update(spec("db", "a")), Merge::Added);
        assert_eq!(registry.add_or_update(spec("db", "b")), Merge::Added);
        assert_eq!(registry.take_dirty().len(), 1);

        assert_eq!(registry.add_or_update(spec("db", "a")), Merge::Unchanged);
        assert_eq!(registry.dirty_count(), 0);
    }

    #[test]
    fn unknown_url_removal_is_ignored() {
        let mut registry = ResourceRegistry::default();
        assert!(!registry.remove(&ResourceUrl::from("nope")));
        registry.add_or_update(spec("db", "a"));
        registry.take_dirty();
        assert!(registry.remove(&ResourceUrl::from("a")));
        assert_eq!(
            registry.find("a").unwrap().state(),
            ResourceState::Uninstall
        );
        assert_eq!(registry.dirty_count(), 1);
    }

    #[test]
    fn url_moving_entities_withdraws_the_old_entry() {
        let mut registry = ResourceRegistry::default();
        registry.add_or_update(spec("db", "a"));
        registry.add_or_update(spec("cache", "a"));

        let old = registry
            .resource(&GroupKey::new(ResourceKind::Config, "db"), "a")
            .unwrap();
        assert!(old.is_withdrawn());
        assert_eq!(registry.find("a").unwrap().entity, "cache");
    }

    #[test]
    fn merge_state_changes_are_recorded() {
        let mut registry = ResourceRegistry::default();
        registry.add_or_update(spec("db", "a"));
        assert!(registry.take_transitions().is_empty());

        registry
            .group_mut(&GroupKey::new(ResourceKind::Config, "db"))
            .unwrap()
            .set_state("a", ResourceState::Installed);
        let mut map = ConfigMap::new();
        map.insert("port".to_string(), ConfigValue::Integer(1));
        registry.add_or_update(ResourceSpec::config("db", "a", map).validate().unwrap());
        registry.remove(&ResourceUrl::from("a"));
        registry.remove(&ResourceUrl::from("a"));

        let states: Vec<_> = registry
            .take_transitions()
            .into_iter()
            .map(|s| s.state)
            .collect();
        assert_eq!(states, [ResourceState::Install, ResourceState::Uninstall]);
        assert!(registry.take_transitions().is_empty());
    }

    #[test]
    fn tag_change_dirties_every_group() {
        let mut registry = ResourceRegistry::default();
        registry.add_or_update(spec("db", "a"));
        registry.add_or_update(spec("cache", "b"));
        registry.take_dirty();

        registry.set_tags(ActiveTags::parse_list("prod"));
        assert_eq!(registry.dirty_count(), 2);
    }

    #[test]
    fn purged_groups_disappear() {
        let mut registry = ResourceRegistry::default();
        registry.add_or_update(spec("db", "a"));
        let key = GroupKey::new(ResourceKind::Config, "db");
        assert!(registry.purge(&key, "a").is_some());
        assert_eq!(registry.purge_empty(), 1);
        assert!(registry.is_empty());
        assert!(registry.find("a").is_none());
    }
}
