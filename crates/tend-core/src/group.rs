//! Competing candidates for one entity.
//!
//! Candidates are ordered by:
//!
//! 1. eligibility (the tag expression matches the active tags),
//! 2. priority, highest first,
//! 3. tag weight, highest first,
//! 4. version, newest first (artifacts only),
//! 5. registration order.
//!
//! The first candidate is the active one; the rest are shadowed. The sorted
//! order is cached until the group is mutated or the active tags change.

use crate::resource::{GroupKey, Resource};
use std::cmp::Ordering;
use tend_schema::{ActiveTags, InstallableResource, ResourceKind, ResourceState};

/// What `add_or_update` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// A new url joined the group.
    Added,
    /// Same url, same fingerprint, same metadata: nothing to do.
    Unchanged,
    /// Same content, but ordering metadata (priority, tags, version) changed
    /// or a withdrawal was undone.
    Reordered,
    /// New content for a known url; state reset to `INSTALL`.
    Changed,
}

impl Merge {
    /// Whether the group must be planned again.
    pub fn needs_planning(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

#[derive(Debug)]
pub struct EntityGroup {
    key: GroupKey,
    resources: Vec<Resource>,
    sorted: bool,
}

impl EntityGroup {
    pub fn new(key: GroupKey) -> Self {
        Self {
            key,
            resources: Vec::new(),
            sorted: false,
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.url.as_str() == url)
    }

    /// Mutable access invalidates the cached order.
    pub(crate) fn get_mut(&mut self, url: &str) -> Option<&mut Resource> {
        self.sorted = false;
        self.resources.iter_mut().find(|r| r.url.as_str() == url)
    }

    /// Add a candidate, or update the one with the same url.
    ///
    /// Identical content is a no-op. New content resets the candidate to
    /// `INSTALL`; if it also moved to a different data uri, candidates that
    /// were derived from the old uri are re-pointed at the new one.
    pub fn add_or_update(&mut self, res: InstallableResource, sequence: u64) -> Merge {
        let Some(idx) = self.resources.iter().position(|r| r.url == res.url) else {
            self.resources.push(Resource::new(res, sequence));
            self.sorted = false;
            return Merge::Added;
        };

        let existing = &mut self.resources[idx];
        if existing.fingerprint == res.fingerprint {
            let mut merge = Merge::Unchanged;
            if existing.priority != res.priority
                || existing.tags != res.tags
                || existing.version != res.version
            {
                existing.priority = res.priority;
                existing.tags = res.tags;
                existing.version = res.version;
                merge = Merge::Reordered;
            }
            existing.alias_of = res.alias_of;
            if existing.is_withdrawn() {
                existing.revive();
                merge = Merge::Reordered;
            }
            if merge != Merge::Unchanged {
                self.sorted = false;
            }
            return merge;
        }

        let old_uri = existing.data_uri.clone();
        existing.replace(res);
        let new_uri = existing.data_uri.clone();
        if old_uri != new_uri {
            for other in &mut self.resources {
                if other.alias_of.as_deref() == Some(old_uri.as_str()) {
                    tracing::debug!(
                        "Re-pointing {} from {old_uri} to {new_uri}",
                        other.url
                    );
                    other.alias_of = Some(new_uri.clone());
                }
            }
        }
        self.sorted = false;
        Merge::Changed
    }

    /// Mark a candidate withdrawn. It stays in the group as `UNINSTALL`
    /// until its removal has been applied. Returns `false` for unknown urls.
    pub fn remove(&mut self, url: &str) -> bool {
        match self.get_mut(url) {
            Some(resource) => {
                resource.withdraw();
                true
            }
            None => false,
        }
    }

    /// Drop a candidate for good.
    pub(crate) fn purge(&mut self, url: &str) -> Option<Resource> {
        let idx = self.resources.iter().position(|r| r.url.as_str() == url)?;
        self.sorted = false;
        Some(self.resources.remove(idx))
    }

    pub(crate) fn set_state(&mut self, url: &str, state: ResourceState) {
        if let Some(resource) = self.get_mut(url) {
            resource.set_state(state);
        }
    }

    pub fn invalidate(&mut self) {
        self.sorted = false;
    }

    /// Candidates in activation order.
    pub fn ordered(&mut self, tags: &ActiveTags) -> &[Resource] {
        if !self.sorted {
            self.resources.sort_by(|a, b| compare(a, b, tags));
            self.sorted = true;
        }
        &self.resources
    }

    pub fn active(&mut self, tags: &ActiveTags) -> Option<&Resource> {
        self.ordered(tags).first()
    }
}

fn compare(a: &Resource, b: &Resource, tags: &ActiveTags) -> Ordering {
    let wa = a.tags.weight(tags);
    let wb = b.tags.weight(tags);

    wb.is_some()
        .cmp(&wa.is_some())
        .then(b.priority.cmp(&a.priority))
        .then(wb.unwrap_or(0).cmp(&wa.unwrap_or(0)))
        .then_with(|| match a.kind {
            ResourceKind::Artifact => b.version.cmp(&a.version),
            ResourceKind::Config => Ordering::Equal,
        })
        .then(a.sequence().cmp(&b.sequence()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tend_schema::{ConfigMap, ConfigValue, ResourceSpec};

    fn config(url: &str, port: i64) -> ResourceSpec {
        let mut map = ConfigMap::new();
        map.insert("port".to_string(), ConfigValue::Integer(port));
        ResourceSpec::config("db", url, map)
    }

    fn group(kind: ResourceKind) -> EntityGroup {
        EntityGroup::new(GroupKey::new(kind, "db"))
    }

    fn urls(group: &mut EntityGroup, tags: &ActiveTags) -> Vec<String> {
        group
            .ordered(tags)
            .iter()
            .map(|r| r.url.to_string())
            .collect()
    }

    #[test]
    fn higher_priority_wins_regardless_of_order() {
        let tags = ActiveTags::new();
        for order in [[5, 10], [10, 5]] {
            let mut g = group(ResourceKind::Config);
            for (seq, priority) in order.into_iter().enumerate() {
                let spec = config(&format!("p{priority}"), priority.into()).with_priority(priority);
                g.add_or_update(spec.validate().unwrap(), seq as u64);
            }
            assert_eq!(g.active(&tags).unwrap().url, "p10");
        }
    }

    #[test]
    fn priority_ties_break_on_tag_weight_then_insertion() {
        let tags: ActiveTags = ["prod", "eu"].into_iter().collect();
        let mut g = group(ResourceKind::Config);
        g.add_or_update(config("plain", 1).validate().unwrap(), 0);
        g.add_or_update(config("plain2", 2).validate().unwrap(), 1);
        g.add_or_update(config("prod", 3).with_tags("prod").validate().unwrap(), 2);
        g.add_or_update(
            config("prod-eu", 4).with_tags("prod.eu").validate().unwrap(),
            3,
        );
        assert_eq!(urls(&mut g, &tags), ["prod-eu", "prod", "plain", "plain2"]);
    }

    #[test]
    fn artifact_ties_break_on_version() {
        let tags = ActiveTags::new();
        let mut g = group(ResourceKind::Artifact);
        for (seq, version) in ["1.0", "1.10", "1.2"].into_iter().enumerate() {
            let spec = ResourceSpec::artifact("db", format!("v{version}"), version, version.as_bytes().to_vec());
            g.add_or_update(spec.validate().unwrap(), seq as u64);
        }
        assert_eq!(urls(&mut g, &tags), ["v1.10", "v1.2", "v1.0"]);
    }

    #[test]
    fn ineligible_candidates_sort_last() {
        let mut g = group(ResourceKind::Config);
        g.add_or_update(
            config("prod", 1).with_priority(20).with_tags("prod").validate().unwrap(),
            0,
        );
        g.add_or_update(config("base", 2).with_priority(10).validate().unwrap(), 1);

        let prod: ActiveTags = ["prod"].into_iter().collect();
        assert_eq!(urls(&mut g, &prod), ["prod", "base"]);

        g.invalidate();
        assert_eq!(urls(&mut g, &ActiveTags::new()), ["base", "prod"]);
    }

    #[test]
    fn re_registering_same_content_is_a_no_op() {
        let mut g = group(ResourceKind::Config);
        assert_eq!(g.add_or_update(config("a", 1).validate().unwrap(), 0), Merge::Added);
        g.set_state("a", ResourceState::Installed);
        assert_eq!(
            g.add_or_update(config("a", 1).validate().unwrap(), 1),
            Merge::Unchanged
        );
        assert_eq!(g.get("a").unwrap().state(), ResourceState::Installed);
        assert_eq!(g.get("a").unwrap().sequence(), 0);
    }

    #[test]
    fn changed_content_resets_state() {
        let mut g = group(ResourceKind::Config);
        g.add_or_update(config("a", 1).validate().unwrap(), 0);
        g.set_state("a", ResourceState::Installed);
        assert_eq!(
            g.add_or_update(config("a", 2).validate().unwrap(), 1),
            Merge::Changed
        );
        assert_eq!(g.get("a").unwrap().state(), ResourceState::Install);
    }

    #[test]
    fn priority_change_without_content_change_reorders() {
        let mut g = group(ResourceKind::Config);
        g.add_or_update(config("a", 1).with_priority(5).validate().unwrap(), 0);
        g.add_or_update(config("b", 2).with_priority(10).validate().unwrap(), 1);
        let tags = ActiveTags::new();
        assert_eq!(g.active(&tags).unwrap().url, "b");

        let merge = g.add_or_update(config("a", 1).with_priority(50).validate().unwrap(), 2);
        assert_eq!(merge, Merge::Reordered);
        assert_eq!(g.active(&tags).unwrap().url, "a");
    }

    #[test]
    fn version_change_without_content_change_reorders() {
        let tags = ActiveTags::new();
        let mut g = group(ResourceKind::Artifact);
        let artifact = |url: &str, version: &str, bytes: &[u8]| {
            ResourceSpec::artifact("db", url, version, bytes.to_vec())
                .validate()
                .unwrap()
        };
        g.add_or_update(artifact("a", "1.0", b"same"), 0);
        g.add_or_update(artifact("b", "1.5", b"other"), 1);
        assert_eq!(g.active(&tags).unwrap().url, "b");

        assert_eq!(g.add_or_update(artifact("a", "2.0", b"same"), 2), Merge::Reordered);
        let active = g.active(&tags).unwrap();
        assert_eq!(active.url, "a");
        assert_eq!(active.version.as_ref().unwrap().as_str(), "2.0");
    }

    #[test]
    fn new_data_uri_repairs_aliases() {
        let mut g = group(ResourceKind::Config);
        g.add_or_update(
            config("source", 1).with_data_uri("file:/a.cfg").validate().unwrap(),
            0,
        );
        g.add_or_update(
            config("derived", 1)
                .with_priority(1)
                .with_alias_of("file:/a.cfg")
                .validate()
                .unwrap(),
            1,
        );
        g.add_or_update(
            config("source", 2).with_data_uri("file:/b.cfg").validate().unwrap(),
            2,
        );
        assert_eq!(g.get("derived").unwrap().alias_of.as_deref(), Some("file:/b.cfg"));
    }

    #[test]
    fn remove_marks_uninstall_and_revive_restores() {
        let mut g = group(ResourceKind::Config);
        g.add_or_update(config("a", 1).validate().unwrap(), 0);
        assert!(g.remove("a"));
        assert!(!g.remove("missing"));

        let a = g.get("a").unwrap();
        assert_eq!(a.state(), ResourceState::Uninstall);
        assert!(a.is_withdrawn());
        assert_eq!(g.len(), 1);

        assert_eq!(
            g.add_or_update(config("a", 1).validate().unwrap(), 1),
            Merge::Reordered
        );
        assert_eq!(g.get("a").unwrap().state(), ResourceState::Install);

        assert!(g.purge("a").is_some());
        assert!(g.is_empty());
    }
}
