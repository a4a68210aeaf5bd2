//! Task factories: decide what a group needs from its ordered candidates
//! and what the runtime currently holds.
//!
//! The decision is split in two. Handling of shadowed, withdrawn and
//! ineligible candidates is the same for every kind and lives in
//! [`plan_group`]. What the active candidate needs against the runtime is
//! kind specific and lives in a [`TaskFactory`].

use crate::backend::{ApplyBackend, Observation};
use crate::config::EngineConfig;
use crate::error::PlanningError;
use crate::resource::Resource;
use crate::task::{Task, TaskOp, TaskSequence};
use std::cmp::Ordering;
use tend_schema::{ActiveTags, ResourceKind, ResourceState};

pub trait TaskFactory: Send + Sync + std::fmt::Debug {
    /// The task the eligible, non-withdrawn active resource needs, if any.
    fn converge(
        &self,
        active: &Resource,
        observed: &Observation,
        config: &EngineConfig,
    ) -> Option<TaskOp>;
}

/// Artifacts compare versions and never downgrade.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactTaskFactory;

impl TaskFactory for ArtifactTaskFactory {
    fn converge(
        &self,
        active: &Resource,
        observed: &Observation,
        config: &EngineConfig,
    ) -> Option<TaskOp> {
        let Observation::Present {
            version, marker, ..
        } = observed
        else {
            return Some(TaskOp::Install);
        };

        let ordering = match (version, &active.version) {
            (Some(runtime), Some(ours)) => runtime.cmp(ours),
            // Without a runtime version only the content can tell.
            _ if marker.as_ref() == Some(&active.fingerprint) => Ordering::Equal,
            _ => Ordering::Less,
        };

        match ordering {
            Ordering::Less => Some(TaskOp::Update),
            Ordering::Equal
                if config.snapshot_forces_update
                    && active.version.as_ref().is_some_and(|v| v.is_snapshot())
                    && marker.as_ref() != Some(&active.fingerprint) =>
            {
                Some(TaskOp::Update)
            }
            // Equal content, or a newer runtime copy: never downgrade.
            _ => confirm(active),
        }
    }
}

/// Configs have no versions; the content marker decides.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigTaskFactory;

impl TaskFactory for ConfigTaskFactory {
    fn converge(
        &self,
        active: &Resource,
        observed: &Observation,
        _config: &EngineConfig,
    ) -> Option<TaskOp> {
        match observed {
            Observation::Absent => Some(TaskOp::Install),
            Observation::Present { marker, .. } if marker.as_ref() == Some(&active.fingerprint) => {
                confirm(active)
            }
            Observation::Present { .. } => Some(TaskOp::Update),
        }
    }
}

fn confirm(active: &Resource) -> Option<TaskOp> {
    (active.state() != ResourceState::Installed)
        .then_some(TaskOp::ChangeState(ResourceState::Installed))
}

/// The factory responsible for `kind`.
pub fn factory_for(kind: ResourceKind) -> &'static dyn TaskFactory {
    match kind {
        ResourceKind::Artifact => &ArtifactTaskFactory,
        ResourceKind::Config => &ConfigTaskFactory,
    }
}

/// Inputs shared by every planning call in a cycle.
#[derive(Debug)]
pub struct PlanContext<'a> {
    pub tags: &'a ActiveTags,
    pub config: &'a EngineConfig,
    pub sequence: &'a mut TaskSequence,
}

/// Observe the runtime for a group and plan its tasks.
///
/// # Errors
///
/// Returns [`PlanningError::Observe`] if the backend cannot report on the
/// entity.
pub async fn observe_and_plan(
    ordered: &[Resource],
    backend: &dyn ApplyBackend,
    ctx: &mut PlanContext<'_>,
) -> Result<Vec<Task>, PlanningError> {
    let Some(first) = ordered.first() else {
        return Ok(Vec::new());
    };
    let observed = backend
        .observe(&first.entity)
        .await
        .map_err(|source| PlanningError::Observe {
            entity: first.entity.clone(),
            source,
        })?;
    Ok(plan_group(ordered, &observed, ctx))
}

/// Plan the tasks for one group.
///
/// A shadowed candidate that this engine applied and whose instance the
/// runtime still holds is removed first, alone: the group is planned again
/// once the removal is done. Otherwise shadowed candidates are parked
/// (`IGNORED`, or `UNINSTALLED` when withdrawn) and the active candidate
/// gets whatever its factory decides.
pub fn plan_group(
    ordered: &[Resource],
    observed: &Observation,
    ctx: &mut PlanContext<'_>,
) -> Vec<Task> {
    let Some((active, shadowed)) = ordered.split_first() else {
        return Vec::new();
    };

    if let Some(stale) = shadowed
        .iter()
        .find(|r| r.is_applied() && observed.holds(r))
    {
        let target = if stale.is_withdrawn() {
            ResourceState::Uninstalled
        } else {
            ResourceState::Ignored
        };
        return vec![Task::new(
            stale,
            TaskOp::Remove { target },
            ctx.sequence.next(),
        )];
    }

    let mut tasks = Vec::new();
    for resource in shadowed {
        let target = if resource.is_withdrawn() {
            ResourceState::Uninstalled
        } else {
            ResourceState::Ignored
        };
        if resource.state() != target {
            tasks.push(Task::new(
                resource,
                TaskOp::ChangeState(target),
                ctx.sequence.next(),
            ));
        }
    }

    let op = if active.is_withdrawn() {
        Some(if observed.holds(active) {
            TaskOp::Remove {
                target: ResourceState::Uninstalled,
            }
        } else {
            TaskOp::ChangeState(ResourceState::Uninstalled)
        })
    } else if !active.tags.matches(ctx.tags) {
        if active.is_applied() && observed.holds(active) {
            Some(TaskOp::Remove {
                target: ResourceState::Ignored,
            })
        } else {
            (active.state() != ResourceState::Ignored)
                .then_some(TaskOp::ChangeState(ResourceState::Ignored))
        }
    } else {
        factory_for(active.kind).converge(active, observed, ctx.config)
    };

    if let Some(op) = op {
        tasks.push(Task::new(active, op, ctx.sequence.next()));
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::EntityGroup;
    use crate::resource::GroupKey;
    use tend_schema::{ConfigMap, ConfigValue, Fingerprint, ResourceSpec, Version};

    fn artifact(url: &str, version: &str, content: &str) -> ResourceSpec {
        ResourceSpec::artifact("tool", url, version, content.as_bytes().to_vec())
    }

    fn config(url: &str, port: i64) -> ResourceSpec {
        let mut map = ConfigMap::new();
        map.insert("port".to_string(), ConfigValue::Integer(port));
        ResourceSpec::config("db", url, map)
    }

    fn present(version: &str, marker: Option<Fingerprint>) -> Observation {
        Observation::Present {
            version: Some(Version::new(version)),
            owned: true,
            marker,
        }
    }

    fn plan(group: &mut EntityGroup, observed: &Observation, tags: &ActiveTags) -> Vec<TaskOp> {
        plan_with(group, observed, tags, &EngineConfig::default())
    }

    fn plan_with(
        group: &mut EntityGroup,
        observed: &Observation,
        tags: &ActiveTags,
        config: &EngineConfig,
    ) -> Vec<TaskOp> {
        let mut sequence = TaskSequence::default();
        let mut ctx = PlanContext {
            tags,
            config,
            sequence: &mut sequence,
        };
        plan_group(group.ordered(tags), observed, &mut ctx)
            .into_iter()
            .map(|t| t.op)
            .collect()
    }

    fn single(spec: ResourceSpec) -> EntityGroup {
        let res = spec.validate().unwrap();
        let mut group = EntityGroup::new(GroupKey::new(res.kind, res.entity.clone()));
        group.add_or_update(res, 0);
        group
    }

    #[test]
    fn artifact_decision_table() {
        let tags = ActiveTags::new();
        let mut group = single(artifact("a", "1.1", "bin"));

        assert_eq!(plan(&mut group, &Observation::Absent, &tags), [TaskOp::Install]);
        assert_eq!(plan(&mut group, &present("1.0", None), &tags), [TaskOp::Update]);
        assert_eq!(
            plan(&mut group, &present("1.1", None), &tags),
            [TaskOp::ChangeState(ResourceState::Installed)]
        );
        assert_eq!(
            plan(&mut group, &present("2.0", None), &tags),
            [TaskOp::ChangeState(ResourceState::Installed)]
        );

        group.set_state("a", ResourceState::Installed);
        assert!(plan(&mut group, &present("1.1", None), &tags).is_empty());
        // Drift: confirmed but gone from the runtime.
        assert_eq!(plan(&mut group, &Observation::Absent, &tags), [TaskOp::Install]);
    }

    #[test]
    fn changed_snapshot_is_reinstalled_when_policy_allows() {
        let tags = ActiveTags::new();
        let mut group = single(artifact("a", "1.0-SNAPSHOT", "new build"));
        let stale = present("1.0-SNAPSHOT", Some(Fingerprint::of_bytes(b"old build")));

        assert_eq!(plan(&mut group, &stale, &tags), [TaskOp::Update]);

        let config = EngineConfig {
            snapshot_forces_update: false,
            ..EngineConfig::default()
        };
        assert_eq!(
            plan_with(&mut group, &stale, &tags, &config),
            [TaskOp::ChangeState(ResourceState::Installed)]
        );

        let mut release = single(artifact("b", "1.0", "new build"));
        let stale = present("1.0", Some(Fingerprint::of_bytes(b"old build")));
        assert_eq!(
            plan(&mut release, &stale, &tags),
            [TaskOp::ChangeState(ResourceState::Installed)]
        );
    }

    #[test]
    fn config_decision_table() {
        let tags = ActiveTags::new();
        let mut group = single(config("a", 1));
        let fingerprint = group.get("a").unwrap().fingerprint.clone();

        assert_eq!(plan(&mut group, &Observation::Absent, &tags), [TaskOp::Install]);
        assert_eq!(
            plan(&mut group, &present("0", Some(Fingerprint::new("blake3:00"))), &tags),
            [TaskOp::Update]
        );
        assert_eq!(
            plan(&mut group, &present("0", Some(fingerprint)), &tags),
            [TaskOp::ChangeState(ResourceState::Installed)]
        );
    }

    #[test]
    fn withdrawn_active_is_removed_only_when_owned() {
        let tags = ActiveTags::new();
        let mut group = single(config("a", 1));
        let fingerprint = group.get("a").unwrap().fingerprint.clone();
        group.remove("a");

        assert_eq!(
            plan(&mut group, &present("0", Some(fingerprint.clone())), &tags),
            [TaskOp::Remove {
                target: ResourceState::Uninstalled
            }]
        );
        let foreign = Observation::Present {
            version: None,
            owned: false,
            marker: Some(fingerprint),
        };
        assert_eq!(
            plan(&mut group, &foreign, &tags),
            [TaskOp::ChangeState(ResourceState::Uninstalled)]
        );
    }

    #[test]
    fn applied_shadowed_resource_is_removed_alone() {
        let prod: ActiveTags = ["prod"].into_iter().collect();
        let mut group = single(config("p20", 20).with_priority(20).with_tags("prod"));
        group.add_or_update(config("p10", 10).with_priority(10).validate().unwrap(), 1);
        let fingerprint = group.get("p20").unwrap().fingerprint.clone();

        let runtime = present("0", Some(fingerprint));
        assert_eq!(
            plan(&mut group, &runtime, &prod),
            [
                TaskOp::ChangeState(ResourceState::Ignored),
                TaskOp::ChangeState(ResourceState::Installed)
            ]
        );

        group.get_mut("p20").unwrap().set_applied(true);
        group.set_state("p20", ResourceState::Installed);
        group.invalidate();
        assert_eq!(
            plan(&mut group, &runtime, &ActiveTags::new()),
            [TaskOp::Remove {
                target: ResourceState::Ignored
            }]
        );
    }

    #[test]
    fn ineligible_active_is_parked() {
        let mut group = single(config("a", 1).with_tags("prod"));
        assert_eq!(
            plan(&mut group, &Observation::Absent, &ActiveTags::new()),
            [TaskOp::ChangeState(ResourceState::Ignored)]
        );
        group.set_state("a", ResourceState::Ignored);
        assert!(plan(&mut group, &Observation::Absent, &ActiveTags::new()).is_empty());
    }
}
