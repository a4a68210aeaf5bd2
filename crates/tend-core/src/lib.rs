//! Reconciliation machinery for tend.
//!
//! Providers register desired resources through a [`CoordinatorHandle`];
//! a single [`Coordinator`] worker groups competing candidates per entity,
//! picks the active one, plans tasks per kind and applies them through the
//! registered [`ApplyBackend`]s until the runtime matches.

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod factory;
pub mod group;
pub mod listener;
pub mod registry;
pub mod resource;
pub mod signal;
pub mod state;
pub mod task;

pub use backend::{ApplyBackend, BackendRegistry, MemoryBackend, Observation};
pub use config::EngineConfig;
pub use coordinator::{Coordinator, CoordinatorHandle, CycleReport};
pub use error::{ApplyError, EngineError, PlanningError};
pub use group::{EntityGroup, Merge};
pub use listener::{InstallationEvent, InstallationListener, NullListener};
pub use registry::ResourceRegistry;
pub use resource::{GroupKey, Resource};
pub use signal::RetrySignal;
pub use state::{InstallationState, ResourceSnapshot};
pub use task::{Task, TaskOp};
