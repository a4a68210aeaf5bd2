//! Listener trait for observing the coordinator
//!
//! Listeners are the control-plane channel for convergence: every state
//! transition the coordinator makes is reported here. Callbacks run on the
//! worker and must return quickly.

use crate::state::ResourceSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallationEvent {
    /// A cycle is about to execute tasks.
    Started,
    /// A resource changed state.
    Processed(ResourceSnapshot),
    /// The worker has nothing left to do and is going idle.
    Suspended,
}

pub trait InstallationListener: Send + Sync {
    fn on_event(&self, event: &InstallationEvent);
}

impl<T: InstallationListener + ?Sized> InstallationListener for std::sync::Arc<T> {
    fn on_event(&self, event: &InstallationEvent) {
        (**self).on_event(event);
    }
}

/// A no-op listener for silent operation.
#[derive(Debug, Clone, Copy)]
pub struct NullListener;

impl InstallationListener for NullListener {
    fn on_event(&self, _: &InstallationEvent) {}
}
