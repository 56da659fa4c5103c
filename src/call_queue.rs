//! Deferred calls flushed at the end of a tick phase.
//!
//! Collision-filter notifications are queued instead of issued while the phase is still
//! walking the simulators' ownership state.

use crate::entity::EntityHost;
use crate::physics::PhysicsEnvironment;

pub type DeferredCall = Box<dyn FnOnce(&mut dyn PhysicsEnvironment, &mut dyn EntityHost)>;

#[derive(Default)]
pub struct CallQueue {
    calls: Vec<DeferredCall>,
}

impl CallQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue<F>(&mut self, call: F)
    where
        F: FnOnce(&mut dyn PhysicsEnvironment, &mut dyn EntityHost) + 'static,
    {
        self.calls.push(Box::new(call));
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Run every queued call in order and return how many ran.
    pub fn flush(&mut self, physics: &mut dyn PhysicsEnvironment, host: &mut dyn EntityHost) -> usize {
        let calls = std::mem::take(&mut self.calls);
        let ran = calls.len();
        for call in calls {
            call(physics, host);
        }
        ran
    }
}

impl std::fmt::Debug for CallQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallQueue").field("pending", &self.calls.len()).finish()
    }
}
