//! Barrier records.
//!
//! [`ResourceBarrier`] is what a command list receives: every transition in it
//! has a concrete before state. A transition whose before state could not be
//! known while recording is kept as a [`PendingTransition`] until the context
//! is closed against the global tracker.

use std::sync::Arc;

use super::resource::{Resource, Subresource};
use super::state::ResourceStates;

/// A fully resolved usage transition.
#[derive(Debug, Clone)]
pub struct TransitionBarrier {
    /// The transitioned resource.
    pub resource: Arc<Resource>,
    /// Subresource(s) affected.
    pub subresource: Subresource,
    /// State the subresource(s) are in before the barrier.
    pub state_before: ResourceStates,
    /// State the subresource(s) are in after the barrier.
    pub state_after: ResourceStates,
}

impl PartialEq for TransitionBarrier {
    fn eq(&self, other: &Self) -> bool {
        self.resource.id() == other.resource.id()
            && self.subresource == other.subresource
            && self.state_before == other.state_before
            && self.state_after == other.state_after
    }
}

impl Eq for TransitionBarrier {}

/// A transition whose before state is unknown at record time.
#[derive(Debug, Clone)]
pub struct PendingTransition {
    /// The transitioned resource.
    pub resource: Arc<Resource>,
    /// Subresource(s) affected.
    pub subresource: Subresource,
    /// Requested state.
    pub state_after: ResourceStates,
}

impl PendingTransition {
    /// Resolve against a known before state.
    ///
    /// Returns `None` if no transition is needed.
    pub fn resolve(
        &self,
        subresource: Subresource,
        state_before: ResourceStates,
    ) -> Option<TransitionBarrier> {
        (state_before != self.state_after).then(|| TransitionBarrier {
            resource: Arc::clone(&self.resource),
            subresource,
            state_before,
            state_after: self.state_after,
        })
    }
}

/// A barrier as submitted to a command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceBarrier {
    /// Usage state transition.
    Transition(TransitionBarrier),
    /// Switch between two resources sharing the same memory.
    /// `None` on either side means "any placed resource".
    Aliasing {
        before: Option<Arc<Resource>>,
        after: Option<Arc<Resource>>,
    },
    /// Order unordered-access writes. `None` means all UAV accesses.
    Uav { resource: Option<Arc<Resource>> },
}

impl ResourceBarrier {
    /// Create a transition barrier.
    pub fn transition(
        resource: Arc<Resource>,
        subresource: Subresource,
        state_before: ResourceStates,
        state_after: ResourceStates,
    ) -> Self {
        Self::Transition(TransitionBarrier {
            resource,
            subresource,
            state_before,
            state_after,
        })
    }

    /// Get the transition record, if this is a transition barrier.
    pub fn as_transition(&self) -> Option<&TransitionBarrier> {
        match self {
            Self::Transition(transition) => Some(transition),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceDescriptor;

    #[test]
    fn test_pending_resolve_skips_same_state() {
        let resource = Arc::new(Resource::dummy(ResourceDescriptor::buffer(16)));
        let pending = PendingTransition {
            resource,
            subresource: Subresource::All,
            state_after: ResourceStates::COPY_DEST,
        };

        assert!(
            pending
                .resolve(Subresource::All, ResourceStates::COPY_DEST)
                .is_none()
        );

        let barrier = pending
            .resolve(Subresource::All, ResourceStates::COMMON)
            .unwrap();
        assert_eq!(barrier.state_before, ResourceStates::COMMON);
        assert_eq!(barrier.state_after, ResourceStates::COPY_DEST);
    }

    #[test]
    fn test_barrier_equality_uses_identity() {
        let a = Arc::new(Resource::dummy(ResourceDescriptor::buffer(16)));
        let b = Arc::new(Resource::dummy(ResourceDescriptor::buffer(16)));
        let lhs = ResourceBarrier::transition(
            Arc::clone(&a),
            Subresource::All,
            ResourceStates::COMMON,
            ResourceStates::COPY_DEST,
        );
        let same = ResourceBarrier::transition(
            a,
            Subresource::All,
            ResourceStates::COMMON,
            ResourceStates::COPY_DEST,
        );
        let other = ResourceBarrier::transition(
            b,
            Subresource::All,
            ResourceStates::COMMON,
            ResourceStates::COPY_DEST,
        );
        assert_eq!(lhs, same);
        assert_ne!(lhs, other);
    }
}
