//! Barrier staging and close-time resolution for a command context.
//!
//! Transitions are collected here between GPU operations and submitted to the
//! primary command list as one batched call. A transition of a (sub)resource
//! the local tracker has never seen cannot be resolved while recording, so it
//! is kept as a [`PendingTransition`] and resolved against the global tracker
//! when the context is closed.

use std::sync::Arc;

use crate::backend::GpuCommandList;
use crate::error::GraphicsError;
use crate::tracker::ResourceStateTracker;
use crate::types::{PendingTransition, Resource, ResourceBarrier, ResourceStates, Subresource};

/// Staged barriers and unresolved transitions of one context.
#[derive(Debug, Default)]
pub struct BarrierQueue {
    /// Resolved barriers waiting for the next flush.
    staged: Vec<ResourceBarrier>,
    /// Transitions whose before state is only known to the global tracker.
    pending: Vec<PendingTransition>,
}

impl BarrierQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a transition of `resource` to `state_after` and record the new
    /// state in `local`.
    ///
    /// # Panics
    ///
    /// Panics if `subresource` is out of range or `state_after` is not a
    /// valid state combination.
    pub fn transition(
        &mut self,
        local: &mut ResourceStateTracker,
        resource: &Arc<Resource>,
        subresource: Subresource,
        state_after: ResourceStates,
    ) {
        resource.validate_subresource(subresource);
        assert!(
            state_after.is_valid(),
            "invalid state combination {state_after:?} for resource {:?}",
            resource.label().unwrap_or("<unnamed>")
        );

        match (local.find(resource), subresource) {
            (None, _) => self.defer(resource, subresource, state_after),
            (Some(known), Subresource::Index(index)) => {
                match known.subresource_state(index) {
                    Some(before) => self.stage(resource, subresource, before, state_after),
                    None => self.defer(resource, subresource, state_after),
                }
            }
            (Some(known), Subresource::All) => match known.uniform_state() {
                Some(before) if !known.has_overrides() => {
                    self.stage(resource, Subresource::All, before, state_after)
                }
                _ => {
                    // Subresources diverge or are partially unknown; transition
                    // each one from its own state.
                    let befores: Vec<Option<ResourceStates>> = (0..resource
                        .subresource_count())
                        .map(|index| known.subresource_state(index))
                        .collect();
                    for (index, before) in befores.into_iter().enumerate() {
                        let index = Subresource::Index(index as u32);
                        match before {
                            Some(before) => self.stage(resource, index, before, state_after),
                            None => self.defer(resource, index, state_after),
                        }
                    }
                }
            },
        }

        local.set_resource_state(resource, subresource, state_after);
    }

    /// Stage a barrier that needs no state resolution.
    pub fn push(&mut self, barrier: ResourceBarrier) {
        log::trace!("Staging {barrier:?}");
        self.staged.push(barrier);
    }

    fn stage(
        &mut self,
        resource: &Arc<Resource>,
        subresource: Subresource,
        before: ResourceStates,
        after: ResourceStates,
    ) {
        if before == after {
            return;
        }
        self.staged.push(ResourceBarrier::transition(
            Arc::clone(resource),
            subresource,
            before,
            after,
        ));
    }

    fn defer(
        &mut self,
        resource: &Arc<Resource>,
        subresource: Subresource,
        state_after: ResourceStates,
    ) {
        log::trace!(
            "Deferring transition of {:?} {:?} to {:?}",
            resource.id(),
            subresource,
            state_after
        );
        self.pending.push(PendingTransition {
            resource: Arc::clone(resource),
            subresource,
            state_after,
        });
    }

    /// Submit every staged barrier to `list` as one batched call.
    ///
    /// Returns the number of submitted barriers. Nothing is recorded if the
    /// queue is empty.
    pub fn flush<L: GpuCommandList>(&mut self, list: &mut L) -> Result<usize, GraphicsError> {
        if self.staged.is_empty() {
            return Ok(0);
        }
        let barriers = std::mem::take(&mut self.staged);
        log::trace!("Flushing {} barrier(s)", barriers.len());
        list.resource_barrier(&barriers)?;
        Ok(barriers.len())
    }

    /// Resolve every pending transition against `global`.
    ///
    /// Resources or subresources `global` knows nothing about are assumed to
    /// be in [`ResourceStates::INITIAL`]. Transitions that turn out to be
    /// no-ops are dropped. The pending transitions are kept until
    /// [`clear_pending`](Self::clear_pending).
    pub fn resolve_pending(&self, global: &ResourceStateTracker) -> Vec<ResourceBarrier> {
        let mut resolved = Vec::new();

        for pending in &self.pending {
            let known = global.find(&pending.resource);
            let before_of = |index: u32| {
                known
                    .and_then(|state| state.subresource_state(index))
                    .unwrap_or(ResourceStates::INITIAL)
            };

            match pending.subresource {
                Subresource::Index(index) => {
                    resolved.extend(
                        pending
                            .resolve(pending.subresource, before_of(index))
                            .map(ResourceBarrier::Transition),
                    );
                }
                Subresource::All => match known {
                    Some(state) if !state.is_uniform() => {
                        for index in 0..pending.resource.subresource_count() {
                            resolved.extend(
                                pending
                                    .resolve(Subresource::Index(index), before_of(index))
                                    .map(ResourceBarrier::Transition),
                            );
                        }
                    }
                    _ => {
                        let before = known
                            .and_then(|state| state.uniform_state())
                            .unwrap_or(ResourceStates::INITIAL);
                        resolved.extend(
                            pending
                                .resolve(Subresource::All, before)
                                .map(ResourceBarrier::Transition),
                        );
                    }
                },
            }
        }

        if !resolved.is_empty() {
            log::trace!("Resolved {} corrective barrier(s)", resolved.len());
        }
        resolved
    }

    /// Number of barriers waiting for the next flush.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Number of transitions waiting for close-time resolution.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Staged barriers, in staging order.
    pub fn staged(&self) -> &[ResourceBarrier] {
        &self.staged
    }

    /// Unresolved transitions, in recording order.
    pub fn pending(&self) -> &[PendingTransition] {
        &self.pending
    }

    /// Drop the pending transitions once their corrective barriers are recorded.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.staged.clear();
        self.pending.clear();
    }
}
