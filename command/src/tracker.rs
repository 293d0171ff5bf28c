//! Resource state tracking.
//!
//! A [`ResourceStateTracker`] maps resource identities to their last known
//! [`ResourceState`]. It is used in two roles:
//!
//! 1. **Local**: every [`CommandContext`](crate::context::CommandContext) owns
//!    one that starts empty and records the states the context moves its
//!    resources into.
//! 2. **Global**: the [`CommandQueue`](crate::queue::CommandQueue) owns the
//!    one describing every resource after all previously submitted work.
//!
//! Absence of an entry means "not tracked here", which is different from a
//! resource being in [`ResourceStates::COMMON`].
//!
//! # Subresources
//!
//! States are stored as one uniform value plus sparse per-subresource
//! overrides. A 12-mip texture used uniformly costs a single entry; only
//! partially transitioned resources pay for an override map.

use std::collections::{BTreeMap, HashMap};

use crate::types::{Resource, ResourceId, ResourceStates, Subresource};

/// Last known state of one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceState {
    /// State of every subresource without an override. `None` when only
    /// individual subresources are known (local trackers only).
    uniform: Option<ResourceStates>,
    /// Per-subresource states overriding `uniform`.
    subresources: BTreeMap<u32, ResourceStates>,
}

impl ResourceState {
    /// Create a state where every subresource is in `state`.
    pub fn new(state: ResourceStates) -> Self {
        Self {
            uniform: Some(state),
            subresources: BTreeMap::new(),
        }
    }

    /// Get the uniform state.
    pub fn uniform_state(&self) -> Option<ResourceStates> {
        self.uniform
    }

    /// Get the per-subresource overrides.
    pub fn subresource_overrides(&self) -> &BTreeMap<u32, ResourceStates> {
        &self.subresources
    }

    /// Check if any subresource diverges from the uniform state.
    pub fn has_overrides(&self) -> bool {
        !self.subresources.is_empty()
    }

    /// Check if every subresource shares one known state.
    pub fn is_uniform(&self) -> bool {
        self.uniform.is_some() && self.subresources.is_empty()
    }

    /// Get the state of a single subresource, if known.
    pub fn subresource_state(&self, index: u32) -> Option<ResourceStates> {
        self.subresources.get(&index).copied().or(self.uniform)
    }

    /// Set the state of one or all subresources.
    ///
    /// Writing [`Subresource::All`] clears every override.
    pub fn set(&mut self, subresource: Subresource, state: ResourceStates) {
        match subresource {
            Subresource::All => {
                self.uniform = Some(state);
                self.subresources.clear();
            }
            Subresource::Index(index) => {
                if self.uniform == Some(state) {
                    self.subresources.remove(&index);
                } else {
                    self.subresources.insert(index, state);
                }
            }
        }
    }

    /// Overlay `other` on top of this state.
    ///
    /// A known uniform state in `other` replaces everything; otherwise only
    /// `other`'s overrides are applied.
    fn overlay(&mut self, other: &ResourceState) {
        if other.uniform.is_some() {
            *self = other.clone();
            return;
        }
        for (&index, &state) in &other.subresources {
            self.set(Subresource::Index(index), state);
        }
    }
}

/// Map from resource identity to its last known state.
#[derive(Debug, Default, Clone)]
pub struct ResourceStateTracker {
    states: HashMap<ResourceId, ResourceState>,
}

impl ResourceStateTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state of every subresource of `resource`, clearing overrides.
    ///
    /// Does nothing if `resource` is `None`.
    pub fn add_resource_state<'a>(
        &mut self,
        resource: impl Into<Option<&'a Resource>>,
        state: ResourceStates,
    ) {
        if let Some(resource) = resource.into() {
            self.states
                .insert(resource.id(), ResourceState::new(state));
        }
    }

    /// Forget `resource`. Called when the resource is destroyed.
    pub fn remove_resource_state(&mut self, resource: &Resource) {
        self.states.remove(&resource.id());
    }

    /// Set the state of one or all subresources of `resource`.
    ///
    /// # Panics
    ///
    /// Panics if the subresource index is out of range for `resource`.
    pub fn set_resource_state(
        &mut self,
        resource: &Resource,
        subresource: Subresource,
        state: ResourceStates,
    ) {
        resource.validate_subresource(subresource);
        match subresource {
            Subresource::All => self.add_resource_state(resource, state),
            Subresource::Index(_) => self
                .states
                .entry(resource.id())
                .or_default()
                .set(subresource, state),
        }
    }

    /// Replace the contents of this tracker with `other`.
    ///
    /// This is a full replace: entries only present in `self` are dropped.
    pub fn update_resource_states(&mut self, other: &ResourceStateTracker) {
        self.reset();
        self.states
            .extend(other.states.iter().map(|(&id, state)| (id, state.clone())));
    }

    /// Commit `other` into this tracker, resource by resource.
    ///
    /// Entries of `other` with a known uniform state replace this tracker's
    /// entry. Entries that only know individual subresources are overlaid on
    /// the existing entry. Resources absent from `other` are left untouched.
    pub fn merge_resource_states(&mut self, other: &ResourceStateTracker) {
        for (&id, state) in &other.states {
            self.states.entry(id).or_default().overlay(state);
        }
    }

    /// Remove every entry.
    pub fn reset(&mut self) {
        self.states.clear();
    }

    /// Look up the state of `resource`.
    pub fn find(&self, resource: &Resource) -> Option<&ResourceState> {
        self.states.get(&resource.id())
    }

    /// Look up a state by identity.
    pub fn find_by_id(&self, id: ResourceId) -> Option<&ResourceState> {
        self.states.get(&id)
    }

    /// Check if `resource` is tracked.
    pub fn contains(&self, resource: &Resource) -> bool {
        self.states.contains_key(&resource.id())
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check if no resources are tracked.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Iterate over all tracked entries.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &ResourceState)> {
        self.states.iter().map(|(&id, state)| (id, state))
    }
}
