//! Common utilities for command recording integration tests.
//!
//! Tests run against the dummy backend, which replays every executed barrier
//! against a simulated per-subresource state table. A test passes the
//! resolution checks when the backend reports no violations.

#![allow(dead_code)]

use std::sync::Arc;

use redlilium_command::backend::dummy::{DummyCommandList, RecordedCommand};
use redlilium_command::{
    CommandQueue, CommandQueueDescriptor, ContextConfig, DummyBackend, Resource,
    ResourceBarrier, ResourceDescriptor, ResourceId, ResourceStates, Subresource,
};

/// Install a test logger. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A queue on a validating dummy backend.
pub struct TestContext {
    pub backend: Arc<DummyBackend>,
    pub queue: CommandQueue<DummyBackend>,
}

impl TestContext {
    /// Create a test context with the default context configuration.
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    /// Create a test context whose contexts use `config`.
    pub fn with_config(config: ContextConfig) -> Self {
        init_logging();
        let backend = Arc::new(DummyBackend::new());
        let queue = CommandQueue::new(
            Arc::clone(&backend),
            CommandQueueDescriptor::new()
                .with_label("test queue")
                .with_context_config(config),
        );
        Self { backend, queue }
    }

    /// Fail the test if the backend saw any invalid transition or usage.
    pub fn assert_no_violations(&self) {
        let violations = self.backend.violations();
        assert!(
            violations.is_empty(),
            "backend reported violations: {violations:#?}"
        );
    }

    /// State of a subresource as tracked by the queue, `None` if unknown.
    pub fn global_state(&self, resource: &Resource, subresource: u32) -> Option<ResourceStates> {
        self.queue
            .resource_state(resource)
            .and_then(|state| state.subresource_state(subresource))
    }
}

/// Create a labeled 2D texture.
pub fn texture(label: &str, mip_levels: u32) -> Arc<Resource> {
    Arc::new(Resource::dummy(
        ResourceDescriptor::texture_2d(256, 256)
            .with_label(label)
            .with_mip_levels(mip_levels),
    ))
}

/// Create a labeled buffer.
pub fn buffer(label: &str, size: u64) -> Arc<Resource> {
    Arc::new(Resource::dummy(
        ResourceDescriptor::buffer(size).with_label(label),
    ))
}

/// A transition as `(resource, subresource, before, after)`.
pub type Transition = (ResourceId, Subresource, ResourceStates, ResourceStates);

/// Transitions in a list of barriers, skipping aliasing and UAV barriers.
pub fn transitions<'a>(barriers: impl IntoIterator<Item = &'a ResourceBarrier>) -> Vec<Transition> {
    barriers
        .into_iter()
        .filter_map(ResourceBarrier::as_transition)
        .map(|t| {
            (
                t.resource.id(),
                t.subresource,
                t.state_before,
                t.state_after,
            )
        })
        .collect()
}

/// Transitions recorded into a dummy command list.
pub fn list_transitions(list: &DummyCommandList) -> Vec<Transition> {
    transitions(list.barriers())
}

/// Transitions in recorded commands (e.g. a snapshot of an executed list).
pub fn command_transitions(commands: &[RecordedCommand]) -> Vec<Transition> {
    transitions(commands.iter().flat_map(|command| match command {
        RecordedCommand::Barriers(barriers) => barriers.as_slice(),
        _ => &[][..],
    }))
}
