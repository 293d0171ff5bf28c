//! # RedLilium Command
//!
//! Command recording with resource state tracking and deferred barrier
//! resolution.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`CommandContext`] - Per-thread recording with barrier staging and batching
//! - [`ResourceStateTracker`] - Per-subresource state model used locally and globally
//! - [`CommandQueue`] - Submission authority owning the global tracker
//! - [`GpuBackend`] - Trait for platform backends: Dummy (validating) and Vulkan
//!
//! Contexts are recorded independently, possibly on different threads. The
//! first transition of a resource in a context has no known before state;
//! when the context is executed, the queue resolves it against the states
//! left by all previously executed work and records the corrective barriers
//! into a pending list that runs right before the context's own commands.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use redlilium_command::*;
//!
//! let queue = CommandQueue::new(Arc::new(DummyBackend::new()), CommandQueueDescriptor::new());
//! let texture = Arc::new(Resource::dummy(ResourceDescriptor::texture_2d(256, 256)));
//!
//! let mut ctx = queue.get_command_context()?;
//! ctx.transition_barrier(&texture, ResourceStates::RENDER_TARGET, Subresource::All)?;
//! ctx.draw(DrawArgs::vertices(3))?;
//! let fence = queue.execute_command_context(ctx)?;
//! queue.wait_for_fence_value(fence)?;
//! ```

pub mod backend;
pub mod context;
pub mod error;
pub mod profiling;
pub mod queue;
pub mod tracker;
pub mod types;

// Re-export main types for convenience
pub use backend::dummy::DummyBackend;
pub use backend::{CommandListType, DrawArgs, DrawIndexedArgs, GpuBackend, GpuCommandList};
pub use context::{CommandContext, ContextConfig};
pub use error::GraphicsError;
pub use queue::{CommandQueue, CommandQueueDescriptor};
pub use tracker::{ResourceState, ResourceStateTracker};
pub use types::{
    PendingTransition, Resource, ResourceBarrier, ResourceDescriptor, ResourceId, ResourceKind,
    ResourceStates, Subresource, TransitionBarrier,
};

/// Command library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the command subsystem.
pub fn init() {
    log::info!("RedLilium Command v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
    }

    #[test]
    fn test_default_initial_state() {
        assert_eq!(ResourceStates::default(), ResourceStates::COMMON);
    }
}
