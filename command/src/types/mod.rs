//! Core types shared by trackers, contexts and backends.

mod barrier;
mod resource;
mod state;

pub use barrier::{PendingTransition, ResourceBarrier, TransitionBarrier};
pub use resource::{
    GpuResource, Resource, ResourceDescriptor, ResourceId, ResourceKind, Subresource,
};
pub use state::ResourceStates;
