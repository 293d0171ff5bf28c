//! GPU backend abstraction layer.
//!
//! This module provides the trait seam between the barrier protocol and the
//! platform API. The protocol only needs two things from a backend:
//!
//! - a command list sink ([`GpuCommandList`]) that accepts batched barrier
//!   records and the GPU operations they guard, and
//! - a queue ([`GpuBackend`]) that executes closed command lists in order and
//!   reports completion through monotonically increasing fence values.
//!
//! # Available Backends
//!
//! - `dummy` (always available): records commands, simulates resource states
//!   on the "GPU" and reports every transition that does not match them
//! - `vulkan-backend`: Native Vulkan backend using ash

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub mod dummy;

use crate::error::GraphicsError;
use crate::types::{Resource, ResourceBarrier};

/// Queue / command list type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandListType {
    /// Graphics, compute and copy commands.
    #[default]
    Direct,
    /// Compute and copy commands.
    Compute,
    /// Copy commands only.
    Copy,
}

/// Arguments of a non-indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

impl DrawArgs {
    /// Draw `vertex_count` vertices of a single instance.
    pub fn vertices(vertex_count: u32) -> Self {
        Self {
            vertex_count,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }
    }
}

/// Arguments of an indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawIndexedArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl DrawIndexedArgs {
    /// Draw `index_count` indices of a single instance.
    pub fn indices(index_count: u32) -> Self {
        Self {
            index_count,
            instance_count: 1,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }
}

/// Platform command list.
///
/// A command list is open for recording after creation and after
/// [`reset`](GpuCommandList::reset), and must be [`close`](GpuCommandList::close)d
/// before it is executed.
pub trait GpuCommandList: Send + std::fmt::Debug + 'static {
    /// Get the type of this command list.
    fn list_type(&self) -> CommandListType;

    /// Reopen the list with a fresh allocator.
    ///
    /// The caller guarantees that the GPU finished executing the previous
    /// recording.
    fn reset(&mut self) -> Result<(), GraphicsError>;

    /// Finish recording.
    fn close(&mut self) -> Result<(), GraphicsError>;

    /// Check if the list is closed.
    fn is_closed(&self) -> bool;

    /// Record a batch of barriers as a single platform call.
    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]) -> Result<(), GraphicsError>;

    /// Record a non-indexed draw.
    fn draw(&mut self, args: DrawArgs) -> Result<(), GraphicsError>;

    /// Record an indexed draw.
    fn draw_indexed(&mut self, args: DrawIndexedArgs) -> Result<(), GraphicsError>;

    /// Record a compute dispatch.
    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), GraphicsError>;

    /// Copy the full contents of `src` into `dst`.
    fn copy_resource(&mut self, dst: &Resource, src: &Resource) -> Result<(), GraphicsError>;

    /// Copy a byte range between two buffers.
    fn copy_buffer_region(
        &mut self,
        dst: &Resource,
        dst_offset: u64,
        src: &Resource,
        src_offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError>;

    /// Resolve a multisampled subresource into a single-sampled one.
    fn resolve_subresource(
        &mut self,
        dst: &Resource,
        dst_subresource: u32,
        src: &Resource,
        src_subresource: u32,
    ) -> Result<(), GraphicsError>;
}

/// GPU backend trait for abstracting different GPU APIs.
pub trait GpuBackend: Send + Sync + 'static {
    /// Command list type recorded for this backend.
    type CommandList: GpuCommandList;

    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a new command list, open for recording.
    fn create_command_list(
        &self,
        list_type: CommandListType,
    ) -> Result<Self::CommandList, GraphicsError>;

    /// Execute closed command lists back to back, in slice order.
    fn execute_command_lists(
        &self,
        list_type: CommandListType,
        lists: &[&Self::CommandList],
    ) -> Result<(), GraphicsError>;

    /// Signal the queue and return the fence value reached once all work
    /// submitted so far has completed.
    fn signal(&self, list_type: CommandListType) -> Result<u64, GraphicsError>;

    /// Get the last fence value the GPU completed.
    fn completed_fence_value(&self, list_type: CommandListType) -> Result<u64, GraphicsError>;

    /// Block until the fence reaches `value`.
    fn wait_for_fence_value(
        &self,
        list_type: CommandListType,
        value: u64,
    ) -> Result<(), GraphicsError>;
}
