//! Command recording contexts.
//!
//! A [`CommandContext`] owns everything one recording thread needs: a local
//! [`ResourceStateTracker`], a primary command list that receives the recorded
//! work, and a secondary *pending* command list that receives corrective
//! barriers when the context is closed.
//!
//! # Recording
//!
//! ```ignore
//! let mut ctx = queue.get_command_context()?;
//! ctx.transition_barrier(&texture, ResourceStates::COPY_DEST, Subresource::All)?;
//! ctx.copy_resource(&texture, &staging)?;
//! ctx.transition_barrier(&texture, ResourceStates::PIXEL_SHADER_RESOURCE, Subresource::All)?;
//! ctx.draw(DrawArgs::vertices(3))?;
//! let fence = queue.execute_command_context(ctx)?;
//! ```
//!
//! # Close-time resolution
//!
//! The first transition of a resource in a context cannot know the state the
//! resource is in, since that depends on work recorded by contexts that have
//! not been submitted yet. [`close`](CommandContext::close) resolves those
//! transitions against the global tracker and records the corrective
//! barriers into the pending list, which the queue executes right before the
//! primary list.

mod barriers;

pub use barriers::BarrierQueue;

use std::sync::Arc;

use crate::backend::{DrawArgs, DrawIndexedArgs, GpuCommandList};
use crate::error::GraphicsError;
use crate::profiling::{profile_function, profile_plot, profile_scope};
use crate::tracker::ResourceStateTracker;
use crate::types::{Resource, ResourceBarrier, ResourceStates, Subresource};

/// Default number of staged barriers that triggers an automatic flush.
pub const DEFAULT_MAX_STAGED_BARRIERS: usize = 16;

/// Recording behavior of a [`CommandContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// Flush as soon as this many barriers are staged. `0` disables
    /// automatic flushing; barriers are then only flushed before GPU
    /// operations and at close.
    pub max_staged_barriers: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_staged_barriers: DEFAULT_MAX_STAGED_BARRIERS,
        }
    }
}

impl ContextConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the automatic flush threshold.
    pub fn with_max_staged_barriers(mut self, max_staged_barriers: usize) -> Self {
        self.max_staged_barriers = max_staged_barriers;
        self
    }
}

/// A command recording context.
///
/// Contexts are `Send` but not shared: one thread records into a context at
/// a time and no locks are taken while recording.
#[derive(Debug)]
pub struct CommandContext<L: GpuCommandList> {
    label: Option<String>,
    config: ContextConfig,
    primary: L,
    pending: L,
    local: ResourceStateTracker,
    barriers: BarrierQueue,
    /// Resources kept alive until the GPU finished with this recording.
    tracked: Vec<Arc<Resource>>,
    closed: bool,
}

impl<L: GpuCommandList> CommandContext<L> {
    /// Create a context from two open command lists of the same type.
    pub fn new(primary: L, pending: L, config: ContextConfig) -> Self {
        debug_assert_eq!(primary.list_type(), pending.list_type());
        Self {
            label: None,
            config,
            primary,
            pending,
            local: ResourceStateTracker::new(),
            barriers: BarrierQueue::new(),
            tracked: Vec::new(),
            closed: false,
        }
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Get the debug label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Get the recording configuration.
    pub fn config(&self) -> ContextConfig {
        self.config
    }

    fn ensure_open(&self, operation: &str) -> Result<(), GraphicsError> {
        if self.closed {
            return Err(GraphicsError::InvalidOperation(format!(
                "{operation} on closed command context {:?}",
                self.label().unwrap_or("<unnamed>")
            )));
        }
        Ok(())
    }

    fn flush_if_full(&mut self) -> Result<(), GraphicsError> {
        let max = self.config.max_staged_barriers;
        if max > 0 && self.barriers.staged_len() >= max {
            self.flush_resource_barriers()?;
        }
        Ok(())
    }

    /// Transition `resource` (or one of its subresources) to `state_after`.
    ///
    /// Passing `None` does nothing.
    ///
    /// # Panics
    ///
    /// Panics if `subresource` is out of range for `resource` or
    /// `state_after` is not a valid state combination.
    pub fn transition_barrier<'a>(
        &mut self,
        resource: impl Into<Option<&'a Arc<Resource>>>,
        state_after: ResourceStates,
        subresource: impl Into<Subresource>,
    ) -> Result<(), GraphicsError> {
        self.ensure_open("transition_barrier")?;
        let Some(resource) = resource.into() else {
            return Ok(());
        };

        self.barriers
            .transition(&mut self.local, resource, subresource.into(), state_after);
        self.flush_if_full()
    }

    /// Stage an aliasing barrier between two resources placed in the same
    /// memory. `None` on either side stands for any placed resource.
    pub fn aliasing_barrier<'a, 'b>(
        &mut self,
        before: impl Into<Option<&'a Arc<Resource>>>,
        after: impl Into<Option<&'b Arc<Resource>>>,
    ) -> Result<(), GraphicsError> {
        self.ensure_open("aliasing_barrier")?;
        self.barriers.push(ResourceBarrier::Aliasing {
            before: before.into().cloned(),
            after: after.into().cloned(),
        });
        self.flush_if_full()
    }

    /// Stage an unordered-access barrier. `None` orders all UAV accesses.
    pub fn uav_barrier<'a>(
        &mut self,
        resource: impl Into<Option<&'a Arc<Resource>>>,
    ) -> Result<(), GraphicsError> {
        self.ensure_open("uav_barrier")?;
        self.barriers.push(ResourceBarrier::Uav {
            resource: resource.into().cloned(),
        });
        self.flush_if_full()
    }

    /// Submit every staged barrier to the primary list as one batched call.
    ///
    /// Returns the number of submitted barriers; `0` if nothing was staged.
    pub fn flush_resource_barriers(&mut self) -> Result<usize, GraphicsError> {
        profile_scope!("flush_resource_barriers");
        self.ensure_open("flush_resource_barriers")?;
        self.barriers.flush(&mut self.primary)
    }

    /// Record a non-indexed draw.
    pub fn draw(&mut self, args: DrawArgs) -> Result<(), GraphicsError> {
        self.flush_resource_barriers()?;
        self.primary.draw(args)
    }

    /// Record an indexed draw.
    pub fn draw_indexed(&mut self, args: DrawIndexedArgs) -> Result<(), GraphicsError> {
        self.flush_resource_barriers()?;
        self.primary.draw_indexed(args)
    }

    /// Record a compute dispatch.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), GraphicsError> {
        self.flush_resource_barriers()?;
        self.primary.dispatch(x, y, z)
    }

    /// Copy `src` into `dst`, transitioning both for the copy.
    pub fn copy_resource(
        &mut self,
        dst: &Arc<Resource>,
        src: &Arc<Resource>,
    ) -> Result<(), GraphicsError> {
        self.transition_barrier(dst, ResourceStates::COPY_DEST, Subresource::All)?;
        self.transition_barrier(src, ResourceStates::COPY_SOURCE, Subresource::All)?;
        self.flush_resource_barriers()?;
        self.primary.copy_resource(dst, src)
    }

    /// Copy `size` bytes between two buffers, transitioning both for the copy.
    pub fn copy_buffer_region(
        &mut self,
        dst: &Arc<Resource>,
        dst_offset: u64,
        src: &Arc<Resource>,
        src_offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        self.transition_barrier(dst, ResourceStates::COPY_DEST, Subresource::All)?;
        self.transition_barrier(src, ResourceStates::COPY_SOURCE, Subresource::All)?;
        self.flush_resource_barriers()?;
        self.primary
            .copy_buffer_region(dst, dst_offset, src, src_offset, size)
    }

    /// Resolve a multisampled subresource, transitioning both subresources.
    pub fn resolve_subresource(
        &mut self,
        dst: &Arc<Resource>,
        dst_subresource: u32,
        src: &Arc<Resource>,
        src_subresource: u32,
    ) -> Result<(), GraphicsError> {
        self.transition_barrier(dst, ResourceStates::RESOLVE_DEST, dst_subresource)?;
        self.transition_barrier(src, ResourceStates::RESOLVE_SOURCE, src_subresource)?;
        self.flush_resource_barriers()?;
        self.primary
            .resolve_subresource(dst, dst_subresource, src, src_subresource)
    }

    /// Record an acceleration structure build.
    ///
    /// Staged barriers are flushed, `record` receives the primary command
    /// list to record the build, and a UAV barrier on `dest` is staged so
    /// later reads observe the finished structure.
    pub fn build_acceleration_structure<F>(
        &mut self,
        dest: &Arc<Resource>,
        record: F,
    ) -> Result<(), GraphicsError>
    where
        F: FnOnce(&mut L) -> Result<(), GraphicsError>,
    {
        self.flush_resource_barriers()?;
        record(&mut self.primary)?;
        self.uav_barrier(dest)
    }

    /// Keep `resource` alive until this context is reset.
    pub fn track_resource(&mut self, resource: &Arc<Resource>) {
        self.tracked.push(Arc::clone(resource));
    }

    /// Close the context against the global tracker.
    ///
    /// Flushes staged barriers, closes the primary list, records corrective
    /// barriers for every transition whose before state was unknown into the
    /// pending list, closes the pending list and commits this context's
    /// states into `global`.
    ///
    /// Returns `true` if the pending list holds corrective barriers and must
    /// be executed before the primary list.
    ///
    /// On error `global` is left untouched and the context stays open with
    /// its pending transitions, so `close` may be retried or the context
    /// reset.
    ///
    /// Contexts must be closed in the order their lists execute on the GPU.
    pub fn close(&mut self, global: &mut ResourceStateTracker) -> Result<bool, GraphicsError> {
        profile_function!();
        if self.closed {
            return Err(GraphicsError::InvalidOperation(format!(
                "command context {:?} is already closed",
                self.label().unwrap_or("<unnamed>")
            )));
        }

        self.flush_resource_barriers()?;
        if !self.primary.is_closed() {
            self.primary.close()?;
        }

        let corrective = {
            profile_scope!("resolve_pending");
            self.barriers.resolve_pending(global)
        };
        if let Err(e) = self.record_corrective(&corrective) {
            if let Err(reset_error) = self.pending.reset() {
                log::error!("Failed to reset pending list after close error: {reset_error}");
            }
            return Err(e);
        }
        profile_plot!("Corrective barriers", corrective.len());

        global.merge_resource_states(&self.local);
        self.barriers.clear_pending();
        self.closed = true;

        log::debug!(
            "Closed command context {:?}: {} corrective barrier(s), {} tracked resource state(s)",
            self.label().unwrap_or("<unnamed>"),
            corrective.len(),
            self.local.len()
        );
        Ok(!corrective.is_empty())
    }

    fn record_corrective(&mut self, corrective: &[ResourceBarrier]) -> Result<(), GraphicsError> {
        if !corrective.is_empty() {
            self.pending.resource_barrier(corrective)?;
        }
        self.pending.close()
    }

    /// Reopen the context for a new recording.
    ///
    /// The caller guarantees that the GPU finished executing the previous
    /// recording.
    pub fn reset(&mut self) -> Result<(), GraphicsError> {
        if !self.closed && (self.barriers.staged_len() > 0 || self.barriers.pending_len() > 0) {
            log::warn!(
                "Resetting command context {:?} that was never closed; recorded work is discarded",
                self.label().unwrap_or("<unnamed>")
            );
        }

        self.primary.reset()?;
        self.pending.reset()?;
        self.local.reset();
        self.barriers.clear();
        self.tracked.clear();
        self.closed = false;
        Ok(())
    }

    /// Check if the context is closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Get the states this context moved its resources into.
    pub fn local_states(&self) -> &ResourceStateTracker {
        &self.local
    }

    /// Number of barriers waiting for the next flush.
    pub fn staged_barrier_count(&self) -> usize {
        self.barriers.staged_len()
    }

    /// Number of transitions waiting for close-time resolution.
    pub fn pending_transition_count(&self) -> usize {
        self.barriers.pending_len()
    }

    /// Number of resources kept alive by [`track_resource`](Self::track_resource).
    pub fn tracked_resource_count(&self) -> usize {
        self.tracked.len()
    }

    /// Get the primary command list.
    pub fn primary_list(&self) -> &L {
        &self.primary
    }

    /// Get the pending command list.
    pub fn pending_list(&self) -> &L {
        &self.pending
    }
}

static_assertions::assert_impl_all!(
    CommandContext<crate::backend::dummy::DummyCommandList>: Send
);
