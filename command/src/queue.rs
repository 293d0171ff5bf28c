//! Command queue: the submission authority.
//!
//! The [`CommandQueue`] owns the global [`ResourceStateTracker`] and is the only
//! place that mutates it. Contexts are closed against it under a lock that is
//! held until their command lists are handed to the backend, so the order in
//! which contexts are merged into the global tracker is the order in which
//! their work executes on the GPU.
//!
//! Executed contexts are pooled together with the fence value that marks the
//! end of their work, and are only handed out again once the GPU has passed
//! that fence.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::backend::{CommandListType, GpuBackend, GpuCommandList};
use crate::context::{CommandContext, ContextConfig};
use crate::error::GraphicsError;
use crate::profiling::{profile_function, profile_scope};
use crate::tracker::{ResourceState, ResourceStateTracker};
use crate::types::{Resource, ResourceStates};

/// Default number of executed contexts kept for reuse.
pub const DEFAULT_MAX_POOLED_CONTEXTS: usize = 8;

/// Descriptor for creating a [`CommandQueue`].
#[derive(Debug, Clone)]
pub struct CommandQueueDescriptor {
    /// Debug label for the queue and its contexts.
    pub label: Option<String>,
    /// Type of the command lists executed on this queue.
    pub list_type: CommandListType,
    /// Configuration of every context created by this queue.
    pub context: ContextConfig,
    /// Maximum number of executed contexts kept for reuse.
    pub max_pooled_contexts: usize,
}

impl Default for CommandQueueDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            list_type: CommandListType::Direct,
            context: ContextConfig::default(),
            max_pooled_contexts: DEFAULT_MAX_POOLED_CONTEXTS,
        }
    }
}

impl CommandQueueDescriptor {
    /// Create a new descriptor with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the command list type.
    pub fn with_list_type(mut self, list_type: CommandListType) -> Self {
        self.list_type = list_type;
        self
    }

    /// Set the configuration of created contexts.
    pub fn with_context_config(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }

    /// Set the maximum number of pooled contexts.
    pub fn with_max_pooled_contexts(mut self, max_pooled_contexts: usize) -> Self {
        self.max_pooled_contexts = max_pooled_contexts;
        self
    }
}

/// Command queue owning the global resource state tracker.
pub struct CommandQueue<B: GpuBackend> {
    backend: Arc<B>,
    descriptor: CommandQueueDescriptor,
    global: Mutex<ResourceStateTracker>,
    /// Executed contexts with the fence value that ends their work, oldest first.
    pool: Mutex<VecDeque<(u64, CommandContext<B::CommandList>)>>,
    created_contexts: AtomicU64,
}

impl<B: GpuBackend> CommandQueue<B> {
    /// Create a new queue on `backend`.
    pub fn new(backend: Arc<B>, descriptor: CommandQueueDescriptor) -> Self {
        log::debug!(
            "Creating {:?} command queue {:?} on {}",
            descriptor.list_type,
            descriptor.label.as_deref().unwrap_or("<unnamed>"),
            backend.name()
        );
        Self {
            backend,
            descriptor,
            global: Mutex::new(ResourceStateTracker::new()),
            pool: Mutex::new(VecDeque::new()),
            created_contexts: AtomicU64::new(0),
        }
    }

    /// Get the backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Get the queue descriptor.
    pub fn descriptor(&self) -> &CommandQueueDescriptor {
        &self.descriptor
    }

    /// Get the command list type of this queue.
    pub fn list_type(&self) -> CommandListType {
        self.descriptor.list_type
    }

    /// Get a context ready for recording.
    ///
    /// The oldest pooled context is reused if the GPU finished its previous
    /// recording; otherwise a new context is created.
    pub fn get_command_context(&self) -> Result<CommandContext<B::CommandList>, GraphicsError> {
        let completed = self.backend.completed_fence_value(self.list_type())?;
        let reusable = {
            let mut pool = self.pool.lock();
            match pool.front() {
                Some((fence, _)) if *fence <= completed => pool.pop_front(),
                _ => None,
            }
        };

        if let Some((fence, mut context)) = reusable {
            log::trace!(
                "Reusing command context {:?} (fence {fence}, completed {completed})",
                context.label().unwrap_or("<unnamed>")
            );
            context.reset()?;
            return Ok(context);
        }

        let index = self.created_contexts.fetch_add(1, Ordering::Relaxed);
        let primary = self.backend.create_command_list(self.list_type())?;
        let pending = self.backend.create_command_list(self.list_type())?;
        let label = format!(
            "{} context {index}",
            self.descriptor.label.as_deref().unwrap_or("queue")
        );
        log::debug!("Created command context {label:?}");

        Ok(CommandContext::new(primary, pending, self.descriptor.context).with_label(label))
    }

    /// Close and execute one context. Returns the fence value that marks the
    /// end of its work.
    pub fn execute_command_context(
        &self,
        context: CommandContext<B::CommandList>,
    ) -> Result<u64, GraphicsError> {
        self.execute_command_contexts(vec![context])
    }

    /// Close and execute contexts in order.
    ///
    /// Every context is closed against the global tracker and its
    /// `[pending, primary]` lists are executed in one backend call, the
    /// pending list only when it holds corrective barriers. Returns the fence
    /// value that marks the end of the submitted work.
    ///
    /// The global tracker only changes if the backend accepted the lists.
    /// Passing a context that is already closed fails before any context is
    /// closed.
    pub fn execute_command_contexts(
        &self,
        mut contexts: Vec<CommandContext<B::CommandList>>,
    ) -> Result<u64, GraphicsError> {
        profile_function!();

        let fence = {
            let mut global = self.global.lock();

            if let Some(closed) = contexts.iter().find(|context| context.is_closed()) {
                return Err(GraphicsError::InvalidOperation(format!(
                    "command context {:?} is already closed",
                    closed.label().unwrap_or("<unnamed>")
                )));
            }

            // Committed only once the backend accepted the lists.
            let mut committed = global.clone();
            let mut needs_pending = Vec::with_capacity(contexts.len());
            for context in &mut contexts {
                needs_pending.push(context.close(&mut committed)?);
            }

            let lists: Vec<&B::CommandList> = contexts
                .iter()
                .zip(&needs_pending)
                .flat_map(|(context, &needs_pending)| {
                    needs_pending
                        .then(|| context.pending_list())
                        .into_iter()
                        .chain(std::iter::once(context.primary_list()))
                })
                .collect();

            {
                profile_scope!("execute_command_lists");
                self.backend
                    .execute_command_lists(self.list_type(), &lists)?;
            }
            *global = committed;
            let fence = self.backend.signal(self.list_type())?;

            log::debug!(
                "Executed {} context(s) as {} command list(s), fence {fence}",
                contexts.len(),
                lists.len()
            );
            fence
        };

        let mut pool = self.pool.lock();
        for context in contexts {
            if pool.len() < self.descriptor.max_pooled_contexts {
                pool.push_back((fence, context));
            } else {
                log::trace!(
                    "Context pool full, dropping {:?}",
                    context.label().unwrap_or("<unnamed>")
                );
            }
        }
        Ok(fence)
    }

    /// Signal the queue. Returns the fence value reached once all work
    /// submitted so far has completed.
    pub fn signal(&self) -> Result<u64, GraphicsError> {
        self.backend.signal(self.list_type())
    }

    /// Check if the GPU has passed `value`.
    pub fn is_fence_complete(&self, value: u64) -> Result<bool, GraphicsError> {
        Ok(self.backend.completed_fence_value(self.list_type())? >= value)
    }

    /// Block until the GPU has passed `value`.
    pub fn wait_for_fence_value(&self, value: u64) -> Result<(), GraphicsError> {
        if self.is_fence_complete(value)? {
            return Ok(());
        }
        profile_scope!("wait_for_fence_value");
        self.backend.wait_for_fence_value(self.list_type(), value)
    }

    /// Block until all submitted work has completed.
    pub fn flush(&self) -> Result<(), GraphicsError> {
        let value = self.signal()?;
        self.wait_for_fence_value(value)
    }

    /// Declare the state `resource` is in when it is first used on this queue.
    pub fn register_resource(&self, resource: &Resource, state: ResourceStates) {
        self.global.lock().add_resource_state(resource, state);
    }

    /// Forget `resource`. Called by the owner before the resource is destroyed.
    pub fn unregister_resource(&self, resource: &Resource) {
        let mut global = self.global.lock();
        if !global.contains(resource) {
            log::warn!(
                "Unregistering resource {:?} ({:?}) unknown to the queue",
                resource.label().unwrap_or("<unnamed>"),
                resource.id()
            );
        }
        global.remove_resource_state(resource);
    }

    /// Get the state of `resource` after all submitted work.
    pub fn resource_state(&self, resource: &Resource) -> Option<ResourceState> {
        self.global.lock().find(resource).cloned()
    }

    /// Number of resources in the global tracker.
    pub fn tracked_resource_count(&self) -> usize {
        self.global.lock().len()
    }

    /// Forget every resource state. Used on full device reset.
    pub fn reset_resource_states(&self) {
        log::debug!("Resetting global resource states");
        self.global.lock().reset();
    }

    /// Number of executed contexts waiting for reuse.
    pub fn pooled_context_count(&self) -> usize {
        self.pool.lock().len()
    }
}

impl<B: GpuBackend> Drop for CommandQueue<B> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::error!("Failed to flush command queue on drop: {e}");
        }
    }
}

impl<B: GpuBackend> std::fmt::Debug for CommandQueue<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("backend", &self.backend.name())
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(
    CommandQueue<crate::backend::dummy::DummyBackend>: Send, Sync
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::types::{ResourceDescriptor, Subresource};

    fn queue() -> CommandQueue<DummyBackend> {
        CommandQueue::new(
            Arc::new(DummyBackend::new()),
            CommandQueueDescriptor::new().with_label("test"),
        )
    }

    #[test]
    fn test_descriptor_builder() {
        let descriptor = CommandQueueDescriptor::new()
            .with_label("copy")
            .with_list_type(CommandListType::Copy)
            .with_context_config(ContextConfig::new().with_max_staged_barriers(4))
            .with_max_pooled_contexts(2);

        assert_eq!(descriptor.label.as_deref(), Some("copy"));
        assert_eq!(descriptor.list_type, CommandListType::Copy);
        assert_eq!(descriptor.context.max_staged_barriers, 4);
        assert_eq!(descriptor.max_pooled_contexts, 2);
    }

    #[test]
    fn test_execute_updates_global_states() {
        let queue = queue();
        let resource = Arc::new(Resource::dummy(ResourceDescriptor::buffer(64)));

        let mut ctx = queue.get_command_context().unwrap();
        ctx.transition_barrier(&resource, ResourceStates::COPY_DEST, Subresource::All)
            .unwrap();
        let fence = queue.execute_command_context(ctx).unwrap();

        assert!(queue.is_fence_complete(fence).unwrap());
        assert_eq!(
            queue.resource_state(&resource).unwrap().uniform_state(),
            Some(ResourceStates::COPY_DEST)
        );
        assert!(queue.backend().violations().is_empty());
    }

    #[test]
    fn test_pending_list_skipped_without_corrections() {
        let queue = queue();

        let ctx = queue.get_command_context().unwrap();
        queue.execute_command_context(ctx).unwrap();

        let executed = queue.backend().executed_lists();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].commands.is_empty());
    }

    #[test]
    fn test_context_reuse() {
        let queue = queue();

        let ctx = queue.get_command_context().unwrap();
        let label = ctx.label().map(str::to_owned);
        queue.execute_command_context(ctx).unwrap();
        assert_eq!(queue.pooled_context_count(), 1);

        let reused = queue.get_command_context().unwrap();
        assert_eq!(reused.label().map(str::to_owned), label);
        assert!(!reused.is_closed());
        assert_eq!(queue.pooled_context_count(), 0);
    }

    #[test]
    fn test_pool_limit() {
        let queue = CommandQueue::new(
            Arc::new(DummyBackend::new()),
            CommandQueueDescriptor::new().with_max_pooled_contexts(1),
        );

        let contexts = vec![
            queue.get_command_context().unwrap(),
            queue.get_command_context().unwrap(),
        ];
        queue.execute_command_contexts(contexts).unwrap();

        assert_eq!(queue.pooled_context_count(), 1);
    }

    #[test]
    fn test_register_and_unregister() {
        let queue = queue();
        let resource = Resource::dummy(ResourceDescriptor::buffer(64));

        queue.register_resource(&resource, ResourceStates::GENERIC_READ);
        assert_eq!(queue.tracked_resource_count(), 1);

        queue.unregister_resource(&resource);
        assert!(queue.resource_state(&resource).is_none());

        queue.register_resource(&resource, ResourceStates::COMMON);
        queue.reset_resource_states();
        assert_eq!(queue.tracked_resource_count(), 0);
    }

    #[test]
    fn test_flush() {
        let queue = queue();
        queue.flush().unwrap();
        assert!(queue.is_fence_complete(1).unwrap());
    }
}
