//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. Command lists record
//! what they are asked to do, and execution replays every barrier against a
//! simulated per-subresource state table, the way a driver with validation
//! layers would. Any transition whose before state differs from what the
//! "GPU" last saw, and any copy or resolve issued against a resource in the
//! wrong state, is kept as a [`BarrierViolation`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::types::{Resource, ResourceBarrier, ResourceId, ResourceStates, Subresource};

use super::{CommandListType, DrawArgs, DrawIndexedArgs, GpuBackend, GpuCommandList};

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

/// A command recorded into a [`DummyCommandList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    /// One batched barrier call.
    Barriers(Vec<ResourceBarrier>),
    Draw(DrawArgs),
    DrawIndexed(DrawIndexedArgs),
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    CopyResource {
        dst: ResourceId,
        src: ResourceId,
    },
    CopyBufferRegion {
        dst: ResourceId,
        dst_offset: u64,
        src: ResourceId,
        src_offset: u64,
        size: u64,
    },
    ResolveSubresource {
        dst: ResourceId,
        dst_subresource: u32,
        src: ResourceId,
        src_subresource: u32,
    },
    /// Opaque work recorded by an external collaborator
    /// (e.g. an acceleration structure builder).
    Marker(String),
}

/// Command list of the dummy backend.
#[derive(Debug)]
pub struct DummyCommandList {
    id: u64,
    list_type: CommandListType,
    commands: Vec<RecordedCommand>,
    closed: bool,
    reset_count: u32,
}

impl DummyCommandList {
    /// Create an open, empty command list.
    pub fn new(list_type: CommandListType) -> Self {
        Self {
            id: NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed),
            list_type,
            commands: Vec::new(),
            closed: false,
            reset_count: 0,
        }
    }

    /// Unique ID of this list.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Commands recorded since the last reset.
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// All barriers recorded since the last reset, in recording order.
    pub fn barriers(&self) -> impl Iterator<Item = &ResourceBarrier> {
        self.commands.iter().flat_map(|command| match command {
            RecordedCommand::Barriers(barriers) => barriers.as_slice(),
            _ => &[][..],
        })
    }

    /// Number of batched barrier calls recorded since the last reset.
    pub fn barrier_call_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, RecordedCommand::Barriers(_)))
            .count()
    }

    /// How many times the list has been reset.
    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }

    /// Record opaque work.
    pub fn insert_marker(&mut self, label: impl Into<String>) -> Result<(), GraphicsError> {
        self.record(RecordedCommand::Marker(label.into()))
    }

    fn record(&mut self, command: RecordedCommand) -> Result<(), GraphicsError> {
        if self.closed {
            return Err(GraphicsError::InvalidOperation(format!(
                "recording {command:?} into closed command list {}",
                self.id
            )));
        }
        self.commands.push(command);
        Ok(())
    }
}

impl GpuCommandList for DummyCommandList {
    fn list_type(&self) -> CommandListType {
        self.list_type
    }

    fn reset(&mut self) -> Result<(), GraphicsError> {
        self.commands.clear();
        self.closed = false;
        self.reset_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), GraphicsError> {
        if self.closed {
            return Err(GraphicsError::InvalidOperation(format!(
                "command list {} is already closed",
                self.id
            )));
        }
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyCommandList {}: {} barrier(s)",
            self.id,
            barriers.len()
        );
        self.record(RecordedCommand::Barriers(barriers.to_vec()))
    }

    fn draw(&mut self, args: DrawArgs) -> Result<(), GraphicsError> {
        self.record(RecordedCommand::Draw(args))
    }

    fn draw_indexed(&mut self, args: DrawIndexedArgs) -> Result<(), GraphicsError> {
        self.record(RecordedCommand::DrawIndexed(args))
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), GraphicsError> {
        self.record(RecordedCommand::Dispatch { x, y, z })
    }

    fn copy_resource(&mut self, dst: &Resource, src: &Resource) -> Result<(), GraphicsError> {
        self.record(RecordedCommand::CopyResource {
            dst: dst.id(),
            src: src.id(),
        })
    }

    fn copy_buffer_region(
        &mut self,
        dst: &Resource,
        dst_offset: u64,
        src: &Resource,
        src_offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        self.record(RecordedCommand::CopyBufferRegion {
            dst: dst.id(),
            dst_offset,
            src: src.id(),
            src_offset,
            size,
        })
    }

    fn resolve_subresource(
        &mut self,
        dst: &Resource,
        dst_subresource: u32,
        src: &Resource,
        src_subresource: u32,
    ) -> Result<(), GraphicsError> {
        self.record(RecordedCommand::ResolveSubresource {
            dst: dst.id(),
            dst_subresource,
            src: src.id(),
            src_subresource,
        })
    }
}

/// A mismatch between recorded commands and the simulated GPU state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierViolation {
    /// A transition claimed a before state the subresource was not in.
    StateMismatch {
        resource: ResourceId,
        subresource: u32,
        claimed_before: ResourceStates,
        actual: ResourceStates,
    },
    /// A GPU operation used a subresource in the wrong state.
    UsageMismatch {
        command: &'static str,
        resource: ResourceId,
        subresource: u32,
        required: ResourceStates,
        actual: ResourceStates,
    },
}

/// A command list as it was executed.
#[derive(Debug, Clone)]
pub struct ExecutedList {
    /// Index of the `execute_command_lists` call this list was part of.
    pub batch: usize,
    /// ID of the executed [`DummyCommandList`].
    pub list_id: u64,
    /// Snapshot of the recorded commands.
    pub commands: Vec<RecordedCommand>,
}

#[derive(Debug, Default)]
struct DummyGpuState {
    /// Per-subresource state of every resource the GPU has seen.
    resource_states: HashMap<ResourceId, Vec<ResourceStates>>,
    /// Initial states for resources not created in `ResourceStates::INITIAL`.
    initial_states: HashMap<ResourceId, ResourceStates>,
    violations: Vec<BarrierViolation>,
    executed: Vec<ExecutedList>,
    batches: usize,
    fence_values: HashMap<CommandListType, u64>,
}

impl DummyGpuState {
    fn states_mut(&mut self, resource: &Resource) -> &mut Vec<ResourceStates> {
        let initial = self
            .initial_states
            .get(&resource.id())
            .copied()
            .unwrap_or(ResourceStates::INITIAL);
        self.resource_states
            .entry(resource.id())
            .or_insert_with(|| vec![initial; resource.subresource_count() as usize])
    }

    fn apply_barrier(&mut self, barrier: &ResourceBarrier) {
        let ResourceBarrier::Transition(transition) = barrier else {
            return;
        };
        let id = transition.resource.id();
        let states = self.states_mut(&transition.resource);
        let range = match transition.subresource {
            Subresource::All => 0..states.len(),
            Subresource::Index(index) => index as usize..index as usize + 1,
        };

        let mut mismatches = Vec::new();
        for index in range {
            if states[index] != transition.state_before {
                mismatches.push(BarrierViolation::StateMismatch {
                    resource: id,
                    subresource: index as u32,
                    claimed_before: transition.state_before,
                    actual: states[index],
                });
            }
            states[index] = transition.state_after;
        }

        for violation in &mismatches {
            log::error!("DummyBackend: invalid transition: {violation:?}");
        }
        self.violations.extend(mismatches);
    }

    fn check_usage(
        &mut self,
        command: &'static str,
        resource: ResourceId,
        subresource: Option<u32>,
        required: ResourceStates,
    ) {
        // Resources the GPU has never seen are in their initial state.
        let initial = self
            .initial_states
            .get(&resource)
            .copied()
            .unwrap_or(ResourceStates::INITIAL);
        let actual: Vec<(u32, ResourceStates)> = match self.resource_states.get(&resource) {
            Some(states) => states
                .iter()
                .copied()
                .enumerate()
                .map(|(index, state)| (index as u32, state))
                .filter(|(index, _)| subresource.is_none_or(|wanted| wanted == *index))
                .collect(),
            None => vec![(subresource.unwrap_or(0), initial)],
        };

        for (index, state) in actual {
            if !state.contains(required) {
                let violation = BarrierViolation::UsageMismatch {
                    command,
                    resource,
                    subresource: index,
                    required,
                    actual: state,
                };
                log::error!("DummyBackend: invalid usage: {violation:?}");
                self.violations.push(violation);
            }
        }
    }

    fn execute(&mut self, list: &DummyCommandList) {
        for command in list.commands() {
            match command {
                RecordedCommand::Barriers(barriers) => {
                    for barrier in barriers {
                        self.apply_barrier(barrier);
                    }
                }
                RecordedCommand::CopyResource { dst, src } => {
                    self.check_usage("copy_resource", *dst, None, ResourceStates::COPY_DEST);
                    self.check_usage("copy_resource", *src, None, ResourceStates::COPY_SOURCE);
                }
                RecordedCommand::CopyBufferRegion { dst, src, .. } => {
                    self.check_usage("copy_buffer_region", *dst, None, ResourceStates::COPY_DEST);
                    self.check_usage(
                        "copy_buffer_region",
                        *src,
                        None,
                        ResourceStates::COPY_SOURCE,
                    );
                }
                RecordedCommand::ResolveSubresource {
                    dst,
                    dst_subresource,
                    src,
                    src_subresource,
                } => {
                    self.check_usage(
                        "resolve_subresource",
                        *dst,
                        Some(*dst_subresource),
                        ResourceStates::RESOLVE_DEST,
                    );
                    self.check_usage(
                        "resolve_subresource",
                        *src,
                        Some(*src_subresource),
                        ResourceStates::RESOLVE_SOURCE,
                    );
                }
                RecordedCommand::Draw(_)
                | RecordedCommand::DrawIndexed(_)
                | RecordedCommand::Dispatch { .. }
                | RecordedCommand::Marker(_) => {}
            }
        }
    }
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    state: Mutex<DummyGpuState>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the state `resource` was created in on the simulated GPU.
    ///
    /// Resources without a declared state start in [`ResourceStates::INITIAL`].
    pub fn set_initial_state(&self, resource: &Resource, state: ResourceStates) {
        let mut gpu = self.state.lock();
        gpu.initial_states.insert(resource.id(), state);
        gpu.resource_states.remove(&resource.id());
    }

    /// State of a subresource as the simulated GPU sees it right now.
    ///
    /// # Panics
    ///
    /// Panics if `subresource` is out of range for `resource`.
    pub fn gpu_state(&self, resource: &Resource, subresource: u32) -> ResourceStates {
        resource.validate_subresource(Subresource::Index(subresource));
        let mut gpu = self.state.lock();
        gpu.states_mut(resource)[subresource as usize]
    }

    /// Every violation found so far.
    pub fn violations(&self) -> Vec<BarrierViolation> {
        self.state.lock().violations.clone()
    }

    /// Every executed command list so far, in execution order.
    pub fn executed_lists(&self) -> Vec<ExecutedList> {
        self.state.lock().executed.clone()
    }

    /// Number of `execute_command_lists` calls so far.
    pub fn execution_count(&self) -> usize {
        self.state.lock().batches
    }
}

impl GpuBackend for DummyBackend {
    type CommandList = DummyCommandList;

    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_command_list(
        &self,
        list_type: CommandListType,
    ) -> Result<DummyCommandList, GraphicsError> {
        let list = DummyCommandList::new(list_type);
        log::trace!(
            "DummyBackend: created {:?} command list {}",
            list_type,
            list.id()
        );
        Ok(list)
    }

    fn execute_command_lists(
        &self,
        list_type: CommandListType,
        lists: &[&DummyCommandList],
    ) -> Result<(), GraphicsError> {
        if let Some(open) = lists.iter().find(|list| !list.is_closed()) {
            return Err(GraphicsError::SubmissionFailed(format!(
                "command list {} was not closed",
                open.id()
            )));
        }
        if let Some(mismatched) = lists.iter().find(|list| list.list_type() != list_type) {
            return Err(GraphicsError::SubmissionFailed(format!(
                "{:?} command list {} submitted to a {:?} queue",
                mismatched.list_type(),
                mismatched.id(),
                list_type
            )));
        }

        let mut gpu = self.state.lock();
        let batch = gpu.batches;
        gpu.batches += 1;
        log::trace!(
            "DummyBackend: executing {} command list(s) in batch {}",
            lists.len(),
            batch
        );

        for list in lists {
            gpu.execute(list);
            gpu.executed.push(ExecutedList {
                batch,
                list_id: list.id(),
                commands: list.commands().to_vec(),
            });
        }
        Ok(())
    }

    fn signal(&self, list_type: CommandListType) -> Result<u64, GraphicsError> {
        let mut gpu = self.state.lock();
        let value = gpu.fence_values.entry(list_type).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    fn completed_fence_value(&self, list_type: CommandListType) -> Result<u64, GraphicsError> {
        // Work "completes" as soon as it is submitted.
        Ok(self
            .state
            .lock()
            .fence_values
            .get(&list_type)
            .copied()
            .unwrap_or(0))
    }

    fn wait_for_fence_value(
        &self,
        list_type: CommandListType,
        value: u64,
    ) -> Result<(), GraphicsError> {
        let completed = self.completed_fence_value(list_type)?;
        if value > completed {
            return Err(GraphicsError::InvalidParameter(format!(
                "fence value {value} was never signaled (last signaled {completed})"
            )));
        }
        Ok(())
    }
}

static_assertions::assert_impl_all!(DummyBackend: Send, Sync);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::ResourceDescriptor;

    fn texture(mips: u32) -> Arc<Resource> {
        Arc::new(Resource::dummy(
            ResourceDescriptor::texture_2d(32, 32).with_mip_levels(mips),
        ))
    }

    fn closed(mut list: DummyCommandList) -> DummyCommandList {
        list.close().unwrap();
        list
    }

    #[test]
    fn test_dummy_backend_name() {
        assert_eq!(DummyBackend::new().name(), "Dummy Backend");
    }

    #[test]
    fn test_recording_into_closed_list_fails() {
        let mut list = DummyCommandList::new(CommandListType::Direct);
        list.close().unwrap();
        assert!(matches!(
            list.dispatch(1, 1, 1),
            Err(GraphicsError::InvalidOperation(_))
        ));
        assert!(list.close().is_err());

        list.reset().unwrap();
        assert!(!list.is_closed());
        assert_eq!(list.reset_count(), 1);
        list.dispatch(1, 1, 1).unwrap();
    }

    #[test]
    fn test_valid_transition_chain() {
        let backend = DummyBackend::new();
        let resource = texture(1);

        let mut list = DummyCommandList::new(CommandListType::Direct);
        list.resource_barrier(&[ResourceBarrier::transition(
            Arc::clone(&resource),
            Subresource::All,
            ResourceStates::COMMON,
            ResourceStates::COPY_DEST,
        )])
        .unwrap();
        list.resource_barrier(&[ResourceBarrier::transition(
            Arc::clone(&resource),
            Subresource::All,
            ResourceStates::COPY_DEST,
            ResourceStates::PIXEL_SHADER_RESOURCE,
        )])
        .unwrap();
        let list = closed(list);

        backend
            .execute_command_lists(CommandListType::Direct, &[&list])
            .unwrap();

        assert!(backend.violations().is_empty());
        assert_eq!(
            backend.gpu_state(&resource, 0),
            ResourceStates::PIXEL_SHADER_RESOURCE
        );
        assert_eq!(backend.executed_lists().len(), 1);
    }

    #[test]
    fn test_wrong_before_state_is_reported() {
        let backend = DummyBackend::new();
        let resource = texture(2);
        backend.set_initial_state(&resource, ResourceStates::COPY_DEST);

        let mut list = DummyCommandList::new(CommandListType::Direct);
        list.resource_barrier(&[ResourceBarrier::transition(
            Arc::clone(&resource),
            Subresource::Index(1),
            ResourceStates::COMMON,
            ResourceStates::RENDER_TARGET,
        )])
        .unwrap();
        let list = closed(list);

        backend
            .execute_command_lists(CommandListType::Direct, &[&list])
            .unwrap();

        assert_eq!(
            backend.violations(),
            vec![BarrierViolation::StateMismatch {
                resource: resource.id(),
                subresource: 1,
                claimed_before: ResourceStates::COMMON,
                actual: ResourceStates::COPY_DEST,
            }]
        );
        assert_eq!(backend.gpu_state(&resource, 0), ResourceStates::COPY_DEST);
        assert_eq!(backend.gpu_state(&resource, 1), ResourceStates::RENDER_TARGET);
    }

    #[test]
    fn test_copy_without_transition_is_reported() {
        let backend = DummyBackend::new();
        let dst = texture(1);
        let src = texture(1);

        let mut list = DummyCommandList::new(CommandListType::Direct);
        list.copy_resource(&dst, &src).unwrap();
        let list = closed(list);

        backend
            .execute_command_lists(CommandListType::Direct, &[&list])
            .unwrap();

        assert_eq!(backend.violations().len(), 2);
    }

    #[test]
    fn test_open_list_is_rejected() {
        let backend = DummyBackend::new();
        let list = DummyCommandList::new(CommandListType::Direct);
        assert!(matches!(
            backend.execute_command_lists(CommandListType::Direct, &[&list]),
            Err(GraphicsError::SubmissionFailed(_))
        ));
    }

    #[test]
    fn test_fence_values() {
        let backend = DummyBackend::new();
        assert_eq!(backend.completed_fence_value(CommandListType::Direct).unwrap(), 0);

        let first = backend.signal(CommandListType::Direct).unwrap();
        let second = backend.signal(CommandListType::Direct).unwrap();
        assert_eq!((first, second), (1, 2));
        assert_eq!(backend.completed_fence_value(CommandListType::Copy).unwrap(), 0);

        backend
            .wait_for_fence_value(CommandListType::Direct, 2)
            .unwrap();
        assert!(
            backend
                .wait_for_fence_value(CommandListType::Direct, 3)
                .is_err()
        );
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_gpu_state_out_of_range_panics() {
        let backend = DummyBackend::new();
        let texture = Resource::dummy(ResourceDescriptor::texture_2d(4, 4).with_mip_levels(2));
        backend.gpu_state(&texture, 2);
    }
}
