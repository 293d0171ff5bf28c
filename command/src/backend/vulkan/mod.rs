//! Native Vulkan backend implementation using ash.
//!
//! The backend wraps an externally created `ash::Device` (Vulkan 1.2 with
//! timeline semaphores enabled) and the queues it should submit to. Barrier
//! records are translated into a single `vkCmdPipelineBarrier` per flush, and
//! fence values are the counter of one timeline semaphore per queue.

mod command;
pub(crate) mod conversion;

use std::collections::HashMap;

use ash::vk;
use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::profiling::profile_scope;

use super::{CommandListType, GpuBackend, GpuCommandList};

pub use command::VulkanCommandList;

/// A device queue with its timeline fence.
struct VulkanQueue {
    family_index: u32,
    timeline: vk::Semaphore,
    /// Queue handle and last signaled value. Queue access must be externally
    /// synchronized, so both live under one lock.
    submit: Mutex<(vk::Queue, u64)>,
}

/// Native Vulkan backend.
pub struct VulkanBackend {
    device: ash::Device,
    queues: HashMap<CommandListType, VulkanQueue>,
}

impl VulkanBackend {
    /// Create a backend without queues on an existing device.
    pub fn from_raw(device: ash::Device) -> Self {
        Self {
            device,
            queues: HashMap::new(),
        }
    }

    /// Register the queue that executes lists of `list_type`.
    pub fn with_queue(
        mut self,
        list_type: CommandListType,
        queue: vk::Queue,
        family_index: u32,
    ) -> Result<Self, GraphicsError> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let semaphore_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let timeline = unsafe { self.device.create_semaphore(&semaphore_info, None) }.map_err(
            |e| {
                GraphicsError::InitializationFailed(format!(
                    "Failed to create timeline semaphore: {:?}",
                    e
                ))
            },
        )?;

        log::info!(
            "Vulkan backend: {:?} queue from family {}",
            list_type,
            family_index
        );

        if let Some(previous) = self.queues.insert(
            list_type,
            VulkanQueue {
                family_index,
                timeline,
                submit: Mutex::new((queue, 0)),
            },
        ) {
            unsafe { self.device.destroy_semaphore(previous.timeline, None) };
        }
        Ok(self)
    }

    /// Get the device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    fn queue(&self, list_type: CommandListType) -> Result<&VulkanQueue, GraphicsError> {
        self.queues.get(&list_type).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("no {:?} queue registered", list_type))
        })
    }
}

impl GpuBackend for VulkanBackend {
    type CommandList = VulkanCommandList;

    fn name(&self) -> &'static str {
        "Vulkan Backend"
    }

    fn create_command_list(
        &self,
        list_type: CommandListType,
    ) -> Result<VulkanCommandList, GraphicsError> {
        let queue = self.queue(list_type)?;
        VulkanCommandList::new(self.device.clone(), queue.family_index, list_type)
    }

    fn execute_command_lists(
        &self,
        list_type: CommandListType,
        lists: &[&VulkanCommandList],
    ) -> Result<(), GraphicsError> {
        if let Some(open) = lists.iter().find(|list| !list.is_closed()) {
            return Err(GraphicsError::SubmissionFailed(format!(
                "command list {:?} was not closed",
                open.raw()
            )));
        }

        let queue = self.queue(list_type)?;
        let command_buffers: Vec<vk::CommandBuffer> = lists.iter().map(|list| list.raw()).collect();
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        let submit = queue.submit.lock();
        profile_scope!("queue_submit");
        unsafe {
            self.device
                .queue_submit(submit.0, &[submit_info], vk::Fence::null())
        }
        .map_err(|e| {
            GraphicsError::SubmissionFailed(format!("Failed to submit command buffers: {:?}", e))
        })
    }

    fn signal(&self, list_type: CommandListType) -> Result<u64, GraphicsError> {
        let queue = self.queue(list_type)?;
        let mut submit = queue.submit.lock();
        let value = submit.1 + 1;

        let signal_values = [value];
        let signal_semaphores = [queue.timeline];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::default()
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        unsafe {
            self.device
                .queue_submit(submit.0, &[submit_info], vk::Fence::null())
        }
        .map_err(|e| GraphicsError::SubmissionFailed(format!("Failed to signal queue: {:?}", e)))?;

        submit.1 = value;
        Ok(value)
    }

    fn completed_fence_value(&self, list_type: CommandListType) -> Result<u64, GraphicsError> {
        let queue = self.queue(list_type)?;
        unsafe { self.device.get_semaphore_counter_value(queue.timeline) }.map_err(GraphicsError::from)
    }

    fn wait_for_fence_value(
        &self,
        list_type: CommandListType,
        value: u64,
    ) -> Result<(), GraphicsError> {
        let queue = self.queue(list_type)?;
        let semaphores = [queue.timeline];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);

        unsafe { self.device.wait_semaphores(&wait_info, u64::MAX) }.map_err(GraphicsError::from)
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        for queue in self.queues.values() {
            let submit = queue.submit.lock();
            unsafe {
                if let Err(e) = self.device.queue_wait_idle(submit.0) {
                    log::error!("Failed to wait for queue idle: {:?}", e);
                }
                self.device.destroy_semaphore(queue.timeline, None);
            }
        }
    }
}

static_assertions::assert_impl_all!(VulkanBackend: Send, Sync);
static_assertions::assert_impl_all!(VulkanCommandList: Send);
