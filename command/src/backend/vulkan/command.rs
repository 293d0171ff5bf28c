//! Vulkan command pool and buffer management.
//!
//! Every [`VulkanCommandList`] owns one command pool with a single primary
//! command buffer. Resetting the list resets the whole pool, which is the
//! Vulkan equivalent of handing the list a fresh allocator.

use ash::vk;

use crate::backend::{CommandListType, DrawArgs, DrawIndexedArgs, GpuCommandList};
use crate::error::GraphicsError;
use crate::types::{GpuResource, Resource, ResourceBarrier, ResourceKind};

use super::conversion::{
    convert_access_mask, convert_image_layout, convert_pipeline_stages,
    convert_subresource_range, restrict_pipeline_stages,
};

/// Create a command pool whose buffers are reset together.
pub fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> Result<vk::CommandPool, GraphicsError> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family_index)
        .flags(vk::CommandPoolCreateFlags::TRANSIENT);

    let pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create command pool: {:?}", e))
    })?;

    Ok(pool)
}

/// Vulkan command list: a command pool and one primary command buffer.
pub struct VulkanCommandList {
    device: ash::Device,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    list_type: CommandListType,
    closed: bool,
}

impl VulkanCommandList {
    /// Create a command list open for recording.
    pub(super) fn new(
        device: ash::Device,
        queue_family_index: u32,
        list_type: CommandListType,
    ) -> Result<Self, GraphicsError> {
        let pool = create_command_pool(&device, queue_family_index)?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers,
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(GraphicsError::InitializationFailed(format!(
                    "Failed to allocate command buffer: {:?}",
                    e
                )));
            }
        };

        let list = Self {
            device,
            pool,
            buffer: buffers[0],
            list_type,
            closed: false,
        };
        list.begin()?;
        Ok(list)
    }

    /// Get the raw Vulkan command buffer.
    pub fn raw(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Get the device this list records for.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    fn begin(&self) -> Result<(), GraphicsError> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe { self.device.begin_command_buffer(self.buffer, &begin_info) }.map_err(|e| {
            GraphicsError::CommandRecordingFailed(format!("Failed to begin command buffer: {:?}", e))
        })
    }

    fn ensure_recording(&self) -> Result<(), GraphicsError> {
        if self.closed {
            return Err(GraphicsError::InvalidOperation(
                "recording into a closed Vulkan command list".to_string(),
            ));
        }
        Ok(())
    }
}

fn image_of(resource: &Resource) -> Result<(vk::Image, vk::ImageAspectFlags), GraphicsError> {
    match resource.gpu_handle() {
        GpuResource::VulkanImage { image, aspect_mask } => Ok((*image, *aspect_mask)),
        other => Err(GraphicsError::InvalidParameter(format!(
            "resource {:?} is not a Vulkan image: {:?}",
            resource.label(),
            other
        ))),
    }
}

fn buffer_of(resource: &Resource) -> Result<vk::Buffer, GraphicsError> {
    match resource.gpu_handle() {
        GpuResource::VulkanBuffer { buffer } => Ok(*buffer),
        other => Err(GraphicsError::InvalidParameter(format!(
            "resource {:?} is not a Vulkan buffer: {:?}",
            resource.label(),
            other
        ))),
    }
}

/// Extent of `mip_level` of a texture resource.
fn mip_extent(resource: &Resource, mip_level: u32) -> vk::Extent3D {
    match resource.descriptor().kind {
        ResourceKind::Texture {
            width,
            height,
            depth,
            ..
        } => vk::Extent3D {
            width: (width >> mip_level).max(1),
            height: (height >> mip_level).max(1),
            depth: (depth >> mip_level).max(1),
        },
        ResourceKind::Buffer { .. } => vk::Extent3D::default(),
    }
}

fn subresource_layers(
    resource: &Resource,
    index: u32,
    aspect_mask: vk::ImageAspectFlags,
) -> vk::ImageSubresourceLayers {
    let range = convert_subresource_range(resource, index.into(), aspect_mask);
    vk::ImageSubresourceLayers {
        aspect_mask: range.aspect_mask,
        mip_level: range.base_mip_level,
        base_array_layer: range.base_array_layer,
        layer_count: 1,
    }
}

impl GpuCommandList for VulkanCommandList {
    fn list_type(&self) -> CommandListType {
        self.list_type
    }

    fn reset(&mut self) -> Result<(), GraphicsError> {
        unsafe {
            self.device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
        }
        .map_err(|e| {
            GraphicsError::CommandRecordingFailed(format!("Failed to reset command pool: {:?}", e))
        })?;
        self.closed = false;
        self.begin()
    }

    fn close(&mut self) -> Result<(), GraphicsError> {
        self.ensure_recording()?;
        unsafe { self.device.end_command_buffer(self.buffer) }.map_err(|e| {
            GraphicsError::CommandRecordingFailed(format!("Failed to end command buffer: {:?}", e))
        })?;
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]) -> Result<(), GraphicsError> {
        self.ensure_recording()?;

        let mut memory_barriers = Vec::new();
        let mut buffer_barriers = Vec::new();
        let mut image_barriers = Vec::new();
        let mut src_stage_mask = vk::PipelineStageFlags::empty();
        let mut dst_stage_mask = vk::PipelineStageFlags::empty();

        for barrier in barriers {
            match barrier {
                ResourceBarrier::Transition(transition) => {
                    let src_access_mask = convert_access_mask(transition.state_before);
                    let dst_access_mask = convert_access_mask(transition.state_after);
                    src_stage_mask |= convert_pipeline_stages(transition.state_before);
                    dst_stage_mask |= convert_pipeline_stages(transition.state_after);

                    match transition.resource.gpu_handle() {
                        GpuResource::VulkanImage { image, aspect_mask } => {
                            image_barriers.push(
                                vk::ImageMemoryBarrier::default()
                                    .old_layout(convert_image_layout(transition.state_before))
                                    .new_layout(convert_image_layout(transition.state_after))
                                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                    .image(*image)
                                    .subresource_range(convert_subresource_range(
                                        &transition.resource,
                                        transition.subresource,
                                        *aspect_mask,
                                    ))
                                    .src_access_mask(src_access_mask)
                                    .dst_access_mask(dst_access_mask),
                            );
                        }
                        GpuResource::VulkanBuffer { buffer } => {
                            buffer_barriers.push(
                                vk::BufferMemoryBarrier::default()
                                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                                    .buffer(*buffer)
                                    .offset(0)
                                    .size(vk::WHOLE_SIZE)
                                    .src_access_mask(src_access_mask)
                                    .dst_access_mask(dst_access_mask),
                            );
                        }
                        GpuResource::Dummy => {
                            return Err(GraphicsError::InvalidParameter(format!(
                                "resource {:?} has no Vulkan handle",
                                transition.resource.label()
                            )));
                        }
                    }
                }
                ResourceBarrier::Aliasing { .. } => {
                    memory_barriers.push(
                        vk::MemoryBarrier::default()
                            .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
                            .dst_access_mask(
                                vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                            ),
                    );
                    src_stage_mask |= vk::PipelineStageFlags::ALL_COMMANDS;
                    dst_stage_mask |= vk::PipelineStageFlags::ALL_COMMANDS;
                }
                ResourceBarrier::Uav { .. } => {
                    memory_barriers.push(
                        vk::MemoryBarrier::default()
                            .src_access_mask(
                                vk::AccessFlags::SHADER_WRITE
                                    | vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR,
                            )
                            .dst_access_mask(
                                vk::AccessFlags::SHADER_READ
                                    | vk::AccessFlags::SHADER_WRITE
                                    | vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR,
                            ),
                    );
                    let stages = vk::PipelineStageFlags::FRAGMENT_SHADER
                        | vk::PipelineStageFlags::COMPUTE_SHADER
                        | vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR
                        | vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR;
                    src_stage_mask |= stages;
                    dst_stage_mask |= stages;
                }
            }
        }

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.buffer,
                restrict_pipeline_stages(src_stage_mask, self.list_type),
                restrict_pipeline_stages(dst_stage_mask, self.list_type),
                vk::DependencyFlags::empty(),
                &memory_barriers,
                &buffer_barriers,
                &image_barriers,
            );
        }
        Ok(())
    }

    fn draw(&mut self, args: DrawArgs) -> Result<(), GraphicsError> {
        self.ensure_recording()?;
        unsafe {
            self.device.cmd_draw(
                self.buffer,
                args.vertex_count,
                args.instance_count,
                args.first_vertex,
                args.first_instance,
            );
        }
        Ok(())
    }

    fn draw_indexed(&mut self, args: DrawIndexedArgs) -> Result<(), GraphicsError> {
        self.ensure_recording()?;
        unsafe {
            self.device.cmd_draw_indexed(
                self.buffer,
                args.index_count,
                args.instance_count,
                args.first_index,
                args.base_vertex,
                args.first_instance,
            );
        }
        Ok(())
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), GraphicsError> {
        self.ensure_recording()?;
        unsafe { self.device.cmd_dispatch(self.buffer, x, y, z) };
        Ok(())
    }

    fn copy_resource(&mut self, dst: &Resource, src: &Resource) -> Result<(), GraphicsError> {
        self.ensure_recording()?;
        match (dst.descriptor().kind, src.descriptor().kind) {
            (ResourceKind::Buffer { size: dst_size }, ResourceKind::Buffer { size: src_size }) => {
                self.copy_buffer_region(dst, 0, src, 0, dst_size.min(src_size))
            }
            (ResourceKind::Texture { .. }, ResourceKind::Texture { .. }) => {
                let (dst_image, dst_aspect) = image_of(dst)?;
                let (src_image, src_aspect) = image_of(src)?;
                let regions: Vec<vk::ImageCopy> = (0..dst.mip_levels().min(src.mip_levels()))
                    .map(|mip_level| vk::ImageCopy {
                        src_subresource: vk::ImageSubresourceLayers {
                            aspect_mask: src_aspect,
                            mip_level,
                            base_array_layer: 0,
                            layer_count: src.array_layers(),
                        },
                        src_offset: vk::Offset3D::default(),
                        dst_subresource: vk::ImageSubresourceLayers {
                            aspect_mask: dst_aspect,
                            mip_level,
                            base_array_layer: 0,
                            layer_count: dst.array_layers(),
                        },
                        dst_offset: vk::Offset3D::default(),
                        extent: mip_extent(dst, mip_level),
                    })
                    .collect();

                unsafe {
                    self.device.cmd_copy_image(
                        self.buffer,
                        src_image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        dst_image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &regions,
                    );
                }
                Ok(())
            }
            _ => Err(GraphicsError::InvalidParameter(format!(
                "cannot copy between {:?} and {:?}",
                src.label(),
                dst.label()
            ))),
        }
    }

    fn copy_buffer_region(
        &mut self,
        dst: &Resource,
        dst_offset: u64,
        src: &Resource,
        src_offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        self.ensure_recording()?;
        let dst_buffer = buffer_of(dst)?;
        let src_buffer = buffer_of(src)?;
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        unsafe {
            self.device
                .cmd_copy_buffer(self.buffer, src_buffer, dst_buffer, &[region]);
        }
        Ok(())
    }

    fn resolve_subresource(
        &mut self,
        dst: &Resource,
        dst_subresource: u32,
        src: &Resource,
        src_subresource: u32,
    ) -> Result<(), GraphicsError> {
        self.ensure_recording()?;
        let (dst_image, dst_aspect) = image_of(dst)?;
        let (src_image, src_aspect) = image_of(src)?;
        let dst_layers = subresource_layers(dst, dst_subresource, dst_aspect);
        let src_layers = subresource_layers(src, src_subresource, src_aspect);

        let region = vk::ImageResolve {
            src_subresource: src_layers,
            src_offset: vk::Offset3D::default(),
            dst_subresource: dst_layers,
            dst_offset: vk::Offset3D::default(),
            extent: mip_extent(dst, dst_layers.mip_level),
        };
        unsafe {
            self.device.cmd_resolve_image(
                self.buffer,
                src_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        Ok(())
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        // Destroying the pool frees its command buffer.
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

impl std::fmt::Debug for VulkanCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandList")
            .field("buffer", &self.buffer)
            .field("list_type", &self.list_type)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
