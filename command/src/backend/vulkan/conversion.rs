//! Conversions from resource states and subresources to Vulkan barrier terms.
//!
//! [`ResourceStates::COMMON`] maps to `GENERAL`: resources handed to the
//! trackers in `COMMON` must have been moved out of `UNDEFINED` by the
//! allocation layer.

use ash::vk;

use crate::backend::CommandListType;
use crate::types::{Resource, ResourceStates, Subresource};

/// Convert a resource state to the image layout it requires.
pub fn convert_image_layout(state: ResourceStates) -> vk::ImageLayout {
    if state == ResourceStates::RENDER_TARGET {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else if state == ResourceStates::DEPTH_WRITE {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else if state.contains(ResourceStates::DEPTH_READ)
        && ResourceStates::DEPTH_READ
            .union(ResourceStates::ALL_SHADER_RESOURCE)
            .contains(state)
    {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else if state == ResourceStates::COPY_DEST || state == ResourceStates::RESOLVE_DEST {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL
    } else if state == ResourceStates::COPY_SOURCE || state == ResourceStates::RESOLVE_SOURCE {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    } else if state == ResourceStates::PRESENT {
        vk::ImageLayout::PRESENT_SRC_KHR
    } else if state == ResourceStates::SHADING_RATE_SOURCE {
        vk::ImageLayout::FRAGMENT_SHADING_RATE_ATTACHMENT_OPTIMAL_KHR
    } else if !state.is_empty() && ResourceStates::ALL_SHADER_RESOURCE.contains(state) {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    } else {
        // COMMON, UNORDERED_ACCESS and mixed read states
        vk::ImageLayout::GENERAL
    }
}

/// Convert a resource state to the memory accesses it performs.
pub fn convert_access_mask(state: ResourceStates) -> vk::AccessFlags {
    let mut result = vk::AccessFlags::empty();

    if state.contains(ResourceStates::COMMON) {
        result |= vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE;
    }
    if state.contains(ResourceStates::VERTEX_AND_CONSTANT_BUFFER) {
        result |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::UNIFORM_READ;
    }
    if state.contains(ResourceStates::INDEX_BUFFER) {
        result |= vk::AccessFlags::INDEX_READ;
    }
    if state.contains(ResourceStates::RENDER_TARGET) {
        result |=
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if state.contains(ResourceStates::UNORDERED_ACCESS) {
        result |= vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE;
    }
    if state.contains(ResourceStates::DEPTH_WRITE) {
        result |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    if state.contains(ResourceStates::DEPTH_READ) {
        result |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    if state.intersects(ResourceStates::ALL_SHADER_RESOURCE) {
        result |= vk::AccessFlags::SHADER_READ;
    }
    if state.contains(ResourceStates::STREAM_OUT) {
        result |= vk::AccessFlags::TRANSFORM_FEEDBACK_WRITE_EXT;
    }
    if state.contains(ResourceStates::INDIRECT_ARGUMENT) {
        result |= vk::AccessFlags::INDIRECT_COMMAND_READ;
    }
    if state.intersects(ResourceStates::COPY_DEST | ResourceStates::RESOLVE_DEST) {
        result |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if state.intersects(ResourceStates::COPY_SOURCE | ResourceStates::RESOLVE_SOURCE) {
        result |= vk::AccessFlags::TRANSFER_READ;
    }
    if state.contains(ResourceStates::RAYTRACING_ACCELERATION_STRUCTURE) {
        result |= vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR
            | vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR;
    }
    if state.contains(ResourceStates::SHADING_RATE_SOURCE) {
        result |= vk::AccessFlags::FRAGMENT_SHADING_RATE_ATTACHMENT_READ_KHR;
    }

    result
}

/// Convert a resource state to the pipeline stages that access it.
pub fn convert_pipeline_stages(state: ResourceStates) -> vk::PipelineStageFlags {
    let mut result = vk::PipelineStageFlags::empty();

    if state.contains(ResourceStates::COMMON) {
        result |= vk::PipelineStageFlags::ALL_COMMANDS;
    }
    if state.contains(ResourceStates::VERTEX_AND_CONSTANT_BUFFER) {
        result |= vk::PipelineStageFlags::VERTEX_INPUT
            | vk::PipelineStageFlags::VERTEX_SHADER
            | vk::PipelineStageFlags::FRAGMENT_SHADER
            | vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if state.contains(ResourceStates::INDEX_BUFFER) {
        result |= vk::PipelineStageFlags::VERTEX_INPUT;
    }
    if state.contains(ResourceStates::RENDER_TARGET) {
        result |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    }
    if state.contains(ResourceStates::UNORDERED_ACCESS) {
        result |= vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if state.intersects(ResourceStates::DEPTH_WRITE | ResourceStates::DEPTH_READ) {
        result |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    }
    if state.contains(ResourceStates::NON_PIXEL_SHADER_RESOURCE) {
        result |= vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if state.contains(ResourceStates::PIXEL_SHADER_RESOURCE) {
        result |= vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
    if state.contains(ResourceStates::STREAM_OUT) {
        result |= vk::PipelineStageFlags::TRANSFORM_FEEDBACK_EXT;
    }
    if state.contains(ResourceStates::INDIRECT_ARGUMENT) {
        result |= vk::PipelineStageFlags::DRAW_INDIRECT;
    }
    if state.intersects(
        ResourceStates::COPY_DEST
            | ResourceStates::COPY_SOURCE
            | ResourceStates::RESOLVE_DEST
            | ResourceStates::RESOLVE_SOURCE,
    ) {
        result |= vk::PipelineStageFlags::TRANSFER;
    }
    if state.contains(ResourceStates::RAYTRACING_ACCELERATION_STRUCTURE) {
        result |= vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR
            | vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR;
    }
    if state.contains(ResourceStates::SHADING_RATE_SOURCE) {
        result |= vk::PipelineStageFlags::FRAGMENT_SHADING_RATE_ATTACHMENT_KHR;
    }
    if state.contains(ResourceStates::PRESENT) {
        result |= vk::PipelineStageFlags::BOTTOM_OF_PIPE;
    }

    result
}

/// Pipeline stages a command list of `list_type` may wait on or signal.
pub fn supported_pipeline_stages(list_type: CommandListType) -> vk::PipelineStageFlags {
    let common = vk::PipelineStageFlags::TOP_OF_PIPE
        | vk::PipelineStageFlags::BOTTOM_OF_PIPE
        | vk::PipelineStageFlags::ALL_COMMANDS
        | vk::PipelineStageFlags::TRANSFER;
    match list_type {
        CommandListType::Direct => vk::PipelineStageFlags::from_raw(u32::MAX),
        CommandListType::Compute => {
            common
                | vk::PipelineStageFlags::COMPUTE_SHADER
                | vk::PipelineStageFlags::DRAW_INDIRECT
                | vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR
                | vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR
        }
        CommandListType::Copy => common,
    }
}

/// Restrict `stages` to what `list_type` supports, falling back to
/// `ALL_COMMANDS` when nothing is left.
pub fn restrict_pipeline_stages(
    stages: vk::PipelineStageFlags,
    list_type: CommandListType,
) -> vk::PipelineStageFlags {
    let supported = stages & supported_pipeline_stages(list_type);
    if supported.is_empty() {
        vk::PipelineStageFlags::ALL_COMMANDS
    } else {
        supported
    }
}

/// Aspect of one plane of an image with `aspect_mask`.
fn plane_aspect(aspect_mask: vk::ImageAspectFlags, plane: u32) -> vk::ImageAspectFlags {
    if aspect_mask.contains(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL) {
        return match plane {
            0 => vk::ImageAspectFlags::DEPTH,
            _ => vk::ImageAspectFlags::STENCIL,
        };
    }
    match plane {
        0 if aspect_mask.contains(vk::ImageAspectFlags::PLANE_0) => vk::ImageAspectFlags::PLANE_0,
        1 => vk::ImageAspectFlags::PLANE_1,
        2 => vk::ImageAspectFlags::PLANE_2,
        _ => aspect_mask,
    }
}

/// Convert a subresource selection of an image to a Vulkan subresource range.
pub fn convert_subresource_range(
    resource: &Resource,
    subresource: Subresource,
    aspect_mask: vk::ImageAspectFlags,
) -> vk::ImageSubresourceRange {
    match subresource {
        Subresource::All => vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        },
        Subresource::Index(index) => {
            let (mip_level, array_layer, plane) = resource.subresource_components(index);
            vk::ImageSubresourceRange {
                aspect_mask: plane_aspect(aspect_mask, plane),
                base_mip_level: mip_level,
                level_count: 1,
                base_array_layer: array_layer,
                layer_count: 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceDescriptor;

    #[test]
    fn test_image_layouts() {
        assert_eq!(
            convert_image_layout(ResourceStates::RENDER_TARGET),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            convert_image_layout(ResourceStates::COPY_DEST),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        );
        assert_eq!(
            convert_image_layout(ResourceStates::RESOLVE_SOURCE),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL
        );
        assert_eq!(
            convert_image_layout(ResourceStates::PIXEL_SHADER_RESOURCE),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            convert_image_layout(ResourceStates::ALL_SHADER_RESOURCE),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            convert_image_layout(ResourceStates::DEPTH_READ | ResourceStates::PIXEL_SHADER_RESOURCE),
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            convert_image_layout(ResourceStates::UNORDERED_ACCESS),
            vk::ImageLayout::GENERAL
        );
        assert_eq!(
            convert_image_layout(ResourceStates::COMMON),
            vk::ImageLayout::GENERAL
        );
        assert_eq!(
            convert_image_layout(ResourceStates::GENERIC_READ),
            vk::ImageLayout::GENERAL
        );
    }

    #[test]
    fn test_access_masks() {
        assert_eq!(
            convert_access_mask(ResourceStates::COPY_DEST),
            vk::AccessFlags::TRANSFER_WRITE
        );
        assert_eq!(
            convert_access_mask(ResourceStates::PRESENT),
            vk::AccessFlags::empty()
        );
        let read = convert_access_mask(
            ResourceStates::INDEX_BUFFER | ResourceStates::INDIRECT_ARGUMENT,
        );
        assert!(read.contains(vk::AccessFlags::INDEX_READ));
        assert!(read.contains(vk::AccessFlags::INDIRECT_COMMAND_READ));
    }

    #[test]
    fn test_pipeline_stages() {
        assert_eq!(
            convert_pipeline_stages(ResourceStates::COPY_SOURCE),
            vk::PipelineStageFlags::TRANSFER
        );
        assert_eq!(
            convert_pipeline_stages(ResourceStates::RENDER_TARGET),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(
            restrict_pipeline_stages(
                convert_pipeline_stages(ResourceStates::PIXEL_SHADER_RESOURCE),
                CommandListType::Copy
            ),
            vk::PipelineStageFlags::ALL_COMMANDS
        );
        assert_eq!(
            restrict_pipeline_stages(
                convert_pipeline_stages(ResourceStates::UNORDERED_ACCESS),
                CommandListType::Compute
            ),
            vk::PipelineStageFlags::COMPUTE_SHADER
        );
    }

    #[test]
    fn test_subresource_ranges() {
        let resource = Resource::dummy(
            ResourceDescriptor::texture_2d(64, 64)
                .with_mip_levels(4)
                .with_array_layers(2),
        );

        let all = convert_subresource_range(
            &resource,
            Subresource::All,
            vk::ImageAspectFlags::COLOR,
        );
        assert_eq!(all.level_count, vk::REMAINING_MIP_LEVELS);

        let index = resource.subresource_index(3, 1, 0);
        let one = convert_subresource_range(
            &resource,
            Subresource::Index(index),
            vk::ImageAspectFlags::COLOR,
        );
        assert_eq!(one.base_mip_level, 3);
        assert_eq!(one.base_array_layer, 1);
        assert_eq!((one.level_count, one.layer_count), (1, 1));
        assert_eq!(one.aspect_mask, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_depth_stencil_planes() {
        let aspect = vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL;
        assert_eq!(plane_aspect(aspect, 0), vk::ImageAspectFlags::DEPTH);
        assert_eq!(plane_aspect(aspect, 1), vk::ImageAspectFlags::STENCIL);
        assert_eq!(
            plane_aspect(vk::ImageAspectFlags::COLOR, 0),
            vk::ImageAspectFlags::COLOR
        );
    }
}
