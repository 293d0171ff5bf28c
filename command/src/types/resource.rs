//! Resource identity handles.
//!
//! A [`Resource`] is what the state trackers observe: a process-unique
//! [`ResourceId`], a subresource count and the backend handle used when a
//! barrier record is translated for the platform. Creating and freeing the
//! underlying allocation is the job of the allocation layer; this type never
//! owns GPU memory.

use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "vulkan-backend")]
use ash::vk;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a resource within the state trackers.
///
/// Identifiers come from a process-wide counter and are never reused, so a
/// tracker entry can not be confused with a later resource that happens to
/// occupy the same memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a resource ID from a raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Selects which subresources a transition applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Subresource {
    /// Every subresource of the resource.
    #[default]
    All,
    /// A single subresource, see [`Resource::subresource_index`].
    Index(u32),
}

impl Subresource {
    /// Get the index, or `None` for [`Subresource::All`].
    pub fn index(self) -> Option<u32> {
        match self {
            Self::All => None,
            Self::Index(index) => Some(index),
        }
    }
}

impl From<u32> for Subresource {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

/// Kind of GPU allocation a resource refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Linear buffer of `size` bytes.
    Buffer {
        /// Size in bytes.
        size: u64,
    },
    /// Texture with mip chain and array layers.
    Texture {
        /// Width in texels.
        width: u32,
        /// Height in texels.
        height: u32,
        /// Depth in texels (1 for 2D textures).
        depth: u32,
        /// Number of mip levels.
        mip_levels: u32,
        /// Number of array layers.
        array_layers: u32,
        /// Number of format planes (2 for depth + stencil).
        planes: u32,
    },
}

/// Descriptor for a tracked resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    /// Debug label for the resource.
    pub label: Option<String>,
    /// Allocation kind.
    pub kind: ResourceKind,
}

impl ResourceDescriptor {
    /// Create a buffer descriptor.
    pub fn buffer(size: u64) -> Self {
        Self {
            label: None,
            kind: ResourceKind::Buffer { size },
        }
    }

    /// Create a 2D texture descriptor with a single mip level and layer.
    pub fn texture_2d(width: u32, height: u32) -> Self {
        Self {
            label: None,
            kind: ResourceKind::Texture {
                width,
                height,
                depth: 1,
                mip_levels: 1,
                array_layers: 1,
                planes: 1,
            },
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the number of mip levels. Ignored for buffers.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        if let ResourceKind::Texture { mip_levels, .. } = &mut self.kind {
            *mip_levels = count;
        }
        self
    }

    /// Set the number of array layers. Ignored for buffers.
    pub fn with_array_layers(mut self, count: u32) -> Self {
        if let ResourceKind::Texture { array_layers, .. } = &mut self.kind {
            *array_layers = count;
        }
        self
    }

    /// Set the number of format planes. Ignored for buffers.
    pub fn with_planes(mut self, count: u32) -> Self {
        if let ResourceKind::Texture { planes, .. } = &mut self.kind {
            *planes = count;
        }
        self
    }

    /// Number of individually addressable subresources.
    ///
    /// `0` if the count does not fit in a `u32`; [`Resource::new`] rejects
    /// such descriptors.
    pub fn subresource_count(&self) -> u32 {
        self.checked_subresource_count().unwrap_or(0)
    }

    /// Number of individually addressable subresources, `None` on overflow.
    pub fn checked_subresource_count(&self) -> Option<u32> {
        match self.kind {
            ResourceKind::Buffer { .. } => Some(1),
            ResourceKind::Texture {
                mip_levels,
                array_layers,
                planes,
                ..
            } => mip_levels
                .checked_mul(array_layers)
                .and_then(|count| count.checked_mul(planes)),
        }
    }
}

/// Backend handle behind a resource.
#[derive(Clone)]
pub enum GpuResource {
    /// Dummy backend (no GPU allocation)
    Dummy,
    /// Vulkan image
    #[cfg(feature = "vulkan-backend")]
    VulkanImage {
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
    },
    /// Vulkan buffer
    #[cfg(feature = "vulkan-backend")]
    VulkanBuffer { buffer: vk::Buffer },
}

impl std::fmt::Debug for GpuResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "GpuResource::Dummy"),
            #[cfg(feature = "vulkan-backend")]
            Self::VulkanImage { image, aspect_mask } => f
                .debug_struct("GpuResource::VulkanImage")
                .field("image", image)
                .field("aspect_mask", aspect_mask)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::VulkanBuffer { buffer } => f
                .debug_struct("GpuResource::VulkanBuffer")
                .field("buffer", buffer)
                .finish(),
        }
    }
}

/// Identity handle of a GPU allocation observed by the state trackers.
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    descriptor: ResourceDescriptor,
    gpu: GpuResource,
}

impl Resource {
    /// Create a resource handle for an allocation made by the allocation layer.
    pub fn new(descriptor: ResourceDescriptor, gpu: GpuResource) -> Self {
        assert!(
            descriptor
                .checked_subresource_count()
                .is_some_and(|count| count > 0),
            "resource {:?} must have at least one and at most {} subresources",
            descriptor.label,
            u32::MAX
        );
        Self {
            id: ResourceId::next(),
            descriptor,
            gpu,
        }
    }

    /// Create a resource without a GPU allocation, for the dummy backend.
    pub fn dummy(descriptor: ResourceDescriptor) -> Self {
        Self::new(descriptor, GpuResource::Dummy)
    }

    /// Get the tracker key of this resource.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Get the debug label.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Get the descriptor.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Get the backend handle.
    pub fn gpu_handle(&self) -> &GpuResource {
        &self.gpu
    }

    /// Number of individually addressable subresources.
    pub fn subresource_count(&self) -> u32 {
        self.descriptor.subresource_count()
    }

    /// Number of mip levels (1 for buffers).
    pub fn mip_levels(&self) -> u32 {
        match self.descriptor.kind {
            ResourceKind::Buffer { .. } => 1,
            ResourceKind::Texture { mip_levels, .. } => mip_levels,
        }
    }

    /// Number of array layers (1 for buffers).
    pub fn array_layers(&self) -> u32 {
        match self.descriptor.kind {
            ResourceKind::Buffer { .. } => 1,
            ResourceKind::Texture { array_layers, .. } => array_layers,
        }
    }

    /// Check if this resource is a buffer.
    pub fn is_buffer(&self) -> bool {
        matches!(self.descriptor.kind, ResourceKind::Buffer { .. })
    }

    /// Compute the subresource index of a mip level, array layer and plane.
    ///
    /// # Panics
    ///
    /// Panics if any component is out of range.
    pub fn subresource_index(&self, mip_level: u32, array_layer: u32, plane: u32) -> u32 {
        let mips = self.mip_levels();
        let layers = self.array_layers();
        let index = mip_level + array_layer * mips + plane * mips * layers;
        assert!(
            mip_level < mips && array_layer < layers && index < self.subresource_count(),
            "subresource (mip {mip_level}, layer {array_layer}, plane {plane}) out of range for {:?}",
            self.label()
        );
        index
    }

    /// Split a subresource index into `(mip_level, array_layer, plane)`.
    pub fn subresource_components(&self, index: u32) -> (u32, u32, u32) {
        let mips = self.mip_levels();
        let layers = self.array_layers();
        (index % mips, (index / mips) % layers, index / (mips * layers))
    }

    /// Panic unless `subresource` addresses a subresource of this resource.
    pub(crate) fn validate_subresource(&self, subresource: Subresource) {
        if let Subresource::Index(index) = subresource {
            assert!(
                index < self.subresource_count(),
                "subresource index {index} out of range for {:?} ({} subresources)",
                self.label(),
                self.subresource_count()
            );
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Resource {}

static_assertions::assert_impl_all!(Resource: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_resource_ids_are_unique() {
        let a = Resource::dummy(ResourceDescriptor::buffer(64));
        let b = Resource::dummy(ResourceDescriptor::buffer(64));
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_subresource_count() {
        let buffer = Resource::dummy(ResourceDescriptor::buffer(256));
        assert_eq!(buffer.subresource_count(), 1);

        let texture = Resource::dummy(
            ResourceDescriptor::texture_2d(256, 256)
                .with_mip_levels(4)
                .with_array_layers(6),
        );
        assert_eq!(texture.subresource_count(), 24);

        let depth = Resource::dummy(ResourceDescriptor::texture_2d(64, 64).with_planes(2));
        assert_eq!(depth.subresource_count(), 2);
    }

    #[rstest]
    #[case::mips(u32::MAX, 2, 1)]
    #[case::planes(1 << 16, 1 << 16, 2)]
    fn test_subresource_count_overflow(
        #[case] mips: u32,
        #[case] layers: u32,
        #[case] planes: u32,
    ) {
        let descriptor = ResourceDescriptor::texture_2d(1, 1)
            .with_mip_levels(mips)
            .with_array_layers(layers)
            .with_planes(planes);
        assert_eq!(descriptor.checked_subresource_count(), None);
        assert_eq!(descriptor.subresource_count(), 0);
    }

    #[test]
    #[should_panic(expected = "at most")]
    fn test_overflowing_resource_panics() {
        Resource::dummy(
            ResourceDescriptor::texture_2d(1, 1)
                .with_mip_levels(1 << 16)
                .with_array_layers(1 << 16),
        );
    }

    #[test]
    fn test_subresource_index_roundtrip() {
        let texture = Resource::dummy(
            ResourceDescriptor::texture_2d(128, 128)
                .with_mip_levels(3)
                .with_array_layers(2),
        );
        let index = texture.subresource_index(2, 1, 0);
        assert_eq!(index, 5);
        assert_eq!(texture.subresource_components(index), (2, 1, 0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_subresource_index_out_of_range() {
        let texture = Resource::dummy(ResourceDescriptor::texture_2d(16, 16).with_mip_levels(2));
        texture.subresource_index(2, 0, 0);
    }

    #[test]
    fn test_subresource_from_index() {
        assert_eq!(Subresource::from(3), Subresource::Index(3));
        assert_eq!(Subresource::All.index(), None);
        assert_eq!(Subresource::Index(7).index(), Some(7));
    }
}
