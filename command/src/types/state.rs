//! Resource usage states.

use bitflags::bitflags;

bitflags! {
    /// Usage roles a resource (or one of its subresources) can be in.
    ///
    /// A valid state is either a single write role on its own, or any
    /// combination of read-only roles (e.g. pixel and non-pixel shader
    /// resource at the same time). `COMMON` and `PRESENT` are ordinary
    /// members of the state space and must appear alone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceStates: u32 {
        /// Generic state, usable for CPU access and implicit promotion.
        const COMMON = 1 << 0;
        /// Read as vertex or constant buffer.
        const VERTEX_AND_CONSTANT_BUFFER = 1 << 1;
        /// Read as index buffer.
        const INDEX_BUFFER = 1 << 2;
        /// Written as color render target.
        const RENDER_TARGET = 1 << 3;
        /// Read/written as unordered access view.
        const UNORDERED_ACCESS = 1 << 4;
        /// Written as depth/stencil target.
        const DEPTH_WRITE = 1 << 5;
        /// Read-only depth/stencil.
        const DEPTH_READ = 1 << 6;
        /// Sampled by any shader stage other than pixel.
        const NON_PIXEL_SHADER_RESOURCE = 1 << 7;
        /// Sampled by the pixel shader.
        const PIXEL_SHADER_RESOURCE = 1 << 8;
        /// Written by stream output.
        const STREAM_OUT = 1 << 9;
        /// Read as indirect draw/dispatch arguments.
        const INDIRECT_ARGUMENT = 1 << 10;
        /// Destination of a copy.
        const COPY_DEST = 1 << 11;
        /// Source of a copy.
        const COPY_SOURCE = 1 << 12;
        /// Destination of a multisample resolve.
        const RESOLVE_DEST = 1 << 13;
        /// Source of a multisample resolve.
        const RESOLVE_SOURCE = 1 << 14;
        /// Ray tracing acceleration structure storage.
        const RAYTRACING_ACCELERATION_STRUCTURE = 1 << 15;
        /// Read as variable rate shading image.
        const SHADING_RATE_SOURCE = 1 << 16;
        /// Ready to be presented to a swapchain.
        const PRESENT = 1 << 17;

        /// Sampled by any shader stage.
        const ALL_SHADER_RESOURCE =
            Self::NON_PIXEL_SHADER_RESOURCE.bits() | Self::PIXEL_SHADER_RESOURCE.bits();
        /// Every combinable read-only role.
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits()
            | Self::INDEX_BUFFER.bits()
            | Self::NON_PIXEL_SHADER_RESOURCE.bits()
            | Self::PIXEL_SHADER_RESOURCE.bits()
            | Self::INDIRECT_ARGUMENT.bits()
            | Self::COPY_SOURCE.bits();
    }
}

impl ResourceStates {
    /// State assumed for any resource the global tracker has never seen.
    pub const INITIAL: Self = Self::COMMON;

    /// Roles that write to the resource. Each must be the only role set.
    pub const WRITE_ROLES: Self = Self::RENDER_TARGET
        .union(Self::UNORDERED_ACCESS)
        .union(Self::DEPTH_WRITE)
        .union(Self::STREAM_OUT)
        .union(Self::COPY_DEST)
        .union(Self::RESOLVE_DEST);

    /// Roles that only read and may be combined with each other.
    pub const READ_ROLES: Self = Self::GENERIC_READ
        .union(Self::DEPTH_READ)
        .union(Self::RESOLVE_SOURCE)
        .union(Self::SHADING_RATE_SOURCE);

    /// Check if the state contains a write role.
    pub fn is_write_state(self) -> bool {
        self.intersects(Self::WRITE_ROLES)
    }

    /// Check if the state is made of read-only roles exclusively.
    pub fn is_read_only(self) -> bool {
        !self.is_empty() && Self::READ_ROLES.contains(self)
    }

    /// Check if `other` can be OR-ed into this state without producing an
    /// invalid combination.
    pub fn is_combinable_read(self, other: Self) -> bool {
        self.is_read_only() && other.is_read_only()
    }

    /// Check if this value describes a state a resource can actually be in.
    pub fn is_valid(self) -> bool {
        if self.is_empty() {
            return false;
        }
        if self == Self::COMMON
            || self == Self::PRESENT
            || self == Self::RAYTRACING_ACCELERATION_STRUCTURE
        {
            return true;
        }
        if self.is_write_state() {
            return self.bits().count_ones() == 1;
        }
        self.is_read_only()
    }
}

impl Default for ResourceStates {
    fn default() -> Self {
        Self::INITIAL
    }
}
