//! Resource descriptors
//!
//! Plain descriptions of the device objects a resource context manages and
//! the byte footprint each one charges against the video memory budget.

use std::fmt;

use gpu_residency::ResourceKind;

/// The three kinds of device resource the cache manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Texture,
    VertexBuffer,
    IndexBuffer,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [
        ResourceType::Texture,
        ResourceType::VertexBuffer,
        ResourceType::IndexBuffer,
    ];

    /// Residency kind the pages of this type are registered under
    pub fn kind(self) -> ResourceKind {
        match self {
            ResourceType::Texture => ResourceKind::TEXTURE,
            ResourceType::VertexBuffer => ResourceKind::VERTEX_BUFFER,
            ResourceType::IndexBuffer => ResourceKind::INDEX_BUFFER,
        }
    }

    pub fn from_kind(kind: ResourceKind) -> Option<Self> {
        Self::ALL.into_iter().find(|resource_type| resource_type.kind() == kind)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Texture => write!(f, "texture"),
            ResourceType::VertexBuffer => write!(f, "vertex buffer"),
            ResourceType::IndexBuffer => write!(f, "index buffer"),
        }
    }
}

/// Who manages a resource's residency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResidencyMode {
    /// Paged in and out by the residency manager
    #[default]
    Cached,
    /// Left to the driver; bypasses the residency manager and survives resets
    Managed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    pub mip_levels: u32,
}

impl TextureDesc {
    /// Single-level RGBA8 texture
    pub fn rgba8(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel: 4,
            mip_levels: 1,
        }
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Bytes of the whole mip chain.
    ///
    /// Each level halves both dimensions, never going below one texel.
    /// Sizes past `u64::MAX` saturate, so no budget can hold them.
    pub fn byte_size(&self) -> u64 {
        let mut total = 0u64;
        let (mut width, mut height) = (u64::from(self.width), u64::from(self.height));
        for _ in 0..self.mip_levels.max(1) {
            let level = (width * height).saturating_mul(u64::from(self.bytes_per_pixel));
            total = total.saturating_add(level);
            if width == 1 && height == 1 {
                break;
            }
            width = (width / 2).max(1);
            height = (height / 2).max(1);
        }
        total
    }

    /// The same texture at half resolution, one mip level shorter.
    pub fn halved(&self) -> Self {
        Self {
            width: (self.width / 2).max(1),
            height: (self.height / 2).max(1),
            bytes_per_pixel: self.bytes_per_pixel,
            mip_levels: self.mip_levels.saturating_sub(1).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferDesc {
    pub vertex_count: u32,
    /// Bytes per vertex
    pub stride: u32,
}

impl VertexBufferDesc {
    pub fn byte_size(&self) -> u64 {
        u64::from(self.vertex_count) * u64::from(self.stride)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    #[default]
    U16,
    U32,
}

impl IndexFormat {
    pub fn bytes(self) -> u64 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferDesc {
    pub index_count: u32,
    pub format: IndexFormat,
}

impl IndexBufferDesc {
    pub fn byte_size(&self) -> u64 {
        u64::from(self.index_count) * self.format.bytes()
    }
}
