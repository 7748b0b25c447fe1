use crate::context::{DeviceBacking, ResourceContext};
use crate::index_buffer::IndexBufferContext;
use crate::texture::TextureContext;
use crate::vertex_buffer::VertexBufferContext;

/// Any resource the cache manages, dispatched by kind.
#[derive(Debug, Clone)]
pub enum GpuResource {
    Texture(TextureContext),
    VertexBuffer(VertexBufferContext),
    IndexBuffer(IndexBufferContext),
}

impl ResourceContext for GpuResource {
    fn backing(&self) -> &DeviceBacking {
        match self {
            GpuResource::Texture(texture) => texture.backing(),
            GpuResource::VertexBuffer(buffer) => buffer.backing(),
            GpuResource::IndexBuffer(buffer) => buffer.backing(),
        }
    }

    fn backing_mut(&mut self) -> &mut DeviceBacking {
        match self {
            GpuResource::Texture(texture) => texture.backing_mut(),
            GpuResource::VertexBuffer(buffer) => buffer.backing_mut(),
            GpuResource::IndexBuffer(buffer) => buffer.backing_mut(),
        }
    }
}

impl From<TextureContext> for GpuResource {
    fn from(value: TextureContext) -> Self {
        Self::Texture(value)
    }
}

impl From<VertexBufferContext> for GpuResource {
    fn from(value: VertexBufferContext) -> Self {
        Self::VertexBuffer(value)
    }
}

impl From<IndexBufferContext> for GpuResource {
    fn from(value: IndexBufferContext) -> Self {
        Self::IndexBuffer(value)
    }
}
