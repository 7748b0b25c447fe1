//! GPU Resource Contexts
//!
//! Texture, vertex buffer and index buffer contexts on top of the
//! `gpu-residency` manager, plus the device interface they talk to and the
//! [`ResourceCache`] front end a renderer drives once per frame.

pub mod cache;
pub mod context;
pub mod desc;
pub mod device;
pub mod error;
pub mod index_buffer;
pub mod resource;
pub mod set;
pub mod texture;
pub mod vertex_buffer;

pub use cache::ResourceCache;
pub use context::{DeviceBacking, ResourceContext};
pub use desc::{
    IndexBufferDesc, IndexFormat, ResidencyMode, ResourceType, TextureDesc, VertexBufferDesc,
};
pub use device::{DeviceObject, GraphicsDevice, HeadlessDevice};
pub use error::{DeviceError, ResourceError};
pub use index_buffer::IndexBufferContext;
pub use resource::GpuResource;
pub use set::{ResourceId, ResourceSet};
pub use texture::TextureContext;
pub use vertex_buffer::VertexBufferContext;
