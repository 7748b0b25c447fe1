use crate::context::{DeviceBacking, ResourceContext};
use crate::desc::{ResidencyMode, ResourceType, VertexBufferDesc};

#[derive(Debug, Clone)]
pub struct VertexBufferContext {
    desc: VertexBufferDesc,
    backing: DeviceBacking,
}

impl VertexBufferContext {
    pub fn new(desc: VertexBufferDesc, mode: ResidencyMode) -> Self {
        Self {
            desc,
            backing: DeviceBacking::new(ResourceType::VertexBuffer, desc.byte_size(), mode),
        }
    }

    pub fn desc(&self) -> &VertexBufferDesc {
        &self.desc
    }

    pub fn vertex_count(&self) -> u32 {
        self.desc.vertex_count
    }
}

impl ResourceContext for VertexBufferContext {
    fn backing(&self) -> &DeviceBacking {
        &self.backing
    }

    fn backing_mut(&mut self) -> &mut DeviceBacking {
        &mut self.backing
    }
}
