use crate::context::{DeviceBacking, ResourceContext};
use crate::desc::{IndexBufferDesc, IndexFormat, ResidencyMode, ResourceType};

#[derive(Debug, Clone)]
pub struct IndexBufferContext {
    desc: IndexBufferDesc,
    backing: DeviceBacking,
}

impl IndexBufferContext {
    pub fn new(desc: IndexBufferDesc, mode: ResidencyMode) -> Self {
        Self {
            desc,
            backing: DeviceBacking::new(ResourceType::IndexBuffer, desc.byte_size(), mode),
        }
    }

    pub fn desc(&self) -> &IndexBufferDesc {
        &self.desc
    }

    pub fn format(&self) -> IndexFormat {
        self.desc.format
    }
}

impl ResourceContext for IndexBufferContext {
    fn backing(&self) -> &DeviceBacking {
        &self.backing
    }

    fn backing_mut(&mut self) -> &mut DeviceBacking {
        &mut self.backing
    }
}
