use crate::context::{DeviceBacking, ResourceContext};
use crate::desc::{ResidencyMode, ResourceType, TextureDesc};

/// Texture with its full mip chain.
#[derive(Debug, Clone)]
pub struct TextureContext {
    desc: TextureDesc,
    backing: DeviceBacking,
}

impl TextureContext {
    pub fn new(desc: TextureDesc, mode: ResidencyMode) -> Self {
        Self {
            desc,
            backing: DeviceBacking::new(ResourceType::Texture, desc.byte_size(), mode),
        }
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }
}

impl ResourceContext for TextureContext {
    fn backing(&self) -> &DeviceBacking {
        &self.backing
    }

    fn backing_mut(&mut self) -> &mut DeviceBacking {
        &mut self.backing
    }
}
