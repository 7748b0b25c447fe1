//! Resource cache front end
//!
//! [`ResourceCache`] ties the residency manager to a device and a set of
//! resource contexts. The renderer creates resources, binds them while
//! drawing, and drives the frame boundaries; the cache keeps video memory
//! within budget behind its back.

use std::collections::HashMap;

use gpu_residency::{
    PageRef, PayloadHandle, Priority, ResidencyConfig, ResidencyError, ResidencyManager,
    ResidencyStats,
};
use log::{debug, warn};

use crate::context::ResourceContext;
use crate::desc::{IndexBufferDesc, ResidencyMode, ResourceType, TextureDesc, VertexBufferDesc};
use crate::device::{DeviceObject, GraphicsDevice};
use crate::error::{DeviceError, ResourceError};
use crate::index_buffer::IndexBufferContext;
use crate::resource::GpuResource;
use crate::set::{ResourceId, ResourceSet};
use crate::texture::TextureContext;
use crate::vertex_buffer::VertexBufferContext;

pub struct ResourceCache<D> {
    manager: ResidencyManager<ResourceSet<D>>,
    set: ResourceSet<D>,
    // Cached resources only; managed ones have no page
    pages: HashMap<ResourceId, PageRef>,
    next_id: u64,
    frame_invalid: bool,
    device_losses: u64,
    bind_failures: u64,
}

impl<D: GraphicsDevice> ResourceCache<D> {
    /// Create a cache and register the page callbacks of every resource type.
    ///
    /// # Errors
    /// Fails if the configuration leaves no room for the three resource kinds.
    pub fn new(config: ResidencyConfig, device: D) -> Result<Self, ResourceError> {
        let mut manager = ResidencyManager::with_config(config);
        for resource_type in ResourceType::ALL {
            manager.try_register_kind(
                resource_type.kind(),
                ResourceSet::<D>::page_in,
                ResourceSet::<D>::page_out,
            )?;
        }

        Ok(Self {
            manager,
            set: ResourceSet::new(device),
            pages: HashMap::new(),
            next_id: 1,
            frame_invalid: false,
            device_losses: 0,
            bind_failures: 0,
        })
    }

    pub fn create_texture(
        &mut self,
        desc: TextureDesc,
        mode: ResidencyMode,
    ) -> Result<ResourceId, ResourceError> {
        self.create(TextureContext::new(desc, mode).into())
    }

    /// Create a texture, halving its resolution until it fits the budget.
    ///
    /// Returns the id and the descriptor that was actually created.
    pub fn create_texture_or_smaller(
        &mut self,
        desc: TextureDesc,
        mode: ResidencyMode,
    ) -> Result<(ResourceId, TextureDesc), ResourceError> {
        let mut desc = desc;
        loop {
            match self.create_texture(desc, mode) {
                Ok(id) => return Ok((id, desc)),
                Err(ResourceError::OutOfVideoMemory { .. }) if desc.halved() != desc =>
                {
                    debug!(
                        "{}x{} texture does not fit, retrying at half resolution",
                        desc.width, desc.height
                    );
                    desc = desc.halved();
                }
                Err(error) => return Err(error),
            }
        }
    }

    pub fn create_vertex_buffer(
        &mut self,
        desc: VertexBufferDesc,
        mode: ResidencyMode,
    ) -> Result<ResourceId, ResourceError> {
        self.create(VertexBufferContext::new(desc, mode).into())
    }

    pub fn create_index_buffer(
        &mut self,
        desc: IndexBufferDesc,
        mode: ResidencyMode,
    ) -> Result<ResourceId, ResourceError> {
        self.create(IndexBufferContext::new(desc, mode).into())
    }

    fn create(&mut self, mut resource: GpuResource) -> Result<ResourceId, ResourceError> {
        if self.set.device().is_lost() {
            return Err(ResourceError::DeviceLost);
        }

        let id = ResourceId(self.next_id);
        self.next_id += 1;

        if resource.is_managed() {
            self.set.create_object(&mut resource)?;
            self.set.insert(id, resource, None);
            return Ok(id);
        }

        let size = resource.byte_size();
        let kind = resource.resource_type().kind();
        let page = match self.manager.try_allocate_page(&mut self.set, kind, size) {
            Ok(page) => page,
            Err(ResidencyError::OutOfMemory { requested, available }) => {
                return Err(ResourceError::OutOfVideoMemory { requested, available });
            }
            Err(ResidencyError::PageTooLarge { size, .. }) => {
                return Err(ResourceError::OutOfVideoMemory {
                    requested: size,
                    available: self.manager.available_memory(),
                });
            }
            Err(error) => return Err(error.into()),
        };

        let object = match self.set.create_object(&mut resource) {
            Ok(object) => object,
            Err(error) => {
                self.manager.free_page(page);
                return Err(error.into());
            }
        };

        self.manager.set_page_payload(page, PayloadHandle(object.0));
        self.manager.add_page(Priority::NEW, page);
        self.set.insert(id, resource, Some(page.identifier()));
        self.pages.insert(id, page);
        debug!("created {id} ({size} bytes)");
        Ok(id)
    }

    /// Make a resource resident and pin it for drawing.
    ///
    /// # Errors
    /// - [`ResourceError::DeviceLost`] for the rest of a frame in which the device was lost
    /// - [`ResourceError::PayloadUnavailable`] if the source data needed for a page-in is gone
    /// - [`ResourceError::OutOfVideoMemory`] if pinned resources leave no room for it
    /// - [`ResourceError::Device`] if the budget has room but the device refuses the upload
    pub fn bind(&mut self, id: ResourceId) -> Result<DeviceObject, ResourceError> {
        if self.frame_invalid || self.set.device().is_lost() {
            return Err(ResourceError::DeviceLost);
        }

        let Some(resource) = self.set.get(id) else {
            return Err(ResourceError::UnknownResource(id));
        };
        let Some(&page) = self.pages.get(&id) else {
            return resource.object().ok_or(ResourceError::PayloadUnavailable(id));
        };
        let size = resource.byte_size();
        let resource_type = resource.resource_type();

        if !self.manager.access_page(&mut self.set, page) {
            self.bind_failures += 1;
            return Err(self.page_in_failure(id, resource_type, size));
        }

        self.manager.lock_page(page);
        self.set
            .get(id)
            .and_then(|resource| resource.object())
            .ok_or(ResourceError::PayloadUnavailable(id))
    }

    /// Why a page-in during `bind` left the resource off the device.
    fn page_in_failure(&self, id: ResourceId, resource_type: ResourceType, size: u64) -> ResourceError {
        let has_source = self.set.get(id).is_some_and(|resource| resource.has_source());
        let available = self.manager.available_memory();

        if !has_source {
            ResourceError::PayloadUnavailable(id)
        } else if self.set.device().is_lost() {
            ResourceError::DeviceLost
        } else if available < size {
            ResourceError::OutOfVideoMemory {
                requested: size,
                available,
            }
        } else {
            DeviceError::CreateFailed {
                resource_type,
                size,
            }
            .into()
        }
    }

    /// Release the pin taken by [`bind`](Self::bind).
    pub fn unbind(&mut self, id: ResourceId) -> bool {
        match self.pages.get(&id) {
            Some(&page) => self.manager.unlock_page(page),
            None => false,
        }
    }

    /// Release a resource and its budget charge.
    pub fn destroy(&mut self, id: ResourceId) -> Result<(), ResourceError> {
        let page = self.pages.remove(&id);
        let mut resource = self
            .set
            .remove(id, page.map(PageRef::identifier))
            .ok_or(ResourceError::UnknownResource(id))?;

        self.set.destroy_object(&mut resource);
        if let Some(page) = page {
            self.manager.free_page(page);
        }
        Ok(())
    }

    /// Drop the CPU copy of a resource; once paged out it cannot come back.
    pub fn discard_source(&mut self, id: ResourceId) -> Result<(), ResourceError> {
        self.set
            .get_mut(id)
            .ok_or(ResourceError::UnknownResource(id))?
            .discard_source();
        Ok(())
    }

    pub fn begin_frame(&mut self) {
        if self.frame_invalid && !self.set.device().is_lost() {
            self.frame_invalid = false;
        }
        self.manager.begin_frame();
    }

    /// Close a frame: drop pins, run the partial maintenance pass and
    /// restore the free-memory cushion.
    pub fn end_frame(&mut self) {
        self.manager.unlock_all_pages();
        self.manager.frame_lru_update();
        let reclaimed = self.manager.maintain_cushion(&mut self.set);
        if reclaimed > 0 {
            debug!("reclaimed {reclaimed} bytes to restore the cushion");
        }
    }

    /// Handle a lost device: invalidate cached payloads and reset the device.
    ///
    /// Binds fail with [`ResourceError::DeviceLost`] until the next frame.
    /// Returns the number of invalidated resources.
    pub fn on_device_lost(&mut self) -> Result<usize, ResourceError> {
        let invalidated = self.manager.invalidate_non_survivable(&mut self.set);
        self.set.device_mut().reset()?;
        self.frame_invalid = true;
        self.device_losses += 1;
        warn!("device lost; invalidated {invalidated} resources");
        Ok(invalidated)
    }

    pub fn is_resident(&self, id: ResourceId) -> bool {
        match self.pages.get(&id) {
            Some(&page) => self.manager.is_resident(page),
            None => self
                .set
                .get(id)
                .is_some_and(|resource| resource.object().is_some()),
        }
    }

    pub fn resource(&self, id: ResourceId) -> Option<&GpuResource> {
        self.set.get(id)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn stats(&self) -> ResidencyStats {
        self.manager.stats()
    }

    pub fn manager(&self) -> &ResidencyManager<ResourceSet<D>> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ResidencyManager<ResourceSet<D>> {
        &mut self.manager
    }

    pub fn device(&self) -> &D {
        self.set.device()
    }

    pub fn device_mut(&mut self) -> &mut D {
        self.set.device_mut()
    }

    pub fn device_losses(&self) -> u64 {
        self.device_losses
    }

    pub fn bind_failures(&self) -> u64 {
        self.bind_failures
    }
}
