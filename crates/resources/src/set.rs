//! Callback context shared with the residency manager
//!
//! [`ResourceSet`] owns the device and every resource context. It is the
//! context value the manager hands to page-in and page-out callbacks, which
//! find the resource behind a page through its identifier.

use std::collections::HashMap;
use std::fmt;

use gpu_residency::{Page, PayloadHandle};
use log::debug;

use crate::context::ResourceContext;
use crate::device::{DeviceObject, GraphicsDevice};
use crate::error::DeviceError;
use crate::resource::GpuResource;

/// Handle to a resource in a [`ResourceCache`](crate::ResourceCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource #{}", self.0)
    }
}

pub struct ResourceSet<D> {
    device: D,
    resources: HashMap<ResourceId, GpuResource>,
    // Page identifier to owning resource
    pages: HashMap<u64, ResourceId>,
}

impl<D: GraphicsDevice> ResourceSet<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            resources: HashMap::new(),
            pages: HashMap::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn get(&self, id: ResourceId) -> Option<&GpuResource> {
        self.resources.get(&id)
    }

    pub fn get_mut(&mut self, id: ResourceId) -> Option<&mut GpuResource> {
        self.resources.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resources.keys().copied()
    }

    pub(crate) fn insert(&mut self, id: ResourceId, resource: GpuResource, page: Option<u64>) {
        if let Some(identifier) = page {
            self.pages.insert(identifier, id);
        }
        self.resources.insert(id, resource);
    }

    pub(crate) fn remove(&mut self, id: ResourceId, page: Option<u64>) -> Option<GpuResource> {
        if let Some(identifier) = page {
            self.pages.remove(&identifier);
        }
        self.resources.remove(&id)
    }

    /// Create the device object of a resource that is not in the set yet.
    pub(crate) fn create_object(
        &mut self,
        resource: &mut GpuResource,
    ) -> Result<DeviceObject, DeviceError> {
        resource.create(&mut self.device)
    }

    pub(crate) fn destroy_object(&mut self, resource: &mut GpuResource) {
        resource.destroy(&mut self.device);
    }

    /// Page-in callback registered for every resource kind.
    pub fn page_in(set: &mut Self, page: &mut Page) -> bool {
        let Some(resource) = set
            .pages
            .get(&page.identifier())
            .and_then(|id| set.resources.get_mut(id))
        else {
            debug!("page {} has no resource to page in", page.identifier());
            return false;
        };

        if !resource.page_in(&mut set.device) {
            return false;
        }
        if let Some(object) = resource.object() {
            page.set_payload(PayloadHandle(object.0));
        }
        true
    }

    /// Page-out callback registered for every resource kind.
    pub fn page_out(set: &mut Self, page: &mut Page) -> bool {
        let Some(resource) = set
            .pages
            .get(&page.identifier())
            .and_then(|id| set.resources.get_mut(id))
        else {
            // Nothing on the device to release
            page.take_payload();
            return true;
        };

        if !resource.page_out(&mut set.device) {
            return false;
        }
        page.take_payload();
        true
    }
}
