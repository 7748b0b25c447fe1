//! Resource context contract
//!
//! A resource context owns one device object and knows how to create,
//! page in, page out and destroy it. The residency manager decides *when*
//! those happen; the context decides *how*.

use log::{debug, warn};

use crate::desc::{ResidencyMode, ResourceType};
use crate::device::{DeviceObject, GraphicsDevice};
use crate::error::DeviceError;

/// Device object state shared by every resource context.
#[derive(Debug, Clone)]
pub struct DeviceBacking {
    resource_type: ResourceType,
    size: u64,
    mode: ResidencyMode,
    object: Option<DeviceObject>,
    // CPU copy the object can be rebuilt from
    has_source: bool,
    uploads: u32,
}

impl DeviceBacking {
    pub fn new(resource_type: ResourceType, size: u64, mode: ResidencyMode) -> Self {
        Self {
            resource_type,
            size,
            mode,
            object: None,
            has_source: true,
            uploads: 0,
        }
    }

    fn upload<D: GraphicsDevice>(&mut self, device: &mut D) -> Result<DeviceObject, DeviceError> {
        let object = device.create_object(self.resource_type, self.size, self.mode)?;
        self.object = Some(object);
        self.uploads += 1;
        Ok(object)
    }
}

/// Per-kind handling of a device resource.
///
/// Implementors only expose their [`DeviceBacking`]; the provided methods
/// carry the create / page-in / page-out / destroy protocol.
pub trait ResourceContext {
    fn backing(&self) -> &DeviceBacking;
    fn backing_mut(&mut self) -> &mut DeviceBacking;

    fn resource_type(&self) -> ResourceType {
        self.backing().resource_type
    }

    /// Bytes charged against the video memory budget
    fn byte_size(&self) -> u64 {
        self.backing().size
    }

    fn mode(&self) -> ResidencyMode {
        self.backing().mode
    }

    fn is_managed(&self) -> bool {
        self.mode() == ResidencyMode::Managed
    }

    fn object(&self) -> Option<DeviceObject> {
        self.backing().object
    }

    fn has_source(&self) -> bool {
        self.backing().has_source
    }

    /// Times the device object has been (re)created
    fn uploads(&self) -> u32 {
        self.backing().uploads
    }

    /// Drop the CPU copy; later page-ins fail.
    fn discard_source(&mut self) {
        self.backing_mut().has_source = false;
    }

    /// Create the device object for the first time.
    fn create<D: GraphicsDevice>(&mut self, device: &mut D) -> Result<DeviceObject, DeviceError> {
        self.backing_mut().upload(device)
    }

    /// Recreate the device object of a paged-out resource.
    ///
    /// Returns `false` when the source data is gone or the device refuses.
    fn page_in<D: GraphicsDevice>(&mut self, device: &mut D) -> bool {
        let backing = self.backing_mut();
        if !backing.has_source {
            debug!("{} has no source data to page in", backing.resource_type);
            return false;
        }

        // Left behind by a reset whose page-out failed
        if let Some(stale) = backing.object.take() {
            if let Err(error) = device.release_object(stale) {
                debug!("dropping stale {} object {}: {error}", backing.resource_type, stale.0);
            }
        }

        match backing.upload(device) {
            Ok(_) => true,
            Err(error) => {
                warn!("failed to page in {}: {error}", backing.resource_type);
                false
            }
        }
    }

    /// Release the device object, keeping everything needed to page it in.
    ///
    /// Returns `false` if the device refused; the object is kept.
    fn page_out<D: GraphicsDevice>(&mut self, device: &mut D) -> bool {
        let backing = self.backing_mut();
        let Some(object) = backing.object.take() else {
            return true;
        };

        match device.release_object(object) {
            Ok(()) | Err(DeviceError::UnknownObject(_)) => true,
            Err(error) => {
                warn!(
                    "failed to release {} object {}: {error}",
                    backing.resource_type, object.0
                );
                backing.object = Some(object);
                false
            }
        }
    }

    /// Release the device object unconditionally.
    fn destroy<D: GraphicsDevice>(&mut self, device: &mut D) {
        let backing = self.backing_mut();
        if let Some(object) = backing.object.take() {
            if let Err(error) = device.release_object(object) {
                debug!(
                    "ignoring release failure while destroying {} object {}: {error}",
                    backing.resource_type, object.0
                );
            }
        }
    }
}
