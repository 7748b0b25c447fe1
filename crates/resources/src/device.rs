//! Graphics device interface
//!
//! The cache never talks to a real driver; it goes through [`GraphicsDevice`].
//! [`HeadlessDevice`] keeps its objects in memory and can be told to fail,
//! which is what the tests and the simulator run against.

use std::collections::HashMap;

use log::debug;

use crate::desc::{ResidencyMode, ResourceType};
use crate::error::DeviceError;

/// Device-side object handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceObject(pub u64);

pub trait GraphicsDevice {
    fn create_object(
        &mut self,
        resource_type: ResourceType,
        size: u64,
        mode: ResidencyMode,
    ) -> Result<DeviceObject, DeviceError>;
    fn release_object(&mut self, object: DeviceObject) -> Result<(), DeviceError>;
    fn is_lost(&self) -> bool;
    /// Recover a lost device. Objects outside the managed pool are gone afterwards.
    fn reset(&mut self) -> Result<(), DeviceError>;
}

#[derive(Debug, Clone, Copy)]
struct ObjectRecord {
    resource_type: ResourceType,
    size: u64,
    mode: ResidencyMode,
}

/// In-memory device with failure injection.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    objects: HashMap<u64, ObjectRecord>,
    next_object: u64,
    lost: bool,
    fail_creates: bool,
    fail_releases: bool,
    created: u64,
    released: u64,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a device loss.
    pub fn lose(&mut self) {
        self.lost = true;
    }

    pub fn set_fail_creates(&mut self, fail: bool) {
        self.fail_creates = fail;
    }

    pub fn set_fail_releases(&mut self, fail: bool) {
        self.fail_releases = fail;
    }

    pub fn contains(&self, object: DeviceObject) -> bool {
        self.objects.contains_key(&object.0)
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Bytes held by live objects of the given mode
    pub fn live_bytes(&self, mode: ResidencyMode) -> u64 {
        self.objects
            .values()
            .filter(|record| record.mode == mode)
            .map(|record| record.size)
            .sum()
    }

    pub fn live_objects_of(&self, resource_type: ResourceType) -> usize {
        self.objects
            .values()
            .filter(|record| record.resource_type == resource_type)
            .count()
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn released(&self) -> u64 {
        self.released
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_object(
        &mut self,
        resource_type: ResourceType,
        size: u64,
        mode: ResidencyMode,
    ) -> Result<DeviceObject, DeviceError> {
        if self.lost {
            return Err(DeviceError::Lost);
        }
        if self.fail_creates {
            return Err(DeviceError::CreateFailed {
                resource_type,
                size,
            });
        }

        self.next_object += 1;
        let id = self.next_object;
        self.objects.insert(
            id,
            ObjectRecord {
                resource_type,
                size,
                mode,
            },
        );
        self.created += 1;
        Ok(DeviceObject(id))
    }

    fn release_object(&mut self, object: DeviceObject) -> Result<(), DeviceError> {
        if self.fail_releases {
            return Err(DeviceError::ReleaseFailed(object.0));
        }
        // Objects dropped by a reset are already gone
        if self.objects.remove(&object.0).is_none() {
            return Err(DeviceError::UnknownObject(object.0));
        }
        self.released += 1;
        Ok(())
    }

    fn is_lost(&self) -> bool {
        self.lost
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        let before = self.objects.len();
        self.objects
            .retain(|_, record| record.mode == ResidencyMode::Managed);
        debug!(
            "headless device reset dropped {} objects",
            before - self.objects.len()
        );
        self.lost = false;
        Ok(())
    }
}
