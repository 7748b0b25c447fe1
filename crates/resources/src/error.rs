use gpu_residency::ResidencyError;

use crate::desc::ResourceType;
use crate::ResourceId;

/// Failures reported by a [`GraphicsDevice`](crate::device::GraphicsDevice).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("graphics device is lost")]
    Lost,
    #[error("device could not create a {resource_type} of {size} bytes")]
    CreateFailed { resource_type: ResourceType, size: u64 },
    #[error("device could not release object {0}")]
    ReleaseFailed(u64),
    #[error("unknown device object {0}")]
    UnknownObject(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("out of video memory: requested {requested} bytes, {available} available")]
    OutOfVideoMemory { requested: u64, available: u64 },
    #[error("device lost; retry after the next frame begins")]
    DeviceLost,
    #[error("payload of {0} is unavailable")]
    PayloadUnavailable(ResourceId),
    #[error("unknown {0}")]
    UnknownResource(ResourceId),
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("residency error: {0}")]
    Residency(#[from] ResidencyError),
}
