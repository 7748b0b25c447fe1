//! Errors reported by the residency manager

use crate::kind::ResourceKind;

/// Reasons a residency operation could not be carried out.
///
/// Most manager operations report failure as `bool` or `Option` so that the
/// per-frame paths stay cheap; the `try_*` variants surface one of these
/// instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResidencyError {
    #[error("resource kind {kind} is out of range (maximum_kinds={maximum})")]
    KindOutOfRange { kind: ResourceKind, maximum: usize },
    #[error("resource kind {0} is already registered")]
    KindAlreadyRegistered(ResourceKind),
    #[error("page of {size} bytes exceeds the maximum memory of {maximum} bytes")]
    PageTooLarge { size: u64, maximum: u64 },
    #[error("out of video memory: requested {requested} bytes, {available} available after eviction")]
    OutOfMemory { requested: u64, available: u64 },
    #[error("stale page handle {0}")]
    StalePage(u64),
}
