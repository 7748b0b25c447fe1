//! GPU Residency Library
//!
//! Priority-tiered LRU cache that decides which device resources stay
//! resident in video memory, which get evicted, and how much reprioritization
//! work is done per frame.
//!
//! # Example
//!
//! ```
//! use gpu_residency::{Page, Priority, ResidencyManager, ResourceKind};
//!
//! fn upload(uploads: &mut u32, _page: &mut Page) -> bool {
//!     *uploads += 1;
//!     true
//! }
//!
//! fn release(_uploads: &mut u32, _page: &mut Page) -> bool {
//!     true
//! }
//!
//! let mut manager = ResidencyManager::new(64 * 1024 * 1024, 256, 4);
//! manager.register_kind(ResourceKind::TEXTURE, upload, release);
//!
//! let mut uploads = 0;
//! let page = manager
//!     .allocate_page(&mut uploads, ResourceKind::TEXTURE, 4 * 1024 * 1024)
//!     .expect("budget has room");
//! manager.add_page(Priority::NEW, page);
//!
//! manager.begin_frame();
//! assert!(manager.access_page(&mut uploads, page));
//! manager.partial_lru_update(16);
//! ```

pub mod bandwidth;
mod bucket;
pub mod config;
pub mod error;
pub mod kind;
pub mod manager;
pub mod page;
pub mod priority;
pub mod stats;

pub use bandwidth::FrameBandwidth;
pub use config::{ConfigError, ResidencyConfig};
pub use error::ResidencyError;
pub use kind::{KindCallbacks, KindTable, PageFn, ResourceKind, MAXIMUM_RESOURCE_KINDS};
pub use manager::ResidencyManager;
pub use page::{Page, PageFlags, PageRef, PayloadHandle};
pub use priority::{Priority, TOTAL_PRIORITIES};
pub use stats::{ema, KindStatistics, MemoryPressure, ResidencyStats};
