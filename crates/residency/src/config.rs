//! Residency configuration
//!
//! Every tunable of the residency manager lives in [`ResidencyConfig`].
//! Configuration can be loaded from a file, environment variables, or
//! created programmatically.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::kind::MAXIMUM_RESOURCE_KINDS;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Configuration for a residency manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidencyConfig {
    /// Video memory budget in bytes
    pub maximum_memory: u64,
    /// Free-memory cushion the frame driver tries to keep, in bytes
    pub minimum_memory: u64,
    /// Number of page slots allocated up front
    pub maximum_pages: usize,
    /// Number of resource kinds the callback table holds
    pub maximum_kinds: usize,
    /// Priority changes allowed between two `begin_frame` calls
    pub frame_maximum_priority_changes: usize,
    /// Pages evaluated by one partial maintenance pass
    pub maximum_page_updates_per_frame: usize,
    /// Frames a page is protected from eviction after its last access
    pub minimum_page_out_frames: u64,
    /// Idle frames after which a page is demoted one bucket
    pub demotion_idle_frames: u64,
    /// Weight of the newest sample in the utilization average (0.0 to 1.0)
    pub utilization_weight: f32,
    /// Fraction of a frame the page-in path may consume (0.0 to 1.0)
    pub maximum_frame_bandwidth_utilization: f32,
    /// Frame time the bandwidth fraction applies to, in microseconds
    pub frame_budget_us: u64,
}

impl Default for ResidencyConfig {
    fn default() -> Self {
        Self {
            maximum_memory: 128_000_000,
            minimum_memory: 5_000_000,
            maximum_pages: 1024,
            maximum_kinds: MAXIMUM_RESOURCE_KINDS,
            frame_maximum_priority_changes: 256,
            maximum_page_updates_per_frame: 64,
            minimum_page_out_frames: 2,
            demotion_idle_frames: 30,
            utilization_weight: 0.20,
            maximum_frame_bandwidth_utilization: 0.25,
            frame_budget_us: 16_667,
        }
    }
}

impl ResidencyConfig {
    /// Creates a configuration with the given budget and cushion in bytes.
    pub fn new(maximum_memory: u64, minimum_memory: u64) -> Self {
        Self {
            maximum_memory,
            minimum_memory,
            ..Default::default()
        }
    }

    /// Sets the memory budget in megabytes, saturating at `u64::MAX` bytes.
    pub fn with_maximum_memory_mb(mut self, mb: u64) -> Self {
        self.maximum_memory = mb.saturating_mul(BYTES_PER_MB);
        self
    }

    /// Sets the free-memory cushion in megabytes.
    pub fn with_minimum_memory_mb(mut self, mb: u64) -> Self {
        self.minimum_memory = mb.saturating_mul(BYTES_PER_MB);
        self
    }

    pub fn with_maximum_pages(mut self, pages: usize) -> Self {
        self.maximum_pages = pages;
        self
    }

    pub fn with_maximum_kinds(mut self, kinds: usize) -> Self {
        self.maximum_kinds = kinds;
        self
    }

    pub fn with_priority_change_cap(mut self, changes: usize) -> Self {
        self.frame_maximum_priority_changes = changes;
        self
    }

    pub fn with_updates_per_frame(mut self, updates: usize) -> Self {
        self.maximum_page_updates_per_frame = updates;
        self
    }

    pub fn with_minimum_page_out_frames(mut self, frames: u64) -> Self {
        self.minimum_page_out_frames = frames;
        self
    }

    pub fn with_demotion_idle_frames(mut self, frames: u64) -> Self {
        self.demotion_idle_frames = frames;
        self
    }

    pub fn with_bandwidth_utilization(mut self, fraction: f32) -> Self {
        self.maximum_frame_bandwidth_utilization = fraction;
        self
    }

    /// Checks the configuration for values the manager cannot honour.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.minimum_memory > self.maximum_memory {
            return Err(ConfigError::Invalid(format!(
                "minimum_memory ({}) exceeds maximum_memory ({})",
                self.minimum_memory, self.maximum_memory
            )));
        }
        if self.maximum_kinds == 0 || self.maximum_kinds > MAXIMUM_RESOURCE_KINDS {
            return Err(ConfigError::Invalid(format!(
                "maximum_kinds must be within 1..={MAXIMUM_RESOURCE_KINDS}, got {}",
                self.maximum_kinds
            )));
        }
        if self.frame_maximum_priority_changes == 0 {
            return Err(ConfigError::Invalid(
                "frame_maximum_priority_changes must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.utilization_weight) {
            return Err(ConfigError::Invalid(format!(
                "utilization_weight must be within 0.0..=1.0, got {}",
                self.utilization_weight
            )));
        }
        if !(0.0..=1.0).contains(&self.maximum_frame_bandwidth_utilization) {
            return Err(ConfigError::Invalid(format!(
                "maximum_frame_bandwidth_utilization must be within 0.0..=1.0, got {}",
                self.maximum_frame_bandwidth_utilization
            )));
        }
        Ok(())
    }

    /// Returns the default configuration file location for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/gpu-residency/residency.toml
    /// - Linux: ~/.config/gpu-residency/residency.toml
    /// - Windows: %APPDATA%\gpu-residency\residency.toml
    pub fn default_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("gpu-residency").join("residency.toml")
        } else {
            // Fallback to current directory if config dir unavailable
            PathBuf::from("residency.toml")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GPU_RESIDENCY_MAX_MEMORY_MB`: memory budget in MB
    /// - `GPU_RESIDENCY_MIN_MEMORY_MB`: free-memory cushion in MB
    /// - `GPU_RESIDENCY_MAX_PAGES`: preallocated page slots
    /// - `GPU_RESIDENCY_PRIORITY_CHANGES`: priority changes per frame
    /// - `GPU_RESIDENCY_UPDATES_PER_FRAME`: pages evaluated per frame
    /// - `GPU_RESIDENCY_PAGE_OUT_FRAMES`: eviction grace period in frames
    /// - `GPU_RESIDENCY_BANDWIDTH`: page-in fraction of a frame
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GPU_RESIDENCY_MAX_MEMORY_MB") {
            config.maximum_memory = parse_megabytes("GPU_RESIDENCY_MAX_MEMORY_MB", &val)?;
        }

        if let Ok(val) = std::env::var("GPU_RESIDENCY_MIN_MEMORY_MB") {
            config.minimum_memory = parse_megabytes("GPU_RESIDENCY_MIN_MEMORY_MB", &val)?;
        }

        if let Ok(val) = std::env::var("GPU_RESIDENCY_MAX_PAGES") {
            config.maximum_pages = parse_value("GPU_RESIDENCY_MAX_PAGES", &val)?;
        }

        if let Ok(val) = std::env::var("GPU_RESIDENCY_PRIORITY_CHANGES") {
            config.frame_maximum_priority_changes = parse_value("GPU_RESIDENCY_PRIORITY_CHANGES", &val)?;
        }

        if let Ok(val) = std::env::var("GPU_RESIDENCY_UPDATES_PER_FRAME") {
            config.maximum_page_updates_per_frame = parse_value("GPU_RESIDENCY_UPDATES_PER_FRAME", &val)?;
        }

        if let Ok(val) = std::env::var("GPU_RESIDENCY_PAGE_OUT_FRAMES") {
            config.minimum_page_out_frames = parse_value("GPU_RESIDENCY_PAGE_OUT_FRAMES", &val)?;
        }

        if let Ok(val) = std::env::var("GPU_RESIDENCY_BANDWIDTH") {
            config.maximum_frame_bandwidth_utilization = parse_value("GPU_RESIDENCY_BANDWIDTH", &val)?;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format (every key optional):
    /// ```toml
    /// maximum_memory = 128000000
    /// minimum_memory = 5000000
    /// maximum_pages = 1024
    /// frame_maximum_priority_changes = 256
    /// maximum_frame_bandwidth_utilization = 0.25
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in toml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "maximum_memory" => config.maximum_memory = parse_value(key, value)?,
                    "minimum_memory" => config.minimum_memory = parse_value(key, value)?,
                    "maximum_pages" => config.maximum_pages = parse_value(key, value)?,
                    "maximum_kinds" => config.maximum_kinds = parse_value(key, value)?,
                    "frame_maximum_priority_changes" => {
                        config.frame_maximum_priority_changes = parse_value(key, value)?
                    }
                    "maximum_page_updates_per_frame" => {
                        config.maximum_page_updates_per_frame = parse_value(key, value)?
                    }
                    "minimum_page_out_frames" => {
                        config.minimum_page_out_frames = parse_value(key, value)?
                    }
                    "demotion_idle_frames" => config.demotion_idle_frames = parse_value(key, value)?,
                    "utilization_weight" => config.utilization_weight = parse_value(key, value)?,
                    "maximum_frame_bandwidth_utilization" => {
                        config.maximum_frame_bandwidth_utilization = parse_value(key, value)?
                    }
                    "frame_budget_us" => config.frame_budget_us = parse_value(key, value)?,
                    _ => {} // Ignore unknown keys
                }
            }
        }

        Ok(config)
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path.as_ref(), self.to_toml())?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    pub fn to_toml(&self) -> String {
        format!(
            "# GPU residency configuration\n\
             maximum_memory = {}\n\
             minimum_memory = {}\n\
             maximum_pages = {}\n\
             maximum_kinds = {}\n\
             frame_maximum_priority_changes = {}\n\
             maximum_page_updates_per_frame = {}\n\
             minimum_page_out_frames = {}\n\
             demotion_idle_frames = {}\n\
             utilization_weight = {}\n\
             maximum_frame_bandwidth_utilization = {}\n\
             frame_budget_us = {}\n",
            self.maximum_memory,
            self.minimum_memory,
            self.maximum_pages,
            self.maximum_kinds,
            self.frame_maximum_priority_changes,
            self.maximum_page_updates_per_frame,
            self.minimum_page_out_frames,
            self.demotion_idle_frames,
            self.utilization_weight,
            self.maximum_frame_bandwidth_utilization,
            self.frame_budget_us,
        )
    }

    /// Returns the memory budget in megabytes.
    pub fn maximum_memory_mb(&self) -> u64 {
        self.maximum_memory / BYTES_PER_MB
    }
}

/// Parses a megabyte count into bytes; counts too large for `u64` bytes are invalid.
fn parse_megabytes(key: &str, value: &str) -> Result<u64, ConfigError> {
    parse_value::<u64>(key, value)?
        .checked_mul(BYTES_PER_MB)
        .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),
    /// Values that parse but cannot be used together
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
