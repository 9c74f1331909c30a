//! Compression configuration.
//!
//! Handles loading and validating a `picker-compress.toml` file. Every key is
//! optional; a missing file means stock defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! # cache_root = "/var/cache/picker"   # default: the platform cache directory
//!
//! [budget]
//! request_max_bytes = 1048576         # Budget for ordinary images
//! normal_quality_floor = 20           # Quality search stops here (normal images)
//! panoramic_max_bytes = 1048576       # Budget for 3:1 and wider images
//! panoramic_quality_floor = 50        # Quality search stops here (panoramas)
//!
//! [processing]
//! # max_workers = 4                   # default: number of CPU cores
//! ```
//!
//! Unknown keys are rejected.

use crate::cache_dir::{CacheRootProvider, FixedCacheRoot, SystemCacheRoot};
use crate::imaging::SizeBudget;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the working directory when no `--config` is given.
pub const CONFIG_FILENAME: &str = "picker-compress.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `picker-compress.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressConfig {
    /// Directory the `boxing` cache lives under. `None` uses the platform cache dir.
    pub cache_root: Option<PathBuf>,
    /// Size budgets and quality floors.
    pub budget: BudgetConfig,
    /// Worker pool settings.
    pub processing: ProcessingConfig,
}

impl CompressConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.budget;
        for (name, value) in [
            ("budget.request_max_bytes", b.request_max_bytes),
            ("budget.panoramic_max_bytes", b.panoramic_max_bytes),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be positive")));
            }
        }
        for (name, value) in [
            ("budget.normal_quality_floor", b.normal_quality_floor),
            ("budget.panoramic_quality_floor", b.panoramic_quality_floor),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ConfigError::Validation(format!("{name} must be 1-100")));
            }
        }
        if self.processing.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_workers must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Where the cache root comes from: the configured path or the platform default.
    pub fn cache_root_provider(&self) -> Box<dyn CacheRootProvider> {
        match &self.cache_root {
            Some(root) => Box::new(FixedCacheRoot(root.clone())),
            None => Box::new(SystemCacheRoot),
        }
    }
}

/// Size budgets for the two compression branches.
///
/// Requests carry their own budget for normal images, so there is no
/// separate normal-branch budget: the compressor's 300 KiB default only
/// applies to library callers of `Compressor::compress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetConfig {
    /// Budget used by requests that do not name one.
    pub request_max_bytes: u64,
    pub normal_quality_floor: u32,
    /// Panoramic images ignore the request budget and always use this one.
    pub panoramic_max_bytes: u64,
    pub panoramic_quality_floor: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            request_max_bytes: crate::request::DEFAULT_REQUEST_BUDGET,
            normal_quality_floor: SizeBudget::NORMAL.quality_floor.value(),
            panoramic_max_bytes: SizeBudget::PANORAMIC.max_bytes,
            panoramic_quality_floor: SizeBudget::PANORAMIC.quality_floor.value(),
        }
    }
}

impl BudgetConfig {
    /// Stock normal budget with the configured quality floor.
    pub fn normal(&self) -> SizeBudget {
        SizeBudget::new(SizeBudget::NORMAL.max_bytes, self.normal_quality_floor)
    }

    pub fn panoramic(&self) -> SizeBudget {
        SizeBudget::new(self.panoramic_max_bytes, self.panoramic_quality_floor)
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of compression workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_workers: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_workers.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Parse and validate config from a TOML string.
pub fn parse_config(content: &str) -> Result<CompressConfig, ConfigError> {
    let config: CompressConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`.
///
/// Returns defaults if the file does not exist. Returns `Err` if it exists
/// but is unreadable, invalid TOML, or fails validation.
pub fn load_config(path: &Path) -> Result<CompressConfig, ConfigError> {
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(CompressConfig::default());
    }
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# picker-compress configuration
# =============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Directory the compression cache lives under. A "boxing" sub-directory is
# created inside it. Defaults to the platform cache directory
# (~/.cache on Linux, ~/Library/Caches on macOS).
# cache_root = "/var/cache/picker"

# ---------------------------------------------------------------------------
# Size budgets
# ---------------------------------------------------------------------------
[budget]
# Budget for ordinary images (1 MiB). `compress --budget` overrides it.
request_max_bytes = 1048576

# Lowest JPEG quality the search may go down to for ordinary images.
normal_quality_floor = 20

# Images with an aspect ratio of 3:1 or more always use this budget.
panoramic_max_bytes = 1048576
panoramic_quality_floor = 50

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of compression workers.
# Defaults to the number of CPU cores. Larger values are clamped down.
# max_workers = 4
"##
}
