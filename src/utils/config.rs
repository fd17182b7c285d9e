//! 配置管理模块
//!
//! TOML 配置文件，所有段落均可省略:
//!
//! ```toml
//! [cache]
//! max_size_mb = 50
//! ttl_seconds = 1800
//! max_entries = 500
//!
//! [router]
//! decision_cache_capacity = 10000
//!
//! [catalog]
//! raw_source = "events_parquet"
//! implicit_dimensions = ["type"]
//! raw_only_columns = ["ts", "auction_id", "user_id"]
//!
//! [[catalog.rollups]]
//! name = "by_country"
//! dimensions = ["country", "type"]
//! priority = 8
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cache::{CacheConfig, ResultCache};
use crate::query::catalog::{
    RollupCatalog, RollupDescriptor, DEFAULT_IMPLICIT_DIMENSIONS, DEFAULT_RAW_ONLY_COLUMNS,
    RAW_SOURCE,
};
use crate::query::router::{RollupRouter, RouterConfig};
use crate::{Result, RollupError};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/rollup.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RollupError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content)?;
        log::info!(
            "loaded config from {} ({} custom rollups)",
            path.as_ref().display(),
            config.catalog.rollups.len()
        );
        Ok(config)
    }

    /// 加载默认配置文件
    pub fn load_default() -> Result<Self> {
        Self::load_from_file(DEFAULT_CONFIG_PATH)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RollupError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    pub fn build_cache(&self) -> ResultCache {
        ResultCache::new(self.cache.to_cache_config())
    }

    pub fn build_catalog(&self) -> Result<RollupCatalog> {
        self.catalog.build()
    }

    pub fn build_router(&self) -> Result<RollupRouter> {
        Ok(RollupRouter::new(self.build_catalog()?, self.router.clone()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// [cache]
// ═══════════════════════════════════════════════════════════════════════════

fn default_max_size_mb() -> usize {
    50
}

fn default_ttl_seconds() -> u64 {
    1800
}

fn default_max_entries() -> usize {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: usize,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_size_mb(),
            ttl_seconds: default_ttl_seconds(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_max_size(self.max_size_mb * 1024 * 1024)
            .with_ttl(Duration::from_secs(self.ttl_seconds))
            .with_max_entries(self.max_entries)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// [catalog]
// ═══════════════════════════════════════════════════════════════════════════

fn default_raw_source() -> String {
    RAW_SOURCE.to_string()
}

fn default_implicit_dimensions() -> Vec<String> {
    DEFAULT_IMPLICIT_DIMENSIONS.iter().map(|s| s.to_string()).collect()
}

fn default_raw_only_columns() -> Vec<String> {
    DEFAULT_RAW_ONLY_COLUMNS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// 为空时使用内置的 12 张 rollup
    #[serde(default)]
    pub rollups: Vec<RollupDescriptor>,
    #[serde(default = "default_raw_source")]
    pub raw_source: String,
    #[serde(default = "default_implicit_dimensions")]
    pub implicit_dimensions: Vec<String>,
    #[serde(default = "default_raw_only_columns")]
    pub raw_only_columns: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            rollups: Vec::new(),
            raw_source: default_raw_source(),
            implicit_dimensions: default_implicit_dimensions(),
            raw_only_columns: default_raw_only_columns(),
        }
    }
}

impl CatalogConfig {
    pub fn build(&self) -> Result<RollupCatalog> {
        let catalog = if self.rollups.is_empty() {
            RollupCatalog::standard()
        } else {
            RollupCatalog::new(self.rollups.clone())?
        };
        catalog
            .with_implicit_dimensions(self.implicit_dimensions.iter().cloned())
            .with_raw_only_columns(self.raw_only_columns.iter().cloned())
            .with_raw_source(self.raw_source.clone())
    }
}
