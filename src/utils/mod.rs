//! 工具模块

pub mod config;
pub mod logging;

pub use config::{AppConfig, CacheSettings, CatalogConfig};
pub use logging::init_logger;
