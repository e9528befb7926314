use serde::{Deserialize, Serialize};
use std::fmt;

/// Global type definitions
///
/// Stores the ids, sizes, configuration structs, and the crate-level error
/// type shared by the cache and allocator modules.
/// Device id type
pub type DeviceId = u32;

/// Disk block number type
pub type BlockNo = u32;

/// Disk block size in bytes
pub const BLOCK_SIZE: usize = 1024;

/// Physical page size in bytes
pub const PAGE_SIZE: usize = 4096;

/// Default number of buffer slots in the cache pool
pub const DEFAULT_CACHE_BLOCKS: usize = 30;

/// Default number of cache buckets
pub const DEFAULT_CACHE_BUCKETS: usize = 13;

/// Default number of managed pages (4MB)
pub const DEFAULT_TOTAL_PAGES: usize = 1024;

/// Buffer cache sizing
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of buffer slots in the fixed pool
    pub blocks: usize,
    /// Number of independently locked buckets
    pub buckets: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            blocks: DEFAULT_CACHE_BLOCKS,
            buckets: DEFAULT_CACHE_BUCKETS,
        }
    }
}

/// Page allocator sizing
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocConfig {
    /// Total pages in the managed range, including the reference-table
    /// prefix the allocator reserves for itself
    pub total_pages: usize,
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self {
            total_pages: DEFAULT_TOTAL_PAGES,
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

/// Core configuration for the demo binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Data directory path for file-backed devices
    pub data_dir: String,
    /// Buffer cache sizing
    pub cache: CacheConfig,
    /// Page allocator sizing
    pub alloc: AllocConfig,
    /// Whether to enable logging
    pub enable_log: bool,
    /// Log level
    pub log_level: LogLevel,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: String::from("./data"),
            cache: CacheConfig::default(),
            alloc: AllocConfig::default(),
            enable_log: true,
            log_level: LogLevel::Info,
        }
    }
}

/// Crate-level error type
#[derive(Debug)]
pub enum CoreError {
    /// Device transfer error
    Disk(crate::disk::DiskError),
    /// Cache operation error
    Cache(crate::cache::CacheError),
    /// Configuration error
    Config(String),
    /// I/O operation error
    Io(std::io::Error),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Disk(err) => write!(f, "disk error: {}", err),
            CoreError::Cache(err) => write!(f, "cache error: {}", err),
            CoreError::Config(msg) => write!(f, "configuration error: {}", msg),
            CoreError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Disk(err) => Some(err),
            CoreError::Cache(err) => Some(err),
            CoreError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<crate::disk::DiskError> for CoreError {
    fn from(err: crate::disk::DiskError) -> Self {
        CoreError::Disk(err)
    }
}

impl From<crate::cache::CacheError> for CoreError {
    fn from(err: crate::cache::CacheError) -> Self {
        CoreError::Cache(err)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Config(err.to_string())
    }
}

/// Crate-level result type
pub type CoreResult<T> = Result<T, CoreError>;
