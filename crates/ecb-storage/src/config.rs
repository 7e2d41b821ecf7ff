//! Backend configuration.

use std::path::PathBuf;

/// Default LMDB directory.
pub const DEFAULT_DATA_DIR: &str = "./ecb-data";

/// Default LMDB map size in megabytes.
pub const DEFAULT_MAP_SIZE_MB: usize = 1024;

/// Where and how large the LMDB environment is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmdbConfig {
    /// Directory holding the environment.
    pub path: PathBuf,
    /// Maximum size of the memory map, in bytes.
    pub map_size: usize,
}

impl Default for LmdbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATA_DIR),
            map_size: DEFAULT_MAP_SIZE_MB * 1024 * 1024,
        }
    }
}

impl LmdbConfig {
    /// Read `ECB_DATA_DIR` and `ECB_MAP_SIZE_MB`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let path = std::env::var("ECB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        let map_size_mb: usize = std::env::var("ECB_MAP_SIZE_MB")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_MAP_SIZE_MB);

        Self {
            path,
            map_size: map_size_mb * 1024 * 1024,
        }
    }

    /// Use a different directory.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Use a different map size, in bytes.
    #[must_use]
    pub const fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = LmdbConfig::default()
            .with_path("/tmp/ecb")
            .with_map_size(16 * 1024 * 1024);
        assert_eq!(config.path, PathBuf::from("/tmp/ecb"));
        assert_eq!(config.map_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_default_map_size() {
        assert_eq!(LmdbConfig::default().map_size, 1024 * 1024 * 1024);
    }
}
