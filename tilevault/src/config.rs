//! Configuration for the tile cache.
//!
//! `VaultConfig` combines everything needed to assemble a working cache:
//! the tile source, the store location and budget, and the download
//! behaviour. It can be built in code with the `with_*` setters or
//! loaded from an INI file (`[source]`, `[cache]`, `[download]`
//! sections), with every absent key falling back to its default.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::coord::{ZoomRange, MAX_ZOOM, MIN_ZOOM};
use crate::provider::DEFAULT_TIMEOUT_SECS;
use crate::scheduler::{RetryPolicy, SchedulerConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_WORKERS};

/// Default tile source: the OpenStreetMap raster endpoint with its
/// standard subdomain rotation.
pub const DEFAULT_URL_TEMPLATE: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Default subdomain rotation for the OSM endpoint.
pub const DEFAULT_SUBDOMAINS: [&str; 3] = ["a", "b", "c"];

/// Directory name used under the platform cache/config directories.
pub const APP_DIR_NAME: &str = "tilevault";

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or parsed as INI.
    #[error("failed to read config file {path}: {reason}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Parser or I/O failure.
        reason: String,
    },

    /// A key holds a value of the wrong shape.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Fully qualified key, e.g. `download.workers`.
        key: String,
        /// The offending raw value.
        value: String,
    },
}

/// Remote tile source settings.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// URL template with `{s}`, `{z}`, `{x}`, `{y}` placeholders.
    pub url_template: String,
    /// Subdomains substituted for `{s}`.
    pub subdomains: Vec<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl SourceConfig {
    /// Per-request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            subdomains: DEFAULT_SUBDOMAINS.iter().map(|s| s.to_string()).collect(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Local store settings.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Root directory of the disk store.
    pub directory: PathBuf,
    /// Byte budget; `None` means unbounded.
    pub max_size_bytes: Option<u64>,
}

impl CacheConfig {
    /// Creates a cache config rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_size_bytes: None,
        }
    }

    /// Sets the byte budget.
    pub fn with_max_size(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = Some(max_size_bytes);
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let directory = dirs::cache_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(".tilevault-cache"));
        Self::new(directory)
    }
}

/// Bulk download behaviour.
#[derive(Clone, Debug)]
pub struct DownloadConfig {
    /// Worker pool size.
    pub workers: usize,
    /// Attempts per tile (including the first) for transient failures.
    pub max_attempts: u32,
    /// Lowest zoom accepted for bulk operations.
    pub min_zoom: u8,
    /// Highest zoom accepted for bulk operations.
    pub max_zoom: u8,
}

impl DownloadConfig {
    /// Converts into the scheduler's configuration.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.workers,
            retry: RetryPolicy::exponential(self.max_attempts),
            zoom_range: ZoomRange::new(self.min_zoom, self.max_zoom),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default)]
pub struct VaultConfig {
    /// Tile source settings.
    pub source: SourceConfig,
    /// Store settings.
    pub cache: CacheConfig,
    /// Download settings.
    pub download: DownloadConfig,
}

impl VaultConfig {
    /// The conventional config file location
    /// (`<config dir>/tilevault/config.ini`), if the platform exposes a
    /// config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.ini"))
    }

    /// Loads configuration from an INI file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] when the file cannot be read or parsed,
    /// [`ConfigError::InvalidValue`] when a present key does not parse.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;

        let mut config = Self::default();

        if let Some(section) = ini.section(Some("source")) {
            if let Some(template) = section.get("url_template") {
                config.source.url_template = template.to_string();
            }
            if let Some(subdomains) = section.get("subdomains") {
                config.source.subdomains = subdomains
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            if let Some(timeout) = parse_key(section.get("timeout_secs"), "source.timeout_secs")? {
                config.source.timeout_secs = timeout;
            }
        }

        if let Some(section) = ini.section(Some("cache")) {
            if let Some(directory) = section.get("directory") {
                config.cache.directory = PathBuf::from(directory);
            }
            if let Some(max_mb) = parse_key::<u64>(section.get("max_size_mb"), "cache.max_size_mb")?
            {
                config.cache.max_size_bytes = Some(max_mb * 1024 * 1024);
            }
        }

        if let Some(section) = ini.section(Some("download")) {
            if let Some(workers) = parse_key(section.get("workers"), "download.workers")? {
                config.download.workers = workers;
            }
            if let Some(attempts) = parse_key(section.get("max_attempts"), "download.max_attempts")?
            {
                config.download.max_attempts = attempts;
            }
            if let Some(min_zoom) = parse_key(section.get("min_zoom"), "download.min_zoom")? {
                config.download.min_zoom = min_zoom;
            }
            if let Some(max_zoom) = parse_key(section.get("max_zoom"), "download.max_zoom")? {
                config.download.max_zoom = max_zoom;
            }
        }

        Ok(config)
    }
}

fn parse_key<T: FromStr>(raw: Option<&str>, key: &str) -> Result<Option<T>, ConfigError> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_sane() {
        let config = VaultConfig::default();
        assert!(config.source.url_template.contains("{z}"));
        assert_eq!(config.source.subdomains.len(), 3);
        assert_eq!(config.download.workers, DEFAULT_WORKERS);
        assert!(config.cache.max_size_bytes.is_none());
    }

    #[test]
    fn test_scheduler_config_conversion() {
        let download = DownloadConfig {
            workers: 8,
            max_attempts: 5,
            min_zoom: 3,
            max_zoom: 15,
        };
        let sched = download.scheduler_config();
        assert_eq!(sched.workers, 8);
        assert_eq!(sched.retry.max_attempts(), 5);
        assert!(sched.zoom_range.contains(15));
        assert!(!sched.zoom_range.contains(16));
    }

    #[test]
    fn test_load_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[source]\n\
             url_template = https://tiles.example.com/{{z}}/{{x}}/{{y}}.png\n\
             subdomains = t1, t2\n\
             timeout_secs = 10\n\
             \n\
             [cache]\n\
             directory = /var/cache/tiles\n\
             max_size_mb = 512\n\
             \n\
             [download]\n\
             workers = 6\n\
             max_attempts = 4\n\
             min_zoom = 2\n\
             max_zoom = 16"
        )
        .unwrap();

        let config = VaultConfig::load(file.path()).unwrap();
        assert_eq!(
            config.source.url_template,
            "https://tiles.example.com/{z}/{x}/{y}.png"
        );
        assert_eq!(config.source.subdomains, vec!["t1", "t2"]);
        assert_eq!(config.source.timeout_secs, 10);
        assert_eq!(config.cache.directory, PathBuf::from("/var/cache/tiles"));
        assert_eq!(config.cache.max_size_bytes, Some(512 * 1024 * 1024));
        assert_eq!(config.download.workers, 6);
        assert_eq!(config.download.max_attempts, 4);
        assert_eq!(config.download.min_zoom, 2);
        assert_eq!(config.download.max_zoom, 16);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[download]\nworkers = 2").unwrap();

        let config = VaultConfig::load(file.path()).unwrap();
        assert_eq!(config.download.workers, 2);
        assert_eq!(config.download.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.source.url_template, DEFAULT_URL_TEMPLATE);
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[download]\nworkers = lots").unwrap();

        let result = VaultConfig::load(file.path());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "download.workers"
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = VaultConfig::load(Path::new("/nonexistent/config.ini"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
