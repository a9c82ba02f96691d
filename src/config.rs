//! Configuration management for the Lumberjack server

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::host::local_hostname;
use crate::engine::retention::{DEFAULT_FILES_TO_EVICT, DEFAULT_MAX_FILES};
use crate::engine::{EngineConfig, RetentionPolicy, TimeBucketPolicy};
use crate::error::{LogError, LogResult};

/// Cap on the number of files in the log directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Maximum number of files kept across all streams (default: 2000)
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Oldest files deleted each time the cap is exceeded (default: 2)
    #[serde(default = "default_files_to_evict")]
    pub files_to_evict: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            files_to_evict: default_files_to_evict(),
        }
    }
}

/// Where the server's own diagnostics go
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Filter directive used when RUST_LOG is unset (default: "lumberjack=info")
    #[serde(default = "default_diagnostics_level")]
    pub level: String,

    /// Append diagnostics to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            level: default_diagnostics_level(),
            file: None,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory receiving the stream files; `~` is expanded
    #[serde(default = "default_log_directory")]
    pub log_directory: String,

    /// Address the HTTP server binds to (default: 127.0.0.1)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Port for the HTTP server (default: 8080)
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Maximum number of distinct stream names (default: 64)
    #[serde(default = "default_max_streams")]
    pub max_streams: usize,

    /// Width of a rotation bucket in minutes, must divide 60 (default: 15)
    #[serde(default = "default_bucket_minutes")]
    pub bucket_minutes: u32,

    /// Host name used in file names; looked up from the OS when unset
    #[serde(default)]
    pub hostname: Option<String>,

    /// File cap; when absent files are never evicted
    #[serde(default)]
    pub retention: Option<RetentionConfig>,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

fn default_log_directory() -> String {
    "./log".to_string()
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_listen_port() -> u16 {
    8080
}

fn default_max_streams() -> usize {
    64
}

fn default_bucket_minutes() -> u32 {
    15
}

fn default_max_files() -> usize {
    DEFAULT_MAX_FILES
}

fn default_files_to_evict() -> usize {
    DEFAULT_FILES_TO_EVICT
}

fn default_diagnostics_level() -> String {
    "lumberjack=info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            bind_address: default_bind_address(),
            listen_port: default_listen_port(),
            max_streams: default_max_streams(),
            bucket_minutes: default_bucket_minutes(),
            hostname: None,
            retention: None,
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from `path`, or from the default location; defaults if neither exists
    ///
    /// An explicitly given path must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = config_file_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check every value the engine depends on
    pub fn validate(&self) -> LogResult<()> {
        self.engine_config().map(|_| ())
    }

    /// Log directory with `~` and environment variables expanded
    pub fn log_directory_path(&self) -> LogResult<PathBuf> {
        let expanded = shellexpand::full(&self.log_directory).map_err(|e| {
            LogError::invalid_config(format!("log_directory {:?}: {}", self.log_directory, e))
        })?;
        if expanded.trim().is_empty() {
            return Err(LogError::invalid_config("log_directory cannot be empty"));
        }
        Ok(PathBuf::from(expanded.into_owned()))
    }

    /// Socket address for the HTTP server
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.listen_port)
    }

    /// Validated engine settings
    pub fn engine_config(&self) -> LogResult<EngineConfig> {
        let policy = TimeBucketPolicy::new(self.bucket_minutes)?;

        if self.max_streams == 0 {
            return Err(LogError::invalid_config("max_streams must be at least 1"));
        }

        let retention = self
            .retention
            .as_ref()
            .map(|r| RetentionPolicy::new(r.max_files, r.files_to_evict))
            .transpose()?;

        let hostname = match &self.hostname {
            Some(name) if name.trim().is_empty() || name.contains(['/', '\\']) => {
                return Err(LogError::invalid_config(format!(
                    "hostname cannot be used in file names: {:?}",
                    name
                )));
            }
            Some(name) => name.trim().to_string(),
            None => local_hostname(),
        };

        let log_directory = self.log_directory_path()?;
        if let Some(file) = &self.diagnostics.file {
            let parent = match file.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            // The ledger counts every file in the log directory
            if same_directory(parent, &log_directory) {
                return Err(LogError::invalid_config(format!(
                    "diagnostics file {} cannot live in log_directory",
                    file.display()
                )));
            }
        }

        Ok(EngineConfig {
            log_directory,
            hostname,
            max_streams: self.max_streams,
            policy,
            retention,
        })
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => lexical_absolute(a) == lexical_absolute(b),
    }
}

/// Absolute form of `path` with `.` components dropped, without touching the filesystem
fn lexical_absolute(path: &Path) -> PathBuf {
    let path = if path.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    };
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Get the base configuration directory (~/.lumberjack)
/// Falls back to ./.lumberjack if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".lumberjack"))
        .unwrap_or_else(|| {
            tracing::warn!(
                "Could not determine home directory, using current directory for config"
            );
            PathBuf::from(".lumberjack")
        })
}

/// Get the path to the default config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen_port, 8080);
        assert_eq!(config.bucket_minutes, 15);
        assert_eq!(config.max_streams, 64);
        assert!(config.retention.is_none());
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.retention = Some(RetentionConfig::default());
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.listen_port, parsed.listen_port);
        assert_eq!(parsed.retention, Some(RetentionConfig::default()));
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::parse(
            r#"
            log_directory = "/var/log/lumberjack"
            listen_port = 9100
            bucket_minutes = 5

            [retention]
            max_files = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_port, 9100);
        assert_eq!(config.max_streams, 64);
        let retention = config.retention.clone().unwrap();
        assert_eq!(retention.max_files, 500);
        assert_eq!(retention.files_to_evict, DEFAULT_FILES_TO_EVICT);

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.log_directory, PathBuf::from("/var/log/lumberjack"));
        assert_eq!(engine.policy.bucket_minutes(), 5);
        assert_eq!(engine.retention.unwrap().max_files(), 500);
    }

    #[test]
    fn test_invalid_bucket_minutes() {
        let mut config = Config::default();
        config.bucket_minutes = 7;
        assert!(matches!(config.validate(), Err(LogError::InvalidConfig(_))));
        config.bucket_minutes = 0;
        assert!(config.validate().is_err());
        config.bucket_minutes = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_retention() {
        let mut config = Config::default();
        config.retention = Some(RetentionConfig {
            max_files: 5,
            files_to_evict: 6,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hostname_override() {
        let mut config = Config::default();
        config.hostname = Some("web-7".to_string());
        assert_eq!(config.engine_config().unwrap().hostname, "web-7");

        config.hostname = Some("a/b".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_diagnostics_file_in_log_directory_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let logs = temp_dir.path().join("logs");
        let mut config = Config::default();
        config.log_directory = logs.to_string_lossy().into_owned();

        // Directory not created yet
        config.diagnostics.file = Some(logs.join("lumberjack.log"));
        assert!(matches!(config.validate(), Err(LogError::InvalidConfig(_))));

        std::fs::create_dir(&logs).unwrap();
        config.diagnostics.file = Some(logs.join(".").join("lumberjack.log"));
        assert!(matches!(config.validate(), Err(LogError::InvalidConfig(_))));

        config.diagnostics.file = Some(temp_dir.path().join("lumberjack.log"));
        assert!(config.validate().is_ok());

        config.diagnostics.file = Some(logs.join("server").join("lumberjack.log"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tilde_expansion() {
        let mut config = Config::default();
        config.log_directory = "~/lj-logs".to_string();
        let path = config.log_directory_path().unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path, home.join("lj-logs"));
        }
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.toml");
        assert!(Config::load_or_default(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "max_streams = 3\n[diagnostics]\nlevel = \"debug\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_streams, 3);
        assert_eq!(config.diagnostics.level, "debug");
        assert!(config.diagnostics.file.is_none());
    }

    #[test]
    fn test_config_dir_does_not_panic() {
        let dir = config_dir();
        assert!(dir.ends_with(".lumberjack"));
    }
}
