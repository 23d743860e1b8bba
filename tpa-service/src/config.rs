//! Settings resolution for tpa-service
//!
//! Priority per setting: command line / environment (via clap) → TOML → built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tpa_common::config::{resolve_root_folder, TomlConfig};
use tpa_common::{Error, Result};
use tracing::info;

use crate::models::FrequencyRange;
use crate::services::data_loader::DEFAULT_MATRIX_ELEMENT_LIMIT;
use crate::services::tpa_engine::AnalysisDefaults;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5731;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 300;
pub const ROOT_FOLDER_ENV: &str = "TPA_ROOT_FOLDER";

/// Values given on the command line (or their environment variables)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub root_folder: Option<PathBuf>,
}

/// Job pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub defaults: AnalysisDefaults,
    /// Deadline measured from submission
    pub job_timeout: Duration,
    /// Arrays above this many elements are replaced by a size marker
    pub matrix_element_limit: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            defaults: AnalysisDefaults::default(),
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            matrix_element_limit: DEFAULT_MATRIX_ELEMENT_LIMIT,
        }
    }
}

/// Fully resolved service settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub host: String,
    pub port: u16,
    pub root_folder: PathBuf,
    pub upload_folder: PathBuf,
    pub database_path: PathBuf,
    pub max_upload_bytes: u64,
    pub cors_origins: Vec<String>,
    pub log_level: String,
    pub analysis: AnalysisSettings,
}

impl ServiceSettings {
    /// Defaults rooted at `root_folder`
    pub fn for_root(root_folder: &Path) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            root_folder: root_folder.to_path_buf(),
            upload_folder: root_folder.join("uploads"),
            database_path: root_folder.join("tpa.db"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_origins: Vec::new(),
            log_level: "info".to_string(),
            analysis: AnalysisSettings::default(),
        }
    }

    /// Merge command line values over the TOML config
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let root_folder = resolve_root_folder(cli.root_folder.as_deref(), ROOT_FOLDER_ENV, toml);
        let mut settings = Self::for_root(&root_folder);

        if let Some(host) = cli.host.clone().or_else(|| toml.server.host.clone()) {
            settings.host = host;
        }
        if let Some(port) = cli.port.or(toml.server.port) {
            settings.port = port;
        }
        settings.cors_origins = toml.server.cors_origins.clone();
        settings.log_level = toml.logging.level.clone();

        let storage = &toml.storage;
        if let Some(folder) = &storage.upload_folder {
            settings.upload_folder = folder.clone();
        }
        if let Some(path) = &storage.database_path {
            settings.database_path = path.clone();
        }
        if let Some(bytes) = storage.max_upload_bytes {
            settings.max_upload_bytes = bytes;
        }

        let analysis = &toml.analysis;
        let range = &mut settings.analysis.defaults.frequency_range;
        if let Some(min) = analysis.default_frequency_min {
            range.min = min;
        }
        if let Some(max) = analysis.default_frequency_max {
            range.max = max;
        }
        if let Some(points) = analysis.default_frequency_resolution {
            settings.analysis.defaults.frequency_resolution = points;
        }
        if let Some(points) = analysis.max_frequency_resolution {
            settings.analysis.defaults.max_frequency_resolution = points;
        }
        if let Some(secs) = analysis.job_timeout_seconds {
            settings.analysis.job_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = analysis.matrix_element_limit {
            settings.analysis.matrix_element_limit = limit;
        }

        settings.validate()?;
        info!(
            root_folder = %settings.root_folder.display(),
            upload_folder = %settings.upload_folder.display(),
            database = %settings.database_path.display(),
            "Settings resolved"
        );
        Ok(settings)
    }

    /// Reject settings that would make every job fail
    pub fn validate(&self) -> Result<()> {
        let FrequencyRange { min, max } = self.analysis.defaults.frequency_range;
        if !(min > 0.0 && max > min) {
            return Err(Error::Config(format!(
                "default frequency range must satisfy 0 < min < max, got {min}..{max}"
            )));
        }
        if self.analysis.defaults.frequency_resolution < 2 {
            return Err(Error::Config(
                "default_frequency_resolution must be at least 2".to_string(),
            ));
        }
        let AnalysisDefaults {
            frequency_resolution,
            max_frequency_resolution,
            ..
        } = self.analysis.defaults;
        if frequency_resolution > max_frequency_resolution {
            return Err(Error::Config(format!(
                "default_frequency_resolution must not exceed max_frequency_resolution ({max_frequency_resolution})"
            )));
        }
        if self.analysis.job_timeout.is_zero() {
            return Err(Error::Config("job_timeout_seconds must be positive".to_string()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpa_common::config::{AnalysisConfig, ServerConfig, StorageConfig};

    #[test]
    fn test_defaults_under_root() {
        let settings = ServiceSettings::for_root(Path::new("/data/tpa"));
        assert_eq!(settings.upload_folder, PathBuf::from("/data/tpa/uploads"));
        assert_eq!(settings.database_path, PathBuf::from("/data/tpa/tpa.db"));
        assert_eq!(settings.bind_address(), "127.0.0.1:5731");
        assert_eq!(settings.analysis.job_timeout, Duration::from_secs(300));
        assert_eq!(settings.analysis.matrix_element_limit, 10_000);
        assert_eq!(settings.analysis.defaults.max_frequency_resolution, 10_000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            server: ServerConfig {
                host: Some("0.0.0.0".to_string()),
                port: Some(9000),
                cors_origins: vec!["http://localhost:3000".to_string()],
            },
            storage: StorageConfig {
                max_upload_bytes: Some(1024),
                ..Default::default()
            },
            analysis: AnalysisConfig {
                job_timeout_seconds: Some(5),
                default_frequency_resolution: Some(50),
                ..Default::default()
            },
            ..Default::default()
        };
        let cli = CliOverrides {
            port: Some(7000),
            root_folder: Some(PathBuf::from("/from/cli")),
            ..Default::default()
        };

        let settings = ServiceSettings::resolve(&cli, &toml).unwrap();
        assert_eq!(settings.root_folder, PathBuf::from("/from/cli"));
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 7000);
        assert_eq!(settings.max_upload_bytes, 1024);
        assert_eq!(settings.cors_origins.len(), 1);
        assert_eq!(settings.analysis.job_timeout, Duration::from_secs(5));
        assert_eq!(settings.analysis.defaults.frequency_resolution, 50);
    }

    #[test]
    fn test_invalid_frequency_defaults_rejected() {
        let toml = TomlConfig {
            analysis: AnalysisConfig {
                default_frequency_min: Some(500.0),
                default_frequency_max: Some(100.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let cli = CliOverrides {
            root_folder: Some(PathBuf::from("/tmp/tpa")),
            ..Default::default()
        };
        assert!(matches!(
            ServiceSettings::resolve(&cli, &toml),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_resolution_cap_from_toml() {
        let cli = CliOverrides {
            root_folder: Some(PathBuf::from("/tmp/tpa")),
            ..Default::default()
        };
        let toml = TomlConfig {
            analysis: AnalysisConfig {
                max_frequency_resolution: Some(500),
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = ServiceSettings::resolve(&cli, &toml).unwrap();
        assert_eq!(settings.analysis.defaults.max_frequency_resolution, 500);

        let toml = TomlConfig {
            analysis: AnalysisConfig {
                default_frequency_resolution: Some(200),
                max_frequency_resolution: Some(100),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            ServiceSettings::resolve(&cli, &toml),
            Err(Error::Config(_))
        ));
    }
}
