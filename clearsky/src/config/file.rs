//! Loading `~/.clearsky/config.ini` and deriving runtime objects from it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::parser::parse_ini;
use super::settings::ConfigFile;
use crate::dispatch::DispatchPlan;
use crate::grid::AreaOfInterest;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read or parse the config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to read a file the config points at
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// A required startup parameter is not set
    #[error("Missing configuration: {section}.{key} must be set")]
    Missing { section: String, key: String },
}

impl ConfigFileError {
    pub(crate) fn missing(section: &str, key: &str) -> Self {
        Self::Missing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn invalid(section: &str, key: &str, value: &str, reason: &str) -> Self {
        Self::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path (~/.clearsky/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(content).map_err(ini::Error::Parse)?;
        parse_ini(&ini)
    }

    /// Ordered dataset identifiers with the source prefix applied.
    ///
    /// Inline `datasets` come first, then the lines of `datasets_file`.
    /// Blank lines and `#` comments in the file are skipped.
    pub fn dataset_list(&self) -> Result<Vec<String>, ConfigFileError> {
        let mut ids = self.dispatch.datasets.clone();
        if let Some(path) = &self.dispatch.datasets_file {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
                path: path.clone(),
                source,
            })?;
            ids.extend(split_list(&content));
        }
        let prefix = &self.dispatch.source_prefix;
        Ok(ids.into_iter().map(|id| format!("{}{}", prefix, id)).collect())
    }

    /// The configured area of interest.
    pub fn area(&self) -> Result<AreaOfInterest, ConfigFileError> {
        let d = &self.dispatch;
        if d.extent == 0 {
            return Err(ConfigFileError::invalid(
                "dispatch",
                "extent",
                "0",
                "must be greater than zero",
            ));
        }
        if d.tile_size == 0 {
            return Err(ConfigFileError::invalid(
                "dispatch",
                "tile_size",
                "0",
                "must be greater than zero",
            ));
        }
        AreaOfInterest::square(d.extent, d.tile_size).map_err(|e| {
            ConfigFileError::invalid("dispatch", "extent", &d.extent.to_string(), &e.to_string())
        })
    }

    /// Everything a dispatch run needs, or the first missing parameter.
    pub fn dispatch_plan(&self) -> Result<DispatchPlan, ConfigFileError> {
        let area = self.area()?;
        let datasets = self.dataset_list()?;
        if datasets.is_empty() {
            return Err(ConfigFileError::missing("dispatch", "datasets"));
        }
        let destination = self
            .dispatch
            .destination_prefix
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigFileError::missing("dispatch", "destination_prefix"))?;
        Ok(DispatchPlan::new(area, datasets, destination).with_limit(self.dispatch.limit))
    }

    /// The configured push endpoint.
    pub fn push_endpoint(&self) -> Result<&str, ConfigFileError> {
        self.queue
            .push_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ConfigFileError::missing("queue", "push_endpoint"))
    }

    /// Listen address, with the port replaced by `port` when given.
    ///
    /// `port` is typically the `PORT` environment variable.
    pub fn listen_addr(&self, port: Option<&str>) -> Result<SocketAddr, ConfigFileError> {
        let listen = &self.worker.listen;
        let mut addr: SocketAddr = listen.parse().map_err(|_| {
            ConfigFileError::invalid("worker", "listen", listen, "expected host:port")
        })?;
        if let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) {
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigFileError::invalid("env", "PORT", port, "expected a port number"))?;
            addr.set_port(port);
        }
        Ok(addr)
    }
}

/// Split a comma- or newline-separated list, dropping blanks and comments.
pub(super) fn split_list(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .split(|c: char| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with('#'))
        .map(str::to_string)
}

/// Get the path to the config directory (~/.clearsky).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".clearsky")
}

/// Get the path to the config file (~/.clearsky/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Window;

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp_dir.path().join("missing.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_dispatch_plan_requires_datasets_and_destination() {
        let mut config = ConfigFile::default();
        assert!(matches!(
            config.dispatch_plan(),
            Err(ConfigFileError::Missing { ref key, .. }) if key == "datasets"
        ));

        config.dispatch.datasets = vec!["a.tif".into()];
        assert!(matches!(
            config.dispatch_plan(),
            Err(ConfigFileError::Missing { ref key, .. }) if key == "destination_prefix"
        ));

        config.dispatch.destination_prefix = Some("gs://out/".into());
        config.dispatch.tile_size = 0;
        assert!(matches!(
            config.dispatch_plan(),
            Err(ConfigFileError::InvalidValue { ref key, .. }) if key == "tile_size"
        ));
    }

    #[test]
    fn test_dataset_list_merges_file_and_prefix() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let list = temp_dir.path().join("scenes.txt");
        std::fs::write(&list, "# winter\nt3.tif\n\nt4.tif\n").unwrap();

        let mut config = ConfigFile::default();
        config.dispatch.source_prefix = "gs://scenes/".into();
        config.dispatch.datasets = vec!["t1.tif".into(), "t2.tif".into()];
        config.dispatch.datasets_file = Some(list);

        assert_eq!(
            config.dataset_list().unwrap(),
            vec![
                "gs://scenes/t1.tif",
                "gs://scenes/t2.tif",
                "gs://scenes/t3.tif",
                "gs://scenes/t4.tif"
            ]
        );
    }

    #[test]
    fn test_dispatch_plan_from_config() {
        let mut config = ConfigFile::default();
        config.dispatch.extent = 10;
        config.dispatch.tile_size = 4;
        config.dispatch.limit = Some(2);
        config.dispatch.datasets = vec!["a.tif".into()];
        config.dispatch.destination_prefix = Some("out/".into());

        let plan = config.dispatch_plan().unwrap();
        let jobs = plan.jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].window, Window::new(0, 4, 4, 4));
        assert_eq!(jobs[1].destination, "out/tile0-4.tif");
    }

    #[test]
    fn test_listen_addr_port_override() {
        let config = ConfigFile::default();
        assert_eq!(config.listen_addr(None).unwrap().port(), 8080);
        assert_eq!(config.listen_addr(Some("9000")).unwrap().port(), 9000);
        assert_eq!(config.listen_addr(Some(" ")).unwrap().port(), 8080);
        assert!(config.listen_addr(Some("http")).is_err());
    }

    #[test]
    fn test_push_endpoint_missing() {
        let config = ConfigFile::default();
        assert!(matches!(
            config.push_endpoint(),
            Err(ConfigFileError::Missing { .. })
        ));
    }
}
