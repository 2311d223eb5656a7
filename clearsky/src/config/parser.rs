//! INI parsing: the single place where key names map to struct fields.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::file::{split_list, ConfigFileError};
use super::settings::ConfigFile;
use super::size::parse_size;

/// Parse an `Ini` into a `ConfigFile`, overlaying the defaults.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [dispatch] section
    if let Some(section) = ini.section(Some("dispatch")) {
        let s = Section::new("dispatch", section);
        if let Some(v) = s.parsed::<u32>("extent", "must be a positive integer (pixels)")? {
            config.dispatch.extent = v;
        }
        if let Some(v) = s.parsed::<u32>("tile_size", "must be a positive integer (pixels)")? {
            config.dispatch.tile_size = v;
        }
        if let Some(v) = s.parsed::<usize>("limit", "must be a non-negative integer")? {
            config.dispatch.limit = (v > 0).then_some(v);
        }
        if let Some(v) = s.text("source_prefix") {
            config.dispatch.source_prefix = v.to_string();
        }
        if let Some(v) = s.text("destination_prefix") {
            config.dispatch.destination_prefix = Some(v.to_string());
        }
        if let Some(v) = s.text("datasets") {
            config.dispatch.datasets = split_list(v).collect();
        }
        if let Some(v) = s.text("datasets_file") {
            config.dispatch.datasets_file = Some(expand_tilde(v));
        }
    }

    // [worker] section
    if let Some(section) = ini.section(Some("worker")) {
        let s = Section::new("worker", section);
        if let Some(v) = s.parsed::<usize>("fetch_concurrency", "must be a positive integer")? {
            if v == 0 {
                return Err(s.invalid("fetch_concurrency", "must be a positive integer"));
            }
            config.worker.fetch_concurrency = v;
        }
        if let Some(v) = s.parsed::<usize>("bands", "must be a positive integer")? {
            if v == 0 {
                return Err(s.invalid("bands", "must be a positive integer"));
            }
            config.worker.bands = v;
        }
        if let Some(v) = s.parsed("policy", "must be 'joint' or 'per_channel'")? {
            config.worker.policy = v;
        }
        if let Some(v) = s.parsed("fetch_failure", "must be 'drain' or 'cancel'")? {
            config.worker.fetch_failure = v;
        }
        if let Some(v) = s.parsed::<u64>("job_timeout", "must be a non-negative integer (seconds)")? {
            config.worker.job_timeout = (v > 0).then(|| Duration::from_secs(v));
        }
        if let Some(v) = s.text("listen") {
            config.worker.listen = v.to_string();
        }
        if let Some(v) = s.text("scratch_dir") {
            config.worker.scratch_dir = Some(expand_tilde(v));
        }
        if let Some(v) = s.parsed::<u32>("output_block_size", "must be a positive integer (pixels)")? {
            if v == 0 {
                return Err(s.invalid("output_block_size", "must be a positive integer (pixels)"));
            }
            config.worker.output_block_size = v;
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        let s = Section::new("cache", section);
        if let Some(v) = s.text("block_size") {
            let size = parse_size(v).ok().filter(|&n| n > 0).ok_or_else(|| {
                s.invalid("block_size", "expected a non-zero size like '64KB' or '1MB'")
            })?;
            config.cache.block_size = size;
        }
        if let Some(v) = s.parsed::<u64>("blocks", "must be a positive integer")? {
            if v == 0 {
                return Err(s.invalid("blocks", "must be a positive integer"));
            }
            config.cache.blocks = v;
        }
    }

    // [storage] section
    if let Some(section) = ini.section(Some("storage")) {
        let s = Section::new("storage", section);
        if let Some(v) = s.text("root") {
            config.storage.root = expand_tilde(v);
        }
    }

    // [queue] section
    if let Some(section) = ini.section(Some("queue")) {
        let s = Section::new("queue", section);
        if let Some(v) = s.text("push_endpoint") {
            if !(v.starts_with("http://") || v.starts_with("https://")) {
                return Err(s.invalid("push_endpoint", "must be an http:// or https:// URL"));
            }
            config.queue.push_endpoint = Some(v.to_string());
        }
        if let Some(v) = s.text("subscription") {
            config.queue.subscription = v.to_string();
        }
        if let Some(v) = s.parsed::<u64>("publish_timeout", "must be a non-negative integer (seconds)")? {
            config.queue.publish_timeout = (v > 0).then(|| Duration::from_secs(v));
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        let s = Section::new("logging", section);
        if let Some(v) = s.text("directory") {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = s.text("file") {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

/// One INI section with its name, for error reporting.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    /// Trimmed non-empty value of `key`.
    fn text(&self, key: &str) -> Option<&'a str> {
        self.props
            .get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str, reason: &str) -> Result<Option<T>, ConfigFileError> {
        match self.text(key) {
            Some(v) => v.parse().map(Some).map_err(|_| self.invalid(key, reason)),
            None => Ok(None),
        }
    }

    fn invalid(&self, key: &str, reason: &str) -> ConfigFileError {
        let value = self.props.get(key).unwrap_or_default();
        ConfigFileError::invalid(self.name, key, value, reason)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::CompositePolicy;
    use crate::fetch::FetchFailurePolicy;
    use tempfile::TempDir;

    fn parse(content: &str) -> Result<ConfigFile, ConfigFileError> {
        ConfigFile::from_ini_str(content)
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
[dispatch]
extent = 2048
tile_size = 256
limit = 4
source_prefix = gs://scenes/
destination_prefix = gs://out/median/
datasets = t1.tif, t2.tif,t3.tif

[worker]
fetch_concurrency = 4
bands = 4
policy = per_channel
fetch_failure = cancel
job_timeout = 0
listen = 127.0.0.1:9090

[cache]
block_size = 128KB
blocks = 50

[storage]
root = /srv/objects

[queue]
push_endpoint = http://localhost:8080/median
subscription = nightly
publish_timeout = 0
"#,
        )
        .unwrap();

        assert_eq!(config.dispatch.extent, 2048);
        assert_eq!(config.dispatch.tile_size, 256);
        assert_eq!(config.dispatch.limit, Some(4));
        assert_eq!(config.dispatch.datasets, vec!["t1.tif", "t2.tif", "t3.tif"]);
        assert_eq!(config.worker.fetch_concurrency, 4);
        assert_eq!(config.worker.bands, 4);
        assert_eq!(config.worker.policy, CompositePolicy::PerChannelMedian);
        assert_eq!(config.worker.fetch_failure, FetchFailurePolicy::Cancel);
        assert_eq!(config.worker.job_timeout, None);
        assert_eq!(config.cache.block_size, 128 * 1024);
        assert_eq!(config.cache.blocks, 50);
        assert_eq!(config.storage.root, PathBuf::from("/srv/objects"));
        assert_eq!(config.queue.subscription, "nightly");
        assert_eq!(config.queue.publish_timeout, None);

        let plan = config.dispatch_plan().unwrap();
        assert_eq!(plan.datasets[0], "gs://scenes/t1.tif");
        assert_eq!(plan.limit, Some(4));

        let options = config.worker.options();
        assert_eq!(options.fetch.concurrency, 4);
        assert_eq!(options.timeout, None);
    }

    #[test]
    fn test_publish_timeout() {
        assert_eq!(
            ConfigFile::default().queue.publish_timeout,
            Some(Duration::from_secs(30))
        );
        let config = parse("[queue]\npublish_timeout = 900\n").unwrap();
        assert_eq!(config.queue.publish_timeout, Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_zero_limit_means_unlimited() {
        let config = parse("[dispatch]\nlimit = 0\n").unwrap();
        assert_eq!(config.dispatch.limit, None);
    }

    #[test]
    fn test_empty_values_keep_defaults() {
        let config = parse("[worker]\nbands =\n[cache]\nblock_size = \n").unwrap();
        assert_eq!(config.worker.bands, 3);
        assert_eq!(config.cache.block_size, 64 * 1024);
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            ("[dispatch]\ntile_size = big\n", "tile_size"),
            ("[worker]\nfetch_concurrency = 0\n", "fetch_concurrency"),
            ("[worker]\npolicy = mean\n", "policy"),
            ("[worker]\nfetch_failure = retry\n", "fetch_failure"),
            ("[cache]\nblock_size = 2TB\n", "block_size"),
            ("[cache]\nblocks = -1\n", "blocks"),
            ("[queue]\npush_endpoint = localhost:8080\n", "push_endpoint"),
            ("[queue]\npublish_timeout = soon\n", "publish_timeout"),
        ];
        for (content, key) in cases {
            let err = parse(content).unwrap_err();
            assert!(
                matches!(err, ConfigFileError::InvalidValue { key: ref k, .. } if k == key),
                "{}: {}",
                key,
                err
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "[cache]\nblock_size = 1MB\n").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.cache.block_size, 1024 * 1024);
        assert_eq!(config.dispatch.tile_size, 512);
    }

    #[test]
    fn test_error_message_names_key() {
        let err = parse("[cache]\nblocks = lots\n").unwrap_err();
        assert!(err.to_string().contains("cache.blocks = 'lots'"));
    }
}
