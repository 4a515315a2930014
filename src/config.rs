use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Default cap on a single reassembled unit (4 MiB).
pub const DEFAULT_MAX_UNIT_SIZE: usize = 4 * 1024 * 1024;

const CONFIG_PATHS: [&str; 2] = ["./tsdemux.toml", "./config.toml"];

/// Engine settings shared by [`Dispatcher`](crate::demux::Dispatcher) and
/// [`Session`](crate::demux::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxConfig {
    /// Check the CRC-32 trailing every PAT/PMT section.
    pub verify_crc: bool,
    /// Units growing beyond this many bytes are dropped.
    pub max_unit_size: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            verify_crc: true,
            max_unit_size: DEFAULT_MAX_UNIT_SIZE,
        }
    }
}

impl DemuxConfig {
    /// Builds a config from defaults, then `TSDEMUX_*` environment
    /// variables, then the first readable config file.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Ok(value) = env::var("TSDEMUX_VERIFY_CRC") {
            config.apply("verify_crc", &value);
        }
        if let Ok(value) = env::var("TSDEMUX_MAX_UNIT_SIZE") {
            config.apply("max_unit_size", &value);
        }

        for path in &CONFIG_PATHS {
            if let Ok(content) = read_file(path) {
                config.apply_lines(&content);
                log::debug!("loaded demux config from {}", path);
                break;
            }
        }

        config
    }

    /// Reads `key = value` lines from `path` on top of the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = read_file(path)?;
        Ok(Self::from_str_lossy(&content))
    }

    /// Parses `key = value` lines on top of the defaults. Unknown keys and
    /// unparsable values are ignored.
    pub fn from_str_lossy(content: &str) -> Self {
        let mut config = Self::default();
        config.apply_lines(content);
        config
    }

    fn apply_lines(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                self.apply(key.trim(), value);
            }
        }
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "verify_crc" => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => self.verify_crc = true,
                "false" | "0" | "no" => self.verify_crc = false,
                other => log::warn!("ignoring verify_crc value {:?}", other),
            },
            "max_unit_size" => match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => self.max_unit_size = size,
                _ => log::warn!("ignoring max_unit_size value {:?}", value),
            },
            _ => log::trace!("ignoring unknown config key {:?}", key),
        }
    }
}

fn read_file<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    let mut content = String::new();
    File::open(path)?.read_to_string(&mut content)?;
    Ok(content)
}
