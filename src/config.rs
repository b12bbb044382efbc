use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{ProjectDirs, UserDirs};
use log::LevelFilter;
use serde::Deserialize;

use crate::error::ConfigError;

pub const APP_NAME: &str = "scanlog";
pub const CONFIG_FILE: &str = "config.toml";
pub const DB_FILE: &str = "ScanHistory.sqlite";

/// On-disk shape of `config.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    scan_interval_ms: Option<u64>,
    camera: Option<String>,
    database: Option<PathBuf>,
    export_dir: Option<PathBuf>,
    sound: Option<bool>,
    try_harder: Option<bool>,
    log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub scan_interval: Duration,
    /// Preferred camera, matched against device names.
    pub camera: Option<String>,
    /// `None` means the platform data directory.
    pub database: Option<PathBuf>,
    pub export_dir: PathBuf,
    pub sound: bool,
    pub try_harder: bool,
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scan_interval: Duration::from_millis(500),
            camera: None,
            database: None,
            export_dir: default_export_dir(),
            sound: true,
            try_harder: true,
            log_level: LevelFilter::Info,
        }
    }
}

impl Config {
    /// Loads `config.toml` from the platform config directory.
    /// A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        let mut config = Config::default();

        if let Some(ms) = raw.scan_interval_ms {
            if ms == 0 {
                return Err(ConfigError::InvalidValue(
                    "scan_interval_ms must be > 0".to_string(),
                ));
            }
            config.scan_interval = Duration::from_millis(ms);
        }
        if let Some(level) = raw.log_level {
            config.log_level = level
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("unknown log level: {level}")))?;
        }
        config.camera = raw.camera.filter(|name| !name.trim().is_empty());
        config.database = raw.database;
        if let Some(dir) = raw.export_dir {
            config.export_dir = dir;
        }
        if let Some(sound) = raw.sound {
            config.sound = sound;
        }
        if let Some(try_harder) = raw.try_harder {
            config.try_harder = try_harder;
        }

        Ok(config)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Default database location (`~/.local/share/scanlog/ScanHistory.sqlite` or platform equivalent).
pub fn default_db_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join(DB_FILE))
}

fn default_export_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| {
            dirs.document_dir()
                .map(Path::to_path_buf)
                .or_else(|| Some(dirs.home_dir().to_path_buf()))
        })
        .unwrap_or_else(|| PathBuf::from("."))
}
