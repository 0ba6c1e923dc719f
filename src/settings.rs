use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::markup::render::MarkupOptions;
use crate::store::SNAPSHOT_FILE;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub channel: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub replay_file: Option<PathBuf>,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default = "default_fetch_delay_ms")]
    pub fetch_delay_ms: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_profile_base")]
    pub profile_base: String,
    #[serde(default = "default_user_deeplink")]
    pub user_deeplink: String,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

fn default_page_limit() -> usize {
    100
}

fn default_fetch_delay_ms() -> u64 {
    1000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_profile_base() -> String {
    MarkupOptions::default().profile_base
}

fn default_user_deeplink() -> String {
    MarkupOptions::default().user_deeplink
}

fn default_show_progress() -> bool {
    true
}

pub enum SourceChoice<'a> {
    Http { base_url: &'a str },
    Replay { path: &'a Path },
}

impl Settings {
    /// `archiver.toml` (optional), then `ARCHIVER_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("archiver").required(false))
            .add_source(Environment::with_prefix("ARCHIVER").try_parsing(true))
            .build()?;
        Settings::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        if let SourceChoice::Http { .. } = settings.source()? {
            if settings.fetch_delay_ms == 0 {
                return Err(ConfigError::Invalid(
                    "fetch_delay_ms must be positive for an HTTP source".into(),
                ));
            }
        }
        Ok(settings)
    }

    pub fn source(&self) -> Result<SourceChoice<'_>, ConfigError> {
        match (&self.source_url, &self.replay_file) {
            (Some(url), None) => Ok(SourceChoice::Http { base_url: url }),
            (None, Some(path)) => Ok(SourceChoice::Replay { path: path.as_path() }),
            (Some(_), Some(_)) => Err(ConfigError::Invalid(
                "set only one of source_url and replay_file".into(),
            )),
            (None, None) => Err(ConfigError::Invalid(
                "one of source_url or replay_file is required".into(),
            )),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.output_dir.join(SNAPSHOT_FILE)
    }

    pub fn photos_dir(&self) -> PathBuf {
        self.output_dir.join("photos")
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }

    pub fn markup(&self) -> MarkupOptions {
        MarkupOptions {
            profile_base: self.profile_base.clone(),
            user_deeplink: self.user_deeplink.clone(),
        }
    }
}
