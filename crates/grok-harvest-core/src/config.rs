use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::time::Duration;

pub const MEDIA_DB_KEY_PREFIX: &str = "grok_downloader_media_db";
pub const CHILD_PARENT_KEY_PREFIX: &str = "grok_downloader_child_parent";
pub const COMPLETED_IDS_KEY: &str = "grok_downloader_downloaded_ids";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory of the RocksDB instance backing persistence.
    pub store_path: String,
    /// Where the CLI retriever writes fetched files.
    pub output_dir: String,
    pub filename_prefix: String,
    pub prompt_max_len: usize,
    /// Pause between sequential retrievals in a bulk run.
    pub retrieval_delay_ms: u64,
    /// Window within which observation triggers are merged.
    pub debounce_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: "grok_harvest.db".to_string(),
            output_dir: "downloads".to_string(),
            filename_prefix: "grok".to_string(),
            prompt_max_len: 100,
            retrieval_delay_ms: 100,
            debounce_ms: 150,
            request_timeout_secs: 60,
        }
    }
}

impl AppConfig {
    pub fn retrieval_delay(&self) -> Duration {
        Duration::from_millis(self.retrieval_delay_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Load `Config.toml` (optional) with `GROK_HARVEST_*` environment overrides.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("GROK_HARVEST"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
