use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
const DEFAULT_PROFILE_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_WORKER_THREADS: usize = 2;

/// Settings read from `<data_dir>/murmur_config.json`, then overridden by
/// `MURMUR_*` environment variables. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    pub api_base_url: Option<String>,
    pub realtime_url: Option<String>,
    pub realtime_api_key: Option<String>,
    pub realtime_access_token: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub profile_cache_ttl_secs: Option<u64>,
    pub log_to_file: Option<bool>,
    pub worker_threads: Option<usize>,
}

pub fn load_config(data_dir: &str) -> MurmurConfig {
    let (config, error) = read_config(data_dir);
    if let Some(e) = error {
        tracing::warn!(error = %format!("{e:#}"), "invalid config file, using defaults");
    }
    config
}

/// Like [`load_config`], but hands back the file error instead of logging it,
/// for callers that install a subscriber only once the config is known.
pub(crate) fn read_config(data_dir: &str) -> (MurmurConfig, Option<anyhow::Error>) {
    let (mut config, error) = match read_config_file(data_dir) {
        Ok(c) => (c, None),
        Err(e) => (MurmurConfig::default(), Some(e)),
    };
    config.apply_env(|key| std::env::var(key).ok());
    (config, error)
}

fn read_config_file(data_dir: &str) -> anyhow::Result<MurmurConfig> {
    let path = Path::new(data_dir).join("murmur_config.json");
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MurmurConfig::default()),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    serde_json::from_slice::<MurmurConfig>(&bytes)
        .with_context(|| format!("parse {}", path.display()))
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl MurmurConfig {
    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = non_empty(get("MURMUR_API_BASE_URL")) {
            self.api_base_url = Some(v);
        }
        if let Some(v) = non_empty(get("MURMUR_REALTIME_URL")) {
            self.realtime_url = Some(v);
        }
        if let Some(v) = non_empty(get("MURMUR_REALTIME_API_KEY")) {
            self.realtime_api_key = Some(v);
        }
        if let Some(v) = non_empty(get("MURMUR_REALTIME_ACCESS_TOKEN")) {
            self.realtime_access_token = Some(v);
        }
        if let Some(v) = non_empty(get("MURMUR_HTTP_TIMEOUT_SECS")).and_then(|v| v.parse().ok()) {
            self.http_timeout_secs = Some(v);
        }
        if let Some(v) =
            non_empty(get("MURMUR_HEARTBEAT_INTERVAL_SECS")).and_then(|v| v.parse().ok())
        {
            self.heartbeat_interval_secs = Some(v);
        }
        if let Some(v) =
            non_empty(get("MURMUR_PROFILE_CACHE_TTL_SECS")).and_then(|v| v.parse().ok())
        {
            self.profile_cache_ttl_secs = Some(v);
        }
        if let Some(v) = non_empty(get("MURMUR_LOG_TO_FILE")) {
            self.log_to_file = Some(v == "1" || v.eq_ignore_ascii_case("true"));
        }
        if let Some(v) = non_empty(get("MURMUR_WORKER_THREADS")).and_then(|v| v.parse().ok()) {
            self.worker_threads = Some(v);
        }
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(
            self.heartbeat_interval_secs
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS)
                .max(1),
        )
    }

    pub fn profile_cache_ttl(&self) -> Duration {
        Duration::from_secs(
            self.profile_cache_ttl_secs
                .unwrap_or(DEFAULT_PROFILE_CACHE_TTL_SECS),
        )
    }

    pub fn log_to_file(&self) -> bool {
        self.log_to_file.unwrap_or(false)
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or(DEFAULT_WORKER_THREADS).max(1)
    }
}
