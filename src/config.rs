//! Configuration types for mocap-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Remote API configuration (endpoint, authentication)
///
/// Groups settings for reaching the remote catalog/export service.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the remote API (default: "https://www.mixamo.com/api/v1")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Value sent in the fixed `X-Api-Key` header on every request (default: "mixamo2")
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// File holding the bearer token (default: "mixamo_token.txt")
    ///
    /// The token must be obtained out-of-band (browser session) and saved to
    /// this file. A missing file is a fatal startup error.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: default_api_key(),
            token_file: default_token_file(),
        }
    }
}

/// Harvest behavior configuration (directories, paging, concurrency, polling)
///
/// Groups settings related to how the catalog is walked and where outputs
/// land. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Root directory for exported artifacts, one subdirectory per character
    /// (default: "./animations")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory for per-animation failure records (default: "./failed_logs")
    #[serde(default = "default_failure_dir")]
    pub failure_dir: PathBuf,

    /// Path of the resumable state snapshot (default: "./state.json")
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Path of the character catalog cache (default: "./characters.json")
    ///
    /// The cache is returned unconditionally when present; delete the file to
    /// force a catalog refresh.
    #[serde(default = "default_character_cache")]
    pub character_cache: PathBuf,

    /// Catalog page size; a page shorter than this ends character pagination
    /// (default: 96)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum export jobs in flight per character (default: 18)
    ///
    /// Each worker blocks through its job's full remote processing time (the
    /// poll loop), so this width directly bounds concurrent jobs on the
    /// remote service. That throttle is deliberate.
    #[serde(default = "default_max_concurrent_exports")]
    pub max_concurrent_exports: usize,

    /// Delay between consecutive status polls for one job (default: 5 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Upper bound on the total time spent polling one job (default: None)
    ///
    /// `None` preserves the historical behavior: a job stuck in a
    /// non-terminal status occupies its worker indefinitely. When set,
    /// exceeding the budget fails that item only.
    #[serde(default, with = "optional_duration_serde")]
    pub max_poll_duration: Option<Duration>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            failure_dir: default_failure_dir(),
            state_file: default_state_file(),
            character_cache: default_character_cache(),
            page_size: default_page_size(),
            max_concurrent_exports: default_max_concurrent_exports(),
            poll_interval: default_poll_interval(),
            max_poll_duration: None,
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 15)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 4 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Main configuration for the [`Harvester`](crate::Harvester)
///
/// Fields are organized into logical sub-configs:
/// - [`api`](ApiConfig) — endpoint and authentication
/// - [`harvest`](HarvestConfig) — directories, paging, concurrency, polling
/// - [`retry`](RetryConfig) — backoff policy for transient remote failures
///
/// All sub-config fields are flattened for a flat JSON/TOML format.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API endpoint and authentication
    #[serde(flatten)]
    pub api: ApiConfig,

    /// Harvest behavior settings
    #[serde(flatten)]
    pub harvest: HarvestConfig,

    /// Retry/backoff policy for export submission and status polling
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_base_url() -> String {
    "https://www.mixamo.com/api/v1".to_string()
}

fn default_api_key() -> String {
    "mixamo2".to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("mixamo_token.txt")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./animations")
}

fn default_failure_dir() -> PathBuf {
    PathBuf::from("./failed_logs")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("./state.json")
}

fn default_character_cache() -> PathBuf {
    PathBuf::from("./characters.json")
}

fn default_page_size() -> usize {
    96
}

fn default_max_concurrent_exports() -> usize {
    18
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_max_attempts() -> u32 {
    15
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(4)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (seconds as integer)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
