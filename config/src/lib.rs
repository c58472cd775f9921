//! Configuration for the session controller.
//!
//! Values are layered: the compiled-in environment baseline (selected by `RPSENSE_ENV`
//! at build time), then an optional TOML file, then environment variable overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use rpsense_logging::Log;

mod development;
mod production;

pub(crate) static _RPS_CFG: OnceLock<RpsenseConfig> = OnceLock::new();

/// Overrides the inference service base URL.
pub const INFERENCE_URL_VAR: &str = "RPSENSE_INFERENCE_URL";

/// Overrides the streaming channel address.
pub const STREAM_ADDR_VAR: &str = "RPSENSE_STREAM_ADDR";

/// Overrides the model label written into match records.
pub const MODEL_LABEL_VAR: &str = "RPSENSE_MODEL_LABEL";

/// Errors that can happen while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Where and how to reach the inference service.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub stream_addr: String,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl InferenceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        if cfg!(feature = "env_production") {
            Self::production()
        } else {
            Self::development()
        }
    }
}

/// Round pacing. Whole seconds mirror what the player sees on screen.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub countdown_secs: u32,
    pub capture_frames: u32,
    pub capture_fps: u32,
    pub inter_round_secs: u32,
    pub verdict_timeout_secs: u32,
}

impl TimingConfig {
    /// Delay between two captured frames.
    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.capture_fps.max(1)))
    }

    /// Length of the whole capture window.
    pub fn capture_window(&self) -> Duration {
        self.capture_interval() * self.capture_frames
    }

    pub fn verdict_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.verdict_timeout_secs))
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            capture_frames: 20,
            capture_fps: 10,
            inter_round_secs: 5,
            verdict_timeout_secs: 8,
        }
    }
}

/// Match bookkeeping and history settings.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub model_label: String,
    pub history_cap: usize,
    pub history_path: Option<PathBuf>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            model_label: String::from("MobileNetV2"),
            history_cap: 100,
            history_path: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct RpsenseConfig {
    pub inference: InferenceConfig,
    pub timing: TimingConfig,
    pub matches: MatchConfig,
}

impl RpsenseConfig {
    /// Name of the environment baked in at build time.
    pub fn environment() -> &'static str {
        if cfg!(feature = "env_production") {
            "production"
        } else {
            "development"
        }
    }

    /// Parses a TOML document on top of the environment baseline. Missing keys keep
    /// their baseline value.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        Ok(config)
    }

    /// Builds the full layered configuration: baseline, then `path` (if any), then
    /// environment overrides. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                tracing::info!(target: Log::Config, ?path, "Loading config file");

                let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;

                Self::from_toml_str(&contents)?
            },

            None => Self::default(),
        };

        let config = config.with_overrides(|key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Applies overrides from a key lookup. Split out from `load` so callers (and tests)
    /// can supply something other than the process environment.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(INFERENCE_URL_VAR) {
            self.inference.base_url = url;
        }

        if let Some(addr) = lookup(STREAM_ADDR_VAR) {
            self.inference.stream_addr = addr;
        }

        if let Some(label) = lookup(MODEL_LABEL_VAR) {
            self.matches.model_label = label;
        }

        self
    }

    /// Rejects values the session controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inference.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("inference.base_url is empty".into()));
        }

        if self.inference.stream_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("inference.stream_addr is empty".into()));
        }

        if self.timing.capture_fps == 0 || self.timing.capture_fps > 1000 {
            return Err(ConfigError::Invalid(format!(
                "timing.capture_fps must be within 1..=1000, got {}",
                self.timing.capture_fps
            )));
        }

        if self.timing.capture_frames == 0 {
            return Err(ConfigError::Invalid("timing.capture_frames must be at least 1".into()));
        }

        if self.timing.verdict_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timing.verdict_timeout_secs must be at least 1".into()));
        }

        if self.matches.history_cap == 0 {
            return Err(ConfigError::Invalid("matches.history_cap must be at least 1".into()));
        }

        Ok(())
    }

    /// Initializes the process-wide configuration from `path`. If it has already been
    /// initialized, the existing value wins and a warning is logged.
    pub fn init(path: Option<&Path>) -> Result<&'static Self, ConfigError> {
        let config = Self::load(path)?;

        if _RPS_CFG.set(config).is_err() {
            tracing::warn!(target: Log::Config, "Config already initialized, ignoring new source");
        }

        Ok(Self::get_ref())
    }

    /// Retrieves the configuration. Initializes it from the environment if it's accessed
    /// for the first time, falling back to the baseline if that fails.
    pub fn get() -> Self {
        Self::get_ref().clone()
    }

    fn get_ref() -> &'static Self {
        _RPS_CFG.get_or_init(|| match Self::load(None) {
            Ok(config) => config,

            Err(error) => {
                tracing::error!(target: Log::Config, ?error, "Invalid environment config, using defaults");
                Self::default()
            },
        })
    }
}
