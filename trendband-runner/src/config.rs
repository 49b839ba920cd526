//! System configuration loaded from TOML.
//!
//! Every section has serde defaults, so an empty file is a valid paper
//! configuration. Credentials can come from the environment
//! (`TRENDBAND_API_KEY`, `TRENDBAND_API_SECRET`, `TRENDBAND_API_PASSPHRASE`),
//! which overrides the file. `validate` runs once at startup and any failure
//! is fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use trendband_core::domain::Timeframe;
use trendband_core::regime::TradingFrequency;
use trendband_core::risk::RiskConfig;
use trendband_core::strategy::StrategyConfig;

use crate::exchange::{PaperConfig, Venue};
use crate::retry::RetryConfig;

pub const ENV_API_KEY: &str = "TRENDBAND_API_KEY";
pub const ENV_API_SECRET: &str = "TRENDBAND_API_SECRET";
pub const ENV_API_PASSPHRASE: &str = "TRENDBAND_API_PASSPHRASE";

const REDACTED: &str = "***";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("venue '{venue}' requires {field} (set it in the config or via {env})")]
    MissingCredential {
        venue: Venue,
        field: &'static str,
        env: &'static str,
    },
    #[error("invalid [{section}] settings: {source}")]
    Section {
        section: &'static str,
        #[source]
        source: trendband_core::ConfigError,
    },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub venue: Venue,
    pub api_key: Option<String>,
    pub secret: Option<String>,
    pub passphrase: Option<String>,
    pub sandbox: bool,
    /// Deadline applied to every exchange call.
    pub call_timeout_ms: u64,
    pub retry: RetryConfig,
    pub paper: PaperConfig,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            venue: Venue::Paper,
            api_key: None,
            secret: None,
            passphrase: None,
            sandbox: true,
            call_timeout_ms: 10_000,
            retry: RetryConfig::default(),
            paper: PaperConfig::default(),
        }
    }
}

impl ExchangeSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Candles requested per cycle.
    pub candle_limit: usize,
    /// Desired trading frequency, used for the timeframe recommendation.
    pub frequency: TradingFrequency,
    /// Capital the timeframe recommendation is scaled to.
    pub capital: f64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            symbol: "BTC/USDT".to_string(),
            timeframe: Timeframe::H1,
            candle_limit: 100,
            frequency: TradingFrequency::Medium,
            capital: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Delay between orchestrator cycles.
    pub loop_interval_ms: u64,
    /// Stop after this many cycles; unlimited when absent.
    pub max_cycles: Option<u64>,
    /// Grace period for in-flight signals once the last cycle has run.
    pub signal_wait_ms: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            loop_interval_ms: 60_000,
            max_cycles: None,
            signal_wait_ms: 2_000,
        }
    }
}

impl RuntimeSettings {
    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms)
    }

    pub fn signal_wait(&self) -> Duration {
        Duration::from_millis(self.signal_wait_ms)
    }
}

/// Candle source for the paper venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Replay this CSV when set; otherwise generate a synthetic walk.
    pub candles_csv: Option<PathBuf>,
    pub synthetic_bars: usize,
    pub seed: u64,
    pub start_price: f64,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            candles_csv: None,
            synthetic_bars: 1_000,
            seed: 42,
            start_price: 50_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub exchange: ExchangeSettings,
    pub market: MarketSettings,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub runtime: RuntimeSettings,
    pub data: DataSettings,
}

impl SystemConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Read the file, apply environment credentials, validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override credentials from `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = read(ENV_API_KEY) {
            self.exchange.api_key = Some(key);
        }
        if let Some(secret) = read(ENV_API_SECRET) {
            self.exchange.secret = Some(secret);
        }
        if let Some(passphrase) = read(ENV_API_PASSPHRASE) {
            self.exchange.passphrase = Some(passphrase);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk.validate().map_err(|source| ConfigError::Section {
            section: "risk",
            source,
        })?;
        self.strategy
            .validate()
            .map_err(|source| ConfigError::Section {
                section: "strategy",
                source,
            })?;

        let exchange = &self.exchange;
        if exchange.venue.requires_credentials() {
            let required = [
                ("api_key", ENV_API_KEY, &exchange.api_key),
                ("secret", ENV_API_SECRET, &exchange.secret),
                ("passphrase", ENV_API_PASSPHRASE, &exchange.passphrase),
            ];
            for (field, env, value) in required {
                if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                    return Err(ConfigError::MissingCredential {
                        venue: exchange.venue,
                        field,
                        env,
                    });
                }
            }
        }
        if exchange.call_timeout_ms == 0 {
            return Err(invalid("exchange.call_timeout_ms", "must be positive"));
        }
        if !(exchange.retry.backoff_multiplier >= 1.0) {
            return Err(invalid("exchange.retry.backoff_multiplier", "must be >= 1"));
        }
        let paper = &exchange.paper;
        if !(paper.initial_balance > 0.0) {
            return Err(invalid("exchange.paper.initial_balance", "must be positive"));
        }
        if !(0.0..0.1).contains(&paper.fee_rate) {
            return Err(invalid("exchange.paper.fee_rate", "must be within [0, 0.1)"));
        }

        if self.market.symbol.trim().is_empty() {
            return Err(invalid("market.symbol", "must not be empty"));
        }
        let min_history = self.strategy.min_history();
        if self.market.candle_limit < min_history {
            return Err(invalid(
                "market.candle_limit",
                format!("{} is below the strategy's minimum history {min_history}", self.market.candle_limit),
            ));
        }

        if !(self.market.capital > 0.0) {
            return Err(invalid("market.capital", "must be positive"));
        }

        if self.runtime.loop_interval_ms == 0 {
            return Err(invalid("runtime.loop_interval_ms", "must be positive"));
        }
        if self.runtime.max_cycles == Some(0) {
            return Err(invalid("runtime.max_cycles", "must be positive when set"));
        }

        if self.data.candles_csv.is_none() && self.data.synthetic_bars == 0 {
            return Err(invalid("data.synthetic_bars", "must be positive without a CSV"));
        }
        if !(self.data.start_price > 0.0) {
            return Err(invalid("data.start_price", "must be positive"));
        }
        Ok(())
    }

    /// Copy with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |v: &mut Option<String>| {
            if v.is_some() {
                *v = Some(REDACTED.to_string());
            }
        };
        mask(&mut copy.exchange.api_key);
        mask(&mut copy.exchange.secret);
        mask(&mut copy.exchange.passphrase);
        copy
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = SystemConfig::from_toml_str("").unwrap();
        assert_eq!(config, SystemConfig::default());
        assert_eq!(config.market.symbol, "BTC/USDT");
        assert_eq!(config.market.timeframe, Timeframe::H1);
        assert_eq!(config.strategy.fast_window, 9);
        assert_eq!(config.strategy.slow_window, 21);
        assert_eq!(config.risk.max_leverage, 20);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = SystemConfig::from_toml_str(
            r#"
            [market]
            symbol = "ETH/USDT"
            timeframe = "15m"

            [risk]
            stop_loss_percent = 0.03

            [exchange.retry]
            max_retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.market.symbol, "ETH/USDT");
        assert_eq!(config.market.timeframe, Timeframe::M15);
        assert_eq!(config.market.candle_limit, 100);
        assert_eq!(config.risk.stop_loss_percent, 0.03);
        assert_eq!(config.risk.take_profit_1, 1.5);
        assert_eq!(config.exchange.retry.max_retries, 5);
    }

    #[test]
    fn live_venue_requires_credentials() {
        let mut config = SystemConfig::from_toml_str("[exchange]\nvenue = \"okx\"\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredential {
                field: "api_key",
                ..
            })
        ));

        config.apply_env(env(&[
            (ENV_API_KEY, "key"),
            (ENV_API_SECRET, "secret"),
            (ENV_API_PASSPHRASE, "pass"),
        ]));
        config.validate().unwrap();
    }

    #[test]
    fn blank_env_values_do_not_override() {
        let mut config = SystemConfig::default();
        config.exchange.api_key = Some("from-file".into());
        config.apply_env(env(&[(ENV_API_KEY, "  ")]));
        assert_eq!(config.exchange.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn invalid_risk_section_is_reported() {
        let config = SystemConfig::from_toml_str("[risk]\nmin_leverage = 30\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Section { section: "risk", .. })
        ));
    }

    #[test]
    fn candle_limit_must_cover_history() {
        let config = SystemConfig::from_toml_str("[market]\ncandle_limit = 10\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "market.candle_limit",
                ..
            })
        ));
    }

    #[test]
    fn unknown_timeframe_is_a_parse_error() {
        assert!(matches!(
            SystemConfig::from_toml_str("[market]\ntimeframe = \"7m\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_file_and_masks_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trendband.toml");
        std::fs::write(
            &path,
            "[exchange]\napi_key = \"abc\"\n\n[runtime]\nloop_interval_ms = 5000\n",
        )
        .unwrap();

        let config = SystemConfig::load(&path).unwrap();
        assert_eq!(config.runtime.loop_interval(), Duration::from_secs(5));

        let shown = config.redacted().to_toml_string().unwrap();
        assert!(shown.contains("***"));
        assert!(!shown.contains("abc"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SystemConfig::from_file(dir.path().join("absent.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
