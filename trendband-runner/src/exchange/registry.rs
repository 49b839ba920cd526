//! Owned registry of live exchange sessions.
//!
//! Instances are keyed by venue plus a BLAKE3 hash of the serialized venue
//! configuration, so asking twice with the same settings yields the same
//! session. The registry is passed by handle; nothing here is process-global.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::{Exchange, ExchangeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Paper,
    Okx,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Paper => "paper",
            Venue::Okx => "okx",
        }
    }

    /// Live venues need API credentials.
    pub fn requires_credentials(&self) -> bool {
        !matches!(self, Venue::Paper)
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paper" => Ok(Venue::Paper),
            "okx" => Ok(Venue::Okx),
            other => Err(RegistryError::UnknownVenue(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RegistryKey {
    pub venue: Venue,
    pub config_hash: String,
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.venue, &self.config_hash[..12.min(self.config_hash.len())])
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown venue '{0}'")]
    UnknownVenue(String),
    #[error("venue '{0}' has no connector in this build")]
    Unsupported(Venue),
    #[error("failed to serialize venue config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to build exchange: {0}")]
    Build(String),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

#[derive(Debug, Default)]
pub struct ExchangeRegistry {
    instances: Mutex<BTreeMap<RegistryKey, Arc<dyn Exchange>>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_for<C: Serialize>(venue: Venue, config: &C) -> Result<RegistryKey, RegistryError> {
        let json = serde_json::to_string(config)?;
        Ok(RegistryKey {
            venue,
            config_hash: blake3::hash(json.as_bytes()).to_hex().to_string(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<RegistryKey, Arc<dyn Exchange>>> {
        self.instances.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the cached instance for (venue, config), building it with
    /// `build` on first use.
    pub fn get_or_create<C, F>(
        &self,
        venue: Venue,
        config: &C,
        build: F,
    ) -> Result<(RegistryKey, Arc<dyn Exchange>), RegistryError>
    where
        C: Serialize,
        F: FnOnce() -> Result<Arc<dyn Exchange>, RegistryError>,
    {
        let key = Self::key_for(venue, config)?;
        let mut instances = self.lock();
        if let Some(existing) = instances.get(&key) {
            return Ok((key, Arc::clone(existing)));
        }
        let exchange = build()?;
        info!(key = %key, "exchange instance created");
        instances.insert(key.clone(), Arc::clone(&exchange));
        Ok((key, exchange))
    }

    pub fn get(&self, key: &RegistryKey) -> Option<Arc<dyn Exchange>> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Disconnect and forget one instance. Returns false if it was unknown.
    pub async fn close(&self, key: &RegistryKey) -> Result<bool, RegistryError> {
        let removed = self.lock().remove(key);
        match removed {
            Some(exchange) => {
                exchange.disconnect().await?;
                info!(key = %key, "exchange instance closed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Disconnect every instance. Failures are logged and do not stop the
    /// sweep.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = std::mem::take(&mut *self.lock()).into_iter().collect();
        let count = drained.len();
        for (key, exchange) in drained {
            if let Err(err) = exchange.disconnect().await {
                warn!(key = %key, error = %err, "exchange disconnect failed");
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{PaperConfig, PaperExchange};
    use chrono::{TimeZone, Utc};
    use trendband_core::domain::Candle;

    fn build(config: &PaperConfig) -> Result<Arc<dyn Exchange>, RegistryError> {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let candles = vec![Candle::new(at, 100.0, 101.0, 99.0, 100.0, 1.0)];
        let exchange = PaperExchange::new(config.clone(), candles)
            .map_err(|e| RegistryError::Build(e.to_string()))?;
        Ok(Arc::new(exchange))
    }

    #[test]
    fn same_config_shares_instance() {
        let registry = ExchangeRegistry::new();
        let config = PaperConfig::default();
        let (k1, a) = registry
            .get_or_create(Venue::Paper, &config, || build(&config))
            .unwrap();
        let (k2, b) = registry
            .get_or_create(Venue::Paper, &config, || panic!("must reuse"))
            .unwrap();
        assert_eq!(k1, k2);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_config_gets_new_instance() {
        let registry = ExchangeRegistry::new();
        let a = PaperConfig::default();
        let b = PaperConfig {
            fee_rate: 0.002,
            ..PaperConfig::default()
        };
        registry.get_or_create(Venue::Paper, &a, || build(&a)).unwrap();
        registry.get_or_create(Venue::Paper, &b, || build(&b)).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn close_disconnects_and_forgets() {
        let registry = ExchangeRegistry::new();
        let config = PaperConfig::default();
        let (key, exchange) = registry
            .get_or_create(Venue::Paper, &config, || build(&config))
            .unwrap();
        exchange.connect().await.unwrap();

        assert!(registry.close(&key).await.unwrap());
        assert!(!exchange.is_connected());
        assert!(registry.get(&key).is_none());
        assert!(!registry.close(&key).await.unwrap());
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let registry = ExchangeRegistry::new();
        let config = PaperConfig::default();
        registry
            .get_or_create(Venue::Paper, &config, || build(&config))
            .unwrap();
        assert_eq!(registry.close_all().await, 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn venue_parsing() {
        assert_eq!("PAPER".parse::<Venue>().unwrap(), Venue::Paper);
        assert!(Venue::Okx.requires_credentials());
        assert!(matches!(
            "kraken".parse::<Venue>(),
            Err(RegistryError::UnknownVenue(_))
        ));
    }
}
