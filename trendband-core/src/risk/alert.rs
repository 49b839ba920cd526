//! Risk alerts raised by the supervisor and published as Risk events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAlertKind {
    StopLoss,
    TakeProfit,
    MarginCall,
    Breach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub kind: RiskAlertKind,
    pub level: AlertLevel,
    pub message: String,
    pub details: BTreeMap<String, serde_json::Value>,
    pub raised_at: DateTime<Utc>,
}

impl RiskAlert {
    pub fn new(
        kind: RiskAlertKind,
        level: AlertLevel,
        message: impl Into<String>,
        raised_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            level,
            message: message.into(),
            details: BTreeMap::new(),
            raised_at,
        }
    }

    pub fn detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// A critical breach pauses the orchestrator.
    pub fn is_critical_breach(&self) -> bool {
        self.kind == RiskAlertKind::Breach && self.level == AlertLevel::Critical
    }

    pub fn log(&self) {
        match self.level {
            AlertLevel::Critical => error!(kind = ?self.kind, details = ?self.details, "[risk] {}", self.message),
            AlertLevel::Warning => warn!(kind = ?self.kind, details = ?self.details, "[risk] {}", self.message),
            AlertLevel::Info => info!(kind = ?self.kind, details = ?self.details, "[risk] {}", self.message),
        }
    }
}
