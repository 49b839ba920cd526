//! Risk management: parameters, order validation, alerts and the supervisor.

pub mod alert;
pub mod config;
pub mod supervisor;
pub mod validator;

pub use alert::{AlertLevel, RiskAlert, RiskAlertKind};
pub use config::RiskConfig;
pub use supervisor::{
    ApprovedOrder, BreakerState, ExitOrder, OrderRequest, RiskRejection, RiskStatus,
    RiskSupervisor, TripReason, TRANCHE_FRACTION,
};
pub use validator::{OrderValidator, ValidationError};
