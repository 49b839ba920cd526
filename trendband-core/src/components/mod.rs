//! Component traits.
//!
//! The indicator trait for full-history numeric series and the container the
//! signal generator reads them from.

pub mod indicator;

pub use indicator::{Indicator, IndicatorValues};
