//! Candle sources for the paper venue and the sweep: CSV files and a seeded
//! synthetic random walk.

use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use trendband_core::domain::{Candle, CandleError, CandleSeries};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: timestamp {value} is not a valid epoch-millisecond instant")]
    InvalidTimestamp { row: usize, value: i64 },
    #[error(transparent)]
    Candle(#[from] CandleError),
}

/// On-disk row layout. Timestamps are epoch milliseconds (UTC).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct CsvCandle {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Load and validate a `timestamp,open,high,low,close,volume` file.
pub fn load_candles_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>, DataError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let mut candles = Vec::new();
    for (row, record) in reader.deserialize::<CsvCandle>().enumerate() {
        let record = record?;
        let timestamp = Utc
            .timestamp_millis_opt(record.timestamp)
            .single()
            .ok_or(DataError::InvalidTimestamp {
                row: row + 1,
                value: record.timestamp,
            })?;
        candles.push(Candle::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        ));
    }

    let series = CandleSeries::from_candles(candles)?;
    if series.is_empty() {
        return Err(CandleError::Empty.into());
    }
    info!(path = %path.display(), bars = series.len(), "candles loaded");
    Ok(series.into_vec())
}

pub fn write_candles_csv(path: impl AsRef<Path>, candles: &[Candle]) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path)?;
    for c in candles {
        writer.serialize(CsvCandle {
            timestamp: c.timestamp.timestamp_millis(),
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
        })?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// First bar of every synthetic series.
pub fn synthetic_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Bars per drift regime in the synthetic walk.
const SYNTHETIC_LEG: usize = 60;

/// Hourly random walk with alternating up and down drift legs, so trend
/// following has something to find. Same seed, same series.
pub fn synthetic_candles(count: usize, seed: u64, start_price: f64) -> Vec<Candle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = synthetic_epoch();
    let mut close = start_price.max(f64::MIN_POSITIVE);
    let mut candles = Vec::with_capacity(count);

    for i in 0..count {
        let leg_up = (i / SYNTHETIC_LEG) % 2 == 0;
        let drift = if leg_up { 0.003 } else { -0.003 };
        let ret = drift + rng.gen_range(-0.012..0.012);

        let open = close;
        close = (open * (1.0 + ret)).max(start_price * 0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.004));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.004));
        let volume = rng.gen_range(100.0..1_000.0);

        candles.push(Candle::new(
            start + Duration::hours(i as i64),
            open,
            high,
            low,
            close,
            volume,
        ));
    }
    candles
}
