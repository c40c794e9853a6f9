use chrono::NaiveDate;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::PriceBar;

/// Minimum number of bars a series must cover before a backtest may start.
pub const MIN_BARS: usize = 30;

/// A single data-quality finding for one bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarWarning {
    pub date: NaiveDate,
    pub warning_type: String,
    pub message: String,
}

/// Summary of data-quality issues found in a bar series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarQualityReport {
    pub total_bars: usize,
    pub zero_volume_bars: usize,
    pub gap_count: usize,
    pub warnings: Vec<BarWarning>,
}

impl BarQualityReport {
    pub fn has_sufficient_bars(&self) -> bool {
        self.total_bars >= MIN_BARS
    }
}

/// Scan a chronologically ordered bar series for quality issues:
/// OHLC inconsistencies, zero-volume bars, and calendar gaps longer than a
/// normal weekend.
pub fn check_bar_quality(bars: &[PriceBar]) -> BarQualityReport {
    let mut zero_volume_bars = 0usize;
    let mut gap_count = 0usize;
    let mut warnings: Vec<BarWarning> = Vec::new();

    for (i, bar) in bars.iter().enumerate() {
        if bar.volume <= 0.0 {
            zero_volume_bars += 1;
            warnings.push(BarWarning {
                date: bar.timestamp,
                warning_type: "zero_volume".to_string(),
                message: "Bar has zero or negative volume".to_string(),
            });
        }

        if bar.high < bar.low
            || bar.high < bar.open
            || bar.high < bar.close
            || bar.low > bar.open
            || bar.low > bar.close
        {
            warnings.push(BarWarning {
                date: bar.timestamp,
                warning_type: "price_inconsistency".to_string(),
                message: format!(
                    "OHLC inconsistent: O={:.2} H={:.2} L={:.2} C={:.2}",
                    bar.open.to_f64().unwrap_or(0.0),
                    bar.high.to_f64().unwrap_or(0.0),
                    bar.low.to_f64().unwrap_or(0.0),
                    bar.close.to_f64().unwrap_or(0.0),
                ),
            });
        }

        if i > 0 {
            let gap = (bar.timestamp - bars[i - 1].timestamp).num_days();
            // Normal weekends are 3 calendar days (Fri → Mon)
            if gap > 4 {
                gap_count += 1;
                warnings.push(BarWarning {
                    date: bar.timestamp,
                    warning_type: "date_gap".to_string(),
                    message: format!(
                        "{}-day gap between {} and {}",
                        gap,
                        bars[i - 1].timestamp,
                        bar.timestamp
                    ),
                });
            }
        }
    }

    // Cap warnings to avoid oversized reports
    warnings.truncate(100);

    BarQualityReport {
        total_bars: bars.len(),
        zero_volume_bars,
        gap_count,
        warnings,
    }
}
