//! Small statistical helpers shared by the metric functions and the
//! portfolio allocation strategies.

use rust_decimal::prelude::*;
use strategy_core::EquityPoint;

/// Simple daily returns from a value series. Zero-valued predecessors are
/// skipped rather than dividing by zero.
pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    if values.len() < 2 {
        return Vec::new();
    }
    values
        .windows(2)
        .filter_map(|w| {
            if w[0] != 0.0 {
                Some((w[1] - w[0]) / w[0])
            } else {
                None
            }
        })
        .collect()
}

/// Daily returns from an equity curve.
pub fn equity_returns(curve: &[EquityPoint]) -> Vec<f64> {
    let values: Vec<f64> = curve
        .iter()
        .map(|p| p.equity.to_f64().unwrap_or(0.0))
        .collect();
    daily_returns(&values)
}

/// Sample standard deviation (Bessel's correction).
pub fn stdev_sample(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

/// Standard deviation of the last `window` returns. `None` when there is not
/// enough history.
pub fn trailing_volatility(returns: &[f64], window: usize) -> Option<f64> {
    if returns.len() < window || window < 2 {
        return None;
    }
    Some(stdev_sample(&returns[returns.len() - window..]))
}

/// Pearson correlation of two equally long series. Zero-variance inputs
/// correlate at 0.0 rather than producing NaN.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let a_mean = a[..n].iter().sum::<f64>() / nf;
    let b_mean = b[..n].iter().sum::<f64>() / nf;

    let mut ss_ab = 0.0;
    let mut ss_aa = 0.0;
    let mut ss_bb = 0.0;
    for i in 0..n {
        let da = a[i] - a_mean;
        let db = b[i] - b_mean;
        ss_ab += da * db;
        ss_aa += da * da;
        ss_bb += db * db;
    }
    if ss_aa < 1e-15 || ss_bb < 1e-15 {
        return 0.0;
    }
    (ss_ab / (ss_aa.sqrt() * ss_bb.sqrt())).clamp(-1.0, 1.0)
}

/// Covariance matrix (sample) of per-series returns, row-major.
/// Series shorter than 2 observations produce zero rows.
pub fn covariance_matrix(series: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let k = series.len();
    let mut cov = vec![vec![0.0; k]; k];
    for i in 0..k {
        for j in i..k {
            let n = series[i].len().min(series[j].len());
            if n < 2 {
                continue;
            }
            let mi = series[i][..n].iter().sum::<f64>() / n as f64;
            let mj = series[j][..n].iter().sum::<f64>() / n as f64;
            let c = (0..n)
                .map(|t| (series[i][t] - mi) * (series[j][t] - mj))
                .sum::<f64>()
                / (n as f64 - 1.0);
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }
    cov
}
