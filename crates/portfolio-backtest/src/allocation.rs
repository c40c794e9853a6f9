//! Allocation strategies: pure functions from the portfolio's current state
//! to per-symbol target weights.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use strategy_core::{AllocationWeight, Signal, SignalAction};

/// Fixed-point iteration budget for risk parity.
const RISK_PARITY_MAX_ITERS: usize = 50;
const RISK_PARITY_TOLERANCE: f64 = 1e-6;

/// Volatilities below this are treated as "no usable history" and the symbol
/// sits out the rebalance.
const MIN_VOLATILITY: f64 = 1e-10;

/// How the portfolio backtester sizes each symbol at a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStrategy {
    /// `1/N` across eligible symbols. A symbol whose position was closed by
    /// a sell contributes 0 until a new buy signal re-opens it.
    EqualWeight,
    /// Weight proportional to the latest buy signal's confidence.
    ConfidenceBased,
    /// Weight proportional to `1 / trailing volatility`.
    InverseVolatility,
    /// Equalize each symbol's contribution to portfolio variance. Falls back
    /// to inverse volatility when the covariance matrix is singular.
    RiskParity,
}

/// One symbol's state as the rebalancer sees it: the latest signal, whether
/// a position is open, and the trailing daily returns available so far.
pub struct SymbolSnapshot<'a> {
    pub symbol: &'a str,
    pub latest_signal: Option<&'a Signal>,
    pub has_position: bool,
    pub trailing_returns: &'a [f64],
}

impl SymbolSnapshot<'_> {
    /// Holding or actively asked to buy. A sold-out symbol is ineligible
    /// until the strategy issues a fresh buy.
    fn eligible(&self) -> bool {
        self.has_position
            || self
                .latest_signal
                .is_some_and(|s| s.action == SignalAction::Buy)
    }

    fn trailing_volatility(&self, window: usize) -> Option<f64> {
        perf_metrics::trailing_volatility(self.trailing_returns, window)
            .filter(|v| *v > MIN_VOLATILITY)
    }
}

/// Compute target weights for one rebalance. Every input symbol appears in
/// the output; ineligible or unweightable symbols carry weight 0.0. Non-zero
/// weights sum to 1.0 (or all weights are 0.0 when nothing is eligible).
pub fn compute_weights(
    strategy: AllocationStrategy,
    snapshots: &[SymbolSnapshot<'_>],
    volatility_window: usize,
) -> Vec<AllocationWeight> {
    let raw = match strategy {
        AllocationStrategy::EqualWeight => equal_weight(snapshots),
        AllocationStrategy::ConfidenceBased => confidence_based(snapshots),
        AllocationStrategy::InverseVolatility => inverse_volatility(snapshots, volatility_window),
        AllocationStrategy::RiskParity => risk_parity(snapshots, volatility_window),
    };

    let total: f64 = raw.iter().sum();
    snapshots
        .iter()
        .zip(raw)
        .map(|(snap, w)| AllocationWeight {
            symbol: snap.symbol.to_string(),
            weight: if total > 0.0 { w / total } else { 0.0 },
        })
        .collect()
}

fn equal_weight(snapshots: &[SymbolSnapshot<'_>]) -> Vec<f64> {
    snapshots
        .iter()
        .map(|s| if s.eligible() { 1.0 } else { 0.0 })
        .collect()
}

/// Weight ∝ confidence of the latest buy signal. Hold and sell carry 0: a
/// sell just closed the position, so allocating to it would immediately
/// re-open what the strategy asked to exit.
fn confidence_based(snapshots: &[SymbolSnapshot<'_>]) -> Vec<f64> {
    snapshots
        .iter()
        .map(|s| match s.latest_signal {
            Some(sig) if sig.action == SignalAction::Buy => sig.confidence.max(0.0),
            _ => 0.0,
        })
        .collect()
}

fn inverse_volatility(snapshots: &[SymbolSnapshot<'_>], window: usize) -> Vec<f64> {
    snapshots
        .iter()
        .map(|s| {
            if !s.eligible() {
                return 0.0;
            }
            match s.trailing_volatility(window) {
                Some(vol) => 1.0 / vol,
                None => 0.0,
            }
        })
        .collect()
}

/// Fixed-point risk parity: iterate `w_i ∝ sqrt(w_i / (Σw)_i)` until each
/// symbol's contribution to portfolio variance equalizes, for at most
/// 50 iterations or until the largest weight change drops below 1e-6.
fn risk_parity(snapshots: &[SymbolSnapshot<'_>], window: usize) -> Vec<f64> {
    // Only symbols that would also qualify for inverse volatility participate
    let active: Vec<usize> = snapshots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.eligible() && s.trailing_volatility(window).is_some())
        .map(|(i, _)| i)
        .collect();
    let k = active.len();
    if k == 0 {
        return vec![0.0; snapshots.len()];
    }
    if k == 1 {
        let mut out = vec![0.0; snapshots.len()];
        out[active[0]] = 1.0;
        return out;
    }

    let series: Vec<Vec<f64>> = active
        .iter()
        .map(|&i| {
            let r = snapshots[i].trailing_returns;
            r[r.len().saturating_sub(window)..].to_vec()
        })
        .collect();
    let cov_rows = perf_metrics::covariance_matrix(&series);
    let cov = DMatrix::from_fn(k, k, |r, c| cov_rows[r][c]);

    if cov.determinant().abs() < 1e-12 {
        tracing::warn!(
            symbols = k,
            "covariance matrix is singular, falling back to inverse volatility"
        );
        return inverse_volatility(snapshots, window);
    }

    let mut weights = DVector::from_element(k, 1.0 / k as f64);
    for _ in 0..RISK_PARITY_MAX_ITERS {
        let marginal = &cov * &weights;
        if marginal.iter().any(|m| *m <= 0.0) {
            tracing::warn!("non-positive marginal risk, falling back to inverse volatility");
            return inverse_volatility(snapshots, window);
        }
        // Multiplicative update: the fixed point of w_i ∝ sqrt(w_i / (Σw)_i)
        // is exactly w_i (Σw)_i = const, i.e. equal risk contributions
        let raw = weights.zip_map(&marginal, |w, m| (w / m).sqrt());
        let next = &raw / raw.sum();
        let delta = (&next - &weights).amax();
        weights = next;
        if delta < RISK_PARITY_TOLERANCE {
            break;
        }
    }

    let mut out = vec![0.0; snapshots.len()];
    for (slot, &i) in active.iter().enumerate() {
        out[i] = weights[slot];
    }
    out
}
