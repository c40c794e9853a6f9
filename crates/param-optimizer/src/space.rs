//! Parameter search space and configuration generation.

use backtest_engine::BacktestConfig;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strategy_core::EngineError;

/// One candidate value for a named parameter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
}

impl ParamValue {
    fn as_f64(&self) -> f64 {
        match self {
            ParamValue::Float(v) => *v,
            ParamValue::Int(v) => *v as f64,
        }
    }
}

/// How candidate configurations are drawn from the space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMethod {
    /// Full Cartesian product of every dimension's value list.
    Grid,
    /// `iterations` uniform draws, one value per dimension per draw. An
    /// exact-duplicate draw is resampled once; a second duplicate is kept.
    Random { iterations: usize },
}

/// Ordered parameter dimensions: each name maps to its candidate values.
/// Dimension order is preserved so grid enumeration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    dimensions: Vec<(String, Vec<ParamValue>)>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(mut self, name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        self.dimensions.push((name.into(), values));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Size of the full Cartesian product.
    pub fn cardinality(&self) -> usize {
        if self.dimensions.is_empty() {
            return 0;
        }
        self.dimensions.iter().map(|(_, v)| v.len()).product()
    }

    /// Every dimension must name a tunable parameter and carry at least one
    /// value.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.dimensions.is_empty() {
            return Err(EngineError::InvalidParameter(
                "parameter space has no dimensions".to_string(),
            ));
        }
        for (name, values) in &self.dimensions {
            if values.is_empty() {
                return Err(EngineError::InvalidParameter(format!(
                    "parameter {name} has no candidate values"
                )));
            }
            if !TUNABLE.contains(&name.as_str()) {
                return Err(EngineError::InvalidParameter(format!(
                    "unknown parameter {name}"
                )));
            }
        }
        Ok(())
    }

    /// Materialize candidate configurations in generation order.
    pub fn generate(&self, method: SearchMethod, rng: &mut StdRng) -> Vec<ParamConfig> {
        match method {
            SearchMethod::Grid => self.grid(),
            SearchMethod::Random { iterations } => self.random(iterations, rng),
        }
    }

    fn grid(&self) -> Vec<ParamConfig> {
        let mut configs = vec![ParamConfig::default()];
        for (name, values) in &self.dimensions {
            let mut next = Vec::with_capacity(configs.len() * values.len());
            for config in &configs {
                for value in values {
                    let mut grown = config.clone();
                    grown.assignments.push((name.clone(), *value));
                    next.push(grown);
                }
            }
            configs = next;
        }
        configs
    }

    fn random(&self, iterations: usize, rng: &mut StdRng) -> Vec<ParamConfig> {
        let mut configs: Vec<ParamConfig> = Vec::with_capacity(iterations);
        for _ in 0..iterations {
            let mut draw = self.draw(rng);
            if configs.contains(&draw) {
                // One resample on an exact duplicate; a second duplicate is
                // kept rather than looping forever on a tiny space
                draw = self.draw(rng);
            }
            configs.push(draw);
        }
        configs
    }

    fn draw(&self, rng: &mut StdRng) -> ParamConfig {
        let assignments = self
            .dimensions
            .iter()
            .map(|(name, values)| (name.clone(), values[rng.gen_range(0..values.len())]))
            .collect();
        ParamConfig { assignments }
    }
}

/// Parameter names [`ParamConfig::apply`] knows how to substitute.
const TUNABLE: &[&str] = &[
    "confidence_threshold",
    "lookback_days",
    "max_position_size",
    "stop_loss_pct",
    "take_profit_pct",
];

/// One concrete assignment of a value to every dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamConfig {
    pub assignments: Vec<(String, ParamValue)>,
}

impl ParamConfig {
    /// Substitute the assignments into a run configuration. Values are
    /// range-checked here so a bad candidate fails its own configuration,
    /// not the whole sweep.
    pub fn apply(&self, config: &mut BacktestConfig) -> Result<(), EngineError> {
        for (name, value) in &self.assignments {
            let v = value.as_f64();
            match name.as_str() {
                "confidence_threshold" => {
                    if !(0.0..=1.0).contains(&v) {
                        return Err(EngineError::InvalidParameter(format!(
                            "confidence_threshold {v} outside [0, 1]"
                        )));
                    }
                    config.confidence_threshold = v;
                }
                "lookback_days" => {
                    if v < 1.0 {
                        return Err(EngineError::InvalidParameter(format!(
                            "lookback_days {v} must be at least 1"
                        )));
                    }
                    config.lookback_days = v as u32;
                }
                "max_position_size" => {
                    if v <= 0.0 || v > 1.0 {
                        return Err(EngineError::InvalidParameter(format!(
                            "max_position_size {v} outside (0, 1]"
                        )));
                    }
                    config.max_position_size = v;
                }
                "stop_loss_pct" => {
                    if v <= 0.0 || v >= 1.0 {
                        return Err(EngineError::InvalidParameter(format!(
                            "stop_loss_pct {v} outside (0, 1)"
                        )));
                    }
                    config.stop_loss_pct = Some(v);
                }
                "take_profit_pct" => {
                    if v <= 0.0 {
                        return Err(EngineError::InvalidParameter(format!(
                            "take_profit_pct {v} must be positive"
                        )));
                    }
                    config.take_profit_pct = Some(v);
                }
                other => {
                    return Err(EngineError::InvalidParameter(format!(
                        "unknown parameter {other}"
                    )));
                }
            }
        }
        Ok(())
    }
}
