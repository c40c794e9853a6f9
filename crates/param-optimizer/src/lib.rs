pub mod optimizer;
pub mod space;


pub use optimizer::{
    optimize_parameters, overfit_score, split_train_test, ConfigFailure, OptimizationReport,
    OptimizationResult, OptimizationSummary, Optimizer, OptimizerConfig, OverfitBand,
};
pub use space::{ParamConfig, ParamValue, ParameterSpace, SearchMethod};
