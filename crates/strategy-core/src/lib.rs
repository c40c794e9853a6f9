pub mod error;
pub mod quality;
pub mod traits;
pub mod types;

pub use error::EngineError;
pub use quality::{check_bar_quality, BarQualityReport, BarWarning, MIN_BARS};
pub use traits::{PriceHistoryProvider, SignalProvider};
pub use types::*;
