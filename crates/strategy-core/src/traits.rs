use chrono::NaiveDate;

use crate::{EngineError, Granularity, PriceBar, Signal};

/// External collaborator that serves historical bars.
///
/// The engine treats fetches as synchronous; batching or async retrieval is
/// the provider's concern. Retry policy, if any, also lives behind this
/// trait — the engine never retries.
pub trait PriceHistoryProvider: Send + Sync {
    fn get_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> Result<Vec<PriceBar>, EngineError>;
}

/// External collaborator that produces one signal per simulated step.
///
/// `as_of` is always the timestamp of the bar **preceding** the one about to
/// be simulated, and the provider may only look at the trailing
/// `lookback_days` window ending there — never the current or future bars.
pub trait SignalProvider: Send + Sync {
    fn predict(
        &self,
        symbol: &str,
        as_of: NaiveDate,
        lookback_days: u32,
    ) -> Result<Signal, EngineError>;
}
