use crate::object_store::ChartStore;
use fetcher::MarketDataFetcher;
use precompute_core::{Clock, Config};
use repository::Repository;
use std::sync::Arc;

/// Everything one worker message needs to run its phase to completion
/// (§4.4). Built once per process and shared across every concurrently
/// dispatched message.
pub struct WorkerContext {
    pub repository: Repository,
    pub fetcher: Arc<dyn MarketDataFetcher>,
    pub clock: Arc<dyn Clock>,
    pub chart_store: Arc<dyn ChartStore>,
    pub config: Arc<Config>,
}
