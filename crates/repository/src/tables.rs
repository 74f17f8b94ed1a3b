//! Process-wide table-name constants. Callers never embed a table name as a
//! string literal in a query (§4.1) — every query in this crate interpolates
//! one of these.

pub const SYMBOLS: &str = "symbols";
pub const SYMBOL_ALIASES: &str = "symbol_aliases";
pub const RAW_SERIES: &str = "raw_series";
pub const DAILY_INDICATORS: &str = "daily_indicators";
pub const INDICATOR_PERCENTILES: &str = "indicator_percentiles";
pub const COMPARATIVE_FEATURES: &str = "comparative_features";
pub const ARTIFACTS: &str = "artifacts";
pub const REFERENCE_DATA: &str = "reference_data";
pub const WATCHLIST: &str = "watchlist";
pub const JOBS: &str = "jobs";
