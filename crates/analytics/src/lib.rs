pub mod classify;
pub mod comparative;
pub mod indicators;
pub mod percentiles;

pub use classify::classify_semantic_state;
pub use comparative::compute_comparative_features;
pub use indicators::compute_daily_indicators;
pub use percentiles::compute_indicator_percentiles;
