pub mod context;
pub mod object_store;
pub mod pipeline;
pub mod pool;

pub use context::WorkerContext;
pub use object_store::{report_key, ChartStore, LocalChartStore};
pub use pipeline::{process_message, WorkOutcome};
pub use pool::{PoolStats, WorkerPool};
