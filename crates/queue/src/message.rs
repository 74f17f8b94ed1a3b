use precompute_core::{BusinessDate, MasterId};
use serde::{Deserialize, Serialize};

/// Which half of a symbol's nightly pipeline a message drives (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Raw,
    Derived,
}

/// One unit of worker dispatch. Batch size is always one — the queue never
/// groups messages (§4.4a).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkMessage {
    pub phase: Phase,
    pub symbol: String,
    pub master_id: MasterId,
    pub business_date: BusinessDate,
    pub correlation_id: String,
}
