pub mod config;
pub mod error;
pub mod timekeeping;
pub mod types;

pub use config::Config;
pub use error::*;
pub use timekeeping::{Clock, FixedInstantClock, FixedZoneClock};
pub use types::*;
