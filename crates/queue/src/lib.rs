pub mod in_process;
pub mod message;

pub use in_process::{Delivery, InProcessQueue, WorkQueue};
pub use message::{Phase, WorkMessage};
