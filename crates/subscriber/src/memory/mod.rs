mod leaser;
mod manager;

pub use leaser::{InMemoryLeaser, LeasedMessage};
pub use manager::{FlowControl, InMemoryManager};
