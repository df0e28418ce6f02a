//! Status-change notifications and the pub/sub mechanics that carry them.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::StatusEvent;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
