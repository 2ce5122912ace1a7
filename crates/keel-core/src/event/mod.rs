mod hub;
mod scheduler;

pub use hub::{Control, EventHub, EventPayload, ListenerOptions, ListenerToken, RelayToken};
pub use scheduler::{ManualScheduler, Scheduler, TaskId};
