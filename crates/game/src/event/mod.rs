mod queue;
mod types;

pub use queue::{EventQueue, EventSender, event_channel};
pub use types::NetworkEvent;
