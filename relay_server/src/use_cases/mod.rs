// Use cases layer: session registry, presence and scan routing.

pub mod hub;
pub mod presence;
pub mod types;

pub use hub::RelayHub;
pub use presence::PresenceTracker;
pub use types::{Outbound, RelayStats, ScanDelivery, SessionHandle};
