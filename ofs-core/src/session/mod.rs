pub mod coordinator;
pub mod event;
pub mod state;

pub use coordinator::{Coordinator, SessionConfig, SessionHandler};
pub use event::{ClientEvent, Correlation};
pub use state::{LinkState, PendingRequest, PendingRequests, SessionState};
