pub mod actix_ws;
pub mod events;
pub mod protocol;

pub use events::EventBroadcaster;
