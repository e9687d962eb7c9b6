//! Notification Hub: live sessions and run-update fan-out
//!
//! State here is never persisted. A restarted process starts with no
//! sessions, and reconnecting clients must subscribe again; updates
//! published while a client was away are not replayed. The run store
//! remains the place to poll for the current status.

pub mod hub;
pub mod messages;
pub mod registry;

pub use hub::HubStats;
pub use hub::NotificationHub;
pub use hub::SessionHandle;
pub use messages::parse_client_message;
pub use messages::ClientMessage;
pub use messages::ProgressSink;
pub use messages::RunUpdate;
pub use messages::ServerMessage;
pub use registry::ClientId;
pub use registry::ScopeKind;
pub use registry::SubscriptionRegistry;
pub use registry::SubscriptionScope;
pub use registry::WILDCARD;
