//! API server: run submission and status over REST, live updates over WebSocket

pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;
pub mod ws;

pub use handlers::AppState;
pub use server::build_router;
pub use server::build_state;
pub use server::serve_api;
pub use server::serve_with_shutdown;
