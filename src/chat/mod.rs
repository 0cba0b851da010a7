//! Streaming chat — the event protocol, per-user stream bookkeeping, and
//! the transport that drives a routed agent over SSE.

pub mod events;
pub mod routes;
pub mod service;
pub mod session;

pub use events::StreamEvent;
pub use routes::{ChatRouteState, chat_routes};
pub use service::ChatService;
pub use session::StreamRegistry;
