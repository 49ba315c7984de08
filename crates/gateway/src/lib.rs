//! Gateway - HTTP intake and WebSocket broadcast surfaces
//!
//! Front door of the pipeline:
//! - HTTP: vote submission and the poll registry
//! - WebSocket: per-poll tally subscriptions
//! - the broadcast hub fanning tally updates out to live connections

pub mod http_server;
pub mod intake;
pub mod polls;
pub mod subscriptions;
pub mod ws_server;

pub use http_server::{ApiError, GatewayContext, HttpServer};
pub use intake::{IntakeError, VoteIntake};
pub use polls::PollRegistry;
pub use subscriptions::{SubscriptionId, SubscriptionManager};
pub use ws_server::WebSocketServer;

/// Default bounded queue capacity per subscriber connection
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 64;
