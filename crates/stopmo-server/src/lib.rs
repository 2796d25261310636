// ABOUTME: HTTP server for stopmo, providing the frame/video REST API and the live event channel.
// ABOUTME: Uses Axum with shared state holding the session store, assembler, and event bus.

pub mod api;
pub mod app_state;
pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod routes;

pub use app_state::{AppState, SharedState};
pub use bus::{BroadcastReport, ChannelSubscriber, DeliveryError, EventBus, Subscriber, SubscriberId};
pub use config::{ConfigError, StopmoConfig};
pub use error::ApiError;
pub use routes::create_router;
