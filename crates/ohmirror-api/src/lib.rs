// ohmirror-api: Async Rust client for the openHAB REST API

pub mod auth;
pub mod client;
pub mod error;
pub mod json;
pub mod resources;
pub mod transport;

pub use auth::BasicAuth;
pub use client::{JsonResponse, RestClient};
pub use error::Error;
pub use resources::Resources;
pub use transport::{ProxyMode, TransportConfig};

/// Request header selecting the long-polling transport.
pub const TRANSPORT_HEADER: &str = "x-atmosphere-transport";

/// Continuation token header, echoed back on the next long-poll request.
pub const TRACKING_ID_HEADER: &str = "x-atmosphere-tracking-id";
