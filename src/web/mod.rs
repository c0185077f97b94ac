//! HTTP API for Hoard.
//!
//! JSON endpoints for authentication, chunked uploads, chunked downloads
//! and directory management, all confined to the caller's storage root.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_health_router, create_router};
pub use server::WebServer;
