//! REST API client module for the pharmacy admin backend.
//!
//! Layers, innermost first:
//! - `Transport`: sends one `RequestSpec` (reqwest in production)
//! - `Gateway`: attaches the bearer token and renews it once on a 401
//! - `ApiClient`: typed endpoints for the catalog, inventory, bills and chat

pub mod client;
pub mod error;
pub mod gateway;
pub mod request;
pub mod transport;

pub use client::ApiClient;
pub use error::{ApiError, FieldErrors};
pub use gateway::Gateway;
pub use request::{ApiResponse, FilePart, RequestBody, RequestSpec};
pub use transport::{HttpTransport, Transport};
