//! Core library for the pharmacy admin platform.
//!
//! The heart of the crate is the pair [`SessionStore`] + [`Gateway`]: the
//! store owns the logged-in identity and its access/refresh tokens, the
//! gateway wraps every backend call and recovers from a single expired
//! access token by renewing it once. Renewals are single-flight: requests
//! that fail together share one refresh call.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, ApiResponse, Gateway, RequestSpec, Transport};
pub use auth::{CredentialPair, Feature, Role, Session, SessionStatus, SessionStore};
pub use cache::{CacheManager, FileCache, KeyValueCache, MemoryCache};
pub use config::Config;
