//! Authenticated request gateway.
//!
//! Every backend call goes through [`Gateway::send`], which attaches the
//! current access token and recovers from exactly one failure class: a 401
//! caused by an expired access token. Recovery is one renewal followed by
//! one redispatch of the same request. Everything else is returned as is.

use std::sync::Arc;

use tracing::{debug, warn};

use super::request::{ApiResponse, RequestSpec};
use super::{ApiError, Transport};
use crate::auth::SessionStore;

/// Redispatches allowed after a renewal.
const MAX_AUTH_RETRIES: u8 = 1;

/// A request descriptor together with how often it has been redispatched.
#[derive(Debug, Clone, Copy)]
struct Attempt<'a> {
    request: &'a RequestSpec,
    retries: u8,
}

impl<'a> Attempt<'a> {
    fn first(request: &'a RequestSpec) -> Self {
        Self { request, retries: 0 }
    }

    fn retried(self) -> Self {
        Self {
            retries: self.retries + 1,
            ..self
        }
    }

    fn may_retry(&self) -> bool {
        self.retries < MAX_AUTH_RETRIES
    }
}

/// Clone is cheap; clones share the session store and transport.
#[derive(Clone)]
pub struct Gateway {
    store: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
}

impl Gateway {
    pub fn new(store: Arc<SessionStore>, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Dispatch `request` with the current access token, renewing it once
    /// on a 401. A 401 that cannot be recovered is returned as a response,
    /// never as a renewal error.
    pub async fn send(&self, request: &RequestSpec) -> Result<ApiResponse, ApiError> {
        let mut attempt = Attempt::first(request);

        loop {
            let grant = self.store.access_grant();
            let bearer = grant.as_ref().map(|g| g.token.as_str());
            let response = self.transport.dispatch(attempt.request, bearer).await?;

            if !response.is_unauthorized() {
                return Ok(response);
            }

            let Some(grant) = grant else {
                debug!(path = request.path(), "401 on unauthenticated request");
                return Ok(response);
            };
            if !attempt.may_retry() {
                debug!(path = request.path(), "401 after renewal, giving up");
                return Ok(response);
            }
            if !self.store.has_refresh_token() {
                debug!(path = request.path(), "401 and no refresh token");
                return Ok(response);
            }

            if let Err(e) = self.store.renew_stale(grant.generation).await {
                warn!(error = %e, path = request.path(), "Access token renewal failed");
                return Ok(response);
            }
            attempt = attempt.retried();
        }
    }
}
