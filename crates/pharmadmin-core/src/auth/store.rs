use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::session::{CredentialPair, Role, Session, SessionStatus};
use crate::api::{ApiError, RequestSpec, Transport};
use crate::cache::CacheManager;

const LOGIN_PATH: &str = "/accounts/login/";
const SIGNUP_PATH: &str = "/accounts/signup/";
const REFRESH_PATH: &str = "/accounts/token/refresh/";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignupRequest<'a> {
    name: &'a str,
    email: &'a str,
    role: Role,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    user: Session,
    tokens: CredentialPair,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Session and credentials always change together, so they live in one slot.
struct AuthState {
    session: Session,
    tokens: CredentialPair,
    /// Bumped on every login, signup and renewal.
    generation: u64,
}

struct RenewalFailure {
    generation: u64,
    attempt: u64,
    error: ApiError,
}

/// The access token a request was sent with, tagged with the credential
/// generation it belongs to.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub token: String,
    pub generation: u64,
}

/// Single source of truth for who is logged in and which credentials
/// authorize requests.
///
/// In-memory state is authoritative. The persisted `user`/`tokens` records
/// are written on every transition and read only once, in [`SessionStore::open`].
pub struct SessionStore {
    transport: Arc<dyn Transport>,
    cache: CacheManager,
    state: RwLock<Option<AuthState>>,
    /// Held for the whole refresh round trip: at most one renewal in flight.
    renewal: Mutex<()>,
    /// Renewal attempts started so far.
    attempts: AtomicU64,
    /// Outcome of the latest failed attempt, handed to the callers that were
    /// queued behind it.
    last_failure: StdMutex<Option<RenewalFailure>>,
    generations: AtomicU64,
}

impl SessionStore {
    /// Create a store and rehydrate it from the cache.
    pub fn open(transport: Arc<dyn Transport>, cache: CacheManager) -> Self {
        let store = Self {
            transport,
            cache,
            state: RwLock::new(None),
            renewal: Mutex::new(()),
            attempts: AtomicU64::new(0),
            last_failure: StdMutex::new(None),
            generations: AtomicU64::new(0),
        };
        store.rehydrate();
        store
    }

    fn rehydrate(&self) {
        match (self.cache.load_user(), self.cache.load_tokens()) {
            (Ok(Some(user)), Ok(Some(tokens))) => {
                info!(role = %user.data.role, saved = %tokens.age_display(), "Restored cached session");
                *self.write_state() = Some(AuthState {
                    session: user.data,
                    tokens: tokens.data,
                    generation: self.next_generation(),
                });
            }
            (Ok(None), Ok(None)) => debug!("No cached session"),
            (user, tokens) => {
                if let Err(ref e) = user {
                    warn!(error = %e, "Unreadable cached user record");
                }
                if let Err(ref e) = tokens {
                    warn!(error = %e, "Unreadable cached tokens record");
                }
                warn!("Cached session is incomplete, discarding it");
                if let Err(e) = self.cache.clear() {
                    warn!(error = %e, "Failed to clear cached session");
                }
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let request = RequestSpec::post_json(LOGIN_PATH, &LoginRequest { email, password })?;
        let session = self.authenticate(&request).await?;
        info!(role = %session.role, "Logged in");
        Ok(session)
    }

    pub async fn signup(&self, name: &str, email: &str, role: Role, password: &str) -> Result<Session, ApiError> {
        let request = RequestSpec::post_json(
            SIGNUP_PATH,
            &SignupRequest {
                name,
                email,
                role,
                password,
            },
        )?;
        let session = self.authenticate(&request).await?;
        info!(role = %session.role, "Signed up");
        Ok(session)
    }

    async fn authenticate(&self, request: &RequestSpec) -> Result<Session, ApiError> {
        let response = self.transport.dispatch(request, None).await?;
        if !response.is_success() {
            return Err(ApiError::from_auth_status(response.status(), &response.text()));
        }
        let auth: AuthResponse = response.json()?;
        let session = auth.user.clone();
        self.install(auth.user, auth.tokens);
        Ok(session)
    }

    fn install(&self, session: Session, tokens: CredentialPair) {
        let mut state = self.write_state();
        if let Err(e) = self.cache.save_user(&session) {
            warn!(error = %e, "Failed to persist user record");
        }
        if let Err(e) = self.cache.save_tokens(&tokens) {
            warn!(error = %e, "Failed to persist tokens record");
        }
        *state = Some(AuthState {
            session,
            tokens,
            generation: self.next_generation(),
        });
    }

    /// Clear the session in memory and in the cache. Safe to call when
    /// already logged out.
    pub fn logout(&self) {
        let mut state = self.write_state();
        let was_logged_in = state.take().is_some();
        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "Failed to clear cached session");
        }
        if was_logged_in {
            info!("Logged out");
        }
    }

    /// Exchange the refresh token for a new access token. The refresh token
    /// is kept. A rejected refresh token ends the session.
    pub async fn renew(&self) -> Result<CredentialPair, ApiError> {
        self.renew_from(None).await
    }

    /// Renew only if the credentials are still those of `stale_generation`.
    /// Callers that queued behind another renewal get its result instead of
    /// issuing a second refresh call.
    pub(crate) async fn renew_stale(&self, stale_generation: u64) -> Result<CredentialPair, ApiError> {
        self.renew_from(Some(stale_generation)).await
    }

    async fn renew_from(&self, stale: Option<u64>) -> Result<CredentialPair, ApiError> {
        let attempts_before = self.attempts.load(Ordering::SeqCst);
        let _in_flight = self.renewal.lock().await;

        let (refresh, generation) = {
            let state = self.read_state();
            let Some(current) = state.as_ref() else {
                return Err(ApiError::Renewal("no refresh token".to_string()));
            };
            if stale.is_some_and(|g| g != current.generation) {
                debug!("Access token already renewed");
                return Ok(current.tokens.clone());
            }
            (current.tokens.refresh.clone(), current.generation)
        };

        if stale.is_some() {
            if let Some(error) = self.shared_failure(generation, attempts_before) {
                debug!(error = %error, "Renewal already failed for these credentials");
                return Err(error);
            }
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.exchange(&refresh, generation).await;
        if let Err(ref error) = result {
            *self.lock_failure() = Some(RenewalFailure {
                generation,
                attempt,
                error: error.clone(),
            });
        }
        result
    }

    /// The failure of a renewal attempt that started after the caller
    /// queued, for the same credentials.
    fn shared_failure(&self, generation: u64, attempts_before: u64) -> Option<ApiError> {
        self.lock_failure()
            .as_ref()
            .filter(|f| f.generation == generation && f.attempt > attempts_before)
            .map(|f| f.error.clone())
    }

    /// One refresh round trip. Must be called with the renewal lock held.
    async fn exchange(&self, refresh: &str, generation: u64) -> Result<CredentialPair, ApiError> {
        debug!("Renewing access token");
        let request = RequestSpec::post_json(REFRESH_PATH, &RefreshRequest { refresh })?;
        let response = self.transport.dispatch(&request, None).await?;

        if response.status() >= 500 {
            return Err(ApiError::from_status(response.status(), &response.text()));
        }
        if !response.is_success() {
            warn!(status = response.status(), "Refresh token rejected, ending session");
            self.end_session(generation);
            return Err(ApiError::Renewal(format!(
                "refresh rejected with status {}",
                response.status()
            )));
        }
        let renewed: RefreshResponse = response.json()?;

        let mut state = self.write_state();
        match state.as_mut() {
            Some(current) if current.generation == generation => {
                current.tokens.access = renewed.access;
                current.generation = self.next_generation();
                if let Err(e) = self.cache.save_tokens(&current.tokens) {
                    warn!(error = %e, "Failed to persist renewed tokens");
                }
                info!("Access token renewed");
                Ok(current.tokens.clone())
            }
            Some(current) => {
                debug!("Session replaced during renewal, keeping the newer credentials");
                Ok(current.tokens.clone())
            }
            None => Err(ApiError::Renewal("session ended during renewal".to_string())),
        }
    }

    /// Log out, unless a newer login already replaced the session that failed.
    fn end_session(&self, generation: u64) {
        let mut state = self.write_state();
        if state.as_ref().is_some_and(|s| s.generation == generation) {
            *state = None;
            if let Err(e) = self.cache.clear() {
                warn!(error = %e, "Failed to clear cached session");
            }
            info!("Logged out after failed renewal");
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.read_state().is_some() {
            SessionStatus::LoggedIn
        } else {
            SessionStatus::LoggedOut
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.status() == SessionStatus::LoggedIn
    }

    pub fn session(&self) -> Option<Session> {
        self.read_state().as_ref().map(|s| s.session.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.read_state().as_ref().map(|s| s.tokens.access.clone())
    }

    pub fn access_grant(&self) -> Option<AccessGrant> {
        self.read_state().as_ref().map(|s| AccessGrant {
            token: s.tokens.access.clone(),
            generation: s.generation,
        })
    }

    pub fn credentials(&self) -> Option<CredentialPair> {
        self.read_state().as_ref().map(|s| s.tokens.clone())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.read_state()
            .as_ref()
            .is_some_and(|s| !s.tokens.refresh.is_empty())
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn read_state(&self) -> RwLockReadGuard<'_, Option<AuthState>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Option<AuthState>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_failure(&self) -> MutexGuard<'_, Option<RenewalFailure>> {
        self.last_failure.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
