//! Scripted in-process backend for exercising the session store and gateway.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pharmadmin_core::api::{ApiError, ApiResponse, RequestBody, RequestSpec, Transport};
use pharmadmin_core::cache::{CacheManager, MemoryCache};
use pharmadmin_core::{Gateway, SessionStore};
use serde_json::{json, Value};

pub const PASSWORD: &str = "pw";
pub const PROTECTED_PATH: &str = "/pharmacy/drugs/";
pub const ALWAYS_UNAUTHORIZED_PATH: &str = "/always-401/";
pub const FAILING_PATH: &str = "/boom/";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub bearer: Option<String>,
}

/// How the refresh endpoint misbehaves, if at all.
#[derive(Debug, Clone, Copy)]
enum RefreshFault {
    Status(u16),
    ConnectionReset,
}

#[derive(Default)]
struct BackendState {
    refresh_fault: Option<RefreshFault>,
    valid_access: HashSet<String>,
    valid_refresh: HashSet<String>,
    issued_access: u32,
    issued_refresh: u32,
    refresh_tokens_seen: Vec<String>,
}

impl BackendState {
    fn issue_access(&mut self) -> String {
        self.issued_access += 1;
        let token = format!("a{}", self.issued_access);
        self.valid_access.insert(token.clone());
        token
    }

    fn issue_refresh(&mut self) -> String {
        self.issued_refresh += 1;
        let token = format!("r{}", self.issued_refresh);
        self.valid_refresh.insert(token.clone());
        token
    }
}

pub struct FakeBackend {
    state: Mutex<BackendState>,
    requests: Mutex<Vec<Recorded>>,
    refresh_calls: AtomicUsize,
    refresh_delay: Duration,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Self::with_refresh_delay(Duration::ZERO)
    }

    /// Keep each refresh call in flight for `delay`, so concurrent callers
    /// pile up behind it.
    pub fn with_refresh_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BackendState::default()),
            requests: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay: delay,
        })
    }

    pub fn expire_access_tokens(&self) {
        self.state.lock().unwrap().valid_access.clear();
    }

    pub fn revoke_refresh_tokens(&self) {
        self.state.lock().unwrap().valid_refresh.clear();
    }

    /// Answer every refresh call with `status` until [`Self::heal_refresh`].
    pub fn fail_refresh_with(&self, status: u16) {
        self.state.lock().unwrap().refresh_fault = Some(RefreshFault::Status(status));
    }

    /// Make every refresh call fail at the transport level.
    pub fn drop_refresh_connections(&self) {
        self.state.lock().unwrap().refresh_fault = Some(RefreshFault::ConnectionReset);
    }

    pub fn heal_refresh(&self) {
        self.state.lock().unwrap().refresh_fault = None;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.state.lock().unwrap().refresh_tokens_seen.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    fn json_body(request: &RequestSpec) -> Value {
        match request.body() {
            RequestBody::Json(value) => value.clone(),
            _ => Value::Null,
        }
    }

    fn role_for(email: &str) -> &'static str {
        if email.starts_with("doc") {
            "doctor_admin"
        } else if email.starts_with("ph") {
            "pharmacist"
        } else {
            "super_admin"
        }
    }

    fn login(&self, body: &Value) -> ApiResponse {
        let email = body["email"].as_str().unwrap_or_default();
        if body["password"] != PASSWORD {
            return ApiResponse::json_body(
                401,
                &json!({"detail": "No active account found with the given credentials"}),
            );
        }
        let mut state = self.state.lock().unwrap();
        let tokens = json!({"access": state.issue_access(), "refresh": state.issue_refresh()});
        ApiResponse::json_body(
            200,
            &json!({
                "user": {"id": 7, "name": "Test User", "email": email, "role": Self::role_for(email)},
                "tokens": tokens
            }),
        )
    }

    fn signup(&self, body: &Value) -> ApiResponse {
        if body["email"] == "taken@x.com" {
            return ApiResponse::json_body(400, &json!({"email": ["user with this email already exists."]}));
        }
        let mut state = self.state.lock().unwrap();
        let tokens = json!({"access": state.issue_access(), "refresh": state.issue_refresh()});
        ApiResponse::json_body(
            201,
            &json!({
                "user": {"id": "u-42", "name": body["name"], "email": body["email"], "role": body["role"]},
                "tokens": tokens
            }),
        )
    }

    async fn refresh(&self, body: &Value) -> Result<ApiResponse, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        let refresh = body["refresh"].as_str().unwrap_or_default().to_string();
        let mut state = self.state.lock().unwrap();
        state.refresh_tokens_seen.push(refresh.clone());
        match state.refresh_fault {
            Some(RefreshFault::Status(status)) => return Ok(ApiResponse::new(status, "Service Unavailable")),
            Some(RefreshFault::ConnectionReset) => {
                return Err(ApiError::NetworkError("connection reset by peer".to_string()))
            }
            None => {}
        }
        if state.valid_refresh.contains(&refresh) {
            Ok(ApiResponse::json_body(200, &json!({"access": state.issue_access()})))
        } else {
            Ok(ApiResponse::json_body(
                401,
                &json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
            ))
        }
    }

    fn protected(&self, request: &RequestSpec, bearer: Option<&str>) -> ApiResponse {
        let authorized = bearer.is_some_and(|b| self.state.lock().unwrap().valid_access.contains(b));
        if !authorized || request.path() == ALWAYS_UNAUTHORIZED_PATH {
            return ApiResponse::json_body(401, &json!({"detail": "Given token not valid for any token type"}));
        }
        match request.path() {
            FAILING_PATH => ApiResponse::new(500, "Internal Server Error"),
            PROTECTED_PATH => ApiResponse::json_body(200, &json!([{"id": 1, "name": "Paracetamol"}])),
            _ => ApiResponse::json_body(200, &json!({"ok": true})),
        }
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn dispatch(&self, request: &RequestSpec, bearer: Option<&str>) -> Result<ApiResponse, ApiError> {
        self.requests.lock().unwrap().push(Recorded {
            path: request.path().to_string(),
            bearer: bearer.map(str::to_string),
        });
        let body = Self::json_body(request);
        match request.path() {
            "/accounts/login/" => Ok(self.login(&body)),
            "/accounts/signup/" => Ok(self.signup(&body)),
            "/accounts/token/refresh/" => self.refresh(&body).await,
            _ => Ok(self.protected(request, bearer)),
        }
    }
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub cache: Arc<MemoryCache>,
    pub store: Arc<SessionStore>,
    pub gateway: Gateway,
}

impl Harness {
    pub fn new(backend: Arc<FakeBackend>) -> Self {
        Self::with_cache(backend, Arc::new(MemoryCache::new()))
    }

    pub fn with_cache(backend: Arc<FakeBackend>, cache: Arc<MemoryCache>) -> Self {
        let transport: Arc<dyn Transport> = backend.clone();
        let store = Arc::new(SessionStore::open(
            Arc::clone(&transport),
            CacheManager::new(cache.clone()),
        ));
        let gateway = Gateway::new(Arc::clone(&store), transport);
        Self {
            backend,
            cache,
            store,
            gateway,
        }
    }
}
