//! Typed API client for the pharmacy admin backend.
//!
//! Every call goes through the [`Gateway`], so an expired access token is
//! renewed transparently. Non-success statuses become [`ApiError`]s here.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::gateway::Gateway;
use super::request::{ApiResponse, FilePart, RequestSpec};
use super::transport::{HttpTransport, Transport};
use super::ApiError;
use crate::auth::{Role, Session, SessionStore};
use crate::cache::{CacheManager, FileCache};
use crate::config::Config;
use crate::models::chat::ChatEnvelope;
use crate::models::{BillUpload, ChatReply, ChatRequest, Drug, GeoPoint, InventoryDraft, NewDrug, PharmacyDrug};

const DRUGS_PATH: &str = "/pharmacy/drugs/";
const INVENTORY_PATH: &str = "/pharmacy/pharmacy-drugs/";
const BILL_UPLOAD_PATH: &str = "/billing/upload/";
const CHAT_PATH: &str = "/chatbot/chat/";

/// Multipart field name the upload endpoint reads the bill from.
const BILL_FIELD: &str = "file";

/// Clone is cheap; clones share one session store.
#[derive(Clone)]
pub struct ApiClient {
    gateway: Gateway,
}

impl ApiClient {
    /// Client against the configured backend, with the session persisted in
    /// the user's cache directory.
    pub fn new(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.base_url(), config.request_timeout())?;
        let cache = FileCache::new(config.cache_dir()?)?;
        Ok(Self::with_parts(Arc::new(transport), CacheManager::new(Arc::new(cache))))
    }

    pub fn with_parts(transport: Arc<dyn Transport>, cache: CacheManager) -> Self {
        let store = Arc::new(SessionStore::open(Arc::clone(&transport), cache));
        Self {
            gateway: Gateway::new(store, transport),
        }
    }

    pub fn session_store(&self) -> &Arc<SessionStore> {
        self.gateway.store()
    }

    // ===== Session =====

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        self.session_store().login(email, password).await
    }

    pub async fn signup(&self, name: &str, email: &str, role: Role, password: &str) -> Result<Session, ApiError> {
        self.session_store().signup(name, email, role, password).await
    }

    pub fn logout(&self) {
        self.session_store().logout()
    }

    // ===== Plumbing =====

    async fn send(&self, request: &RequestSpec) -> Result<ApiResponse, ApiError> {
        self.gateway.send(request).await?.error_for_status()
    }

    async fn fetch<T: DeserializeOwned>(&self, request: &RequestSpec) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    // ===== Drug catalog =====

    pub async fn fetch_drugs(&self) -> Result<Vec<Drug>, ApiError> {
        self.fetch(&RequestSpec::get(DRUGS_PATH)).await
    }

    pub async fn create_drug(&self, drug: &NewDrug) -> Result<Drug, ApiError> {
        drug.validate()?;
        self.fetch(&RequestSpec::post_json(DRUGS_PATH, drug)?).await
    }

    pub async fn update_drug(&self, drug: &Drug) -> Result<Drug, ApiError> {
        let body = drug.submission_payload()?;
        let path = format!("{}{}/", DRUGS_PATH, drug.id);
        self.fetch(&RequestSpec::put_json(path, &body)?).await
    }

    pub async fn delete_drug(&self, id: i64) -> Result<(), ApiError> {
        self.send(&RequestSpec::delete(format!("{}{}/", DRUGS_PATH, id))).await?;
        Ok(())
    }

    // ===== Pharmacy inventory =====

    /// Fetch the pharmacy's stock, optionally filtered by a search term.
    pub async fn fetch_inventory(&self, search: Option<&str>) -> Result<Vec<PharmacyDrug>, ApiError> {
        let mut request = RequestSpec::get(INVENTORY_PATH);
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            request = request.with_query("search", term);
        }
        self.fetch(&request).await
    }

    pub async fn add_inventory(&self, draft: &InventoryDraft) -> Result<PharmacyDrug, ApiError> {
        let body = draft.submission_payload()?;
        self.fetch(&RequestSpec::post_json(INVENTORY_PATH, &body)?).await
    }

    pub async fn update_inventory(&self, item: &PharmacyDrug) -> Result<(), ApiError> {
        let body = item.submission_payload()?;
        let path = format!("{}{}/", INVENTORY_PATH, item.resource_id());
        self.send(&RequestSpec::put_json(path, &body)?).await?;
        debug!(id = item.resource_id(), "Inventory row updated");
        Ok(())
    }

    pub async fn delete_inventory(&self, id: i64) -> Result<(), ApiError> {
        self.send(&RequestSpec::delete(format!("{}{}/", INVENTORY_PATH, id))).await?;
        Ok(())
    }

    // ===== Bills =====

    /// Upload a bill image and get back the drugs recognised on it.
    pub async fn upload_bill(&self, file_name: &str, bytes: Vec<u8>) -> Result<BillUpload, ApiError> {
        let part = FilePart {
            field: BILL_FIELD.to_string(),
            file_name: file_name.to_string(),
            mime: mime_for(file_name).map(str::to_string),
            bytes,
        };
        let upload: BillUpload = self.fetch(&RequestSpec::upload(BILL_UPLOAD_PATH, part)).await?;
        debug!(matched = upload.matched_drugs.len(), "Bill uploaded");
        Ok(upload)
    }

    /// Save a drug matched on a bill into the pharmacy's stock.
    pub async fn save_matched_drug(&self, drug: &PharmacyDrug) -> Result<(), ApiError> {
        let body = drug.submission_payload()?;
        self.send(&RequestSpec::post_json(INVENTORY_PATH, &body)?).await?;
        Ok(())
    }

    // ===== Chat =====

    pub async fn chat(&self, message: &str, location: Option<GeoPoint>) -> Result<ChatReply, ApiError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ApiError::Validation(super::FieldErrors::single(
                "message",
                "This field may not be blank.",
            )));
        }
        let request = RequestSpec::post_json(CHAT_PATH, &ChatRequest::new(message, location))?;
        let envelope: ChatEnvelope = self.fetch(&request).await?;
        Ok(envelope.response_data)
    }
}

fn mime_for(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}
