use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, multipart, Client};
use tracing::debug;

use super::request::{ApiResponse, RequestBody, RequestSpec};
use super::ApiError;

/// Sends one request to the backend. Implementations do no retrying and
/// never interpret the status code.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dispatch(&self, request: &RequestSpec, bearer: Option<&str>) -> Result<ApiResponse, ApiError>;
}

/// reqwest-backed transport against a single base URL.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Share an existing connection pool.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dispatch(&self, request: &RequestSpec, bearer: Option<&str>) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(request.path());
        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .header(header::ACCEPT, "application/json");

        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match request.body() {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(part) => {
                let mut file = multipart::Part::bytes(part.bytes.clone()).file_name(part.file_name.clone());
                if let Some(ref mime) = part.mime {
                    file = file.mime_str(mime)?;
                }
                builder.multipart(multipart::Form::new().part(part.field.clone(), file))
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        debug!(method = %request.method(), path = request.path(), status, "Backend responded");

        Ok(ApiResponse::new(status, body.to_vec()))
    }
}
