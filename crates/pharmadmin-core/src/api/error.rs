use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Session expired, please log in again ({0})")]
    Renewal(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            400 | 422 => match FieldErrors::parse(body) {
                Some(fields) => ApiError::Validation(fields),
                None => ApiError::InvalidRequest(format!("Status {}: {}", status, truncated)),
            },
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Map a rejected login or signup. Field-level messages (e.g. "email
    /// already registered") stay a validation error; anything else in the
    /// 4xx range means the credentials were refused.
    pub fn from_auth_status(status: u16, body: &str) -> Self {
        match status {
            400 | 422 => match FieldErrors::parse(body) {
                Some(fields) if !fields.is_detail_only() => ApiError::Validation(fields),
                Some(fields) => ApiError::Authentication(fields.to_string()),
                None => ApiError::Authentication(Self::truncate_body(body)),
            },
            401 | 403 => ApiError::Authentication(
                FieldErrors::parse(body)
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "invalid credentials".to_string()),
            ),
            _ => Self::from_status(status, body),
        }
    }

    /// True for errors that terminate the session rather than a single call.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::Renewal(_) | ApiError::Unauthorized)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else {
            ApiError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidResponse(err.to_string())
    }
}

/// Field-level messages returned by the backend on a rejected submission,
/// e.g. `{"email": ["This field is required."]}`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn single(field: &str, message: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert(field.to_string(), vec![message.to_string()]);
        Self(map)
    }

    /// Parse a JSON object of field -> message or field -> [messages].
    /// Returns None when the body is not such an object.
    pub fn parse(body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        let object = value.as_object()?;
        let mut map = BTreeMap::new();
        for (field, messages) in object {
            let collected: Vec<String> = match messages {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
                _ => continue,
            };
            if !collected.is_empty() {
                map.insert(field.clone(), collected);
            }
        }
        if map.is_empty() {
            None
        } else {
            Some(Self(map))
        }
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(|v| v.as_slice())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    fn is_detail_only(&self) -> bool {
        self.0.keys().all(|k| k == "detail" || k == "non_field_errors")
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(" "))?;
        }
        Ok(())
    }
}
