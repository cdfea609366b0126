use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Body of `POST /chatbot/chat/`. Coordinates are always sent, as null when
/// the location is unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl ChatRequest {
    pub fn new(message: &str, location: Option<GeoPoint>) -> Self {
        Self {
            message: message.to_string(),
            lat: location.map(|p| p.lat),
            lng: location.map(|p| p.lng),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatEnvelope {
    pub response_data: ChatReply,
}
