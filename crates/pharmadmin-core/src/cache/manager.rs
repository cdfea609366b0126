use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::KeyValueCache;
use crate::auth::{CredentialPair, Session};

const USER_KEY: &str = "user";
const TOKENS_KEY: &str = "tokens";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// The two persisted records behind a session: `user` and `tokens`.
#[derive(Clone)]
pub struct CacheManager {
    backend: Arc<dyn KeyValueCache>,
}

impl CacheManager {
    pub fn new(backend: Arc<dyn KeyValueCache>) -> Self {
        Self { backend }
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let Some(contents) = self.backend.get(name)? else {
            return Ok(None);
        };
        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache record: {}", name))?;
        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let contents = serde_json::to_string_pretty(&cached)?;
        self.backend.set(name, &contents)?;
        debug!(record = name, "Cache record written");
        Ok(())
    }

    pub fn load_user(&self) -> Result<Option<CachedData<Session>>> {
        self.load(USER_KEY)
    }

    pub fn save_user(&self, user: &Session) -> Result<()> {
        self.save(USER_KEY, user)
    }

    pub fn load_tokens(&self) -> Result<Option<CachedData<CredentialPair>>> {
        self.load(TOKENS_KEY)
    }

    pub fn save_tokens(&self, tokens: &CredentialPair) -> Result<()> {
        self.save(TOKENS_KEY, tokens)
    }

    /// Remove both records. Both removals are attempted even if the first fails.
    pub fn clear(&self) -> Result<()> {
        let user = self.backend.remove(USER_KEY);
        let tokens = self.backend.remove(TOKENS_KEY);
        user.and(tokens)
    }
}
