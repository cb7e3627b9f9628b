//! Sticker lookup for story cards — a thin search client with a
//! process-wide cache.
//!
//! Cache lifecycle is populate-on-first-request, never invalidated, never
//! evicted: the query vocabulary is small and finite relative to session
//! lifetime. Concurrent requests for the same uncached key are not
//! coalesced; last write wins.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Mutex;
use tracing::debug;

use crate::schema::card::Card;

static STICKER_CACHE: Lazy<Mutex<FxHashMap<String, Option<String>>>> =
    Lazy::new(|| Mutex::new(FxHashMap::default()));

fn cache_get(query: &str) -> Option<Option<String>> {
    let guard = match STICKER_CACHE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.get(query).cloned()
}

fn cache_set(query: &str, url: Option<String>) {
    let mut guard = match STICKER_CACHE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.insert(query.to_string(), url);
}

/// Client for the sticker search endpoint.
pub struct StickerClient {
    client: reqwest::Client,
    base_url: String,
    app_key: String,
    customer_id: String,
}

impl StickerClient {
    pub fn new(app_key: impl Into<String>) -> StickerClient {
        StickerClient {
            client: reqwest::Client::new(),
            base_url: "https://api.klipy.com/api/v1".to_string(),
            app_key: app_key.into(),
            customer_id: "lesson-engine".to_string(),
        }
    }

    /// Reads `KLIPY_APP_KEY`; an empty key produces empty lookups rather
    /// than errors.
    pub fn from_env() -> StickerClient {
        Self::new(std::env::var("KLIPY_APP_KEY").unwrap_or_default())
    }

    fn search_url(&self) -> String {
        format!("{}/{}/stickers/search", self.base_url, self.app_key)
    }

    /// Look up the best sticker URL for a query, hitting the cache first.
    /// Failures are cached as `None` — a missing sticker is never an error.
    pub async fn sticker_for(&self, query: &str) -> Option<String> {
        if query.is_empty() {
            return None;
        }
        if let Some(cached) = cache_get(query) {
            return cached;
        }

        let url = self.fetch(query).await;
        cache_set(query, url.clone());
        url
    }

    async fn fetch(&self, query: &str) -> Option<String> {
        debug!(query, "sticker cache miss, querying endpoint");
        let response = self
            .client
            .get(self.search_url())
            .query(&[
                ("q", query),
                ("customer_id", self.customer_id.as_str()),
                ("per_page", "1"),
                ("content_filter", "medium"),
            ])
            .send()
            .await
            .ok()?;

        let data: Value = response.json().await.ok()?;
        extract_sticker_url(&data)
    }

    /// Fire lookups for every story card so stickers are cached before the
    /// learner reaches them.
    pub async fn preload(&self, cards: &[Card]) {
        for card in cards {
            if let Some(query) = card.sticker_query() {
                self.sticker_for(query).await;
            }
        }
    }
}

/// Extract the first result's best thumbnail URL.
/// Prefer sm.webp (small file, good quality), fall back to sm.gif, then
/// the xs formats.
pub fn extract_sticker_url(data: &Value) -> Option<String> {
    let file = data
        .get("data")?
        .get("data")?
        .get(0)?
        .get("file")?;

    for (size, format) in [("sm", "webp"), ("sm", "gif"), ("xs", "webp"), ("xs", "gif")] {
        if let Some(url) = file
            .get(size)
            .and_then(|s| s.get(format))
            .and_then(|f| f.get("url"))
            .and_then(|u| u.as_str())
        {
            return Some(url.to_string());
        }
    }
    None
}
