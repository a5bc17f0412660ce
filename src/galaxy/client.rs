//! EDSM HTTP client.
//!
//! Only two endpoints are used: the paged live commander map that backs the
//! EDSM website, and `api-v1/cube-systems` for reverse-geocoding a position.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::REFERER;
use reqwest::Client;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::coordinates::Coordinates;
use super::{EdsmError, Result};
use crate::config::GalaxyConfig;

/// Side length, in light years, of the cube searched by `location_to_system`.
const LOCATION_CUBE_SIZE: u32 = 2;

/// One commander on the live map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommanderMapEntry {
    #[serde(deserialize_with = "user_id")]
    pub user: String,
    pub coordinates: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmdr_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmdr_url: Option<String>,
}

/// EDSM sends user ids as either strings or numbers.
fn user_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// One page of the live commander map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommanderMapPage {
    pub max_items: u64,
    /// Highest page index; changes as commanders come and go.
    pub max_page: u64,
    #[serde(default)]
    pub items: Vec<CommanderMapEntry>,
}

/// Bounding query for `cube-systems`: by system name or by position.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemsQuery {
    ByName { system_name: String, size: u32 },
    ByPosition { position: Coordinates, size: u32 },
}

impl SystemsQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            SystemsQuery::ByName { system_name, size } => vec![
                ("systemName", system_name.clone()),
                ("size", size.to_string()),
            ],
            SystemsQuery::ByPosition { position, size } => vec![
                ("x", format!("{:.1}", position.x)),
                ("y", format!("{:.1}", position.y)),
                ("z", format!("{:.1}", position.z)),
                ("size", size.to_string()),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SystemSummary {
    pub name: String,
}

/// Source of commander listing pages.
///
/// Implemented by [`EdsmClient`]; tests supply scripted implementations.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Fetch one page of the listing. Pages are 1-based.
    async fn fetch_page(&self, page: u64) -> Result<CommanderMapPage>;

    /// Best-effort name of the system at `position`.
    async fn nearest_system_name(&self, position: Coordinates) -> Result<Option<String>>;
}

/// HTTP client for www.edsm.net.
#[derive(Debug, Clone)]
pub struct EdsmClient {
    http: Client,
    base_url: String,
    language: String,
    api_key: Option<String>,
}

impl EdsmClient {
    /// Create a client with the transport's default timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::build(base_url.into(), None)
    }

    pub fn from_config(config: &GalaxyConfig) -> Result<Self> {
        let timeout = config.request_timeout_secs.map(Duration::from_secs);
        Ok(Self::build(config.base_url.clone(), timeout)?
            .with_language(config.language.clone())
            .with_api_key(config.api_key.clone()))
    }

    fn build(base_url: String, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            language: "en".to_string(),
            api_key: None,
        })
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn page_path(&self, page: u64) -> String {
        format!("/{}/map/users/live/p/{}", self.language, page)
    }

    async fn request<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .http
            .get(&url)
            .header("x-requested-with", "XMLHttpRequest")
            .header(REFERER, format!("{}/en/map/users", self.base_url))
            .query(query);
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("apiKey", api_key)]);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(url = %url, status = %status, "EDSM request failed");
            return Err(EdsmError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        debug!(url = %url, bytes = body.len(), "EDSM response received");
        Ok(serde_json::from_str(&body)?)
    }

    /// Systems inside a cube around a system or a position.
    ///
    /// EDSM answers an empty object rather than an empty list when nothing
    /// matches; both yield an empty result.
    pub async fn get_systems_in_cube(&self, query: &SystemsQuery) -> Result<Vec<SystemSummary>> {
        let value: Value = self.request("/api-v1/cube-systems", &query.params()).await?;
        match value {
            Value::Array(_) => Ok(serde_json::from_value(value)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Name of a system within a small cube around `position`.
    pub async fn location_to_system(&self, position: Coordinates) -> Result<Option<String>> {
        let systems = self
            .get_systems_in_cube(&SystemsQuery::ByPosition {
                position,
                size: LOCATION_CUBE_SIZE,
            })
            .await?;
        Ok(systems.into_iter().next().map(|s| s.name))
    }

    pub async fn get_commander_map_page(&self, page: u64) -> Result<CommanderMapPage> {
        self.request(&self.page_path(page), &[]).await
    }

    /// Walk every page once and concatenate the entries.
    pub async fn get_commander_map(&self) -> Result<Vec<CommanderMapEntry>> {
        let mut entries = Vec::new();
        let mut index = 0;
        loop {
            let page = self.get_commander_map_page(index + 1).await?;
            entries.extend(page.items);
            if index >= page.max_page {
                return Ok(entries);
            }
            index += 1;
        }
    }
}

#[async_trait]
impl PeerDirectory for EdsmClient {
    async fn fetch_page(&self, page: u64) -> Result<CommanderMapPage> {
        self.get_commander_map_page(page).await
    }

    async fn nearest_system_name(&self, position: Coordinates) -> Result<Option<String>> {
        self.location_to_system(position).await
    }
}
