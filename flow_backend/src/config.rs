use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;

use crate::tomtom::{BoundingBox, Coordinate};

pub const API_KEY_ENV: &str = "TOMTOM_API_KEY";
pub const API_KEY_FILE_ENV: &str = "TOMTOM_API_KEY_FILE";

/// Live feed settings. Every field has a Minneapolis/St. Paul default so a
/// partial JSON file only needs the keys it changes.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub refresh_secs: u64,
    pub http_timeout_secs: u64,
    /// Point queried for the flow segment overview (Minneapolis center).
    pub probe: Coordinate,
    pub route_from: Coordinate,
    pub route_to: Coordinate,
    pub incident_bbox: BoundingBox,
    /// Override for tests or a proxy; `None` means the public endpoint.
    pub base_url: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 60,
            http_timeout_secs: 10,
            probe: Coordinate::new(44.9778, -93.2650),
            route_from: Coordinate::new(44.9778, -93.2650),
            route_to: Coordinate::new(44.9537, -93.0900),
            incident_bbox: BoundingBox {
                min_lat: 44.90,
                min_lon: -93.30,
                max_lat: 45.00,
                max_lon: -93.00,
            },
            base_url: None,
        }
    }
}

impl FeedConfig {
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read feed config at {}", path))?;
        serde_json::from_str(&data).with_context(|| format!("invalid feed config JSON in {}", path))
    }

    /// `FEED_CONFIG` when set, defaults otherwise.
    pub fn from_env() -> Result<Self> {
        match std::env::var("FEED_CONFIG") {
            Ok(path) => Self::load(&path),
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Reads the API key from `TOMTOM_API_KEY`, or from the file named by
/// `TOMTOM_API_KEY_FILE`. Returns `Ok(None)` when neither is set.
pub fn api_key_from_env() -> Result<Option<String>> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        let key = key.trim().to_string();
        if key.is_empty() {
            bail!("{} is set but empty", API_KEY_ENV);
        }
        return Ok(Some(key));
    }
    if let Ok(path) = std::env::var(API_KEY_FILE_ENV) {
        let key = fs::read_to_string(&path)
            .with_context(|| format!("failed to read API key file {}", path))?;
        let key = key.trim().to_string();
        if key.is_empty() {
            bail!("API key file {} is empty", path);
        }
        return Ok(Some(key));
    }
    Ok(None)
}

/// Like [`api_key_from_env`] but a missing key is an error.
pub fn require_api_key() -> Result<String> {
    api_key_from_env()?.with_context(|| {
        format!(
            "no API key configured; set {} or {}",
            API_KEY_ENV, API_KEY_FILE_ENV
        )
    })
}
