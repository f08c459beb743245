use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::route::CongestionTiers;

/// Routing policy knobs. The threshold picks direct vs detour; the tiers only
/// color the prediction.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RouteConfig {
    pub threshold: i32,
    pub tiers: CongestionTiers,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            threshold: 1350,
            tiers: CongestionTiers::default(),
        }
    }
}

impl RouteConfig {
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read route config at {}", path))?;
        serde_json::from_str(&data).with_context(|| format!("invalid route config JSON in {}", path))
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub model_path: String,
    pub meta_path: Option<String>,
    pub port: u16,
    pub history_path: Option<String>,
    pub route: RouteConfig,
    pub log_features: bool,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let model_path = std::env::var("MODEL_PATH").context("MODEL_PATH not set")?;
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);
        let route = match std::env::var("ROUTE_CONFIG") {
            Ok(path) => RouteConfig::load(&path)?,
            Err(_) => RouteConfig::default(),
        };
        Ok(Self {
            model_path,
            meta_path: std::env::var("META_PATH").ok(),
            port,
            history_path: std::env::var("HISTORY_PATH").ok(),
            route,
            log_features: std::env::var("LOG_FEATURES").ok().as_deref() == Some("1"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_config_partial_json() {
        let cfg: RouteConfig = serde_json::from_str(r#"{ "threshold": 1200 }"#).unwrap();
        assert_eq!(cfg.threshold, 1200);
        assert_eq!(cfg.tiers, CongestionTiers::default());

        let cfg: RouteConfig =
            serde_json::from_str(r#"{ "tiers": { "high_from": 1800 } }"#).unwrap();
        assert_eq!(cfg.threshold, 1350);
        assert_eq!(cfg.tiers.moderate_from, 1200);
        assert_eq!(cfg.tiers.high_from, 1800);
    }
}
