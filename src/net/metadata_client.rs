/// Metadata API client (spec.md §6.5), backing the Quality Filter (C10).
use crate::core::quality::MetadataApi;
use crate::core::types::TokenMetadata;
use crate::errors::EngineError;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::time::Duration;

const TIMEOUT_SECS: u64 = 2;

pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .expect("reqwest client builds with static configuration");
        Self { http, base_url }
    }
}

#[async_trait]
impl MetadataApi for MetadataClient {
    async fn fetch_metadata(&self, mint: &str) -> Result<TokenMetadata, EngineError> {
        let response = self.http.get(format!("{}/tokens/{}", self.base_url, mint)).send().await?;
        let body: serde_json::Value = response.json().await?;
        let pairs = body.get("pairs").and_then(|v| v.as_array()).ok_or_else(|| {
            EngineError::Metadata(format!("no pairs for mint {}", mint))
        })?;
        let pair = pairs.first().ok_or_else(|| EngineError::Metadata(format!("empty pairs for mint {}", mint)))?;

        let liquidity_usdc = pair.get("liquidity").and_then(|l| l.get("usd")).and_then(|v| v.as_f64()).unwrap_or(0.0);
        let volume_24h_usdc = pair.get("volume").and_then(|v| v.get("h24")).and_then(|v| v.as_f64()).unwrap_or(0.0);
        let pair_created_at_ms = pair.get("pairCreatedAt").and_then(|v| v.as_i64()).unwrap_or(0);
        let price_usd = pair.get("priceUsd").and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);

        let now = Utc::now();
        let created_at = Utc.timestamp_millis_opt(pair_created_at_ms).single().unwrap_or(now);
        let token_age_seconds = (now - created_at).num_seconds().max(0);

        Ok(TokenMetadata {
            mint: mint.to_string(),
            liquidity_usdc,
            volume_24h_usdc,
            token_age_seconds,
            price_history: vec![(now, price_usd)],
            last_updated: now,
        })
    }
}
