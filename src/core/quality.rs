/// Quality Filter (C10, spec.md §4.10). Ordered pre-trade checks over
/// cached external token metadata, following the teacher's
/// `rugcheck_filtering.rs`/`filtering.rs` ordered-gate-chain shape. Fails
/// open on metadata-fetch error by deliberate design (spec.md §4.10).
use crate::core::types::{Decision, QualityLimits, TokenMetadata};
use crate::errors::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const METADATA_TTL_SECONDS: i64 = 60;
const RECENT_PUMP_WINDOW_SECONDS: i64 = 300;

#[async_trait]
pub trait MetadataApi: Send + Sync {
    async fn fetch_metadata(&self, mint: &str) -> Result<TokenMetadata, EngineError>;
}

pub struct QualityFilter<M: MetadataApi> {
    api: Arc<M>,
    limits: QualityLimits,
    cache: Mutex<HashMap<String, TokenMetadata>>,
}

impl<M: MetadataApi> QualityFilter<M> {
    pub fn new(api: Arc<M>, limits: QualityLimits) -> Self {
        Self { api, limits, cache: Mutex::new(HashMap::new()) }
    }

    pub async fn should_copy(&self, mint: &str, amount_usdc: f64) -> Decision {
        if self.limits.whitelist.contains(mint) {
            return Decision::Allow;
        }

        let metadata = match self.get_metadata(mint).await {
            Ok(m) => m,
            Err(e) => return Decision::AllowFlagged(format!("metadata fetch failed, failing open: {}", e)),
        };

        evaluate(&metadata, &self.limits, amount_usdc, Utc::now())
    }

    async fn get_metadata(&self, mint: &str) -> Result<TokenMetadata, EngineError> {
        {
            let cache = self.cache.lock().await;
            if let Some(m) = cache.get(mint) {
                if (Utc::now() - m.last_updated).num_seconds() < METADATA_TTL_SECONDS {
                    return Ok(m.clone());
                }
            }
        }

        let mut fresh = self.api.fetch_metadata(mint).await?;
        fresh.trim_price_history(Utc::now());
        self.cache.lock().await.insert(mint.to_string(), fresh.clone());
        Ok(fresh)
    }
}

fn evaluate(metadata: &TokenMetadata, limits: &QualityLimits, amount_usdc: f64, now: DateTime<Utc>) -> Decision {
    if metadata.liquidity_usdc < limits.min_liquidity_usdc {
        return Decision::Reject("liquidity below minimum".into());
    }
    if metadata.token_age_seconds < limits.min_token_age_seconds {
        return Decision::Reject("token age below minimum".into());
    }
    if metadata.volume_24h_usdc < limits.min_24h_volume_usdc {
        return Decision::Reject("24h volume below minimum".into());
    }

    let price_impact_pct = if metadata.liquidity_usdc > 0.0 {
        amount_usdc / metadata.liquidity_usdc * 100.0
    } else {
        f64::INFINITY
    };
    if price_impact_pct > limits.max_price_impact_pct {
        return Decision::Reject("estimated price impact exceeds maximum".into());
    }

    let cutoff = now - chrono::Duration::seconds(RECENT_PUMP_WINDOW_SECONDS);
    let recent: Vec<&(DateTime<Utc>, f64)> = metadata.price_history.iter().filter(|(ts, _)| *ts >= cutoff).collect();
    if recent.len() >= 2 {
        let oldest = recent.first().unwrap();
        let newest = recent.last().unwrap();
        if oldest.1 > 0.0 {
            let pump_pct = (newest.1 / oldest.1 - 1.0) * 100.0;
            if pump_pct > limits.max_recent_pump_pct {
                return Decision::Reject("recent pump exceeds maximum".into());
            }
        }
    }

    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn limits() -> QualityLimits {
        QualityLimits {
            min_liquidity_usdc: 50_000.0,
            max_price_impact_pct: 2.0,
            min_token_age_seconds: 3600,
            min_24h_volume_usdc: 10_000.0,
            max_recent_pump_pct: 50.0,
            whitelist: HashSet::new(),
        }
    }

    fn healthy_metadata(now: DateTime<Utc>) -> TokenMetadata {
        TokenMetadata {
            mint: "MINT".into(),
            liquidity_usdc: 100_000.0,
            volume_24h_usdc: 20_000.0,
            token_age_seconds: 7200,
            price_history: vec![(now - chrono::Duration::seconds(200), 1.0), (now, 1.1)],
            last_updated: now,
        }
    }

    #[test]
    fn allows_healthy_token() {
        let now = Utc::now();
        let decision = evaluate(&healthy_metadata(now), &limits(), 10.0, now);
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn rejects_low_liquidity() {
        let now = Utc::now();
        let mut meta = healthy_metadata(now);
        meta.liquidity_usdc = 1_000.0;
        let decision = evaluate(&meta, &limits(), 10.0, now);
        assert!(matches!(decision, Decision::Reject(_)));
    }

    #[test]
    fn rejects_recent_pump() {
        let now = Utc::now();
        let mut meta = healthy_metadata(now);
        meta.price_history = vec![(now - chrono::Duration::seconds(200), 1.0), (now, 2.0)];
        let decision = evaluate(&meta, &limits(), 10.0, now);
        assert!(matches!(decision, Decision::Reject(_)));
    }

    #[test]
    fn whitelist_bypass_is_checked_in_should_copy_not_evaluate() {
        let limits = limits();
        assert!(!limits.whitelist.contains("MINT"));
    }

    struct FailingMetadataApi;
    #[async_trait]
    impl MetadataApi for FailingMetadataApi {
        async fn fetch_metadata(&self, _mint: &str) -> Result<TokenMetadata, EngineError> {
            Err(EngineError::Metadata("upstream unreachable".into()))
        }
    }

    #[tokio::test]
    async fn metadata_fetch_error_fails_open_flagged() {
        let filter = QualityFilter::new(Arc::new(FailingMetadataApi), limits());
        let decision = filter.should_copy("MINT", 10.0).await;
        assert!(decision.is_allow());
        assert!(decision.filter_error().is_some());
    }
}
