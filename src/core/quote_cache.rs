/// Quote cache half of C7 (spec.md §4.7). TTL'd cache over an external
/// quote API, modeled on the teacher's `apis/jupiter/mod.rs` client plus
/// `cache/manager.rs`'s TTL-map shape (plain `HashMap` + lock, not a
/// concurrent-map crate — the teacher doesn't pull one in either).
use crate::core::types::{Quote, QuoteMode};
use crate::errors::EngineError;
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

pub const QUOTE_TTL_SECONDS: i64 = 5;
/// spec.md §4.7: a background task refreshes quotes for each whitelisted
/// mint every 3s, ahead of the 5s TTL expiring.
pub const QUOTE_REFRESH_INTERVAL_SECONDS: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteKey {
    pub input_mint: String,
    pub output_mint: String,
    pub amount_raw: u128,
    pub mode: QuoteModeKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteModeKey {
    ExactIn,
    ExactOut,
}

impl From<QuoteMode> for QuoteModeKey {
    fn from(m: QuoteMode) -> Self {
        match m {
            QuoteMode::ExactIn => QuoteModeKey::ExactIn,
            QuoteMode::ExactOut => QuoteModeKey::ExactOut,
        }
    }
}

#[async_trait]
pub trait QuoteApi: Send + Sync {
    async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_raw: u128,
        slippage_bps: u16,
        mode: QuoteMode,
    ) -> Result<Quote, EngineError>;
}

pub struct QuoteCache<A: QuoteApi> {
    api: std::sync::Arc<A>,
    slippage_bps: u16,
    entries: Mutex<HashMap<QuoteKey, Quote>>,
}

impl<A: QuoteApi> QuoteCache<A> {
    pub fn new(api: std::sync::Arc<A>, slippage_bps: u16) -> Self {
        Self { api, slippage_bps, entries: Mutex::new(HashMap::new()) }
    }

    pub async fn get_with_cache(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_raw: u128,
        mode: QuoteMode,
    ) -> Result<Quote, EngineError> {
        let key = QuoteKey {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            amount_raw,
            mode: mode.into(),
        };

        {
            let entries = self.entries.lock().await;
            if let Some(quote) = entries.get(&key) {
                if fresh(quote.fetched_at, Utc::now()) {
                    return Ok(quote.clone());
                }
            }
        }

        let quote = self.api.get_quote(input_mint, output_mint, amount_raw, self.slippage_bps, mode).await?;
        self.entries.lock().await.insert(key, quote.clone());
        Ok(quote)
    }

    /// Background refresh loop (spec.md §4.7): every 3s, re-fetches a
    /// USDC -> mint ExactIn quote for each whitelisted mint so the cache
    /// stays warm ahead of its 5s TTL. Runs until `shutdown` fires.
    pub async fn run_refresh_loop(
        self: Arc<Self>,
        usdc_mint: String,
        whitelisted_mints: Vec<String>,
        amount_raw: u128,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        if whitelisted_mints.is_empty() {
            return;
        }
        let mut interval = tokio::time::interval(Duration::from_secs(QUOTE_REFRESH_INTERVAL_SECONDS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for mint in &whitelisted_mints {
                        if let Err(e) = self.get_with_cache(&usdc_mint, mint, amount_raw, QuoteMode::ExactIn).await {
                            logger::warn(LogTag::Quote, &format!("background quote refresh failed for {}: {}", mint, e));
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

fn fresh(fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - fetched_at).num_seconds() < QUOTE_TTL_SECONDS
}
