/// Pre-built cache half of C7 (spec.md §4.7). Pre-signed buy transactions
/// per whitelisted mint, consumed atomically by the orchestrator. Cache
/// shape follows the teacher's `cache/manager.rs` TTL map.
use crate::core::quote_cache::{QuoteApi, QuoteCache};
use crate::core::types::{PreBuilt, Quote, QuoteMode};
use crate::errors::EngineError;
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::VersionedTransaction;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

pub const PREBUILT_TTL_SECONDS: i64 = 45;
pub const PREBUILT_REFRESH_LEAD_SECONDS: i64 = 15;
/// spec.md §4.7: the pre-built cache refreshes on a 30s cadence, staggered
/// per mint within the interval rather than fired all at once.
pub const PREBUILT_REFRESH_INTERVAL_SECONDS: u64 = 30;

#[async_trait]
pub trait SwapBuildApi: Send + Sync {
    /// Requests a build-and-serialize of the swap transaction; returns the
    /// unsigned, base64-decoded transaction bytes.
    async fn build_swap(
        &self,
        quote: &Quote,
        user_public_key: &str,
        priority_fee_microlamports: u64,
    ) -> Result<Vec<u8>, EngineError>;
}

pub struct PreBuiltCache<Q: QuoteApi, B: SwapBuildApi> {
    quotes: Arc<QuoteCache<Q>>,
    build_api: Arc<B>,
    keypair: Arc<Keypair>,
    priority_fee_microlamports: u64,
    entries: Mutex<HashMap<String, PreBuilt>>,
}

impl<Q: QuoteApi, B: SwapBuildApi> PreBuiltCache<Q, B> {
    pub fn new(
        quotes: Arc<QuoteCache<Q>>,
        build_api: Arc<B>,
        keypair: Arc<Keypair>,
        priority_fee_microlamports: u64,
    ) -> Self {
        Self { quotes, build_api, keypair, priority_fee_microlamports, entries: Mutex::new(HashMap::new()) }
    }

    /// Atomic: removes and returns a non-expired entry. A concurrent second
    /// caller for the same mint observes `None`.
    pub async fn take(&self, token_mint: &str) -> Option<PreBuilt> {
        let mut entries = self.entries.lock().await;
        match entries.remove(token_mint) {
            Some(entry) if !entry.is_expired(Utc::now()) => Some(entry),
            _ => None,
        }
    }

    pub async fn needs_refresh(&self, token_mint: &str, now: DateTime<Utc>) -> bool {
        let entries = self.entries.lock().await;
        match entries.get(token_mint) {
            None => true,
            Some(entry) => entry.expires_at - now <= ChronoDuration::seconds(PREBUILT_REFRESH_LEAD_SECONDS),
        }
    }

    pub async fn refresh(
        &self,
        token_mint: &str,
        usdc_mint: &str,
        amount_usdc_raw: u128,
    ) -> Result<(), EngineError> {
        let quote = self.quotes.get_with_cache(usdc_mint, token_mint, amount_usdc_raw, QuoteMode::ExactIn).await?;
        let unsigned_bytes =
            self.build_api.build_swap(&quote, &self.keypair.pubkey().to_string(), self.priority_fee_microlamports).await?;
        let (signed_bytes, signature) = sign_built_transaction(&unsigned_bytes, &self.keypair)?;

        let now = Utc::now();
        let entry = PreBuilt {
            token_mint: token_mint.to_string(),
            signed_tx_bytes: signed_bytes,
            signature,
            quote_snapshot: quote,
            blockhash: String::new(),
            created_at: now,
            expires_at: now + ChronoDuration::seconds(PREBUILT_TTL_SECONDS),
        };
        self.entries.lock().await.insert(token_mint.to_string(), entry);
        Ok(())
    }

    /// Background refresh loop (spec.md §4.7): every 30s, rebuilds any
    /// whitelisted mint whose pre-built entry is absent or expiring within
    /// `PREBUILT_REFRESH_LEAD_SECONDS`. Refreshes are staggered across the
    /// interval rather than fired all at once, so a large watchlist doesn't
    /// burst every mint's quote+build call in the same instant. Runs until
    /// `shutdown` fires.
    pub async fn run_refresh_loop(
        self: Arc<Self>,
        usdc_mint: String,
        whitelisted_mints: Vec<String>,
        amount_usdc_raw: u128,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        if whitelisted_mints.is_empty() {
            return;
        }
        let stagger = Duration::from_secs(PREBUILT_REFRESH_INTERVAL_SECONDS) / whitelisted_mints.len() as u32;
        let mut interval = tokio::time::interval(Duration::from_secs(PREBUILT_REFRESH_INTERVAL_SECONDS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for mint in &whitelisted_mints {
                        if *shutdown.borrow() {
                            return;
                        }
                        if self.needs_refresh(mint, Utc::now()).await {
                            if let Err(e) = self.refresh(mint, &usdc_mint, amount_usdc_raw).await {
                                logger::warn(LogTag::Quote, &format!("background prebuilt refresh failed for {}: {}", mint, e));
                            }
                        }
                        tokio::time::sleep(stagger).await;
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

pub fn sign_built_transaction(unsigned_bytes: &[u8], keypair: &Keypair) -> Result<(Vec<u8>, String), EngineError> {
    let mut tx: VersionedTransaction = bincode::deserialize(unsigned_bytes)
        .map_err(|e| EngineError::Build(format!("failed to deserialize swap transaction: {}", e)))?;
    let message_bytes = tx.message.serialize();
    let signature = keypair.sign_message(&message_bytes);
    if tx.signatures.is_empty() {
        tx.signatures.push(signature);
    } else {
        tx.signatures[0] = signature;
    }
    let signed_bytes = bincode::serialize(&tx)
        .map_err(|e| EngineError::Build(format!("failed to serialize signed transaction: {}", e)))?;
    Ok((signed_bytes, signature.to_string()))
}
