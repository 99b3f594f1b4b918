/// Lookup-Table Resolver (C3, spec.md §4.3). Expands a decoded transaction's
/// static keys to the full account-key vector, fetching address-lookup-table
/// contents through `rpc.rs`'s style of rate-limited client (teacher's
/// `RpcRateLimiter`) with at most one in-flight fetch per table.
use crate::core::types::{DecodedTransaction, ResolvedTransaction, TxVersion};
use crate::errors::EngineError;
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;

const MIN_FETCH_SPACING: Duration = Duration::from_millis(500);

#[async_trait]
pub trait LookupTableProvider: Send + Sync {
    async fn fetch_lookup_table(&self, table: Pubkey) -> Result<Vec<Pubkey>, EngineError>;
}

pub struct LookupTableResolver<P: LookupTableProvider> {
    provider: Arc<P>,
    cache: RwLock<HashMap<Pubkey, Arc<Vec<Pubkey>>>>,
    in_flight: Mutex<HashMap<Pubkey, Arc<Notify>>>,
    rate_gate: Mutex<Instant>,
}

impl<P: LookupTableProvider> LookupTableResolver<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            cache: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            rate_gate: Mutex::new(Instant::now() - MIN_FETCH_SPACING),
        }
    }

    pub async fn resolve(&self, decoded: DecodedTransaction) -> ResolvedTransaction {
        if decoded.version == TxVersion::Legacy || decoded.lookup_refs.is_empty() {
            let account_keys_full = decoded.account_keys_static.clone();
            return ResolvedTransaction { decoded, account_keys_full };
        }

        let mut account_keys_full = decoded.account_keys_static.clone();

        for lookup in &decoded.lookup_refs {
            match self.get_or_fetch(lookup.table).await {
                Ok(table_keys) => {
                    account_keys_full.extend(
                        lookup.writable_ixs.iter().filter_map(|&ix| table_keys.get(ix as usize).copied()),
                    );
                    account_keys_full.extend(
                        lookup.readonly_ixs.iter().filter_map(|&ix| table_keys.get(ix as usize).copied()),
                    );
                }
                Err(_) => {
                    // Best-effort: proceed with the subset resolved so far.
                }
            }
        }

        ResolvedTransaction { decoded, account_keys_full }
    }

    async fn get_or_fetch(&self, table: Pubkey) -> Result<Arc<Vec<Pubkey>>, EngineError> {
        if let Some(keys) = self.cache.read().await.get(&table) {
            return Ok(keys.clone());
        }

        let notify = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(&table) {
                Some(existing.clone())
            } else {
                in_flight.insert(table, Arc::new(Notify::new()));
                None
            }
        };

        if let Some(notify) = notify {
            notify.notified().await;
            if let Some(keys) = self.cache.read().await.get(&table) {
                return Ok(keys.clone());
            }
            return Err(EngineError::LookupResolution(format!(
                "coalesced fetch for {} did not populate cache",
                table
            )));
        }

        let result = self.fetch_rate_limited(table).await;

        let mut in_flight = self.in_flight.lock().await;
        if let Some(waiter) = in_flight.remove(&table) {
            waiter.notify_waiters();
        }

        let keys = result?;
        let keys = Arc::new(keys);
        self.cache.write().await.insert(table, keys.clone());
        Ok(keys)
    }

    async fn fetch_rate_limited(&self, table: Pubkey) -> Result<Vec<Pubkey>, EngineError> {
        {
            let mut gate = self.rate_gate.lock().await;
            let now = Instant::now();
            let earliest = *gate + MIN_FETCH_SPACING;
            if earliest > now {
                tokio::time::sleep(earliest - now).await;
            }
            *gate = Instant::now();
        }
        self.provider.fetch_lookup_table(table).await
    }
}
