/// Wires C1-C6 into the per-entry, per-transaction ingestion pass described
/// in spec.md §5 ("Entries within a single slot are processed sequentially
/// per slot; transactions within an entry are independent and may be
/// analyzed in parallel.").
use crate::core::classifier;
use crate::core::detector::{self, SeenSet};
use crate::core::entry_decoder;
use crate::core::lookup_table::LookupTableResolver;
use crate::core::tx_decoder;
use crate::core::types::{AggregatorTag, DetectedTrade};
use crate::core::watchlist::Watchlist;
use crate::logger::{self, LogTag};
use crate::net::rpc_client::RpcClient;
use std::sync::Arc;

pub async fn process_payload(
    slot: u64,
    payload: &[u8],
    watchlist: &Watchlist,
    resolver: &LookupTableResolver<RpcClient>,
    rpc: &Arc<RpcClient>,
    seen: &SeenSet,
) -> Vec<DetectedTrade> {
    let entries = match entry_decoder::decode_entries(payload) {
        Ok(entries) => entries,
        Err(e) => {
            logger::warn(LogTag::Decode, &format!("slot {}: malformed entry payload: {}", slot, e));
            return Vec::new();
        }
    };

    let mut detected = Vec::new();
    for entry in entries {
        let futures = entry.transactions.into_iter().map(|tx_bytes| {
            process_transaction(slot, tx_bytes, watchlist, resolver, rpc, seen)
        });
        let results = futures::future::join_all(futures).await;
        detected.extend(results.into_iter().flatten());
    }
    detected
}

async fn process_transaction(
    slot: u64,
    tx_bytes: &[u8],
    watchlist: &Watchlist,
    resolver: &LookupTableResolver<RpcClient>,
    rpc: &Arc<RpcClient>,
    seen: &SeenSet,
) -> Option<DetectedTrade> {
    let decoded = match tx_decoder::decode_transaction(tx_bytes) {
        Ok(d) => d,
        Err(_) => return None,
    };

    let watched = watchlist.first_match(&decoded.account_keys_static).await?;
    let watched = watched.to_string();

    if !seen.check_and_insert(&decoded.signature, &watched) {
        return None;
    }

    let resolved = resolver.resolve(decoded).await;
    let tag = classifier::classify(&resolved);
    let AggregatorTag::Tagged(aggregator) = tag else { return None };

    let meta = match rpc.fetch_executed_tx_meta(&resolved.decoded.signature).await {
        Ok(m) => m,
        Err(e) => {
            logger::warn(LogTag::Detect, &format!("meta fetch failed for {}: {}", resolved.decoded.signature, e));
            return None;
        }
    };

    let trade = detector::reconstruct_trade(&resolved.decoded.signature, slot, aggregator, &watched, &meta)?;
    logger::info(LogTag::Detect, &format!("detected trade {} mint={} user={}", trade.signature, trade.token_mint, trade.user));
    Some(trade)
}
