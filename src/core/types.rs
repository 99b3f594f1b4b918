/// Shared data model (spec.md §3), carried unchanged in meaning.
use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;

pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDC_DECIMALS: u32 = 6;

/// Fixed-point USDC amount, stored as raw micro-USDC (10^-6 units). Always
/// constructed from integer deltas — never from a binary-floating-point
/// division — so base-10 exactness at 6 decimals is preserved (spec.md §4.5
/// step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Usdc6(pub i64);

impl Usdc6 {
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn to_ui_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / 1_000_000;
        let frac = abs % 1_000_000;
        format!("{}{}.{:06}", sign, whole, frac)
    }

    pub fn checked_add(self, other: Usdc6) -> Option<Usdc6> {
        self.0.checked_add(other.0).map(Usdc6)
    }

    pub fn checked_sub(self, other: Usdc6) -> Option<Usdc6> {
        self.0.checked_sub(other.0).map(Usdc6)
    }

    pub fn to_ui_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl std::fmt::Display for Usdc6 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_ui_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxVersion {
    Legacy,
    V0,
}

#[derive(Debug, Clone)]
pub struct CompiledInstruction {
    pub program_ix: u8,
    pub account_ixs: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct LookupRef {
    pub table: Pubkey,
    pub writable_ixs: Vec<u8>,
    pub readonly_ixs: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    pub signature: String,
    pub account_keys_static: Vec<Pubkey>,
    pub version: TxVersion,
    pub compiled_instructions: Vec<CompiledInstruction>,
    pub lookup_refs: Vec<LookupRef>,
}

#[derive(Debug, Clone)]
pub struct ResolvedTransaction {
    pub decoded: DecodedTransaction,
    pub account_keys_full: Vec<Pubkey>,
}

impl ResolvedTransaction {
    pub fn program_id(&self, ix: &CompiledInstruction) -> Option<Pubkey> {
        self.account_keys_full.get(ix.program_ix as usize).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Aggregator {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorTag {
    Tagged(Aggregator),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectedTrade {
    pub signature: String,
    pub slot: u64,
    pub direction: Direction,
    pub token_mint: String,
    pub usdc_amount: Usdc6,
    pub token_amount_raw: u128,
    /// Decimals of `token_mint`, taken from the post-balance leg of the
    /// delta that produced this trade (spec.md §4.5 step 2). Carried through
    /// to `Position.decimals` so `ledger::ui_price` never mis-scales a
    /// non-9-decimal mint.
    pub token_decimals: u8,
    pub user: String,
    pub aggregator: Aggregator,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenBalanceEntry {
    pub mint: String,
    pub owner: String,
    pub raw_amount: i128,
    pub decimals: u8,
}

#[derive(Debug, Clone, Default)]
pub struct TokenBalanceDelta {
    pub mint: String,
    pub raw_delta: i128,
    pub decimals: u8,
}

/// pre/post token balance snapshot for a single executed transaction, as
/// returned by `getParsedTransaction` (spec.md §6.2).
#[derive(Debug, Clone, Default)]
pub struct ExecutedTxMeta {
    pub pre_token_balances: Vec<TokenBalanceEntry>,
    pub post_token_balances: Vec<TokenBalanceEntry>,
}

impl ExecutedTxMeta {
    /// Per-mint raw deltas for `owner = user` (spec.md §4.5 step 1-2).
    pub fn deltas_for_user(&self, user: &str) -> HashMap<String, TokenBalanceDelta> {
        let mut out: HashMap<String, TokenBalanceDelta> = HashMap::new();

        for entry in self.pre_token_balances.iter().filter(|e| e.owner == user) {
            let d = out.entry(entry.mint.clone()).or_insert_with(|| TokenBalanceDelta {
                mint: entry.mint.clone(),
                raw_delta: 0,
                decimals: entry.decimals,
            });
            d.raw_delta -= entry.raw_amount;
        }
        for entry in self.post_token_balances.iter().filter(|e| e.owner == user) {
            let d = out.entry(entry.mint.clone()).or_insert_with(|| TokenBalanceDelta {
                mint: entry.mint.clone(),
                raw_delta: 0,
                decimals: entry.decimals,
            });
            d.raw_delta += entry.raw_amount;
            // post list is preferred for decimals (spec.md §4.5 step 2).
            d.decimals = entry.decimals;
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub token_mint: String,
    pub amount_raw: u128,
    pub avg_entry_price_usdc: f64,
    pub total_cost_usdc: Usdc6,
    pub entry_time: DateTime<Utc>,
    pub signatures: Vec<String>,
    pub buy_count: u32,
    pub sell_count: u32,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct RiskLimits {
    pub max_position_usdc: f64,
    pub max_total_exposure_usdc: f64,
    pub max_open_positions: u32,
    pub min_usdc_reserve: f64,
}

#[derive(Debug, Clone)]
pub struct QualityLimits {
    pub min_liquidity_usdc: f64,
    pub max_price_impact_pct: f64,
    pub min_token_age_seconds: i64,
    pub min_24h_volume_usdc: f64,
    pub max_recent_pump_pct: f64,
    pub whitelist: std::collections::HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub mint: String,
    pub liquidity_usdc: f64,
    pub volume_24h_usdc: f64,
    pub token_age_seconds: i64,
    /// Trimmed to the last 300s on every update (spec.md §3 invariant).
    pub price_history: Vec<(DateTime<Utc>, f64)>,
    pub last_updated: DateTime<Utc>,
}

impl TokenMetadata {
    pub fn trim_price_history(&mut self, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::seconds(300);
        self.price_history.retain(|(ts, _)| *ts >= cutoff);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteMode {
    ExactIn,
    ExactOut,
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount_raw: u128,
    pub out_amount_raw: u128,
    pub other_amount_threshold: u128,
    pub price_impact_pct: f64,
    pub mode: QuoteMode,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PreBuilt {
    pub token_mint: String,
    pub signed_tx_bytes: Vec<u8>,
    pub signature: String,
    pub quote_snapshot: Quote,
    pub blockhash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PreBuilt {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Ordinary skip outcomes. Not errors (spec.md §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// A fail-open allow taken because a filter input (e.g. metadata fetch)
    /// errored rather than rejected — spec.md §4.10 requires this be
    /// distinguishable from an ordinary pass, flagged with `filter_error`.
    AllowFlagged(String),
    Reject(String),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow | Decision::AllowFlagged(_))
    }

    pub fn filter_error(&self) -> Option<&str> {
        match self {
            Decision::AllowFlagged(reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usdc6_formats_without_float_division() {
        assert_eq!(Usdc6::from_raw(2_050_000).to_ui_string(), "2.050000");
        assert_eq!(Usdc6::from_raw(1_154_294).to_ui_string(), "1.154294");
        assert_eq!(Usdc6::from_raw(-500_000).to_ui_string(), "-0.500000");
    }

    #[test]
    fn trim_price_history_drops_stale_samples() {
        let now = Utc::now();
        let mut meta = TokenMetadata {
            mint: "mint".into(),
            liquidity_usdc: 0.0,
            volume_24h_usdc: 0.0,
            token_age_seconds: 0,
            price_history: vec![
                (now - chrono::Duration::seconds(301), 1.0),
                (now - chrono::Duration::seconds(10), 2.0),
            ],
            last_updated: now,
        };
        meta.trim_price_history(now);
        assert_eq!(meta.price_history.len(), 1);
    }
}
