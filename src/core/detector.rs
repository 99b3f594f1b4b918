/// Balance-Delta Trade Reconstructor (C5, spec.md §4.5). Converts executed
/// transaction metadata into a `DetectedTrade` using only integer balance
/// deltas, matching the teacher's `TokenBalance`/`UiTokenAmount` shape
/// (`rpc.rs`) rather than re-deriving amounts from instruction data.
use crate::core::types::{Aggregator, DetectedTrade, Direction, ExecutedTxMeta, Usdc6, USDC_MINT};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// spec.md §4.5 requires strict `|usdc_delta| > 10⁻⁶`; at 6 decimals that
/// means the raw delta must be at least 2 (raw == 1 is exactly 10⁻⁶, not
/// strictly greater).
const MIN_USDC_DELTA_RAW: i128 = 2;
const SEEN_WINDOW: Duration = Duration::from_secs(60);

/// Guards against evaluating the same `(signature, user)` pair twice, per
/// spec.md §9(c) ("the source evaluates the same transaction twice in
/// places"). A small bounded window, not a full LRU crate — entries older
/// than `SEEN_WINDOW` are swept on every insert.
#[derive(Default)]
pub struct SeenSet {
    seen: Mutex<HashMap<(String, String), Instant>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time this pair is observed within the
    /// window; `false` on every subsequent call until it expires.
    pub fn check_and_insert(&self, signature: &str, user: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().expect("seen-set mutex is not poisoned");
        seen.retain(|_, ts| now.duration_since(*ts) < SEEN_WINDOW);
        let key = (signature.to_string(), user.to_string());
        if seen.contains_key(&key) {
            return false;
        }
        seen.insert(key, now);
        true
    }
}

/// `(signature, slot, tag, user, meta) -> DetectedTrade | None`.
pub fn reconstruct_trade(
    signature: &str,
    slot: u64,
    aggregator: Aggregator,
    user: &str,
    meta: &ExecutedTxMeta,
) -> Option<DetectedTrade> {
    let deltas = meta.deltas_for_user(user);

    let usdc_delta = deltas.get(USDC_MINT)?;
    if usdc_delta.raw_delta.unsigned_abs() < MIN_USDC_DELTA_RAW as u128 {
        return None;
    }

    let mut others = deltas.iter().filter(|(mint, _)| mint.as_str() != USDC_MINT);
    let (token_mint, token_delta) = others.next()?;
    if others.next().is_some() {
        return None;
    }

    let direction = if usdc_delta.raw_delta > 0 { Direction::Sell } else { Direction::Buy };
    let usdc_amount_raw = usdc_delta.raw_delta.unsigned_abs();
    let usdc_amount = Usdc6::from_raw(usdc_amount_raw as i64);
    let token_amount_raw = token_delta.raw_delta.unsigned_abs();

    Some(DetectedTrade {
        signature: signature.to_string(),
        slot,
        direction,
        token_mint: token_mint.clone(),
        usdc_amount,
        token_amount_raw,
        token_decimals: token_delta.decimals,
        user: user.to_string(),
        aggregator,
        detected_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TokenBalanceEntry;

    #[test]
    fn seen_set_allows_first_and_blocks_repeat() {
        let seen = SeenSet::new();
        assert!(seen.check_and_insert("sig1", "user1"));
        assert!(!seen.check_and_insert("sig1", "user1"));
        assert!(seen.check_and_insert("sig1", "user2"));
        assert!(seen.check_and_insert("sig2", "user1"));
    }

    fn meta_with(pre: Vec<TokenBalanceEntry>, post: Vec<TokenBalanceEntry>) -> ExecutedTxMeta {
        ExecutedTxMeta { pre_token_balances: pre, post_token_balances: post }
    }

    #[test]
    fn reconstructs_a_buy() {
        let user = "user1";
        let meta = meta_with(
            vec![TokenBalanceEntry { mint: USDC_MINT.into(), owner: user.into(), raw_amount: 10_000_000, decimals: 6 }],
            vec![
                TokenBalanceEntry { mint: USDC_MINT.into(), owner: user.into(), raw_amount: 8_000_000, decimals: 6 },
                TokenBalanceEntry { mint: "TOKEN".into(), owner: user.into(), raw_amount: 500_000, decimals: 9 },
            ],
        );
        let trade = reconstruct_trade("sig", 1, Aggregator::A, user, &meta).unwrap();
        assert_eq!(trade.direction, Direction::Buy);
        assert_eq!(trade.usdc_amount, Usdc6::from_raw(2_000_000));
        assert_eq!(trade.token_amount_raw, 500_000);
        assert_eq!(trade.token_mint, "TOKEN");
    }

    #[test]
    fn reconstructs_a_sell() {
        let user = "user1";
        let meta = meta_with(
            vec![TokenBalanceEntry { mint: "TOKEN".into(), owner: user.into(), raw_amount: 500_000, decimals: 9 }],
            vec![
                TokenBalanceEntry { mint: USDC_MINT.into(), owner: user.into(), raw_amount: 3_000_000, decimals: 6 },
            ],
        );
        let trade = reconstruct_trade("sig", 1, Aggregator::B, user, &meta).unwrap();
        assert_eq!(trade.direction, Direction::Sell);
        assert_eq!(trade.token_amount_raw, 500_000);
    }

    #[test]
    fn returns_none_without_usdc_leg() {
        let user = "user1";
        let meta = meta_with(
            vec![TokenBalanceEntry { mint: "TOKEN".into(), owner: user.into(), raw_amount: 1, decimals: 9 }],
            vec![TokenBalanceEntry { mint: "TOKEN".into(), owner: user.into(), raw_amount: 2, decimals: 9 }],
        );
        assert!(reconstruct_trade("sig", 1, Aggregator::A, user, &meta).is_none());
    }

    #[test]
    fn returns_none_when_usdc_delta_is_exactly_one_raw_unit() {
        // raw_delta == 1 at 6 decimals is exactly 10⁻⁶ USDC, not strictly
        // greater than it, so spec.md's `|usdc_delta| > 10⁻⁶` must reject it.
        let user = "user1";
        let meta = meta_with(
            vec![TokenBalanceEntry { mint: USDC_MINT.into(), owner: user.into(), raw_amount: 1, decimals: 6 }],
            vec![
                TokenBalanceEntry { mint: USDC_MINT.into(), owner: user.into(), raw_amount: 0, decimals: 6 },
                TokenBalanceEntry { mint: "TOKEN".into(), owner: user.into(), raw_amount: 5, decimals: 9 },
            ],
        );
        assert!(reconstruct_trade("sig", 1, Aggregator::A, user, &meta).is_none());
    }

    /// Seeded pseudo-random deltas across a range of token decimals (C5,
    /// spec.md §8): a buy's reconstructed `token_amount_raw` and direction
    /// must match the raw deltas fed in, regardless of the token's decimal
    /// count, and the USDC boundary (`raw >= 2`) must hold at every scale.
    #[test]
    fn seeded_random_deltas_reconstruct_consistently_across_decimals() {
        let mut state: u64 = 0xD1B54A32D192ED03;
        let mut next_u64 = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        for i in 0..100 {
            let user = "user1";
            let decimals = [0u8, 2, 5, 6, 9][i % 5];
            let usdc_raw = 2 + (next_u64() % 50_000_000) as i128;
            let token_raw = 1 + (next_u64() % 1_000_000_000) as i128;

            let meta = meta_with(
                vec![TokenBalanceEntry { mint: USDC_MINT.into(), owner: user.into(), raw_amount: usdc_raw, decimals: 6 }],
                vec![
                    TokenBalanceEntry { mint: USDC_MINT.into(), owner: user.into(), raw_amount: 0, decimals: 6 },
                    TokenBalanceEntry { mint: "TOKEN".into(), owner: user.into(), raw_amount: token_raw, decimals },
                ],
            );
            let trade = reconstruct_trade("sig", 1, Aggregator::A, user, &meta).unwrap();
            assert_eq!(trade.direction, Direction::Buy);
            assert_eq!(trade.usdc_amount, Usdc6::from_raw(usdc_raw as i64));
            assert_eq!(trade.token_amount_raw, token_raw as u128);
            assert_eq!(trade.token_decimals, decimals);
        }
    }

    #[test]
    fn returns_none_for_other_owners() {
        let meta = meta_with(
            vec![TokenBalanceEntry { mint: USDC_MINT.into(), owner: "someone_else".into(), raw_amount: 1_000_000, decimals: 6 }],
            vec![],
        );
        assert!(reconstruct_trade("sig", 1, Aggregator::A, "user1", &meta).is_none());
    }
}
