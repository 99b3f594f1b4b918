/// Position Ledger (C9, spec.md §4.9). Per-mint mutex over in-memory
/// positions with weighted-average cost, modeled on the teacher's
/// `positions/types.rs` fields and `positions/operations.rs`'s
/// lock-per-mint, recheck-then-act sequencing.
use crate::core::types::{Direction, Position, RiskLimits, Usdc6};
use crate::events::{EngineEvent, EventBus};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

const WARNING_THRESHOLD_PCT: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerDecision {
    Allow,
    Reject(String),
}

pub struct PositionLedger {
    positions: Mutex<HashMap<String, Position>>,
    limits: RiskLimits,
    events: EventBus,
}

impl PositionLedger {
    pub fn new(limits: RiskLimits, events: EventBus) -> Self {
        Self { positions: Mutex::new(HashMap::new()), limits, events }
    }

    pub async fn can_trade(
        &self,
        token_mint: &str,
        direction: Direction,
        amount_usdc: f64,
        current_usdc_balance: f64,
    ) -> LedgerDecision {
        let positions = self.positions.lock().await;

        match direction {
            Direction::Sell => {
                if !positions.contains_key(token_mint) {
                    return LedgerDecision::Reject("no open position for this mint".into());
                }
                LedgerDecision::Allow
            }
            Direction::Buy => {
                if current_usdc_balance - amount_usdc < self.limits.min_usdc_reserve {
                    return LedgerDecision::Reject("would breach minimum usdc reserve".into());
                }

                let existing_cost =
                    positions.get(token_mint).map(|p| p.total_cost_usdc.to_ui_f64()).unwrap_or(0.0);
                let new_position_cost = existing_cost + amount_usdc;
                if new_position_cost > self.limits.max_position_usdc {
                    return LedgerDecision::Reject("would exceed max position size".into());
                }

                let total_exposure: f64 = positions.values().map(|p| p.total_cost_usdc.to_ui_f64()).sum();
                let new_total_exposure = total_exposure + amount_usdc;
                if new_total_exposure > self.limits.max_total_exposure_usdc {
                    return LedgerDecision::Reject("would exceed max total exposure".into());
                }

                if !positions.contains_key(token_mint) && positions.len() as u32 >= self.limits.max_open_positions {
                    return LedgerDecision::Reject("would exceed max open positions".into());
                }

                self.maybe_warn(new_position_cost, new_total_exposure);
                LedgerDecision::Allow
            }
        }
    }

    fn maybe_warn(&self, new_position_cost: f64, new_total_exposure: f64) {
        let position_pct = new_position_cost / self.limits.max_position_usdc * 100.0;
        if position_pct >= WARNING_THRESHOLD_PCT {
            self.events.publish(EngineEvent::LimitWarning {
                kind: "max_position_usdc".into(),
                current: new_position_cost,
                max: self.limits.max_position_usdc,
                percent: position_pct,
            });
        }
        let exposure_pct = new_total_exposure / self.limits.max_total_exposure_usdc * 100.0;
        if exposure_pct >= WARNING_THRESHOLD_PCT {
            self.events.publish(EngineEvent::LimitWarning {
                kind: "max_total_exposure_usdc".into(),
                current: new_total_exposure,
                max: self.limits.max_total_exposure_usdc,
                percent: exposure_pct,
            });
        }
    }

    pub async fn record_buy(
        &self,
        token_mint: &str,
        token_amount_raw: u128,
        usdc_spent: Usdc6,
        signature: String,
        decimals: u8,
    ) {
        let mut positions = self.positions.lock().await;
        let now = Utc::now();
        let position = positions.entry(token_mint.to_string()).or_insert_with(|| Position {
            token_mint: token_mint.to_string(),
            amount_raw: 0,
            avg_entry_price_usdc: 0.0,
            total_cost_usdc: Usdc6::from_raw(0),
            entry_time: now,
            signatures: Vec::new(),
            buy_count: 0,
            sell_count: 0,
            decimals,
        });

        position.total_cost_usdc =
            position.total_cost_usdc.checked_add(usdc_spent).unwrap_or(position.total_cost_usdc);
        position.amount_raw += token_amount_raw;
        position.avg_entry_price_usdc = ui_price(position.total_cost_usdc, position.amount_raw, position.decimals);
        position.signatures.push(signature);
        position.buy_count += 1;

        self.events.publish(EngineEvent::PositionOpened { position: position.clone() });
    }

    pub async fn record_sell(
        &self,
        token_mint: &str,
        token_amount_raw: u128,
        usdc_received: Usdc6,
        signature: String,
    ) {
        let mut positions = self.positions.lock().await;
        let Some(position) = positions.get_mut(token_mint) else { return };
        if position.amount_raw == 0 {
            return;
        }

        let sell_fraction = token_amount_raw as f64 / position.amount_raw as f64;
        let cost_basis_raw = (position.total_cost_usdc.raw() as f64 * sell_fraction).round() as i64;
        let cost_basis = Usdc6::from_raw(cost_basis_raw);
        let realized_pnl_usdc = (usdc_received.raw() - cost_basis.raw()) as f64 / 1_000_000.0;
        let realized_pnl_pct = if cost_basis.raw() != 0 {
            realized_pnl_usdc / (cost_basis.raw() as f64 / 1_000_000.0) * 100.0
        } else {
            0.0
        };

        position.amount_raw = position.amount_raw.saturating_sub(token_amount_raw);
        position.total_cost_usdc =
            position.total_cost_usdc.checked_sub(cost_basis).unwrap_or(Usdc6::from_raw(0));
        position.signatures.push(signature);
        position.sell_count += 1;

        if position.amount_raw == 0 {
            let closed = positions.remove(token_mint).unwrap();
            self.events.publish(EngineEvent::PositionClosed { position: closed, realized_pnl_usdc, realized_pnl_pct });
        } else {
            self.events.publish(EngineEvent::PositionUpdated { position: position.clone() });
        }
    }

    pub async fn snapshot(&self) -> Vec<Position> {
        self.positions.lock().await.values().cloned().collect()
    }

    pub async fn get(&self, token_mint: &str) -> Option<Position> {
        self.positions.lock().await.get(token_mint).cloned()
    }
}

fn ui_price(total_cost: Usdc6, amount_raw: u128, decimals: u8) -> f64 {
    if amount_raw == 0 {
        return 0.0;
    }
    let cost_ui = total_cost.raw() as f64 / 1_000_000.0;
    let amount_ui = amount_raw as f64 / 10f64.powi(decimals as i32);
    cost_ui / amount_ui
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> RiskLimits {
        RiskLimits { max_position_usdc: 50.0, max_total_exposure_usdc: 200.0, max_open_positions: 10, min_usdc_reserve: 10.0 }
    }

    #[tokio::test]
    async fn buy_then_sell_closes_position() {
        let (events, _rx) = EventBus::new();
        let ledger = PositionLedger::new(limits(), events);

        let decision = ledger.can_trade("MINT", Direction::Buy, 10.0, 100.0).await;
        assert_eq!(decision, LedgerDecision::Allow);

        ledger.record_buy("MINT", 1_000_000, Usdc6::from_raw(10_000_000), "sig1".into(), 6).await;
        let pos = ledger.get("MINT").await.unwrap();
        assert_eq!(pos.amount_raw, 1_000_000);

        ledger.record_sell("MINT", 1_000_000, Usdc6::from_raw(12_000_000), "sig2".into()).await;
        assert!(ledger.get("MINT").await.is_none());
    }

    #[tokio::test]
    async fn rejects_sell_without_position() {
        let (events, _rx) = EventBus::new();
        let ledger = PositionLedger::new(limits(), events);
        let decision = ledger.can_trade("MINT", Direction::Sell, 5.0, 100.0).await;
        assert!(matches!(decision, LedgerDecision::Reject(_)));
    }

    #[tokio::test]
    async fn rejects_buy_that_would_breach_reserve() {
        let (events, _rx) = EventBus::new();
        let ledger = PositionLedger::new(limits(), events);
        let decision = ledger.can_trade("MINT", Direction::Buy, 95.0, 100.0).await;
        assert!(matches!(decision, LedgerDecision::Reject(_)));
    }

    /// Seeded interleaved buy/sell sequences (C9, spec.md §8): regardless of
    /// the order small buys and partial sells arrive in, `amount_raw` and
    /// `total_cost_usdc` never go negative, and a full sell-down always
    /// closes the position.
    #[tokio::test]
    async fn seeded_interleaved_buys_and_sells_keep_invariants() {
        let mut state: u64 = 0x2545F4914F6CDD1D;
        let mut next_u64 = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let (events, _rx) = EventBus::new();
        let ledger = PositionLedger::new(limits(), events);
        let mut held_raw: u128 = 0;

        for i in 0..40 {
            let buy = i % 3 != 2 || held_raw == 0;
            if buy {
                let token_amount_raw = 1 + (next_u64() % 100_000) as u128;
                let usdc_spent = Usdc6::from_raw(1 + (next_u64() % 1_000_000) as i64);
                ledger.record_buy("MINT", token_amount_raw, usdc_spent, format!("buy{}", i), 6).await;
                held_raw += token_amount_raw;
            } else {
                let sell_fraction = 1 + (next_u64() % 100);
                let sell_amount_raw = (held_raw * sell_fraction as u128 / 100).max(1).min(held_raw);
                let usdc_received = Usdc6::from_raw(1 + (next_u64() % 1_000_000) as i64);
                ledger.record_sell("MINT", sell_amount_raw, usdc_received, format!("sell{}", i)).await;
                held_raw -= sell_amount_raw;
            }

            if let Some(pos) = ledger.get("MINT").await {
                assert_eq!(pos.amount_raw, held_raw);
                assert!(pos.total_cost_usdc.raw() >= 0);
            } else {
                assert_eq!(held_raw, 0);
            }
        }
    }
}
