/// Exit Manager (C12, spec.md §4.12). Background interval loop evaluating
/// take-profit ladder, stop-loss, time-limit, and trailing-stop rules,
/// modeled on the teacher's `positions/price_updater.rs`/`strategy/exit.rs`
/// interval-loop shape.
use crate::core::ledger::PositionLedger;
use crate::core::prebuilt::sign_built_transaction;
use crate::core::prebuilt::SwapBuildApi;
use crate::core::quote_cache::{QuoteApi, QuoteCache};
use crate::core::submitter::{BundleRelay, RaceSubmitter, RpcTransport};
use crate::core::types::QuoteMode;
use crate::errors::EngineError;
use crate::events::{EngineEvent, EventBus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use solana_sdk::signature::Keypair;
use solana_sdk::signature::Signer;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

#[derive(Debug, Clone)]
pub struct TakeProfitTarget {
    pub profit_pct: f64,
    pub sell_pct: f64,
}

#[derive(Debug, Clone)]
pub struct ExitConfig {
    pub enabled: bool,
    pub take_profit_targets: Vec<TakeProfitTarget>,
    pub stop_loss_pct: f64,
    pub max_hold_hours: f64,
    pub trailing_stop_pct: Option<f64>,
    pub trailing_activation_pct: Option<f64>,
    pub check_interval_seconds: u64,
}

#[async_trait]
pub trait PriceApi: Send + Sync {
    /// Batch-fetches prices in one request; missing mints are simply
    /// absent from the returned map.
    async fn fetch_prices(&self, mints: &[String]) -> Result<HashMap<String, f64>, EngineError>;
}

#[derive(Debug, Clone, Default)]
struct MintExitState {
    tp_hit_set: HashSet<u64>,
    high_water_mark: f64,
}

fn pct_bits(pct: f64) -> u64 {
    pct.to_bits()
}

pub struct ExitManager<P: PriceApi, Q: QuoteApi, B: SwapBuildApi, R: RpcTransport, RL: BundleRelay> {
    config: ExitConfig,
    ledger: Arc<PositionLedger>,
    price_api: Arc<P>,
    quotes: Arc<QuoteCache<Q>>,
    build_api: Arc<B>,
    keypair: Arc<Keypair>,
    priority_fee_microlamports: u64,
    submitter: Arc<RaceSubmitter<R, RL>>,
    events: EventBus,
    usdc_mint: String,
    state: Mutex<HashMap<String, MintExitState>>,
}

impl<P: PriceApi, Q: QuoteApi, B: SwapBuildApi, R: RpcTransport, RL: BundleRelay> ExitManager<P, Q, B, R, RL> {
    pub fn new(
        config: ExitConfig,
        ledger: Arc<PositionLedger>,
        price_api: Arc<P>,
        quotes: Arc<QuoteCache<Q>>,
        build_api: Arc<B>,
        keypair: Arc<Keypair>,
        priority_fee_microlamports: u64,
        submitter: Arc<RaceSubmitter<R, RL>>,
        events: EventBus,
        usdc_mint: String,
    ) -> Self {
        Self {
            config,
            ledger,
            price_api,
            quotes,
            build_api,
            keypair,
            priority_fee_microlamports,
            submitter,
            events,
            usdc_mint,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the interval loop until `shutdown` fires. Exits do not block
    /// the ingestion/detection pipeline, which runs on its own tasks.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        if !self.config.enabled {
            return;
        }
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.check_interval_seconds));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) {
        let positions = self.ledger.snapshot().await;
        if positions.is_empty() {
            return;
        }
        let mints: Vec<String> = positions.iter().map(|p| p.token_mint.clone()).collect();
        let prices = match self.price_api.fetch_prices(&mints).await {
            Ok(p) => p,
            Err(_) => return,
        };

        for position in positions {
            let Some(&price) = prices.get(&position.token_mint) else { continue };
            if position.avg_entry_price_usdc <= 0.0 {
                continue;
            }
            let profit_pct = (price / position.avg_entry_price_usdc - 1.0) * 100.0;

            let mut state_guard = self.state.lock().await;
            let state = state_guard.entry(position.token_mint.clone()).or_default();
            if price > state.high_water_mark {
                state.high_water_mark = price;
            }
            let high_water_mark = state.high_water_mark;

            if let Some(target) = self.config.take_profit_targets.iter().find(|t| {
                profit_pct >= t.profit_pct && !state.tp_hit_set.contains(&pct_bits(t.profit_pct))
            }) {
                state.tp_hit_set.insert(pct_bits(target.profit_pct));
                let sell_pct = target.sell_pct;
                drop(state_guard);
                self.trigger_exit(&position.token_mint, "take_profit", sell_pct, position.amount_raw).await;
                continue;
            }

            if profit_pct <= self.config.stop_loss_pct {
                drop(state_guard);
                self.trigger_exit(&position.token_mint, "stop_loss", 100.0, position.amount_raw).await;
                continue;
            }

            let held_hours = (now - position.entry_time).num_seconds() as f64 / 3600.0;
            if held_hours >= self.config.max_hold_hours {
                drop(state_guard);
                self.trigger_exit(&position.token_mint, "max_hold", 100.0, position.amount_raw).await;
                continue;
            }

            if let (Some(activation), Some(trailing_pct)) =
                (self.config.trailing_activation_pct, self.config.trailing_stop_pct)
            {
                if profit_pct >= activation && high_water_mark > 0.0 {
                    let drawdown_pct = (high_water_mark - price) / high_water_mark * 100.0;
                    if drawdown_pct >= trailing_pct {
                        drop(state_guard);
                        self.trigger_exit(&position.token_mint, "trailing_stop", 100.0, position.amount_raw).await;
                        continue;
                    }
                }
            }
        }
    }

    async fn trigger_exit(&self, token_mint: &str, rule: &str, sell_pct: f64, amount_raw: u128) {
        self.events.publish(EngineEvent::ExitTriggered { token_mint: token_mint.to_string(), rule: rule.to_string() });

        let sell_amount_raw = (amount_raw as f64 * sell_pct / 100.0).round() as u128;
        match self.execute_sell(token_mint, sell_amount_raw).await {
            Ok(signature) => {
                self.events.publish(EngineEvent::ExitExecuted { token_mint: token_mint.to_string(), signature });
            }
            Err(e) => {
                self.events.publish(EngineEvent::ExitFailed { token_mint: token_mint.to_string(), error: e.to_string() });
            }
        }
    }

    async fn execute_sell(&self, token_mint: &str, sell_amount_raw: u128) -> Result<String, EngineError> {
        let quote = self.quotes.get_with_cache(token_mint, &self.usdc_mint, sell_amount_raw, QuoteMode::ExactIn).await?;
        let unsigned_bytes = self
            .build_api
            .build_swap(&quote, &self.keypair.pubkey().to_string(), self.priority_fee_microlamports)
            .await?;
        let (signed_bytes, signature) = sign_built_transaction(&unsigned_bytes, &self.keypair)?;
        let sent_signature = self.submitter.submit(&signed_bytes, &signature).await?;
        self.ledger
            .record_sell(token_mint, sell_amount_raw, crate::core::types::Usdc6::from_raw(quote.out_amount_raw as i64), sent_signature.clone())
            .await;
        Ok(sent_signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pct_bits_distinguishes_distinct_targets() {
        assert_ne!(pct_bits(50.0), pct_bits(100.0));
        assert_eq!(pct_bits(50.0), pct_bits(50.0));
    }

    #[test]
    fn take_profit_ladder_picks_first_untouched_target_at_or_below_profit() {
        let targets = [
            TakeProfitTarget { profit_pct: 50.0, sell_pct: 25.0 },
            TakeProfitTarget { profit_pct: 100.0, sell_pct: 50.0 },
        ];
        let mut hit = HashSet::new();
        let profit_pct = 120.0;
        let found = targets.iter().find(|t| profit_pct >= t.profit_pct && !hit.contains(&pct_bits(t.profit_pct)));
        assert_eq!(found.unwrap().profit_pct, 50.0);
        hit.insert(pct_bits(50.0));
        let found2 = targets.iter().find(|t| profit_pct >= t.profit_pct && !hit.contains(&pct_bits(t.profit_pct)));
        assert_eq!(found2.unwrap().profit_pct, 100.0);
    }
}
