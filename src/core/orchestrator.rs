/// Copy Orchestrator (C11, spec.md §4.11). Fail-fast filter chain, then
/// hand-off to C7/C8/C9, generalizing the teacher's
/// `positions/operations.rs` lock -> recheck -> act -> release sequence.
use crate::core::ledger::{LedgerDecision, PositionLedger};
use crate::core::prebuilt::{sign_built_transaction, PreBuiltCache, SwapBuildApi};
use crate::core::quality::{MetadataApi, QualityFilter};
use crate::core::quote_cache::{QuoteApi, QuoteCache};
use crate::core::submitter::{BundleRelay, RaceSubmitter, RpcTransport};
use crate::core::types::{DetectedTrade, Direction, QuoteMode, Usdc6};
use crate::errors::EngineError;
use crate::events::{EngineEvent, EventBus};
use chrono::Utc;
use solana_sdk::signature::{Keypair, Signer};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct OrchestratorConfig {
    pub copy_buys_only: bool,
    pub allowed_tokens: Vec<String>,
    pub min_trade_usdc: f64,
    pub usdc_mint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Sent { copy_signature: String },
    Filtered(String),
    Dedup,
    Failed(String),
}

pub struct CopyOrchestrator<Q: QuoteApi + 'static, B: SwapBuildApi + 'static, M: MetadataApi, R: RpcTransport, RL: BundleRelay> {
    config: OrchestratorConfig,
    quotes: Arc<QuoteCache<Q>>,
    prebuilt: Arc<PreBuiltCache<Q, B>>,
    build_api: Arc<B>,
    keypair: Arc<Keypair>,
    priority_fee_microlamports: u64,
    quality: Arc<QualityFilter<M>>,
    ledger: Arc<PositionLedger>,
    submitter: Arc<RaceSubmitter<R, RL>>,
    events: EventBus,
    in_flight: Mutex<HashSet<String>>,
}

impl<Q: QuoteApi + 'static, B: SwapBuildApi + 'static, M: MetadataApi, R: RpcTransport, RL: BundleRelay>
    CopyOrchestrator<Q, B, M, R, RL>
{
    pub fn new(
        config: OrchestratorConfig,
        quotes: Arc<QuoteCache<Q>>,
        prebuilt: Arc<PreBuiltCache<Q, B>>,
        build_api: Arc<B>,
        keypair: Arc<Keypair>,
        priority_fee_microlamports: u64,
        quality: Arc<QualityFilter<M>>,
        ledger: Arc<PositionLedger>,
        submitter: Arc<RaceSubmitter<R, RL>>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            quotes,
            prebuilt,
            build_api,
            keypair,
            priority_fee_microlamports,
            quality,
            ledger,
            submitter,
            events,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn handle_trade(&self, trade: DetectedTrade, copy_amount_usdc: f64, current_usdc_balance: f64) -> CopyOutcome {
        if self.config.copy_buys_only && trade.direction == Direction::Sell {
            return self.skip(&trade, "copy_buys_only: direction is sell").await;
        }
        if !self.config.allowed_tokens.is_empty() && !self.config.allowed_tokens.contains(&trade.token_mint) {
            return self.skip(&trade, "token not in allowlist").await;
        }
        if trade.usdc_amount.to_ui_f64() < self.config.min_trade_usdc {
            return self.skip(&trade, "trade below minimum size").await;
        }

        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.contains(&trade.signature) {
                return CopyOutcome::Dedup;
            }
            in_flight.insert(trade.signature.clone());
        }

        let outcome = self.process(&trade, copy_amount_usdc, current_usdc_balance).await;
        self.in_flight.lock().await.remove(&trade.signature);
        outcome
    }

    async fn skip(&self, trade: &DetectedTrade, reason: &str) -> CopyOutcome {
        self.events.publish(EngineEvent::CopySkipped { trade: trade.clone(), reason: reason.to_string(), details: None });
        CopyOutcome::Filtered(reason.to_string())
    }

    async fn process(&self, trade: &DetectedTrade, copy_amount_usdc: f64, current_usdc_balance: f64) -> CopyOutcome {
        let quality_decision = self.quality.should_copy(&trade.token_mint, copy_amount_usdc).await;
        if !quality_decision.is_allow() {
            return self.skip(trade, "quality filter rejected").await;
        }

        let risk_decision = self.ledger.can_trade(&trade.token_mint, trade.direction, copy_amount_usdc, current_usdc_balance).await;
        if let LedgerDecision::Reject(reason) = risk_decision {
            return self.skip(trade, &format!("risk check rejected: {}", reason)).await;
        }

        self.events.publish(EngineEvent::CopyInitiated { trade: trade.clone() });
        let t_start = Utc::now();

        let send_result = match trade.direction {
            Direction::Buy => self.send_buy(trade, copy_amount_usdc).await,
            Direction::Sell => self.send_sell(trade, copy_amount_usdc).await,
        };

        match send_result {
            Ok((copy_signature, out_or_in_amount_raw, usdc_amount, decimals)) => {
                match trade.direction {
                    Direction::Buy => {
                        self.ledger
                            .record_buy(&trade.token_mint, out_or_in_amount_raw, usdc_amount, copy_signature.clone(), decimals)
                            .await;
                    }
                    Direction::Sell => {
                        self.ledger.record_sell(&trade.token_mint, out_or_in_amount_raw, usdc_amount, copy_signature.clone()).await;
                    }
                }

                let now = Utc::now();
                let copy_latency_ms = (now - t_start).num_milliseconds();
                let e2e_latency_ms = (now - trade.detected_at).num_milliseconds();
                self.events.publish(EngineEvent::CopyComplete {
                    original: trade.signature.clone(),
                    copy_signature: copy_signature.clone(),
                    copy_latency_ms,
                    e2e_latency_ms,
                });
                CopyOutcome::Sent { copy_signature }
            }
            Err(e) => {
                self.events.publish(EngineEvent::CopyFailed { trade: trade.clone(), error: e.to_string() });
                CopyOutcome::Failed(e.to_string())
            }
        }
    }

    /// After a successful `take()` the slot for this mint is empty; spec.md
    /// §4.11 has the orchestrator kick off a background rebuild rather than
    /// block the caller on it. Fire-and-forget: failures surface on the
    /// next `take()` miss, same as any other refresh failure.
    fn schedule_prebuilt_rebuild(&self, token_mint: String, amount_raw: u128) {
        let prebuilt = self.prebuilt.clone();
        let usdc_mint = self.config.usdc_mint.clone();
        tokio::spawn(async move {
            let _ = prebuilt.refresh(&token_mint, &usdc_mint, amount_raw).await;
        });
    }

    async fn send_buy(&self, trade: &DetectedTrade, copy_amount_usdc: f64) -> Result<(String, u128, Usdc6, u8), EngineError> {
        let amount_raw = (copy_amount_usdc * 1_000_000.0).round() as u128;

        if let Some(prebuilt) = self.prebuilt.take(&trade.token_mint).await {
            let signature = self.submitter.submit(&prebuilt.signed_tx_bytes, &prebuilt.signature).await?;
            let out_amount_raw = prebuilt.quote_snapshot.out_amount_raw;
            self.schedule_prebuilt_rebuild(trade.token_mint.clone(), amount_raw);
            return Ok((signature, out_amount_raw, Usdc6::from_raw(amount_raw as i64), trade.token_decimals));
        }

        let quote = self
            .quotes
            .get_with_cache(&self.config.usdc_mint, &trade.token_mint, amount_raw, QuoteMode::ExactIn)
            .await?;
        self.prebuilt
            .refresh(&trade.token_mint, &self.config.usdc_mint, amount_raw)
            .await
            .ok();
        let rebuilt = self.prebuilt.take(&trade.token_mint).await;
        let (signed_bytes, signature) = match rebuilt {
            Some(pre) => (pre.signed_tx_bytes, pre.signature),
            None => return Err(EngineError::Build("no pre-built transaction available for buy".into())),
        };
        let sent_signature = self.submitter.submit(&signed_bytes, &signature).await?;
        Ok((sent_signature, quote.out_amount_raw, Usdc6::from_raw(amount_raw as i64), trade.token_decimals))
    }

    async fn send_sell(&self, trade: &DetectedTrade, copy_amount_usdc: f64) -> Result<(String, u128, Usdc6, u8), EngineError> {
        let amount_usdc_raw = (copy_amount_usdc * 1_000_000.0).round() as u128;
        let quote = self
            .quotes
            .get_with_cache(&trade.token_mint, &self.config.usdc_mint, amount_usdc_raw, QuoteMode::ExactOut)
            .await?;
        let unsigned_bytes = self
            .build_api
            .build_swap(&quote, &self.keypair.pubkey().to_string(), self.priority_fee_microlamports)
            .await?;
        let (signed_bytes, signature) = sign_built_transaction(&unsigned_bytes, &self.keypair)?;
        let sent_signature = self.submitter.submit(&signed_bytes, &signature).await?;
        Ok((sent_signature, quote.in_amount_raw, Usdc6::from_raw(amount_usdc_raw as i64), 6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::submitter::{BundleRelay, RpcTransport};
    use crate::core::types::{Aggregator, QuoteMode, TokenMetadata};
    use async_trait::async_trait;
    use solana_sdk::hash::Hash;
    use solana_sdk::message::{v0, VersionedMessage};
    use solana_sdk::transaction::VersionedTransaction;
    use std::collections::HashSet as StdHashSet;

    struct StubQuoteApi;
    #[async_trait]
    impl QuoteApi for StubQuoteApi {
        async fn get_quote(
            &self,
            input_mint: &str,
            output_mint: &str,
            amount_raw: u128,
            _slippage_bps: u16,
            mode: QuoteMode,
        ) -> Result<crate::core::types::Quote, EngineError> {
            Ok(crate::core::types::Quote {
                input_mint: input_mint.into(),
                output_mint: output_mint.into(),
                in_amount_raw: amount_raw,
                out_amount_raw: amount_raw,
                other_amount_threshold: amount_raw,
                price_impact_pct: 0.1,
                mode,
                fetched_at: Utc::now(),
            })
        }
    }

    struct StubBuildApi;
    #[async_trait]
    impl SwapBuildApi for StubBuildApi {
        async fn build_swap(
            &self,
            _quote: &crate::core::types::Quote,
            _user_public_key: &str,
            _priority_fee_microlamports: u64,
        ) -> Result<Vec<u8>, EngineError> {
            let message = v0::Message {
                header: Default::default(),
                account_keys: vec![Keypair::new().pubkey()],
                recent_blockhash: Hash::default(),
                instructions: vec![],
                address_table_lookups: vec![],
            };
            let tx = VersionedTransaction {
                signatures: vec![solana_sdk::signature::Signature::default()],
                message: VersionedMessage::V0(message),
            };
            bincode::serialize(&tx).map_err(|e| EngineError::Build(e.to_string()))
        }
    }

    struct StubMetadataApi;
    #[async_trait]
    impl MetadataApi for StubMetadataApi {
        async fn fetch_metadata(&self, mint: &str) -> Result<TokenMetadata, EngineError> {
            Ok(TokenMetadata {
                mint: mint.into(),
                liquidity_usdc: 100_000.0,
                volume_24h_usdc: 20_000.0,
                token_age_seconds: 7200,
                price_history: vec![],
                last_updated: Utc::now(),
            })
        }
    }

    struct StubRpc;
    #[async_trait]
    impl RpcTransport for StubRpc {
        async fn send_transaction(&self, _bytes: &[u8]) -> Result<String, EngineError> {
            Ok("rpc-sig".into())
        }
        async fn get_latest_blockhash(&self) -> Result<String, EngineError> {
            Ok(solana_sdk::hash::Hash::default().to_string())
        }
    }

    struct StubRelay;
    #[async_trait]
    impl BundleRelay for StubRelay {
        async fn get_tip_accounts(&self) -> Result<Vec<String>, EngineError> {
            Err(EngineError::BundleRelayUnavailable("disabled".into()))
        }
        async fn send_bundle(&self, _txs: Vec<Vec<u8>>) -> Result<String, EngineError> {
            Err(EngineError::BundleRelayUnavailable("disabled".into()))
        }
    }

    fn sample_trade(direction: Direction, usdc_amount: Usdc6) -> DetectedTrade {
        DetectedTrade {
            signature: "orig-sig".into(),
            slot: 1,
            direction,
            token_mint: "TOKEN".into(),
            usdc_amount,
            token_amount_raw: 500_000,
            token_decimals: 6,
            user: "user1".into(),
            aggregator: Aggregator::A,
            detected_at: Utc::now(),
        }
    }

    fn build_orchestrator() -> CopyOrchestrator<StubQuoteApi, StubBuildApi, StubMetadataApi, StubRpc, StubRelay> {
        let quotes = Arc::new(QuoteCache::new(Arc::new(StubQuoteApi), 100));
        let build_api = Arc::new(StubBuildApi);
        let keypair = Arc::new(Keypair::new());
        let prebuilt = Arc::new(PreBuiltCache::new(quotes.clone(), build_api.clone(), keypair.clone(), 200_000));
        let quality = Arc::new(QualityFilter::new(
            Arc::new(StubMetadataApi),
            crate::core::types::QualityLimits {
                min_liquidity_usdc: 50_000.0,
                max_price_impact_pct: 2.0,
                min_token_age_seconds: 3600,
                min_24h_volume_usdc: 10_000.0,
                max_recent_pump_pct: 50.0,
                whitelist: StdHashSet::new(),
            },
        ));
        let (events, _rx) = EventBus::new();
        let ledger = Arc::new(PositionLedger::new(
            crate::core::types::RiskLimits {
                max_position_usdc: 50.0,
                max_total_exposure_usdc: 200.0,
                max_open_positions: 10,
                min_usdc_reserve: 10.0,
            },
            events.clone(),
        ));
        let submitter =
            Arc::new(RaceSubmitter::new(Arc::new(StubRpc), Arc::new(StubRelay), false, 1_000_000, keypair.clone()));
        let config = OrchestratorConfig {
            copy_buys_only: false,
            allowed_tokens: vec![],
            min_trade_usdc: 1.0,
            usdc_mint: "USDC_MINT".into(),
        };
        CopyOrchestrator::new(config, quotes, prebuilt, build_api, keypair, 200_000, quality, ledger, submitter, events)
    }

    #[tokio::test]
    async fn rejects_small_trades_before_touching_any_external_system() {
        let orchestrator = build_orchestrator();
        let trade = sample_trade(Direction::Buy, Usdc6::from_raw(500_000));
        let outcome = orchestrator.handle_trade(trade, 0.5, 100.0).await;
        assert!(matches!(outcome, CopyOutcome::Filtered(_)));
    }

    #[tokio::test]
    async fn executes_a_buy_through_the_full_chain() {
        let orchestrator = build_orchestrator();
        let trade = sample_trade(Direction::Buy, Usdc6::from_raw(2_000_000));
        let outcome = orchestrator.handle_trade(trade, 2.0, 100.0).await;
        assert!(matches!(outcome, CopyOutcome::Sent { .. }), "expected Sent, got {:?}", outcome);
    }

    #[tokio::test]
    async fn copy_buys_only_filters_out_sells() {
        let mut orchestrator = build_orchestrator();
        orchestrator.config.copy_buys_only = true;
        let trade = sample_trade(Direction::Sell, Usdc6::from_raw(2_000_000));
        let outcome = orchestrator.handle_trade(trade, 2.0, 100.0).await;
        assert!(matches!(outcome, CopyOutcome::Filtered(_)));
    }
}
