/// Race Submitter (C8, spec.md §4.8). Dispatches a signed transaction to
/// two transports concurrently and returns on the first success, in the
/// shape of the teacher's `SwapExecutor::execute_transaction` hand-off
/// (`pools/swap/programs/raydium_cpmm.rs`) generalized to a dual path.
use crate::errors::{EngineError, SubmissionError};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const RELAY_RETRY_BACKOFFS: [Duration; 3] =
    [Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)];
const TIP_LAMPORTS_DEFAULT: u64 = 1_000_000;

#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn send_transaction(&self, signed_tx_bytes: &[u8]) -> Result<String, EngineError>;
    async fn get_latest_blockhash(&self) -> Result<String, EngineError>;
}

#[async_trait]
pub trait BundleRelay: Send + Sync {
    async fn get_tip_accounts(&self) -> Result<Vec<String>, EngineError>;
    async fn send_bundle(&self, transactions: Vec<Vec<u8>>) -> Result<String, EngineError>;
}

pub struct RaceSubmitter<R: RpcTransport, B: BundleRelay> {
    rpc: Arc<R>,
    relay: Arc<B>,
    relay_enabled: AtomicBool,
    tip_lamports: u64,
    tip_payer: Arc<Keypair>,
}

impl<R: RpcTransport, B: BundleRelay> RaceSubmitter<R, B> {
    pub fn new(
        rpc: Arc<R>,
        relay: Arc<B>,
        use_bundle_relay: bool,
        tip_lamports: u64,
        tip_payer: Arc<Keypair>,
    ) -> Self {
        Self {
            rpc,
            relay,
            relay_enabled: AtomicBool::new(use_bundle_relay),
            tip_lamports: if tip_lamports == 0 { TIP_LAMPORTS_DEFAULT } else { tip_lamports },
            tip_payer,
        }
    }

    /// Initializes the relay path with retried backoff; permanently
    /// degrades to RPC-only if all attempts fail.
    pub async fn init_relay(&self) {
        if !self.relay_enabled.load(Ordering::SeqCst) {
            return;
        }
        for backoff in RELAY_RETRY_BACKOFFS {
            if self.relay.get_tip_accounts().await.is_ok() {
                return;
            }
            tokio::time::sleep(backoff).await;
        }
        self.relay_enabled.store(false, Ordering::SeqCst);
    }

    /// Returns the transaction's own signature as soon as either transport
    /// succeeds; awaits both before returning so outcomes are logged, but
    /// never blocks the caller on the slower path once one has won.
    pub async fn submit(&self, signed_tx_bytes: &[u8], signature: &str) -> Result<String, EngineError> {
        let rpc_fut = self.rpc.send_transaction(signed_tx_bytes);

        if !self.relay_enabled.load(Ordering::SeqCst) {
            return rpc_fut.await.map(|_| signature.to_string());
        }

        let relay_fut = self.send_via_relay(signed_tx_bytes);

        tokio::pin!(rpc_fut);
        tokio::pin!(relay_fut);

        let mut rpc_result: Option<Result<String, EngineError>> = None;
        let mut relay_result: Option<Result<String, EngineError>> = None;

        loop {
            tokio::select! {
                r = &mut rpc_fut, if rpc_result.is_none() => {
                    if r.is_ok() {
                        return Ok(signature.to_string());
                    }
                    rpc_result = Some(r);
                }
                r = &mut relay_fut, if relay_result.is_none() => {
                    if r.is_ok() {
                        return Ok(signature.to_string());
                    }
                    relay_result = Some(r);
                }
            }
            if rpc_result.is_some() && relay_result.is_some() {
                break;
            }
        }

        let rpc_err = rpc_result.unwrap().unwrap_err();
        let relay_err = relay_result.unwrap().err().map(|e| e.to_string());
        Err(EngineError::Submission(SubmissionError::BothTransportsFailed {
            rpc_error: rpc_err.to_string(),
            relay_error: relay_err,
        }))
    }

    async fn send_via_relay(&self, signed_tx_bytes: &[u8]) -> Result<String, EngineError> {
        let tip_accounts = self.relay.get_tip_accounts().await?;
        let tip_account = tip_accounts
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| EngineError::BundleRelayUnavailable("no tip accounts available".into()))?;
        let tip_tx_bytes = self.build_tip_transfer(tip_account).await?;
        self.relay.send_bundle(vec![tip_tx_bytes, signed_tx_bytes.to_vec()]).await
    }

    async fn build_tip_transfer(&self, tip_account: &str) -> Result<Vec<u8>, EngineError> {
        let tip_pubkey = Pubkey::from_str(tip_account)
            .map_err(|e| EngineError::BundleRelayUnavailable(format!("bad tip account {}: {}", tip_account, e)))?;
        let blockhash_str = self.rpc.get_latest_blockhash().await?;
        let blockhash = Hash::from_str(&blockhash_str)
            .map_err(|e| EngineError::BundleRelayUnavailable(format!("bad blockhash: {}", e)))?;
        let ix = system_instruction::transfer(&self.tip_payer.pubkey(), &tip_pubkey, self.tip_lamports);
        let tx = Transaction::new_signed_with_payer(
            &[ix],
            Some(&self.tip_payer.pubkey()),
            &[self.tip_payer.as_ref()],
            blockhash,
        );
        bincode::serialize(&tx).map_err(|e| EngineError::BundleRelayUnavailable(format!("failed to serialize tip tx: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OkRpc;
    #[async_trait]
    impl RpcTransport for OkRpc {
        async fn send_transaction(&self, _bytes: &[u8]) -> Result<String, EngineError> {
            Ok("rpc-sig".into())
        }
        async fn get_latest_blockhash(&self) -> Result<String, EngineError> {
            Ok(Hash::default().to_string())
        }
    }

    struct FailRpc;
    #[async_trait]
    impl RpcTransport for FailRpc {
        async fn send_transaction(&self, _bytes: &[u8]) -> Result<String, EngineError> {
            Err(EngineError::Submission(SubmissionError::Generic("rpc down".into())))
        }
        async fn get_latest_blockhash(&self) -> Result<String, EngineError> {
            Ok(Hash::default().to_string())
        }
    }

    struct FailRelay;
    #[async_trait]
    impl BundleRelay for FailRelay {
        async fn get_tip_accounts(&self) -> Result<Vec<String>, EngineError> {
            Err(EngineError::BundleRelayUnavailable("down".into()))
        }
        async fn send_bundle(&self, _txs: Vec<Vec<u8>>) -> Result<String, EngineError> {
            Err(EngineError::BundleRelayUnavailable("down".into()))
        }
    }

    struct OkRelay;
    #[async_trait]
    impl BundleRelay for OkRelay {
        async fn get_tip_accounts(&self) -> Result<Vec<String>, EngineError> {
            Ok(vec![Pubkey::new_unique().to_string()])
        }
        async fn send_bundle(&self, _txs: Vec<Vec<u8>>) -> Result<String, EngineError> {
            Ok("bundle-id".into())
        }
    }

    fn test_tip_payer() -> Arc<Keypair> {
        Arc::new(Keypair::new())
    }

    #[tokio::test]
    async fn returns_on_first_rpc_success_with_relay_disabled() {
        let submitter =
            RaceSubmitter::new(Arc::new(OkRpc), Arc::new(FailRelay), false, 1_000_000, test_tip_payer());
        let result = submitter.submit(&[1, 2, 3], "sig-123").await.unwrap();
        assert_eq!(result, "sig-123");
    }

    #[tokio::test]
    async fn fails_with_both_transport_errors_when_both_fail() {
        let submitter =
            RaceSubmitter::new(Arc::new(FailRpc), Arc::new(FailRelay), true, 1_000_000, test_tip_payer());
        let result = submitter.submit(&[1, 2, 3], "sig-123").await;
        assert!(matches!(result, Err(EngineError::Submission(SubmissionError::BothTransportsFailed { .. }))));
    }

    #[tokio::test]
    async fn succeeds_via_relay_when_rpc_fails() {
        let submitter =
            RaceSubmitter::new(Arc::new(FailRpc), Arc::new(OkRelay), true, 1_000_000, test_tip_payer());
        let result = submitter.submit(&[1, 2, 3], "sig-123").await.unwrap();
        assert_eq!(result, "sig-123");
    }
}
