/// Chain RPC provider (spec.md §6.2), grounded in the teacher's `rpc.rs`
/// (`RpcRateLimiter`, `TransactionDetails`/`TransactionData`/`TransactionMeta`
/// shape) — a plain JSON-RPC client over `reqwest`, not the full
/// `solana-client` RPC client, matching the teacher's own hand-rolled calls.
use crate::core::lookup_table::LookupTableProvider;
use crate::core::submitter::RpcTransport;
use crate::core::types::{ExecutedTxMeta, TokenBalanceEntry};
use crate::errors::{EngineError, RpcError};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(2);
const POOL_MAX_IDLE_PER_HOST: usize = 10;
const LOOKUP_TABLE_HEADER_BYTES: usize = 56;

pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RpcClient {
    pub fn new(endpoint: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build()
            .expect("reqwest client builds with static configuration");
        Self { http, endpoint }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, EngineError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Rpc(RpcError::Generic(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Rpc(RpcError::HttpStatus { endpoint: self.endpoint.clone(), status: status.as_u16() }));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Rpc(RpcError::MalformedResponse { endpoint: self.endpoint.clone(), detail: e.to_string() }))?;

        if let Some(err) = parsed.get("error") {
            return Err(EngineError::Rpc(RpcError::MalformedResponse {
                endpoint: self.endpoint.clone(),
                detail: err.to_string(),
            }));
        }
        parsed.get("result").cloned().ok_or_else(|| {
            EngineError::Rpc(RpcError::MalformedResponse { endpoint: self.endpoint.clone(), detail: "missing result field".into() })
        })
    }

    pub async fn fetch_executed_tx_meta(&self, signature: &str) -> Result<ExecutedTxMeta, EngineError> {
        let params = json!([
            signature,
            { "maxSupportedTransactionVersion": 0, "commitment": "confirmed", "encoding": "jsonParsed" }
        ]);
        let result = self.call("getParsedTransaction", params).await?;
        let meta = result.get("meta").ok_or_else(|| {
            EngineError::Rpc(RpcError::MalformedResponse { endpoint: self.endpoint.clone(), detail: "missing meta".into() })
        })?;
        Ok(ExecutedTxMeta {
            pre_token_balances: parse_token_balances(meta.get("preTokenBalances")),
            post_token_balances: parse_token_balances(meta.get("postTokenBalances")),
        })
    }

    pub async fn get_latest_blockhash(&self) -> Result<String, EngineError> {
        let result = self.call("getLatestBlockhash", json!([{ "commitment": "confirmed" }])).await?;
        result
            .get("value")
            .and_then(|v| v.get("blockhash"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| EngineError::Rpc(RpcError::MalformedResponse { endpoint: self.endpoint.clone(), detail: "missing blockhash".into() }))
    }

    pub async fn confirm_transaction(&self, signature: &str) -> Result<bool, EngineError> {
        let result = self.call("getSignatureStatuses", json!([[signature]])).await?;
        Ok(result
            .get("value")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .map(|status| !status.is_null())
            .unwrap_or(false))
    }
}

fn parse_token_balances(value: Option<&Value>) -> Vec<TokenBalanceEntry> {
    let Some(arr) = value.and_then(|v| v.as_array()) else { return Vec::new() };
    arr.iter()
        .filter_map(|entry| {
            let mint = entry.get("mint")?.as_str()?.to_string();
            let owner = entry.get("owner")?.as_str()?.to_string();
            let ui_amount = entry.get("uiTokenAmount")?;
            let amount_str = ui_amount.get("amount")?.as_str()?;
            let decimals = ui_amount.get("decimals")?.as_u64()? as u8;
            let raw_amount = amount_str.parse::<i128>().ok()?;
            Some(TokenBalanceEntry { mint, owner, raw_amount, decimals })
        })
        .collect()
}

#[async_trait]
impl LookupTableProvider for RpcClient {
    async fn fetch_lookup_table(&self, table: Pubkey) -> Result<Vec<Pubkey>, EngineError> {
        let result = self.call("getAccountInfo", json!([table.to_string(), { "encoding": "base64" }])).await?;
        let data_field = result
            .get("value")
            .and_then(|v| v.get("data"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::LookupResolution(format!("no account data for table {}", table)))?;

        let raw = base64::engine::general_purpose::STANDARD
            .decode(data_field)
            .map_err(|e| EngineError::LookupResolution(format!("bad base64 for table {}: {}", table, e)))?;

        if raw.len() <= LOOKUP_TABLE_HEADER_BYTES {
            return Ok(Vec::new());
        }
        let addresses = &raw[LOOKUP_TABLE_HEADER_BYTES..];
        let mut keys = Vec::with_capacity(addresses.len() / 32);
        for chunk in addresses.chunks_exact(32) {
            let arr: [u8; 32] = chunk.try_into().unwrap();
            keys.push(Pubkey::new_from_array(arr));
        }
        Ok(keys)
    }
}

#[async_trait]
impl RpcTransport for RpcClient {
    async fn send_transaction(&self, signed_tx_bytes: &[u8]) -> Result<String, EngineError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(signed_tx_bytes);
        let params = json!([
            encoded,
            { "skipPreflight": true, "preflightCommitment": "processed", "maxRetries": 2, "encoding": "base64" }
        ]);
        let result = self.call("sendTransaction", params).await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| EngineError::Rpc(RpcError::MalformedResponse { endpoint: self.endpoint.clone(), detail: "sendTransaction did not return a signature".into() }))
    }

    async fn get_latest_blockhash(&self) -> Result<String, EngineError> {
        RpcClient::get_latest_blockhash(self).await
    }
}
