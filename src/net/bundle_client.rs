/// Bundle submission relay (spec.md §6.6). The teacher's stack has no gRPC
/// client dependency; rather than pull in a full gRPC/protobuf toolchain for
/// a single searcher call, this speaks the same two operations
/// (`getTipAccounts`, `sendBundle`) over the relay's JSON-RPC-style HTTP
/// surface, consistent with how every other external API in this crate is
/// reached (see DESIGN.md).
use crate::core::submitter::BundleRelay;
use crate::errors::EngineError;
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;

const TIMEOUT_SECS: u64 = 2;

pub struct BundleRelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl BundleRelayClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .expect("reqwest client builds with static configuration");
        Self { http, base_url }
    }
}

#[async_trait]
impl BundleRelay for BundleRelayClient {
    async fn get_tip_accounts(&self) -> Result<Vec<String>, EngineError> {
        let response = self
            .http
            .post(format!("{}/api/v1/bundles", self.base_url))
            .json(&serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "getTipAccounts", "params": [] }))
            .send()
            .await
            .map_err(|e| EngineError::BundleRelayUnavailable(e.to_string()))?;
        let body: serde_json::Value =
            response.json().await.map_err(|e| EngineError::BundleRelayUnavailable(e.to_string()))?;
        body.get("result")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .ok_or_else(|| EngineError::BundleRelayUnavailable("missing tip accounts in response".into()))
    }

    async fn send_bundle(&self, transactions: Vec<Vec<u8>>) -> Result<String, EngineError> {
        let encoded: Vec<String> =
            transactions.iter().map(|tx| base64::engine::general_purpose::STANDARD.encode(tx)).collect();
        let response = self
            .http
            .post(format!("{}/api/v1/bundles", self.base_url))
            .json(&serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "sendBundle", "params": [encoded] }))
            .send()
            .await
            .map_err(|e| EngineError::BundleRelayUnavailable(e.to_string()))?;
        let body: serde_json::Value =
            response.json().await.map_err(|e| EngineError::BundleRelayUnavailable(e.to_string()))?;
        body.get("result")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| EngineError::BundleRelayUnavailable("missing bundle id in response".into()))
    }
}
