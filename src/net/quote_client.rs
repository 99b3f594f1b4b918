/// Quote & swap-build API client (spec.md §6.3), modeled on the teacher's
/// `apis/jupiter/mod.rs` (`JupiterClient::new`, fixed request timeout,
/// bearer API key header).
use crate::core::prebuilt::SwapBuildApi;
use crate::core::quote_cache::QuoteApi;
use crate::core::types::{Quote, QuoteMode};
use crate::errors::EngineError;
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

const TIMEOUT_SECS: u64 = 2;

pub struct QuoteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QuoteClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .expect("reqwest client builds with static configuration");
        Self { http, base_url, api_key }
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    /// Warm-up routine: a lightweight request to each of the quote-build
    /// API's surfaces at startup (spec.md §6.3).
    pub async fn warm_up(&self) {
        let _ = self.with_auth(self.http.get(format!("{}/tokens", self.base_url))).send().await;
        let _ = self
            .with_auth(self.http.get(format!("{}/quote", self.base_url)))
            .query(&[("inputMint", "So11111111111111111111111111111111111111112")])
            .send()
            .await;
    }
}

#[derive(Deserialize)]
struct RawQuoteResponse {
    #[serde(rename = "inAmount")]
    in_amount: String,
    #[serde(rename = "outAmount")]
    out_amount: String,
    #[serde(rename = "otherAmountThreshold")]
    other_amount_threshold: String,
    #[serde(rename = "priceImpactPct")]
    price_impact_pct: String,
}

#[derive(Deserialize)]
struct RawSwapResponse {
    #[serde(rename = "swapTransaction")]
    swap_transaction: String,
}

#[async_trait]
impl QuoteApi for QuoteClient {
    async fn get_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_raw: u128,
        slippage_bps: u16,
        mode: QuoteMode,
    ) -> Result<Quote, EngineError> {
        let swap_mode = match mode {
            QuoteMode::ExactIn => "ExactIn",
            QuoteMode::ExactOut => "ExactOut",
        };
        let response = self
            .with_auth(self.http.get(format!("{}/quote", self.base_url)))
            .query(&[
                ("inputMint", input_mint),
                ("outputMint", output_mint),
                ("amount", &amount_raw.to_string()),
                ("slippageBps", &slippage_bps.to_string()),
                ("swapMode", swap_mode),
            ])
            .send()
            .await?;

        let raw: RawQuoteResponse = response.json().await?;
        Ok(Quote {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            in_amount_raw: raw.in_amount.parse().map_err(|_| EngineError::Quote("malformed inAmount".into()))?,
            out_amount_raw: raw.out_amount.parse().map_err(|_| EngineError::Quote("malformed outAmount".into()))?,
            other_amount_threshold: raw
                .other_amount_threshold
                .parse()
                .map_err(|_| EngineError::Quote("malformed otherAmountThreshold".into()))?,
            price_impact_pct: raw.price_impact_pct.parse().unwrap_or(0.0),
            mode,
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl SwapBuildApi for QuoteClient {
    async fn build_swap(
        &self,
        quote: &Quote,
        user_public_key: &str,
        priority_fee_microlamports: u64,
    ) -> Result<Vec<u8>, EngineError> {
        let body = serde_json::json!({
            "quoteResponse": {
                "inputMint": quote.input_mint,
                "outputMint": quote.output_mint,
                "inAmount": quote.in_amount_raw.to_string(),
                "outAmount": quote.out_amount_raw.to_string(),
                "otherAmountThreshold": quote.other_amount_threshold.to_string(),
                "priceImpactPct": quote.price_impact_pct.to_string(),
            },
            "userPublicKey": user_public_key,
            "wrapAndUnwrapSol": true,
            "computeUnitPriceMicroLamports": priority_fee_microlamports,
            "dynamicComputeUnitLimit": true,
        });

        let response = self.with_auth(self.http.post(format!("{}/swap", self.base_url))).json(&body).send().await?;
        let raw: RawSwapResponse = response.json().await?;
        base64::engine::general_purpose::STANDARD
            .decode(raw.swap_transaction)
            .map_err(|e| EngineError::Build(format!("malformed base64 swapTransaction: {}", e)))
    }
}
