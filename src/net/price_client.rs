/// Price API client (spec.md §6.4), used only by the exit manager (C12).
use crate::core::exit_manager::PriceApi;
use crate::errors::EngineError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

const TIMEOUT_SECS: u64 = 2;

pub struct PriceClient {
    http: reqwest::Client,
    base_url: String,
}

impl PriceClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .expect("reqwest client builds with static configuration");
        Self { http, base_url }
    }
}

#[async_trait]
impl PriceApi for PriceClient {
    async fn fetch_prices(&self, mints: &[String]) -> Result<HashMap<String, f64>, EngineError> {
        if mints.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = mints.join(",");
        let response = self.http.get(format!("{}/price", self.base_url)).query(&[("ids", ids)]).send().await?;
        let body: serde_json::Value = response.json().await?;
        let data = body.get("data").and_then(|v| v.as_object());
        let mut out = HashMap::new();
        if let Some(data) = data {
            for (mint, entry) in data {
                if let Some(price) = entry.get("price").and_then(|v| v.as_f64()) {
                    out.insert(mint.clone(), price);
                }
            }
        }
        Ok(out)
    }
}
