/// Flat-namespace configuration, loaded from a JSON file on disk with
/// per-domain defaults (mirrors the teacher's `Config::load`/`save`/`reload`
/// shape — see DESIGN.md).
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    pub rpc: RpcConfig,
    #[serde(default)]
    pub trade: TradeConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub exit: ExitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub endpoint: String,
    pub reconnect_ms: u64,
    /// `None` means unbounded reconnect attempts.
    pub max_attempts: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "18.234.24.82:50051".to_string(),
            reconnect_ms: 5000,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeConfig {
    pub amount_usdc: f64,
    pub allowed_tokens: Vec<String>,
    pub slippage_bps: u16,
    pub priority_fee_microlamports: u64,
    pub use_bundle_relay: bool,
    pub bundle_tip_lamports: u64,
    pub copy_buys_only: bool,
    pub min_trade_usdc: f64,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            amount_usdc: 2.0,
            allowed_tokens: vec!["EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm".to_string()],
            slippage_bps: 100,
            priority_fee_microlamports: 200_000,
            use_bundle_relay: false,
            bundle_tip_lamports: 1_000_000,
            copy_buys_only: false,
            min_trade_usdc: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_position_usdc: f64,
    pub max_total_exposure_usdc: f64,
    pub max_open_positions: u32,
    pub min_usdc_reserve: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_usdc: 50.0,
            max_total_exposure_usdc: 200.0,
            max_open_positions: 10,
            min_usdc_reserve: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub enabled: bool,
    pub min_liquidity_usdc: f64,
    pub max_price_impact_pct: f64,
    pub min_token_age_seconds: i64,
    pub min_24h_volume_usdc: f64,
    pub max_recent_pump_pct: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_liquidity_usdc: 50_000.0,
            max_price_impact_pct: 2.0,
            min_token_age_seconds: 3600,
            min_24h_volume_usdc: 10_000.0,
            max_recent_pump_pct: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    pub enabled: bool,
    /// (profit_pct_target, sell_pct) ladder rungs.
    pub take_profit_targets: Vec<(f64, f64)>,
    pub stop_loss_pct: f64,
    pub max_hold_hours: f64,
    pub trailing_stop_pct: Option<f64>,
    pub trailing_activation_pct: Option<f64>,
    pub check_interval_seconds: u64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            take_profit_targets: vec![(50.0, 25.0), (100.0, 50.0), (300.0, 100.0)],
            stop_loss_pct: -30.0,
            max_hold_hours: 24.0,
            trailing_stop_pct: None,
            trailing_activation_pct: None,
            check_interval_seconds: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            rpc: RpcConfig {
                endpoint: "https://api.mainnet-beta.solana.com".to_string(),
            },
            trade: TradeConfig::default(),
            risk: RiskConfig::default(),
            filter: FilterConfig::default(),
            exit: ExitConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            let default_config = Self::default();
            default_config.save(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        if config.rpc.endpoint.is_empty() {
            return Err(anyhow::anyhow!("rpc.endpoint is required in config"));
        }

        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    pub fn reload(&mut self, path: &str) -> Result<()> {
        *self = Self::load(path)?;
        Ok(())
    }
}
