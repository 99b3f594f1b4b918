/// Outbound notification events (§6.8), broadcast over a channel rather than
/// delivered via callback — consumers (the external notification sink) must
/// not block producers. Modeled on the teacher's `positions/broadcast.rs`
/// (`tokio::sync::broadcast`, serde-tagged update enum).
use crate::core::types::{DetectedTrade, Position};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_BUS_CAPACITY: usize = 1024;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    TradeDetected {
        trade: DetectedTrade,
    },
    CopyInitiated {
        trade: DetectedTrade,
    },
    CopyComplete {
        original: String,
        copy_signature: String,
        copy_latency_ms: i64,
        e2e_latency_ms: i64,
    },
    CopySkipped {
        trade: DetectedTrade,
        reason: String,
        details: Option<String>,
    },
    CopyFailed {
        trade: DetectedTrade,
        error: String,
    },
    PositionOpened {
        position: Position,
    },
    PositionUpdated {
        position: Position,
    },
    PositionClosed {
        position: Position,
        realized_pnl_usdc: f64,
        realized_pnl_pct: f64,
    },
    LimitWarning {
        kind: String,
        current: f64,
        max: f64,
        percent: f64,
    },
    ExitTriggered {
        token_mint: String,
        rule: String,
    },
    ExitExecuted {
        token_mint: String,
        signature: String,
    },
    ExitFailed {
        token_mint: String,
        error: String,
    },
}

/// Process-wide event bus. Constructed once by the caller and threaded
/// through components — no hidden singleton (spec.md §9).
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<(EngineEvent, DateTime<Utc>)>,
}

impl EventBus {
    pub fn new() -> (Self, broadcast::Receiver<(EngineEvent, DateTime<Utc>)>) {
        let (tx, rx) = broadcast::channel(EVENT_BUS_CAPACITY);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(EngineEvent, DateTime<Utc>)> {
        self.tx.subscribe()
    }

    /// Never blocks; a lagging/absent subscriber only drops events, it never
    /// backs up the producer.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.tx.send((event, Utc::now()));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new().0
    }
}
