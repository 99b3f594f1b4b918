/// Error taxonomy for the ingestion/detection/copy-execution pipeline.
///
/// Spec category note: `RiskRejected`, `QualityRejected`, `Dedup'd`, and
/// `Filtered(reason)` are deliberately *not* members of `EngineError` — they
/// are ordinary skip outcomes reported as `crate::core::types::Decision`
/// values, never propagated as errors.
use std::fmt;

#[derive(Debug, Clone)]
pub enum EngineError {
    /// Per-transaction: entry payload or tx wire-form could not be walked.
    MalformedEntry(String),
    /// Per-transaction: neither versioned nor legacy decode succeeded.
    Decode(String),
    /// Lookup-table fetch failed for one or more tables; caller may
    /// proceed with the partially-resolved key set.
    LookupResolution(String),
    Rpc(RpcError),
    Quote(String),
    Build(String),
    Metadata(String),
    Price(String),
    Submission(SubmissionError),
    /// Bundle relay is unavailable; C8 degrades to RPC-only.
    BundleRelayUnavailable(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::MalformedEntry(m) => write!(f, "malformed entry: {}", m),
            EngineError::Decode(m) => write!(f, "transaction decode failed: {}", m),
            EngineError::LookupResolution(m) => write!(f, "lookup table resolution: {}", m),
            EngineError::Rpc(e) => write!(f, "rpc error: {}", e),
            EngineError::Quote(m) => write!(f, "quote error: {}", m),
            EngineError::Build(m) => write!(f, "swap build error: {}", m),
            EngineError::Metadata(m) => write!(f, "metadata error: {}", m),
            EngineError::Price(m) => write!(f, "price error: {}", m),
            EngineError::Submission(e) => write!(f, "submission error: {}", e),
            EngineError::BundleRelayUnavailable(m) => write!(f, "bundle relay unavailable: {}", m),
        }
    }
}

impl std::error::Error for EngineError {}

#[derive(Debug, Clone)]
pub enum RpcError {
    Timeout { endpoint: String, timeout_ms: u64 },
    HttpStatus { endpoint: String, status: u16 },
    MalformedResponse { endpoint: String, detail: String },
    Generic(String),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Timeout { endpoint, timeout_ms } => {
                write!(f, "timeout after {}ms calling {}", timeout_ms, endpoint)
            }
            RpcError::HttpStatus { endpoint, status } => {
                write!(f, "http {} from {}", status, endpoint)
            }
            RpcError::MalformedResponse { endpoint, detail } => {
                write!(f, "malformed response from {}: {}", endpoint, detail)
            }
            RpcError::Generic(m) => write!(f, "{}", m),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SubmissionError {
    BothTransportsFailed { rpc_error: String, relay_error: Option<String> },
    Generic(String),
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionError::BothTransportsFailed { rpc_error, relay_error } => write!(
                f,
                "both transports failed; rpc: {}; relay: {}",
                rpc_error,
                relay_error.as_deref().unwrap_or("n/a")
            ),
            SubmissionError::Generic(m) => write!(f, "{}", m),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Rpc(RpcError::Generic(err.to_string()))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Decode(err.to_string())
    }
}
