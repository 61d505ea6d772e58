//! Error types for the PPN gateway

use ethers::types::Address;
use thiserror::Error;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Length of requests are invalid: {routing} routing addresses for {transactions} transactions")]
    InvalidRequestLength { routing: usize, transactions: usize },

    #[error("Transaction decode error: {0}")]
    Decode(String),

    #[error("Transaction from: {from:?} Both \"data\" and \"input\" are set and not equal. Please use \"input\" to pass transaction call data.")]
    AmbiguousPayload { from: Address },

    #[error("Transaction from: {from:?} contract creation without any data provided")]
    MissingContractCode { from: Address },

    #[error("Gas price suggestion failed: {0}")]
    GasPrice(String),

    #[error("Pool nonce lookup failed for {address:?}: {message}")]
    PoolNonce { address: Address, message: String },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Submission error: {0}")]
    Submission(String),

    #[error("Node connection error: {0}")]
    NodeConnection(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Failed to serialize error report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Aggregated per-item failures; the message is the JSON failure map.
    #[error("{0}")]
    BatchFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::NodeConnection(_)
                | GatewayError::Timeout { .. }
                | GatewayError::GasPrice(_)
                | GatewayError::PoolNonce { .. }
        )
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequestLength { .. } => "request_length",
            GatewayError::Decode(_) => "decode",
            GatewayError::AmbiguousPayload { .. } => "ambiguous_payload",
            GatewayError::MissingContractCode { .. } => "missing_code",
            GatewayError::GasPrice(_) => "gas_price",
            GatewayError::PoolNonce { .. } => "pool_nonce",
            GatewayError::Signing(_) => "signing",
            GatewayError::Submission(_) => "submission",
            GatewayError::NodeConnection(_) => "node_connection",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::Cancelled => "cancelled",
            GatewayError::Serialization(_) => "serialization",
            GatewayError::BatchFailed(_) => "batch",
            GatewayError::Io(_) => "io",
            GatewayError::Internal(_) => "internal",
        }
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
