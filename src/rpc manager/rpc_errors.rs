use solana_client::client_error::ClientError;
use thiserror::Error;

/// Errors surfaced by the ledger RPC boundary.
///
/// The orchestration core only cares about three outcomes: the call
/// succeeded, the call failed and may be retried, or the resource does not
/// exist. The variants below keep enough detail for logs while
/// `is_retryable()` and `is_not_found()` collapse them into those outcomes.
#[derive(Debug, Clone, Error)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    #[error("Transaction expired (endpoint: {endpoint})")]
    TransactionExpired { endpoint: String },

    #[error("Account not found: {account} (endpoint: {endpoint})")]
    AccountNotFound { account: String, endpoint: String },

    #[error("Insufficient funds (endpoint: {endpoint})")]
    InsufficientFunds { endpoint: String },

    /// The transaction was processed but the runtime rejected it
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Account data could not be decoded into the expected layout
    #[error("Decode error: {0}")]
    Decode(String),
}

impl RpcManagerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcManagerError::Transport { .. } => true,
            RpcManagerError::Timeout { .. } => true,
            RpcManagerError::RateLimitExceeded { .. } => true,
            RpcManagerError::BlockhashNotFound { .. } => true,
            // A fresh blockhash fixes an expired transaction
            RpcManagerError::TransactionExpired { .. } => true,

            RpcManagerError::AccountNotFound { .. } => false,
            RpcManagerError::InsufficientFunds { .. } => false,
            RpcManagerError::TransactionFailed(_) => false,
            RpcManagerError::Decode(_) => false,

            RpcManagerError::RpcResponse { code, .. } => {
                // Retry on server errors (5xx)
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// True when the queried account does not exist (closed or never created)
    pub fn is_not_found(&self) -> bool {
        matches!(self, RpcManagerError::AccountNotFound { .. })
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcManagerError::Transport { endpoint, .. } => Some(endpoint),
            RpcManagerError::Timeout { endpoint, .. } => Some(endpoint),
            RpcManagerError::RpcResponse { endpoint, .. } => Some(endpoint),
            RpcManagerError::RateLimitExceeded { endpoint } => Some(endpoint),
            RpcManagerError::BlockhashNotFound { endpoint } => Some(endpoint),
            RpcManagerError::TransactionExpired { endpoint } => Some(endpoint),
            RpcManagerError::AccountNotFound { endpoint, .. } => Some(endpoint),
            RpcManagerError::InsufficientFunds { endpoint } => Some(endpoint),
            _ => None,
        }
    }

    /// Create from ClientError with context
    ///
    /// `account` names the queried account so a not-found error can say which
    /// one vanished.
    pub fn from_client_error(err: ClientError, endpoint: &str, account: Option<&str>) -> Self {
        let err_str = err.to_string().to_lowercase();

        if err_str.contains("blockhash not found") {
            RpcManagerError::BlockhashNotFound {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("transaction expired")
            || err_str.contains("block height exceeded")
        {
            RpcManagerError::TransactionExpired {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("account not found")
            || err_str.contains("could not find account")
            || err_str.contains("accountnotfound")
        {
            RpcManagerError::AccountNotFound {
                account: account.unwrap_or("unknown").to_string(),
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("insufficient funds")
            || err_str.contains("insufficient lamports")
        {
            RpcManagerError::InsufficientFunds {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            RpcManagerError::RateLimitExceeded {
                endpoint: endpoint.to_string(),
            }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            RpcManagerError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: 30_000,
            }
        } else if err_str.contains("error sending request")
            || err_str.contains("connection refused")
            || err_str.contains("connection reset")
        {
            RpcManagerError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            // Extract error code if available
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(',').parse::<i64>().ok());

            RpcManagerError::RpcResponse {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
                code,
            }
        }
    }
}
