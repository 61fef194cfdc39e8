use thiserror::Error;

/// Raised while loading and normalizing the on-disk config into a `CoreConfig`.
/// Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path} could not be read: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("token spec at index {index} is malformed: {reason}")]
    MalformedTokenSpec { index: usize, reason: String },

    #[error("chain '{0}' referenced by a token is not declared in the chain map")]
    UnknownChain(String),
}

/// Raised by the Chain Client Pool. `Unreachable` is fatal only when every
/// configured chain fails init; a partial failure is a warning, not this error.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain '{chain}' is unreachable: {reason}")]
    Unreachable { chain: String, reason: String },

    #[error("rpc call '{method}' on chain '{chain}' timed out")]
    Timeout { chain: String, method: String },

    #[error("rpc call '{method}' on chain '{chain}' failed: {reason}")]
    CallFailed {
        chain: String,
        method: String,
        reason: String,
    },

    #[error("no client registered for chain '{0}'")]
    UnknownChain(String),
}

/// The taxonomy a Holder Provider Adapter raises, per spec §4.3 / §7.
/// `Unsupported` and `Empty` are not failures in the usual sense: the refresh
/// engine treats them as "try the next source", same as an exhausted retry.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("provider returned zero rows")]
    Empty,

    #[error("provider does not support this request")]
    Unsupported,

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Whether the retry decorator should attempt this call again.
    /// `RateLimited` and `Unsupported` are terminal for the current attempt —
    /// a retry against the same endpoint can't fix them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_) | ProviderError::Other(_))
    }
}

impl crate::retry::RetryableError for ProviderError {
    fn is_retryable(&self) -> bool {
        ProviderError::is_retryable(self)
    }
}

/// Raised by the Holder Cache Store on `save`. `load`/`metadata` swallow I/O
/// errors and return `None` instead per spec §4.1 — this type only surfaces
/// on writes, where the caller needs to know the write-through failed.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write cache file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize cache document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Raised when delivery to the messaging sink fails. Always counted, never
/// retried (spec §4.9 / §7).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink request failed: {0}")]
    Request(String),

    #[error("sink returned non-success status {0}")]
    NonSuccess(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_other_are_retryable() {
        assert!(ProviderError::Transient("boom".into()).is_retryable());
        assert!(ProviderError::Other("boom".into()).is_retryable());
    }

    #[test]
    fn rate_limited_and_unsupported_are_not_retryable() {
        assert!(!ProviderError::RateLimited.is_retryable());
        assert!(!ProviderError::Unsupported.is_retryable());
        assert!(!ProviderError::Empty.is_retryable());
    }
}
