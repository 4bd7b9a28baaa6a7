//! Common error types for Muster components.

use thiserror::Error;

use crate::types::NodeStatus;

/// Bootstrap error taxonomy shared by the coordinator and the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MusterError {
    /// Invalid configuration (bad role, address, or budget)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manager unreachable, connection refused, or runtime network failure
    #[error("Network error: {0}")]
    TransientNetwork(String),

    /// Join token not yet published or not fetchable
    #[error("Token unavailable: {0}")]
    TokenUnavailable(String),

    /// Manager rejected the join (e.g. rotated token)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Local cluster runtime failed or could not be executed
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Node already runs a cluster
    #[error("Cluster already initialized on this node")]
    AlreadyInitialized,

    /// NodeRecord status would regress or leave a terminal state
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: NodeStatus, to: NodeStatus },

    /// Bootstrap cancelled by a shutdown signal
    #[error("Cancelled by shutdown signal")]
    Cancelled,
}

impl MusterError {
    /// Stable category name printed on the terminal status line
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::TransientNetwork(_) => "TransientNetworkError",
            Self::TokenUnavailable(_) => "TokenUnavailable",
            Self::Protocol(_) => "ProtocolError",
            Self::Runtime(_) => "RuntimeError",
            Self::AlreadyInitialized => "AlreadyInitialized",
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Returns true if the join coordinator should spend another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::TokenUnavailable(_) | Self::Protocol(_)
        )
    }

    /// Process exit code for a bootstrap that ended with this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => crate::constants::exit_codes::INVALID_CONFIG,
            _ => crate::constants::exit_codes::FAILED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_categories() {
        assert!(MusterError::TransientNetwork("refused".into()).is_retryable());
        assert!(MusterError::TokenUnavailable("empty".into()).is_retryable());
        assert!(MusterError::Protocol("invalid join token".into()).is_retryable());
        assert!(!MusterError::Config("role".into()).is_retryable());
        assert!(!MusterError::Cancelled.is_retryable());
        assert!(!MusterError::Runtime("docker missing".into()).is_retryable());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MusterError::Config("bad".into()).exit_code(), 2);
        assert_eq!(MusterError::Cancelled.exit_code(), 1);
        assert_eq!(MusterError::TransientNetwork("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_category_names() {
        assert_eq!(
            MusterError::TransientNetwork("x".into()).category(),
            "TransientNetworkError"
        );
        assert_eq!(MusterError::Cancelled.category(), "Cancelled");
    }
}
