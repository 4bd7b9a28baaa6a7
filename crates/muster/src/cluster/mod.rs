//! Cluster membership.
//!
//! Implements:
//! - The cluster runtime control surface (`ClusterRuntime`)
//! - The Docker CLI adapter for that surface
//! - Membership decisions (initialize vs join, idempotent outcomes)

mod docker;
mod membership;
#[cfg(test)]
pub mod memory;

pub use docker::DockerCli;
pub use membership::MembershipManager;

use async_trait::async_trait;
use muster_common::{ClusterStatus, ClusterToken, MusterError, NodeRole};
use thiserror::Error;

/// Reasons a join attempt can fail
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// Manager rejected the token (possibly rotated)
    #[error("invalid join token: {0}")]
    InvalidToken(String),

    /// Manager unreachable or runtime unable to talk to it
    #[error("network error: {0}")]
    NetworkError(String),

    /// Node is already part of the cluster
    #[error("node is already a cluster member")]
    AlreadyMember,

    /// Join did not complete in time
    #[error("join timed out: {0}")]
    Timeout(String),
}

impl JoinError {
    /// Returns true for outcomes that leave the node in the cluster
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AlreadyMember)
    }

    /// Bootstrap error category for a failed join (None for `AlreadyMember`)
    pub fn as_bootstrap_error(&self) -> Option<MusterError> {
        match self {
            Self::InvalidToken(reason) => Some(MusterError::Protocol(reason.clone())),
            Self::NetworkError(reason) => Some(MusterError::TransientNetwork(reason.clone())),
            Self::Timeout(reason) => Some(MusterError::TransientNetwork(format!(
                "join timed out: {}",
                reason
            ))),
            Self::AlreadyMember => None,
        }
    }
}

/// Control surface of a container-orchestration runtime
#[async_trait]
pub trait ClusterRuntime: Send + Sync {
    /// Create a new cluster advertised on `advertise_address`, returning the worker token
    async fn initialize(&self, advertise_address: &str) -> Result<ClusterToken, MusterError>;

    /// Join the cluster managed at `manager_endpoint` (host:port)
    async fn join(&self, token: &ClusterToken, manager_endpoint: &str) -> Result<(), JoinError>;

    /// Local node's cluster state
    async fn current_status(&self) -> Result<ClusterStatus, MusterError>;

    /// Current join token for `role` (manager only)
    async fn issue_token(&self, role: NodeRole) -> Result<ClusterToken, MusterError>;
}

/// Format `host:port`, bracketing IPv6 literals
pub fn endpoint(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_formatting() {
        assert_eq!(endpoint("10.0.1.5", 2377), "10.0.1.5:2377");
        assert_eq!(endpoint("manager.internal", 2377), "manager.internal:2377");
        assert_eq!(endpoint("fd00::5", 2377), "[fd00::5]:2377");
    }

    #[test]
    fn test_join_error_categories() {
        assert!(JoinError::AlreadyMember.is_success());
        assert!(JoinError::AlreadyMember.as_bootstrap_error().is_none());
        assert!(matches!(
            JoinError::InvalidToken("rotated".into()).as_bootstrap_error(),
            Some(MusterError::Protocol(_))
        ));
        assert!(matches!(
            JoinError::Timeout("deadline".into()).as_bootstrap_error(),
            Some(MusterError::TransientNetwork(_))
        ));
    }
}
