//! Membership manager - owns the initialize vs join decision.
//!
//! Wraps a `ClusterRuntime` with the idempotency rules the bootstrap
//! relies on: initializing an already-clustered node is refused, joining
//! an already-joined node reports `AlreadyMember`, and a join is only
//! reported successful once the runtime shows the node as active.

use muster_common::{ClusterStatus, ClusterToken, MusterError, NodeRole};
use std::sync::Arc;

use super::{ClusterRuntime, JoinError};

/// Cluster membership operations for the local node
#[derive(Clone)]
pub struct MembershipManager {
    runtime: Arc<dyn ClusterRuntime>,
}

impl MembershipManager {
    pub fn new(runtime: Arc<dyn ClusterRuntime>) -> Self {
        Self { runtime }
    }

    /// Create a new cluster on this node.
    ///
    /// Fails with `AlreadyInitialized` (leaving the node untouched) if the
    /// node is already part of a cluster.
    pub async fn initialize(&self, advertise_address: &str) -> Result<ClusterToken, MusterError> {
        if self.runtime.current_status().await?.is_clustered() {
            tracing::warn!(advertise = %advertise_address, "Refusing to re-initialize clustered node");
            return Err(MusterError::AlreadyInitialized);
        }

        let token = self.runtime.initialize(advertise_address).await?;

        tracing::info!(
            advertise = %advertise_address,
            token = %token.fingerprint(),
            "Cluster initialized"
        );

        Ok(token)
    }

    /// Join the cluster managed at `manager_endpoint`.
    ///
    /// `Err(JoinError::AlreadyMember)` is an idempotent success.
    pub async fn join(&self, token: &ClusterToken, manager_endpoint: &str) -> Result<(), JoinError> {
        if self.status_for_join().await?.is_clustered() {
            return Err(JoinError::AlreadyMember);
        }

        match self.runtime.join(token, manager_endpoint).await {
            // A half-joined node (pending, error) also claims membership
            Ok(()) | Err(JoinError::AlreadyMember) => {}
            Err(e) => return Err(e),
        }

        // Verify the runtime actually took us in
        if !self.status_for_join().await?.is_clustered() {
            return Err(JoinError::NetworkError(
                "node not active after join".to_string(),
            ));
        }

        tracing::info!(
            manager = %manager_endpoint,
            token = %token.fingerprint(),
            "Joined cluster"
        );

        Ok(())
    }

    pub async fn current_status(&self) -> Result<ClusterStatus, MusterError> {
        self.runtime.current_status().await
    }

    pub async fn issue_token(&self, role: NodeRole) -> Result<ClusterToken, MusterError> {
        self.runtime.issue_token(role).await
    }

    async fn status_for_join(&self) -> Result<ClusterStatus, JoinError> {
        self.runtime
            .current_status()
            .await
            .map_err(|e| JoinError::NetworkError(e.to_string()))
    }
}
