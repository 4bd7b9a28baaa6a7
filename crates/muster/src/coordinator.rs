//! Join Coordinator - retry state machine for a joining node.
//!
//! ```text
//! INIT → PROBING → FETCHING_TOKEN → JOINING → MEMBER
//!          ↑            │              │
//!          └── sleep ───┴──────────────┘   (budget exhausted → FAILED)
//! ```
//!
//! One attempt is one pass from PROBING onward. The attempt counter is
//! global across phases, so the total retry time is bounded by
//! `max_retries * interval` no matter where attempts fail.

use muster_common::{MusterError, NodeRecord, NodeStatus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::cluster::{MembershipManager, endpoint};
use crate::probe::{Reachability, ReachabilityProber};
use crate::token::{TokenFetch, TokenSource};

/// Fixed-interval retry budget
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts allowed across all phases
    pub max_retries: u32,
    /// Pause between attempts
    pub interval: Duration,
}

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPhase {
    Init,
    Probing,
    FetchingToken,
    Joining,
    Member,
    Failed,
}

/// Manager the coordinator joins
#[derive(Debug, Clone)]
pub struct JoinTarget {
    pub manager_address: String,
    pub swarm_port: u16,
    pub connect_timeout: Duration,
}

/// Drives one node from PENDING to MEMBER or FAILED
pub struct JoinCoordinator {
    target: JoinTarget,
    policy: RetryPolicy,
    prober: Arc<dyn ReachabilityProber>,
    tokens: Arc<dyn TokenSource>,
    membership: MembershipManager,
    shutdown: watch::Receiver<bool>,
    phase: JoinPhase,
}

impl JoinCoordinator {
    pub fn new(
        target: JoinTarget,
        policy: RetryPolicy,
        prober: Arc<dyn ReachabilityProber>,
        tokens: Arc<dyn TokenSource>,
        membership: MembershipManager,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            target,
            policy,
            prober,
            tokens,
            membership,
            shutdown,
            phase: JoinPhase::Init,
        }
    }

    pub fn phase(&self) -> JoinPhase {
        self.phase
    }

    /// Run until `record` reaches a terminal status
    pub async fn run(&mut self, record: &mut NodeRecord) -> NodeStatus {
        if let Err(e) = record.advance(NodeStatus::Joining) {
            tracing::error!(node_id = %record.node_id, error = %e, "Join coordinator started on finished node");
            return record.status();
        }

        tracing::info!(
            node_id = %record.node_id,
            manager = %endpoint(&self.target.manager_address, self.target.swarm_port),
            max_retries = self.policy.max_retries,
            interval = ?self.policy.interval,
            "Joining cluster"
        );

        if self.policy.max_retries == 0 {
            return self.fail(
                record,
                MusterError::Config("max_retries must be at least 1".to_string()),
            );
        }

        let mut protocol_failures = 0u32;

        loop {
            let cancelled = *self.shutdown.borrow();
            if cancelled {
                return self.fail(record, MusterError::Cancelled);
            }

            let attempt = record.begin_attempt();

            let error = match self.attempt().await {
                Ok(()) => return self.succeed(record),
                Err(error) => error,
            };

            if matches!(error, MusterError::Cancelled) {
                return self.fail(record, error);
            }

            // A rejected token is refetched once; a second rejection means
            // the manager will not take us
            let escalate = if let MusterError::Protocol(_) = error {
                protocol_failures += 1;
                protocol_failures > 1
            } else {
                false
            };

            tracing::warn!(
                node_id = %record.node_id,
                attempt,
                max_retries = self.policy.max_retries,
                category = error.category(),
                error = %error,
                "Join attempt failed"
            );

            if escalate || !error.is_retryable() || attempt >= self.policy.max_retries {
                return self.fail(record, error);
            }
            record.record_error(error);

            if self.pause().await.is_err() {
                return self.fail(record, MusterError::Cancelled);
            }
        }
    }

    /// One pass through PROBING → FETCHING_TOKEN → JOINING
    async fn attempt(&mut self) -> Result<(), MusterError> {
        let mut shutdown = self.shutdown.clone();
        let manager = self.target.manager_address.clone();

        self.set_phase(JoinPhase::Probing);
        let reachability = until_cancelled(
            &mut shutdown,
            self.prober
                .probe(&manager, self.target.swarm_port, self.target.connect_timeout),
        )
        .await?;
        if let Reachability::Unreachable(reason) = reachability {
            return Err(MusterError::TransientNetwork(reason));
        }

        self.set_phase(JoinPhase::FetchingToken);
        let token = match until_cancelled(&mut shutdown, self.tokens.fetch_token(&manager)).await? {
            TokenFetch::Available(token) => token,
            TokenFetch::NotAvailable(reason) => return Err(MusterError::TokenUnavailable(reason)),
        };

        // Joins are not interrupted: a cancelled join could leave the
        // runtime half-joined
        self.set_phase(JoinPhase::Joining);
        let manager_endpoint = endpoint(&manager, self.target.swarm_port);
        match self.membership.join(&token, &manager_endpoint).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_success() => {
                tracing::info!(manager = %manager_endpoint, "Node already a cluster member");
                Ok(())
            }
            Err(e) => Err(e
                .as_bootstrap_error()
                .unwrap_or_else(|| MusterError::TransientNetwork(e.to_string()))),
        }
    }

    async fn pause(&self) -> Result<(), MusterError> {
        let mut shutdown = self.shutdown.clone();
        until_cancelled(&mut shutdown, tokio::time::sleep(self.policy.interval)).await
    }

    fn set_phase(&mut self, phase: JoinPhase) {
        if self.phase != phase {
            tracing::debug!(from = ?self.phase, to = ?phase, "Join phase transition");
            self.phase = phase;
        }
    }

    fn succeed(&mut self, record: &mut NodeRecord) -> NodeStatus {
        self.set_phase(JoinPhase::Member);
        if let Err(e) = record.advance(NodeStatus::Member) {
            tracing::error!(node_id = %record.node_id, error = %e, "Failed to mark node as member");
        }

        tracing::info!(
            node_id = %record.node_id,
            attempts = record.join_attempts(),
            "✅ Node joined cluster"
        );
        record.status()
    }

    fn fail(&mut self, record: &mut NodeRecord, error: MusterError) -> NodeStatus {
        self.set_phase(JoinPhase::Failed);

        tracing::error!(
            node_id = %record.node_id,
            attempts = record.join_attempts(),
            category = error.category(),
            error = %error,
            "Join failed"
        );

        if let Err(e) = record.fail(error) {
            tracing::error!(node_id = %record.node_id, error = %e, "Failed to mark node as failed");
        }
        record.status()
    }
}

/// Resolve `fut` unless shutdown is signalled first
async fn until_cancelled<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    fut: F,
) -> Result<F::Output, MusterError> {
    tokio::select! {
        biased;
        _ = cancelled(shutdown) => Err(MusterError::Cancelled),
        output = fut => Ok(output),
    }
}

async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        // Sender gone without signalling: nothing can cancel us anymore
        std::future::pending::<()>().await;
    }
}
