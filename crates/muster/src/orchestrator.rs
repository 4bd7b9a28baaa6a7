//! Bootstrap Orchestrator - drives one node lifecycle per invocation.
//!
//! - Manager: initialize (or adopt) the swarm, publish join tokens, MEMBER.
//! - Worker: run the join coordinator to MEMBER or FAILED.

use muster_common::constants::exit_codes;
use muster_common::{ClusterStatus, MusterError, NodeRecord, NodeRole, NodeStatus};
use std::sync::Arc;
use tokio::sync::watch;

use crate::cluster::{ClusterRuntime, DockerCli, MembershipManager};
use crate::config::BootstrapConfig;
use crate::coordinator::{JoinCoordinator, JoinTarget, RetryPolicy};
use crate::probe::{ReachabilityProber, TcpProber};
use crate::token::{ChainedTokenSource, FileTokenStore, TokenPublisher, TokenSource};

/// External collaborators the bootstrap drives
pub struct Collaborators {
    pub runtime: Arc<dyn ClusterRuntime>,
    pub prober: Arc<dyn ReachabilityProber>,
    pub tokens: Arc<dyn TokenSource>,
    pub publisher: Arc<dyn TokenPublisher>,
}

impl Collaborators {
    /// Production wiring: docker CLI, TCP probes, configured token backends
    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self {
            runtime: Arc::new(DockerCli::new(
                config.docker_bin.clone(),
                config.command_timeout(),
            )),
            prober: Arc::new(TcpProber),
            tokens: Arc::new(ChainedTokenSource::from_config(config)),
            publisher: Arc::new(FileTokenStore::new(&config.token.file_dir)),
        }
    }
}

/// Terminal result of a bootstrap run
#[derive(Debug)]
pub struct BootstrapOutcome {
    pub record: NodeRecord,
}

impl BootstrapOutcome {
    pub fn is_success(&self) -> bool {
        self.record.status() == NodeStatus::Member
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            return exit_codes::SUCCESS;
        }
        self.record
            .last_error()
            .map(MusterError::exit_code)
            .unwrap_or(exit_codes::FAILED)
    }

    /// Single terminal status line for the operator
    pub fn summary(&self) -> String {
        let record = &self.record;
        let mut line = format!(
            "node {} ({}) address={} status={} attempts={}",
            record.node_id,
            record.role,
            record.address,
            record.status(),
            record.join_attempts()
        );

        if !self.is_success() {
            if let Some(error) = record.last_error() {
                line.push_str(&format!(" error={}: {}", error.category(), error));
            }
        }
        line
    }
}

pub struct Orchestrator {
    config: BootstrapConfig,
    membership: MembershipManager,
    prober: Arc<dyn ReachabilityProber>,
    tokens: Arc<dyn TokenSource>,
    publisher: Arc<dyn TokenPublisher>,
    shutdown: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        config: BootstrapConfig,
        collaborators: Collaborators,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            membership: MembershipManager::new(collaborators.runtime),
            prober: collaborators.prober,
            tokens: collaborators.tokens,
            publisher: collaborators.publisher,
            shutdown,
        }
    }

    pub async fn run(&self) -> BootstrapOutcome {
        let address = if self.config.advertise_address.is_empty() {
            "-".to_string()
        } else {
            self.config.advertise_address.clone()
        };
        let mut record = NodeRecord::new(self.config.node_id.clone(), self.config.role, address);

        match self.config.role {
            NodeRole::Manager => self.bootstrap_manager(&mut record).await,
            NodeRole::Worker => self.bootstrap_worker(&mut record).await,
        }

        BootstrapOutcome { record }
    }

    async fn bootstrap_manager(&self, record: &mut NodeRecord) {
        let cancelled = *self.shutdown.borrow();
        let result = if cancelled {
            Err(MusterError::Cancelled)
        } else {
            self.initialize_manager().await
        };

        let transition = match result {
            Ok(()) => {
                tracing::info!(
                    node_id = %record.node_id,
                    advertise = %self.config.advertise_address,
                    "👑 Manager ready"
                );
                record.advance(NodeStatus::Member)
            }
            Err(error) => {
                tracing::error!(
                    node_id = %record.node_id,
                    category = error.category(),
                    error = %error,
                    "Manager bootstrap failed"
                );
                record.fail(error)
            }
        };

        if let Err(e) = transition {
            tracing::error!(node_id = %record.node_id, error = %e, "Invalid manager status transition");
        }
    }

    async fn initialize_manager(&self) -> Result<(), MusterError> {
        let advertise = &self.config.advertise_address;

        let worker_token = match self.membership.current_status().await? {
            ClusterStatus::Unconfigured => match self.membership.initialize(advertise).await {
                Ok(token) => token,
                // Lost a race with another init on this node; adopt its swarm
                Err(MusterError::AlreadyInitialized) => {
                    self.membership.issue_token(NodeRole::Worker).await?
                }
                Err(e) => return Err(e),
            },
            ClusterStatus::Manager => {
                tracing::info!(advertise = %advertise, "♻️ Swarm already initialized, republishing tokens");
                self.membership.issue_token(NodeRole::Worker).await?
            }
            ClusterStatus::Member => {
                return Err(MusterError::Config(
                    "node is a worker in an existing swarm and cannot bootstrap as manager"
                        .to_string(),
                ));
            }
        };

        self.publisher.publish(&worker_token).await?;

        let manager_token = self.membership.issue_token(NodeRole::Manager).await?;
        self.publisher.publish(&manager_token).await?;

        Ok(())
    }

    async fn bootstrap_worker(&self, record: &mut NodeRecord) {
        let mut coordinator = JoinCoordinator::new(
            JoinTarget {
                manager_address: self.config.manager_address.clone(),
                swarm_port: self.config.swarm_port,
                connect_timeout: self.config.connect_timeout(),
            },
            RetryPolicy {
                max_retries: self.config.max_retries,
                interval: self.config.retry_interval(),
            },
            self.prober.clone(),
            self.tokens.clone(),
            self.membership.clone(),
            self.shutdown.clone(),
        );

        let status = coordinator.run(record).await;
        tracing::debug!(status = %status, phase = ?coordinator.phase(), "Join coordinator finished");
    }
}
