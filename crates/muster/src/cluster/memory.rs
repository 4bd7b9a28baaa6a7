//! In-process swarm used by tests.
//!
//! One `SimulatedSwarm` plays the manager-side cluster state; each
//! `SimulatedNode` is the local runtime of one node talking to it.

use async_trait::async_trait;
use muster_common::constants::DEFAULT_SWARM_PORT;
use muster_common::{ClusterStatus, ClusterToken, MusterError, NodeRole};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ClusterRuntime, JoinError, endpoint};

#[derive(Default)]
struct SwarmState {
    advertise: Option<String>,
    worker_token: String,
    manager_token: String,
    members: HashMap<String, ClusterStatus>,
}

#[derive(Clone, Default)]
pub struct SimulatedSwarm {
    state: Arc<Mutex<SwarmState>>,
}

impl SimulatedSwarm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local runtime for `node_id`
    pub fn node(&self, node_id: &str) -> Arc<SimulatedNode> {
        Arc::new(SimulatedNode {
            node_id: node_id.to_string(),
            state: self.state.clone(),
            drop_joins: AtomicBool::new(false),
            stuck_pending: AtomicBool::new(false),
        })
    }

    pub fn member_count(&self) -> usize {
        lock(&self.state).members.len()
    }
}

pub struct SimulatedNode {
    node_id: String,
    state: Arc<Mutex<SwarmState>>,
    /// Report joins as successful without entering the swarm
    drop_joins: AtomicBool,
    /// Stuck in a pending swarm state: joins report `AlreadyMember`
    stuck_pending: AtomicBool,
}

impl SimulatedNode {
    pub fn drop_joins(&self) {
        self.drop_joins.store(true, Ordering::SeqCst);
    }

    pub fn stick_pending(&self) {
        self.stuck_pending.store(true, Ordering::SeqCst);
    }
}

fn lock(state: &Mutex<SwarmState>) -> MutexGuard<'_, SwarmState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ClusterRuntime for SimulatedNode {
    async fn initialize(&self, advertise_address: &str) -> Result<ClusterToken, MusterError> {
        let mut state = lock(&self.state);
        if state.members.contains_key(&self.node_id) {
            return Err(MusterError::AlreadyInitialized);
        }
        if state.advertise.is_some() {
            return Err(MusterError::Runtime("swarm already has a manager".to_string()));
        }

        state.advertise = Some(advertise_address.to_string());
        state.worker_token = format!("SWMTKN-1-worker-{}", self.node_id);
        state.manager_token = format!("SWMTKN-1-manager-{}", self.node_id);
        state.members.insert(self.node_id.clone(), ClusterStatus::Manager);

        Ok(ClusterToken::new(state.worker_token.clone(), NodeRole::Worker))
    }

    async fn join(&self, token: &ClusterToken, manager_endpoint: &str) -> Result<(), JoinError> {
        let mut state = lock(&self.state);
        if state.members.contains_key(&self.node_id) || self.stuck_pending.load(Ordering::SeqCst) {
            return Err(JoinError::AlreadyMember);
        }

        let expected = match &state.advertise {
            Some(advertise) => endpoint(advertise, DEFAULT_SWARM_PORT),
            None => return Err(JoinError::NetworkError("no swarm manager".to_string())),
        };
        if manager_endpoint != expected {
            return Err(JoinError::NetworkError(format!(
                "{} is not a swarm manager",
                manager_endpoint
            )));
        }

        let status = if token.value() == state.worker_token {
            ClusterStatus::Member
        } else if token.value() == state.manager_token {
            ClusterStatus::Manager
        } else {
            return Err(JoinError::InvalidToken("invalid join token".to_string()));
        };

        if !self.drop_joins.load(Ordering::SeqCst) {
            state.members.insert(self.node_id.clone(), status);
        }
        Ok(())
    }

    async fn current_status(&self) -> Result<ClusterStatus, MusterError> {
        Ok(lock(&self.state)
            .members
            .get(&self.node_id)
            .copied()
            .unwrap_or(ClusterStatus::Unconfigured))
    }

    async fn issue_token(&self, role: NodeRole) -> Result<ClusterToken, MusterError> {
        let state = lock(&self.state);
        if state.members.get(&self.node_id) != Some(&ClusterStatus::Manager) {
            return Err(MusterError::Runtime("this node is not a swarm manager".to_string()));
        }

        let value = match role {
            NodeRole::Worker => state.worker_token.clone(),
            NodeRole::Manager => state.manager_token.clone(),
        };
        Ok(ClusterToken::new(value, role))
    }
}
