//! Core types shared across Muster components.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::MusterError;

/// Role a node plays in the cluster, and the role a join token grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Initializes the cluster and issues join tokens
    Manager,
    /// Joins an existing cluster
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Worker => "worker",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = MusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manager" => Ok(Self::Manager),
            "worker" => Ok(Self::Worker),
            other => Err(MusterError::Config(format!(
                "unknown role '{}', expected manager or worker",
                other
            ))),
        }
    }
}

/// Opaque join secret issued by the initializing node.
///
/// The secret never appears in `Debug` output; logs use [`ClusterToken::fingerprint`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterToken {
    value: String,
    role: NodeRole,
    /// Issue timestamp (Unix epoch seconds)
    issued_at: i64,
}

impl ClusterToken {
    pub fn new(value: impl Into<String>, role: NodeRole) -> Self {
        Self::with_issued_at(value, role, chrono::Utc::now().timestamp())
    }

    pub fn with_issued_at(value: impl Into<String>, role: NodeRole, issued_at: i64) -> Self {
        Self {
            value: value.into().trim().to_string(),
            role,
            issued_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Short SHA-256 fingerprint, safe to log
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.value.as_bytes());
        digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for ClusterToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterToken")
            .field("value", &"<redacted>")
            .field("fingerprint", &self.fingerprint())
            .field("role", &self.role)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Lifecycle of a node's bootstrap.
///
/// Transitions are forward-only: `Pending -> Joining -> {Member | Failed}`.
/// A manager goes `Pending -> Member` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    Pending,
    Joining,
    Member,
    Failed,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Member | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Joining => 1,
            Self::Member | Self::Failed => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Joining => "JOINING",
            Self::Member => "MEMBER",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node taking part in the bootstrap, owned by its orchestrator
#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// Node unique identifier
    pub node_id: String,

    /// Role requested by configuration
    pub role: NodeRole,

    /// Private network address of this node
    pub address: String,

    status: NodeStatus,

    join_attempts: u32,

    last_error: Option<MusterError>,
}

impl NodeRecord {
    pub fn new(node_id: impl Into<String>, role: NodeRole, address: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            role,
            address: address.into(),
            status: NodeStatus::Pending,
            join_attempts: 0,
            last_error: None,
        }
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn join_attempts(&self) -> u32 {
        self.join_attempts
    }

    pub fn last_error(&self) -> Option<&MusterError> {
        self.last_error.as_ref()
    }

    /// Move to `next`, refusing regressions and exits from terminal states
    pub fn advance(&mut self, next: NodeStatus) -> Result<(), MusterError> {
        if self.status == next {
            return Ok(());
        }
        if self.status.is_terminal() || next.rank() < self.status.rank() {
            return Err(MusterError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Count a new join attempt
    pub fn begin_attempt(&mut self) -> u32 {
        self.join_attempts += 1;
        self.join_attempts
    }

    pub fn record_error(&mut self, error: MusterError) {
        self.last_error = Some(error);
    }

    /// Terminal failure with the given cause
    pub fn fail(&mut self, error: MusterError) -> Result<(), MusterError> {
        self.record_error(error);
        self.advance(NodeStatus::Failed)
    }
}

/// Cluster state of the local runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    /// Not part of any cluster
    Unconfigured,
    /// Part of a cluster with management rights
    Manager,
    /// Part of a cluster as a plain member
    Member,
}

impl ClusterStatus {
    pub fn is_clustered(&self) -> bool {
        !matches!(self, Self::Unconfigured)
    }
}
