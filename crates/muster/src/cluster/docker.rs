//! Docker CLI cluster runtime.
//!
//! Drives `docker swarm` subcommands on the local daemon:
//! - `swarm init --advertise-addr <addr>`
//! - `swarm join --token <token> <host:port>`
//! - `swarm join-token -q <role>`
//! - `info --format ...` for the local swarm state

use async_trait::async_trait;
use muster_common::constants::runtime_markers;
use muster_common::{ClusterStatus, ClusterToken, MusterError, NodeRole};
use std::time::Duration;

use super::{ClusterRuntime, JoinError};
use crate::exec::{self, CommandOutput, ExecError};

const SWARM_STATE_FORMAT: &str = "{{.Swarm.LocalNodeState}} {{.Swarm.ControlAvailable}}";

/// Cluster runtime backed by the local `docker` binary
pub struct DockerCli {
    /// Path or name of the docker binary
    docker_bin: String,
    /// Deadline for every docker invocation
    timeout: Duration,
}

impl DockerCli {
    pub fn new(docker_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            timeout,
        }
    }

    async fn docker(&self, args: &[&str]) -> Result<CommandOutput, ExecError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        exec::run(&self.docker_bin, &args, self.timeout).await
    }
}

#[async_trait]
impl ClusterRuntime for DockerCli {
    async fn initialize(&self, advertise_address: &str) -> Result<ClusterToken, MusterError> {
        let output = self
            .docker(&["swarm", "init", "--advertise-addr", advertise_address])
            .await
            .map_err(|e| MusterError::Runtime(e.to_string()))?;

        if !output.success() {
            let message = output.failure_message();
            if message.contains(runtime_markers::ALREADY_IN_SWARM) {
                return Err(MusterError::AlreadyInitialized);
            }
            return Err(MusterError::Runtime(format!("swarm init failed: {}", message)));
        }

        tracing::info!(advertise = %advertise_address, "Swarm initialized");
        self.issue_token(NodeRole::Worker).await
    }

    async fn join(&self, token: &ClusterToken, manager_endpoint: &str) -> Result<(), JoinError> {
        let output = self
            .docker(&["swarm", "join", "--token", token.value(), manager_endpoint])
            .await
            .map_err(|e| match e {
                ExecError::TimedOut { .. } => JoinError::Timeout(e.to_string()),
                ExecError::Io { .. } => JoinError::NetworkError(e.to_string()),
            })?;

        if output.success() {
            Ok(())
        } else {
            Err(classify_join_failure(&output.failure_message()))
        }
    }

    async fn current_status(&self) -> Result<ClusterStatus, MusterError> {
        let output = self
            .docker(&["info", "--format", SWARM_STATE_FORMAT])
            .await
            .map_err(|e| MusterError::Runtime(e.to_string()))?;

        if !output.success() {
            return Err(MusterError::Runtime(format!(
                "docker info failed: {}",
                output.failure_message()
            )));
        }

        parse_swarm_state(&output.stdout)
    }

    async fn issue_token(&self, role: NodeRole) -> Result<ClusterToken, MusterError> {
        let output = self
            .docker(&["swarm", "join-token", "-q", role.as_str()])
            .await
            .map_err(|e| MusterError::Runtime(e.to_string()))?;

        if !output.success() {
            let message = output.failure_message();
            if message.to_ascii_lowercase().contains(runtime_markers::NOT_A_MANAGER) {
                return Err(MusterError::Runtime(format!(
                    "cannot issue {} token: this node is not a swarm manager",
                    role
                )));
            }
            return Err(MusterError::Runtime(format!("join-token failed: {}", message)));
        }
        if output.stdout.is_empty() {
            return Err(MusterError::Runtime("join-token returned no token".to_string()));
        }

        Ok(ClusterToken::new(output.stdout, role))
    }
}

/// Map `docker swarm join` stderr onto a join failure reason
fn classify_join_failure(message: &str) -> JoinError {
    let lower = message.to_ascii_lowercase();

    if lower.contains(runtime_markers::ALREADY_IN_SWARM) {
        JoinError::AlreadyMember
    } else if lower.contains(runtime_markers::INVALID_TOKEN) {
        JoinError::InvalidToken(message.to_string())
    } else if lower.contains(runtime_markers::DEADLINE_EXCEEDED)
        || lower.contains(runtime_markers::TIMEOUT)
    {
        JoinError::Timeout(message.to_string())
    } else if lower.contains(runtime_markers::TOKEN_REJECTED) {
        JoinError::InvalidToken(message.to_string())
    } else {
        JoinError::NetworkError(message.to_string())
    }
}

/// Parse `"<LocalNodeState> <ControlAvailable>"` from `docker info`
fn parse_swarm_state(output: &str) -> Result<ClusterStatus, MusterError> {
    let mut parts = output.split_whitespace();
    let state = parts.next().unwrap_or_default();
    let control = parts.next().unwrap_or("false");

    match state {
        "active" if control == "true" => Ok(ClusterStatus::Manager),
        "active" => Ok(ClusterStatus::Member),
        "inactive" | "pending" | "error" => Ok(ClusterStatus::Unconfigured),
        "locked" => Err(MusterError::Runtime(
            "swarm is locked; unlock it with `docker swarm unlock`".to_string(),
        )),
        other => Err(MusterError::Runtime(format!(
            "unrecognized swarm state '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_swarm_state() {
        assert_eq!(parse_swarm_state("active true").unwrap(), ClusterStatus::Manager);
        assert_eq!(parse_swarm_state("active false").unwrap(), ClusterStatus::Member);
        assert_eq!(
            parse_swarm_state("inactive false").unwrap(),
            ClusterStatus::Unconfigured
        );
        assert!(parse_swarm_state("").is_err());
    }

    #[test]
    fn test_locked_swarm_is_reported() {
        match parse_swarm_state("locked false") {
            Err(MusterError::Runtime(reason)) => assert!(reason.contains("swarm is locked")),
            other => panic!("expected locked error, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_already_member() {
        let err = classify_join_failure(
            "Error response from daemon: This node is already part of a swarm. Use \"docker swarm leave\" to leave this swarm and join another one.",
        );
        assert_eq!(err, JoinError::AlreadyMember);
    }

    #[test]
    fn test_classify_invalid_token() {
        let err = classify_join_failure(
            "Error response from daemon: rpc error: code = InvalidArgument desc = A valid join token is necessary to join this cluster",
        );
        assert!(matches!(err, JoinError::InvalidToken(_)));

        let err = classify_join_failure("Error response from daemon: invalid join token");
        assert!(matches!(err, JoinError::InvalidToken(_)));
    }

    #[test]
    fn test_classify_timeout_and_network() {
        let err = classify_join_failure(
            "Error response from daemon: Timeout was reached before node joined.",
        );
        assert!(matches!(err, JoinError::Timeout(_)));

        let err = classify_join_failure(
            "Error response from daemon: rpc error: code = Unavailable desc = connection refused",
        );
        assert!(matches!(err, JoinError::NetworkError(_)));
    }

    #[tokio::test]
    async fn test_missing_docker_binary_is_runtime_error() {
        let cli = DockerCli::new("muster-no-such-docker", Duration::from_secs(5));

        assert!(matches!(
            cli.current_status().await,
            Err(MusterError::Runtime(_))
        ));

        let token = ClusterToken::new("SWMTKN-1-abc", NodeRole::Worker);
        assert!(matches!(
            cli.join(&token, "10.0.1.5:2377").await,
            Err(JoinError::NetworkError(_))
        ));
    }
}
