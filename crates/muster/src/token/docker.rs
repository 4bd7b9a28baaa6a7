//! Direct runtime query: asks the manager's Docker API for the worker token.

use async_trait::async_trait;
use muster_common::{ClusterToken, NodeRole};
use std::time::Duration;

use super::{TokenFetch, TokenSource};
use crate::cluster::endpoint;
use crate::exec;

pub struct DockerApiTokenSource {
    docker_bin: String,
    api_port: u16,
    timeout: Duration,
}

impl DockerApiTokenSource {
    pub fn new(docker_bin: String, api_port: u16, timeout: Duration) -> Self {
        Self {
            docker_bin,
            api_port,
            timeout,
        }
    }

    fn build_args(&self, manager_address: &str) -> Vec<String> {
        vec![
            "-H".to_string(),
            format!("tcp://{}", endpoint(manager_address, self.api_port)),
            "swarm".to_string(),
            "join-token".to_string(),
            "-q".to_string(),
            NodeRole::Worker.as_str().to_string(),
        ]
    }
}

#[async_trait]
impl TokenSource for DockerApiTokenSource {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn fetch_token(&self, manager_address: &str) -> TokenFetch {
        let args = self.build_args(manager_address);

        match exec::run(&self.docker_bin, &args, self.timeout).await {
            Ok(output) if output.success() && !output.stdout.is_empty() => {
                TokenFetch::Available(ClusterToken::new(output.stdout, NodeRole::Worker))
            }
            Ok(output) if output.success() => {
                TokenFetch::NotAvailable("manager returned an empty token".to_string())
            }
            Ok(output) => TokenFetch::NotAvailable(output.failure_message()),
            Err(e) => TokenFetch::NotAvailable(e.to_string()),
        }
    }
}
