//! SSH token pull: runs a command on the manager and reads the token from stdout.

use async_trait::async_trait;
use muster_common::{ClusterToken, NodeRole};
use std::time::Duration;

use super::{TokenFetch, TokenSource};
use crate::config::SshConfig;
use crate::exec;

pub struct SshTokenSource {
    config: SshConfig,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshTokenSource {
    pub fn new(config: SshConfig, connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            config,
            connect_timeout,
            command_timeout,
        }
    }

    fn build_args(&self, manager_address: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];

        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        args.push(format!("{}@{}", self.config.user, manager_address));
        args.push(self.config.remote_command.clone());
        args
    }
}

#[async_trait]
impl TokenSource for SshTokenSource {
    fn name(&self) -> &'static str {
        "ssh"
    }

    async fn fetch_token(&self, manager_address: &str) -> TokenFetch {
        let args = self.build_args(manager_address);

        let output = match exec::run("ssh", &args, self.command_timeout).await {
            Ok(output) => output,
            Err(e) => return TokenFetch::NotAvailable(e.to_string()),
        };

        if !output.success() {
            return TokenFetch::NotAvailable(output.failure_message());
        }

        // Login banners may precede the token; it is the last line
        match output.stdout.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
            Some(line) => TokenFetch::Available(ClusterToken::new(line, NodeRole::Worker)),
            None => TokenFetch::NotAvailable("remote command printed no token".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn source(identity: Option<&str>) -> SshTokenSource {
        SshTokenSource::new(
            SshConfig {
                user: "ubuntu".to_string(),
                identity_file: identity.map(PathBuf::from),
                remote_command: "docker swarm join-token -q worker".to_string(),
            },
            Duration::from_secs(10),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_args_without_identity() {
        let args = source(None).build_args("10.0.1.5");

        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(!args.contains(&"-i".to_string()));
        assert_eq!(args[args.len() - 2], "ubuntu@10.0.1.5");
        assert_eq!(args[args.len() - 1], "docker swarm join-token -q worker");
    }

    #[test]
    fn test_args_with_identity() {
        let args = source(Some("/home/ubuntu/.ssh/cluster.pem")).build_args("10.0.1.5");

        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/home/ubuntu/.ssh/cluster.pem");
    }
}
