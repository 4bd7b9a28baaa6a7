//! Join token exchange.
//!
//! Workers fetch the join token through one or more backends, tried in
//! configured order; the manager publishes it through a `TokenPublisher`.
//!
//! Backends:
//! - `file` - shared filesystem (`<dir>/worker.token`)
//! - `ssh` - keyed remote command on the manager
//! - `docker` - the manager's Docker API queried directly

mod docker;
mod file;
mod ssh;

pub use docker::DockerApiTokenSource;
pub use file::FileTokenStore;
pub use ssh::SshTokenSource;

use async_trait::async_trait;
use muster_common::{ClusterToken, MusterError};
use std::sync::Arc;

use crate::config::{BootstrapConfig, TokenBackendKind};

/// Outcome of a token fetch. `NotAvailable` is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenFetch {
    Available(ClusterToken),
    /// No token yet, with the reason
    NotAvailable(String),
}

/// Read side of the token store. Fetching never mutates manager state.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Backend name used in logs and reasons
    fn name(&self) -> &'static str;

    async fn fetch_token(&self, manager_address: &str) -> TokenFetch;
}

/// Write side of the token store, used by the initializing node
#[async_trait]
pub trait TokenPublisher: Send + Sync {
    async fn publish(&self, token: &ClusterToken) -> Result<(), MusterError>;
}

/// Tries each backend in order; the first token wins
pub struct ChainedTokenSource {
    sources: Vec<Arc<dyn TokenSource>>,
}

impl ChainedTokenSource {
    pub fn new(sources: Vec<Arc<dyn TokenSource>>) -> Self {
        Self { sources }
    }

    /// Build the backend chain selected by configuration
    pub fn from_config(config: &BootstrapConfig) -> Self {
        let sources = config
            .token
            .sources
            .iter()
            .map(|kind| -> Arc<dyn TokenSource> {
                match kind {
                    TokenBackendKind::File => Arc::new(FileTokenStore::new(&config.token.file_dir)),
                    TokenBackendKind::Ssh => Arc::new(SshTokenSource::new(
                        config.token.ssh.clone(),
                        config.connect_timeout(),
                        config.command_timeout(),
                    )),
                    TokenBackendKind::Docker => Arc::new(DockerApiTokenSource::new(
                        config.docker_bin.clone(),
                        config.token.docker.api_port,
                        config.command_timeout(),
                    )),
                }
            })
            .collect();

        Self::new(sources)
    }
}

#[async_trait]
impl TokenSource for ChainedTokenSource {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn fetch_token(&self, manager_address: &str) -> TokenFetch {
        let mut reasons = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            match source.fetch_token(manager_address).await {
                TokenFetch::Available(token) => {
                    tracing::debug!(
                        backend = source.name(),
                        token = %token.fingerprint(),
                        "Join token fetched"
                    );
                    return TokenFetch::Available(token);
                }
                TokenFetch::NotAvailable(reason) => {
                    tracing::debug!(backend = source.name(), reason = %reason, "Token backend empty");
                    reasons.push(format!("{}: {}", source.name(), reason));
                }
            }
        }

        if reasons.is_empty() {
            TokenFetch::NotAvailable("no token backends configured".to_string())
        } else {
            TokenFetch::NotAvailable(reasons.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_common::NodeRole;

    struct Fixed(&'static str, Option<&'static str>);

    #[async_trait]
    impl TokenSource for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn fetch_token(&self, _manager_address: &str) -> TokenFetch {
            match self.1 {
                Some(value) => TokenFetch::Available(ClusterToken::new(value, NodeRole::Worker)),
                None => TokenFetch::NotAvailable("nothing here".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_next_backend() {
        let chain = ChainedTokenSource::new(vec![
            Arc::new(Fixed("file", None)),
            Arc::new(Fixed("ssh", Some("SWMTKN-1-from-ssh"))),
            Arc::new(Fixed("docker", Some("SWMTKN-1-from-docker"))),
        ]);

        match chain.fetch_token("10.0.1.5").await {
            TokenFetch::Available(token) => assert_eq!(token.value(), "SWMTKN-1-from-ssh"),
            other => panic!("expected token, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chain_collects_reasons() {
        let chain = ChainedTokenSource::new(vec![
            Arc::new(Fixed("file", None)),
            Arc::new(Fixed("ssh", None)),
        ]);

        match chain.fetch_token("10.0.1.5").await {
            TokenFetch::NotAvailable(reason) => {
                assert!(reason.contains("file: nothing here"));
                assert!(reason.contains("ssh: nothing here"));
            }
            other => panic!("expected NotAvailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_chain_is_not_available() {
        let chain = ChainedTokenSource::new(Vec::new());
        assert!(matches!(
            chain.fetch_token("10.0.1.5").await,
            TokenFetch::NotAvailable(_)
        ));
    }
}
