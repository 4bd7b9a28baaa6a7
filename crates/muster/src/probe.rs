//! Reachability prober.
//!
//! A single bounded TCP connect used as a fast-fail gate before token
//! fetches and join attempts. Retrying is the caller's business.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    /// Not reachable, with the reason (refused, timed out, unresolvable)
    Unreachable(String),
}

/// Network connectivity check against a host and port
#[async_trait]
pub trait ReachabilityProber: Send + Sync {
    async fn probe(&self, address: &str, port: u16, timeout: Duration) -> Reachability;
}

/// Probes by opening (and immediately dropping) a TCP connection
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl ReachabilityProber for TcpProber {
    async fn probe(&self, address: &str, port: u16, timeout: Duration) -> Reachability {
        match tokio::time::timeout(timeout, TcpStream::connect((address, port))).await {
            Ok(Ok(_stream)) => {
                tracing::trace!(address = %address, port, "Probe succeeded");
                Reachability::Reachable
            }
            Ok(Err(e)) => Reachability::Unreachable(format!("{}:{}: {}", address, port, e)),
            Err(_) => Reachability::Unreachable(format!(
                "{}:{}: connect timed out after {}s",
                address,
                port,
                timeout.as_secs()
            )),
        }
    }
}
