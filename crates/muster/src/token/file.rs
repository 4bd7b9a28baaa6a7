//! Shared-filesystem token store.
//!
//! The manager writes `<dir>/<role>.token` as JSON; workers read
//! `<dir>/worker.token`. A bare token string (one line) is accepted too.

use async_trait::async_trait;
use muster_common::constants::token_files;
use muster_common::{ClusterToken, MusterError, NodeRole};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{TokenFetch, TokenPublisher, TokenSource};

pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn token_path(&self, role: NodeRole) -> PathBuf {
        match role {
            NodeRole::Worker => self.dir.join(token_files::WORKER),
            NodeRole::Manager => self.dir.join(token_files::MANAGER),
        }
    }
}

#[async_trait]
impl TokenSource for FileTokenStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn fetch_token(&self, _manager_address: &str) -> TokenFetch {
        let path = self.token_path(NodeRole::Worker);

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => parse_token_file(&contents, NodeRole::Worker)
                .map(TokenFetch::Available)
                .unwrap_or_else(|reason| {
                    TokenFetch::NotAvailable(format!("{}: {}", path.display(), reason))
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                TokenFetch::NotAvailable(format!("{} not published yet", path.display()))
            }
            Err(e) => TokenFetch::NotAvailable(format!("{}: {}", path.display(), e)),
        }
    }
}

#[async_trait]
impl TokenPublisher for FileTokenStore {
    async fn publish(&self, token: &ClusterToken) -> Result<(), MusterError> {
        let path = self.token_path(token.role());
        let io_err = |e: std::io::Error| MusterError::Runtime(format!("{}: {}", path.display(), e));

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let data = serde_json::to_vec(token)
            .map_err(|e| MusterError::Runtime(format!("failed to encode token: {}", e)))?;

        // Write-then-rename so readers never observe a partial file
        let tmp = self
            .dir
            .join(format!(".{}.{:08x}.tmp", token.role(), rand::random::<u32>()));

        let written = async {
            write_private(&tmp, &data).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temporary token file");
                }
            }
            return Err(io_err(e));
        }

        tracing::info!(
            path = %path.display(),
            role = %token.role(),
            token = %token.fingerprint(),
            issued_at = token.issued_at(),
            "Join token published"
        );

        Ok(())
    }
}

/// Create `path` readable by the owner only, then write `data` to it
async fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

/// Decode a token file: JSON `ClusterToken`, or a bare token line
fn parse_token_file(contents: &str, expected: NodeRole) -> Result<ClusterToken, String> {
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Err("token file is empty".to_string());
    }

    if trimmed.starts_with('{') {
        let token: ClusterToken =
            serde_json::from_str(trimmed).map_err(|e| format!("malformed token file: {}", e))?;
        if token.role() != expected {
            return Err(format!("expected a {} token, found {}", expected, token.role()));
        }
        if token.value().is_empty() {
            return Err("token file is empty".to_string());
        }
        return Ok(token);
    }

    match trimmed.lines().next() {
        Some(line) if !line.trim().is_empty() => Ok(ClusterToken::new(line, expected)),
        _ => Err("token file is empty".to_string()),
    }
}
