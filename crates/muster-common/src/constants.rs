//! Shared constants for Muster components.

/// Docker Swarm cluster management port
pub const DEFAULT_SWARM_PORT: u16 = 2377;

/// Docker remote API port used by the direct runtime token backend
pub const DEFAULT_DOCKER_API_PORT: u16 = 2375;

/// Global attempt budget for a joining node
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Fixed pause between join attempts
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 30;

/// TCP connect timeout for reachability probes and SSH
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Upper bound for any single runtime or remote command
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

/// Docker CLI binary
pub const DEFAULT_DOCKER_BIN: &str = "docker";

/// Shared directory for published join tokens
pub const DEFAULT_TOKEN_DIR: &str = "/var/lib/muster";

/// Remote principal for SSH token pulls
pub const DEFAULT_SSH_USER: &str = "ubuntu";

/// Command executed on the manager by the SSH token backend
pub const DEFAULT_SSH_TOKEN_COMMAND: &str = "docker swarm join-token -q worker";

/// Token file names inside the token directory
pub mod token_files {
    /// Worker join token: {dir}/worker.token
    pub const WORKER: &str = "worker.token";

    /// Manager join token: {dir}/manager.token
    pub const MANAGER: &str = "manager.token";
}

/// Process exit codes reported by the node agent
pub mod exit_codes {
    /// Node is a member, or the manager was initialized
    pub const SUCCESS: u8 = 0;

    /// Bootstrap failed after exhausting its budget, or was cancelled
    pub const FAILED: u8 = 1;

    /// Configuration was rejected before any work started
    pub const INVALID_CONFIG: u8 = 2;
}

/// Substrings of Docker CLI stderr used to classify runtime failures
pub mod runtime_markers {
    pub const ALREADY_IN_SWARM: &str = "already part of a swarm";
    pub const INVALID_TOKEN: &str = "invalid join token";
    pub const TOKEN_REJECTED: &str = "token";
    pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";
    pub const TIMEOUT: &str = "timeout";
    pub const NOT_A_MANAGER: &str = "not a swarm manager";
}
