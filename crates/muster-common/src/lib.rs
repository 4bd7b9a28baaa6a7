//! # Muster Common
//!
//! Shared types, errors, and constants used across Muster components.
//!
//! ## Modules
//! - `types` - Core data structures (ClusterToken, NodeRecord, NodeStatus, etc.)
//! - `error` - Bootstrap error taxonomy
//! - `constants` - Shared defaults and runtime markers

pub mod constants;
pub mod error;
pub mod types;

pub use error::MusterError;
pub use types::*;
