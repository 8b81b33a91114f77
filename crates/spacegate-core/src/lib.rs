//! # Spacegate Core
//!
//! Gateway engine of the spacegate storage gateway.
//!
//! This crate provides:
//! - **Resolver**: routes references to the storage provider serving them
//! - **Caches**: per-user stat, provider lookup and space creation caches
//! - **Spaces**: storage space lifecycle, including personal spaces
//! - **Shares**: share ledger and storage grants kept in step
//! - **Transfers**: signed tokens hiding backend data endpoints
//! - **Federation**: federated shares and calls to partner gateways
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          HTTP / RPC frontend            │
//! ├─────────────────────────────────────────┤
//! │               Gateway                   │
//! ├──────────┬──────────┬───────────────────┤
//! │ Resolver │  Caches  │  Tokens           │
//! ├──────────┴──────────┴───────────────────┤
//! │      ServicePool (collaborators)        │
//! └─────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod federation;
pub mod gateway;
pub mod ocm;
pub mod resolver;
pub mod shares;
pub mod spaces;
pub mod storage;
pub mod token;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use cache::Caches;
pub use config::{CacheConfig, CacheStore, CachesConfig, GatewayConfig};
pub use context::CallContext;
pub use error::{GatewayError, Result};
pub use federation::WebdavTarget;
pub use gateway::Gateway;
pub use resolver::Resolved;
pub use token::{SessionClaims, TokenManager, TransferClaims};
