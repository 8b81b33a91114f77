//! # Spacegate Gateway
//!
//! HTTP server in front of the spacegate gateway engine.
//!
//! This crate provides:
//! - **RPC API**: every gateway operation as `POST /rpc/{Operation}` with JSON bodies
//! - **Authentication**: session tokens minted by `Authenticate`
//! - **Rate Limiting**: per-user request throttling
//! - **Data Gateway**: transfer-token checked proxy to storage data endpoints
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP Clients                      │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                 Spacegate Gateway                   │
//! ├─────────────────────────────────────────────────────┤
//! │  Auth Middleware │ Rate Limiter │ Request Id        │
//! ├────────────────────────────┬────────────────────────┤
//! │     /rpc handlers          │   /data proxy          │
//! ├────────────────────────────┴────────────────────────┤
//! │                  spacegate-core                     │
//! ├─────────────────────────────────────────────────────┤
//! │        spacegate-services (memory or HTTP)          │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{run_server, run_server_with_shutdown, serve};
pub use state::AppState;
