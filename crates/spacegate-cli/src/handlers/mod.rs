//! HTTP request handlers

pub mod data;
pub mod rpc;
pub mod service;

pub use data::*;
pub use rpc::{authenticate, call};
pub use service::*;
