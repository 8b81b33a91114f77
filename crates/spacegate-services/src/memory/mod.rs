//! In-process collaborators for development mode and tests
//!
//! They implement the contracts with plain in-memory state and report domain
//! failures through response statuses, never through `Err`.

mod apps;
mod auth;
mod mesh;
mod ocm;
mod provider;
mod registry;
mod shares;

pub use apps::{MemoryAppProvider, MemoryAppRegistry, MemoryRemoteGateway};
pub use auth::{MemoryAuthProvider, MemoryAuthRegistry};
pub use mesh::{MemoryDataTransfer, MemoryMeshDirectory};
pub use ocm::MemoryOcmShareManager;
pub use provider::{MemoryStorageProvider, SpaceDeletion};
pub use registry::MemoryStorageRegistry;
pub use shares::{MemoryPublicShareManager, MemoryShareManager};

use crate::{Result, Status, WithStatus};

/// Fold a domain failure into the response status
fn respond<R: WithStatus>(result: std::result::Result<R, Status>) -> Result<R> {
    Ok(result.unwrap_or_else(R::from_status))
}
