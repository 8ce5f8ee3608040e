pub mod api;
pub mod types;
pub mod vault;

use async_trait::async_trait;
use serde_json::Value;

use crate::query::{Query, Row};
use types::*;

pub use api::VaultApiClient;

/// Raw authenticated access to the vault REST API.
///
/// Implementations never panic on remote failure; every problem comes back
/// as a [`CallError`].
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Issue a call against an absolute API path (`/api/...`).
    async fn call(&self, method: HttpMethod, path: &str, params: &Params) -> CallResult<Value>;
}

/// Read-only record queries used by candidate discovery.
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn query(&self, query: &Query) -> CallResult<Vec<Row>>;
}

/// Lookup of users currently assigned to a role on a document version.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn users_in_role(&self, version: &DocumentVersionId, role: &str) -> CallResult<Vec<String>>;
}
