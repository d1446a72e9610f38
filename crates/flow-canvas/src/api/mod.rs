//! Contract with the flow collaborator
//!
//! The canvas never talks to a transport directly. Every suspension point
//! is a call on [`FlowApi`], which resolves with server data or fails with
//! an [`ApiError`].

pub mod memory;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::revision::Revision;
use crate::types::{Component, ComponentRef, CreateRequest, ProcessGroupFlow, VersionInfo};

pub use memory::InMemoryFlowApi;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Create/read/update/delete against the flow collaborator
#[async_trait]
pub trait FlowApi: Send + Sync {
    // ─── READ ───────────────────────────────────────────────────────

    /// Full snapshot of a process group
    async fn get_flow(&self, group_id: &str) -> ApiResult<ProcessGroupFlow>;

    /// Publication state of a process group
    async fn get_version_info(&self, group_id: &str) -> ApiResult<VersionInfo>;

    /// Current copy of a single component
    async fn get_component(&self, component: &ComponentRef) -> ApiResult<Component>;

    // ─── WRITE ──────────────────────────────────────────────────────

    /// Create a component in `group_id`
    async fn create_component(&self, group_id: &str, request: CreateRequest) -> ApiResult<Component>;

    /// Replace a component; `component.revision` must match the stored one
    async fn update_component(&self, component: Component) -> ApiResult<Component>;

    /// Delete a component at `revision`
    async fn remove_component(&self, component: &ComponentRef, revision: &Revision) -> ApiResult<()>;
}
