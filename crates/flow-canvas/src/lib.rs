//! Flow Canvas - graph engine for a visual flow designer
//!
//! This crate holds the live model behind a node/edge canvas of
//! processors, funnels, remote process groups and connections. It supports:
//!
//! - Reconciling server snapshots with optimistic local edits
//! - Connection routing, bend editing, endpoint re-targeting and labels
//! - Viewport zoom/pan, fit, actual size and visibility culling
//! - Periodic refresh of the whole process group
//!
//! # Architecture
//!
//! - `EntityManager`: one collection per entity type, guarded by revisions
//!   and the recently added/removed caches
//! - `ConnectionManager`: routes and interactive geometry for connections
//! - `GraphState`: the four managers plus cross-type operations
//! - `Viewport`: scale/translate state and its persistence
//! - `Canvas`: lifecycle, polling and persistence through a `FlowApi`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use flow_canvas::{Canvas, InMemoryFlowApi, Permissions, Point};
//!
//! let api = Arc::new(InMemoryFlowApi::new());
//! api.insert_group("root", Permissions::FULL);
//!
//! let canvas = Canvas::new(api);
//! canvas.load("root").await?;
//! let funnel = canvas.create_funnel(Point::new(100.0, 100.0)).await?;
//! ```

pub mod api;
pub mod cache;
pub mod canvas;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod geometry;
pub mod graph;
pub mod handlers;
pub mod manager;
pub mod revision;
pub mod types;
pub mod viewport;

// Re-export key types
pub use api::{FlowApi, InMemoryFlowApi};
pub use canvas::{Canvas, CanvasBuilder, CanvasStatus};
pub use config::CanvasConfig;
pub use error::{ApiError, ApiErrorKind, CanvasError, Result};
pub use events::{CanvasEvents, EventBus};
pub use geometry::{Point, Rect, Shape};
pub use graph::GraphState;
pub use handlers::{CanvasHandlers, DefaultHandlers, DialogService, NullDialog, RecordingDialog};
pub use manager::{ConnectionManager, EntityManager, Snapshot};
pub use revision::{is_newer_revision, Revision};
pub use types::{
    Component, ComponentKind, ComponentRef, Connectable, ConnectableKind, ConnectionEntity,
    CreateRequest, FunnelEntity, Permissions, ProcessGroupContents, ProcessorEntity,
    RemoteProcessGroupEntity, VersionInfo,
};
pub use viewport::{FileViewportStore, MemoryViewportStore, Viewport, ViewportStore};
