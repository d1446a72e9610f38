//! Host-supplied strategies
//!
//! Operations that need input from the surrounding application (choosing a
//! processor type, editing a configuration, confirming a remote re-target)
//! go through [`CanvasHandlers`]. Every method defaults to
//! [`CanvasError::Unsupported`], so a host only implements what it offers.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{CanvasError, Result};
use crate::geometry::Point;
use crate::types::{Component, Connectable, ConnectionEntity, CreateRequest};

#[async_trait]
pub trait CanvasHandlers: Send + Sync {
    /// Describe the processor to create at `position`
    async fn processor_creation(&self, _position: Point) -> Result<CreateRequest> {
        Err(CanvasError::Unsupported("processor creation"))
    }

    /// Describe the remote process group to create at `position`
    async fn remote_process_group_creation(&self, _position: Point) -> Result<CreateRequest> {
        Err(CanvasError::Unsupported("remote process group creation"))
    }

    /// Describe the connection to create between two components
    async fn connection_creation(
        &self,
        _source: &Connectable,
        _destination: &Connectable,
    ) -> Result<CreateRequest> {
        Err(CanvasError::Unsupported("connection creation"))
    }

    /// Edit a component; `None` means the user cancelled
    async fn configure_component(&self, _component: &Component) -> Result<Option<Component>> {
        Err(CanvasError::Unsupported("component configuration"))
    }

    /// Confirm pointing a connection at a remote port
    ///
    /// Returns the approved entity, possibly amended, or `None` to cancel.
    async fn confirm_remote_retarget(
        &self,
        _proposed: &ConnectionEntity,
    ) -> Result<Option<ConnectionEntity>> {
        Err(CanvasError::Unsupported("remote connection re-target"))
    }
}

/// Handlers that support nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandlers;

impl CanvasHandlers for DefaultHandlers {}

/// Blocking confirmation shown to the user
pub trait DialogService: Send + Sync {
    fn show_confirmation(&self, title: &str, message: &str);
}

/// Dialog that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDialog;

impl DialogService for NullDialog {
    fn show_confirmation(&self, title: &str, message: &str) {
        log::info!("{}: {}", title, message);
    }
}

/// Dialog that records what it was asked to show
#[derive(Debug, Default)]
pub struct RecordingDialog {
    shown: Mutex<Vec<(String, String)>>,
}

impl RecordingDialog {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(title, message)` pairs in display order
    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.shown.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.lock().is_empty()
    }

    pub fn clear(&self) {
        self.shown.lock().clear();
    }
}

impl DialogService for RecordingDialog {
    fn show_confirmation(&self, title: &str, message: &str) {
        self.shown
            .lock()
            .push((title.to_string(), message.to_string()));
    }
}
