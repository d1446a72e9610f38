//! Canvas orchestrator
//!
//! [`Canvas`] ties the graph, the viewport and the flow collaborator
//! together. It moves through `Uninitialized -> Loading -> Ready`, refreshes
//! the whole process group on a polling interval once ready, and turns user
//! gestures into optimistic local edits followed by persistence, rolling
//! back when persistence fails.
//!
//! Graph state sits behind a `parking_lot::Mutex`. No lock is ever held
//! across an `.await`: every collaborator call happens between two short
//! critical sections.

use std::sync::{Arc, Weak};

use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::api::FlowApi;
use crate::config::CanvasConfig;
use crate::error::{CanvasError, Result};
use crate::events::CanvasEvents;
use crate::geometry::{Point, Rect};
use crate::graph::{DragPlan, GraphState};
use crate::handlers::{CanvasHandlers, DefaultHandlers, DialogService, NullDialog};
use crate::manager::connection::{GeometryEdit, Retarget, SelfLoopOffsets};
use crate::manager::{AddOptions, SetOptions, SetOutcome};
use crate::types::{
    Component, ComponentKind, ComponentRef, Connectable, ConnectionEntity, CreateRequest,
    Permissions, ProcessGroupContents, VersionInfo,
};
use crate::viewport::{MemoryViewportStore, Viewport, ViewportStore};

/// Lifecycle of a canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanvasStatus {
    #[default]
    Uninitialized,
    Loading,
    Ready,
}

/// Process-group metadata tracked alongside the graph
#[derive(Debug, Clone, Default)]
struct Meta {
    status: CanvasStatus,
    permissions: Permissions,
    version_info: Option<VersionInfo>,
}

struct Inner {
    api: Arc<dyn FlowApi>,
    handlers: Arc<dyn CanvasHandlers>,
    dialog: Arc<dyn DialogService>,
    store: Arc<dyn ViewportStore>,
    config: CanvasConfig,
    graph: Mutex<GraphState>,
    viewport: Mutex<Viewport>,
    meta: Mutex<Meta>,
    polling: Mutex<Option<JoinHandle<()>>>,
    events: CanvasEvents,
}

/// Builder for [`Canvas`]
pub struct CanvasBuilder {
    api: Arc<dyn FlowApi>,
    handlers: Arc<dyn CanvasHandlers>,
    dialog: Arc<dyn DialogService>,
    store: Arc<dyn ViewportStore>,
    config: CanvasConfig,
}

impl CanvasBuilder {
    pub fn handlers(mut self, handlers: Arc<dyn CanvasHandlers>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn dialog(mut self, dialog: Arc<dyn DialogService>) -> Self {
        self.dialog = dialog;
        self
    }

    pub fn viewport_store(mut self, store: Arc<dyn ViewportStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(mut self, config: CanvasConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Canvas {
        let offsets = SelfLoopOffsets {
            x: self.config.self_loop_x_offset,
            y: self.config.self_loop_y_offset,
        };
        Canvas {
            inner: Arc::new(Inner {
                api: self.api,
                handlers: self.handlers,
                dialog: self.dialog,
                store: self.store,
                graph: Mutex::new(GraphState::new(String::new(), offsets)),
                viewport: Mutex::new(Viewport::new(&self.config)),
                meta: Mutex::new(Meta::default()),
                polling: Mutex::new(None),
                events: CanvasEvents::new(),
                config: self.config,
            }),
        }
    }
}

/// Handle to an editor session; clones share the same session
#[derive(Clone)]
pub struct Canvas {
    inner: Arc<Inner>,
}

impl Canvas {
    pub fn builder(api: Arc<dyn FlowApi>) -> CanvasBuilder {
        CanvasBuilder {
            api,
            handlers: Arc::new(DefaultHandlers),
            dialog: Arc::new(NullDialog),
            store: Arc::new(MemoryViewportStore::new()),
            config: CanvasConfig::default(),
        }
    }

    pub fn new(api: Arc<dyn FlowApi>) -> Self {
        Self::builder(api).build()
    }

    // ─── STATE ──────────────────────────────────────────────────────

    pub fn status(&self) -> CanvasStatus {
        self.inner.meta.lock().status
    }

    pub fn group_id(&self) -> String {
        self.inner.graph.lock().group_id().to_string()
    }

    pub fn permissions(&self) -> Permissions {
        self.inner.meta.lock().permissions
    }

    pub fn version_info(&self) -> Option<VersionInfo> {
        self.inner.meta.lock().version_info.clone()
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &CanvasEvents {
        &self.inner.events
    }

    /// Read access to the graph
    pub fn with_graph<R>(&self, f: impl FnOnce(&GraphState) -> R) -> R {
        f(&self.inner.graph.lock())
    }

    pub fn viewport(&self) -> Viewport {
        self.inner.viewport.lock().clone()
    }

    /// Copy of a live component
    pub fn get(&self, component: &ComponentRef) -> Option<Component> {
        self.inner.graph.lock().get(component)
    }

    // ─── LIFECYCLE ──────────────────────────────────────────────────

    /// Load `group_id` and become ready
    ///
    /// The persisted viewport is restored, falling back to fitting the
    /// graph. Polling starts when the configuration asks for it.
    pub async fn load(&self, group_id: &str) -> Result<()> {
        self.stop_polling();
        self.inner.meta.lock().status = CanvasStatus::Loading;
        self.inner.graph.lock().reset(group_id);
        log::info!("Loading process group '{}'", group_id);

        if let Err(e) = self.refresh().await {
            self.inner.meta.lock().status = CanvasStatus::Uninitialized;
            self.report("Unable to load the flow", &e);
            return Err(e);
        }

        let bounds = self.inner.graph.lock().graph_bounds();
        let key = self.inner.config.view_key(group_id);
        self.inner
            .viewport
            .lock()
            .restore(self.inner.store.as_ref(), &key, bounds);
        self.update_visibility();

        self.inner.meta.lock().status = CanvasStatus::Ready;
        log::info!("Process group '{}' ready", group_id);

        if self.inner.config.auto_poll {
            self.start_polling();
        }
        Ok(())
    }

    /// Fetch the whole process group and reconcile it
    ///
    /// The fetch start time is the cache cutoff: local mutations stamped
    /// before it are already reflected in the response.
    pub async fn refresh(&self) -> Result<SetOutcome> {
        let group_id = self.group_id();
        let cutoff = Utc::now();
        let flow = self.inner.api.get_flow(&group_id).await?;

        let outcome = {
            let mut graph = self.inner.graph.lock();
            if graph.group_id() != flow.id {
                log::debug!("Discarding snapshot of '{}': canvas moved on", flow.id);
                return Ok(SetOutcome::default());
            }
            graph.set(flow.flow, Some(cutoff), SetOptions::default())
        };

        {
            let mut meta = self.inner.meta.lock();
            meta.permissions = flow.permissions;
            if flow.version_info.is_some() {
                meta.version_info = flow.version_info;
            }
        }
        if outcome.mutated() {
            self.update_visibility();
        }
        Ok(outcome)
    }

    /// Refresh only the publication state
    pub async fn refresh_version_info(&self) -> Result<VersionInfo> {
        let group_id = self.group_id();
        let info = self.inner.api.get_version_info(&group_id).await?;
        self.inner.meta.lock().version_info = Some(info.clone());
        Ok(info)
    }

    /// Start the polling task; returns false if it is already running
    pub fn start_polling(&self) -> bool {
        let mut polling = self.inner.polling.lock();
        if polling.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return false;
        }

        let interval = self.inner.config.polling_interval();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        *polling = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let canvas = Canvas { inner };
                if let Err(e) = canvas.refresh().await {
                    log::warn!("Polling refresh failed: {}", e);
                }
            }
        }));
        log::info!("Polling every {:?}", interval);
        true
    }

    pub fn stop_polling(&self) -> bool {
        match self.inner.polling.lock().take() {
            Some(handle) => {
                handle.abort();
                log::info!("Polling stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.inner
            .polling
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop polling, end every event stream and release the graph
    pub fn destroy(&self) {
        self.stop_polling();
        self.inner.events.close();
        self.inner.graph.lock().clear();
        *self.inner.meta.lock() = Meta::default();
        log::info!("Canvas destroyed");
    }

    // ─── ENTITIES ───────────────────────────────────────────────────

    /// Create a positioned component of `kind` at `position`
    ///
    /// Funnels need no input; the other kinds ask the host handlers.
    pub async fn create_by_type(&self, kind: ComponentKind, position: Point) -> Result<Component> {
        let request = match kind {
            ComponentKind::Funnel => Ok(CreateRequest::Funnel { position }),
            ComponentKind::Processor => self.inner.handlers.processor_creation(position).await,
            ComponentKind::RemoteProcessGroup => {
                self.inner
                    .handlers
                    .remote_process_group_creation(position)
                    .await
            }
            ComponentKind::Connection => Err(CanvasError::InvalidState(
                "Connections are created between two components".to_string(),
            )),
        };
        match request {
            Ok(request) => self.create(request).await,
            Err(e) => {
                self.report("Unable to create component", &e);
                Err(e)
            }
        }
    }

    pub async fn create_funnel(&self, position: Point) -> Result<Component> {
        self.create_by_type(ComponentKind::Funnel, position).await
    }

    /// Connect two components, asking the host for the details
    pub async fn create_connection(&self, source: Connectable, destination: Connectable) -> Result<Component> {
        if !destination.kind.accepts_incoming() {
            let e = CanvasError::InvalidDropTarget(format!(
                "{:?} '{}' cannot receive connections",
                destination.kind, destination.id
            ));
            self.report("Unable to create connection", &e);
            return Err(e);
        }
        match self
            .inner
            .handlers
            .connection_creation(&source, &destination)
            .await
        {
            Ok(request) => self.create(request).await,
            Err(e) => {
                self.report("Unable to create connection", &e);
                Err(e)
            }
        }
    }

    /// Submit a creation request and add the result
    pub async fn create(&self, request: CreateRequest) -> Result<Component> {
        let group_id = self.group_id();
        let created = match self.inner.api.create_component(&group_id, request).await {
            Ok(created) => created,
            Err(e) => {
                let e = CanvasError::from(e);
                self.report("Unable to create component", &e);
                return Err(e);
            }
        };

        self.inner.graph.lock().add(
            ProcessGroupContents::from(created.clone()),
            Utc::now(),
            AddOptions { select_all: true },
        );
        self.update_visibility();

        if let Component::Connection(connection) = &created {
            let (source, destination) = (
                connection.source_terminal().to_string(),
                connection.destination_terminal().to_string(),
            );
            self.reload_component_source_and_destination(&source, &destination)
                .await;
        }

        self.inner.events.component_created.emit(created.clone());
        self.inner
            .events
            .process_group_listing_changed
            .emit(group_id);
        Ok(created)
    }

    pub fn select(&self, id: &str) -> Result<ComponentRef> {
        let component = {
            let mut graph = self.inner.graph.lock();
            let kind = graph
                .kind_of(id)
                .ok_or_else(|| CanvasError::UnknownComponent(id.to_string()))?;
            graph.select(id);
            ComponentRef::new(kind, id)
        };
        self.inner.events.component_selected.emit(component.clone());
        Ok(component)
    }

    pub fn deselect(&self, id: &str) -> Option<ComponentRef> {
        let component = {
            let mut graph = self.inner.graph.lock();
            let kind = graph.kind_of(id)?;
            if !graph.deselect(id) {
                return None;
            }
            ComponentRef::new(kind, id)
        };
        self.inner
            .events
            .component_deselected
            .emit(component.clone());
        Some(component)
    }

    pub fn clear_selection(&self) -> Vec<ComponentRef> {
        let cleared = {
            let mut graph = self.inner.graph.lock();
            let selection = graph.selection();
            graph.clear_selection();
            selection
        };
        for component in &cleared {
            self.inner
                .events
                .component_deselected
                .emit(component.clone());
        }
        cleared
    }

    pub fn selection(&self) -> Vec<ComponentRef> {
        self.inner.graph.lock().selection()
    }

    /// Navigate into a child process group
    pub fn select_group(&self, group_id: &str) {
        self.inner.events.group_selected.emit(group_id.to_string());
    }

    /// Let the host edit a component and persist the result
    ///
    /// Returns `None` when the host cancelled.
    pub async fn configure(&self, component: &ComponentRef) -> Result<Option<Component>> {
        let current = self
            .get(component)
            .ok_or_else(|| CanvasError::UnknownComponent(component.id.clone()))?;

        if !current.permissions().can_write {
            let e = CanvasError::denied(format!(
                "Not authorized to modify {} '{}'",
                component.kind, component.id
            ));
            self.report("Unable to configure component", &e);
            return Err(e);
        }

        let edited = match self.inner.handlers.configure_component(&current).await {
            Ok(Some(edited)) => edited,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.report("Unable to configure component", &e);
                return Err(e);
            }
        };

        let updated = self.persist(edited, "Unable to configure component").await?;
        if let Component::Connection(connection) = &updated {
            let (source, destination) = (
                connection.source_terminal().to_string(),
                connection.destination_terminal().to_string(),
            );
            self.reload_component_source_and_destination(&source, &destination)
                .await;
        }
        self.inner
            .events
            .component_configured
            .emit(updated.clone());
        Ok(Some(updated))
    }

    /// Delete components, cascading to their connections
    ///
    /// Deletions are issued concurrently. Components whose deletion
    /// succeeded are removed locally even when others failed; the first
    /// failure is reported and returned.
    pub async fn delete(&self, components: &[ComponentRef]) -> Result<Vec<Component>> {
        let targets: Vec<Component> = {
            let graph = self.inner.graph.lock();
            components.iter().filter_map(|c| graph.get(c)).collect()
        };
        if let Some(locked) = targets.iter().find(|c| !c.permissions().can_write) {
            let e = CanvasError::denied(format!(
                "Not authorized to delete {} '{}'",
                locked.kind(),
                locked.id()
            ));
            self.report("Unable to delete", &e);
            return Err(e);
        }

        // Connections attached to a deleted component go with it
        let positioned: Vec<String> = targets
            .iter()
            .filter(|c| c.kind() != ComponentKind::Connection)
            .map(|c| c.id().to_string())
            .collect();
        let targets: Vec<Component> = targets
            .into_iter()
            .filter(|c| match c {
                Component::Connection(connection) => {
                    !positioned.iter().any(|id| connection.touches(id))
                }
                _ => true,
            })
            .collect();

        let api = &self.inner.api;
        let results = join_all(targets.iter().map(|c| {
            let component = c.to_ref();
            async move {
                let result = api.remove_component(&component, c.revision()).await;
                (component, result)
            }
        }))
        .await;

        let mut deleted = Vec::new();
        let mut failure = None;
        for (component, result) in results {
            match result {
                Ok(()) => deleted.push(component),
                Err(e) => {
                    log::warn!("Failed to delete {} '{}': {}", component.kind, component.id, e);
                    failure.get_or_insert(CanvasError::from(e));
                }
            }
        }

        let removed = self.inner.graph.lock().remove(&deleted, Utc::now());
        self.update_visibility();

        // Neighbours of removed connections lose an outgoing relationship
        let mut neighbours = Vec::new();
        for component in &removed {
            if let Component::Connection(c) = component {
                neighbours.push((
                    c.source_terminal().to_string(),
                    c.destination_terminal().to_string(),
                ));
            }
        }
        for (source, destination) in neighbours {
            self.reload_component_source_and_destination(&source, &destination)
                .await;
        }

        if !removed.is_empty() {
            self.inner
                .events
                .process_group_listing_changed
                .emit(self.group_id());
        }

        match failure {
            Some(e) => {
                self.report("Unable to delete", &e);
                Err(e)
            }
            None => Ok(removed),
        }
    }

    /// Replace a live component with the collaborator's copy
    pub async fn reload(&self, component: &ComponentRef) -> Result<Component> {
        if !self.inner.graph.lock().contains(component) {
            return Err(CanvasError::UnknownComponent(component.id.clone()));
        }
        let fresh = self.inner.api.get_component(component).await?;
        self.inner
            .graph
            .lock()
            .set_component(fresh.clone(), SetOptions::authoritative());
        Ok(fresh)
    }

    /// Reload the components at either end of a connection
    ///
    /// Ids not held locally are skipped; failures are logged.
    pub async fn reload_component_source_and_destination(&self, source_id: &str, destination_id: &str) {
        let targets: Vec<ComponentRef> = {
            let graph = self.inner.graph.lock();
            let mut ids = vec![source_id];
            if destination_id != source_id {
                ids.push(destination_id);
            }
            ids.into_iter()
                .filter_map(|id| graph.kind_of(id).map(|kind| ComponentRef::new(kind, id)))
                .filter(|c| c.kind != ComponentKind::Connection)
                .collect()
        };

        let results = join_all(targets.iter().map(|c| self.reload(c))).await;
        for (component, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                log::warn!("Failed to reload {} '{}': {}", component.kind, component.id, e);
            }
        }
    }

    // ─── DRAG ───────────────────────────────────────────────────────

    /// Move the selection by `(dx, dy)` and persist every moved entity
    ///
    /// Entities whose update fails snap back to their previous geometry.
    pub async fn drag_selection(&self, dx: f64, dy: f64) -> Result<()> {
        let plan = self.inner.graph.lock().drag_selection(dx, dy);
        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                self.report("Unable to move selection", &e);
                return Err(e);
            }
        };
        if plan.is_empty() {
            return Ok(());
        }

        let api = &self.inner.api;
        let results = join_all(plan.moves.iter().map(|m| api.update_component(m.proposed()))).await;

        let mut failed = DragPlan::default();
        let mut failure = None;
        let mut updated = Vec::new();
        for (step, result) in plan.moves.iter().zip(results) {
            match result {
                Ok(component) => updated.push(component),
                Err(e) => {
                    log::warn!("Failed to persist move of '{}': {}", step.id(), e);
                    failed.moves.push(step.clone());
                    failure.get_or_insert(CanvasError::from(e));
                }
            }
        }

        {
            let mut graph = self.inner.graph.lock();
            for component in updated {
                graph.set_component(component, SetOptions::authoritative());
            }
            if !failed.is_empty() {
                graph.rollback(&failed);
            }
            let moved = plan.moved_component_ids();
            let (connections, shapes) = graph.split();
            connections.refresh_touching(&moved, &shapes);
        }
        self.update_visibility();

        match failure {
            Some(e) => {
                self.report("Unable to move selection", &e);
                Err(e)
            }
            None => Ok(()),
        }
    }

    // ─── CONNECTION GEOMETRY ────────────────────────────────────────

    /// Add a bend on the segment nearest `point`
    pub async fn insert_bend(&self, connection_id: &str, point: Point) -> Result<ConnectionEntity> {
        let edit = {
            let mut graph = self.inner.graph.lock();
            let (connections, shapes) = graph.split();
            connections.insert_bend(connection_id, point, &shapes)
        };
        match edit {
            Ok(edit) => self.persist_geometry(edit).await,
            Err(e) => {
                self.report("Connection", &e);
                Err(e)
            }
        }
    }

    /// Remove the bend at `index`
    pub async fn remove_bend(&self, connection_id: &str, index: usize) -> Result<ConnectionEntity> {
        let edit = {
            let mut graph = self.inner.graph.lock();
            let (connections, shapes) = graph.split();
            connections.remove_bend(connection_id, index, &shapes)
        };
        match edit {
            Ok(edit) => self.persist_geometry(edit).await,
            Err(e) => {
                self.report("Connection", &e);
                Err(e)
            }
        }
    }

    pub fn begin_endpoint_drag(&self, connection_id: &str) -> Result<()> {
        self.inner
            .graph
            .lock()
            .split()
            .0
            .begin_endpoint_drag(connection_id)
    }

    pub fn drag_endpoint(&self, connection_id: &str, cursor: Point) {
        let mut graph = self.inner.graph.lock();
        let (connections, shapes) = graph.split();
        connections.drag_endpoint(connection_id, cursor, &shapes);
    }

    /// Drop the dragged endpoint over `target`
    ///
    /// Returns the persisted connection, or `None` when nothing changed.
    /// Remote targets are confirmed by the host first.
    pub async fn drop_endpoint(&self, connection_id: &str, target: Option<Connectable>) -> Result<Option<ConnectionEntity>> {
        let retarget = {
            let mut graph = self.inner.graph.lock();
            let offsets = graph.self_loop_offsets();
            let (connections, shapes) = graph.split();
            connections.drop_endpoint(connection_id, target, offsets, &shapes)
        };

        let (edit, requires_confirmation) = match retarget {
            Ok(Retarget::Reverted) | Ok(Retarget::Unchanged) => return Ok(None),
            Ok(Retarget::Pending {
                edit,
                requires_confirmation,
            }) => (edit, requires_confirmation),
            Err(e) => {
                self.report("Connection", &e);
                return Err(e);
            }
        };

        let edit = if requires_confirmation {
            let decision = self
                .inner
                .handlers
                .confirm_remote_retarget(&edit.proposed)
                .await;
            match decision {
                Ok(Some(approved)) => GeometryEdit {
                    proposed: approved,
                    ..edit
                },
                Ok(None) => {
                    self.restore_geometry(&edit);
                    return Ok(None);
                }
                Err(e) => {
                    self.restore_geometry(&edit);
                    self.report("Connection", &e);
                    return Err(e);
                }
            }
        } else {
            edit
        };

        let previous_destination = edit.previous.destination.clone();
        let persisted = self.persist_geometry(edit).await?;

        let source = persisted.source_terminal().to_string();
        let destination = persisted.destination_terminal().to_string();
        let scope = persisted.parent_group_id.clone();
        self.reload_component_source_and_destination(&source, &destination)
            .await;
        let previous = previous_destination.terminal_id(&scope).to_string();
        if previous != destination {
            self.reload_component_source_and_destination(&previous, &previous)
                .await;
        }
        Ok(Some(persisted))
    }

    pub fn cancel_endpoint_drag(&self, connection_id: &str) {
        let mut graph = self.inner.graph.lock();
        let (connections, shapes) = graph.split();
        connections.cancel_endpoint_drag(connection_id, &shapes);
    }

    pub fn begin_label_drag(&self, connection_id: &str) -> Result<()> {
        self.inner
            .graph
            .lock()
            .split()
            .0
            .begin_label_drag(connection_id)
    }

    pub fn drag_label(&self, connection_id: &str, cursor: Point) -> Option<usize> {
        let mut graph = self.inner.graph.lock();
        let (connections, shapes) = graph.split();
        connections.drag_label(connection_id, cursor, &shapes)
    }

    /// Finish a label drag, persisting the label index if it moved
    pub async fn end_label_drag(&self, connection_id: &str) -> Result<Option<ConnectionEntity>> {
        let edit = self
            .inner
            .graph
            .lock()
            .split()
            .0
            .end_label_drag(connection_id);
        match edit {
            Some(edit) => self.persist_geometry(edit).await.map(Some),
            None => Ok(None),
        }
    }

    // ─── VIEWPORT ───────────────────────────────────────────────────

    pub fn zoom_in(&self) {
        self.inner.viewport.lock().zoom_in();
        self.update_visibility();
        self.end_gesture();
    }

    pub fn zoom_out(&self) {
        self.inner.viewport.lock().zoom_out();
        self.update_visibility();
        self.end_gesture();
    }

    /// Wheel gesture frame
    pub fn zoom_by(&self, factor: f64, around: Point) {
        self.inner.viewport.lock().zoom_by(factor, around);
        self.update_visibility();
    }

    /// Pan gesture frame; only entities crossing the boundary re-render
    pub fn pan_by(&self, dx: f64, dy: f64) {
        self.inner.viewport.lock().pan_by(dx, dy);
        self.update_visibility();
    }

    pub fn set_container(&self, width: f64, height: f64) {
        self.inner.viewport.lock().set_container(width, height);
        self.update_visibility();
    }

    pub fn fit(&self) {
        let bounds = self.inner.graph.lock().graph_bounds();
        self.inner.viewport.lock().fit(bounds);
        self.update_visibility();
        self.end_gesture();
    }

    /// Scale 1, centered on the selection if there is one
    pub fn actual_size(&self) {
        let bounds: Option<Rect> = self.inner.graph.lock().selection_bounds();
        self.inner.viewport.lock().actual_size(bounds);
        self.update_visibility();
        self.end_gesture();
    }

    /// Persist the viewport once a gesture completes
    pub fn end_gesture(&self) {
        let key = self.inner.config.view_key(&self.group_id());
        let result = self
            .inner
            .viewport
            .lock()
            .persist(self.inner.store.as_ref(), &key);
        if let Err(e) = result {
            log::warn!("Failed to persist viewport '{}': {}", key, e);
        }
    }

    /// Re-cull against the viewport and re-render boundary crossers
    pub fn update_visibility(&self) {
        let (window, above_threshold) = {
            let viewport = self.inner.viewport.lock();
            (viewport.culling_window(), viewport.above_render_threshold())
        };
        let mut graph = self.inner.graph.lock();
        graph.update_visibility(&window, above_threshold);
        graph.pan();
    }

    // ─── INTERNAL ───────────────────────────────────────────────────

    /// Update a component and apply the collaborator's answer
    async fn persist(&self, component: Component, title: &str) -> Result<Component> {
        match self.inner.api.update_component(component).await {
            Ok(updated) => {
                self.inner
                    .graph
                    .lock()
                    .set_component(updated.clone(), SetOptions::authoritative());
                Ok(updated)
            }
            Err(e) => {
                let e = CanvasError::from(e);
                self.report(title, &e);
                Err(e)
            }
        }
    }

    async fn persist_geometry(&self, edit: GeometryEdit) -> Result<ConnectionEntity> {
        let proposed = Component::Connection(edit.proposed.clone());
        match self.inner.api.update_component(proposed).await {
            Ok(Component::Connection(updated)) => {
                self.inner.graph.lock().set_component(
                    Component::Connection(updated.clone()),
                    SetOptions::authoritative(),
                );
                Ok(updated)
            }
            Ok(other) => {
                self.restore_geometry(&edit);
                Err(CanvasError::InvalidState(format!(
                    "Expected a connection, got {} '{}'",
                    other.kind(),
                    other.id()
                )))
            }
            Err(e) => {
                self.restore_geometry(&edit);
                let e = CanvasError::from(e);
                self.report("Connection", &e);
                Err(e)
            }
        }
    }

    fn restore_geometry(&self, edit: &GeometryEdit) {
        let mut graph = self.inner.graph.lock();
        let (connections, shapes) = graph.split();
        connections.restore(edit, &shapes);
    }

    /// Surface a failure once, unless a lower layer already did
    fn report(&self, title: &str, error: &CanvasError) {
        if error.prevent_default() {
            log::debug!("{}: {} (already reported)", title, error);
            return;
        }
        self.inner.dialog.show_confirmation(title, &error.to_string());
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.polling.get_mut().take() {
            handle.abort();
        }
    }
}
