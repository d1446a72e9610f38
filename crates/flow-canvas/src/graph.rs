//! In-memory graph of one process group
//!
//! [`GraphState`] owns the four entity managers and performs the
//! operations that cross them: whole-group reconciliation, cascading
//! deletes, visibility updates, selection and dragging. Connections are
//! re-routed whenever a component they attach to changes.

use chrono::{DateTime, Utc};

use crate::error::{CanvasError, Result};
use crate::geometry::{Point, Rect, Shape};
use crate::manager::connection::{Geometry, SelfLoopOffsets, ShapeLookup};
use crate::manager::{
    AddOptions, ConnectionManager, EntityManager, FunnelManager, ProcessorManager,
    RemoteProcessGroupManager, RenderOutcome, Renderable, SetOptions, SetOutcome, Snapshot,
};
use crate::types::{
    Component, ComponentKind, ComponentRef, ConnectionEntity, PositionedEntity,
    ProcessGroupContents,
};

/// Shape lookup over the positioned managers
pub struct Shapes<'a> {
    processors: &'a ProcessorManager,
    funnels: &'a FunnelManager,
    remote_process_groups: &'a RemoteProcessGroupManager,
}

impl ShapeLookup for Shapes<'_> {
    fn shape_of(&self, component_id: &str) -> Option<Shape> {
        self.processors
            .get(component_id)
            .map(PositionedEntity::shape)
            .or_else(|| self.funnels.get(component_id).map(PositionedEntity::shape))
            .or_else(|| {
                self.remote_process_groups
                    .get(component_id)
                    .map(PositionedEntity::shape)
            })
    }
}

/// One component moved by a drag, with what it replaced
#[derive(Debug, Clone, PartialEq)]
pub enum DragMove {
    Component {
        /// Moved entity carrying its current revision
        proposed: Component,
        previous: Point,
    },
    Bends {
        proposed: ConnectionEntity,
        previous: Geometry,
    },
}

impl DragMove {
    pub fn proposed(&self) -> Component {
        match self {
            Self::Component { proposed, .. } => proposed.clone(),
            Self::Bends { proposed, .. } => Component::Connection(proposed.clone()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Component { proposed, .. } => proposed.id(),
            Self::Bends { proposed, .. } => &proposed.id,
        }
    }
}

/// Local result of a drag, kept until persistence settles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DragPlan {
    pub moves: Vec<DragMove>,
}

impl DragPlan {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Ids of the positioned components that moved
    pub fn moved_component_ids(&self) -> Vec<String> {
        self.moves
            .iter()
            .filter_map(|m| match m {
                DragMove::Component { proposed, .. } => Some(proposed.id().to_string()),
                DragMove::Bends { .. } => None,
            })
            .collect()
    }
}

/// Every entity of the current process group
#[derive(Debug)]
pub struct GraphState {
    group_id: String,
    processors: ProcessorManager,
    funnels: FunnelManager,
    remote_process_groups: RemoteProcessGroupManager,
    connections: ConnectionManager,
    offsets: SelfLoopOffsets,
}

impl GraphState {
    pub fn new(group_id: impl Into<String>, offsets: SelfLoopOffsets) -> Self {
        Self {
            group_id: group_id.into(),
            processors: ProcessorManager::new(),
            funnels: FunnelManager::new(),
            remote_process_groups: RemoteProcessGroupManager::new(),
            connections: ConnectionManager::new(),
            offsets,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Switch to another process group, dropping every entity
    pub fn reset(&mut self, group_id: impl Into<String>) {
        self.clear();
        self.group_id = group_id.into();
    }

    pub fn processors(&self) -> &ProcessorManager {
        &self.processors
    }

    pub fn funnels(&self) -> &FunnelManager {
        &self.funnels
    }

    pub fn remote_process_groups(&self) -> &RemoteProcessGroupManager {
        &self.remote_process_groups
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn self_loop_offsets(&self) -> SelfLoopOffsets {
        self.offsets
    }

    pub fn shapes(&self) -> Shapes<'_> {
        Shapes {
            processors: &self.processors,
            funnels: &self.funnels,
            remote_process_groups: &self.remote_process_groups,
        }
    }

    /// Insert freshly created entities
    pub fn add(&mut self, contents: ProcessGroupContents, at: DateTime<Utc>, options: AddOptions) -> RenderOutcome {
        if options.select_all {
            self.clear_selection();
        }

        let mut outcome = RenderOutcome::default();
        let mut positioned = Vec::new();
        positioned.extend(contents.processors.iter().map(|e| e.id.clone()));
        positioned.extend(contents.funnels.iter().map(|e| e.id.clone()));
        positioned.extend(contents.remote_process_groups.iter().map(|e| e.id.clone()));

        outcome.extend(self.processors.add(contents.processors, at, options));
        outcome.extend(self.funnels.add(contents.funnels, at, options));
        outcome.extend(self.remote_process_groups.add(contents.remote_process_groups, at, options));

        let (connections, shapes) = self.split();
        outcome.extend(connections.add(contents.connections, at, options, &shapes));
        outcome.extend(connections.refresh_touching(&positioned, &shapes));
        outcome
    }

    /// Reconcile a full snapshot of the process group
    ///
    /// With a `cutoff`, cache entries stamped before it are expired first:
    /// the snapshot was requested at `cutoff`, so it reflects every
    /// mutation that completed before then.
    pub fn set(&mut self, contents: ProcessGroupContents, cutoff: Option<DateTime<Utc>>, options: SetOptions) -> SetOutcome {
        if let Some(cutoff) = cutoff {
            self.expire_caches(cutoff);
        }

        let mut outcome = SetOutcome::default();
        outcome.extend(self.processors.set(Snapshot::Full(contents.processors), options));
        outcome.extend(self.funnels.set(Snapshot::Full(contents.funnels), options));
        outcome.extend(
            self.remote_process_groups
                .set(Snapshot::Full(contents.remote_process_groups), options),
        );
        let mut positioned = outcome.applied.clone();
        positioned.extend(outcome.removed.iter().cloned());

        let (connections, shapes) = self.split();
        outcome.extend(connections.set(Snapshot::Full(contents.connections), options, &shapes));
        connections.refresh_touching(&positioned, &shapes);

        log::debug!(
            "Reconciled group '{}': {} applied, {} removed, {} stale, {} suppressed",
            self.group_id,
            outcome.applied.len(),
            outcome.removed.len(),
            outcome.stale.len(),
            outcome.suppressed.len()
        );
        outcome
    }

    /// Reconcile a single component without the deletion sweep
    pub fn set_component(&mut self, component: Component, options: SetOptions) -> SetOutcome {
        let id = component.id().to_string();
        let (outcome, positioned) = match component {
            Component::Processor(e) => (self.processors.set(Snapshot::Single(e), options), true),
            Component::Funnel(e) => (self.funnels.set(Snapshot::Single(e), options), true),
            Component::RemoteProcessGroup(e) => (
                self.remote_process_groups.set(Snapshot::Single(e), options),
                true,
            ),
            Component::Connection(e) => {
                let (connections, shapes) = self.split();
                (connections.set(Snapshot::Single(e), options, &shapes), false)
            }
        };

        if positioned && outcome.mutated() {
            let (connections, shapes) = self.split();
            connections.refresh_touching(&[id], &shapes);
        }
        outcome
    }

    pub fn expire_caches(&mut self, cutoff: DateTime<Utc>) -> usize {
        self.processors.expire_caches(cutoff)
            + self.funnels.expire_caches(cutoff)
            + self.remote_process_groups.expire_caches(cutoff)
            + self.connections.expire_caches(cutoff)
    }

    /// Kind of the entity with `id`, if any manager holds it
    pub fn kind_of(&self, id: &str) -> Option<ComponentKind> {
        if self.processors.contains(id) {
            Some(ComponentKind::Processor)
        } else if self.funnels.contains(id) {
            Some(ComponentKind::Funnel)
        } else if self.remote_process_groups.contains(id) {
            Some(ComponentKind::RemoteProcessGroup)
        } else if self.connections.contains(id) {
            Some(ComponentKind::Connection)
        } else {
            None
        }
    }

    pub fn contains(&self, component: &ComponentRef) -> bool {
        self.get(component).is_some()
    }

    /// Copy of the live entity
    pub fn get(&self, component: &ComponentRef) -> Option<Component> {
        let id = component.id.as_str();
        match component.kind {
            ComponentKind::Processor => self.processors.get(id).cloned().map(Component::Processor),
            ComponentKind::Funnel => self.funnels.get(id).cloned().map(Component::Funnel),
            ComponentKind::RemoteProcessGroup => self
                .remote_process_groups
                .get(id)
                .cloned()
                .map(Component::RemoteProcessGroup),
            ComponentKind::Connection => self.connections.get(id).cloned().map(Component::Connection),
        }
    }

    /// Look an entity up by id alone
    pub fn find(&self, id: &str) -> Option<Component> {
        let kind = self.kind_of(id)?;
        self.get(&ComponentRef::new(kind, id))
    }

    /// Delete entities and every connection attached to them
    ///
    /// Returns the removed entities, cascaded connections included.
    pub fn remove(&mut self, components: &[ComponentRef], at: DateTime<Utc>) -> Vec<Component> {
        let mut removed = Vec::new();
        let mut positioned = Vec::new();
        let mut connections = Vec::new();

        for component in components {
            let id = vec![component.id.clone()];
            match component.kind {
                ComponentKind::Processor => {
                    removed.extend(self.processors.remove(&id, at).into_iter().map(Component::Processor));
                    positioned.push(component.id.clone());
                }
                ComponentKind::Funnel => {
                    removed.extend(self.funnels.remove(&id, at).into_iter().map(Component::Funnel));
                    positioned.push(component.id.clone());
                }
                ComponentKind::RemoteProcessGroup => {
                    removed.extend(
                        self.remote_process_groups
                            .remove(&id, at)
                            .into_iter()
                            .map(Component::RemoteProcessGroup),
                    );
                    positioned.push(component.id.clone());
                }
                ComponentKind::Connection => connections.push(component.id.clone()),
            }
        }

        for id in &positioned {
            for connection_id in self.connections.touching(id) {
                if !connections.contains(&connection_id) {
                    log::debug!("Cascading removal of '{}' to connection '{}'", id, connection_id);
                    connections.push(connection_id);
                }
            }
        }
        removed.extend(
            self.connections
                .remove(&connections, at)
                .into_iter()
                .map(Component::Connection),
        );
        removed
    }

    /// Recompute culling for every entity
    pub fn update_visibility(&mut self, window: &Rect, above_threshold: bool) -> usize {
        self.processors
            .update_visibility(window, above_threshold, |e| Some(e.bounds()))
            + self
                .funnels
                .update_visibility(window, above_threshold, |e| Some(e.bounds()))
            + self
                .remote_process_groups
                .update_visibility(window, above_threshold, |e| Some(e.bounds()))
            + self.connections.update_visibility(window, above_threshold)
    }

    /// Re-render entities crossing the viewport boundary
    pub fn pan(&mut self) -> RenderOutcome {
        let mut outcome = self.processors.pan();
        outcome.extend(self.funnels.pan());
        outcome.extend(self.remote_process_groups.pan());
        let (connections, shapes) = self.split();
        outcome.extend(connections.pan(&shapes));
        outcome
    }

    /// Select `id`; returns false when nothing holds it
    pub fn select(&mut self, id: &str) -> bool {
        self.processors.select(id)
            || self.funnels.select(id)
            || self.remote_process_groups.select(id)
            || self.connections.entities_mut().select(id)
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        self.processors.deselect(id)
            || self.funnels.deselect(id)
            || self.remote_process_groups.deselect(id)
            || self.connections.entities_mut().deselect(id)
    }

    pub fn clear_selection(&mut self) -> Vec<String> {
        let mut cleared = self.processors.clear_selection();
        cleared.extend(self.funnels.clear_selection());
        cleared.extend(self.remote_process_groups.clear_selection());
        cleared.extend(self.connections.entities_mut().clear_selection());
        cleared
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.processors.is_selected(id)
            || self.funnels.is_selected(id)
            || self.remote_process_groups.is_selected(id)
            || self.connections.entities().is_selected(id)
    }

    pub fn selection(&self) -> Vec<ComponentRef> {
        let refs = |kind: ComponentKind, ids: Vec<String>| {
            ids.into_iter().map(move |id| ComponentRef::new(kind, id))
        };
        refs(ComponentKind::Processor, self.processors.selected_ids())
            .chain(refs(ComponentKind::Funnel, self.funnels.selected_ids()))
            .chain(refs(
                ComponentKind::RemoteProcessGroup,
                self.remote_process_groups.selected_ids(),
            ))
            .chain(refs(
                ComponentKind::Connection,
                self.connections.entities().selected_ids(),
            ))
            .collect()
    }

    /// Union of the selected entities' bounds
    pub fn selection_bounds(&self) -> Option<Rect> {
        self.selection()
            .iter()
            .filter_map(|c| self.bounds_of(&c.id))
            .reduce(|a, b| a.union(&b))
    }

    /// Union of every entity's bounds
    pub fn graph_bounds(&self) -> Option<Rect> {
        let positioned = self
            .processors
            .iter()
            .map(PositionedEntity::bounds)
            .chain(self.funnels.iter().map(PositionedEntity::bounds))
            .chain(self.remote_process_groups.iter().map(PositionedEntity::bounds));
        let routed = self
            .connections
            .get_all()
            .into_iter()
            .filter_map(|c| self.connections.route(&c.id).and_then(|r| r.bounds()));
        positioned.chain(routed).reduce(|a, b| a.union(&b))
    }

    pub fn bounds_of(&self, id: &str) -> Option<Rect> {
        self.shapes()
            .shape_of(id)
            .map(|s| s.bounds())
            .or_else(|| self.connections.route(id).and_then(|r| r.bounds()))
    }

    /// Move the selection by `(dx, dy)`
    ///
    /// Selected components move, selected connections shift their bends,
    /// and self-loops on a moved component follow it. The whole batch is
    /// rejected when any participant lacks write permission.
    pub fn drag_selection(&mut self, dx: f64, dy: f64) -> Result<DragPlan> {
        let selection = self.selection();
        let moved_ids: Vec<String> = selection
            .iter()
            .filter(|c| c.kind != ComponentKind::Connection)
            .map(|c| c.id.clone())
            .collect();

        let mut bend_ids: Vec<String> = selection
            .iter()
            .filter(|c| c.kind == ComponentKind::Connection)
            .map(|c| c.id.clone())
            .collect();
        for connection in self.connections.get_all() {
            if connection.is_self_loop()
                && moved_ids.iter().any(|id| connection.touches(id))
                && !bend_ids.contains(&connection.id)
            {
                bend_ids.push(connection.id.clone());
            }
        }

        for component in &selection {
            let writable = self
                .get(component)
                .map(|c| c.permissions().can_write)
                .unwrap_or(false);
            if !writable {
                return Err(CanvasError::denied(format!(
                    "Not authorized to move {} '{}'",
                    component.kind, component.id
                )));
            }
        }
        // Self-loops riding along need write access too
        for id in &bend_ids {
            let writable = self
                .connections
                .get(id)
                .map(|c| c.permissions.can_write)
                .unwrap_or(false);
            if !writable {
                return Err(CanvasError::denied(format!(
                    "Not authorized to move {} '{}'",
                    ComponentKind::Connection,
                    id
                )));
            }
        }

        let mut plan = DragPlan::default();
        for component in &selection {
            let moved = match component.kind {
                ComponentKind::Processor => translate(&mut self.processors, &component.id, dx, dy),
                ComponentKind::Funnel => translate(&mut self.funnels, &component.id, dx, dy),
                ComponentKind::RemoteProcessGroup => {
                    translate(&mut self.remote_process_groups, &component.id, dx, dy)
                }
                ComponentKind::Connection => None,
            };
            if let Some((proposed, previous)) = moved {
                plan.moves.push(DragMove::Component { proposed, previous });
            }
        }

        for id in &bend_ids {
            let previous = match self.connections.get(id) {
                Some(c) if !c.bends.is_empty() => self.connections.translate_bends(id, dx, dy),
                _ => None,
            };
            if let (Some(previous), Some(proposed)) = (previous, self.connections.get(id)) {
                plan.moves.push(DragMove::Bends {
                    proposed: proposed.clone(),
                    previous,
                });
            }
        }

        let (connections, shapes) = self.split();
        connections.refresh(&bend_ids, &shapes);
        connections.refresh_touching(&moved_ids, &shapes);
        Ok(plan)
    }

    /// Undo a drag plan locally
    pub fn rollback(&mut self, plan: &DragPlan) {
        let mut moved_ids = Vec::new();
        let mut bend_ids = Vec::new();
        for step in &plan.moves {
            match step {
                DragMove::Component { proposed, previous } => {
                    let id = proposed.id();
                    match proposed.kind() {
                        ComponentKind::Processor => place(&mut self.processors, id, *previous),
                        ComponentKind::Funnel => place(&mut self.funnels, id, *previous),
                        ComponentKind::RemoteProcessGroup => {
                            place(&mut self.remote_process_groups, id, *previous)
                        }
                        ComponentKind::Connection => {}
                    }
                    moved_ids.push(id.to_string());
                }
                DragMove::Bends { proposed, previous } => {
                    let (connections, shapes) = self.split();
                    connections.restore_geometry(&proposed.id, previous, &shapes);
                    bend_ids.push(proposed.id.clone());
                }
            }
        }
        log::warn!(
            "Rolled back drag of {} components and {} connections",
            moved_ids.len(),
            bend_ids.len()
        );
        let (connections, shapes) = self.split();
        connections.refresh_touching(&moved_ids, &shapes);
    }

    /// Mutable connection manager paired with a shape lookup
    pub fn split(&mut self) -> (&mut ConnectionManager, Shapes<'_>) {
        (
            &mut self.connections,
            Shapes {
                processors: &self.processors,
                funnels: &self.funnels,
                remote_process_groups: &self.remote_process_groups,
            },
        )
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
            && self.funnels.is_empty()
            && self.remote_process_groups.is_empty()
            && self.connections.is_empty()
    }

    pub fn clear(&mut self) {
        self.processors.clear();
        self.funnels.clear();
        self.remote_process_groups.clear();
        self.connections.clear();
    }
}

/// Shift one entity by `(dx, dy)`; returns the moved copy and its old position
fn translate<E>(manager: &mut EntityManager<E>, id: &str, dx: f64, dy: f64) -> Option<(Component, Point)>
where
    E: Renderable + PositionedEntity,
{
    let entity = manager.get_mut(id)?;
    let previous = entity.position()?;
    entity.set_position(previous.offset(dx, dy));
    let proposed = entity.clone().into_component();
    manager.render(&[id.to_string()]);
    Some((proposed, previous))
}

fn place<E>(manager: &mut EntityManager<E>, id: &str, position: Point)
where
    E: Renderable + PositionedEntity,
{
    if let Some(entity) = manager.get_mut(id) {
        entity.set_position(position);
    }
    manager.render(&[id.to_string()]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::*;
    use crate::types::Permissions;
    use chrono::TimeZone;

    const OFFSETS: SelfLoopOffsets = SelfLoopOffsets { x: 75.0, y: 25.0 };

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    fn graph() -> GraphState {
        let mut graph = GraphState::new("root", OFFSETS);
        let contents = ProcessGroupContents {
            processors: vec![processor("p1", 1, 0.0, 0.0), processor("p2", 1, 600.0, 0.0)],
            funnels: vec![funnel("f1", 1, 300.0, 400.0)],
            remote_process_groups: Vec::new(),
            connections: vec![connection("c1", 1, "p1", "p2"), connection("c2", 1, "p2", "f1")],
        };
        graph.set(contents, None, SetOptions::default());
        graph
    }

    #[test]
    fn test_remove_cascades_to_connections() {
        let mut graph = graph();
        let removed = graph.remove(&[ComponentRef::new(ComponentKind::Processor, "p2")], at(10));

        let ids: Vec<&str> = removed.iter().map(Component::id).collect();
        assert_eq!(ids, vec!["p2", "c1", "c2"]);
        assert!(graph.connections().is_empty());
        assert!(graph.processors().contains("p1"));
    }

    #[test]
    fn test_routes_follow_moved_component() {
        let mut graph = graph();
        let before = graph.connections().route("c1").unwrap().end;

        let mut moved = processor("p2", 2, 600.0, 300.0);
        moved.component = graph.processors().get("p2").unwrap().component.clone();
        graph.set_component(Component::Processor(moved), SetOptions::default());

        assert_ne!(graph.connections().route("c1").unwrap().end, before);
    }

    #[test]
    fn test_set_with_cutoff_expires_caches() {
        let mut graph = graph();
        graph.add(
            ProcessGroupContents::from(Component::Funnel(funnel("f2", 1, 0.0, 0.0))),
            at(100),
            AddOptions::default(),
        );

        // Fetch started before f2 was created: keep it
        let snapshot = ProcessGroupContents {
            processors: vec![processor("p1", 1, 0.0, 0.0), processor("p2", 1, 600.0, 0.0)],
            funnels: vec![funnel("f1", 1, 300.0, 400.0)],
            ..Default::default()
        };
        graph.set(snapshot.clone(), Some(at(50)), SetOptions::default());
        assert!(graph.funnels().contains("f2"));

        // Fetch started after: the server is authoritative
        graph.set(snapshot, Some(at(150)), SetOptions::default());
        assert!(!graph.funnels().contains("f2"));
    }

    #[test]
    fn test_drag_moves_selection_and_self_loops() {
        let mut graph = graph();
        let mut looped = connection("loop", 1, "p1", "p1");
        looped.bends = vec![Point::new(427.0, 39.0), Point::new(427.0, 89.0)];
        graph.set_component(Component::Connection(looped), SetOptions::default());

        graph.select("p1");
        let plan = graph.drag_selection(10.0, 5.0).unwrap();

        assert_eq!(plan.moved_component_ids(), vec!["p1".to_string()]);
        assert_eq!(plan.moves.len(), 2);
        assert_eq!(graph.processors().get("p1").unwrap().position, Point::new(10.0, 5.0));
        assert_eq!(
            graph.connections().get("loop").unwrap().bends[0],
            Point::new(437.0, 44.0)
        );

        graph.rollback(&plan);
        assert_eq!(graph.processors().get("p1").unwrap().position, Point::new(0.0, 0.0));
        assert_eq!(
            graph.connections().get("loop").unwrap().bends[0],
            Point::new(427.0, 39.0)
        );
    }

    #[test]
    fn test_drag_rejected_without_write() {
        let mut graph = graph();
        let mut locked = processor("p3", 1, 0.0, 900.0);
        locked.permissions = Permissions::READ_ONLY;
        graph.set_component(Component::Processor(locked), SetOptions::default());

        graph.select("p1");
        graph.select("p3");
        let err = graph.drag_selection(10.0, 10.0).unwrap_err();
        assert!(matches!(err, CanvasError::PermissionDenied(_)));
        assert_eq!(graph.processors().get("p1").unwrap().position, Point::new(0.0, 0.0));
    }

    #[test]
    fn test_drag_rejected_for_read_only_self_loop() {
        let mut graph = graph();
        let mut looped = connection("loop", 1, "p1", "p1");
        looped.permissions = Permissions::READ_ONLY;
        looped.bends = vec![Point::new(427.0, 39.0), Point::new(427.0, 89.0)];
        graph.set_component(Component::Connection(looped), SetOptions::default());

        graph.select("p1");
        let err = graph.drag_selection(10.0, 5.0).unwrap_err();

        assert!(matches!(err, CanvasError::PermissionDenied(_)));
        assert_eq!(graph.processors().get("p1").unwrap().position, Point::new(0.0, 0.0));
        assert_eq!(
            graph.connections().get("loop").unwrap().bends[0],
            Point::new(427.0, 39.0)
        );
    }

    #[test]
    fn test_culling_is_idempotent() {
        fn flags(graph: &GraphState) -> Vec<(String, bool)> {
            let mut flags = Vec::new();
            for id in graph.processors().ids() {
                flags.push((id.clone(), graph.processors().is_visible(&id)));
            }
            for id in graph.funnels().ids() {
                flags.push((id.clone(), graph.funnels().is_visible(&id)));
            }
            for id in graph.connections().entities().ids() {
                let visible = graph.connections().visibility(&id).map(|v| v.visible);
                flags.push((id, visible.unwrap_or(false)));
            }
            flags
        }

        let mut graph = graph();
        let window = Rect::new(-10.0, -10.0, 400.0, 200.0);

        assert!(graph.update_visibility(&window, true) > 0);
        let first = flags(&graph);

        assert_eq!(graph.update_visibility(&window, true), 0);
        assert_eq!(flags(&graph), first);
        assert!(graph.pan().changed.is_empty());
    }

    #[test]
    fn test_selection_bounds() {
        let mut graph = graph();
        assert!(graph.selection_bounds().is_none());

        graph.select("p1");
        graph.select("f1");
        let bounds = graph.selection_bounds().unwrap();
        assert_eq!(bounds, Rect::new(0.0, 0.0, 352.0, 448.0));
    }

    #[test]
    fn test_culling_across_managers() {
        let mut graph = graph();
        let window = Rect::new(-10.0, -10.0, 400.0, 200.0);
        graph.update_visibility(&window, true);

        assert!(graph.processors().is_visible("p1"));
        assert!(!graph.processors().is_visible("p2"));
        assert!(!graph.funnels().is_visible("f1"));
        assert!(graph.connections().visibility("c1").unwrap().visible);

        graph.update_visibility(&window, false);
        assert!(!graph.connections().visibility("c1").unwrap().visible);
        graph.update_visibility(&window, true);

        let outcome = graph.pan();
        assert!(outcome.changed.contains(&"p2".to_string()));
        assert!(!outcome.changed.contains(&"p1".to_string()));
    }
}
