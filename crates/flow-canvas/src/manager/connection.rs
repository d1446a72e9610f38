//! Connection manager: routing, bend editing, endpoint re-targeting and
//! label placement
//!
//! Every refresh recomputes a connection's route from its endpoints'
//! shapes: `start` is the perimeter point of the source facing the first
//! anchor, `end` the perimeter point of the destination facing the last
//! anchor (or the cursor while the endpoint is being dragged). The path
//! runs through `[start, ...bends, end]`.
//!
//! Interactive edits are applied to the live entity immediately and return
//! a [`GeometryEdit`] holding the last known-good geometry. The caller
//! persists `proposed` and calls [`ConnectionManager::restore`] on failure.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::{CanvasError, Result};
use crate::geometry::{
    bounding_box, distance_squared, line_path, nearest_segment_index, Point, Rect, Shape,
};
use crate::manager::{
    AddOptions, EntityManager, RenderOutcome, Renderable, SetOptions, SetOutcome, Snapshot,
    Visibility,
};
use crate::types::{Connectable, ConnectionEntity};

/// Resolves the outline of a component drawn on the canvas
pub trait ShapeLookup {
    fn shape_of(&self, component_id: &str) -> Option<Shape>;
}

impl<F> ShapeLookup for F
where
    F: Fn(&str) -> Option<Shape>,
{
    fn shape_of(&self, component_id: &str) -> Option<Shape> {
        self(component_id)
    }
}

/// Derived, non-persisted geometry of a connection
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub start: Point,
    pub end: Point,
    pub bends: Vec<Point>,
    pub path: String,
    pub label_anchor: Point,
}

impl Route {
    /// `[start, ...bends, end]`
    pub fn points(&self) -> Vec<Point> {
        let mut points = Vec::with_capacity(self.bends.len() + 2);
        points.push(self.start);
        points.extend(self.bends.iter().copied());
        points.push(self.end);
        points
    }

    pub fn bounds(&self) -> Option<Rect> {
        bounding_box(&self.points())
    }
}

/// Persisted geometry of a connection, kept for rollback
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub destination: Connectable,
    pub bends: Vec<Point>,
    pub label_index: usize,
}

impl Geometry {
    fn of(connection: &ConnectionEntity) -> Self {
        Self {
            destination: connection.destination.clone(),
            bends: connection.bends.clone(),
            label_index: connection.label_index,
        }
    }
}

/// An optimistic edit awaiting persistence
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryEdit {
    pub connection_id: String,
    /// Geometry to restore if persistence fails
    pub previous: Geometry,
    /// Entity to submit, carrying the current revision
    pub proposed: ConnectionEntity,
}

/// Result of dropping a dragged endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum Retarget {
    /// Dropped over no target; the previous geometry is back in place
    Reverted,
    /// Dropped back on the current destination
    Unchanged,
    /// New destination awaiting persistence
    Pending {
        edit: GeometryEdit,
        /// The destination is a remote port and needs host confirmation
        requires_confirmation: bool,
    },
}

/// Label row contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelRow {
    From(String),
    To(String),
    Relationships(Vec<String>),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelView {
    pub rows: Vec<LabelRow>,
    /// References a relationship the source no longer offers
    pub ghost: bool,
    /// The connection is not readable
    pub unauthorized: bool,
}

/// Entity-derived part of a connection's rendering; the geometry lives in [`Route`]
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionView {
    pub culled: bool,
    pub z_index: i64,
    pub label: Option<LabelView>,
    pub editable: bool,
}

impl Renderable for ConnectionEntity {
    type View = ConnectionView;

    fn render(&self, visible: bool) -> ConnectionView {
        ConnectionView {
            culled: !visible,
            z_index: self.z_index,
            label: if visible { label_for(self) } else { None },
            editable: self.permissions.can_write,
        }
    }
}

/// Label shown for a connection, if it needs one
fn label_for(connection: &ConnectionEntity) -> Option<LabelView> {
    if !connection.permissions.can_read {
        return Some(LabelView {
            rows: Vec::new(),
            ghost: false,
            unauthorized: true,
        });
    }

    let details = connection.component.as_ref();
    let selected: Vec<String> = details
        .and_then(|d| d.selected_relationships.as_ref())
        .map(|s| s.iter().cloned().collect())
        .unwrap_or_default();

    let crosses_source = connection.source.kind.is_group_port() || connection.source.kind.is_remote_port();
    let crosses_destination =
        connection.destination.kind.is_group_port() || connection.destination.kind.is_remote_port();
    let name = connection.name();

    if !crosses_source && !crosses_destination && name.is_none() && selected.is_empty() {
        return None;
    }

    let mut rows = Vec::new();
    if crosses_source {
        rows.push(LabelRow::From(endpoint_label(&connection.source)));
    }
    if crosses_destination {
        rows.push(LabelRow::To(endpoint_label(&connection.destination)));
    }
    if !selected.is_empty() {
        rows.push(LabelRow::Relationships(selected.clone()));
    }
    if let Some(name) = name {
        rows.push(LabelRow::Name(name.to_string()));
    }

    let ghost = details
        .and_then(|d| d.available_relationships.as_ref())
        .map(|available| selected.iter().any(|r| !available.contains(r)))
        .unwrap_or(false);

    Some(LabelView {
        rows,
        ghost,
        unauthorized: false,
    })
}

fn endpoint_label(endpoint: &Connectable) -> String {
    endpoint.name.clone().unwrap_or_else(|| endpoint.id.clone())
}

/// Interaction in progress on one connection
#[derive(Debug, Clone)]
enum Interaction {
    Endpoint { original: Geometry, cursor: Option<Point> },
    Label { original: Geometry },
}

/// Offsets of the two bends synthesized for a new self-loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfLoopOffsets {
    pub x: f64,
    pub y: f64,
}

/// Connection collection with routing and interactive editing
#[derive(Debug, Default)]
pub struct ConnectionManager {
    entities: EntityManager<ConnectionEntity>,
    routes: HashMap<String, Route>,
    paint_order: Vec<String>,
    interactions: HashMap<String, Interaction>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        connections: Vec<ConnectionEntity>,
        at: DateTime<Utc>,
        options: AddOptions,
        shapes: &dyn ShapeLookup,
    ) -> RenderOutcome {
        let ids: Vec<String> = connections.iter().map(|c| c.id.clone()).collect();
        let mut outcome = self.entities.add(connections, at, options);
        outcome.extend(self.refresh(&ids, shapes));
        self.sort_paint_order();
        outcome
    }

    pub fn set(
        &mut self,
        snapshot: Snapshot<ConnectionEntity>,
        options: SetOptions,
        shapes: &dyn ShapeLookup,
    ) -> SetOutcome {
        let outcome = self.entities.set(snapshot, options);
        for id in &outcome.removed {
            self.routes.remove(id);
            self.interactions.remove(id);
        }
        self.refresh(&outcome.applied, shapes);
        self.sort_paint_order();
        outcome
    }

    pub fn get(&self, id: &str) -> Option<&ConnectionEntity> {
        self.entities.get(id)
    }

    pub fn get_all(&self) -> Vec<&ConnectionEntity> {
        self.entities.get_all()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn remove(&mut self, ids: &[String], at: DateTime<Utc>) -> Vec<ConnectionEntity> {
        let removed = self.entities.remove(ids, at);
        for id in ids {
            self.routes.remove(id);
            self.interactions.remove(id);
        }
        self.paint_order.retain(|id| !ids.contains(id));
        removed
    }

    pub fn expire_caches(&mut self, cutoff: DateTime<Utc>) -> usize {
        self.entities.expire_caches(cutoff)
    }

    pub fn entities(&self) -> &EntityManager<ConnectionEntity> {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityManager<ConnectionEntity> {
        &mut self.entities
    }

    pub fn route(&self, id: &str) -> Option<&Route> {
        self.routes.get(id)
    }

    pub fn view(&self, id: &str) -> Option<&ConnectionView> {
        self.entities.view(id)
    }

    /// Connection ids in ascending `z_index` order
    pub fn paint_order(&self) -> &[String] {
        &self.paint_order
    }

    /// Ids of connections attached to `component_id` at either end
    pub fn touching(&self, component_id: &str) -> Vec<String> {
        self.entities
            .iter()
            .filter(|c| c.touches(component_id))
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn visibility(&self, id: &str) -> Option<Visibility> {
        self.entities.visibility(id)
    }

    /// Cull connections by the bounds of their current route
    pub fn update_visibility(&mut self, window: &Rect, above_threshold: bool) -> usize {
        let routes = &self.routes;
        self.entities
            .update_visibility(window, above_threshold, |c| routes.get(&c.id).and_then(Route::bounds))
    }

    /// Re-route and re-render only connections crossing the viewport boundary
    pub fn pan(&mut self, shapes: &dyn ShapeLookup) -> RenderOutcome {
        let ids = self.entities.transitioning_ids();
        self.refresh(&ids, shapes)
    }

    /// Recompute routes and views for `ids`
    pub fn refresh(&mut self, ids: &[String], shapes: &dyn ShapeLookup) -> RenderOutcome {
        let mut outcome = self.entities.render(ids);
        let mut changed: HashSet<String> = outcome.changed.iter().cloned().collect();

        for id in ids {
            let route = self.entities.get(id).and_then(|c| {
                let cursor = match self.interactions.get(id) {
                    Some(Interaction::Endpoint { cursor, .. }) => *cursor,
                    _ => None,
                };
                compute_route(c, shapes, cursor)
            });

            match route {
                Some(route) => {
                    if self.routes.get(id) != Some(&route) {
                        self.routes.insert(id.clone(), route);
                        if changed.insert(id.clone()) {
                            outcome.changed.push(id.clone());
                        }
                    }
                }
                None => {
                    if self.routes.remove(id).is_some() && !outcome.removed.contains(id) {
                        outcome.removed.push(id.clone());
                    }
                }
            }
        }
        outcome
    }

    pub fn refresh_all(&mut self, shapes: &dyn ShapeLookup) -> RenderOutcome {
        let ids = self.entities.ids();
        self.refresh(&ids, shapes)
    }

    /// Re-route every connection attached to one of `component_ids`
    pub fn refresh_touching(&mut self, component_ids: &[String], shapes: &dyn ShapeLookup) -> RenderOutcome {
        let ids: Vec<String> = self
            .entities
            .iter()
            .filter(|c| component_ids.iter().any(|id| c.touches(id)))
            .map(|c| c.id.clone())
            .collect();
        self.refresh(&ids, shapes)
    }

    /// Insert a bend on the segment nearest `point`
    ///
    /// `label_index` moves forward when the insertion lands at or before it.
    pub fn insert_bend(&mut self, id: &str, point: Point, shapes: &dyn ShapeLookup) -> Result<GeometryEdit> {
        let connection = self.writable(id)?;
        let previous = Geometry::of(connection);

        let index = match self.routes.get(id) {
            Some(route) => nearest_segment_index(point, &route.points()),
            None if connection.bends.len() >= 2 => nearest_segment_index(point, &connection.bends) + 1,
            None => connection.bends.len(),
        };

        let mut proposed = connection.clone();
        proposed.bends.insert(index, point);
        if !previous.bends.is_empty() && index <= proposed.label_index {
            proposed.label_index += 1;
        }
        proposed.label_index = proposed.clamped_label_index();

        Ok(self.apply_edit(previous, proposed, shapes))
    }

    /// Remove the bend at `index`
    ///
    /// A self-loop keeps at least two bends so it renders as a visible
    /// curve; the guard uses the live bends being edited.
    pub fn remove_bend(&mut self, id: &str, index: usize, shapes: &dyn ShapeLookup) -> Result<GeometryEdit> {
        let connection = self.writable(id)?;
        if index >= connection.bends.len() {
            return Err(CanvasError::InvalidState(format!(
                "Connection '{}' has no bend at index {}",
                id, index
            )));
        }
        if connection.is_self_loop() && connection.bends.len() <= 2 {
            return Err(CanvasError::SelfLoopBendFloor {
                connection_id: id.to_string(),
            });
        }

        let previous = Geometry::of(connection);
        let mut proposed = connection.clone();
        proposed.bends.remove(index);
        if index < proposed.label_index {
            proposed.label_index -= 1;
        }
        proposed.label_index = proposed.clamped_label_index();

        Ok(self.apply_edit(previous, proposed, shapes))
    }

    /// Start dragging the destination handle
    pub fn begin_endpoint_drag(&mut self, id: &str) -> Result<()> {
        let connection = self.writable(id)?;
        let original = Geometry::of(connection);
        self.interactions
            .insert(id.to_string(), Interaction::Endpoint { original, cursor: None });
        Ok(())
    }

    /// Move the dragged destination handle to `cursor`
    pub fn drag_endpoint(&mut self, id: &str, cursor: Point, shapes: &dyn ShapeLookup) -> RenderOutcome {
        match self.interactions.get_mut(id) {
            Some(Interaction::Endpoint { cursor: c, .. }) => *c = Some(cursor),
            _ => return RenderOutcome::default(),
        }
        self.refresh(&[id.to_string()], shapes)
    }

    /// Drop the dragged destination handle over `target`
    ///
    /// Dropping over nothing restores the previous geometry. A drop that
    /// turns the connection into a self-loop with fewer than two bends
    /// synthesizes two bends beside the component.
    pub fn drop_endpoint(
        &mut self,
        id: &str,
        target: Option<Connectable>,
        offsets: SelfLoopOffsets,
        shapes: &dyn ShapeLookup,
    ) -> Result<Retarget> {
        let original = match self.interactions.remove(id) {
            Some(Interaction::Endpoint { original, .. }) => original,
            Some(other) => {
                self.interactions.insert(id.to_string(), other);
                return Err(CanvasError::InvalidState(format!(
                    "Connection '{}' endpoint is not being dragged",
                    id
                )));
            }
            None => {
                return Err(CanvasError::InvalidState(format!(
                    "Connection '{}' endpoint is not being dragged",
                    id
                )))
            }
        };

        let Some(target) = target else {
            self.restore_geometry(id, &original, shapes);
            return Ok(Retarget::Reverted);
        };

        if !target.kind.accepts_incoming() {
            self.restore_geometry(id, &original, shapes);
            return Err(CanvasError::InvalidDropTarget(format!(
                "{:?} '{}' cannot receive connections",
                target.kind, target.id
            )));
        }

        if target.id == original.destination.id && target.group_id == original.destination.group_id {
            self.restore_geometry(id, &original, shapes);
            return Ok(Retarget::Unchanged);
        }

        let current = self
            .entities
            .get(id)
            .ok_or_else(|| CanvasError::UnknownComponent(id.to_string()))?;
        let mut proposed = current.clone();
        proposed.destination = target;
        proposed.bends = original.bends.clone();
        proposed.label_index = original.label_index;

        if proposed.is_self_loop() && proposed.bends.len() < 2 {
            if let Some(shape) = shapes.shape_of(proposed.source_terminal()) {
                proposed.bends = self_loop_bends(&shape.bounds(), offsets);
            }
        }
        proposed.label_index = proposed.clamped_label_index();

        let requires_confirmation = proposed.destination.kind.is_remote_port();
        let edit = self.apply_edit(original, proposed, shapes);
        Ok(Retarget::Pending {
            edit,
            requires_confirmation,
        })
    }

    /// Abandon an endpoint drag and restore the previous geometry
    pub fn cancel_endpoint_drag(&mut self, id: &str, shapes: &dyn ShapeLookup) {
        if let Some(Interaction::Endpoint { original, .. }) = self.interactions.remove(id) {
            self.restore_geometry(id, &original, shapes);
        }
    }

    pub fn begin_label_drag(&mut self, id: &str) -> Result<()> {
        let connection = self.writable(id)?;
        let original = Geometry::of(connection);
        self.interactions
            .insert(id.to_string(), Interaction::Label { original });
        Ok(())
    }

    /// Snap the label to the bend closest to `cursor`
    ///
    /// Returns the label index now in effect.
    pub fn drag_label(&mut self, id: &str, cursor: Point, shapes: &dyn ShapeLookup) -> Option<usize> {
        if !matches!(self.interactions.get(id), Some(Interaction::Label { .. })) {
            return None;
        }
        let connection = self.entities.get_mut(id)?;
        if connection.bends.len() > 1 {
            let closest = connection
                .bends
                .iter()
                .enumerate()
                .map(|(i, b)| (i, distance_squared(*b, cursor)))
                .fold((0, f64::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best })
                .0;
            connection.label_index = closest;
        }
        let label_index = connection.label_index;
        self.refresh(&[id.to_string()], shapes);
        Some(label_index)
    }

    /// Finish a label drag; an edit is returned only if the index changed
    pub fn end_label_drag(&mut self, id: &str) -> Option<GeometryEdit> {
        let Some(Interaction::Label { original }) = self.interactions.remove(id) else {
            return None;
        };
        let connection = self.entities.get(id)?;
        if connection.label_index == original.label_index {
            return None;
        }
        Some(GeometryEdit {
            connection_id: id.to_string(),
            previous: original,
            proposed: connection.clone(),
        })
    }

    /// Roll an optimistic edit back to its previous geometry
    pub fn restore(&mut self, edit: &GeometryEdit, shapes: &dyn ShapeLookup) -> RenderOutcome {
        log::warn!("Restoring geometry of connection '{}'", edit.connection_id);
        self.restore_geometry(&edit.connection_id, &edit.previous, shapes)
    }

    /// Move bends by a drag delta; returns the geometry before the move
    pub(crate) fn translate_bends(&mut self, id: &str, dx: f64, dy: f64) -> Option<Geometry> {
        let connection = self.entities.get_mut(id)?;
        let previous = Geometry::of(connection);
        for bend in &mut connection.bends {
            *bend = bend.offset(dx, dy);
        }
        Some(previous)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.routes.clear();
        self.paint_order.clear();
        self.interactions.clear();
    }

    pub(crate) fn restore_geometry(&mut self, id: &str, geometry: &Geometry, shapes: &dyn ShapeLookup) -> RenderOutcome {
        if let Some(connection) = self.entities.get_mut(id) {
            connection.destination = geometry.destination.clone();
            connection.bends = geometry.bends.clone();
            connection.label_index = geometry.label_index;
        }
        self.refresh(&[id.to_string()], shapes)
    }

    fn apply_edit(&mut self, previous: Geometry, proposed: ConnectionEntity, shapes: &dyn ShapeLookup) -> GeometryEdit {
        let id = proposed.id.clone();
        self.entities.replace_local(proposed.clone());
        self.refresh(&[id.clone()], shapes);
        GeometryEdit {
            connection_id: id,
            previous,
            proposed,
        }
    }

    fn writable(&self, id: &str) -> Result<&ConnectionEntity> {
        let connection = self
            .entities
            .get(id)
            .ok_or_else(|| CanvasError::UnknownComponent(id.to_string()))?;
        if !connection.permissions.can_write {
            return Err(CanvasError::denied(format!(
                "Not authorized to modify connection '{}'",
                id
            )));
        }
        Ok(connection)
    }

    fn sort_paint_order(&mut self) {
        let mut order: Vec<(&String, i64)> = self
            .entities
            .iter()
            .map(|c| (&c.id, c.z_index))
            .collect();
        order.sort_by_key(|(_, z)| *z);
        self.paint_order = order.into_iter().map(|(id, _)| id.clone()).collect();
    }
}

/// Route through the connection's bends between its endpoint shapes
fn compute_route(connection: &ConnectionEntity, shapes: &dyn ShapeLookup, cursor: Option<Point>) -> Option<Route> {
    let source = shapes.shape_of(connection.source_terminal())?;

    let end = match cursor {
        Some(cursor) => cursor,
        None => {
            let destination = shapes.shape_of(connection.destination_terminal())?;
            let end_anchor = connection.bends.last().copied().unwrap_or_else(|| source.center());
            destination.perimeter_point(end_anchor)
        }
    };

    let start_anchor = connection.bends.first().copied().unwrap_or(end);
    let start = source.perimeter_point(start_anchor);

    let label_anchor = if connection.bends.is_empty() {
        start.midpoint(end)
    } else {
        connection.bends[connection.clamped_label_index()]
    };

    let mut points = Vec::with_capacity(connection.bends.len() + 2);
    points.push(start);
    points.extend(connection.bends.iter().copied());
    points.push(end);

    Some(Route {
        start,
        end,
        bends: connection.bends.clone(),
        path: line_path(&points),
        label_anchor,
    })
}

/// Two bends to the right of `bounds`, spread vertically around its center
pub fn self_loop_bends(bounds: &Rect, offsets: SelfLoopOffsets) -> Vec<Point> {
    let right_center = Point::new(bounds.right(), bounds.center().y);
    vec![
        right_center.offset(offsets.x, -offsets.y),
        right_center.offset(offsets.x, offsets.y),
    ]
}
