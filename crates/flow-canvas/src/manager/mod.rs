//! Per-type entity collections and their reconciliation
//!
//! An [`EntityManager`] owns every entity of one type in the current
//! process group, the added/removed caches guarding against out-of-order
//! responses, visibility flags from viewport culling, and the last rendered
//! view of each entity.
//!
//! # Reconciliation rules
//!
//! - `add` inserts unconditionally and stamps the *added* cache
//! - `set` with a full snapshot deletes live ids the snapshot omits, unless
//!   they are in the *added* cache
//! - each snapshot entity replaces the live one only if its revision is
//!   newer (or the caller overrides the check) and the id is not in the
//!   *removed* cache
//!
//! Rendering is data-bound: a view is recomputed from the entity and only
//! reported as changed when it differs from the previous one.

pub mod connection;
pub mod funnel;
pub mod processor;
pub mod remote_group;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::cache::RecentMutations;
use crate::geometry::Rect;
use crate::revision::should_apply;
use crate::types::GraphEntity;

pub use connection::ConnectionManager;

/// Entities that produce a view when rendered
pub trait Renderable: GraphEntity {
    type View: Clone + PartialEq + std::fmt::Debug + Send + Sync;

    /// View of the entity; culled entities render a reduced view
    fn render(&self, visible: bool) -> Self::View;
}

pub type ProcessorManager = EntityManager<crate::types::ProcessorEntity>;
pub type FunnelManager = EntityManager<crate::types::FunnelEntity>;
pub type RemoteProcessGroupManager = EntityManager<crate::types::RemoteProcessGroupEntity>;

/// Server data handed to `set`
#[derive(Debug, Clone)]
pub enum Snapshot<E> {
    /// Every entity of the type in the process group
    Full(Vec<E>),
    /// A single entity, applied without the deletion sweep
    Single(E),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Make the added entities the active selection
    pub select_all: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Apply regardless of revision (caller holds authoritative data)
    pub override_revision_check: bool,
}

impl SetOptions {
    pub fn authoritative() -> Self {
        Self {
            override_revision_check: true,
        }
    }
}

/// Culling state of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visibility {
    pub visible: bool,
    /// Became visible on the last visibility update
    pub entering: bool,
    /// Became hidden on the last visibility update
    pub leaving: bool,
}

impl Visibility {
    /// Entities are visible until the first culling pass says otherwise
    pub const INITIAL: Visibility = Visibility {
        visible: true,
        entering: false,
        leaving: false,
    };

    pub fn in_transition(&self) -> bool {
        self.entering || self.leaving
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Ids whose view changed or disappeared during a render
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl RenderOutcome {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn extend(&mut self, other: RenderOutcome) {
        self.changed.extend(other.changed);
        self.removed.extend(other.removed);
    }
}

/// What a `set` call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOutcome {
    /// Ids whose live copy was replaced or inserted
    pub applied: Vec<String>,
    /// Ids deleted because the full snapshot omitted them
    pub removed: Vec<String>,
    /// Ids ignored because their revision was not newer
    pub stale: Vec<String>,
    /// Ids ignored because they were removed locally
    pub suppressed: Vec<String>,
}

impl SetOutcome {
    pub fn extend(&mut self, other: SetOutcome) {
        self.applied.extend(other.applied);
        self.removed.extend(other.removed);
        self.stale.extend(other.stale);
        self.suppressed.extend(other.suppressed);
    }

    /// Whether the collection changed at all
    pub fn mutated(&self) -> bool {
        !self.applied.is_empty() || !self.removed.is_empty()
    }
}

/// Collection of one entity type with its reconciliation state
#[derive(Debug)]
pub struct EntityManager<E: Renderable> {
    entities: IndexMap<String, E>,
    recent: RecentMutations,
    visibility: HashMap<String, Visibility>,
    views: HashMap<String, E::View>,
    selected: HashSet<String>,
}

impl<E: Renderable> Default for EntityManager<E> {
    fn default() -> Self {
        Self {
            entities: IndexMap::new(),
            recent: RecentMutations::default(),
            visibility: HashMap::new(),
            views: HashMap::new(),
            selected: HashSet::new(),
        }
    }
}

impl<E: Renderable> EntityManager<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert entities unconditionally and stamp them as recently added
    pub fn add(&mut self, entities: Vec<E>, at: DateTime<Utc>, options: AddOptions) -> RenderOutcome {
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            let id = entity.id().to_string();
            self.recent.record_added(&id, at);
            self.visibility.entry(id.clone()).or_default();
            self.entities.insert(id.clone(), entity);
            ids.push(id);
        }

        if options.select_all {
            self.selected.clear();
            self.selected.extend(ids.iter().cloned());
        }

        log::debug!("Added {} {:?} entities", ids.len(), E::KIND);
        self.render(&ids)
    }

    /// Reconcile server data against the live collection
    pub fn set(&mut self, snapshot: Snapshot<E>, options: SetOptions) -> SetOutcome {
        let mut outcome = SetOutcome::default();

        let entities = match snapshot {
            Snapshot::Full(entities) => {
                let doomed: Vec<String> = {
                    let incoming: HashSet<&str> = entities.iter().map(|e| e.id()).collect();
                    self.entities
                        .keys()
                        .filter(|id| {
                            !incoming.contains(id.as_str()) && !self.recent.added.contains(id)
                        })
                        .cloned()
                        .collect()
                };
                for id in doomed {
                    self.purge(&id);
                    outcome.removed.push(id);
                }
                entities
            }
            Snapshot::Single(entity) => vec![entity],
        };

        for entity in entities {
            let id = entity.id().to_string();
            if self.recent.removed.contains(&id) {
                log::debug!("Ignoring {:?} '{}': removed locally", E::KIND, id);
                outcome.suppressed.push(id);
                continue;
            }

            let current = self.entities.get(&id).map(|e| e.revision());
            if !should_apply(current, entity.revision(), options.override_revision_check) {
                log::debug!(
                    "Ignoring {:?} '{}': revision {} is not newer",
                    E::KIND,
                    id,
                    entity.revision().version
                );
                outcome.stale.push(id);
                continue;
            }

            self.visibility.entry(id.clone()).or_default();
            self.entities.insert(id.clone(), entity);
            outcome.applied.push(id);
        }

        let applied = outcome.applied.clone();
        self.render(&applied);
        outcome
    }

    pub fn get(&self, id: &str) -> Option<&E> {
        self.entities.get(id)
    }

    /// Every entity, in insertion order
    pub fn get_all(&self) -> Vec<&E> {
        self.entities.values().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entities.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Delete entities locally and stamp them as recently removed
    ///
    /// Unknown ids are still stamped so a stale response cannot bring them
    /// back. Cascading to connections is the caller's job.
    pub fn remove(&mut self, ids: &[String], at: DateTime<Utc>) -> Vec<E> {
        let mut removed = Vec::new();
        for id in ids {
            self.recent.record_removed(id, at);
            if let Some(entity) = self.purge(id) {
                removed.push(entity);
            }
        }
        removed
    }

    /// Drop cache entries stamped before `cutoff`
    pub fn expire_caches(&mut self, cutoff: DateTime<Utc>) -> usize {
        self.recent.expire(cutoff)
    }

    pub fn recent(&self) -> &RecentMutations {
        &self.recent
    }

    /// Replace an entity locally without consulting revisions or caches
    ///
    /// Used for optimistic edits and their rollback.
    pub(crate) fn replace_local(&mut self, entity: E) -> RenderOutcome {
        let id = entity.id().to_string();
        self.visibility.entry(id.clone()).or_default();
        self.entities.insert(id.clone(), entity);
        self.render(&[id])
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut E> {
        self.entities.get_mut(id)
    }

    pub fn visibility(&self, id: &str) -> Option<Visibility> {
        self.visibility.get(id).copied()
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.visibility(id).map(|v| v.visible).unwrap_or(false)
    }

    /// Recompute culling flags
    ///
    /// An entity is visible iff the scale is above the render threshold
    /// and its bounds intersect `window`. Entities without bounds follow
    /// the threshold alone. Returns the number of entities in transition.
    pub fn update_visibility<F>(&mut self, window: &Rect, above_threshold: bool, bounds: F) -> usize
    where
        F: Fn(&E) -> Option<Rect>,
    {
        let mut transitions = 0;
        for (id, entity) in &self.entities {
            let visible = above_threshold
                && bounds(entity).map(|b| b.intersects(window)).unwrap_or(true);
            let previous = self.visibility.get(id).copied().unwrap_or_default();
            let next = Visibility {
                visible,
                entering: visible && !previous.visible,
                leaving: !visible && previous.visible,
            };
            if next.in_transition() {
                transitions += 1;
            }
            self.visibility.insert(id.clone(), next);
        }
        transitions
    }

    /// Ids that entered or left the viewport on the last visibility update
    pub fn transitioning_ids(&self) -> Vec<String> {
        self.entities
            .keys()
            .filter(|id| self.visibility.get(*id).map(|v| v.in_transition()).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Re-render only entities crossing the viewport boundary
    pub fn pan(&mut self) -> RenderOutcome {
        let ids = self.transitioning_ids();
        self.render(&ids)
    }

    /// Recompute views for `ids`, reporting those that actually changed
    pub fn render(&mut self, ids: &[String]) -> RenderOutcome {
        let mut outcome = RenderOutcome::default();
        for id in ids {
            let Some(entity) = self.entities.get(id) else {
                if self.views.remove(id).is_some() {
                    outcome.removed.push(id.clone());
                }
                continue;
            };
            let visible = self.visibility.get(id).map(|v| v.visible).unwrap_or(true);
            let view = entity.render(visible);
            if self.views.get(id) != Some(&view) {
                self.views.insert(id.clone(), view);
                outcome.changed.push(id.clone());
            }
        }
        outcome
    }

    /// Re-render every entity
    pub fn render_all(&mut self) -> RenderOutcome {
        let ids = self.ids();
        self.render(&ids)
    }

    pub fn view(&self, id: &str) -> Option<&E::View> {
        self.views.get(id)
    }

    pub fn select(&mut self, id: &str) -> bool {
        if self.contains(id) {
            self.selected.insert(id.to_string())
        } else {
            false
        }
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        self.selected.remove(id)
    }

    pub fn clear_selection(&mut self) -> Vec<String> {
        self.selected.drain().collect()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    /// Selected ids in insertion order
    pub fn selected_ids(&self) -> Vec<String> {
        self.entities
            .keys()
            .filter(|id| self.selected.contains(*id))
            .cloned()
            .collect()
    }

    /// Release every entity and all bookkeeping
    pub fn clear(&mut self) {
        self.entities.clear();
        self.recent.clear();
        self.visibility.clear();
        self.views.clear();
        self.selected.clear();
    }

    fn purge(&mut self, id: &str) -> Option<E> {
        self.visibility.remove(id);
        self.views.remove(id);
        self.selected.remove(id);
        self.entities.shift_remove(id)
    }
}
