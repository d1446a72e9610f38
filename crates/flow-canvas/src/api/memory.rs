//! In-memory flow collaborator
//!
//! Backs demos and tests with the same failure surface as a remote
//! service: revision conflicts, permission checks, a bounded id space and
//! injected transient failures.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use super::{ApiResult, FlowApi};
use crate::constants::ids;
use crate::error::ApiError;
use crate::manager::processor::relationship_names;
use crate::revision::Revision;
use crate::types::{
    Component, ComponentKind, ComponentRef, ConnectionDetails, ConnectionEntity, CreateRequest,
    FunnelEntity, Permissions, ProcessGroupContents, ProcessGroupFlow, ProcessorDetails,
    ProcessorEntity, ProcessorState, Relationship, RemoteProcessGroupDetails,
    RemoteProcessGroupEntity, VersionInfo,
};

#[derive(Debug)]
struct StoredGroup {
    permissions: Permissions,
    version_info: VersionInfo,
    components: IndexMap<String, Component>,
}

impl StoredGroup {
    fn new(permissions: Permissions) -> Self {
        Self {
            permissions,
            version_info: VersionInfo::default(),
            components: IndexMap::new(),
        }
    }

    fn touch(&mut self) {
        self.version_info.is_dirty = true;
    }
}

#[derive(Debug)]
struct State {
    groups: HashMap<String, StoredGroup>,
    rng: StdRng,
    failures: VecDeque<ApiError>,
    id_space: u32,
    max_attempts: u32,
}

impl State {
    fn take_failure(&mut self) -> ApiResult<()> {
        match self.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn group_of(&self, id: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, g)| g.components.contains_key(id))
            .map(|(group_id, _)| group_id.as_str())
    }

    fn id_taken(&self, id: &str) -> bool {
        self.groups.contains_key(id) || self.group_of(id).is_some()
    }

    /// Sample the bounded id space until a free id turns up
    fn next_id(&mut self, kind: ComponentKind) -> ApiResult<String> {
        let prefix = id_prefix(kind);
        for _ in 0..self.max_attempts {
            let candidate = format!("{}-{}", prefix, self.rng.random_range(0..self.id_space));
            if !self.id_taken(&candidate) {
                return Ok(candidate);
            }
        }
        Err(ApiError::capacity_exceeded(format!(
            "Unable to allocate a {} id after {} attempts",
            kind, self.max_attempts
        )))
    }

    fn lookup(&self, component: &ComponentRef) -> ApiResult<(&str, &Component)> {
        let group_id = self
            .group_of(&component.id)
            .ok_or_else(|| ApiError::not_found(format!("{} '{}' does not exist", component.kind, component.id)))?;
        let stored = self
            .groups
            .get(group_id)
            .and_then(|g| g.components.get(&component.id))
            .filter(|c| c.kind() == component.kind)
            .ok_or_else(|| ApiError::not_found(format!("{} '{}' does not exist", component.kind, component.id)))?;
        Ok((group_id, stored))
    }
}

fn id_prefix(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::Processor => "processor",
        ComponentKind::Funnel => "funnel",
        ComponentKind::RemoteProcessGroup => "remote-group",
        ComponentKind::Connection => "connection",
    }
}

/// Enforce write access and the optimistic-concurrency check
fn check_writable(stored: &Component, revision: &Revision) -> ApiResult<()> {
    if !stored.permissions().can_write {
        return Err(ApiError::permission_denied(format!(
            "Not authorized to modify {} '{}'",
            stored.kind(),
            stored.id()
        )));
    }
    if stored.revision().version != revision.version {
        return Err(ApiError::conflict(format!(
            "{} '{}' is at revision {}, not {}",
            stored.kind(),
            stored.id(),
            stored.revision().version,
            revision.version
        )));
    }
    Ok(())
}

/// Flow collaborator holding everything in process memory
pub struct InMemoryFlowApi {
    client_id: String,
    state: Mutex<State>,
}

impl Default for InMemoryFlowApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFlowApi {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic id allocation for tests
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            client_id: Uuid::new_v4().to_string(),
            state: Mutex::new(State {
                groups: HashMap::new(),
                rng,
                failures: VecDeque::new(),
                id_space: ids::ID_SPACE,
                max_attempts: ids::MAX_ID_ATTEMPTS,
            }),
        }
    }

    /// Shrink or grow the id space sampled by creation
    pub fn with_id_space(self, id_space: u32, max_attempts: u32) -> Self {
        {
            let mut state = self.state.lock();
            state.id_space = id_space.max(1);
            state.max_attempts = max_attempts;
        }
        self
    }

    /// Client id stamped on every revision this instance produces
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Register an empty process group
    pub fn insert_group(&self, group_id: &str, permissions: Permissions) {
        self.state
            .lock()
            .groups
            .entry(group_id.to_string())
            .or_insert_with(|| StoredGroup::new(permissions));
    }

    /// Store a component as-is, creating its group if needed
    pub fn seed(&self, component: Component) {
        let mut state = self.state.lock();
        let group = state
            .groups
            .entry(component.parent_group_id().to_string())
            .or_insert_with(|| StoredGroup::new(Permissions::FULL));
        group.components.insert(component.id().to_string(), component);
    }

    /// Fail the next call with `error`
    pub fn fail_next(&self, error: ApiError) {
        self.state.lock().failures.push_back(error);
    }

    /// Stored copy of a component
    pub fn stored(&self, component: &ComponentRef) -> Option<Component> {
        let state = self.state.lock();
        state.lookup(component).ok().map(|(_, c)| c.clone())
    }

    /// Mark the group as published, clearing its dirty flag
    pub fn publish(&self, group_id: &str) -> ApiResult<VersionInfo> {
        let mut state = self.state.lock();
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| ApiError::not_found(format!("Process group '{}' does not exist", group_id)))?;
        let info = &mut group.version_info;
        info.is_published = true;
        info.is_dirty = false;
        info.registry_version = Some(info.registry_version.unwrap_or(0) + 1);
        info.last_published = Some(Utc::now());
        Ok(info.clone())
    }

    fn build(&self, state: &mut State, group_id: &str, request: CreateRequest) -> ApiResult<Component> {
        let id = state.next_id(request.kind())?;
        let revision = Revision::new(0).next(&self.client_id);
        let parent_group_id = group_id.to_string();

        let component = match request {
            CreateRequest::Processor {
                position,
                processor_type,
                name,
            } => {
                let name = name.unwrap_or_else(|| {
                    processor_type
                        .rsplit('.')
                        .next()
                        .unwrap_or(&processor_type)
                        .to_string()
                });
                Component::Processor(ProcessorEntity {
                    id,
                    revision,
                    permissions: Permissions::FULL,
                    position,
                    parent_group_id,
                    component: Some(ProcessorDetails {
                        name,
                        processor_type,
                        state: ProcessorState::Stopped,
                        relationships: vec![Relationship {
                            name: "success".to_string(),
                            auto_terminate: false,
                        }],
                    }),
                })
            }
            CreateRequest::Funnel { position } => Component::Funnel(FunnelEntity {
                id,
                revision,
                permissions: Permissions::FULL,
                position,
                parent_group_id,
            }),
            CreateRequest::RemoteProcessGroup {
                position,
                target_uris,
            } => Component::RemoteProcessGroup(RemoteProcessGroupEntity {
                id,
                revision,
                permissions: Permissions::FULL,
                position,
                parent_group_id,
                component: Some(RemoteProcessGroupDetails {
                    name: target_uris.clone(),
                    target_uris,
                    transmitting: false,
                    input_ports: Vec::new(),
                    output_ports: Vec::new(),
                }),
            }),
            CreateRequest::Connection {
                source,
                destination,
                selected_relationships,
                bends,
            } => {
                let group = state
                    .groups
                    .get(group_id)
                    .ok_or_else(|| ApiError::not_found(format!("Process group '{}' does not exist", group_id)))?;
                for endpoint in [&source, &destination] {
                    let terminal = endpoint.terminal_id(group_id);
                    if !group.components.contains_key(terminal) {
                        return Err(ApiError::not_found(format!(
                            "Connection endpoint '{}' does not exist",
                            terminal
                        )));
                    }
                }
                let available = match group.components.get(source.terminal_id(group_id)) {
                    Some(Component::Processor(p)) => {
                        p.component.as_ref().map(|_| relationship_names(p))
                    }
                    _ => None,
                };
                let z_index = group
                    .components
                    .values()
                    .filter_map(|c| match c {
                        Component::Connection(c) => Some(c.z_index),
                        _ => None,
                    })
                    .max()
                    .map(|z| z + 1)
                    .unwrap_or(0);

                Component::Connection(ConnectionEntity {
                    id,
                    revision,
                    permissions: Permissions::FULL,
                    parent_group_id,
                    source,
                    destination,
                    bends,
                    label_index: 0,
                    z_index,
                    component: Some(ConnectionDetails {
                        name: None,
                        selected_relationships: Some(selected_relationships)
                            .filter(|s| !s.is_empty()),
                        available_relationships: available,
                    }),
                })
            }
        };
        Ok(component)
    }
}

#[async_trait]
impl FlowApi for InMemoryFlowApi {
    async fn get_flow(&self, group_id: &str) -> ApiResult<ProcessGroupFlow> {
        let mut state = self.state.lock();
        state.take_failure()?;
        let group = state
            .groups
            .get(group_id)
            .ok_or_else(|| ApiError::not_found(format!("Process group '{}' does not exist", group_id)))?;

        let mut flow = ProcessGroupContents::default();
        for component in group.components.values() {
            flow.push(component.clone());
        }
        Ok(ProcessGroupFlow {
            id: group_id.to_string(),
            permissions: group.permissions,
            version_info: Some(group.version_info.clone()),
            flow,
        })
    }

    async fn get_version_info(&self, group_id: &str) -> ApiResult<VersionInfo> {
        let mut state = self.state.lock();
        state.take_failure()?;
        state
            .groups
            .get(group_id)
            .map(|g| g.version_info.clone())
            .ok_or_else(|| ApiError::not_found(format!("Process group '{}' does not exist", group_id)))
    }

    async fn get_component(&self, component: &ComponentRef) -> ApiResult<Component> {
        let mut state = self.state.lock();
        state.take_failure()?;
        let (_, stored) = state.lookup(component)?;
        if !stored.permissions().can_read {
            return Err(ApiError::permission_denied(format!(
                "Not authorized to read {} '{}'",
                component.kind, component.id
            )));
        }
        Ok(stored.clone())
    }

    async fn create_component(&self, group_id: &str, request: CreateRequest) -> ApiResult<Component> {
        let mut state = self.state.lock();
        state.take_failure()?;
        let writable = state
            .groups
            .get(group_id)
            .map(|g| g.permissions.can_write)
            .ok_or_else(|| ApiError::not_found(format!("Process group '{}' does not exist", group_id)))?;
        if !writable {
            return Err(ApiError::permission_denied(format!(
                "Not authorized to modify process group '{}'",
                group_id
            )));
        }

        let component = self.build(&mut state, group_id, request)?;
        if let Some(group) = state.groups.get_mut(group_id) {
            group
                .components
                .insert(component.id().to_string(), component.clone());
            group.touch();
        }
        log::debug!("Created {} '{}' in '{}'", component.kind(), component.id(), group_id);
        Ok(component)
    }

    async fn update_component(&self, component: Component) -> ApiResult<Component> {
        let mut state = self.state.lock();
        state.take_failure()?;
        let (group_id, stored) = state.lookup(&component.to_ref())?;
        check_writable(stored, component.revision())?;

        let next = stored.revision().next(&self.client_id);
        let group_id = group_id.to_string();
        let mut updated = component;
        *updated.revision_mut() = next;

        if let Some(group) = state.groups.get_mut(&group_id) {
            group
                .components
                .insert(updated.id().to_string(), updated.clone());
            group.touch();
        }
        Ok(updated)
    }

    async fn remove_component(&self, component: &ComponentRef, revision: &Revision) -> ApiResult<()> {
        let mut state = self.state.lock();
        state.take_failure()?;
        let (group_id, stored) = state.lookup(component)?;
        check_writable(stored, revision)?;

        let group_id = group_id.to_string();
        if let Some(group) = state.groups.get_mut(&group_id) {
            group.components.shift_remove(&component.id);
            // Connections cannot outlive either end
            group.components.retain(|_, c| match c {
                Component::Connection(conn) => !conn.touches(&component.id),
                _ => true,
            });
            group.touch();
        }
        Ok(())
    }
}
