//! Core types for the flow canvas
//!
//! These types define the entities drawn on the canvas (processors,
//! funnels, remote process groups and the connections between them),
//! their permissions and revisions, and the snapshot shapes exchanged with
//! the flow collaborator.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::dimensions;
use crate::geometry::{Circle, Point, Rect, Shape};
use crate::revision::Revision;

/// Unique identifier for a component within a process group scope
pub type ComponentId = String;

/// Read/write access granted to the current user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub can_read: bool,
    pub can_write: bool,
}

impl Permissions {
    pub const FULL: Permissions = Permissions {
        can_read: true,
        can_write: true,
    };
    pub const READ_ONLY: Permissions = Permissions {
        can_read: true,
        can_write: false,
    };
    pub const NONE: Permissions = Permissions {
        can_read: false,
        can_write: false,
    };
}

/// The four entity variants managed by the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentKind {
    Processor,
    Funnel,
    RemoteProcessGroup,
    Connection,
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Processor => "Processor",
            Self::Funnel => "Funnel",
            Self::RemoteProcessGroup => "Remote process group",
            Self::Connection => "Connection",
        };
        f.write_str(label)
    }
}

/// What a connection endpoint points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectableKind {
    Processor,
    Funnel,
    /// Input port of a child process group
    InputPort,
    /// Output port of a child process group
    OutputPort,
    /// Input port of a remote process group
    RemoteInputPort,
    /// Output port of a remote process group
    RemoteOutputPort,
}

impl ConnectableKind {
    /// Port on a process-group boundary
    pub fn is_group_port(&self) -> bool {
        matches!(self, Self::InputPort | Self::OutputPort)
    }

    pub fn is_remote_port(&self) -> bool {
        matches!(self, Self::RemoteInputPort | Self::RemoteOutputPort)
    }

    /// Whether a connection may terminate here
    pub fn accepts_incoming(&self) -> bool {
        !matches!(self, Self::RemoteOutputPort)
    }
}

/// One end of a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connectable {
    pub id: ComponentId,
    pub group_id: String,
    #[serde(rename = "type")]
    pub kind: ConnectableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Connectable {
    pub fn new(id: impl Into<String>, group_id: impl Into<String>, kind: ConnectableKind) -> Self {
        Self {
            id: id.into(),
            group_id: group_id.into(),
            kind,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Id of the component drawn on the canvas of `scope_group_id`
    ///
    /// Endpoints inside another group (remote ports, child group ports)
    /// attach to that group's shape.
    pub fn terminal_id<'a>(&'a self, scope_group_id: &str) -> &'a str {
        if self.group_id == scope_group_id {
            &self.id
        } else {
            &self.group_id
        }
    }
}

/// Common capability set of every canvas entity
pub trait GraphEntity: Clone + std::fmt::Debug + Send + Sync + 'static {
    const KIND: ComponentKind;

    fn id(&self) -> &str;
    fn revision(&self) -> &Revision;
    fn permissions(&self) -> &Permissions;
    /// Owning process-group scope
    fn parent_group_id(&self) -> &str;

    /// Top-left position; connections have none
    fn position(&self) -> Option<Point> {
        None
    }

    fn into_component(self) -> Component;
    fn from_component(component: Component) -> Option<Self>;
}

/// Entities with a position and an outline on the canvas
pub trait PositionedEntity: GraphEntity {
    fn set_position(&mut self, position: Point);
    fn shape(&self) -> Shape;

    fn bounds(&self) -> Rect {
        self.shape().bounds()
    }
}

/// Run state of a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessorState {
    Running,
    #[default]
    Stopped,
    Disabled,
    Invalid,
}

/// Named output of a processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub name: String,
    #[serde(default)]
    pub auto_terminate: bool,
}

/// Readable part of a processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorDetails {
    pub name: String,
    #[serde(rename = "type")]
    pub processor_type: String,
    #[serde(default)]
    pub state: ProcessorState,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorEntity {
    pub id: ComponentId,
    pub revision: Revision,
    pub permissions: Permissions,
    pub position: Point,
    pub parent_group_id: String,
    /// Absent when the user cannot read the processor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ProcessorDetails>,
}

impl GraphEntity for ProcessorEntity {
    const KIND: ComponentKind = ComponentKind::Processor;

    fn id(&self) -> &str {
        &self.id
    }
    fn revision(&self) -> &Revision {
        &self.revision
    }
    fn permissions(&self) -> &Permissions {
        &self.permissions
    }
    fn parent_group_id(&self) -> &str {
        &self.parent_group_id
    }
    fn position(&self) -> Option<Point> {
        Some(self.position)
    }
    fn into_component(self) -> Component {
        Component::Processor(self)
    }
    fn from_component(component: Component) -> Option<Self> {
        match component {
            Component::Processor(p) => Some(p),
            _ => None,
        }
    }
}

impl PositionedEntity for ProcessorEntity {
    fn set_position(&mut self, position: Point) {
        self.position = position;
    }
    fn shape(&self) -> Shape {
        Shape::Rect(Rect::at(
            self.position,
            dimensions::PROCESSOR_WIDTH,
            dimensions::PROCESSOR_HEIGHT,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelEntity {
    pub id: ComponentId,
    pub revision: Revision,
    pub permissions: Permissions,
    pub position: Point,
    pub parent_group_id: String,
}

impl GraphEntity for FunnelEntity {
    const KIND: ComponentKind = ComponentKind::Funnel;

    fn id(&self) -> &str {
        &self.id
    }
    fn revision(&self) -> &Revision {
        &self.revision
    }
    fn permissions(&self) -> &Permissions {
        &self.permissions
    }
    fn parent_group_id(&self) -> &str {
        &self.parent_group_id
    }
    fn position(&self) -> Option<Point> {
        Some(self.position)
    }
    fn into_component(self) -> Component {
        Component::Funnel(self)
    }
    fn from_component(component: Component) -> Option<Self> {
        match component {
            Component::Funnel(f) => Some(f),
            _ => None,
        }
    }
}

impl PositionedEntity for FunnelEntity {
    fn set_position(&mut self, position: Point) {
        self.position = position;
    }
    fn shape(&self) -> Shape {
        let radius = dimensions::FUNNEL_SIZE / 2.0;
        Shape::Circle(Circle::new(self.position.offset(radius, radius), radius))
    }
}

/// Port advertised by a remote process group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePort {
    pub id: String,
    pub name: String,
    /// False once the remote instance no longer exposes the port
    #[serde(default = "default_true")]
    pub exists: bool,
}

fn default_true() -> bool {
    true
}

/// Readable part of a remote process group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProcessGroupDetails {
    pub name: String,
    pub target_uris: String,
    #[serde(default)]
    pub transmitting: bool,
    #[serde(default)]
    pub input_ports: Vec<RemotePort>,
    #[serde(default)]
    pub output_ports: Vec<RemotePort>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProcessGroupEntity {
    pub id: ComponentId,
    pub revision: Revision,
    pub permissions: Permissions,
    pub position: Point,
    pub parent_group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<RemoteProcessGroupDetails>,
}

impl GraphEntity for RemoteProcessGroupEntity {
    const KIND: ComponentKind = ComponentKind::RemoteProcessGroup;

    fn id(&self) -> &str {
        &self.id
    }
    fn revision(&self) -> &Revision {
        &self.revision
    }
    fn permissions(&self) -> &Permissions {
        &self.permissions
    }
    fn parent_group_id(&self) -> &str {
        &self.parent_group_id
    }
    fn position(&self) -> Option<Point> {
        Some(self.position)
    }
    fn into_component(self) -> Component {
        Component::RemoteProcessGroup(self)
    }
    fn from_component(component: Component) -> Option<Self> {
        match component {
            Component::RemoteProcessGroup(r) => Some(r),
            _ => None,
        }
    }
}

impl PositionedEntity for RemoteProcessGroupEntity {
    fn set_position(&mut self, position: Point) {
        self.position = position;
    }
    fn shape(&self) -> Shape {
        Shape::Rect(Rect::at(
            self.position,
            dimensions::REMOTE_PROCESS_GROUP_WIDTH,
            dimensions::REMOTE_PROCESS_GROUP_HEIGHT,
        ))
    }
}

/// Readable part of a connection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Upstream outputs feeding this connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_relationships: Option<BTreeSet<String>>,
    /// Outputs the source currently offers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_relationships: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEntity {
    pub id: ComponentId,
    pub revision: Revision,
    pub permissions: Permissions,
    pub parent_group_id: String,
    pub source: Connectable,
    pub destination: Connectable,
    #[serde(default)]
    pub bends: Vec<Point>,
    #[serde(default)]
    pub label_index: usize,
    #[serde(default)]
    pub z_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ConnectionDetails>,
}

impl ConnectionEntity {
    pub fn source_terminal(&self) -> &str {
        self.source.terminal_id(&self.parent_group_id)
    }

    pub fn destination_terminal(&self) -> &str {
        self.destination.terminal_id(&self.parent_group_id)
    }

    /// Source and destination resolve to the same component
    pub fn is_self_loop(&self) -> bool {
        self.source_terminal() == self.destination_terminal()
    }

    /// Whether either end attaches to `component_id`
    pub fn touches(&self, component_id: &str) -> bool {
        self.source_terminal() == component_id || self.destination_terminal() == component_id
    }

    /// Explicit, non-blank name
    pub fn name(&self) -> Option<&str> {
        self.component
            .as_ref()
            .and_then(|c| c.name.as_deref())
            .filter(|n| !n.trim().is_empty())
    }

    /// `label_index` clamped to the available bends
    pub fn clamped_label_index(&self) -> usize {
        self.label_index.min(self.bends.len().saturating_sub(1))
    }
}

impl GraphEntity for ConnectionEntity {
    const KIND: ComponentKind = ComponentKind::Connection;

    fn id(&self) -> &str {
        &self.id
    }
    fn revision(&self) -> &Revision {
        &self.revision
    }
    fn permissions(&self) -> &Permissions {
        &self.permissions
    }
    fn parent_group_id(&self) -> &str {
        &self.parent_group_id
    }
    fn into_component(self) -> Component {
        Component::Connection(self)
    }
    fn from_component(component: Component) -> Option<Self> {
        match component {
            Component::Connection(c) => Some(c),
            _ => None,
        }
    }
}

/// Any canvas entity, discriminated by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Component {
    Processor(ProcessorEntity),
    Funnel(FunnelEntity),
    RemoteProcessGroup(RemoteProcessGroupEntity),
    Connection(ConnectionEntity),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Processor(_) => ComponentKind::Processor,
            Self::Funnel(_) => ComponentKind::Funnel,
            Self::RemoteProcessGroup(_) => ComponentKind::RemoteProcessGroup,
            Self::Connection(_) => ComponentKind::Connection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Processor(e) => &e.id,
            Self::Funnel(e) => &e.id,
            Self::RemoteProcessGroup(e) => &e.id,
            Self::Connection(e) => &e.id,
        }
    }

    pub fn revision(&self) -> &Revision {
        match self {
            Self::Processor(e) => &e.revision,
            Self::Funnel(e) => &e.revision,
            Self::RemoteProcessGroup(e) => &e.revision,
            Self::Connection(e) => &e.revision,
        }
    }

    pub fn revision_mut(&mut self) -> &mut Revision {
        match self {
            Self::Processor(e) => &mut e.revision,
            Self::Funnel(e) => &mut e.revision,
            Self::RemoteProcessGroup(e) => &mut e.revision,
            Self::Connection(e) => &mut e.revision,
        }
    }

    pub fn permissions(&self) -> &Permissions {
        match self {
            Self::Processor(e) => &e.permissions,
            Self::Funnel(e) => &e.permissions,
            Self::RemoteProcessGroup(e) => &e.permissions,
            Self::Connection(e) => &e.permissions,
        }
    }

    pub fn parent_group_id(&self) -> &str {
        match self {
            Self::Processor(e) => &e.parent_group_id,
            Self::Funnel(e) => &e.parent_group_id,
            Self::RemoteProcessGroup(e) => &e.parent_group_id,
            Self::Connection(e) => &e.parent_group_id,
        }
    }

    pub fn to_ref(&self) -> ComponentRef {
        ComponentRef::new(self.kind(), self.id())
    }
}

/// Kind and id of a component, used by delete/reload/configure by type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRef {
    pub kind: ComponentKind,
    pub id: ComponentId,
}

impl ComponentRef {
    pub fn new(kind: ComponentKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// All entities of one process group, by type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupContents {
    #[serde(default)]
    pub processors: Vec<ProcessorEntity>,
    #[serde(default)]
    pub funnels: Vec<FunnelEntity>,
    #[serde(default)]
    pub remote_process_groups: Vec<RemoteProcessGroupEntity>,
    #[serde(default)]
    pub connections: Vec<ConnectionEntity>,
}

impl ProcessGroupContents {
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
            && self.funnels.is_empty()
            && self.remote_process_groups.is_empty()
            && self.connections.is_empty()
    }

    /// Sort a single component into the matching collection
    pub fn push(&mut self, component: Component) {
        match component {
            Component::Processor(e) => self.processors.push(e),
            Component::Funnel(e) => self.funnels.push(e),
            Component::RemoteProcessGroup(e) => self.remote_process_groups.push(e),
            Component::Connection(e) => self.connections.push(e),
        }
    }
}

impl From<Component> for ProcessGroupContents {
    fn from(component: Component) -> Self {
        let mut contents = Self::default();
        contents.push(component);
        contents
    }
}

/// Publication state of the whole graph in an external registry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub is_published: bool,
    pub is_dirty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published: Option<DateTime<Utc>>,
}

/// Full snapshot of a process group as returned by the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupFlow {
    pub id: String,
    pub permissions: Permissions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_info: Option<VersionInfo>,
    pub flow: ProcessGroupContents,
}

/// Parameters for creating a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateRequest {
    #[serde(rename_all = "camelCase")]
    Processor {
        position: Point,
        processor_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Funnel { position: Point },
    #[serde(rename_all = "camelCase")]
    RemoteProcessGroup { position: Point, target_uris: String },
    #[serde(rename_all = "camelCase")]
    Connection {
        source: Connectable,
        destination: Connectable,
        #[serde(default)]
        selected_relationships: BTreeSet<String>,
        #[serde(default)]
        bends: Vec<Point>,
    },
}

impl CreateRequest {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Processor { .. } => ComponentKind::Processor,
            Self::Funnel { .. } => ComponentKind::Funnel,
            Self::RemoteProcessGroup { .. } => ComponentKind::RemoteProcessGroup,
            Self::Connection { .. } => ComponentKind::Connection,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Entity builders shared by unit tests

    use super::*;

    pub fn processor(id: &str, version: u64, x: f64, y: f64) -> ProcessorEntity {
        ProcessorEntity {
            id: id.to_string(),
            revision: Revision::new(version),
            permissions: Permissions::FULL,
            position: Point::new(x, y),
            parent_group_id: "root".to_string(),
            component: Some(ProcessorDetails {
                name: format!("Processor {}", id),
                processor_type: "GenerateFlowFile".to_string(),
                state: ProcessorState::Stopped,
                relationships: vec![Relationship {
                    name: "success".to_string(),
                    auto_terminate: false,
                }],
            }),
        }
    }

    pub fn funnel(id: &str, version: u64, x: f64, y: f64) -> FunnelEntity {
        FunnelEntity {
            id: id.to_string(),
            revision: Revision::new(version),
            permissions: Permissions::FULL,
            position: Point::new(x, y),
            parent_group_id: "root".to_string(),
        }
    }

    pub fn remote_group(id: &str, version: u64, x: f64, y: f64) -> RemoteProcessGroupEntity {
        RemoteProcessGroupEntity {
            id: id.to_string(),
            revision: Revision::new(version),
            permissions: Permissions::FULL,
            position: Point::new(x, y),
            parent_group_id: "root".to_string(),
            component: Some(RemoteProcessGroupDetails {
                name: format!("Remote {}", id),
                target_uris: "https://remote.example:8443/".to_string(),
                transmitting: false,
                input_ports: vec![RemotePort {
                    id: format!("{}-in", id),
                    name: "ingest".to_string(),
                    exists: true,
                }],
                output_ports: Vec::new(),
            }),
        }
    }

    pub fn connection(id: &str, version: u64, source: &str, destination: &str) -> ConnectionEntity {
        ConnectionEntity {
            id: id.to_string(),
            revision: Revision::new(version),
            permissions: Permissions::FULL,
            parent_group_id: "root".to_string(),
            source: Connectable::new(source, "root", ConnectableKind::Processor),
            destination: Connectable::new(destination, "root", ConnectableKind::Processor),
            bends: Vec::new(),
            label_index: 0,
            z_index: 0,
            component: Some(ConnectionDetails {
                name: None,
                selected_relationships: Some(BTreeSet::from(["success".to_string()])),
                available_relationships: Some(BTreeSet::from(["success".to_string()])),
            }),
        }
    }
}
