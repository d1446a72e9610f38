//! End-to-end scenarios against the in-memory collaborator

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flow_canvas::api::ApiResult;
use flow_canvas::manager::connection::SelfLoopOffsets;
use flow_canvas::manager::SetOptions;
use flow_canvas::types::{ConnectionDetails, ProcessGroupFlow};
use flow_canvas::{
    ApiError, Canvas, CanvasConfig, CanvasError, CanvasHandlers, Component, ComponentKind,
    ComponentRef, Connectable, ConnectableKind, ConnectionEntity, CreateRequest, FileViewportStore,
    FlowApi, FunnelEntity, GraphState, InMemoryFlowApi, Permissions, Point, ProcessGroupContents,
    RecordingDialog, Revision, VersionInfo,
};
use parking_lot::Mutex;
use tokio_test::{assert_err, assert_ok};

/// Host handlers with canned answers
#[derive(Default)]
struct TestHandlers {
    approve_remote: bool,
    confirmations: Mutex<Vec<String>>,
}

#[async_trait]
impl CanvasHandlers for TestHandlers {
    async fn connection_creation(
        &self,
        source: &Connectable,
        destination: &Connectable,
    ) -> flow_canvas::Result<CreateRequest> {
        Ok(CreateRequest::Connection {
            source: source.clone(),
            destination: destination.clone(),
            selected_relationships: BTreeSet::new(),
            bends: Vec::new(),
        })
    }

    async fn confirm_remote_retarget(
        &self,
        proposed: &ConnectionEntity,
    ) -> flow_canvas::Result<Option<ConnectionEntity>> {
        self.confirmations.lock().push(proposed.id.clone());
        Ok(self.approve_remote.then(|| proposed.clone()))
    }
}

/// Collaborator whose snapshots can lag behind its writes
struct LaggingFlowApi {
    inner: InMemoryFlowApi,
    frozen: Mutex<Option<ProcessGroupFlow>>,
}

impl LaggingFlowApi {
    fn new() -> Self {
        Self {
            inner: InMemoryFlowApi::with_seed(7),
            frozen: Mutex::new(None),
        }
    }

    /// Serve the current snapshot from now on
    async fn freeze(&self) {
        let snapshot = self.inner.get_flow("root").await.unwrap();
        *self.frozen.lock() = Some(snapshot);
    }
}

#[async_trait]
impl FlowApi for LaggingFlowApi {
    async fn get_flow(&self, group_id: &str) -> ApiResult<ProcessGroupFlow> {
        let frozen = self.frozen.lock().clone();
        match frozen {
            Some(snapshot) => Ok(snapshot),
            None => self.inner.get_flow(group_id).await,
        }
    }

    async fn get_version_info(&self, group_id: &str) -> ApiResult<VersionInfo> {
        self.inner.get_version_info(group_id).await
    }

    async fn get_component(&self, component: &ComponentRef) -> ApiResult<Component> {
        self.inner.get_component(component).await
    }

    async fn create_component(&self, group_id: &str, request: CreateRequest) -> ApiResult<Component> {
        self.inner.create_component(group_id, request).await
    }

    async fn update_component(&self, component: Component) -> ApiResult<Component> {
        self.inner.update_component(component).await
    }

    async fn remove_component(&self, component: &ComponentRef, revision: &Revision) -> ApiResult<()> {
        self.inner.remove_component(component, revision).await
    }
}

struct Harness {
    canvas: Canvas,
    api: Arc<InMemoryFlowApi>,
    dialog: Arc<RecordingDialog>,
    handlers: Arc<TestHandlers>,
}

fn quiet_config() -> CanvasConfig {
    CanvasConfig {
        auto_poll: false,
        ..CanvasConfig::default()
    }
}

fn harness_with(config: CanvasConfig, handlers: TestHandlers) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let api = Arc::new(InMemoryFlowApi::with_seed(42));
    api.insert_group("root", Permissions::FULL);
    let dialog = Arc::new(RecordingDialog::new());
    let handlers = Arc::new(handlers);
    let canvas = Canvas::builder(api.clone())
        .dialog(dialog.clone())
        .handlers(handlers.clone())
        .config(config)
        .build();
    Harness {
        canvas,
        api,
        dialog,
        handlers,
    }
}

fn harness() -> Harness {
    harness_with(quiet_config(), TestHandlers::default())
}

fn funnel(id: &str, version: u64, x: f64, y: f64) -> Component {
    Component::Funnel(FunnelEntity {
        id: id.to_string(),
        revision: Revision::new(version),
        permissions: Permissions::FULL,
        position: Point::new(x, y),
        parent_group_id: "root".to_string(),
    })
}

fn endpoint(id: &str) -> Connectable {
    Connectable::new(id, "root", ConnectableKind::Funnel)
}

fn connection(id: &str, source: &str, destination: &str, bends: Vec<Point>) -> Component {
    Component::Connection(ConnectionEntity {
        id: id.to_string(),
        revision: Revision::new(1),
        permissions: Permissions::FULL,
        parent_group_id: "root".to_string(),
        source: endpoint(source),
        destination: endpoint(destination),
        bends,
        label_index: 0,
        z_index: 0,
        component: Some(ConnectionDetails::default()),
    })
}

fn live_connection(canvas: &Canvas, id: &str) -> Option<ConnectionEntity> {
    canvas.with_graph(|g| g.connections().get(id).cloned())
}

fn live_funnel(canvas: &Canvas, id: &str) -> Option<FunnelEntity> {
    canvas.with_graph(|g| g.funnels().get(id).cloned())
}

#[tokio::test]
async fn create_then_delete_cascades_to_connections() {
    let h = harness();
    h.api.seed(funnel("sink", 1, 400.0, 100.0));
    h.canvas.load("root").await.unwrap();

    let created = assert_ok!(h.canvas.create_funnel(Point::new(100.0, 100.0)).await);
    let funnel_id = created.id().to_string();
    assert_eq!(
        live_funnel(&h.canvas, &funnel_id).unwrap().position,
        Point::new(100.0, 100.0)
    );

    let link = h
        .canvas
        .create_connection(endpoint(&funnel_id), endpoint("sink"))
        .await
        .unwrap();
    assert!(live_connection(&h.canvas, link.id()).is_some());

    let removed = h
        .canvas
        .delete(&[ComponentRef::new(ComponentKind::Funnel, funnel_id.clone())])
        .await
        .unwrap();

    assert_eq!(removed.len(), 2);
    assert!(live_funnel(&h.canvas, &funnel_id).is_none());
    assert!(live_connection(&h.canvas, link.id()).is_none());
    assert!(live_funnel(&h.canvas, "sink").is_some());
    assert!(h.api.stored(&link.to_ref()).is_none());
}

#[tokio::test]
async fn bend_inserted_between_existing_bends_keeps_label_index() {
    let h = harness();
    h.api.seed(funnel("left", 1, -200.0, -24.0));
    h.api.seed(funnel("right", 1, 200.0, -24.0));
    h.api.seed(connection(
        "c1",
        "left",
        "right",
        vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
    ));
    h.canvas.load("root").await.unwrap();

    let updated = assert_ok!(h.canvas.insert_bend("c1", Point::new(5.0, 0.5)).await);

    assert_eq!(
        updated.bends,
        vec![Point::new(0.0, 0.0), Point::new(5.0, 0.5), Point::new(10.0, 0.0)]
    );
    assert_eq!(updated.label_index, 0);
    assert_eq!(updated.revision.version, 2);
    assert_eq!(live_connection(&h.canvas, "c1").unwrap().bends.len(), 3);
}

#[tokio::test]
async fn stale_snapshot_does_not_overwrite_newer_edit() {
    let _ = env_logger::builder().is_test(true).try_init();
    let api = Arc::new(LaggingFlowApi::new());
    api.inner.insert_group("root", Permissions::FULL);
    api.inner.seed(funnel("f1", 3, 0.0, 0.0));
    let canvas = Canvas::builder(api.clone()).config(quiet_config()).build();
    canvas.load("root").await.unwrap();

    // A fetch that started before the edit answers after it
    api.freeze().await;
    canvas.select("f1").unwrap();
    canvas.drag_selection(20.0, 0.0).await.unwrap();
    assert_eq!(live_funnel(&canvas, "f1").unwrap().revision.version, 4);

    let outcome = canvas.refresh().await.unwrap();
    assert_eq!(outcome.stale, vec!["f1".to_string()]);

    let live = live_funnel(&canvas, "f1").unwrap();
    assert_eq!(live.revision.version, 4);
    assert_eq!(live.position, Point::new(20.0, 0.0));
}

#[test]
fn older_revision_loses_to_local_edit() {
    let mut graph = GraphState::new("root", SelfLoopOffsets { x: 75.0, y: 25.0 });
    graph.set_component(funnel("f1", 3, 0.0, 0.0), SetOptions::default());
    graph.set_component(funnel("f1", 4, 20.0, 0.0), SetOptions::authoritative());

    let mut contents = ProcessGroupContents::default();
    contents.push(funnel("f1", 2, -50.0, -50.0));
    let outcome = graph.set(contents, None, SetOptions::default());

    assert_eq!(outcome.stale, vec!["f1".to_string()]);
    let live = graph.funnels().get("f1").unwrap();
    assert_eq!(live.revision.version, 4);
    assert_eq!(live.position, Point::new(20.0, 0.0));
}

#[tokio::test]
async fn failed_drag_rolls_back_only_failed_moves() {
    let h = harness();
    h.api.seed(funnel("a", 1, 0.0, 0.0));
    h.api.seed(funnel("b", 1, 500.0, 0.0));
    h.canvas.load("root").await.unwrap();

    h.canvas.select("a").unwrap();
    h.canvas.select("b").unwrap();
    h.api.fail_next(ApiError::transient("connection reset"));

    let err = assert_err!(h.canvas.drag_selection(10.0, 10.0).await);
    assert!(matches!(err, CanvasError::Api(_)));

    let a = live_funnel(&h.canvas, "a").unwrap();
    let b = live_funnel(&h.canvas, "b").unwrap();
    assert_eq!(a.position, Point::new(0.0, 0.0));
    assert_eq!(a.revision.version, 1);
    assert_eq!(b.position, Point::new(510.0, 10.0));
    assert_eq!(b.revision.version, 2);
    assert_eq!(h.dialog.len(), 1);
}

#[tokio::test]
async fn drag_without_write_permission_is_refused() {
    let h = harness();
    h.api.seed(funnel("a", 1, 0.0, 0.0));
    let mut locked = funnel("locked", 1, 300.0, 0.0);
    if let Component::Funnel(f) = &mut locked {
        f.permissions = Permissions::READ_ONLY;
    }
    h.api.seed(locked);
    h.canvas.load("root").await.unwrap();

    h.canvas.select("a").unwrap();
    h.canvas.select("locked").unwrap();
    let err = assert_err!(h.canvas.drag_selection(10.0, 10.0).await);

    assert!(matches!(err, CanvasError::PermissionDenied(_)));
    assert_eq!(live_funnel(&h.canvas, "a").unwrap().position, Point::new(0.0, 0.0));
    assert_eq!(h.dialog.len(), 1);
}

#[tokio::test]
async fn drag_with_read_only_self_loop_is_refused() {
    let h = harness();
    h.api.seed(funnel("a", 1, 0.0, 0.0));
    let mut looped = connection(
        "loop",
        "a",
        "a",
        vec![Point::new(123.0, -1.0), Point::new(123.0, 49.0)],
    );
    if let Component::Connection(c) = &mut looped {
        c.permissions = Permissions::READ_ONLY;
    }
    h.api.seed(looped);
    h.canvas.load("root").await.unwrap();

    h.canvas.select("a").unwrap();
    let err = assert_err!(h.canvas.drag_selection(10.0, 10.0).await);

    assert!(matches!(err, CanvasError::PermissionDenied(_)));
    let a = live_funnel(&h.canvas, "a").unwrap();
    assert_eq!(a.position, Point::new(0.0, 0.0));
    assert_eq!(a.revision.version, 1);
    let stored = h
        .api
        .stored(&ComponentRef::new(ComponentKind::Funnel, "a"))
        .unwrap();
    assert_eq!(stored.revision().version, 1);
    assert_eq!(
        live_connection(&h.canvas, "loop").unwrap().bends[0],
        Point::new(123.0, -1.0)
    );
}

#[tokio::test]
async fn deleting_component_with_its_connection_succeeds() {
    let h = harness();
    h.api.seed(funnel("a", 1, 0.0, 0.0));
    h.api.seed(funnel("b", 1, 400.0, 0.0));
    h.api.seed(connection("c1", "a", "b", Vec::new()));
    h.canvas.load("root").await.unwrap();

    let removed = assert_ok!(
        h.canvas
            .delete(&[
                ComponentRef::new(ComponentKind::Funnel, "a"),
                ComponentRef::new(ComponentKind::Connection, "c1"),
            ])
            .await
    );

    let mut ids: Vec<&str> = removed.iter().map(Component::id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["a", "c1"]);
    assert!(h.dialog.is_empty());
    assert!(live_connection(&h.canvas, "c1").is_none());
    assert!(h
        .api
        .stored(&ComponentRef::new(ComponentKind::Connection, "c1"))
        .is_none());
    assert!(live_funnel(&h.canvas, "b").is_some());
}

#[tokio::test]
async fn self_loop_keeps_its_last_two_bends() {
    let h = harness();
    h.api.seed(funnel("f1", 1, 0.0, 0.0));
    h.api.seed(connection(
        "loop",
        "f1",
        "f1",
        vec![Point::new(123.0, -1.0), Point::new(123.0, 49.0)],
    ));
    h.canvas.load("root").await.unwrap();

    let err = assert_err!(h.canvas.remove_bend("loop", 0).await);
    assert!(matches!(err, CanvasError::SelfLoopBendFloor { .. }));
    assert_eq!(live_connection(&h.canvas, "loop").unwrap().bends.len(), 2);
    assert_eq!(h.dialog.len(), 1);
    assert_eq!(h.dialog.shown()[0].0, "Connection");
}

#[tokio::test]
async fn failed_bend_edit_restores_geometry() {
    let h = harness();
    h.api.seed(funnel("a", 1, 0.0, 0.0));
    h.api.seed(funnel("b", 1, 400.0, 0.0));
    h.api.seed(connection("c1", "a", "b", Vec::new()));
    h.canvas.load("root").await.unwrap();

    h.api.fail_next(ApiError::transient("timeout"));
    assert!(h.canvas.insert_bend("c1", Point::new(200.0, 80.0)).await.is_err());

    let live = live_connection(&h.canvas, "c1").unwrap();
    assert!(live.bends.is_empty());
    assert_eq!(live.revision.version, 1);
}

#[tokio::test]
async fn endpoint_drop_on_remote_port_waits_for_confirmation() {
    let h = harness_with(
        quiet_config(),
        TestHandlers {
            approve_remote: true,
            ..TestHandlers::default()
        },
    );
    h.api.seed(funnel("a", 1, 0.0, 0.0));
    h.api.seed(funnel("b", 1, 400.0, 0.0));
    h.api.seed(connection("c1", "a", "b", Vec::new()));
    h.canvas.load("root").await.unwrap();
    h.canvas.begin_endpoint_drag("c1").unwrap();
    h.canvas.drag_endpoint("c1", Point::new(100.0, 300.0));
    let target = Connectable::new("ingest", "rpg-1", ConnectableKind::RemoteInputPort);
    let persisted = h.canvas.drop_endpoint("c1", Some(target)).await.unwrap().unwrap();

    assert_eq!(persisted.destination.id, "ingest");
    assert_eq!(persisted.revision.version, 2);
    assert_eq!(*h.handlers.confirmations.lock(), vec!["c1".to_string()]);
    assert!(h.dialog.is_empty());
}

#[tokio::test]
async fn declined_remote_retarget_reverts() {
    let h = harness();
    h.api.seed(funnel("a", 1, 0.0, 0.0));
    h.api.seed(funnel("b", 1, 400.0, 0.0));
    h.api.seed(connection("c1", "a", "b", Vec::new()));
    h.canvas.load("root").await.unwrap();

    h.canvas.begin_endpoint_drag("c1").unwrap();
    let target = Connectable::new("ingest", "rpg-1", ConnectableKind::RemoteInputPort);
    assert!(h.canvas.drop_endpoint("c1", Some(target)).await.unwrap().is_none());

    let live = live_connection(&h.canvas, "c1").unwrap();
    assert_eq!(live.destination.id, "b");
    assert_eq!(live.revision.version, 1);
}

#[tokio::test]
async fn retarget_into_self_loop_adds_bends() {
    let h = harness();
    h.api.seed(funnel("a", 1, 0.0, 0.0));
    h.api.seed(funnel("b", 1, 400.0, 0.0));
    h.api.seed(connection("c1", "a", "b", Vec::new()));
    h.canvas.load("root").await.unwrap();

    h.canvas.begin_endpoint_drag("c1").unwrap();
    let persisted = h
        .canvas
        .drop_endpoint("c1", Some(endpoint("a")))
        .await
        .unwrap()
        .unwrap();

    // Funnel "a" spans (0, 0) to (48, 48); its right-center is (48, 24)
    assert_eq!(
        persisted.bends,
        vec![Point::new(123.0, -1.0), Point::new(123.0, 49.0)]
    );
}

#[tokio::test]
async fn label_drag_persists_only_changes() {
    let h = harness();
    h.api.seed(funnel("a", 1, 0.0, 0.0));
    h.api.seed(funnel("b", 1, 400.0, 0.0));
    h.api.seed(connection(
        "c1",
        "a",
        "b",
        vec![Point::new(100.0, 200.0), Point::new(300.0, 200.0)],
    ));
    h.canvas.load("root").await.unwrap();

    h.canvas.begin_label_drag("c1").unwrap();
    h.canvas.drag_label("c1", Point::new(110.0, 190.0));
    assert!(h.canvas.end_label_drag("c1").await.unwrap().is_none());

    h.canvas.begin_label_drag("c1").unwrap();
    assert_eq!(h.canvas.drag_label("c1", Point::new(290.0, 210.0)), Some(1));
    let persisted = h.canvas.end_label_drag("c1").await.unwrap().unwrap();
    assert_eq!(persisted.label_index, 1);
    assert_eq!(persisted.revision.version, 2);
}

#[tokio::test(start_paused = true)]
async fn polling_picks_up_remote_changes_and_swallows_failures() {
    let h = harness_with(CanvasConfig::default(), TestHandlers::default());
    h.canvas.load("root").await.unwrap();
    assert!(h.canvas.is_polling());
    assert!(!h.canvas.start_polling(), "second start is a no-op");

    h.api.seed(funnel("remote-edit", 1, 0.0, 0.0));
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(live_funnel(&h.canvas, "remote-edit").is_some());

    h.api.fail_next(ApiError::transient("offline"));
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(h.canvas.is_polling());
    assert!(h.dialog.is_empty());

    h.canvas.destroy();
    assert!(!h.canvas.is_polling());
}

#[tokio::test]
async fn viewport_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileViewportStore::new(dir.path().join("views.json")));

    let api = Arc::new(InMemoryFlowApi::with_seed(3));
    api.insert_group("root", Permissions::FULL);
    api.seed(funnel("f1", 1, 0.0, 0.0));

    let first = Canvas::builder(api.clone())
        .viewport_store(store.clone())
        .config(quiet_config())
        .build();
    first.load("root").await.unwrap();
    first.zoom_in();
    first.pan_by(30.0, -15.0);
    first.end_gesture();
    let saved = first.viewport().persisted();

    let second = Canvas::builder(api)
        .viewport_store(store)
        .config(quiet_config())
        .build();
    second.load("root").await.unwrap();
    assert_eq!(second.viewport().persisted(), saved);
}
