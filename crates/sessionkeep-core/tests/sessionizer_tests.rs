//! Open-or-create flow of the sessionizer.

mod common;

use std::sync::Arc;

use common::{CountingStore, ls_payload, name, tab, two_tab_model};
use sessionkeep_core::controller::{ControllerError, ControllerOp, LaunchType, MockController};
use sessionkeep_core::error::Error;
use sessionkeep_core::replay::ReplayConfig;
use sessionkeep_core::sessionizer::{OpenOutcome, Sessionizer};
use sessionkeep_core::snapshot::SnapshotExtractor;
use sessionkeep_core::store::{SessionStore, StoreHandle};
use sessionkeep_core::topology::TopologyModel;

fn sessionizer(mock: &Arc<MockController>, store: &Arc<CountingStore>) -> Sessionizer {
    Sessionizer::new(
        mock.clone(),
        store.clone() as StoreHandle,
        SnapshotExtractor::default(),
        ReplayConfig::default(),
    )
}

#[tokio::test]
async fn first_open_creates_tagged_window_and_records_it() {
    let root = tempfile::tempdir().unwrap();
    let project = root.path().join("api");
    std::fs::create_dir(&project).unwrap();
    let cwd = project.to_string_lossy().into_owned();

    let mock = Arc::new(MockController::new().with_introspect_payload(ls_payload("api", &[&cwd])));
    let store = CountingStore::new();

    let outcome = sessionizer(&mock, &store).apply(&project, Some(3)).await.unwrap();
    assert_eq!(
        outcome,
        OpenOutcome::Created {
            session: name("api"),
            window_id: 1000
        }
    );

    let ops = mock.ops();
    assert_eq!(ops.len(), 3, "{ops:#?}");
    let ControllerOp::Launch(req) = &ops[0] else {
        panic!("expected launch first, got {:?}", ops[0]);
    };
    assert_eq!(req.launch_type, LaunchType::NewOsWindow);
    assert_eq!(req.cwd, cwd);
    assert_eq!(req.tags.get("session_name").map(String::as_str), Some("api"));
    assert!(!req.hold);
    assert_eq!(ops[1], ControllerOp::Introspect(Some("id:1000".to_string())));
    // The origin window may be running `sk` itself, so it closes last.
    assert_eq!(ops.last(), Some(&ControllerOp::CloseWindow(3)));

    assert_eq!(store.upserts(), 1);
    let stored = store.lookup(&name("api")).unwrap();
    assert_eq!(stored.tabs[0].windows[0].cwd, cwd);
}

#[tokio::test]
async fn first_open_is_recorded_before_the_origin_closes() {
    let mock = Arc::new(
        MockController::new()
            .with_introspect_payload(ls_payload("web", &["/work/web"]))
            .with_close_error(ControllerError::NotRunning),
    );
    let store = CountingStore::new();

    let err = sessionizer(&mock, &store)
        .apply(std::path::Path::new("/work/web"), Some(3))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Controller(ControllerError::NotRunning)));
    assert_eq!(store.upserts(), 1);
    assert!(store.lookup(&name("web")).is_ok());
}

#[tokio::test]
async fn parent_dir_components_resolve_to_the_project() {
    let mock = Arc::new(MockController::new().with_introspect_payload(ls_payload("api", &["/work/api"])));
    let store = CountingStore::new();

    let outcome = sessionizer(&mock, &store)
        .apply(std::path::Path::new("/work/api/sub/.."), None)
        .await
        .unwrap();

    let OpenOutcome::Created { session, .. } = outcome else {
        panic!("expected a new session");
    };
    assert_eq!(session, name("api"));
    let ControllerOp::Launch(req) = &mock.ops()[0] else {
        panic!("expected launch first");
    };
    assert_eq!(req.cwd, "/work/api");
}

#[tokio::test]
async fn known_session_is_replayed() {
    let mock = Arc::new(MockController::new());
    let store = CountingStore::new();
    store.upsert(&two_tab_model("proj")).unwrap();

    let outcome = sessionizer(&mock, &store)
        .apply(std::path::Path::new("/work/proj"), Some(7))
        .await
        .unwrap();

    let OpenOutcome::Replayed { session, report } = outcome else {
        panic!("expected replay");
    };
    assert_eq!(session, name("proj"));
    assert_eq!(report.windows_launched, 3);
    assert!(report.origin_closed);
    let closes = mock
        .ops()
        .iter()
        .filter(|op| matches!(op, ControllerOp::CloseWindow(7)))
        .count();
    assert_eq!(closes, 1);
    // Replay never writes back to the store.
    assert_eq!(store.upserts(), 1);
}

#[tokio::test]
async fn single_tab_replay_still_closes_origin() {
    let mock = Arc::new(MockController::new());
    let store = CountingStore::new();
    store
        .upsert(&TopologyModel::new(name("solo"), vec![tab(&["/solo"], "fat", true)]).unwrap())
        .unwrap();

    let outcome = sessionizer(&mock, &store)
        .apply(std::path::Path::new("/work/solo"), Some(4))
        .await
        .unwrap();

    assert!(matches!(outcome, OpenOutcome::Replayed { .. }));
    let ops = mock.ops();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].launch_type(), Some(LaunchType::NewOsWindow));
    assert_eq!(ops[1], ControllerOp::CloseWindow(4));
}

#[tokio::test]
async fn bootstrap_surfaces_controller_failures() {
    let mock = Arc::new(MockController::new().with_introspect_error(ControllerError::NotRunning));
    let store = CountingStore::new();

    let err = sessionizer(&mock, &store)
        .apply(std::path::Path::new("/work/new"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Controller(ControllerError::NotRunning)));
    assert_eq!(store.upserts(), 0);
}

#[tokio::test]
async fn root_directory_has_no_session_name() {
    let mock = Arc::new(MockController::new());
    let store = CountingStore::new();
    let err = sessionizer(&mock, &store)
        .apply(std::path::Path::new("/"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Model(_)));
    assert!(mock.ops().is_empty());
}
