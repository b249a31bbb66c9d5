//! Behavioral equivalence of the on-disk session stores.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::thread;

use common::{name, tab, two_tab_model};
use sessionkeep_core::error::StoreError;
use sessionkeep_core::store::{JsonSessionStore, SqliteSessionStore, StoreHandle};
use sessionkeep_core::topology::TopologyModel;

fn backends(dir: &Path) -> Vec<(&'static str, StoreHandle)> {
    vec![
        (
            "sqlite",
            Arc::new(SqliteSessionStore::open(&dir.join("state.db"), 5000).unwrap()) as StoreHandle,
        ),
        (
            "json",
            Arc::new(JsonSessionStore::open(&dir.join("state.json")).unwrap()) as StoreHandle,
        ),
    ]
}

fn variant(session: &str, marker: &str) -> TopologyModel {
    TopologyModel::new(
        name(session),
        vec![tab(&[format!("/home/u/{marker}").as_str()], "fat", true)],
    )
    .unwrap()
}

#[test]
fn upsert_then_lookup_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    for (label, store) in backends(dir.path()) {
        let mut model = two_tab_model("proj");
        model.tabs[0].windows[1].cmdline = Some(vec!["npm".into(), "run".into(), "dev".into()]);
        model.tabs[0].windows[0]
            .env
            .insert("EDITOR".into(), "vim".into());
        store.upsert(&model).unwrap();
        assert_eq!(store.lookup(&name("proj")).unwrap(), model, "{label}");
    }
}

#[test]
fn last_write_wins_and_unrelated_keys_survive() {
    let dir = tempfile::tempdir().unwrap();
    for (label, store) in backends(dir.path()) {
        store.upsert(&variant("a", "one")).unwrap();
        store.upsert(&variant("b", "bee")).unwrap();
        store.upsert(&variant("a", "two")).unwrap();

        assert_eq!(store.lookup(&name("a")).unwrap(), variant("a", "two"), "{label}");
        assert_eq!(store.lookup(&name("b")).unwrap(), variant("b", "bee"), "{label}");
    }
}

#[test]
fn missing_session_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    for (label, store) in backends(dir.path()) {
        assert!(
            matches!(store.lookup(&name("ghost")), Err(StoreError::NotFound(_))),
            "{label}"
        );
    }
}

#[test]
fn delete_and_list_agree_across_backends() {
    let dir = tempfile::tempdir().unwrap();
    for (label, store) in backends(dir.path()) {
        store.upsert(&variant("zeta", "z")).unwrap();
        store.upsert(&variant("alpha", "a")).unwrap();
        let listed: Vec<String> = store.list().unwrap().into_iter().map(String::from).collect();
        assert_eq!(listed, vec!["alpha", "zeta"], "{label}");

        assert!(store.delete(&name("zeta")).unwrap(), "{label}");
        assert!(matches!(
            store.lookup(&name("zeta")),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.lookup(&name("alpha")).unwrap(), variant("alpha", "a"));
    }
}

#[test]
fn concurrent_upserts_to_different_keys_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    for (label, store) in backends(dir.path()) {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for round in 0..5 {
                        store
                            .upsert(&variant(&format!("s{i}"), &format!("r{round}")))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for i in 0..8 {
            let session = format!("s{i}");
            assert_eq!(
                store.lookup(&name(&session)).unwrap(),
                variant(&session, "r4"),
                "{label}"
            );
        }
        assert_eq!(store.list().unwrap().len(), 8, "{label}");
    }
}

#[test]
fn concurrent_writes_to_same_key_leave_a_complete_record() {
    let dir = tempfile::tempdir().unwrap();
    for (label, store) in backends(dir.path()) {
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    store.upsert(&variant("shared", &format!("w{i}"))).unwrap();
                    // Readers never observe a partial record.
                    store.lookup(&name("shared")).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let final_model = store.lookup(&name("shared")).unwrap();
        let cwd = &final_model.tabs[0].windows[0].cwd;
        assert!(
            (0..6).any(|i| cwd == &format!("/home/u/w{i}")),
            "{label}: unexpected {cwd}"
        );
    }
}

#[test]
fn sqlite_and_json_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    for (_, store) in backends(dir.path()) {
        store.upsert(&two_tab_model("keep")).unwrap();
    }
    for (label, store) in backends(dir.path()) {
        assert_eq!(
            store.lookup(&name("keep")).unwrap(),
            two_tab_model("keep"),
            "{label}"
        );
    }
}
