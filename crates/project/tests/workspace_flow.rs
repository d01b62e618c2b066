use std::collections::HashSet;

use tempfile::tempdir;
use treepad_project::{
    DirectoryStore, DurableStore, FileId, FolderId, Language, MemoryStore, Notice, ProjectTree,
    ProjectTreeError, StoreError, Workspace,
};
use treepad_settings::Preferences;

/// Store whose writes can be switched off to simulate an unavailable backend.
#[derive(Debug, Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_writes: bool,
}

impl DurableStore for FlakyStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.load_raw(key)
    }

    fn save_raw(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Io {
                key: key.to_string(),
                source: std::io::Error::other("quota exceeded"),
            });
        }
        self.inner.save_raw(key, value)
    }
}

fn stored_tree(store: &MemoryStore) -> ProjectTree {
    store
        .load("folders", ProjectTree::new())
        .expect("stored tree should decode")
}

#[test]
fn empty_store_bootstraps_one_folder_with_current_file() {
    let workspace = Workspace::open(MemoryStore::new(), &Preferences::default());
    let tree = workspace.tree();
    assert_eq!(tree.folders().len(), 1);
    assert_eq!(tree.folders()[0].name(), "My Project");
    assert_eq!(tree.file_count(), 1);

    let file = &tree.folders()[0].files()[0];
    assert_eq!(file.name(), "untitled.js");
    assert!(file.content().is_empty());
    assert_eq!(workspace.current_file(), Some(file));

    // Bootstrap is persisted right away.
    assert_eq!(&stored_tree(workspace.store()), tree);
}

#[test]
fn proj_scenario_updates_current_file() {
    let mut workspace = Workspace::open(MemoryStore::new(), &Preferences::default());

    // Start from a truly empty tree: drop the bootstrap folder.
    let bootstrap = workspace.tree().folders()[0].id().clone();
    assert!(workspace.delete_folder(&bootstrap));
    assert!(workspace.tree().is_empty());
    assert!(workspace.current_file().is_none());

    let proj = workspace.create_folder("Proj");
    let a = workspace.create_file(&proj, "a.js").unwrap();
    workspace
        .update_file(a.clone().with_content("x=1"))
        .unwrap();

    assert_eq!(workspace.current_file().unwrap().content(), "x=1");
    assert_eq!(workspace.tree().folders().len(), 1);
    assert_eq!(workspace.tree().file_count(), 1);
    assert_eq!(
        stored_tree(workspace.store()).file(a.id()).unwrap().content(),
        "x=1"
    );
}

#[test]
fn deleting_non_current_file_keeps_selection() {
    let mut workspace = Workspace::open(MemoryStore::new(), &Preferences::default());
    let folder = workspace.tree().folders()[0].id().clone();
    let first = workspace.current_file().unwrap().clone();
    let second = workspace.create_file(&folder, "b.js").unwrap();
    workspace.select_file(first.clone()).unwrap();

    assert!(workspace.delete_file(&folder, second.id()));
    assert_eq!(workspace.current_file(), Some(&first));

    assert!(workspace.delete_file(&folder, first.id()));
    assert!(workspace.current_file().is_none());
}

#[test]
fn selecting_deleted_file_is_rejected_and_edits_keep_working() {
    let mut workspace = Workspace::open(MemoryStore::new(), &Preferences::default());
    let folder = workspace.tree().folders()[0].id().clone();
    let stale = workspace.current_file().unwrap().clone();
    assert!(workspace.delete_file(&folder, stale.id()));
    let fresh = workspace.create_file(&folder, "b.js").unwrap();

    assert!(matches!(
        workspace.select_file(stale.clone()),
        Err(ProjectTreeError::FileNotFound(id)) if &id == stale.id()
    ));
    assert_eq!(workspace.current_file(), Some(&fresh));

    workspace.update_current_content("still editable".into()).unwrap();
    assert_eq!(
        workspace.tree().file(fresh.id()).unwrap().content(),
        "still editable"
    );
}

#[test]
fn deleting_folder_clears_current_and_all_owned_ids() {
    let mut workspace = Workspace::open(MemoryStore::new(), &Preferences::default());
    let keep = workspace.create_folder("keep");
    let kept = workspace.create_file(&keep, "kept.js").unwrap();
    let doomed = workspace.create_folder("doomed");
    let mut doomed_ids = Vec::new();
    for name in ["a.js", "b.js", "c.js"] {
        doomed_ids.push(workspace.create_file(&doomed, name).unwrap().id().clone());
    }
    assert_eq!(workspace.current_file().unwrap().id(), doomed_ids.last().unwrap());

    assert!(workspace.delete_folder(&doomed));
    assert!(workspace.current_file().is_none());
    for id in &doomed_ids {
        assert!(workspace.tree().file(id).is_none());
    }
    assert!(workspace.tree().file(kept.id()).is_some());
}

#[test]
fn missing_ids_are_no_ops() {
    let mut workspace = Workspace::open(MemoryStore::new(), &Preferences::default());
    let before = workspace.tree().clone();
    let ghost_folder = FolderId::from_string("ghost");

    assert!(!workspace.delete_folder(&ghost_folder));
    assert!(!workspace.delete_file(&ghost_folder, &FileId::from_string("ghost")));
    assert!(workspace.create_file(&ghost_folder, "x.js").is_err());
    assert!(workspace
        .select_file_by_id(&FileId::from_string("ghost"))
        .is_err());
    assert_eq!(workspace.tree(), &before);
    assert!(workspace.current_file().is_some());
}

#[test]
fn reload_round_trips_tree_and_avoids_id_reuse() {
    let dir = tempdir().unwrap();
    let prefs = Preferences::default();

    let saved = {
        let mut workspace = Workspace::open(DirectoryStore::new(dir.path()), &prefs);
        let lib = workspace.create_folder("lib");
        let util = workspace.create_file(&lib, "util.ts").unwrap();
        workspace
            .set_file_language(util.id(), Language::TYPESCRIPT)
            .unwrap();
        workspace.update_current_content("export {}".into()).unwrap();
        workspace.tree().clone()
    };

    let mut reopened = Workspace::open(DirectoryStore::new(dir.path()), &prefs);
    assert_eq!(reopened.tree(), &saved);
    let util = saved.folders()[1].files()[0].clone();
    assert_eq!(util.language(), &Language::TYPESCRIPT);
    assert_eq!(util.content(), "export {}");

    // After reload the current file is the first file of the first folder.
    assert_eq!(reopened.current_file(), saved.first_file());

    let existing: HashSet<String> = saved
        .folders()
        .iter()
        .map(|folder| folder.id().to_string())
        .chain(saved.files().map(|file| file.id().to_string()))
        .collect();
    let fresh_folder = reopened.create_folder("fresh");
    let fresh_file = reopened.create_file(&fresh_folder, "n.js").unwrap();
    assert!(!existing.contains(fresh_folder.as_str()));
    assert!(!existing.contains(fresh_file.id().as_str()));
}

#[test]
fn loaded_tree_with_empty_first_folder_has_no_current_file() {
    let mut store = MemoryStore::new();
    store
        .save_raw(
            "folders",
            r#"[{"id":"1","name":"empty","files":[]},
                {"id":"2","name":"full","files":[{"id":"1","name":"a.js","content":"a","language":{"code":"js","name":"JavaScript"}}]}]"#,
        )
        .unwrap();
    let workspace = Workspace::open(store, &Preferences::default());
    assert_eq!(workspace.tree().folders().len(), 2);
    assert!(workspace.current_file().is_none());
}

#[test]
fn save_writes_per_file_snapshot_and_notice() {
    let mut workspace = Workspace::open(MemoryStore::new(), &Preferences::default());
    let id = workspace.current_file().unwrap().id().clone();
    workspace.update_current_content("let a = 1;".into()).unwrap();
    workspace.save().unwrap();

    assert_eq!(
        workspace.read_file_snapshot(&id).unwrap().as_deref(),
        Some("let a = 1;")
    );
    assert_eq!(
        workspace.drain_notices(),
        vec![Notice::Saved {
            file_name: "untitled.js".into()
        }]
    );
    assert!(workspace.drain_notices().is_empty());
}

#[test]
fn reset_clears_current_content_in_tree() {
    let mut workspace = Workspace::open(MemoryStore::new(), &Preferences::default());
    let id = workspace.current_file().unwrap().id().clone();
    workspace.update_current_content("junk".into()).unwrap();
    workspace.reset_current_content().unwrap();
    assert_eq!(workspace.current_file().unwrap().content(), "");
    assert_eq!(workspace.tree().file(&id).unwrap().content(), "");
}

#[test]
fn persistence_failure_is_reported_without_rollback() {
    let mut workspace = Workspace::open(FlakyStore::default(), &Preferences::default());
    workspace.drain_notices();

    let mut store = workspace.into_store();
    store.fail_writes = true;
    let mut workspace = Workspace::open(store, &Preferences::default());

    let folder = workspace.create_folder("offline");
    assert!(workspace.tree().folder(&folder).is_some());
    assert!(workspace.is_dirty());
    let notices = workspace.drain_notices();
    assert!(matches!(
        notices.as_slice(),
        [Notice::PersistenceUnavailable { message }] if message.contains("quota exceeded")
    ));

    let mut store = workspace.into_store();
    store.fail_writes = false;
    let reopened = Workspace::open(store, &Preferences::default());
    assert!(
        reopened.tree().folder(&folder).is_none(),
        "a failed write must not reach the store"
    );
}

#[test]
fn flush_retries_failed_write() {
    let mut workspace = Workspace::open(
        FlakyStore {
            inner: MemoryStore::new(),
            fail_writes: true,
        },
        &Preferences::default(),
    );
    assert!(workspace.is_dirty());
    assert!(!workspace.flush());
    assert!(workspace.store().inner.get("folders").is_none());

    workspace.store_mut().fail_writes = false;
    assert!(workspace.flush());
    assert!(!workspace.is_dirty());
    assert_eq!(&stored_tree(&workspace.store().inner), workspace.tree());
    assert_eq!(workspace.drain_notices().len(), 2);
}

#[test]
fn unreadable_tree_bootstraps_in_memory_without_overwriting() {
    let mut store = MemoryStore::new();
    store.save_raw("folders", "{ not a tree").unwrap();

    let workspace = Workspace::open(store, &Preferences::default());
    assert_eq!(workspace.tree().file_count(), 1);
    assert!(workspace.current_file().is_some());
    assert_eq!(workspace.store().get("folders"), Some("{ not a tree"));

    let mut workspace = workspace;
    let notices = workspace.drain_notices();
    assert!(matches!(
        notices.as_slice(),
        [Notice::PersistenceUnavailable { .. }]
    ));
}

#[test]
fn ids_stay_unique_across_random_operation_sequences() {
    let mut workspace = Workspace::open(MemoryStore::new(), &Preferences::default());
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    for step in 0..2_000 {
        let folders: Vec<FolderId> = workspace
            .tree()
            .folders()
            .iter()
            .map(|folder| folder.id().clone())
            .collect();
        match next() % 4 {
            0 => {
                workspace.create_folder(format!("folder-{step}"));
            }
            1 if !folders.is_empty() => {
                let folder = &folders[(next() as usize) % folders.len()];
                workspace.delete_folder(folder);
            }
            2 if !folders.is_empty() => {
                let folder = &folders[(next() as usize) % folders.len()];
                workspace.create_file(folder, format!("f{step}.js")).unwrap();
            }
            3 if !folders.is_empty() => {
                let folder = workspace.tree().folders()[(next() as usize) % folders.len()].clone();
                if let Some(file) = folder.files().first() {
                    workspace.delete_file(folder.id(), file.id());
                }
            }
            _ => {
                workspace.create_folder("");
            }
        }

        let tree = workspace.tree();
        let folder_ids: HashSet<_> = tree.folders().iter().map(|f| f.id().clone()).collect();
        assert_eq!(folder_ids.len(), tree.folders().len(), "step {step}");
        let file_ids: HashSet<_> = tree.files().map(|f| f.id().clone()).collect();
        assert_eq!(file_ids.len(), tree.file_count(), "step {step}");
        if let Some(current) = workspace.current_file() {
            assert_eq!(tree.file(current.id()), Some(current), "step {step}");
        }
    }
}
