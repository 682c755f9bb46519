//! Version History Integration Tests
//!
//! Tests the version store against a file-backed document store:
//! - Save / restore workflow
//! - Retention pruning
//! - Reloading history from disk

use std::sync::Arc;

use chrono::{Duration, Utc};
use design_core::{
    Clock as _, DesignDocument, DesignRecord, DesignRepository, Element, ErrorKind, FileDocumentStore,
    FixedClock, SequentialIds, VersionStore,
};

struct Harness {
    _dir: tempfile::TempDir,
    clock: Arc<FixedClock>,
    repo: DesignRepository,
    versions: VersionStore,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let store = FileDocumentStore::open(dir.path().join("designs")).expect("open store");
    let repo = DesignRepository::new(Arc::new(store), clock.clone());
    let versions =
        VersionStore::with_data_dir(clock.clone(), Arc::new(SequentialIds::new("ver")), dir.path());
    Harness {
        _dir: dir,
        clock,
        repo,
        versions,
    }
}

/// Save `doc` as the live design and snapshot it, like an editor save.
fn save(h: &Harness, id: &str, doc: DesignDocument, description: &str) {
    if h.repo.exists(id).expect("exists") {
        h.repo.replace_document(id, doc.clone()).expect("replace");
    } else {
        h.repo
            .save(&DesignRecord::new(id, "Poster", doc.clone(), h.clock.now()))
            .expect("save");
    }
    h.versions
        .create_version(id, doc, description, Some("1"))
        .expect("version");
    h.clock.advance(Duration::seconds(1));
}

fn headline(text: &str) -> DesignDocument {
    DesignDocument::new(800.0, 600.0)
        .with_element(Element::text(text).with_id("headline").with_bounds(10.0, 10.0, 400.0, 60.0))
}

// ============================================================================
// Restore Workflow
// ============================================================================

#[test]
fn test_restore_round_trip() {
    let h = harness();
    save(&h, "poster", headline("v1"), "initial");
    save(&h, "poster", headline("v2"), "edit");

    let versions = h.versions.get_versions("poster");
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].description, "edit");
    let first = &versions[1];

    let restored = h
        .versions
        .restore_version(&first.id, Some("2"), &h.repo)
        .expect("restore");

    assert_eq!(h.repo.load_document("poster").expect("live"), headline("v1"));
    assert_eq!(h.versions.get_version_count("poster"), 3);
    assert_eq!(h.versions.get_versions("poster")[0].id, restored.id);
    assert!(restored.description.to_lowercase().contains("restore"));

    let diff = h
        .versions
        .compare_versions(&versions[0].id, &restored.id)
        .expect("diff");
    assert_eq!(diff.changed, 1);
    assert!(!diff.settings_changed);
}

#[test]
fn test_restore_middle_of_three() {
    let h = harness();
    save(&h, "poster", headline("v1"), "v1");
    save(&h, "poster", headline("v2"), "v2");
    save(&h, "poster", headline("v3"), "v3");

    let versions = h.versions.get_versions("poster");
    let order: Vec<_> = versions.iter().map(|v| v.description.as_str()).collect();
    assert_eq!(order, ["v3", "v2", "v1"]);
    let v2 = &versions[1];

    let v4 = h
        .versions
        .restore_version(&v2.id, None, &h.repo)
        .expect("restore");
    assert_eq!(v4.data, v2.data);
    assert_eq!(h.repo.load_document("poster").expect("live"), v2.data);
    assert_eq!(h.versions.get_version_count("poster"), 4);
    assert_eq!(h.versions.get_versions("poster")[0].id, v4.id);
}

#[test]
fn test_restore_unknown_version() {
    let h = harness();
    let err = h
        .versions
        .restore_version("ver-404", None, &h.repo)
        .expect_err("unknown");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ============================================================================
// Retention
// ============================================================================

#[test]
fn test_retention_keeps_five_newest_of_ten() {
    let h = harness();
    for n in 0..10 {
        save(&h, "poster", headline(&format!("rev {n}")), &format!("rev {n}"));
    }
    assert_eq!(h.versions.cleanup_old_revisions("poster", 5), 5);

    let remaining: Vec<_> = h
        .versions
        .get_versions("poster")
        .into_iter()
        .map(|v| v.description)
        .collect();
    assert_eq!(remaining, ["rev 9", "rev 8", "rev 7", "rev 6", "rev 5"]);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_history_survives_reload() {
    let h = harness();
    save(&h, "poster", headline("a"), "a");
    save(&h, "poster", headline("b"), "b");
    save(&h, "flyer", headline("c"), "c");

    let data_dir = h.versions.data_dir().expect("data dir").to_path_buf();
    let reloaded = VersionStore::with_data_dir(
        h.clock.clone(),
        Arc::new(SequentialIds::new("reloaded")),
        data_dir,
    );
    assert_eq!(reloaded.load_from_disk().expect("load"), 3);
    assert_eq!(reloaded.get_version_count("poster"), 2);
    assert_eq!(reloaded.get_version_count("flyer"), 1);
    assert_eq!(reloaded.get_versions("poster")[0].description, "b");
}

#[test]
fn test_similar_ids_keep_separate_logs() {
    let h = harness();
    for id in ["a/b", "a_b", "a.b"] {
        h.versions
            .create_version(id, headline(id), id, None)
            .expect("version");
    }

    let data_dir = h.versions.data_dir().expect("data dir").to_path_buf();
    let reloaded = VersionStore::with_data_dir(
        h.clock.clone(),
        Arc::new(SequentialIds::new("reloaded")),
        data_dir,
    );
    assert_eq!(reloaded.load_from_disk().expect("load"), 3);
    for id in ["a/b", "a_b", "a.b"] {
        let versions = reloaded.get_versions(id);
        assert_eq!(versions.len(), 1, "history of {id}");
        assert_eq!(versions[0].description, id);
    }
}
