//! Bundle Integration Tests
//!
//! Exports from one store and imports into another:
//! - JSON and ZIP round trips with asset restoration
//! - Duplicate titles and version-conflict policy
//! - Rejections that leave the store untouched
//! - Batch import isolation
//! - Failed imports leave no stored assets behind

use std::sync::Arc;

use chrono::Utc;
use design_bundle::{
    BundleError, ContainerFormat, ExportOptions, Exporter, ImportOptions, ImportSource, Importer,
    VersionConflictStrategy,
};
use design_core::{
    AssetError, AssetResolver, AssetSink, Clock as _, DesignDocument, DesignRecord,
    DesignRepository, DocumentStore, Element, ElementKind, ErrorKind, FileDocumentStore,
    FixedClock, MemoryAssets, MemoryDocumentStore, SequentialIds, ShapeKind, StoreError,
    VersionStore,
};
use proptest::prelude::*;
use serde_json::json;

struct Site {
    _dir: tempfile::TempDir,
    clock: Arc<FixedClock>,
    repo: DesignRepository,
    versions: Arc<VersionStore>,
    assets: Arc<MemoryAssets>,
}

impl Site {
    fn new(prefix: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = FileDocumentStore::open(dir.path().join("designs")).expect("open store");
        let repo = DesignRepository::new(Arc::new(store), clock.clone());
        let versions = Arc::new(VersionStore::new(
            clock.clone(),
            Arc::new(SequentialIds::new(format!("{prefix}-ver"))),
        ));
        Self {
            _dir: dir,
            clock,
            repo,
            versions,
            assets: Arc::new(MemoryAssets::new()),
        }
    }

    fn exporter(&self) -> Exporter {
        Exporter::new(self.repo.clone()).with_resolver(self.assets.clone())
    }

    fn importer(&self, prefix: &str) -> Importer {
        Importer::new(
            self.repo.clone(),
            self.versions.clone(),
            Arc::new(SequentialIds::new(prefix)),
        )
        .with_sink(self.assets.clone())
    }

    fn store_card(&self, id: &str, version: &str) {
        let mut doc = DesignDocument::new(600.0, 400.0)
            .with_element(Element::text("Congratulations").with_bounds(20.0, 20.0, 560.0, 80.0))
            .with_element(Element::image("uploads/logo.png").with_bounds(20.0, 120.0, 100.0, 100.0));
        doc.version = version.to_string();
        let mut record = DesignRecord::new(id, "Card", doc, self.clock.now());
        record.author_id = Some("42".to_string());
        self.repo.save(&record).expect("save");
        self.assets.insert("uploads/logo.png", vec![0x89, b'P', b'N', b'G', 1, 2, 3]);
    }
}

fn image_src(doc: &DesignDocument) -> Option<String> {
    doc.elements.iter().find_map(|e| match &e.kind {
        ElementKind::Image(spec) => spec.src.clone(),
        _ => None,
    })
}

fn bundle_json(text: &str, version: &str) -> String {
    json!({
        "version": "1.0",
        "exportDate": "2026-01-01T00:00:00Z",
        "design": {
            "id": "card-1",
            "title": "Card",
            "meta": {"_design_data": {
                "version": version,
                "settings": {"width": 600, "height": 400},
                "elements": [{"type": "text", "content": text, "x": 0, "y": 0, "width": 100, "height": 20}]
            }}
        }
    })
    .to_string()
}

// ============================================================================
// Round Trips
// ============================================================================

#[test]
fn test_json_round_trip_restores_assets() {
    let source = Site::new("a");
    source.store_card("card-1", "1.0.0");
    let bundle = source
        .exporter()
        .export_design("card-1", &ExportOptions::default())
        .expect("export");
    let json = Exporter::to_json(&bundle, &ExportOptions::default()).expect("json");

    let target = Site::new("b");
    let outcome = target
        .importer("design")
        .import_design(ImportSource::Json(json), &ImportOptions::default())
        .expect("import");

    assert!(outcome.created);
    assert_eq!(outcome.design_id, "design-1");
    assert_eq!(outcome.title, "Card");
    assert_eq!(outcome.assets_restored, 1);
    let src = image_src(&outcome.data).expect("image src");
    assert_eq!(
        target.assets.read(&src).expect("restored asset"),
        vec![0x89, b'P', b'N', b'G', 1, 2, 3]
    );

    let stored = target.repo.load("design-1").expect("stored");
    assert_eq!(stored.author_id.as_deref(), Some("42"));

    // Identical to the source apart from the relocated image.
    let mut expected = source.repo.load_document("card-1").expect("source");
    if let ElementKind::Image(spec) = &mut expected.elements[1].kind {
        spec.src = Some(src.clone());
    }
    assert_eq!(stored.data, expected);
    assert_eq!(outcome.data, expected);
    assert_eq!(target.versions.get_version_count("design-1"), 1);
}

#[test]
fn test_zip_round_trip_of_several_designs() {
    let source = Site::new("a");
    source.store_card("card-1", "1.0.0");
    source.store_card("card-2", "2.0.0");
    let zip = source
        .exporter()
        .batch_export(&["card-1", "card-2"], &ExportOptions::default())
        .expect("zip");
    assert_eq!(&zip[..2], b"PK");

    let target = Site::new("b");
    let outcomes = target
        .importer("design")
        .import_all(ImportSource::Bytes(zip), &ImportOptions::default())
        .expect("import");
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.assets_restored == 1));
    assert_eq!(outcomes[1].data.version, "2.0.0");
    assert_eq!(target.repo.ids().expect("ids").len(), 2);
}

#[test]
fn test_export_to_path_then_import_from_path() {
    let source = Site::new("a");
    source.store_card("card-1", "1.0.0");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("card.zip");
    source
        .exporter()
        .export_to_path("card-1", &path, ContainerFormat::Zip, &ExportOptions::default())
        .expect("write");

    let target = Site::new("b");
    let outcome = target
        .importer("design")
        .import_design(ImportSource::Path(path), &ImportOptions::default())
        .expect("import");
    assert_eq!(outcome.title, "Card");
}

// ============================================================================
// Duplicates and Conflicts
// ============================================================================

#[test]
fn test_duplicate_import_gets_suffix() {
    let site = Site::new("a");
    site.store_card("card-1", "1.0.0");
    let outcome = site
        .importer("copy")
        .import_design(
            ImportSource::Json(bundle_json("Hello", "1.0.0")),
            &ImportOptions::default(),
        )
        .expect("import");
    assert_eq!(outcome.title, "Card (Imported)");
    assert_ne!(outcome.design_id, "card-1");
    assert_eq!(site.repo.load("card-1").expect("original").title, "Card");
}

#[test]
fn test_version_conflict_skip_and_override() {
    let site = Site::new("a");
    site.store_card("card-1", "1.2.0");
    let importer = site.importer("copy");
    let update = ImportOptions {
        update_existing: true,
        ..ImportOptions::default()
    };

    let err = importer
        .import_design(ImportSource::Json(bundle_json("Older", "1.1.9")), &update)
        .expect_err("conflict");
    assert_eq!(err.kind(), ErrorKind::VersionConflict);
    assert_eq!(site.versions.get_version_count("card-1"), 0);
    assert_eq!(site.repo.load("card-1").expect("load").data.version, "1.2.0");

    let overriding = ImportOptions {
        version_conflict_strategy: VersionConflictStrategy::Override,
        ..update.clone()
    };
    let outcome = importer
        .import_design(ImportSource::Json(bundle_json("Older", "1.1.9")), &overriding)
        .expect("override");
    assert!(!outcome.created);
    assert_eq!(outcome.design_id, "card-1");
    assert_eq!(site.repo.load("card-1").expect("load").data.version, "1.1.9");
    assert_eq!(site.versions.get_version_count("card-1"), 1);

    let outcome = importer
        .import_design(ImportSource::Json(bundle_json("Newer", "1.10.0")), &update)
        .expect("newer applies");
    assert_eq!(outcome.data.version, "1.10.0");
    assert_eq!(site.versions.get_version_count("card-1"), 2);
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_rejections_write_nothing() {
    let site = Site::new("a");
    let importer = site.importer("design");
    let options = ImportOptions::default();

    let missing_title = json!({"design": {"meta": {"_design_data": {"elements": [], "settings": {}}}}});
    let err = importer
        .import_design(ImportSource::Json(missing_title.to_string()), &options)
        .expect_err("missing title");
    assert_eq!(err.kind(), ErrorKind::MissingField);

    let err = importer
        .import_design(
            ImportSource::Json(bundle_json("<script>steal()</script>", "1.0.0")),
            &options,
        )
        .expect_err("script");
    assert_eq!(err.kind(), ErrorKind::SecurityViolation);

    let err = importer
        .import_design(ImportSource::Json("{\"design\": ".to_string()), &options)
        .expect_err("malformed");
    assert_eq!(err.kind(), ErrorKind::InvalidDocument);

    let tiny = ImportOptions {
        max_file_size: 64,
        ..ImportOptions::default()
    };
    let err = importer
        .import_design(ImportSource::Json(bundle_json("Hi", "1.0.0")), &tiny)
        .expect_err("too large");
    assert!(matches!(err, BundleError::FileTooLarge { limit: 64, .. }));

    let constrained = ImportOptions {
        memory_limit: Some(16),
        ..ImportOptions::default()
    };
    let err = importer
        .import_design(ImportSource::Json(bundle_json("Hi", "1.0.0")), &constrained)
        .expect_err("memory");
    assert_eq!(err.kind(), ErrorKind::ResourceExceeded);

    assert!(site.repo.ids().expect("ids").is_empty());
}

#[test]
fn test_traversal_attachment_rejected() {
    let site = Site::new("a");
    let bundle = json!({
        "design": {
            "title": "Card",
            "meta": {"_design_data": {"settings": {"width": 10, "height": 10}, "elements": []}},
            "attachments": [{"path": "../../etc/passwd", "content": "AAAA"}]
        }
    });
    let err = site
        .importer("design")
        .import_design(ImportSource::Json(bundle.to_string()), &ImportOptions::default())
        .expect_err("traversal");
    assert_eq!(err.kind(), ErrorKind::SecurityViolation);
    assert!(site.repo.ids().expect("ids").is_empty());
}

// ============================================================================
// Batch
// ============================================================================

#[test]
fn test_batch_import_isolation() {
    let site = Site::new("a");
    let importer = site.importer("design");
    let sources = || {
        vec![
            ImportSource::Json(bundle_json("One", "1.0.0")),
            ImportSource::Json("not json".to_string()),
            ImportSource::Json(bundle_json("Three", "1.0.0")),
        ]
    };

    let report = importer.batch_import(sources(), &ImportOptions::default(), true);
    assert_eq!(report.imported.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 1);
    assert_eq!(report.failed[0].kind, ErrorKind::InvalidDocument);
    assert_eq!(report.skipped, 0);

    let report = importer.batch_import(sources(), &ImportOptions::default(), false);
    assert_eq!(report.imported.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.skipped, 1);
}

// ============================================================================
// Failure Cleanup
// ============================================================================

/// Asset sink that refuses one file name.
struct RefusingSink {
    inner: MemoryAssets,
    refused: &'static str,
}

impl AssetSink for RefusingSink {
    fn store(&self, name: &str, bytes: &[u8], mime_type: &str) -> Result<String, AssetError> {
        if name == self.refused {
            return Err(AssetError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.store(name, bytes, mime_type)
    }

    fn remove(&self, locator: &str) -> Result<(), AssetError> {
        self.inner.remove(locator)
    }
}

/// Document store whose writes always fail.
struct ReadOnlyStore;

impl DocumentStore for ReadOnlyStore {
    fn get(&self, _id: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    fn put(&self, _id: &str, _raw: &str) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        )))
    }

    fn delete(&self, _id: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

fn bundle_with_attachments(names: &[&str]) -> String {
    let attachments: Vec<_> = names
        .iter()
        .map(|name| json!({"path": name, "content": "AAAA", "mimeType": "image/png"}))
        .collect();
    json!({
        "version": "1.0",
        "design": {
            "title": "Card",
            "meta": {"_design_data": {
                "settings": {"width": 100, "height": 100},
                "elements": [{"type": "image", "src": names[0], "width": 10, "height": 10}]
            }},
            "attachments": attachments
        }
    })
    .to_string()
}

#[test]
fn test_failed_attachment_rolls_back_stored_assets() {
    let site = Site::new("a");
    let sink = Arc::new(RefusingSink {
        inner: MemoryAssets::new(),
        refused: "b.png",
    });
    let importer = Importer::new(
        site.repo.clone(),
        site.versions.clone(),
        Arc::new(SequentialIds::new("design")),
    )
    .with_sink(sink.clone());

    let err = importer
        .import_design(
            ImportSource::Json(bundle_with_attachments(&["a.png", "b.png"])),
            &ImportOptions::default(),
        )
        .expect_err("refused asset");
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(sink.inner.is_empty());
    assert!(site.repo.ids().expect("ids").is_empty());
}

#[test]
fn test_failed_save_rolls_back_stored_assets() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let repo = DesignRepository::new(Arc::new(ReadOnlyStore), clock.clone());
    let versions = Arc::new(VersionStore::new(clock, Arc::new(SequentialIds::new("ver"))));
    let assets = Arc::new(MemoryAssets::new());
    let importer = Importer::new(repo, versions.clone(), Arc::new(SequentialIds::new("design")))
        .with_sink(assets.clone());

    let err = importer
        .import_design(
            ImportSource::Json(bundle_with_attachments(&["a.png", "b.png"])),
            &ImportOptions::default(),
        )
        .expect_err("read-only store");
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(assets.is_empty());
    assert_eq!(versions.get_version_count("design-1"), 0);
}

// ============================================================================
// Properties
// ============================================================================

fn arb_element() -> impl Strategy<Value = Element> {
    let kind = prop_oneof![
        "[A-Za-z]{1,8}( [A-Za-z]{1,8}){0,3}".prop_map(Element::text),
        (
            prop::sample::select(vec![
                ShapeKind::Rectangle,
                ShapeKind::Circle,
                ShapeKind::Ellipse,
                ShapeKind::Triangle,
            ]),
            prop::sample::select(vec!["#000000", "#ff8800", "#2563eb", "#f3f4f6"]),
        )
            .prop_map(|(shape, fill)| Element::shape(shape, fill)),
        "[a-z0-9]{1,24}".prop_map(Element::qr),
    ];
    (
        kind,
        (-100.0f32..1000.0, -100.0f32..1000.0, 0.0f32..500.0, 0.0f32..500.0),
        0.0f32..=1.0,
        -360.0f32..360.0,
        prop::option::of(-10i64..10),
    )
        .prop_map(|(element, (x, y, w, h), opacity, rotation, z)| {
            let mut element = element
                .with_bounds(x, y, w, h)
                .with_opacity(opacity)
                .with_rotation(rotation);
            element.z_index = z;
            element
        })
}

fn arb_document() -> impl Strategy<Value = DesignDocument> {
    (
        1.0f32..2000.0,
        1.0f32..2000.0,
        0.0f32..50.0,
        prop::collection::vec(arb_element(), 0..6),
    )
        .prop_map(|(width, height, bleed, elements)| {
            let mut doc = DesignDocument::new(width, height);
            doc.settings.bleed = bleed;
            elements.into_iter().fold(doc, DesignDocument::with_element)
        })
}

fn memory_repo(clock: Arc<FixedClock>) -> DesignRepository {
    DesignRepository::new(Arc::new(MemoryDocumentStore::new()), clock)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_json_round_trip_preserves_document(doc in arb_document()) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let source = memory_repo(clock.clone());
        source
            .save(&DesignRecord::new("src-1", "Generated", doc.clone(), clock.now()))
            .expect("save");
        let bundle = Exporter::new(source)
            .export_design("src-1", &ExportOptions::default())
            .expect("export");
        let json = Exporter::to_json(&bundle, &ExportOptions::default()).expect("json");

        let target = memory_repo(clock.clone());
        let versions = Arc::new(VersionStore::new(clock, Arc::new(SequentialIds::new("ver"))));
        let outcome = Importer::new(target.clone(), versions, Arc::new(SequentialIds::new("design")))
            .import_design(ImportSource::Json(json), &ImportOptions::default())
            .expect("import");

        prop_assert_eq!(&outcome.data, &doc);
        prop_assert_eq!(target.load_document(&outcome.design_id).expect("stored"), doc);
    }
}
