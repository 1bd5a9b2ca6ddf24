//! Editor Integration Tests
//!
//! Drives a full editing session against the in-memory stores:
//! - Composition scenarios (insert, move, rows, duplicate)
//! - Save protocol (upload wait, transient refs, commit, cleanup)
//! - Refresh suppression
//! - Loading pages written with the older flat design columns

use std::sync::Arc;
use std::time::Duration;

use checkout_core::{
    BuiltinPresets, Component, ComponentKind, ContainerRef, Content, DropRequest, Editor,
    EditorConfig, EditorStores, EngineError, LegacyDesignFields, MemoryAssetStore,
    MemoryPageStore, PageRecord, RefreshOutcome, RowLayout, Theme,
};
use serde_json::{json, Value};

const PAGE: &str = "page-1";

struct Harness {
    editor: Editor,
    pages: MemoryPageStore,
    assets: MemoryAssetStore,
}

/// Open an editor on `PAGE` over fresh in-memory stores.
async fn open(assets: MemoryAssetStore, config: EditorConfig) -> Harness {
    open_with(MemoryPageStore::new(), assets, config).await
}

async fn open_with(pages: MemoryPageStore, assets: MemoryAssetStore, config: EditorConfig) -> Harness {
    let stores = EditorStores::new(
        Arc::new(pages.clone()),
        Arc::new(assets.clone()),
        Arc::new(BuiltinPresets::new()),
    );
    let editor = Editor::open(PAGE, stores, config).await.expect("open");
    Harness {
        editor,
        pages,
        assets,
    }
}

fn content(value: Value) -> Content {
    match value {
        Value::Object(map) => map,
        _ => Content::new(),
    }
}

fn text(id: &str) -> Component {
    Component::new(ComponentKind::Text).with_id(id)
}

/// Apply finished uploads until one lands or the budget runs out.
async fn pump_until_applied(editor: &Editor) -> usize {
    for _ in 0..100 {
        tokio::task::yield_now().await;
        let applied = editor.pump_uploads();
        if applied > 0 {
            return applied;
        }
    }
    0
}

// ============================================================================
// Composition Scenarios
// ============================================================================

#[tokio::test]
async fn test_insert_text_into_top_slot() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;

    let id = h
        .editor
        .insert_new(ComponentKind::Text, ContainerRef::Top)
        .expect("insert");

    let doc = h.editor.document();
    assert_eq!(doc.top_slot().len(), 1);
    assert!(doc.contains(&id));
    assert!(h.editor.is_dirty());
}

#[tokio::test]
async fn test_move_from_top_slot_into_row_column() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    h.editor.insert(text("text-1"), ContainerRef::Top).expect("insert");
    let row_id = h.editor.add_row(RowLayout::TwoColumns).expect("row");

    h.editor
        .move_component(&"text-1".into(), ContainerRef::column(row_id.clone(), 1))
        .expect("move");

    let doc = h.editor.document();
    assert!(doc.top_slot().is_empty());
    let column = doc.row(&row_id).and_then(|r| r.column(1)).expect("column 1");
    assert_eq!(column.len(), 1);
    assert_eq!(column[0].id.as_str(), "text-1");
    assert_eq!(doc.component_count(), 1);
}

#[tokio::test]
async fn test_asymmetric_row_spans() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    let row_id = h
        .editor
        .add_row(RowLayout::parse("two-columns-asymmetric").expect("layout"))
        .expect("row");

    let page = h.editor.render();
    let block = page
        .blocks
        .iter()
        .find(|b| b.key == row_id)
        .expect("row block");
    let spans: Vec<u8> = block.columns.iter().map(|c| c.span).collect();
    assert_eq!(spans, vec![1, 2]);
}

#[tokio::test]
async fn test_duplicate_lands_after_original() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    for id in ["a", "text-1", "b"] {
        h.editor.insert(text(id), ContainerRef::Bottom).expect("insert");
    }

    let copy = h.editor.duplicate(&"text-1".into()).expect("duplicate");

    let ids: Vec<String> = h
        .editor
        .document()
        .bottom_slot()
        .iter()
        .map(|c| c.id.to_string())
        .collect();
    assert_eq!(ids, vec!["a", "text-1", copy.as_str(), "b"]);
    assert_ne!(copy.as_str(), "text-1");
}

#[tokio::test]
async fn test_remove_row_drops_its_components() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    h.editor.insert(text("keep"), ContainerRef::Top).expect("insert");
    let row_id = h.editor.add_row(RowLayout::TwoColumns).expect("row");
    h.editor
        .insert(text("left"), ContainerRef::column(row_id.clone(), 0))
        .expect("left");
    h.editor
        .insert(text("right"), ContainerRef::column(row_id.clone(), 1))
        .expect("right");
    assert_eq!(h.editor.document().component_count(), 3);

    h.editor.remove_row(&row_id).expect("remove row");

    let doc = h.editor.document();
    assert_eq!(doc.component_count(), 1);
    assert!(doc.row(&row_id).is_none());
}

#[tokio::test]
async fn test_palette_drop_then_move_drop() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    let row_id = h.editor.add_row(RowLayout::ThreeColumns).expect("row");

    let applied = h
        .editor
        .drop_item(&DropRequest::new("palette:seal", format!("{row_id}:2")))
        .expect("palette drop");
    let id = h
        .editor
        .document()
        .row(&row_id)
        .and_then(|r| r.column(2))
        .and_then(|c| c.first())
        .map(|c| c.id.clone())
        .expect("inserted");
    assert!(applied.changed);

    h.editor
        .drop_item(&DropRequest::new(id.as_str(), "bottom"))
        .expect("move drop");
    assert_eq!(h.editor.document().bottom_slot()[0].id, id);
}

// ============================================================================
// Save Protocol
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_save_waits_for_slow_upload() {
    let assets = MemoryAssetStore::new().with_latency(Duration::from_secs(2));
    let h = open(assets, EditorConfig::default()).await;
    let id = h
        .editor
        .insert_new(ComponentKind::Image, ContainerRef::Top)
        .expect("insert");
    h.editor
        .start_upload(&id, "src", vec![0xFF, 0xD8], "hero.jpg")
        .expect("upload");
    assert!(h.editor.flatten()[0].is_uploading());

    let started = tokio::time::Instant::now();
    let saver = h.editor.clone();
    let save = tokio::spawn(async move { saver.save().await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.pages.save_count(), 0, "nothing committed before upload resolves");
    assert!(h.editor.is_saving());

    let report = save.await.expect("join").expect("save");
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(report.uploads_awaited, 1);
    assert_eq!(h.pages.save_count(), 1);
    assert!(!h.editor.is_dirty());

    let stored = h.pages.get(PAGE).expect("stored");
    let src = stored.top_components[0]
        .text_field("src")
        .expect("src")
        .to_string();
    assert!(src.starts_with("memory://assets/page-1/"));
    assert!(!stored.top_components[0].is_uploading());
    assert_eq!(h.assets.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_save_times_out_on_stuck_upload() {
    let assets = MemoryAssetStore::new().with_latency(Duration::from_secs(60));
    let config = EditorConfig {
        upload_wait_timeout: Duration::from_secs(5),
        ..EditorConfig::default()
    };
    let h = open(assets, config).await;
    let id = h
        .editor
        .insert_new(ComponentKind::Image, ContainerRef::Top)
        .expect("insert");
    h.editor
        .start_upload(&id, "src", vec![1], "slow.png")
        .expect("upload");

    let result = h.editor.save().await;
    assert!(matches!(result, Err(EngineError::Timeout(_))));
    assert!(h.editor.is_dirty());
    assert!(!h.editor.is_saving());
    assert_eq!(h.pages.save_count(), 0);
}

#[tokio::test]
async fn test_save_blocked_by_data_url() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    let image = Component::new(ComponentKind::Image)
        .with_content(content(json!({ "src": "data:image/png;base64,AAAA" })));
    h.editor.insert(image, ContainerRef::Top).expect("insert");

    let result = h.editor.save().await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
    assert!(h.editor.is_dirty());
    assert_eq!(h.pages.save_count(), 0);
}

#[tokio::test]
async fn test_data_url_uploaded_then_saved() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    let id = h
        .editor
        .insert_new(ComponentKind::Image, ContainerRef::Top)
        .expect("insert");

    h.editor
        .upload_data_url(&id, "src", "data:image/png;base64,iVBORw0KGgo=")
        .expect("upload");
    let report = h.editor.save().await.expect("save");

    assert_eq!(report.uploads_awaited, 1);
    let stored = h.pages.get(PAGE).expect("stored");
    let src = stored.top_components[0].text_field("src").expect("src");
    assert!(src.ends_with(".png"));
}

#[tokio::test]
async fn test_failed_commit_keeps_dirty_and_superseded() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    let image = Component::new(ComponentKind::Image)
        .with_id("image-1")
        .with_content(content(json!({ "src": "memory://assets/page-1/image-1/old.png" })));
    h.editor.insert(image, ContainerRef::Top).expect("insert");
    h.editor.remove(&"image-1".into()).expect("remove");
    h.pages.set_reject_saves(true);

    let result = h.editor.save().await;
    assert!(matches!(result, Err(EngineError::Persistence(_))));
    assert!(h.editor.is_dirty());
    assert_eq!(h.editor.superseded_assets(), vec!["page-1/image-1/old.png"]);

    h.pages.set_reject_saves(false);
    let report = h.editor.save().await.expect("retry");
    assert_eq!(report.cleanup_requested, vec!["page-1/image-1/old.png"]);
    assert!(h.editor.superseded_assets().is_empty());
}

#[tokio::test]
async fn test_cleanup_failure_does_not_fail_save() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    let id = h
        .editor
        .insert_new(ComponentKind::Image, ContainerRef::Top)
        .expect("insert");
    h.editor
        .start_upload(&id, "src", vec![1], "first.png")
        .expect("first upload");
    h.editor.save().await.expect("first save");
    let first_path = h
        .editor
        .flatten()[0]
        .text_field("src")
        .and_then(|url| url.strip_prefix("memory://assets/"))
        .map(str::to_string)
        .expect("first path");

    h.editor
        .start_upload(&id, "src", vec![2], "second.png")
        .expect("second upload");
    h.assets.set_fail_removals(true);
    let report = h.editor.save().await.expect("second save");

    assert_eq!(report.cleanup_requested, vec![first_path.clone()]);
    assert!(report.cleanup_error.is_some());
    assert!(!h.editor.is_dirty());
    assert!(h.assets.contains(&first_path), "removal was refused");
}

#[tokio::test]
async fn test_replaced_image_is_cleaned_after_save() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    let id = h
        .editor
        .insert_new(ComponentKind::Testimonial, ContainerRef::Bottom)
        .expect("insert");
    h.editor
        .start_upload(&id, "avatar", vec![1], "a.png")
        .expect("first");
    assert_eq!(pump_until_applied(&h.editor).await, 1);
    h.editor
        .start_upload(&id, "avatar", vec![2], "b.png")
        .expect("second");
    assert_eq!(pump_until_applied(&h.editor).await, 1);
    assert_eq!(h.assets.len(), 2);
    assert_eq!(h.editor.superseded_assets().len(), 1);

    let report = h.editor.save().await.expect("save");
    assert_eq!(report.cleanup_requested.len(), 1);
    assert!(report.cleanup_error.is_none());
    assert_eq!(h.assets.len(), 1);
}

#[tokio::test]
async fn test_image_shared_by_duplicate_survives_cleanup() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    let id = h
        .editor
        .insert_new(ComponentKind::Image, ContainerRef::Top)
        .expect("insert");
    let ticket = h
        .editor
        .start_upload(&id, "src", vec![1, 2], "hero.png")
        .expect("upload");
    assert_eq!(pump_until_applied(&h.editor).await, 1);

    let copy = h.editor.duplicate(&id).expect("duplicate");
    h.editor.remove(&id).expect("remove");

    let report = h.editor.save().await.expect("save");
    assert!(report.cleanup_requested.is_empty());
    assert!(h.assets.contains(&ticket.path));
    assert!(h.editor.superseded_assets().is_empty());

    let components = h.editor.flatten();
    assert_eq!(components[0].id, copy);
    let url = components[0].text_field("src").expect("src kept");
    assert!(url.ends_with(&ticket.path));

    // Once the copy goes too, the next save deletes the object.
    h.editor.remove(&copy).expect("remove copy");
    let report = h.editor.save().await.expect("second save");
    assert_eq!(report.cleanup_requested, vec![ticket.path.clone()]);
    assert!(!h.assets.contains(&ticket.path));
}

#[tokio::test]
async fn test_failed_upload_keeps_previous_value() {
    let assets = MemoryAssetStore::new();
    assets.set_fail_uploads(true);
    let h = open(assets, EditorConfig::default()).await;
    let image = Component::new(ComponentKind::Image)
        .with_id("image-1")
        .with_content(content(json!({ "src": "https://cdn.example/old.png" })));
    h.editor.insert(image, ContainerRef::Top).expect("insert");

    h.editor
        .start_upload(&"image-1".into(), "src", vec![1], "new.png")
        .expect("start");
    assert_eq!(pump_until_applied(&h.editor).await, 1);

    let component = &h.editor.flatten()[0];
    assert!(!component.is_uploading());
    assert!(component.has_upload_error());
    assert_eq!(component.text_field("src"), Some("https://cdn.example/old.png"));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_save_rejected() {
    let assets = MemoryAssetStore::new().with_latency(Duration::from_secs(2));
    let h = open(assets, EditorConfig::default()).await;
    let id = h
        .editor
        .insert_new(ComponentKind::Image, ContainerRef::Top)
        .expect("insert");
    h.editor
        .start_upload(&id, "src", vec![1], "slow.png")
        .expect("upload");

    let saver = h.editor.clone();
    let first = tokio::spawn(async move { saver.save().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = h.editor.save().await;
    assert!(matches!(second, Err(EngineError::SaveInProgress)));
    let refresh = h.editor.refresh().await.expect("refresh");
    assert_eq!(refresh, RefreshOutcome::SuppressedSaving);

    first.await.expect("join").expect("first save");
    assert_eq!(h.pages.save_count(), 1);
}

#[tokio::test]
async fn test_edit_after_save_marks_dirty() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    h.editor.insert(text("text-1"), ContainerRef::Top).expect("insert");
    let report = h.editor.save().await.expect("save");
    assert!(!report.still_dirty);

    h.editor
        .update_content(&"text-1".into(), content(json!({ "text": "Oferta" })))
        .expect("update");
    assert!(h.editor.is_dirty());
}

#[tokio::test]
async fn test_design_saved_with_legacy_columns() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    h.editor.apply_preset("dark").await.expect("preset");
    h.editor
        .set_color("button.default.background", "#ff6600")
        .expect("color");
    h.editor.save().await.expect("save");

    let stored = h.pages.get(PAGE).expect("stored");
    assert_eq!(stored.legacy_fields.primary_color.as_deref(), Some("#ff6600"));
    assert_eq!(stored.legacy_fields.theme.as_deref(), Some("custom"));
    let blob = stored.design_blob.expect("blob");
    assert_eq!(blob["colors"]["button"]["default"]["background"], "#ff6600");
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_suppressed_while_dirty() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    h.editor.insert(text("local"), ContainerRef::Top).expect("insert");
    h.pages.insert(
        PAGE,
        PageRecord {
            top_components: vec![text("remote")],
            ..PageRecord::default()
        },
    );

    let outcome = h.editor.refresh().await.expect("refresh");
    assert_eq!(outcome, RefreshOutcome::SuppressedDirty);
    assert!(h.editor.document().contains(&"local".into()));
    assert!(!h.editor.document().contains(&"remote".into()));
}

#[tokio::test]
async fn test_refresh_reloads_when_clean() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    h.editor.insert(text("local"), ContainerRef::Top).expect("insert");
    h.editor.select_component(&"local".into()).expect("select");
    h.editor.save().await.expect("save");

    h.pages.insert(
        PAGE,
        PageRecord {
            top_components: vec![text("remote")],
            ..PageRecord::default()
        },
    );
    let outcome = h.editor.refresh().await.expect("refresh");

    assert_eq!(outcome, RefreshOutcome::Reloaded);
    let doc = h.editor.document();
    assert!(doc.contains(&"remote".into()));
    assert!(!doc.contains(&"local".into()));
    assert_eq!(h.editor.selection(), checkout_core::Selection::Idle);
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn test_unknown_page_opens_with_defaults() {
    let h = open(MemoryAssetStore::new(), EditorConfig::default()).await;
    assert_eq!(h.editor.document().component_count(), 0);
    assert_eq!(h.editor.design().theme, Theme::Light);
    assert!(!h.editor.is_dirty());
}

#[tokio::test]
async fn test_legacy_page_without_design_blob() {
    let pages = MemoryPageStore::new();
    pages.insert(
        PAGE,
        PageRecord {
            legacy_fields: LegacyDesignFields {
                primary_color: Some("#123456".into()),
                text_color: Some("#222222".into()),
                font_family: Some("Roboto".into()),
                theme: Some("neon".into()),
                ..LegacyDesignFields::default()
            },
            ..PageRecord::default()
        },
    );
    let h = open_with(pages, MemoryAssetStore::new(), EditorConfig::default()).await;

    let design = h.editor.design();
    assert_eq!(design.colors.get("button.default.background"), Some("#123456"));
    assert_eq!(design.colors.get("text.primary"), Some("#222222"));
    assert_eq!(design.font, "Roboto");
    assert_eq!(design.theme, Theme::Custom);
    assert!(design.colors.get("background").is_some(), "defaults fill the rest");
}

#[tokio::test]
async fn test_stale_upload_markers_cleared_on_open() {
    let pages = MemoryPageStore::new();
    let stuck = Component::new(ComponentKind::Image)
        .with_id("image-1")
        .with_content(content(json!({ "src": "", "uploading": true })));
    pages.insert(
        PAGE,
        PageRecord {
            top_components: vec![stuck],
            ..PageRecord::default()
        },
    );
    let h = open_with(pages, MemoryAssetStore::new(), EditorConfig::default()).await;

    assert!(!h.editor.flatten()[0].is_uploading());
    h.editor.save().await.expect("save is not blocked");
}

#[tokio::test]
async fn test_invalid_stored_page_rejected() {
    let pages = MemoryPageStore::new();
    pages.insert(
        PAGE,
        PageRecord {
            top_components: vec![text("dup")],
            bottom_components: vec![text("dup")],
            ..PageRecord::default()
        },
    );
    let stores = EditorStores::new(
        Arc::new(pages),
        Arc::new(MemoryAssetStore::new()),
        Arc::new(BuiltinPresets::new()),
    );
    let result = Editor::open(PAGE, stores, EditorConfig::default()).await;
    assert!(matches!(result, Err(EngineError::DuplicateId(_))));
}
