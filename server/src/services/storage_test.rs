use super::*;
use serde_json::json;
use tempfile::TempDir;

async fn store() -> (TempDir, BoardStore) {
    let dir = TempDir::new().expect("temp dir");
    let store = BoardStore::new(dir.path());
    store.init().await.expect("init");
    (dir, store)
}

fn sample_shapes() -> Vec<ShapeData> {
    serde_json::from_value(json!([
        {"id": "s1", "shapeType": "rectangle", "x": 10, "y": 20, "width": 100, "height": 50, "color": "#FF0000"},
        {"id": "s2", "shapeType": "circle", "x": 40, "y": 40, "radius": 15, "fillColor": "#00FF00"}
    ]))
    .expect("sample shapes")
}

fn sample_strokes() -> Vec<serde_json::Value> {
    vec![json!({"points": [{"x": 0, "y": 0, "color": "#000000", "size": 2}, {"x": 5, "y": 5, "color": "#000000", "size": 2}]})]
}

#[tokio::test]
async fn save_indexes_the_board() {
    let (_dir, store) = store().await;
    let meta = store
        .save("My Board", "room-1", sample_shapes(), sample_strokes(), vec![], "alice")
        .await
        .expect("save");

    assert!(meta.board_id.starts_with("board-"));
    assert_eq!(meta.shape_count, 2);
    assert_eq!(meta.saved_by, "alice");

    let boards = store.list().await;
    assert_eq!(boards.len(), 1);
    assert_eq!(boards[0].board_id, meta.board_id);
    assert_eq!(boards[0].name, "My Board");
}

#[tokio::test]
async fn save_then_load_round_trips_shapes_and_strokes() {
    let (_dir, store) = store().await;
    let shapes = sample_shapes();
    let strokes = sample_strokes();
    let meta = store
        .save("RT", "room-1", shapes.clone(), strokes.clone(), vec![], "alice")
        .await
        .expect("save");

    let loaded = store.load(&meta.board_id).await.expect("load");
    assert_eq!(loaded.board_name, "RT");
    assert_eq!(loaded.shapes, shapes);
    assert_eq!(
        serde_json::to_value(&loaded.strokes).unwrap(),
        serde_json::to_value(&strokes).unwrap()
    );
    assert_eq!(loaded.saved_by, "alice");
}

#[tokio::test]
async fn load_unknown_board_is_not_found() {
    let (_dir, store) = store().await;
    assert!(matches!(store.load("board-nope").await, Err(StorageError::NotFound(_))));
}

#[tokio::test]
async fn delete_requires_ownership() {
    let (_dir, store) = store().await;
    let meta = store
        .save("B", "", sample_shapes(), vec![], vec![], "alice")
        .await
        .expect("save");

    let err = store.delete(&meta.board_id, "mallory").await.unwrap_err();
    assert!(matches!(err, StorageError::NotOwner { ref owner } if owner == "alice"));

    // Still listed and loadable after the refused delete.
    assert_eq!(store.list().await.len(), 1);
    assert!(store.load(&meta.board_id).await.is_ok());

    store.delete(&meta.board_id, "alice").await.expect("owner delete");
    assert!(store.list().await.is_empty());
    assert!(matches!(store.load(&meta.board_id).await, Err(StorageError::NotFound(_))));
}

#[tokio::test]
async fn delete_unknown_board_is_not_found() {
    let (_dir, store) = store().await;
    assert!(matches!(store.delete("board-nope", "alice").await, Err(StorageError::NotFound(_))));
}

#[tokio::test]
async fn export_then_import_preserves_content() {
    let (_dir, store) = store().await;
    let meta = store
        .save("Source", "room-9", sample_shapes(), sample_strokes(), vec![], "alice")
        .await
        .expect("save");

    let exported = store.export(&meta.board_id).await.expect("export");
    let imported = store.import("Copy", &exported, "bob").await.expect("import");

    assert_ne!(imported.board_id, meta.board_id, "import must mint a fresh id");
    assert_eq!(imported.saved_by, "bob");

    let source = store.load(&meta.board_id).await.unwrap();
    let copy = store.load(&imported.board_id).await.unwrap();
    assert_eq!(copy.shapes, source.shapes);
    assert_eq!(
        serde_json::to_value(&copy.strokes).unwrap(),
        serde_json::to_value(&source.strokes).unwrap()
    );
    assert_eq!(copy.board_name, "Copy");
}

#[tokio::test]
async fn import_rejects_garbage() {
    let (_dir, store) = store().await;
    assert!(matches!(store.import("X", "not json at all", "alice").await, Err(StorageError::Serde(_))));
}

#[tokio::test]
async fn registry_survives_restart() {
    let dir = TempDir::new().expect("temp dir");
    let board_id = {
        let store = BoardStore::new(dir.path());
        store.init().await.expect("init");
        store
            .save("Persistent", "", sample_shapes(), vec![], vec![], "alice")
            .await
            .expect("save")
            .board_id
    };

    let reopened = BoardStore::new(dir.path());
    reopened.init().await.expect("re-init");
    let boards = reopened.list().await;
    assert_eq!(boards.len(), 1);
    assert_eq!(boards[0].board_id, board_id);
    assert!(reopened.load(&board_id).await.is_ok());
}

#[tokio::test]
async fn init_creates_directory_layout() {
    let dir = TempDir::new().expect("temp dir");
    let store = BoardStore::new(dir.path().join("nested/data"));
    store.init().await.expect("init");
    assert!(store.images_dir().is_dir());
    assert!(store.timelapse_path("job-x").parent().unwrap().is_dir());
}
