use canvas_engine::brush::Brush;
use canvas_engine::input::PointerEvent;
use canvas_engine::persistence::{KeyValueStore, MemoryImageStore, MemoryStore, SessionDocument};
use canvas_engine::viewport::Viewport;
use canvas_engine::{Bounds, CanvasCore, CanvasError, EngineConfig, Tool, ViewMode};

fn core() -> CanvasCore {
    CanvasCore::new(EngineConfig { canvas_width: 64, canvas_height: 64, thumbnail_size: 32, ..EngineConfig::default() }).unwrap()
}

fn paint_line(c: &mut CanvasCore) {
    c.set_tool(Tool::Brush);
    c.set_brush(Brush { size: 4.0, pressure_enabled: false, ..Brush::default() });
    c.pointer_down(PointerEvent::mouse(4.0, 32.0));
    c.pointer_move(PointerEvent::mouse(60.0, 32.0));
    c.pointer_up(PointerEvent::mouse(60.0, 32.0));
    c.set_tool(Tool::Move);
}

#[test]
fn session_round_trip() {
    let mut c = core();
    let layer = c.model().selected_layer_id().unwrap();
    c.model_mut().add_image(layer, "https://cdn/kept.png", Bounds::new(5.0, 5.0, 30.0, 30.0)).unwrap();
    c.model_mut().add_image(layer, "blob:https://app/1234", Bounds::new(10.0, 10.0, 30.0, 30.0)).unwrap();
    let second = c.model_mut().add_layer();
    c.model_mut().rename_layer(second, "Ink").unwrap();
    paint_line(&mut c);
    c.set_viewport(Viewport { pan_x: 10.0, pan_y: -4.0, zoom: 2.0 });
    c.set_view_mode(ViewMode::Studio);
    c.set_area(Bounds::new(8.0, 8.0, 20.0, 20.0));
    let pending = c.begin_submission(None);

    let mut store = MemoryStore::new();
    let mut images = MemoryImageStore::new();
    c.save(&mut store, &mut images).unwrap();

    let blob = store.get(c.session_key()).unwrap().unwrap();
    let doc: SessionDocument = serde_json::from_str(&blob).unwrap();
    assert_eq!(doc.version, 1);
    assert!(doc.base_raster.as_deref().is_some_and(|r| r.starts_with("store:")));
    assert!(doc.thumbnail.as_deref().is_some_and(|t| t.starts_with("data:image/png;base64,")));

    let mut restored = core();
    let dropped = restored.load(&store, &images).unwrap().unwrap();
    assert_eq!(dropped, vec!["blob:https://app/1234".to_string()]);

    let sources: Vec<&str> = restored.model().all_images().map(|i| i.source.as_str()).collect();
    assert_eq!(sources, vec!["https://cdn/kept.png"]);
    assert_eq!(restored.model().layers().len(), 3);
    assert_eq!(restored.model().layer(second).unwrap().name, "Ink");
    assert_eq!(restored.base(), c.base());
    assert_eq!(restored.viewport(), c.viewport());
    assert_eq!(restored.view_mode(), ViewMode::Studio);
    assert_eq!(restored.area().unwrap().bounds, Bounds::new(8.0, 8.0, 20.0, 20.0));
    assert_eq!(restored.placeholders().len(), 1);
    assert_eq!(restored.placeholders()[0].id, pending.placeholder_id);
    assert!(!restored.history().can_undo(), "history starts over after a reload");

    // ids keep counting from where the saved session stopped
    let fresh = restored.model_mut().add_layer();
    assert!(fresh > second);
}

#[test]
fn load_without_saved_session() {
    let mut c = core();
    let store = MemoryStore::new();
    let images = MemoryImageStore::new();
    assert_eq!(c.load(&store, &images).unwrap(), None);
    assert_eq!(c.model().layers().len(), 2);
}

#[test]
fn sessions_are_keyed() {
    let mut c = core().with_session_key("board-a");
    c.set_view_mode(ViewMode::Hybrid);
    let mut store = MemoryStore::new();
    let mut images = MemoryImageStore::new();
    c.save(&mut store, &mut images).unwrap();

    let mut other = core().with_session_key("board-b");
    assert_eq!(other.load(&store, &images).unwrap(), None);
    let mut same = core().with_session_key("board-a");
    assert!(same.load(&store, &images).unwrap().is_some());
    assert_eq!(same.view_mode(), ViewMode::Hybrid);
}

#[test]
fn tick_saves_after_quiet_period() {
    let mut c = core();
    let mut store = MemoryStore::new();
    let mut images = MemoryImageStore::new();

    assert!(!c.tick(0.0, &mut store, &mut images).unwrap().saved, "nothing changed yet");
    let layer = c.model().selected_layer_id().unwrap();
    c.model_mut().add_image(layer, "https://cdn/a.png", Bounds::new(0.0, 0.0, 20.0, 20.0)).unwrap();

    assert!(!c.tick(100.0, &mut store, &mut images).unwrap().saved);
    c.model_mut().add_layer();
    assert!(!c.tick(1000.0, &mut store, &mut images).unwrap().saved);
    // the second change restarted the timer
    assert!(!c.tick(1700.0, &mut store, &mut images).unwrap().saved);
    assert!(c.tick(2500.0, &mut store, &mut images).unwrap().saved);
    assert!(store.get(c.session_key()).unwrap().is_some());
    assert!(!c.tick(5000.0, &mut store, &mut images).unwrap().saved);
}

#[test]
fn tick_waits_for_gesture_to_end() {
    let mut c = core();
    let layer = c.model().selected_layer_id().unwrap();
    c.model_mut().add_image(layer, "https://cdn/a.png", Bounds::new(10.0, 10.0, 30.0, 30.0)).unwrap();
    let mut store = MemoryStore::new();
    let mut images = MemoryImageStore::new();

    c.tick(0.0, &mut store, &mut images).unwrap();
    c.pointer_down(PointerEvent::mouse(25.0, 25.0));
    c.tick(0.0, &mut store, &mut images).unwrap();
    assert!(!c.tick(5000.0, &mut store, &mut images).unwrap().saved);

    c.pointer_up(PointerEvent::mouse(25.0, 25.0));
    assert!(c.tick(5000.0, &mut store, &mut images).unwrap().saved);
}

#[test]
fn tick_reports_poll_cadence() {
    let mut c = core();
    let mut store = MemoryStore::new();
    let mut images = MemoryImageStore::new();
    assert!(c.tick(0.0, &mut store, &mut images).unwrap().poll_due);
    c.apply_poll(&serde_json::json!([]), 0.0);
    assert!(!c.tick(1000.0, &mut store, &mut images).unwrap().poll_due);
    assert!(c.tick(3500.0, &mut store, &mut images).unwrap().poll_due);
}

#[test]
fn quota_failure_keeps_save_pending() {
    let mut c = core();
    c.set_view_mode(ViewMode::Fullscreen);
    let mut tiny = MemoryStore::with_quota(16);
    let mut images = MemoryImageStore::new();

    c.tick(0.0, &mut tiny, &mut images).unwrap();
    let err = c.tick(2000.0, &mut tiny, &mut images).unwrap_err();
    assert!(matches!(err, CanvasError::Storage(_)));
    assert_eq!(tiny.get(c.session_key()).unwrap(), None);

    let mut roomy = MemoryStore::new();
    assert!(c.tick(2100.0, &mut roomy, &mut images).unwrap().saved);
}

#[test]
fn flush_saves_immediately_only_when_dirty() {
    let mut c = core();
    let mut store = MemoryStore::new();
    let mut images = MemoryImageStore::new();
    assert!(!c.flush(0.0, &mut store, &mut images).unwrap());

    c.set_area(Bounds::new(1.0, 1.0, 10.0, 10.0));
    assert!(c.flush(10.0, &mut store, &mut images).unwrap());
    assert!(!c.flush(20.0, &mut store, &mut images).unwrap());
}

#[test]
fn missing_base_raster_loads_blank() {
    let mut c = core();
    paint_line(&mut c);
    let mut store = MemoryStore::new();
    let mut images = MemoryImageStore::new();
    c.save(&mut store, &mut images).unwrap();

    let mut restored = core();
    let dropped = restored.load(&store, &MemoryImageStore::new()).unwrap().unwrap();
    assert_eq!(dropped.len(), 1);
    assert!(restored.base().pixels().all(|p| p[3] == 0));
    assert_eq!((restored.base().width(), restored.base().height()), (64, 64));
}
