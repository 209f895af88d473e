use canvas_engine::input::{GestureState, InputAction, PinchTarget, PointerEvent};
use canvas_engine::{AreaMode, Bounds, CanvasCore, EngineConfig, Tool};

fn core() -> CanvasCore {
    CanvasCore::new(EngineConfig::default()).unwrap()
}

/// Core with one selected 200x200 image at (300, 300) on the selected layer.
fn core_with_image() -> (CanvasCore, u32) {
    let mut c = core();
    let layer = c.model().selected_layer_id().unwrap();
    let id = c.model_mut().add_image(layer, "photo.png", Bounds::new(300.0, 300.0, 200.0, 200.0)).unwrap();
    c.model_mut().select_image(Some(id)).unwrap();
    (c, id)
}

fn drag(c: &mut CanvasCore, from: (f64, f64), to: (f64, f64)) -> Vec<InputAction> {
    c.pointer_down(PointerEvent::mouse(from.0, from.1));
    c.pointer_move(PointerEvent::mouse(to.0, to.1));
    c.pointer_up(PointerEvent::mouse(to.0, to.1))
}

fn selected_count(c: &CanvasCore) -> usize {
    c.model().all_images().filter(|i| i.selected).count()
}

#[test]
fn corner_drag_with_aspect_lock_grows_from_origin() {
    let (mut c, id) = core_with_image();
    c.pointer_down(PointerEvent::mouse(500.0, 500.0));
    assert!(matches!(c.gesture_state(), GestureState::ResizingImage { .. }));
    c.pointer_move(PointerEvent::mouse(550.0, 550.0));
    let actions = c.pointer_up(PointerEvent::mouse(550.0, 550.0));

    assert_eq!(c.model().image(id).unwrap().bounds(), Bounds::new(300.0, 300.0, 250.0, 250.0));
    assert!(actions.contains(&InputAction::ImageUpdated { id }));
    assert_eq!(c.history().len(), 1, "image transforms are not undoable");
    assert!(c.gesture_state().is_idle());
}

#[test]
fn small_resize_snaps_back_to_original_box() {
    let (mut c, id) = core_with_image();
    drag(&mut c, (300.0, 300.0), (306.0, 306.0));
    assert_eq!(c.model().image(id).unwrap().bounds(), Bounds::new(300.0, 300.0, 200.0, 200.0));
}

#[test]
fn jitter_on_image_near_canvas_edge_is_not_an_edit() {
    let mut c = core();
    let layer = c.model().selected_layer_id().unwrap();
    let original = Bounds::new(600.0, 600.0, 400.0, 400.0);
    let id = c.model_mut().add_image(layer, "edge.png", original).unwrap();
    c.model_mut().select_image(Some(id)).unwrap();

    c.pointer_down(PointerEvent::mouse(1000.0, 1000.0));
    assert!(matches!(c.gesture_state(), GestureState::ResizingImage { .. }));
    c.pointer_move(PointerEvent::mouse(1002.0, 1002.0));
    c.pointer_up(PointerEvent::mouse(1002.0, 1002.0));
    assert_eq!(c.model().image(id).unwrap().bounds(), original);

    // a deliberate drag into the band still snaps to the boundary
    drag(&mut c, (1000.0, 1000.0), (1015.0, 1015.0));
    assert_eq!(c.model().image(id).unwrap().bounds(), Bounds::new(600.0, 600.0, 424.0, 424.0));
}

#[test]
fn rotate_gesture_snaps_to_cardinal() {
    let (mut c, id) = core_with_image();
    // rotate handle sits 30 above the top edge midpoint
    c.pointer_down(PointerEvent::mouse(400.0, 270.0));
    assert!(matches!(c.gesture_state(), GestureState::Rotating { .. }));

    let angle = (87.0f64 - 90.0).to_radians();
    let (x, y) = (400.0 + 100.0 * angle.cos(), 400.0 + 100.0 * angle.sin());
    c.pointer_move(PointerEvent::mouse(x, y));
    c.pointer_up(PointerEvent::mouse(x, y));
    assert_eq!(c.model().image(id).unwrap().rotation, 90.0);
}

#[test]
fn body_drag_moves_and_selects() {
    let mut c = core();
    let layer = c.model().selected_layer_id().unwrap();
    let id = c.model_mut().add_image(layer, "a.png", Bounds::new(100.0, 100.0, 100.0, 100.0)).unwrap();

    let down = c.pointer_down(PointerEvent::mouse(150.0, 150.0));
    assert!(down.contains(&InputAction::SelectionChanged { image_id: Some(id) }));
    c.pointer_move(PointerEvent::mouse(170.0, 140.0));
    c.pointer_up(PointerEvent::mouse(170.0, 140.0));

    let img = c.model().image(id).unwrap();
    assert!(img.selected);
    assert_eq!(img.bounds(), Bounds::new(120.0, 90.0, 100.0, 100.0));
}

#[test]
fn images_on_other_layers_fall_through_to_pan() {
    let mut c = core();
    let first = c.model().selected_layer_id().unwrap();
    let id = c.model_mut().add_image(first, "a.png", Bounds::new(100.0, 100.0, 100.0, 100.0)).unwrap();
    c.model_mut().add_layer();

    c.pointer_down(PointerEvent::mouse(150.0, 150.0));
    assert!(matches!(c.gesture_state(), GestureState::Panning { .. }));
    c.pointer_move(PointerEvent::mouse(160.0, 170.0));
    c.pointer_up(PointerEvent::mouse(160.0, 170.0));

    assert!(!c.model().image(id).unwrap().selected);
    assert_eq!(c.model().image(id).unwrap().bounds(), Bounds::new(100.0, 100.0, 100.0, 100.0));
    assert_eq!((c.viewport().pan_x, c.viewport().pan_y), (10.0, 20.0));
}

#[test]
fn tap_on_empty_canvas_clears_selection() {
    let (mut c, _) = core_with_image();
    let actions = drag(&mut c, (50.0, 50.0), (51.0, 50.0));
    assert!(actions.contains(&InputAction::SelectionChanged { image_id: None }));
    assert_eq!(selected_count(&c), 0);
}

#[test]
fn resize_handle_beats_area_mode() {
    let (mut c, _) = core_with_image();
    c.set_tool(Tool::AreaSelect);
    c.pointer_down(PointerEvent::mouse(300.0, 300.0));
    assert!(matches!(c.gesture_state(), GestureState::ResizingImage { .. }));
}

#[test]
fn area_draw_drag_and_resize() {
    let mut c = core();
    c.set_tool(Tool::AreaSelect);

    c.pointer_down(PointerEvent::mouse(100.0, 100.0));
    assert_eq!(c.area().unwrap().mode, AreaMode::Drawing);
    c.pointer_move(PointerEvent::mouse(300.0, 250.0));
    c.pointer_up(PointerEvent::mouse(300.0, 250.0));
    let area = c.area().unwrap();
    assert_eq!(area.bounds, Bounds::new(100.0, 100.0, 200.0, 150.0));
    assert_eq!(area.mode, AreaMode::Idle);
    assert!(area.active_handle.is_none());

    c.pointer_down(PointerEvent::mouse(200.0, 200.0));
    assert!(matches!(c.gesture_state(), GestureState::DraggingArea { .. }));
    c.pointer_move(PointerEvent::mouse(210.0, 220.0));
    c.pointer_up(PointerEvent::mouse(210.0, 220.0));
    assert_eq!(c.area().unwrap().bounds, Bounds::new(110.0, 120.0, 200.0, 150.0));

    c.pointer_down(PointerEvent::mouse(310.0, 270.0));
    assert!(matches!(c.gesture_state(), GestureState::ResizingArea { .. }));
    c.pointer_move(PointerEvent::mouse(330.0, 300.0));
    c.pointer_up(PointerEvent::mouse(330.0, 300.0));
    assert_eq!(c.area().unwrap().bounds, Bounds::new(110.0, 120.0, 220.0, 180.0));
    assert_eq!(c.history().len(), 1);
}

#[test]
fn click_without_drag_leaves_no_area() {
    let mut c = core();
    c.set_tool(Tool::AreaSelect);
    drag(&mut c, (400.0, 400.0), (401.0, 402.0));
    assert!(c.area().is_none());
}

#[test]
fn cancel_restores_pre_gesture_state() {
    let (mut c, id) = core_with_image();
    c.pointer_down(PointerEvent::mouse(400.0, 400.0));
    c.pointer_move(PointerEvent::mouse(450.0, 480.0));
    assert_ne!(c.model().image(id).unwrap().bounds(), Bounds::new(300.0, 300.0, 200.0, 200.0));
    c.pointer_cancel();
    assert_eq!(c.model().image(id).unwrap().bounds(), Bounds::new(300.0, 300.0, 200.0, 200.0));
    assert!(c.gesture_state().is_idle());

    c.pointer_down(PointerEvent::mouse(500.0, 500.0));
    c.pointer_move(PointerEvent::mouse(700.0, 700.0));
    c.pointer_cancel();
    assert_eq!(c.model().image(id).unwrap().bounds(), Bounds::new(300.0, 300.0, 200.0, 200.0));

    c.set_tool(Tool::AreaSelect);
    c.set_area(Bounds::new(10.0, 10.0, 50.0, 50.0));
    c.pointer_down(PointerEvent::mouse(30.0, 30.0));
    c.pointer_move(PointerEvent::mouse(90.0, 90.0));
    c.pointer_cancel();
    assert_eq!(c.area().unwrap().bounds, Bounds::new(10.0, 10.0, 50.0, 50.0));
}

#[test]
fn second_finger_cancels_drag_and_starts_pinch() {
    let (mut c, id) = core_with_image();
    c.pointer_down(PointerEvent::touch(10, 350.0, 350.0));
    c.pointer_move(PointerEvent::touch(10, 380.0, 390.0));
    assert!(matches!(c.gesture_state(), GestureState::DraggingImage { .. }));

    c.pointer_down(PointerEvent::touch(11, 600.0, 600.0));
    assert_eq!(c.model().image(id).unwrap().bounds(), Bounds::new(300.0, 300.0, 200.0, 200.0));
    assert!(matches!(c.gesture_state(), GestureState::PinchZoom { target: PinchTarget::Image { .. }, .. }));
}

#[test]
fn pinch_target_is_fixed_for_the_gesture() {
    let (mut c, id) = core_with_image();
    c.pointer_down(PointerEvent::touch(10, 100.0, 100.0));
    c.pointer_down(PointerEvent::touch(11, 200.0, 100.0));
    assert!(matches!(c.gesture_state(), GestureState::PinchZoom { target: PinchTarget::Image { id: t }, .. } if *t == id));

    c.model_mut().select_image(None).unwrap();
    c.pointer_move(PointerEvent::touch(11, 300.0, 100.0));
    assert!(matches!(c.gesture_state(), GestureState::PinchZoom { target: PinchTarget::Image { .. }, .. }));
    assert_eq!(c.model().image(id).unwrap().bounds(), Bounds::new(200.0, 200.0, 400.0, 400.0));
    assert_eq!(c.viewport().zoom, 1.0);

    // one finger up ends the pinch; the other is ignored until released
    c.pointer_up(PointerEvent::touch(11, 300.0, 100.0));
    assert!(c.gesture_state().is_idle());
    c.pointer_move(PointerEvent::touch(10, 150.0, 150.0));
    assert_eq!(c.viewport().pan_x, 0.0);
    c.pointer_up(PointerEvent::touch(10, 150.0, 150.0));

    c.pointer_down(PointerEvent::touch(12, 100.0, 100.0));
    assert!(matches!(c.gesture_state(), GestureState::Panning { .. }));
}

#[test]
fn pinch_without_selection_zooms_canvas() {
    let mut c = core();
    c.pointer_down(PointerEvent::touch(1, 100.0, 100.0));
    c.pointer_down(PointerEvent::touch(2, 200.0, 100.0));
    c.pointer_move(PointerEvent::touch(2, 300.0, 100.0));
    assert!(matches!(c.gesture_state(), GestureState::PinchZoom { target: PinchTarget::Canvas, .. }));
    assert_eq!(c.viewport().zoom, 2.0);

    c.pointer_cancel();
    assert_eq!(c.viewport().zoom, 2.0, "a cancelled canvas pinch keeps its viewport");
}

#[test]
fn image_pinch_clamps_to_minimum() {
    let (mut c, id) = core_with_image();
    c.pointer_down(PointerEvent::touch(1, 100.0, 100.0));
    c.pointer_down(PointerEvent::touch(2, 300.0, 100.0));
    c.pointer_move(PointerEvent::touch(2, 101.0, 100.0));
    let b = c.model().image(id).unwrap().bounds();
    assert_eq!((b.width, b.height), (20.0, 20.0));
}

#[test]
fn at_most_one_image_selected_across_layers() {
    let mut c = core();
    let l1 = c.model().selected_layer_id().unwrap();
    let l2 = c.model_mut().add_layer();
    let mut ids = Vec::new();
    for (i, layer) in [l1, l2, l1, l2].into_iter().enumerate() {
        let x = 50.0 + i as f64 * 150.0;
        ids.push(c.model_mut().add_image(layer, "x.png", Bounds::new(x, 50.0, 100.0, 100.0)).unwrap());
    }

    for step in 0..20 {
        let id = ids[(step * 7) % ids.len()];
        c.model_mut().select_image(Some(id)).unwrap();
        assert_eq!(selected_count(&c), 1);
        let layer = c.model().layer_of_image(id).unwrap();
        assert_eq!(c.model().selected_layer_id(), Some(layer));

        let x = 100.0 + ((step * 3) % 4) as f64 * 150.0;
        drag(&mut c, (x, 100.0), (x + 1.0, 100.0));
        assert!(selected_count(&c) <= 1);
    }
}
