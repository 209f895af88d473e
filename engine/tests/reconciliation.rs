use canvas_engine::jobs::{PlaceholderEvent, SubmitResponse};
use canvas_engine::persistence::{MemoryImageStore, MemoryStore};
use canvas_engine::{Bounds, CanvasCore, EngineConfig};
use image::{DynamicImage, Rgba, RgbaImage};
use serde_json::{json, Value};

fn core() -> CanvasCore {
    CanvasCore::new(EngineConfig { canvas_width: 512, canvas_height: 512, ..EngineConfig::default() }).unwrap()
}

fn job(id: &str, status: &str, url: Option<&str>, target: Bounds) -> Value {
    json!({ "id": id, "status": status, "resultUrl": url, "parameters": { "targetPosition": target } })
}

fn image_response(url: &str, job_id: &str) -> SubmitResponse {
    SubmitResponse { success: true, image_url: Some(url.into()), job_id: Some(job_id.into()), error: None }
}

fn async_response(job_id: &str) -> SubmitResponse {
    SubmitResponse { success: true, job_id: Some(job_id.into()), ..SubmitResponse::default() }
}

fn inline_png() -> String {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255])));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageOutputFormat::Png).unwrap();
    canvas_engine::image_ops::png_data_url(&bytes)
}

#[test]
fn back_to_back_submissions_get_distinct_slots() {
    let mut c = core();
    let a = c.begin_submission(Some(Bounds::new(100.0, 100.0, 200.0, 200.0)));
    let b = c.begin_submission(None);
    assert_ne!(a.target, b.target);
    assert!(!a.target.overlaps(&b.target));
    assert_eq!(c.placeholders().len(), 2);
    assert_eq!(c.jobs().pending_positions().count(), 0);

    c.complete_submission(&a.placeholder_id, &image_response("https://cdn/a.png", "ja")).unwrap();
    c.complete_submission(&b.placeholder_id, &image_response("https://cdn/b.png", "jb")).unwrap();
    assert_eq!(c.model().all_images().count(), 2);
    assert!(c.placeholders().is_empty());

    let placed: Vec<Bounds> = c.model().all_images().map(|i| i.bounds()).collect();
    assert!(placed.contains(&a.target));
    assert!(placed.contains(&b.target));
}

#[test]
fn default_target_follows_area_selection() {
    let mut c = core();
    c.set_area(Bounds::new(40.0, 40.0, 100.0, 80.0));
    let sub = c.begin_submission(None);
    assert_eq!(sub.target, Bounds::new(40.0, 40.0, 100.0, 80.0));
}

#[test]
fn result_seen_twice_lands_once() {
    for poll_first in [false, true] {
        let mut c = core();
        let sub = c.begin_submission(None);
        let poll = json!({ "jobs": [job("j1", "completed", Some("https://cdn/one.png"), sub.target)] });
        let response = image_response("https://cdn/one.png", "j1");

        if poll_first {
            c.apply_poll(&poll, 0.0);
            c.complete_submission(&sub.placeholder_id, &response).unwrap();
        } else {
            c.complete_submission(&sub.placeholder_id, &response).unwrap();
            c.apply_poll(&poll, 0.0);
        }
        c.apply_poll(&poll, 4000.0);

        assert_eq!(c.model().all_images().count(), 1, "poll_first={}", poll_first);
        assert!(c.placeholders().is_empty());
    }
}

#[test]
fn async_job_resolves_through_poll() {
    let mut c = core();
    let sub = c.begin_submission(Some(Bounds::new(0.0, 0.0, 128.0, 128.0)));
    c.drain_events();
    c.complete_submission(&sub.placeholder_id, &async_response("j7")).unwrap();
    assert_eq!(
        c.drain_events(),
        vec![PlaceholderEvent::Linked { placeholder_id: sub.placeholder_id.clone(), job_id: "j7".into() }]
    );

    let processing = json!([job("j7", "processing", None, sub.target)]);
    assert!(c.apply_poll(&processing, 0.0).is_empty());
    assert_eq!(c.placeholders().len(), 1);
    assert!(!c.poll_due(1000.0));
    assert!(c.poll_due(3500.0));

    let done = json!([job("j7", "completed", Some("https://cdn/seven.png"), sub.target)]);
    let report = c.apply_poll(&done, 3500.0);
    assert_eq!(report.added_images.len(), 1);
    assert_eq!(report.removed_placeholders, vec![sub.placeholder_id]);
    let img = c.model().image(report.added_images[0]).unwrap();
    assert_eq!(img.bounds(), sub.target);
    assert_eq!(img.source_job.as_deref(), Some("j7"));
}

#[test]
fn failed_job_keeps_a_dismissable_placeholder() {
    let mut c = core();
    let sub = c.begin_submission(None);
    c.complete_submission(&sub.placeholder_id, &async_response("j9")).unwrap();
    let failed = json!([{ "id": "j9", "status": "failed", "parameters": { "error": "nsfw" } }]);
    let report = c.apply_poll(&failed, 0.0);
    assert_eq!(report.failed_placeholders, vec![sub.placeholder_id.clone()]);
    assert!(c.placeholders()[0].failed);
    assert_eq!(c.placeholders()[0].error.as_deref(), Some("nsfw"));

    // a stale "processing" entry for a failed job is ignored
    c.apply_poll(&json!([job("j9", "processing", None, sub.target)]), 4000.0);
    assert_eq!(c.placeholders().len(), 1);

    c.dismiss_placeholder(&sub.placeholder_id).unwrap();
    assert!(c.placeholders().is_empty());
}

#[test]
fn network_failure_marks_placeholder() {
    let mut c = core();
    let sub = c.begin_submission(None);
    let report = c.fail_submission(&sub.placeholder_id, "offline").unwrap();
    assert_eq!(report.failed_placeholders.len(), 1);
    assert!(c.fail_submission("local-unknown", "offline").is_err());
}

#[test]
fn deleted_result_stays_deleted_across_reload() {
    let mut c = core();
    let sub = c.begin_submission(None);
    c.complete_submission(&sub.placeholder_id, &image_response("https://cdn/gone.png", "j4")).unwrap();
    let id = c.model().all_images().next().unwrap().id;
    c.delete_image(id).unwrap();

    let poll = json!([job("j4", "completed", Some("https://cdn/gone.png"), sub.target)]);
    c.apply_poll(&poll, 0.0);
    assert_eq!(c.model().all_images().count(), 0);

    let mut store = MemoryStore::new();
    let mut images = MemoryImageStore::new();
    c.save(&mut store, &mut images).unwrap();
    let mut reloaded = core();
    reloaded.load(&store, &images).unwrap();

    let report = reloaded.apply_poll(&poll, 0.0);
    assert!(report.added_images.is_empty());
    assert_eq!(reloaded.model().all_images().count(), 0);
    assert!(reloaded.jobs().is_deleted("https://cdn/gone.png"));
}

#[test]
fn pending_job_survives_reload_without_duplicates() {
    let mut c = core();
    let sub = c.begin_submission(Some(Bounds::new(50.0, 50.0, 100.0, 100.0)));
    c.complete_submission(&sub.placeholder_id, &async_response("j5")).unwrap();

    let mut store = MemoryStore::new();
    let mut images = MemoryImageStore::new();
    c.save(&mut store, &mut images).unwrap();
    let mut reloaded = core();
    reloaded.load(&store, &images).unwrap();
    assert_eq!(reloaded.placeholders().len(), 1);
    assert_eq!(reloaded.placeholders()[0].job_id.as_deref(), Some("j5"));

    let report = reloaded.apply_poll(&json!([job("j5", "processing", None, sub.target)]), 0.0);
    assert!(report.new_placeholders.is_empty());
    assert_eq!(reloaded.placeholders().len(), 1);

    reloaded.apply_poll(&json!([job("j5", "completed", Some("https://cdn/five.png"), sub.target)]), 4000.0);
    reloaded.apply_poll(&json!([job("j5", "completed", Some("https://cdn/five.png"), sub.target)]), 8000.0);
    assert_eq!(reloaded.model().all_images().count(), 1);
    assert!(reloaded.placeholders().is_empty());
}

#[test]
fn inline_result_is_not_duplicated_after_reload() {
    let mut c = core();
    let data_url = inline_png();
    let sub = c.begin_submission(None);
    c.complete_submission(&sub.placeholder_id, &image_response(&data_url, "j6")).unwrap();

    let mut store = MemoryStore::new();
    let mut images = MemoryImageStore::new();
    c.save(&mut store, &mut images).unwrap();
    let mut reloaded = core();
    reloaded.load(&store, &images).unwrap();
    assert_eq!(reloaded.model().all_images().count(), 1);

    reloaded.apply_poll(&json!([job("j6", "completed", Some(data_url.as_str()), sub.target)]), 0.0);
    assert_eq!(reloaded.model().all_images().count(), 1);
}

#[test]
fn job_discovered_only_by_poll_gets_a_placeholder() {
    let mut c = core();
    let target = Bounds::new(200.0, 200.0, 64.0, 64.0);
    let report = c.apply_poll(&json!([job("other-tab", "queued", None, target)]), 0.0);
    assert_eq!(report.new_placeholders.len(), 1);
    assert_eq!(c.placeholders()[0].target, target);
    assert_eq!(c.placeholders()[0].job_id.as_deref(), Some("other-tab"));

    c.apply_poll(&json!([job("other-tab", "queued", None, target)]), 4000.0);
    assert_eq!(c.placeholders().len(), 1);
}
