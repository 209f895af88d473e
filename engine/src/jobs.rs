//! Reconciles local placeholders with server-side generation jobs.
//!
//! A submission creates a placeholder immediately; the job it spawns is seen
//! later through the submit response, the periodic poll, or both, in any
//! order. Every merge here is guarded by set membership so that each job adds
//! at most one image and removes at most one placeholder, however many times
//! its terminal state is observed.

use std::collections::HashSet;
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::error::{CanvasError, Result};
use crate::model::CanvasModel;
use crate::objects::{LayerImage, Placeholder};
use crate::types::{Bounds, JobStatus};

const POSITION_EPSILON: f64 = 0.5;
const MAX_PLACEMENT_STEPS: usize = 256;

/// Response to a generation request.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitResponse {
    pub success: bool,
    pub image_url: Option<String>,
    pub job_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl GenerationJob {
    pub fn target_position(&self) -> Option<Bounds> {
        let raw = self.parameters.get("targetPosition")?;
        let b: Bounds = serde_json::from_value(raw.clone()).ok()?;
        (b.width > 0.0 && b.height > 0.0).then_some(b)
    }

    /// Parse one entry of a poll response. Entries that carry an id but
    /// cannot be understood are reported as failed.
    pub fn from_poll_entry(entry: &serde_json::Value) -> Option<GenerationJob> {
        let id = match entry.get("id") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => return None,
        };
        match serde_json::from_value::<GenerationJob>(entry.clone()) {
            Ok(job) if job.status == JobStatus::Completed && job.result_url.is_none() => {
                log::warn!("job {} completed without a result url", id);
                Some(GenerationJob { status: JobStatus::Failed, ..job })
            }
            Ok(job) => Some(job),
            Err(e) => {
                log::warn!("malformed job entry {}: {}", id, e);
                Some(GenerationJob {
                    id,
                    status: JobStatus::Failed,
                    result_url: None,
                    parameters: entry.get("parameters").cloned().unwrap_or(serde_json::Value::Null),
                })
            }
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaceholderEvent {
    Created { placeholder: Placeholder },
    Linked { placeholder_id: String, job_id: String },
    Failed { placeholder_id: String, error: Option<String> },
    Removed { placeholder_id: String },
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct ReconcileReport {
    pub added_images: Vec<u32>,
    pub removed_placeholders: Vec<String>,
    pub failed_placeholders: Vec<String>,
    pub new_placeholders: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added_images.is_empty()
            && self.removed_placeholders.is_empty()
            && self.failed_placeholders.is_empty()
            && self.new_placeholders.is_empty()
    }

    fn merge(&mut self, other: ReconcileReport) {
        self.added_images.extend(other.added_images);
        self.removed_placeholders.extend(other.removed_placeholders);
        self.failed_placeholders.extend(other.failed_placeholders);
        self.new_placeholders.extend(other.new_placeholders);
    }
}

/// A target slot held between choosing a position and showing a placeholder there.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reservation {
    token: u64,
    pub target: Bounds,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Submission {
    pub placeholder_id: String,
    pub target: Bounds,
}

pub struct JobReconciler {
    known: HashSet<String>,
    resolved: HashSet<String>,
    pending_positions: Vec<(u64, Bounds)>,
    placeholders: Vec<Placeholder>,
    deleted_results: HashSet<String>,
    events: Vec<PlaceholderEvent>,
    next_token: u64,
    last_poll_ms: Option<f64>,
    poll_interval_ms: f64,
    placement_gap: f64,
    dirty: bool,
}

impl JobReconciler {
    pub fn new(poll_interval_ms: f64, placement_gap: f64) -> Self {
        JobReconciler {
            known: HashSet::new(),
            resolved: HashSet::new(),
            pending_positions: Vec::new(),
            placeholders: Vec::new(),
            deleted_results: HashSet::new(),
            events: Vec::new(),
            next_token: 1,
            last_poll_ms: None,
            poll_interval_ms,
            placement_gap,
            dirty: false,
        }
    }

    /// Reinstate persisted view state after a reload. Id sets start empty.
    pub fn restore(&mut self, placeholders: Vec<Placeholder>, deleted_results: Vec<String>) {
        self.placeholders = placeholders;
        self.deleted_results = deleted_results.into_iter().collect();
        self.known.clear();
        self.resolved.clear();
        self.pending_positions.clear();
        self.dirty = false;
    }

    pub fn placeholders(&self) -> &[Placeholder] { &self.placeholders }
    pub fn pending_positions(&self) -> impl Iterator<Item = &Bounds> { self.pending_positions.iter().map(|(_, b)| b) }
    pub fn is_known(&self, job_id: &str) -> bool { self.known.contains(job_id) }
    pub fn is_resolved(&self, job_id: &str) -> bool { self.resolved.contains(job_id) }
    pub fn is_deleted(&self, reference: &str) -> bool { self.deleted_results.contains(reference) }

    pub fn deleted_results(&self) -> Vec<String> {
        let mut v: Vec<String> = self.deleted_results.iter().cloned().collect();
        v.sort();
        v
    }

    pub fn drain_events(&mut self) -> Vec<PlaceholderEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    // --- Polling cadence ---

    pub fn poll_due(&self, now_ms: f64) -> bool {
        match self.last_poll_ms {
            None => true,
            Some(last) => now_ms - last >= self.poll_interval_ms,
        }
    }

    pub fn mark_polled(&mut self, now_ms: f64) {
        self.last_poll_ms = Some(now_ms);
    }

    // --- Submission ---

    fn occupied(&self) -> impl Iterator<Item = &Bounds> {
        self.pending_positions().chain(self.placeholders.iter().map(|p| &p.target))
    }

    /// First slot at or to the right of `requested` that no reservation or placeholder overlaps.
    pub fn choose_position(&self, requested: Bounds) -> Bounds {
        let mut candidate = requested;
        for _ in 0..MAX_PLACEMENT_STEPS {
            let blocking = self
                .occupied()
                .filter(|b| b.overlaps(&candidate))
                .map(|b| b.right())
                .fold(f64::NEG_INFINITY, f64::max);
            if blocking == f64::NEG_INFINITY {
                return candidate;
            }
            candidate.x = blocking + self.placement_gap;
        }
        candidate
    }

    pub fn reserve_position(&mut self, requested: Bounds) -> Reservation {
        let target = self.choose_position(requested);
        let token = self.next_token;
        self.next_token += 1;
        self.pending_positions.push((token, target));
        log::debug!("reserved slot {:?} (token {})", target, token);
        Reservation { token, target }
    }

    pub fn release_reservation(&mut self, reservation: &Reservation) {
        self.pending_positions.retain(|(t, _)| *t != reservation.token);
    }

    /// Show a placeholder in the reserved slot, then give the reservation back.
    pub fn record_placeholder(&mut self, reservation: Reservation) -> String {
        let placeholder = Placeholder {
            id: format!("local-{}", Uuid::new_v4()),
            target: reservation.target,
            failed: false,
            job_id: None,
            error: None,
        };
        let id = placeholder.id.clone();
        self.placeholders.push(placeholder.clone());
        self.events.push(PlaceholderEvent::Created { placeholder });
        self.release_reservation(&reservation);
        self.dirty = true;
        id
    }

    pub fn begin_submission(&mut self, requested: Bounds) -> Submission {
        let reservation = self.reserve_position(requested);
        let target = reservation.target;
        let placeholder_id = self.record_placeholder(reservation);
        Submission { placeholder_id, target }
    }

    /// Apply the direct response of a submission.
    pub fn complete_submission(&mut self, model: &mut CanvasModel, placeholder_id: &str, response: &SubmitResponse) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let target = self
            .placeholder(placeholder_id)
            .map(|p| p.target)
            .ok_or_else(|| CanvasError::PlaceholderNotFound(placeholder_id.to_string()));

        if !response.success {
            if let Some(job) = &response.job_id {
                self.known.insert(job.clone());
                self.resolved.insert(job.clone());
            }
            let reason = response.error.clone().unwrap_or_else(|| "generation failed".to_string());
            if target.is_ok() {
                self.mark_failed(placeholder_id, Some(reason), &mut report);
            }
            return Ok(report);
        }

        match (&response.image_url, &response.job_id) {
            (Some(url), job) => {
                if let Some(job) = job {
                    self.known.insert(job.clone());
                    if !self.resolved.insert(job.clone()) {
                        // Poll already merged this job.
                        self.remove_placeholder(placeholder_id, &mut report);
                        return Ok(report);
                    }
                }
                let target = target?;
                self.remove_placeholder(placeholder_id, &mut report);
                self.materialize(model, url, job.as_deref(), target, &mut report)?;
            }
            (None, Some(job)) => {
                self.known.insert(job.clone());
                if self.resolved.contains(job) {
                    self.remove_placeholder(placeholder_id, &mut report);
                } else if target.is_ok() {
                    self.link(placeholder_id, job);
                }
            }
            (None, None) => {
                log::warn!("submission {} returned neither an image nor a job", placeholder_id);
                if target.is_ok() {
                    self.mark_failed(placeholder_id, Some("malformed response".to_string()), &mut report);
                }
            }
        }
        Ok(report)
    }

    /// Network failure while submitting.
    pub fn fail_submission(&mut self, placeholder_id: &str, reason: &str) -> Result<ReconcileReport> {
        if self.placeholder(placeholder_id).is_none() {
            return Err(CanvasError::PlaceholderNotFound(placeholder_id.to_string()));
        }
        let err = CanvasError::TransientNetwork(reason.to_string());
        log::warn!("submission {} failed: {}", placeholder_id, err);
        let mut report = ReconcileReport::default();
        self.mark_failed(placeholder_id, Some(err.to_string()), &mut report);
        Ok(report)
    }

    pub fn dismiss_placeholder(&mut self, placeholder_id: &str) -> Result<Placeholder> {
        let pos = self
            .placeholders
            .iter()
            .position(|p| p.id == placeholder_id)
            .ok_or_else(|| CanvasError::PlaceholderNotFound(placeholder_id.to_string()))?;
        let removed = self.placeholders.remove(pos);
        self.events.push(PlaceholderEvent::Removed { placeholder_id: removed.id.clone() });
        self.dirty = true;
        Ok(removed)
    }

    /// Remember a user-deleted result so no later poll brings it back.
    pub fn mark_result_deleted(&mut self, image: &LayerImage) {
        if image.source_job.is_none() && !is_remote(&image.source) {
            return;
        }
        self.deleted_results.insert(image.source.clone());
        if let Some(job) = &image.source_job {
            self.deleted_results.insert(job.clone());
        }
        self.dirty = true;
    }

    // --- Polling ---

    /// Merge a poll response: either an array of jobs or `{ "jobs": [...] }`.
    pub fn apply_poll(&mut self, model: &mut CanvasModel, raw: &serde_json::Value, default_target: Bounds) -> ReconcileReport {
        let entries = match raw {
            serde_json::Value::Array(a) => a.as_slice(),
            serde_json::Value::Object(o) => match o.get("jobs") {
                Some(serde_json::Value::Array(a)) => a.as_slice(),
                _ => {
                    log::warn!("poll response has no jobs array");
                    return ReconcileReport::default();
                }
            },
            _ => {
                log::warn!("unexpected poll response shape");
                return ReconcileReport::default();
            }
        };

        let mut report = ReconcileReport::default();
        for entry in entries {
            match GenerationJob::from_poll_entry(entry) {
                Some(job) => report.merge(self.reconcile_job(model, &job, default_target)),
                None => log::warn!("skipping job entry without id"),
            }
        }
        report
    }

    pub fn reconcile_job(&mut self, model: &mut CanvasModel, job: &GenerationJob, default_target: Bounds) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if self.resolved.contains(&job.id) {
            return report;
        }

        match job.status {
            JobStatus::Queued | JobStatus::Processing => {
                if self.known.contains(&job.id) {
                    return report;
                }
                let target = job.target_position().unwrap_or(default_target);
                if self.placeholder_for_job(&job.id).is_none() {
                    match self.unlinked_at(&target) {
                        Some(pid) => self.link(&pid, &job.id),
                        None => {
                            let placeholder = Placeholder {
                                id: format!("local-{}", Uuid::new_v4()),
                                target,
                                failed: false,
                                job_id: Some(job.id.clone()),
                                error: None,
                            };
                            log::info!("job {} discovered by poll, placeholder {}", job.id, placeholder.id);
                            report.new_placeholders.push(placeholder.id.clone());
                            self.placeholders.push(placeholder.clone());
                            self.events.push(PlaceholderEvent::Created { placeholder });
                            self.dirty = true;
                        }
                    }
                }
                self.known.insert(job.id.clone());
            }
            JobStatus::Completed => {
                self.known.insert(job.id.clone());
                self.resolved.insert(job.id.clone());
                let job_target = job.target_position();
                let placeholder = self
                    .placeholder_for_job(&job.id)
                    .or_else(|| job_target.and_then(|t| self.unlinked_at(&t)));
                let placeholder_target = placeholder.as_ref().and_then(|pid| self.placeholder(pid)).map(|p| p.target);
                if let Some(pid) = placeholder {
                    self.remove_placeholder(&pid, &mut report);
                }
                let Some(url) = job.result_url.as_deref() else { return report; };
                let target = job_target.or(placeholder_target).unwrap_or(default_target);
                if let Err(e) = self.materialize(model, url, Some(&job.id), target, &mut report) {
                    log::warn!("could not place result of job {}: {}", job.id, e);
                }
            }
            JobStatus::Failed => {
                self.known.insert(job.id.clone());
                self.resolved.insert(job.id.clone());
                let placeholder = self
                    .placeholder_for_job(&job.id)
                    .or_else(|| job.target_position().and_then(|t| self.unlinked_at(&t)));
                if let Some(pid) = placeholder {
                    let reason = job.parameters.get("error").and_then(|e| e.as_str()).unwrap_or("generation failed");
                    self.mark_failed(&pid, Some(reason.to_string()), &mut report);
                }
            }
        }
        report
    }

    // --- Internals ---

    fn placeholder(&self, id: &str) -> Option<&Placeholder> {
        self.placeholders.iter().find(|p| p.id == id)
    }

    fn placeholder_for_job(&self, job_id: &str) -> Option<String> {
        self.placeholders.iter().find(|p| p.job_id.as_deref() == Some(job_id)).map(|p| p.id.clone())
    }

    fn unlinked_at(&self, target: &Bounds) -> Option<String> {
        self.placeholders
            .iter()
            .find(|p| p.job_id.is_none() && same_position(&p.target, target))
            .map(|p| p.id.clone())
    }

    fn link(&mut self, placeholder_id: &str, job_id: &str) {
        if let Some(p) = self.placeholders.iter_mut().find(|p| p.id == placeholder_id) {
            p.job_id = Some(job_id.to_string());
            self.events.push(PlaceholderEvent::Linked { placeholder_id: placeholder_id.to_string(), job_id: job_id.to_string() });
            self.dirty = true;
        }
    }

    fn remove_placeholder(&mut self, placeholder_id: &str, report: &mut ReconcileReport) {
        let before = self.placeholders.len();
        self.placeholders.retain(|p| p.id != placeholder_id);
        if self.placeholders.len() != before {
            report.removed_placeholders.push(placeholder_id.to_string());
            self.events.push(PlaceholderEvent::Removed { placeholder_id: placeholder_id.to_string() });
            self.dirty = true;
        }
    }

    fn mark_failed(&mut self, placeholder_id: &str, error: Option<String>, report: &mut ReconcileReport) {
        if let Some(p) = self.placeholders.iter_mut().find(|p| p.id == placeholder_id) {
            p.failed = true;
            p.error = error.clone();
            report.failed_placeholders.push(placeholder_id.to_string());
            self.events.push(PlaceholderEvent::Failed { placeholder_id: placeholder_id.to_string(), error });
            self.dirty = true;
        }
    }

    fn materialize(&mut self, model: &mut CanvasModel, url: &str, job_id: Option<&str>, target: Bounds, report: &mut ReconcileReport) -> Result<()> {
        if self.deleted_results.contains(url) || job_id.is_some_and(|j| self.deleted_results.contains(j)) {
            log::info!("result {} was deleted by the user, not restoring", url);
            return Ok(());
        }
        let already_placed = model.find_image_by_source(url).is_some()
            || job_id.is_some_and(|j| model.all_images().any(|i| i.source_job.as_deref() == Some(j)));
        if already_placed {
            log::info!("result {} already on canvas", url);
            return Ok(());
        }
        let layer = model.ensure_target_layer();
        let id = model.add_image(layer, url, target)?;
        if let Some(job) = job_id {
            model.set_image_job(id, job)?;
        }
        log::info!("placed result {} as image {}", url, id);
        report.added_images.push(id);
        Ok(())
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn same_position(a: &Bounds, b: &Bounds) -> bool {
    (a.x - b.x).abs() < POSITION_EPSILON
        && (a.y - b.y).abs() < POSITION_EPSILON
        && (a.width - b.width).abs() < POSITION_EPSILON
        && (a.height - b.height).abs() < POSITION_EPSILON
}
