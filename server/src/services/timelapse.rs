//! Timelapse jobs — async video generation with polled status.
//!
//! DESIGN
//! ======
//! `POST generate-timelapse` answers immediately with a job id; a spawned
//! task loads the board, drives the renderer, and updates the shared job
//! table that the status endpoint polls. The encoder itself is an
//! external collaborator behind [`TimelapseRenderer`]; when none is
//! configured the feature is reported unavailable rather than failing
//! jobs late.
//!
//! ERROR HANDLING
//! ==============
//! A failed render marks the job `failed` with the error message; nothing
//! propagates beyond the job table, and live sessions are unaffected.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::envelope::now_ms;
use crate::services::storage::BoardData;
use crate::state::AppState;

pub const DEFAULT_DURATION_SECONDS: u32 = 10;

// =============================================================================
// RENDERER PORT
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("video generation failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// External video encoder. Implementations write an MP4 covering the
/// board's shapes in draw order, paced to roughly `duration_secs`.
#[async_trait]
pub trait TimelapseRenderer: Send + Sync {
    async fn render(
        &self,
        board: &BoardData,
        duration_secs: u32,
        output: &Path,
    ) -> Result<(), RenderError>;
}

// =============================================================================
// JOB TABLE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelapseJob {
    pub job_id: String,
    pub board_id: String,
    pub status: JobStatus,
    /// 0–100.
    pub progress: u8,
    pub message: String,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

/// Shared, lock-protected table of timelapse jobs.
pub struct TimelapseJobs {
    jobs: Mutex<HashMap<String, TimelapseJob>>,
}

impl TimelapseJobs {
    #[must_use]
    pub fn new() -> Self {
        Self { jobs: Mutex::new(HashMap::new()) }
    }

    /// Register a queued job for `board_id` and return it.
    pub fn create(&self, board_id: &str) -> TimelapseJob {
        let suffix = Uuid::new_v4().simple().to_string();
        let job = TimelapseJob {
            job_id: format!("job-{}", &suffix[..8]),
            board_id: board_id.to_owned(),
            status: JobStatus::Queued,
            progress: 0,
            message: "Job queued".into(),
            created_at: now_ms(),
            completed_at: None,
        };
        let mut jobs = self.jobs.lock().expect("job table lock");
        jobs.insert(job.job_id.clone(), job.clone());
        info!(job_id = %job.job_id, %board_id, "timelapse job created");
        job
    }

    #[must_use]
    pub fn get(&self, job_id: &str) -> Option<TimelapseJob> {
        self.jobs.lock().expect("job table lock").get(job_id).cloned()
    }

    pub fn mark_processing(&self, job_id: &str) {
        self.update(job_id, |job| {
            job.status = JobStatus::Processing;
            job.message = "Generating video...".into();
        });
    }

    pub fn update_progress(&self, job_id: &str, progress: u8, message: &str) {
        self.update(job_id, |job| {
            job.progress = progress.min(100);
            job.message = message.to_owned();
        });
    }

    pub fn mark_completed(&self, job_id: &str) {
        self.update(job_id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.message = "Video ready".into();
            job.completed_at = Some(now_ms());
        });
    }

    pub fn mark_failed(&self, job_id: &str, message: &str) {
        self.update(job_id, |job| {
            job.status = JobStatus::Failed;
            job.message = message.to_owned();
            job.completed_at = Some(now_ms());
        });
    }

    /// Drop completed and failed jobs older than `max_age_ms`.
    pub fn prune_finished(&self, max_age_ms: i64) {
        let now = now_ms();
        let mut jobs = self.jobs.lock().expect("job table lock");
        jobs.retain(|_, job| match (job.status, job.completed_at) {
            (JobStatus::Completed | JobStatus::Failed, Some(done)) => now - done <= max_age_ms,
            _ => true,
        });
    }

    fn update(&self, job_id: &str, apply: impl FnOnce(&mut TimelapseJob)) {
        let mut jobs = self.jobs.lock().expect("job table lock");
        if let Some(job) = jobs.get_mut(job_id) {
            apply(job);
        }
    }
}

impl Default for TimelapseJobs {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// GENERATION DRIVER
// =============================================================================

/// Run one generation job to completion. Spawned by the HTTP handler;
/// never returns an error, outcomes land in the job table.
pub async fn run_generation(state: AppState, job_id: String, board_id: String, duration_secs: u32) {
    let Some(renderer) = state.renderer.clone() else {
        state.jobs.mark_failed(&job_id, "timelapse renderer not configured");
        return;
    };

    state.jobs.mark_processing(&job_id);
    state.jobs.update_progress(&job_id, 10, "Loading board data...");

    let board = match state.boards.load(&board_id).await {
        Ok(board) => board,
        Err(e) => {
            error!(error = %e, %job_id, %board_id, "timelapse load failed");
            state.jobs.mark_failed(&job_id, &e.to_string());
            return;
        }
    };

    state.jobs.update_progress(&job_id, 30, "Rendering frames...");
    let output = state.boards.timelapse_path(&job_id);

    match renderer.render(&board, duration_secs, &output).await {
        Ok(()) => {
            state.jobs.update_progress(&job_id, 95, "Finalizing video...");
            state.jobs.mark_completed(&job_id);
            info!(%job_id, "timelapse completed");
        }
        Err(e) => {
            error!(error = %e, %job_id, "timelapse render failed");
            state.jobs.mark_failed(&job_id, &e.to_string());
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "timelapse_test.rs"]
mod tests;
