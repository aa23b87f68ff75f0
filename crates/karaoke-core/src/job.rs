//! Job identity and lifecycle

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use uuid::Uuid;

use crate::error::CoreResult;

/// Unique job identifier: submission time in unix millis plus a random suffix.
///
/// The timestamp keeps workspace names sortable; the suffix keeps two jobs submitted in the
/// same millisecond apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        Self(format!("{millis}-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    PitchShift,
    SeparateUpload,
    SeparateUrl,
    DownloadVideo,
    ConvertVideo,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::PitchShift => "pitch_shift",
            JobKind::SeparateUpload => "separate_upload",
            JobKind::SeparateUrl => "separate_url",
            JobKind::DownloadVideo => "download_video",
            JobKind::ConvertVideo => "convert_video",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the job's input came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    Upload(PathBuf),
    Url(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Received,
    Validating,
    Downloading,
    Processing,
    Locating,
    Archiving,
    Encoding,
    Responding,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Lifecycle record of one job. Transitions are logged with the job id.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub source: Option<JobSource>,
    status: JobStatus,
    history: Vec<JobStatus>,
    started: Instant,
}

impl Job {
    pub fn new(id: JobId, kind: JobKind) -> Self {
        tracing::info!(job_id = %id, kind = %kind, "job received");
        Self {
            id,
            kind,
            source: None,
            status: JobStatus::Received,
            history: vec![JobStatus::Received],
            started: Instant::now(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Every status the job has passed through, in order
    pub fn history(&self) -> &[JobStatus] {
        &self.history
    }

    pub fn set_source(&mut self, source: JobSource) {
        self.source = Some(source);
    }

    /// Move to `next`. Terminal states are final; later transitions are ignored.
    pub fn advance(&mut self, next: JobStatus) {
        if self.status.is_terminal() {
            tracing::warn!(job_id = %self.id, from = ?self.status, to = ?next, "transition after terminal state ignored");
            return;
        }
        tracing::debug!(job_id = %self.id, from = ?self.status, to = ?next, "job transition");
        self.status = next;
        self.history.push(next);
    }

    /// Fail the job if `res` is an error; the result passes through unchanged
    pub fn record<T>(&mut self, res: CoreResult<T>) -> CoreResult<T> {
        if let Err(e) = &res {
            self.fail(&e.to_string());
        }
        res
    }

    pub fn succeed(&mut self) {
        self.advance(JobStatus::Succeeded);
        tracing::info!(
            job_id = %self.id,
            kind = %self.kind,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "job succeeded"
        );
    }

    pub fn fail(&mut self, reason: &str) {
        self.advance(JobStatus::Failed);
        tracing::warn!(
            job_id = %self.id,
            kind = %self.kind,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            error = %reason,
            "job failed"
        );
    }
}
