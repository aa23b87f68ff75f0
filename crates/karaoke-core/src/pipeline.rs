//! Job pipeline
//!
//! ```text
//! workspace create → [download] → tool run → [locate output → archive] → Artifact
//!                                                                          │
//!                                        response body owns the workspace ─┘
//! ```
//!
//! Each job kind is one method. Methods take the job's [`Workspace`] by value, so an error at any
//! step drops it and removes the tree. On success the workspace moves into the returned
//! [`Artifact`] and lives until the response body is done with it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::archive::build_archive;
use crate::config::KaraokeConfig;
use crate::error::{CoreError, CoreResult};
use crate::input::validate_media_url;
use crate::job::{Job, JobId, JobKind, JobSource, JobStatus};
use crate::locator::{locate_download, locate_stem_dir};
use crate::pitch::PitchShift;
use crate::tool::{ToolInvocation, ToolRunner};
use crate::workspace::Workspace;

pub const CONTENT_TYPE_MP3: &str = "audio/mpeg";
pub const CONTENT_TYPE_ZIP: &str = "application/zip";
pub const CONTENT_TYPE_MP4: &str = "video/mp4";

const DOWNLOAD_AUDIO_STEM: &str = "input";
const DOWNLOAD_VIDEO_STEM: &str = "video";

/// Finished job output, ready to stream
#[derive(Debug)]
pub struct Artifact {
    pub path: PathBuf,
    pub content_type: &'static str,
    /// Name offered to the client
    pub file_name: &'static str,
    /// Removed when the artifact (or whatever took it over) is dropped
    pub workspace: Workspace,
}

impl Artifact {
    fn new(path: PathBuf, content_type: &'static str, file_name: &'static str, workspace: Workspace) -> Self {
        Self {
            path,
            content_type,
            file_name,
            workspace,
        }
    }
}

pub struct Pipeline {
    config: Arc<KaraokeConfig>,
    runner: Arc<dyn ToolRunner>,
    limiter: Semaphore,
}

impl Pipeline {
    pub fn new(config: Arc<KaraokeConfig>, runner: Arc<dyn ToolRunner>) -> Self {
        let limiter = Semaphore::new(config.max_concurrent_jobs);
        Self {
            config,
            runner,
            limiter,
        }
    }

    pub fn config(&self) -> &KaraokeConfig {
        &self.config
    }

    /// Jobs currently holding a worker slot
    pub fn active_jobs(&self) -> usize {
        self.config
            .max_concurrent_jobs
            .saturating_sub(self.limiter.available_permits())
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.max_concurrent_jobs
    }

    /// Register a job and create its workspace
    pub async fn open_job(&self, kind: JobKind) -> CoreResult<(Job, Workspace)> {
        let id = JobId::new();
        let ws = Workspace::create(&self.config.work_root, &id).await?;
        Ok((Job::new(id, kind), ws))
    }

    // ═══════════════════════════════════════════════════════════════
    // JOBS
    // ═══════════════════════════════════════════════════════════════

    /// Shift an uploaded track by `shift` semitones; duration is preserved
    pub async fn pitch_shift(
        &self,
        job: &mut Job,
        ws: Workspace,
        input: PathBuf,
        shift: PitchShift,
    ) -> CoreResult<Artifact> {
        let res = self.pitch_shift_steps(job, ws, input, shift).await;
        settle(job, res)
    }

    async fn pitch_shift_steps(
        &self,
        job: &mut Job,
        ws: Workspace,
        input: PathBuf,
        shift: PitchShift,
    ) -> CoreResult<Artifact> {
        job.set_source(JobSource::Upload(input.clone()));
        job.advance(JobStatus::Validating);
        ensure_upload(&input).await?;

        let _slot = self.acquire_slot(job).await?;

        job.advance(JobStatus::Processing);
        tracing::info!(job_id = %job.id, semitones = shift.semitones, rate = shift.rate(), "pitch shift");
        let output = ws.file("pitched.mp3");
        let inv = ToolInvocation::transcode_pitch(&self.config.tools.ffmpeg, &input, &output, &shift);
        self.runner.run(&inv).await?;
        ensure_produced(&output).await?;

        Ok(Artifact::new(output, CONTENT_TYPE_MP3, "pitched.mp3", ws))
    }

    /// Separate an uploaded track into stems
    pub async fn separate_upload(&self, job: &mut Job, ws: Workspace, input: PathBuf) -> CoreResult<Artifact> {
        let res = self.separate_upload_steps(job, ws, input).await;
        settle(job, res)
    }

    async fn separate_upload_steps(&self, job: &mut Job, ws: Workspace, input: PathBuf) -> CoreResult<Artifact> {
        job.set_source(JobSource::Upload(input.clone()));
        job.advance(JobStatus::Validating);
        ensure_upload(&input).await?;

        let _slot = self.acquire_slot(job).await?;
        self.separate_and_archive(job, ws, &input).await
    }

    /// Download a video's audio, then separate it into stems
    pub async fn separate_url(&self, job: &mut Job, ws: Workspace, url: &str) -> CoreResult<Artifact> {
        let res = self.separate_url_steps(job, ws, url).await;
        settle(job, res)
    }

    async fn separate_url_steps(&self, job: &mut Job, ws: Workspace, url: &str) -> CoreResult<Artifact> {
        job.advance(JobStatus::Validating);
        let url = validate_media_url(url)?;
        job.set_source(JobSource::Url(url.clone()));

        let _slot = self.acquire_slot(job).await?;

        job.advance(JobStatus::Downloading);
        let inv = ToolInvocation::download_audio(&self.config.tools.downloader, &url, ws.path(), DOWNLOAD_AUDIO_STEM);
        self.runner.run(&inv).await?;
        let input = locate_download(ws.path(), DOWNLOAD_AUDIO_STEM).await?;
        tracing::info!(job_id = %job.id, file = %input.display(), "download complete");

        self.separate_and_archive(job, ws, &input).await
    }

    /// Download a video as mp4
    pub async fn download_video(&self, job: &mut Job, ws: Workspace, url: &str) -> CoreResult<Artifact> {
        let res = self.download_video_steps(job, ws, url).await;
        settle(job, res)
    }

    async fn download_video_steps(&self, job: &mut Job, ws: Workspace, url: &str) -> CoreResult<Artifact> {
        job.advance(JobStatus::Validating);
        let url = validate_media_url(url)?;
        job.set_source(JobSource::Url(url.clone()));

        let _slot = self.acquire_slot(job).await?;

        job.advance(JobStatus::Downloading);
        let inv = ToolInvocation::download_video(
            &self.config.tools.downloader,
            &url,
            ws.path(),
            DOWNLOAD_VIDEO_STEM,
            &self.config.download.video_format,
        );
        self.runner.run(&inv).await?;

        job.advance(JobStatus::Locating);
        let video = locate_download(ws.path(), DOWNLOAD_VIDEO_STEM).await?;
        ensure_produced(&video).await?;

        Ok(Artifact::new(video, CONTENT_TYPE_MP4, "video.mp4", ws))
    }

    /// Extract an uploaded video's audio track as mp3
    pub async fn convert_video(&self, job: &mut Job, ws: Workspace, input: PathBuf) -> CoreResult<Artifact> {
        let res = self.convert_video_steps(job, ws, input).await;
        settle(job, res)
    }

    async fn convert_video_steps(&self, job: &mut Job, ws: Workspace, input: PathBuf) -> CoreResult<Artifact> {
        job.set_source(JobSource::Upload(input.clone()));
        job.advance(JobStatus::Validating);
        ensure_upload(&input).await?;

        let _slot = self.acquire_slot(job).await?;

        job.advance(JobStatus::Encoding);
        let output = ws.file("converted.mp3");
        let inv = ToolInvocation::transcode_to_mp3(&self.config.tools.ffmpeg, &input, &output);
        self.runner.run(&inv).await?;
        ensure_produced(&output).await?;

        Ok(Artifact::new(output, CONTENT_TYPE_MP3, "converted.mp3", ws))
    }

    // ═══════════════════════════════════════════════════════════════
    // SHARED STEPS
    // ═══════════════════════════════════════════════════════════════

    async fn separate_and_archive(&self, job: &mut Job, ws: Workspace, input: &Path) -> CoreResult<Artifact> {
        job.advance(JobStatus::Processing);
        let inv = ToolInvocation::separate(
            &self.config.tools.separator,
            input,
            ws.output_dir(),
            &self.config.separation,
        );
        self.runner.run(&inv).await?;

        job.advance(JobStatus::Locating);
        let stem_dir = locate_stem_dir(ws.output_dir()).await?;

        job.advance(JobStatus::Archiving);
        let archive = build_archive(&stem_dir, &ws.file("stems.zip")).await?;
        tracing::info!(job_id = %job.id, entries = ?archive.entries, size_bytes = archive.size_bytes, "stems archived");

        Ok(Artifact::new(archive.path, CONTENT_TYPE_ZIP, "stems.zip", ws))
    }

    async fn acquire_slot(&self, job: &Job) -> CoreResult<SemaphorePermit<'_>> {
        if self.limiter.available_permits() == 0 {
            tracing::info!(job_id = %job.id, max = self.config.max_concurrent_jobs, "waiting for a worker slot");
        }
        self.limiter
            .acquire()
            .await
            .map_err(|_| CoreError::Io(std::io::Error::other("job limiter closed")))
    }
}

/// Record the job outcome; the result passes through unchanged
fn settle(job: &mut Job, res: CoreResult<Artifact>) -> CoreResult<Artifact> {
    match &res {
        Ok(_) => {
            job.advance(JobStatus::Responding);
            job.succeed();
        }
        Err(e) => job.fail(&e.to_string()),
    }
    res
}

async fn ensure_upload(input: &Path) -> CoreResult<()> {
    match tokio::fs::metadata(input).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(CoreError::Validation("uploaded file is empty".into())),
        Err(_) => Err(CoreError::Validation("uploaded file is missing".into())),
    }
}

async fn ensure_produced(path: &Path) -> CoreResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(CoreError::OutputNotFound {
            path: path.to_path_buf(),
        }),
    }
}
