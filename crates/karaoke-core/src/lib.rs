//! Karaokeify Core: Job Pipeline
//!
//! Orchestrates external tools for two user-facing jobs:
//! - Pitch shift an uploaded track by whole semitones (transcoder)
//! - Split a track, uploaded or fetched from a video URL, into vocal/instrumental stems
//!   (downloader + separation model runner)
//!
//! No signal processing happens in this crate. It owns the job around the tools: workspace
//! lifecycle, argument construction, output discovery and archiving.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Pipeline                             │
//! │                                                               │
//! │  ┌───────────┐   ┌────────────┐   ┌─────────┐   ┌──────────┐  │
//! │  │ Workspace │ → │ ToolRunner │ → │ Locator │ → │ Archive  │  │
//! │  │ (per job) │   │ (argv only)│   │         │   │ (zip, 9) │  │
//! │  └───────────┘   └────────────┘   └─────────┘   └──────────┘  │
//! │                                                               │
//! │  Semaphore: at most `jobs.max_concurrent` jobs run tools      │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use karaoke_core::{JobKind, KaraokeConfig, Pipeline, ProcessRunner};
//!
//! let config = Arc::new(KaraokeConfig::load(None)?);
//! let pipeline = Pipeline::new(config.clone(), Arc::new(ProcessRunner::from_config(&config)));
//!
//! let (mut job, ws) = pipeline.open_job(JobKind::SeparateUrl).await?;
//! let artifact = pipeline.separate_url(&mut job, ws, "https://youtu.be/...").await?;
//! // stream artifact.path, then drop the artifact to remove the workspace
//! ```

mod archive;
mod config;
mod error;
mod input;
mod job;
mod locator;
mod pipeline;
mod pitch;
mod tool;
mod workspace;

pub use archive::*;
pub use config::*;
pub use error::*;
pub use input::*;
pub use job::*;
pub use locator::*;
pub use pipeline::*;
pub use pitch::*;
pub use tool::*;
pub use workspace::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
