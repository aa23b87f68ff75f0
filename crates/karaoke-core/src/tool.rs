//! External tool invocation
//!
//! Every tool call is an explicit argument vector handed to the OS. Nothing goes through a
//! shell, and user-supplied URLs sit behind a `--` terminator so the downloader never reads
//! them as options.

use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::{KaraokeConfig, SeparationConfig};
use crate::error::{CoreError, CoreResult};
use crate::pitch::PitchShift;

/// Stderr kept in errors and logs
const STDERR_TAIL_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Media transcoder (ffmpeg)
    Transcoder,
    /// URL-based media downloader (yt-dlp)
    Downloader,
    /// Source-separation model runner (demucs)
    Separator,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Transcoder => "transcoder",
            ToolKind::Downloader => "downloader",
            ToolKind::Separator => "separator",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════
// INVOCATION
// ═══════════════════════════════════════════════════════════════

/// One fully resolved subprocess call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool: ToolKind,
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl ToolInvocation {
    pub fn new(tool: ToolKind, program: impl Into<OsString>) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Value following `flag`, if present
    pub fn flag_value(&self, flag: &str) -> Option<&OsStr> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|a| a.as_os_str())
    }

    pub fn last_arg(&self) -> Option<&OsStr> {
        self.args.last().map(|a| a.as_os_str())
    }

    /// Printable command line for logs
    pub fn display(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for a in &self.args {
            line.push(' ');
            line.push_str(&a.to_string_lossy());
        }
        line
    }

    // ───────────────────────────────────────────────────────────
    // Transcoder
    // ───────────────────────────────────────────────────────────

    /// Resample by `r`, restore the nominal rate, then stretch tempo by `1/r`.
    /// Pitch moves, duration stays.
    pub fn transcode_pitch(program: &str, input: &Path, output: &Path, shift: &PitchShift) -> Self {
        Self::new(ToolKind::Transcoder, program)
            .args(["-hide_banner", "-nostdin", "-y", "-i"])
            .arg(input)
            .arg("-af")
            .arg(shift.filter_graph())
            .args(["-acodec", "libmp3lame"])
            .arg(output)
    }

    /// Drop the video stream and encode the audio as mp3
    pub fn transcode_to_mp3(program: &str, input: &Path, output: &Path) -> Self {
        Self::new(ToolKind::Transcoder, program)
            .args(["-hide_banner", "-nostdin", "-y", "-i"])
            .arg(input)
            .args(["-vn", "-acodec", "libmp3lame", "-q:a", "2"])
            .arg(output)
    }

    // ───────────────────────────────────────────────────────────
    // Downloader
    // ───────────────────────────────────────────────────────────

    /// Audio-only download to `<dir>/<stem>.%(ext)s`, converted to mp3
    pub fn download_audio(program: &str, url: &str, dir: &Path, stem: &str) -> Self {
        Self::new(ToolKind::Downloader, program)
            .args(["--no-playlist", "--extract-audio", "--audio-format", "mp3", "--output"])
            .arg(output_template(dir, stem))
            .arg("--")
            .arg(url)
    }

    /// Video download remuxed into mp4
    pub fn download_video(program: &str, url: &str, dir: &Path, stem: &str, format: &str) -> Self {
        Self::new(ToolKind::Downloader, program)
            .args(["--no-playlist", "-f", format, "--merge-output-format", "mp4", "--output"])
            .arg(output_template(dir, stem))
            .arg("--")
            .arg(url)
    }

    // ───────────────────────────────────────────────────────────
    // Separator
    // ───────────────────────────────────────────────────────────

    /// Results land in `<output_dir>/<model>/<input stem>/`
    pub fn separate(program: &str, input: &Path, output_dir: &Path, cfg: &SeparationConfig) -> Self {
        let mut inv = Self::new(ToolKind::Separator, program)
            .args(["-d", cfg.device.as_str(), "-n", cfg.model.as_str()])
            .arg(format!("--two-stems={}", cfg.two_stems));
        if cfg.mp3 {
            inv = inv.arg("--mp3");
        }
        inv.arg("--out").arg(output_dir).arg(input)
    }
}

fn output_template(dir: &Path, stem: &str) -> OsString {
    dir.join(format!("{stem}.%(ext)s")).into_os_string()
}

// ═══════════════════════════════════════════════════════════════
// RUNNER
// ═══════════════════════════════════════════════════════════════

/// Captured result of a successful run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs tool invocations. Non-zero exit is always an error; there are no retries.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> CoreResult<ToolOutput>;
}

/// Runs tools as child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn from_config(cfg: &KaraokeConfig) -> Self {
        Self::new(cfg.tools.timeout_secs.map(Duration::from_secs))
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> CoreResult<ToolOutput> {
        let tool = invocation.tool;
        tracing::info!(tool = %tool, command = %invocation.display(), "running external tool");

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CoreError::ToolSpawn { tool, source })?;

        let out = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(res) => res?,
                // The child future was dropped with the timeout; kill_on_drop reaps it
                Err(_) => {
                    return Err(CoreError::ToolTimeout {
                        tool,
                        timeout_secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        let output = ToolOutput {
            exit_code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        };
        tracing::debug!(tool = %tool, stdout = %tail(&output.stdout), stderr = %tail(&output.stderr), "tool output");

        if !out.status.success() {
            tracing::error!(tool = %tool, code = ?output.exit_code, "external tool failed");
            return Err(CoreError::ToolFailed {
                tool,
                code: output.exit_code,
                stderr: tail(&output.stderr).to_string(),
            });
        }

        Ok(output)
    }
}

/// Last `STDERR_TAIL_BYTES` of `s`, cut on a char boundary
pub fn tail(s: &str) -> &str {
    let s = s.trim_end();
    if s.len() <= STDERR_TAIL_BYTES {
        return s;
    }
    let mut start = s.len() - STDERR_TAIL_BYTES;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
