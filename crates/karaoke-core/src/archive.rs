//! ZIP archives of tool output

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{CoreError, CoreResult};

/// A finished archive on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveResult {
    pub path: PathBuf,
    /// Entry names in archive order
    pub entries: Vec<String>,
    pub size_bytes: u64,
}

/// Zip every regular file directly under `source_dir` into `zip_path`.
///
/// Entries carry bare file names; subdirectories are not descended into. Returns once the
/// central directory is written and the file is synced to disk.
pub async fn build_archive(source_dir: &Path, zip_path: &Path) -> CoreResult<ArchiveResult> {
    let source_dir = source_dir.to_path_buf();
    let zip_path = zip_path.to_path_buf();

    tokio::task::spawn_blocking(move || write_archive(&source_dir, &zip_path))
        .await
        .map_err(|e| CoreError::Archive(format!("archive task failed: {e}")))?
}

fn write_archive(source_dir: &Path, zip_path: &Path) -> CoreResult<ArchiveResult> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(source_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        files.push((name, entry.path()));
    }
    files.sort();

    if files.is_empty() {
        return Err(CoreError::OutputNotFound {
            path: source_dir.to_path_buf(),
        });
    }

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    let file = File::create(zip_path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    for (name, path) in &files {
        zip.start_file(name.as_str(), options)
            .map_err(|e| CoreError::Archive(format!("start {name}: {e}")))?;
        let mut src = File::open(path)?;
        io::copy(&mut src, &mut zip)?;
    }

    let writer = zip
        .finish()
        .map_err(|e| CoreError::Archive(format!("finish {}: {e}", zip_path.display())))?;
    let file = writer
        .into_inner()
        .map_err(|e| CoreError::Archive(format!("flush {}: {e}", zip_path.display())))?;
    file.sync_all()?;

    let size_bytes = file.metadata()?.len();
    tracing::debug!(path = %zip_path.display(), entries = files.len(), size_bytes, "archive written");

    Ok(ArchiveResult {
        path: zip_path.to_path_buf(),
        entries: files.into_iter().map(|(name, _)| name).collect(),
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_flattens_directory_without_prefix() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("htdemucs_6s").join("track1");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("vocals.mp3"), vec![1u8; 2048]).unwrap();
        fs::write(src.join("no_vocals.mp3"), vec![2u8; 2048]).unwrap();

        let zip_path = tmp.path().join("stems.zip");
        let result = build_archive(&src, &zip_path).await.unwrap();

        assert_eq!(result.entries, vec!["no_vocals.mp3", "vocals.mp3"]);
        assert_eq!(entry_names(&zip_path), vec!["no_vocals.mp3", "vocals.mp3"]);
        assert_eq!(result.size_bytes, fs::metadata(&zip_path).unwrap().len());
    }

    #[tokio::test]
    async fn test_contents_survive_and_are_deflated() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("stems");
        fs::create_dir_all(&src).unwrap();
        let payload = b"la la la ".repeat(1000);
        fs::write(src.join("vocals.mp3"), &payload).unwrap();

        let zip_path = tmp.path().join("stems.zip");
        build_archive(&src, &zip_path).await.unwrap();

        let mut archive = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut entry = archive.by_name("vocals.mp3").unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        let mut out = Vec::new();
        entry.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[tokio::test]
    async fn test_subdirectories_are_not_included() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("stems");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested").join("deep.mp3"), b"d").unwrap();
        fs::write(src.join("vocals.mp3"), b"v").unwrap();

        let zip_path = tmp.path().join("stems.zip");
        build_archive(&src, &zip_path).await.unwrap();
        assert_eq!(entry_names(&zip_path), vec!["vocals.mp3"]);
    }

    #[tokio::test]
    async fn test_empty_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("empty");
        fs::create_dir_all(&src).unwrap();
        let err = build_archive(&src, &tmp.path().join("stems.zip")).await.unwrap_err();
        assert!(matches!(err, CoreError::OutputNotFound { .. }));
    }
}
