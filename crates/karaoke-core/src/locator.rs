//! Output discovery for tools that choose their own file layout
//!
//! The separator writes `<output root>/<model name>/<input basename>/<stem files>`. That nesting
//! belongs to the tool and may change between versions, so it is only interpreted here.
//!
//! Assumption: each level holds exactly one subdirectory. Zero is [`CoreError::OutputNotFound`],
//! more than one is [`CoreError::AmbiguousOutput`].

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Directory holding the separated stems
pub async fn locate_stem_dir(output_root: &Path) -> CoreResult<PathBuf> {
    let listing = list_dir(output_root).await?;
    let model_dir = single_subdir(output_root, listing.dirs)?
        .ok_or_else(|| not_found(output_root))?;

    let inner = list_dir(&model_dir).await?;
    if let Some(track_dir) = single_subdir(&model_dir, inner.dirs)? {
        return Ok(track_dir);
    }

    // One level deep: stems written straight into the model directory
    if !inner.files.is_empty() {
        return Ok(model_dir);
    }

    Err(not_found(&model_dir))
}

/// File the downloader produced as `<dir>/<stem>.<ext>`.
///
/// The downloader picks the final extension itself; partial and temporary fragments are skipped.
pub async fn locate_download(dir: &Path, stem: &str) -> CoreResult<PathBuf> {
    let prefix = format!("{stem}.");
    let listing = list_dir(dir).await?;

    listing
        .files
        .into_iter()
        .find(|path| {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            name.starts_with(&prefix) && !is_partial_download(&name)
        })
        .ok_or_else(|| not_found(dir))
}

fn is_partial_download(name: &str) -> bool {
    name.ends_with(".part") || name.ends_with(".ytdl") || name.contains(".part-Frag") || name.ends_with(".temp")
}

#[derive(Debug, Default)]
struct Listing {
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

/// Entries of `dir`, sorted by name
async fn list_dir(dir: &Path) -> CoreResult<Listing> {
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found(dir)),
        Err(e) => return Err(e.into()),
    };

    let mut listing = Listing::default();
    while let Some(entry) = rd.next_entry().await? {
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            listing.dirs.push(entry.path());
        } else if file_type.is_file() {
            listing.files.push(entry.path());
        }
    }
    listing.dirs.sort();
    listing.files.sort();
    Ok(listing)
}

fn single_subdir(parent: &Path, mut dirs: Vec<PathBuf>) -> CoreResult<Option<PathBuf>> {
    match dirs.len() {
        0 => Ok(None),
        1 => Ok(dirs.pop()),
        count => Err(CoreError::AmbiguousOutput {
            path: parent.to_path_buf(),
            count,
        }),
    }
}

fn not_found(path: &Path) -> CoreError {
    CoreError::OutputNotFound {
        path: path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_finds_two_level_nesting() {
        let tmp = TempDir::new().unwrap();
        let track = tmp.path().join("modelX").join("track1");
        fs::create_dir_all(&track).unwrap();
        fs::write(track.join("vocals.mp3"), b"v").unwrap();
        fs::write(track.join("no_vocals.mp3"), b"n").unwrap();

        assert_eq!(locate_stem_dir(tmp.path()).await.unwrap(), track);
    }

    #[tokio::test]
    async fn test_falls_back_to_one_level() {
        let tmp = TempDir::new().unwrap();
        let model = tmp.path().join("modelX");
        fs::create_dir_all(&model).unwrap();
        fs::write(model.join("vocals.mp3"), b"v").unwrap();

        assert_eq!(locate_stem_dir(tmp.path()).await.unwrap(), model);
    }

    #[tokio::test]
    async fn test_stray_files_at_root_are_ignored() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("log.txt"), b"x").unwrap();
        let track = tmp.path().join("htdemucs_6s").join("input");
        fs::create_dir_all(&track).unwrap();
        fs::write(track.join("vocals.mp3"), b"v").unwrap();

        assert_eq!(locate_stem_dir(tmp.path()).await.unwrap(), track);
    }

    #[tokio::test]
    async fn test_empty_root_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = locate_stem_dir(tmp.path()).await.unwrap_err();
        assert!(matches!(err, CoreError::OutputNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_model_dir_is_not_found() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("modelX")).unwrap();
        let err = locate_stem_dir(tmp.path()).await.unwrap_err();
        assert!(matches!(err, CoreError::OutputNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_root_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = locate_stem_dir(&tmp.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, CoreError::OutputNotFound { .. }));
    }

    #[tokio::test]
    async fn test_two_models_is_ambiguous() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a/track")).unwrap();
        fs::create_dir_all(tmp.path().join("b/track")).unwrap();
        let err = locate_stem_dir(tmp.path()).await.unwrap_err();
        assert!(matches!(err, CoreError::AmbiguousOutput { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_locate_download_skips_partials() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("input.webm.part"), b"p").unwrap();
        fs::write(tmp.path().join("input.mp3"), b"a").unwrap();
        fs::write(tmp.path().join("other.mp3"), b"o").unwrap();

        let found = locate_download(tmp.path(), "input").await.unwrap();
        assert_eq!(found, tmp.path().join("input.mp3"));
    }

    #[tokio::test]
    async fn test_locate_download_only_partials_is_not_found() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("input.mp3.part"), b"p").unwrap();
        assert!(matches!(
            locate_download(tmp.path(), "input").await,
            Err(CoreError::OutputNotFound { .. })
        ));
    }
}
