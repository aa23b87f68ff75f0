//! Per-job working directories
//!
//! A [`Workspace`] owns `<work_root>/karaoke_<job id>/` and its `output/` subdirectory. The tree
//! is removed exactly once: by [`Workspace::destroy`] or, failing that, when the guard drops.
//! Dropping covers every early return, error and cancelled request future.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::CoreResult;
use crate::job::JobId;

pub const WORKSPACE_PREFIX: &str = "karaoke_";
pub const OUTPUT_DIR_NAME: &str = "output";

#[derive(Debug)]
pub struct Workspace {
    id: JobId,
    root: PathBuf,
    output: PathBuf,
    destroyed: bool,
}

impl Workspace {
    /// Create the job directory and its output subdirectory.
    ///
    /// Fails if the directory already exists; a job never adopts another job's tree.
    pub async fn create(work_root: &Path, id: &JobId) -> CoreResult<Self> {
        tokio::fs::create_dir_all(work_root).await?;

        let root = work_root.join(format!("{WORKSPACE_PREFIX}{id}"));
        tokio::fs::create_dir(&root).await?;

        // From here on the guard cleans up, including a failed output dir
        let ws = Self {
            id: id.clone(),
            output: root.join(OUTPUT_DIR_NAME),
            root,
            destroyed: false,
        };
        tokio::fs::create_dir_all(&ws.output).await?;

        tracing::debug!(job_id = %ws.id, path = %ws.root.display(), "workspace created");
        Ok(ws)
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self) -> &Path {
        &self.output
    }

    /// Path of a file directly under the workspace root
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Remove the whole tree. Missing files are not an error.
    pub fn destroy(mut self) -> io::Result<()> {
        self.remove()
    }

    fn remove(&mut self) -> io::Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;

        match remove_tree(&self.root) {
            Ok(()) => {
                tracing::debug!(job_id = %self.id, path = %self.root.display(), "workspace removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Remove a directory tree without stalling the async worker that happens to drop the guard.
///
/// On a multi-thread runtime the removal runs under `block_in_place`, so the worker's other
/// tasks move elsewhere while a large stems tree is deleted. Removal stays synchronous: the
/// tree is gone when this returns.
fn remove_tree(path: &Path) -> io::Result<()> {
    let on_worker = tokio::runtime::Handle::try_current()
        .map(|h| h.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread)
        .unwrap_or(false);
    if on_worker {
        tokio::task::block_in_place(|| std::fs::remove_dir_all(path))
    } else {
        std::fs::remove_dir_all(path)
    }
}

/// Remove workspaces left behind by a previous run. Only call before serving jobs.
///
/// Every `karaoke_*` directory under `work_root` is treated as stale. This assumes a single
/// server instance per `work_root`; a second instance sharing the directory would lose its
/// live jobs. Give each instance its own `work_root`.
pub fn sweep_stale_workspaces(work_root: &Path) -> io::Result<usize> {
    let entries = match std::fs::read_dir(work_root) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let is_workspace = entry.file_name().to_string_lossy().starts_with(WORKSPACE_PREFIX);
        if is_workspace && entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            // Cleanup never changes the response already decided for the job
            tracing::error!(job_id = %self.id, path = %self.root.display(), error = %e, "workspace cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_makes_root_and_output() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::create(tmp.path(), &JobId::new()).await.unwrap();

        assert!(ws.path().is_dir());
        assert!(ws.output_dir().is_dir());
        assert!(ws.path().file_name().unwrap().to_string_lossy().starts_with(WORKSPACE_PREFIX));
        assert_eq!(ws.output_dir(), ws.path().join(OUTPUT_DIR_NAME));
    }

    #[tokio::test]
    async fn test_destroy_removes_tree() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::create(tmp.path(), &JobId::new()).await.unwrap();
        std::fs::create_dir_all(ws.output_dir().join("htdemucs_6s/input")).unwrap();
        std::fs::write(ws.file("input.mp3"), b"data").unwrap();

        let root = ws.path().to_path_buf();
        ws.destroy().unwrap();
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_drop_removes_tree() {
        let tmp = TempDir::new().unwrap();
        let root = {
            let ws = Workspace::create(tmp.path(), &JobId::new()).await.unwrap();
            ws.path().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_on_multi_thread_runtime_removes_tree() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::create(tmp.path(), &JobId::new()).await.unwrap();
        let stems = ws.output_dir().join("htdemucs_6s/input");
        std::fs::create_dir_all(&stems).unwrap();
        for i in 0..64 {
            std::fs::write(stems.join(format!("stem{i}.mp3")), vec![0u8; 1024]).unwrap();
        }

        let root = ws.path().to_path_buf();
        drop(ws);
        assert!(!root.exists());
    }

    #[test]
    fn test_drop_outside_runtime_removes_tree() {
        let tmp = TempDir::new().unwrap();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let ws = rt.block_on(Workspace::create(tmp.path(), &JobId::new())).unwrap();
        let root = ws.path().to_path_buf();
        drop(rt);

        drop(ws);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_destroy_tolerates_already_removed_tree() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::create(tmp.path(), &JobId::new()).await.unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();
        assert!(ws.destroy().is_ok());
    }

    #[test]
    fn test_sweep_removes_only_workspaces() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("karaoke_1-abc/output")).unwrap();
        std::fs::create_dir_all(tmp.path().join("karaoke_2-def")).unwrap();
        std::fs::create_dir_all(tmp.path().join("keep-me")).unwrap();
        std::fs::write(tmp.path().join("karaoke_notes.txt"), b"x").unwrap();

        assert_eq!(sweep_stale_workspaces(tmp.path()).unwrap(), 2);
        assert!(tmp.path().join("keep-me").exists());
        assert!(tmp.path().join("karaoke_notes.txt").exists());
        assert_eq!(sweep_stale_workspaces(&tmp.path().join("missing")).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_id_cannot_be_created_twice() {
        let tmp = TempDir::new().unwrap();
        let id = JobId::new();
        let _first = Workspace::create(tmp.path(), &id).await.unwrap();
        assert!(Workspace::create(tmp.path(), &id).await.is_err());
    }
}
