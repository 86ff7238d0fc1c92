use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::time;
use uuid::Uuid;

use crate::error::Error;

/// attempts before a workspace allocation failure stops being transient
const ATTEMPTS: usize = 3;

/// hands out per-submission scratch directories under one temp root
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// create the directory for one submission, wiping anything a crashed
    /// earlier run may have left behind under the same id
    pub async fn acquire(&self, id: Uuid) -> Result<Workspace, Error> {
        fs::create_dir_all(&self.root).await?;
        let path = self.root.join(id.to_string());

        let mut attempt = 0;
        loop {
            attempt += 1;
            let _ = fs::remove_dir_all(&path).await;
            match fs::create_dir(&path).await {
                Ok(_) => {
                    log::trace!("workspace {} ready", path.display());
                    return Ok(Workspace {
                        path,
                        released: false,
                    });
                }
                Err(err) if attempt < ATTEMPTS => {
                    log::warn!(
                        "fail creating workspace {} (attempt {}): {}",
                        path.display(),
                        attempt,
                        err
                    );
                    time::sleep(Duration::from_millis(50)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// scoped scratch directory, removal is guaranteed on every exit path
///
/// call [`release`](Workspace::release) on the happy path; `Drop` covers
/// panics and cancelled tasks by spawning the removal
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// absolute path of a file inside the workspace
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// write a file into the workspace
    pub async fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf, Error> {
        let path = self.file(name);
        fs::write(&path, content).await?;
        Ok(path)
    }

    /// remove the directory and everything under it
    ///
    /// removal errors are logged, never returned, cleanup failure must not
    /// mask a judging result
    pub async fn release(mut self) {
        self.released = true;
        if let Err(err) = fs::remove_dir_all(&self.path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::warn!("fail removing workspace {}: {}", self.path.display(), err);
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            let path = std::mem::take(&mut self.path);
            log::trace!("cleaning up workspace {}", path.display());
            tokio::spawn(async move { fs::remove_dir_all(path).await });
        }
    }
}
