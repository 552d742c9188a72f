use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::media::MediaInput;

/// A directory owned by exactly one request.
///
/// The directory is removed by [`Scratch::close`] or, failing that, on drop.
/// Removal errors are logged and never returned to the caller.
#[derive(Debug)]
pub struct Scratch {
    id: Uuid,
    dir: PathBuf,
    removed: bool,
}

impl Scratch {
    /// Create `<root>/<uuid>`; `root` is created if missing.
    pub fn create(root: &Path, id: Uuid) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = root.join(id.to_string());
        std::fs::create_dir(&dir)?;
        log::debug!("request {}: scratch dir {}", id, dir.display());
        Ok(Self {
            id,
            dir,
            removed: false,
        })
    }

    /// Write an upload as `<role>.<ext>`; the client's file name is never used.
    pub async fn store(&self, media: &MediaInput) -> io::Result<PathBuf> {
        let path = self.dir.join(format!("{}.{}", media.role, media.extension));
        tokio::fs::write(&path, &media.contents).await?;
        Ok(path)
    }

    /// Remove the directory and everything in it.
    pub fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => log::debug!("request {}: removed {}", self.id, self.dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::error!(
                "request {}: error deleting {}: {}",
                self.id,
                self.dir.display(),
                e
            ),
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        self.remove();
    }
}
