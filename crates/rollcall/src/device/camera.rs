//! Camera backed by a directory of still frames.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rollcall_common::{Result, RollCallError};

use super::Camera;

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Plays back image files from a directory, in name order, one per capture.
/// Wraps around when it runs out.
pub struct DirectoryCamera {
    frames: Vec<PathBuf>,
    next: AtomicUsize,
    active: AtomicBool,
}

impl DirectoryCamera {
    /// Scan `dir` for frames; errors if there are none
    pub async fn open(dir: &Path) -> Result<Self> {
        let mut read_dir = tokio::fs::read_dir(dir).await.map_err(|e| {
            RollCallError::CaptureFailed(format!("Cannot open frame directory {}: {e}", dir.display()))
        })?;

        let mut frames = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| RollCallError::CaptureFailed(e.to_string()))?
        {
            let path = entry.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_frame {
                frames.push(path);
            }
        }

        if frames.is_empty() {
            return Err(RollCallError::CaptureFailed(format!(
                "No .jpg/.png frames in {}",
                dir.display()
            )));
        }

        frames.sort();
        tracing::debug!(count = frames.len(), dir = %dir.display(), "Camera frames loaded");

        Ok(Self {
            frames,
            next: AtomicUsize::new(0),
            active: AtomicBool::new(false),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Camera for DirectoryCamera {
    async fn capture(&self) -> Result<Vec<u8>> {
        self.active.store(true, Ordering::Relaxed);
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.frames.len();
        let path = &self.frames[index];

        tracing::debug!(frame = %path.display(), "Capturing still");

        tokio::fs::read(path)
            .await
            .map_err(|e| RollCallError::CaptureFailed(format!("{}: {e}", path.display())))
    }

    async fn release(&self) {
        if self.active.swap(false, Ordering::Relaxed) {
            tracing::debug!("Camera released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cycles_frames_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"second").unwrap();
        std::fs::write(dir.path().join("a.png"), b"first").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();

        let camera = DirectoryCamera::open(dir.path()).await.unwrap();
        assert_eq!(camera.frame_count(), 2);

        assert_eq!(camera.capture().await.unwrap(), b"first");
        assert!(camera.is_active());
        assert_eq!(camera.capture().await.unwrap(), b"second");
        assert_eq!(camera.capture().await.unwrap(), b"first");

        camera.release().await;
        assert!(!camera.is_active());
    }

    #[tokio::test]
    async fn empty_directory_is_a_capture_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryCamera::open(dir.path()).await.err().unwrap();
        assert!(matches!(err, RollCallError::CaptureFailed(_)));
    }
}
