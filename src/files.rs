use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::warn;
use uuid::Uuid;

use crate::platform::Messenger;

/// A file on local disk that is removed when dropped.
#[derive(Debug)]
pub struct SavedFile {
    path: PathBuf,
}

impl SavedFile {
    /// Take ownership of `path`; the file need not exist yet.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SavedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

/// Local path for a downloaded attachment. Unique per call, so overlapping
/// requests for the same file never share a path.
pub fn saved_image_path(dir: &Path, file_id: &str) -> PathBuf {
    let safe: String = file_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("saved_image_{}_{}.png", safe, Uuid::new_v4().simple()))
}

/// Download an attachment into `dir`. The returned guard owns the file even
/// when the download fails part way.
pub async fn fetch_attachment(
    messenger: &dyn Messenger,
    file_id: &str,
    dir: &Path,
) -> (SavedFile, Result<()>) {
    let saved = SavedFile::new(saved_image_path(dir, file_id));
    let result = messenger.download(file_id, saved.path()).await;
    (saved, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_image_path_sanitizes() {
        let path = saved_image_path(Path::new("/tmp/dl"), "AgAC../x:y-Z_1");
        assert_eq!(path.parent(), Some(Path::new("/tmp/dl")));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("saved_image_AgAC___x_y-Z_1_"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_saved_image_path_unique_per_call() {
        let dir = Path::new("/tmp/dl");
        assert_ne!(saved_image_path(dir, "same"), saved_image_path(dir, "same"));
    }

    #[test]
    fn test_saved_file_removed_on_drop() {
        let path = std::env::temp_dir().join(format!("snapnote-test-{}.png", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"data").unwrap();
        {
            let saved = SavedFile::new(path.clone());
            assert!(saved.path().exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_file_drop_is_quiet() {
        let path = std::env::temp_dir().join(format!("snapnote-missing-{}.png", uuid::Uuid::new_v4()));
        drop(SavedFile::new(path.clone()));
        assert!(!path.exists());
    }
}
