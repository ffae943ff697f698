//! Reference gallery enumeration.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery directory not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to list gallery {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Snapshot of the reference images under a directory.
///
/// Entries are regular files ordered by file name; names starting with `.`
/// are skipped. The snapshot may be empty.
#[derive(Debug, Clone)]
pub struct Gallery {
    dir: PathBuf,
    entries: Vec<PathBuf>,
}

impl Gallery {
    pub fn scan(dir: &Path) -> Result<Self, GalleryError> {
        if !dir.is_dir() {
            return Err(GalleryError::NotFound(dir.to_path_buf()));
        }

        let io_err = |source: std::io::Error| GalleryError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            let path = entry.path();
            if hidden || !path.is_file() {
                continue;
            }
            entries.push(path);
        }
        entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        tracing::debug!(dir = %dir.display(), count = entries.len(), "scanned gallery");

        Ok(Self {
            dir: dir.to_path_buf(),
            entries,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    fn names(gallery: &Gallery) -> Vec<String> {
        gallery
            .entries()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_entries_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.jpg", "a.jpg", "b10.jpg", "b2.jpg"] {
            touch(dir.path(), name);
        }

        let gallery = Gallery::scan(dir.path()).unwrap();
        assert_eq!(names(&gallery), vec!["a.jpg", "b10.jpg", "b2.jpg", "c.jpg"]);
        assert_eq!(gallery.len(), 4);
    }

    #[test]
    fn test_skips_hidden_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), ".gitkeep");
        touch(dir.path(), "face.jpg");
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested"), "inner.jpg");

        let gallery = Gallery::scan(dir.path()).unwrap();
        assert_eq!(names(&gallery), vec!["face.jpg"]);
    }

    #[test]
    fn test_empty_directory_scans_empty() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = Gallery::scan(dir.path()).unwrap();
        assert!(gallery.is_empty());
        assert_eq!(gallery.dir(), dir.path());
    }

    #[test]
    fn test_missing_directory() {
        let err = Gallery::scan(Path::new("/nonexistent/verification_images")).unwrap_err();
        assert!(matches!(err, GalleryError::NotFound(_)));
    }

    #[test]
    fn test_file_instead_of_directory() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "not_a_dir");
        let err = Gallery::scan(&dir.path().join("not_a_dir")).unwrap_err();
        assert!(matches!(err, GalleryError::NotFound(_)));
    }
}
