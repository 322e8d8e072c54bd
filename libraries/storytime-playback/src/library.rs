//! Audiobook directory listing
//!
//! The book is the sorted list of audio files in one directory. The list is
//! re-read on every call so files added or removed while running are seen.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Extensions treated as audio even when the MIME database says otherwise
const CORE_EXTENSIONS: &[&str] = &["m4b"];

/// One audiobook directory
#[derive(Debug, Clone)]
pub struct Library {
    directory: PathBuf,
    extensions: Vec<String>,
}

impl Library {
    /// Create a library for `directory` with extra audio extensions
    pub fn new(directory: impl Into<PathBuf>, extensions: &[String]) -> Self {
        let extensions = CORE_EXTENSIONS
            .iter()
            .map(|ext| (*ext).to_string())
            .chain(
                extensions
                    .iter()
                    .map(|ext| ext.trim_start_matches('.').to_lowercase()),
            )
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            directory: directory.into(),
            extensions,
        }
    }

    /// The audiobook directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Full path of a file in the book
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.directory.join(filename)
    }

    /// Audio files in the directory, sorted by name
    pub fn list_files(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list {}: {}", self.directory.display(), e);
                return Vec::new();
            }
        };

        let mut files: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| self.is_audio_file(name))
            .collect();

        files.sort();
        files
    }

    /// Whether `filename` counts as part of the book
    pub fn is_audio_file(&self, filename: &str) -> bool {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        if let Some(ext) = extension {
            if self.extensions.contains(&ext) {
                return true;
            }
        }

        mime_guess::from_path(filename)
            .first_raw()
            .is_some_and(|mime| mime.starts_with("audio/"))
    }

    /// File `delta` steps away from `current` in the sorted listing
    ///
    /// None when `current` is not in the directory or the target is out of range.
    pub fn adjacent(&self, current: &str, delta: i64) -> Option<String> {
        let files = self.list_files();
        let index = files.iter().position(|file| file == current)?;
        let target = i64::try_from(index).ok()?.checked_add(delta)?;
        let target = usize::try_from(target).ok()?;
        files.get(target).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn book(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            fs::write(dir.path().join(file), b"").unwrap();
        }
        dir
    }

    #[test]
    fn lists_audio_files_sorted() {
        let dir = book(&["02.mp3", "cover.jpg", "01.mp3", "notes.txt", "03.flac"]);
        fs::create_dir(dir.path().join("04.mp3")).unwrap();

        let library = Library::new(dir.path(), &[]);
        assert_eq!(library.list_files(), vec!["01.mp3", "02.mp3", "03.flac"]);
    }

    #[test]
    fn core_and_extra_extensions() {
        let dir = book(&["a.m4b", "b.xyz", "c.txt"]);
        let library = Library::new(dir.path(), &["xyz".to_string()]);
        assert_eq!(library.list_files(), vec!["a.m4b", "b.xyz"]);
    }

    #[test]
    fn adjacent_files() {
        let dir = book(&["01.mp3", "02.mp3", "03.mp3"]);
        let library = Library::new(dir.path(), &[]);

        assert_eq!(library.adjacent("02.mp3", 1).as_deref(), Some("03.mp3"));
        assert_eq!(library.adjacent("02.mp3", -1).as_deref(), Some("01.mp3"));
        assert_eq!(library.adjacent("01.mp3", -1), None);
        assert_eq!(library.adjacent("03.mp3", 1), None);
        assert_eq!(library.adjacent("missing.mp3", 1), None);
    }

    #[test]
    fn adjacent_sees_directory_changes() {
        let dir = book(&["01.mp3", "03.mp3"]);
        let library = Library::new(dir.path(), &[]);
        assert_eq!(library.adjacent("01.mp3", 1).as_deref(), Some("03.mp3"));

        fs::write(dir.path().join("02.mp3"), b"").unwrap();
        assert_eq!(library.adjacent("01.mp3", 1).as_deref(), Some("02.mp3"));
    }

    #[test]
    fn missing_directory_is_empty() {
        let library = Library::new("/nonexistent/storytime/book", &[]);
        assert!(library.list_files().is_empty());
    }
}
