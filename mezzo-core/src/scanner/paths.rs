//! Path predicates shared by the scan steps

use std::path::{Component, Path, PathBuf};

/// A directory containing this file (and all its descendants) is skipped by
/// the scanner
pub const IGNORE_FILE_NAME: &str = ".lmsignore";

/// Lexically normalize a path: resolve `.` and `..` without touching the
/// filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Whether `path` lies under `root`, after lexical normalization
pub fn is_path_in_root(path: &Path, root: &Path) -> bool {
    normalize(path).starts_with(normalize(root))
}

/// Whether any directory between `root` (inclusive) and `path`'s parent
/// carries the ignore marker
pub fn is_path_ignored(path: &Path, root: &Path) -> bool {
    let normalized_root = normalize(root);
    let mut directory = normalize(path);
    directory.pop();

    loop {
        if directory.join(IGNORE_FILE_NAME).exists() {
            return true;
        }
        if directory == normalized_root || !directory.pop() {
            return false;
        }
    }
}

/// Whether the file's extension (lowercased, without the dot) is in the set
pub fn has_extension_in(path: &Path, extensions: &[String]) -> bool {
    match path.extension() {
        Some(extension) => {
            let extension = extension.to_string_lossy().to_lowercase();
            extensions.iter().any(|e| *e == extension)
        }
        None => false,
    }
}

/// File stem, lowercased, for cover-name preference matching
pub fn lowercase_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_path_in_root() {
        assert!(is_path_in_root(Path::new("/m/a/b.flac"), Path::new("/m")));
        assert!(is_path_in_root(
            Path::new("/m/a/../a/b.flac"),
            Path::new("/m")
        ));
        assert!(!is_path_in_root(Path::new("/other/b.flac"), Path::new("/m")));
        assert!(!is_path_in_root(Path::new("/m/../x/b.flac"), Path::new("/m")));
    }

    #[test]
    fn test_has_extension_in() {
        let extensions = vec!["flac".to_string(), "mp3".to_string()];
        assert!(has_extension_in(Path::new("/m/a.FLAC"), &extensions));
        assert!(has_extension_in(Path::new("/m/a.mp3"), &extensions));
        assert!(!has_extension_in(Path::new("/m/a.wav"), &extensions));
        assert!(!has_extension_in(Path::new("/m/noext"), &extensions));
    }

    #[test]
    fn test_is_path_ignored() {
        let root = tempfile::tempdir().unwrap();
        let sub = root.path().join("x");
        std::fs::create_dir(&sub).unwrap();
        let file = sub.join("t.flac");
        std::fs::write(&file, b"").unwrap();

        assert!(!is_path_ignored(&file, root.path()));

        std::fs::write(sub.join(IGNORE_FILE_NAME), b"").unwrap();
        assert!(is_path_ignored(&file, root.path()));

        // A marker at the root ignores everything beneath it
        std::fs::remove_file(sub.join(IGNORE_FILE_NAME)).unwrap();
        std::fs::write(root.path().join(IGNORE_FILE_NAME), b"").unwrap();
        assert!(is_path_ignored(&file, root.path()));
    }

    #[test]
    fn test_lowercase_stem() {
        assert_eq!(
            lowercase_stem(Path::new("/m/Cover.JPG")),
            Some("cover".to_string())
        );
        assert_eq!(lowercase_stem(Path::new("/")), None);
    }
}
