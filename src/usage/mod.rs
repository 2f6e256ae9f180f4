//! Usage locations: where a credential was read from.
//!
//! A location is the working directory of the process that read the
//! credential. If that directory sits inside a git work tree, the root
//! of the work tree is recorded with it.

use std::path::{Path, PathBuf};

/// Walk up from `location` to the nearest directory containing `.git`.
///
/// `.git` may be a directory (normal clone) or a file (worktree or
/// submodule); both count.
pub fn find_git_repo(location: &Path) -> Option<PathBuf> {
    location
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Normalized location key: absolute and canonical when possible.
pub fn location_key(location: &Path) -> String {
    location
        .canonicalize()
        .unwrap_or_else(|_| location.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_repo_root_from_nested_dir() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();
        let nested = tmp.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_git_repo(&nested), Some(tmp.path().to_path_buf()));
    }

    #[test]
    fn git_file_counts_as_repo() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".git"), "gitdir: ../elsewhere").unwrap();
        assert_eq!(find_git_repo(tmp.path()), Some(tmp.path().to_path_buf()));
    }

    #[test]
    fn location_key_canonicalizes() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a");
        fs::create_dir(&dir).unwrap();
        let dotted = dir.join("..").join("a");
        assert_eq!(location_key(&dotted), location_key(&dir));
    }
}
