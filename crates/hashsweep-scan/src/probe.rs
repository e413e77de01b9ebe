//! Eligibility checks for hashing.

use std::fs;
use std::path::Path;

use hashsweep_core::SkipReason;

use crate::mounts::ExcludedMounts;

/// Result of probing a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Regular file on a scannable mount.
    Eligible,
    /// Path is on an excluded mount.
    ExcludedMount,
    /// Symlink, directory, device, socket or FIFO.
    NotRegular,
    /// `lstat` failed (vanished, permission denied, ...).
    Unreadable,
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        self == Eligibility::Eligible
    }

    /// The skip reason a worker reports for an ineligible path.
    pub fn skip_reason(self) -> Option<SkipReason> {
        match self {
            Eligibility::Eligible => None,
            Eligibility::ExcludedMount => Some(SkipReason::ExcludedMount),
            Eligibility::NotRegular | Eligibility::Unreadable => Some(SkipReason::NotRegular),
        }
    }
}

/// Classify a path without following symlinks.
pub fn probe(path: &Path, excluded: &ExcludedMounts) -> Eligibility {
    if excluded.contains(path) {
        return Eligibility::ExcludedMount;
    }
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_file() => Eligibility::Eligible,
        Ok(_) => Eligibility::NotRegular,
        Err(_) => Eligibility::Unreadable,
    }
}

/// Check if `path` is a regular file outside every excluded mount.
pub fn is_eligible(path: &Path, excluded: &ExcludedMounts) -> bool {
    probe(path, excluded).is_eligible()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_regular_file_is_eligible() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, "hello").unwrap();

        assert_eq!(probe(&file, &ExcludedMounts::empty()), Eligibility::Eligible);
        assert!(is_eligible(&file, &ExcludedMounts::empty()));
    }

    #[test]
    fn test_empty_file_is_eligible() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("empty");
        fs::write(&file, "").unwrap();

        assert!(is_eligible(&file, &ExcludedMounts::empty()));
    }

    #[test]
    fn test_directory_is_not_eligible() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            probe(temp.path(), &ExcludedMounts::empty()),
            Eligibility::NotRegular
        );
    }

    #[test]
    fn test_missing_path_is_unreadable() {
        let temp = TempDir::new().unwrap();
        let gone = temp.path().join("gone");
        assert_eq!(probe(&gone, &ExcludedMounts::empty()), Eligibility::Unreadable);
        assert_eq!(
            Eligibility::Unreadable.skip_reason(),
            Some(SkipReason::NotRegular)
        );
    }

    #[test]
    fn test_excluded_mount_wins() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, "hello").unwrap();

        let excluded = ExcludedMounts::from_paths([temp.path()]);
        assert_eq!(probe(&file, &excluded), Eligibility::ExcludedMount);
        assert_eq!(
            Eligibility::ExcludedMount.skip_reason(),
            Some(SkipReason::ExcludedMount)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_never_eligible() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target.txt");
        fs::write(&target, "data").unwrap();

        let link = temp.path().join("link");
        symlink(&target, &link).unwrap();
        assert_eq!(probe(&link, &ExcludedMounts::empty()), Eligibility::NotRegular);

        let dangling = temp.path().join("dangling");
        symlink(temp.path().join("nowhere"), &dangling).unwrap();
        assert_eq!(
            probe(&dangling, &ExcludedMounts::empty()),
            Eligibility::NotRegular
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_socket_is_not_eligible() {
        use std::os::unix::net::UnixListener;

        let temp = TempDir::new().unwrap();
        let sock = temp.path().join("s.sock");
        let _listener = UnixListener::bind(&sock).unwrap();

        assert_eq!(probe(&sock, &ExcludedMounts::empty()), Eligibility::NotRegular);
    }
}
