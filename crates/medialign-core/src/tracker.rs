use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// One destructive step taken during a run: the original path and the backup
/// holding its pre-run content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub original: PathBuf,
    pub backup: PathBuf,
}

/// Records (original, backup) pairs for every destructive step of a run, and
/// can roll all of them back or clean the backups up after full success.
///
/// Append-only within a run; the first backup registered for an original is
/// the true pre-run state, so later registrations for the same original are
/// no-ops.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    changes: Vec<Change>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backup for `original` unless one is already tracked.
    pub fn record_backup(&mut self, original: &Path, backup: &Path) {
        if self.changes.iter().any(|c| c.original == original) {
            return;
        }
        self.changes.push(Change {
            original: original.to_path_buf(),
            backup: backup.to_path_buf(),
        });
    }

    /// The tracked backup for `original`, if any.
    pub fn backup_for(&self, original: &Path) -> Option<&Path> {
        self.changes
            .iter()
            .find(|c| c.original == original)
            .map(|c| c.backup.as_path())
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Restore every tracked original from its backup, in insertion order.
    ///
    /// Restoring is a rename/replace, never a copy, so a crash mid-restore
    /// cannot leave a half-written original. Individual failures are logged
    /// and skipped; the rest of the list is still attempted.
    pub fn revert_all(&self) {
        info!("reverting all changes from this run");
        for c in &self.changes {
            if !c.backup.exists() {
                continue;
            }
            match std::fs::rename(&c.backup, &c.original) {
                Ok(()) => info!(path = %c.original.display(), "restored"),
                Err(e) => {
                    warn!(path = %c.original.display(), error = %e, "failed to restore");
                }
            }
        }
    }

    /// Delete every tracked backup. With `keep` true this is a no-op.
    ///
    /// Only call this once every targeted file in the run has completed
    /// successfully; a backup is the sole recovery point for its original.
    pub fn cleanup_backups(&self, keep: bool) {
        if keep {
            info!("keeping backups as requested");
            return;
        }
        for c in &self.changes {
            if c.backup.exists() {
                if let Err(e) = std::fs::remove_file(&c.backup) {
                    warn!(backup = %c.backup.display(), error = %e, "failed to delete backup");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_first_backup_wins() {
        let mut t = ChangeTracker::new();
        t.record_backup(Path::new("/m/a.mkv"), Path::new("/m/a.mkv.bak.1"));
        t.record_backup(Path::new("/m/a.mkv"), Path::new("/m/a.mkv.bak.2"));
        assert_eq!(t.changes().len(), 1);
        assert_eq!(
            t.backup_for(Path::new("/m/a.mkv")),
            Some(Path::new("/m/a.mkv.bak.1"))
        );
    }

    #[test]
    fn test_revert_all_restores_content() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("file.mkv");
        let backup = dir.path().join("file.mkv.bak");
        fs::write(&original, b"mutated").unwrap();
        fs::write(&backup, b"pristine").unwrap();

        let mut t = ChangeTracker::new();
        t.record_backup(&original, &backup);
        t.revert_all();

        assert_eq!(fs::read(&original).unwrap(), b"pristine");
        assert!(!backup.exists());
    }

    #[test]
    fn test_revert_continues_past_missing_backups() {
        let dir = tempdir().unwrap();
        let gone_original = dir.path().join("gone.mkv");
        let ok_original = dir.path().join("ok.mkv");
        let ok_backup = dir.path().join("ok.mkv.bak");
        fs::write(&ok_original, b"mutated").unwrap();
        fs::write(&ok_backup, b"pristine").unwrap();

        let mut t = ChangeTracker::new();
        t.record_backup(&gone_original, &dir.path().join("never-existed.bak"));
        t.record_backup(&ok_original, &ok_backup);
        t.revert_all();

        assert_eq!(fs::read(&ok_original).unwrap(), b"pristine");
    }

    #[test]
    fn test_cleanup_after_revert_spares_restored_files() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("file.mkv");
        let backup = dir.path().join("file.mkv.bak");
        fs::write(&original, b"mutated").unwrap();
        fs::write(&backup, b"pristine").unwrap();

        let mut t = ChangeTracker::new();
        t.record_backup(&original, &backup);
        t.revert_all();
        t.cleanup_backups(false);

        // the restore consumed the backup path; cleanup must not touch the
        // file that now lives at the original path
        assert!(original.exists());
        assert_eq!(fs::read(&original).unwrap(), b"pristine");
    }

    #[test]
    fn test_cleanup_keep_flag() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("file.mkv");
        let backup = dir.path().join("file.mkv.bak");
        fs::write(&original, b"new").unwrap();
        fs::write(&backup, b"old").unwrap();

        let mut t = ChangeTracker::new();
        t.record_backup(&original, &backup);

        t.cleanup_backups(true);
        assert!(backup.exists());

        t.cleanup_backups(false);
        assert!(!backup.exists());
    }
}
