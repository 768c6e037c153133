// ABOUTME: Filesystem inspection and mutation behind the local provider's file operations
// ABOUTME: Maps metadata and I/O outcomes onto file status answers

use sourcebus_core::{FileStatusInfo, SourceControlFlags, SourceControlStatus};
use sourcebus_logging::warn;
use std::io;
use std::path::Path;

/// `(success, info)` as handed to a responder
pub(crate) type Outcome = (bool, FileStatusInfo);

fn answer(path: &Path, status: SourceControlStatus, flags: SourceControlFlags) -> Outcome {
    (
        status.is_success(),
        FileStatusInfo::with_status(path, status, flags),
    )
}

fn io_failure(path: &Path, operation: &str, err: &io::Error) -> Outcome {
    warn!(path = %path.display(), operation, error = %err, "Local filesystem operation failed");
    answer(path, SourceControlStatus::ProviderError, SourceControlFlags::empty())
}

fn writeable_flag(readonly: bool) -> SourceControlFlags {
    if readonly {
        SourceControlFlags::empty()
    } else {
        SourceControlFlags::WRITEABLE
    }
}

pub(crate) async fn inspect(path: &Path) -> Outcome {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => answer(
            path,
            SourceControlStatus::Tracked,
            writeable_flag(metadata.permissions().readonly()),
        ),
        Err(err) if err.kind() == io::ErrorKind::NotFound => answer(
            path,
            SourceControlStatus::NotTracked,
            SourceControlFlags::empty(),
        ),
        Err(err) => io_failure(path, "inspect", &err),
    }
}

pub(crate) async fn make_writable(path: &Path, allow_multi_checkout: bool) -> Outcome {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        // New files are editable
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return answer(
                path,
                SourceControlStatus::NotTracked,
                SourceControlFlags::WRITEABLE,
            );
        }
        Err(err) => return io_failure(path, "edit", &err),
    };

    let mut permissions = metadata.permissions();
    if permissions.readonly() {
        clear_readonly(&mut permissions);
        if let Err(err) = tokio::fs::set_permissions(path, permissions).await {
            return io_failure(path, "edit", &err);
        }
    }

    let mut flags = SourceControlFlags::WRITEABLE;
    if allow_multi_checkout {
        flags |= SourceControlFlags::MULTI_CHECK_OUT;
    }
    answer(path, SourceControlStatus::OpenByUser, flags)
}

#[cfg(unix)]
fn clear_readonly(permissions: &mut std::fs::Permissions) {
    use std::os::unix::fs::PermissionsExt;
    // Owner write only
    permissions.set_mode(permissions.mode() | 0o200);
}

#[cfg(not(unix))]
fn clear_readonly(permissions: &mut std::fs::Permissions) {
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
}

pub(crate) async fn remove(path: &Path) -> Outcome {
    match tokio::fs::remove_file(path).await {
        Ok(()) => answer(
            path,
            SourceControlStatus::NotTracked,
            SourceControlFlags::empty(),
        ),
        // Already gone is what the caller asked for
        Err(err) if err.kind() == io::ErrorKind::NotFound => answer(
            path,
            SourceControlStatus::NotTracked,
            SourceControlFlags::empty(),
        ),
        Err(err) => io_failure(path, "delete", &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn set_readonly(path: &Path) {
        let mut permissions = std::fs::metadata(path).unwrap().permissions();
        permissions.set_readonly(true);
        std::fs::set_permissions(path, permissions).unwrap();
    }

    #[tokio::test]
    async fn test_inspect_reports_writeable_and_read_only() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "hello").unwrap();

        let (success, info) = inspect(&file).await;
        assert!(success);
        assert_eq!(info.status, SourceControlStatus::Tracked);
        assert!(!info.is_read_only());

        set_readonly(&file);
        let (_, info) = inspect(&file).await;
        assert_eq!(info.status, SourceControlStatus::Tracked);
        assert!(info.is_read_only());
    }

    #[tokio::test]
    async fn test_inspect_missing_file() {
        let dir = tempdir().unwrap();
        let (success, info) = inspect(&dir.path().join("absent.txt")).await;
        assert!(success);
        assert_eq!(info.status, SourceControlStatus::NotTracked);
    }

    #[tokio::test]
    async fn test_make_writable_clears_read_only() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("locked.txt");
        std::fs::write(&file, "x").unwrap();
        set_readonly(&file);

        let (success, info) = make_writable(&file, true).await;
        assert!(success);
        assert_eq!(info.status, SourceControlStatus::OpenByUser);
        assert!(info.has_flag(SourceControlFlags::MULTI_CHECK_OUT));
        assert!(!std::fs::metadata(&file).unwrap().permissions().readonly());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("gone.txt");
        std::fs::write(&file, "x").unwrap();

        assert!(remove(&file).await.0);
        assert!(!file.exists());
        let (success, info) = remove(&file).await;
        assert!(success);
        assert_eq!(info.status, SourceControlStatus::NotTracked);
    }
}
