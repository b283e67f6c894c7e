use std::path::Path;

use crate::TransferError;

/// Validates an absolute remote destination path such as `/backups/db.tar`.
///
/// Rejects:
/// - Empty paths and paths not starting with `/`
/// - The root folder itself and trailing slashes
/// - Empty segments (`//`)
/// - `.` and `..` segments
/// - Control characters
pub fn validate_destination_path(path: &str) -> Result<(), TransferError> {
    if path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    let Some(rest) = path.strip_prefix('/') else {
        return Err(TransferError::InvalidPath(format!(
            "remote path must start with '/': {path}"
        )));
    };

    if rest.is_empty() {
        return Err(TransferError::InvalidPath(
            "remote path must name a file, not the root folder".into(),
        ));
    }

    if rest.ends_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "remote path must not end with '/': {path}"
        )));
    }

    for segment in rest.split('/') {
        match segment {
            "" => {
                return Err(TransferError::InvalidPath(format!(
                    "empty path segment: {path}"
                )));
            }
            "." | ".." => {
                return Err(TransferError::InvalidPath(format!(
                    "relative segment not allowed: {path}"
                )));
            }
            s if s.chars().any(char::is_control) => {
                return Err(TransferError::InvalidPath(format!(
                    "control character in path: {path:?}"
                )));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Resolves the remote path for `source`.
///
/// A destination ending in `/` names a folder and gets the source's file
/// name appended; anything else is used as-is. The result is validated.
pub fn resolve_destination(destination: &str, source: &Path) -> Result<String, TransferError> {
    let resolved = if destination.ends_with('/') {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TransferError::InvalidPath(format!(
                    "source has no usable file name: {}",
                    source.display()
                ))
            })?;
        format!("{destination}{name}")
    } else {
        destination.to_string()
    };

    validate_destination_path(&resolved)?;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_paths() {
        assert!(validate_destination_path("/a.bin").is_ok());
        assert!(validate_destination_path("/backups/2024/db.tar.gz").is_ok());
        assert!(validate_destination_path("/with space/and-dash_.txt").is_ok());
    }

    #[test]
    fn rejects_empty_path() {
        assert!(validate_destination_path("").is_err());
    }

    #[test]
    fn rejects_relative_path() {
        assert!(validate_destination_path("backups/db.tar").is_err());
    }

    #[test]
    fn rejects_root_and_trailing_slash() {
        assert!(validate_destination_path("/").is_err());
        assert!(validate_destination_path("/backups/").is_err());
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(validate_destination_path("/backups//db.tar").is_err());
    }

    #[test]
    fn rejects_dot_segments() {
        assert!(validate_destination_path("/backups/../etc/passwd").is_err());
        assert!(validate_destination_path("/./db.tar").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(validate_destination_path("/bad\nname").is_err());
    }

    #[test]
    fn error_variant() {
        let err = validate_destination_path("nope").unwrap_err();
        assert!(matches!(err, TransferError::InvalidPath(_)));
    }

    #[test]
    fn resolve_folder_appends_file_name() {
        let resolved = resolve_destination("/backups/", Path::new("/var/tmp/db.tar")).unwrap();
        assert_eq!(resolved, "/backups/db.tar");
    }

    #[test]
    fn resolve_file_path_kept() {
        let resolved = resolve_destination("/backups/latest.tar", Path::new("db.tar")).unwrap();
        assert_eq!(resolved, "/backups/latest.tar");
    }

    #[test]
    fn resolve_root_folder() {
        let resolved = resolve_destination("/", Path::new("notes.txt")).unwrap();
        assert_eq!(resolved, "/notes.txt");
    }

    #[test]
    fn resolve_validates_result() {
        assert!(resolve_destination("relative/", Path::new("a.txt")).is_err());
        assert!(resolve_destination("/x/", Path::new("/")).is_err());
    }
}
