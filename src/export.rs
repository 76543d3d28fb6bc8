use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Outcome of reconciling one exported binary symlink.
///
/// The export directory is flat and shared across every environment, so a
/// conflicting object is reported and left exactly as found; relinking would
/// silently steal the name from whatever owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    /// Link did not exist and was created
    Created,
    /// Link already points at this binary
    AlreadyLinked,
    /// Link exists but points somewhere else (current target attached)
    LinkedElsewhere(PathBuf),
    /// Path is occupied by a regular file or directory
    NotASymlink,
}

impl ExportStatus {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ExportStatus::LinkedElsewhere(_) | ExportStatus::NotASymlink
        )
    }
}

/// Reconcile `export_dir/name` against the binary in `bin_dir`.
///
/// The source binary must exist. An absent link is created; a correct link
/// is left alone; anything else is classified and reported without touching
/// the filesystem.
pub fn export_binary(bin_dir: &Path, name: &str, export_dir: &Path) -> Result<ExportStatus> {
    let bin_path = bin_dir.join(name);
    if !bin_path.exists() {
        return Err(Error::MissingBinary {
            name: name.to_string(),
            path: bin_path,
        });
    }

    let link_path = export_dir.join(name);
    let link_meta = fs::symlink_metadata(&link_path);

    let Ok(metadata) = link_meta else {
        fs::create_dir_all(export_dir)?;
        std::os::unix::fs::symlink(&bin_path, &link_path)?;
        return Ok(ExportStatus::Created);
    };

    if !metadata.file_type().is_symlink() {
        return Ok(ExportStatus::NotASymlink);
    }

    let wanted = fs::canonicalize(&bin_path)?;
    match fs::canonicalize(&link_path) {
        Ok(actual) if actual == wanted => Ok(ExportStatus::AlreadyLinked),
        Ok(actual) => Ok(ExportStatus::LinkedElsewhere(actual)),
        // dangling link: report wherever it nominally points
        Err(_) => {
            let nominal = fs::read_link(&link_path)?;
            Ok(ExportStatus::LinkedElsewhere(nominal))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        bin_dir: PathBuf,
        export_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let bin_dir = temp.path().join("env/bin");
        let export_dir = temp.path().join("local/bin");
        fs::create_dir_all(&bin_dir).unwrap();
        fs::create_dir_all(&export_dir).unwrap();
        Fixture {
            _temp: temp,
            bin_dir,
            export_dir,
        }
    }

    #[test]
    fn test_creates_then_reports_already_linked() {
        let fx = fixture();
        fs::write(fx.bin_dir.join("tool"), "#!/bin/sh\n").unwrap();

        let first = export_binary(&fx.bin_dir, "tool", &fx.export_dir).unwrap();
        assert_eq!(first, ExportStatus::Created);

        let link = fx.export_dir.join("tool");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());

        let second = export_binary(&fx.bin_dir, "tool", &fx.export_dir).unwrap();
        assert_eq!(second, ExportStatus::AlreadyLinked);
    }

    #[test]
    fn test_missing_binary_mutates_nothing() {
        let fx = fixture();

        let result = export_binary(&fx.bin_dir, "ghost", &fx.export_dir);
        assert!(matches!(result, Err(Error::MissingBinary { .. })));
        assert!(!fx.export_dir.join("ghost").exists());
    }

    #[test]
    fn test_link_to_other_target_is_reported_untouched() {
        let fx = fixture();
        fs::write(fx.bin_dir.join("tool"), "").unwrap();

        let other = fx.export_dir.join("other-binary");
        fs::write(&other, "").unwrap();
        let link = fx.export_dir.join("tool");
        symlink(&other, &link).unwrap();

        let status = export_binary(&fx.bin_dir, "tool", &fx.export_dir).unwrap();
        let ExportStatus::LinkedElsewhere(target) = status else {
            panic!("expected LinkedElsewhere, got {status:?}");
        };
        assert_eq!(target, fs::canonicalize(&other).unwrap());

        // the link still points where it pointed before the call
        assert_eq!(fs::read_link(&link).unwrap(), other);
    }

    #[test]
    fn test_regular_file_is_reported_untouched() {
        let fx = fixture();
        fs::write(fx.bin_dir.join("tool"), "").unwrap();

        let occupied = fx.export_dir.join("tool");
        fs::write(&occupied, "precious user data").unwrap();

        let status = export_binary(&fx.bin_dir, "tool", &fx.export_dir).unwrap();
        assert_eq!(status, ExportStatus::NotASymlink);
        assert_eq!(fs::read_to_string(&occupied).unwrap(), "precious user data");
    }

    #[test]
    fn test_dangling_link_is_a_conflict() {
        let fx = fixture();
        fs::write(fx.bin_dir.join("tool"), "").unwrap();

        let gone = fx.export_dir.join("removed-binary");
        let link = fx.export_dir.join("tool");
        symlink(&gone, &link).unwrap();

        let status = export_binary(&fx.bin_dir, "tool", &fx.export_dir).unwrap();
        assert_eq!(status, ExportStatus::LinkedElsewhere(gone));
    }

    #[test]
    fn test_creates_export_dir_when_absent() {
        let fx = fixture();
        fs::write(fx.bin_dir.join("tool"), "").unwrap();
        let fresh = fx.export_dir.join("nested");

        let status = export_binary(&fx.bin_dir, "tool", &fresh).unwrap();
        assert_eq!(status, ExportStatus::Created);
        assert!(fresh.join("tool").exists());
    }
}
