//! Helpers shared by backends when copying to and from the local filesystem.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::Error;

/// One entry found below a local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// Path relative to the scanned root, `/`-separated.
    pub relative: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Everything below `root`, parents before children, sorted by name.
pub fn scan_local_dir(root: &Path) -> Result<Vec<LocalEntry>, Error> {
    let meta = fs::metadata(root).map_err(|e| Error::from_io(e, root.display()))?;
    if !meta.is_dir() {
        return Err(Error::InvalidPathShape {
            location: String::new(),
            path: root.display().to_string(),
            message: "not a directory".to_string(),
        });
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(LocalEntry {
            relative,
            path: entry.path().to_path_buf(),
            is_dir: entry.file_type().is_dir(),
        });
    }
    Ok(entries)
}

/// Fail with [`Error::AlreadyExists`] if `local` exists and `overwrite` is off.
pub fn check_local_target(local: &Path, overwrite: bool) -> Result<(), Error> {
    if !overwrite && local.exists() {
        return Err(already_exists_locally(local));
    }
    Ok(())
}

/// Fail on the first `relative` file below `root` that already exists locally.
///
/// Used before a directory export so that nothing is written on conflict.
pub fn check_local_conflicts<'a>(
    root: &Path,
    relatives: impl IntoIterator<Item = &'a str>,
    overwrite: bool,
) -> Result<(), Error> {
    if overwrite {
        return Ok(());
    }
    for relative in relatives {
        let target = root.join(relative);
        if target.is_file() {
            return Err(already_exists_locally(&target));
        }
    }
    Ok(())
}

/// Write `data` to `local`, creating missing parent directories.
pub fn write_local_file(local: &Path, data: &[u8]) -> Result<(), Error> {
    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent)?;
    }
    log::debug!("writing {} ({} bytes)", local.display(), data.len());
    fs::write(local, data).map_err(|e| Error::from_io(e, local.display()))
}

/// Recreate `entries` (from [`scan_local_dir`]) below `dest`.
pub fn copy_local_entries(entries: &[LocalEntry], dest: &Path) -> Result<(), Error> {
    fs::create_dir_all(dest)?;
    for entry in entries {
        let target = dest.join(&entry.relative);
        if entry.is_dir {
            fs::create_dir_all(&target)?;
        } else {
            log::debug!("copy {} -> {}", entry.path.display(), target.display());
            fs::copy(&entry.path, &target)?;
        }
    }
    Ok(())
}

pub fn read_local_file(local: &Path) -> Result<Vec<u8>, Error> {
    fs::read(local).map_err(|e| Error::from_io(e, local.display()))
}

fn already_exists_locally(path: &Path) -> Error {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path.parent().unwrap_or(Path::new("/")).display();
    Error::already_exists(name, parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scan_lists_parents_first() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("b/c")).unwrap();
        fs::write(tmp.path().join("a.txt"), b"a").unwrap();
        fs::write(tmp.path().join("b/c/d.txt"), b"d").unwrap();

        let entries = scan_local_dir(tmp.path()).unwrap();
        let relatives: Vec<_> = entries.iter().map(|e| e.relative.as_str()).collect();
        assert_eq!(relatives, vec!["a.txt", "b", "b/c", "b/c/d.txt"]);
        assert!(entries[1].is_dir);
        assert!(!entries[3].is_dir);
    }

    #[test]
    fn copy_entries_recreates_tree() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("empty")).unwrap();
        fs::create_dir_all(src.path().join("x/y")).unwrap();
        fs::write(src.path().join("x/y/z.txt"), b"z").unwrap();

        let target = dst.path().join("out");
        copy_local_entries(&scan_local_dir(src.path()).unwrap(), &target).unwrap();
        assert!(target.join("empty").is_dir());
        assert_eq!(fs::read(target.join("x/y/z.txt")).unwrap(), b"z");
    }

    #[test]
    fn scan_missing_dir_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = scan_local_dir(&tmp.path().join("missing")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn scan_of_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            scan_local_dir(&file),
            Err(Error::InvalidPathShape { .. })
        ));
    }

    #[test]
    fn target_check_respects_overwrite() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f");
        check_local_target(&file, false).unwrap();
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            check_local_target(&file, false),
            Err(Error::AlreadyExists { ref name, .. }) if name == "f"
        ));
        check_local_target(&file, true).unwrap();
    }

    #[test]
    fn conflicts_ignore_directories() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/x"), b"x").unwrap();

        check_local_conflicts(tmp.path(), ["sub", "sub/y"], false).unwrap();
        assert!(check_local_conflicts(tmp.path(), ["sub/x"], false).is_err());
        check_local_conflicts(tmp.path(), ["sub/x"], true).unwrap();
    }

    #[test]
    fn write_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a/b/c.txt");
        write_local_file(&target, b"content").unwrap();
        assert_eq!(read_local_file(&target).unwrap(), b"content");
    }
}
