//! Capability-scoped filesystem helpers for Firewatch artefacts.
//!
//! The CLI keeps its SQLite cache at a user-supplied UTF-8 path. These
//! helpers prepare and inspect that location through `cap-std` so every
//! operation is rooted in an explicitly opened directory.
#![forbid(unsafe_code)]

use std::{io, path::Component};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

/// What currently occupies a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Nothing exists there yet.
    Missing,
    /// A regular file.
    File,
    /// A directory or another non-file entry.
    Other,
}

/// Create every missing ancestor directory of `path`.
///
/// Paths without a parent, or whose parent is the filesystem root, need
/// no work.
///
/// # Errors
///
/// Returns any I/O error raised while opening the anchor directory or
/// creating the ancestors.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() {
        return Ok(());
    }
    let (anchor, relative) = split_anchor(parent)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    anchor.create_dir_all(&relative)
}

/// Classify what exists at `path` without following it into a directory.
///
/// # Errors
///
/// Returns an I/O error when the parent directory cannot be opened for a
/// reason other than not existing.
pub fn path_kind(path: &Utf8Path) -> io::Result<PathKind> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("{path} does not name a file")))?;
    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(PathKind::Missing),
        Err(err) => return Err(err),
    };
    match dir.metadata(name) {
        Ok(meta) if meta.is_file() => Ok(PathKind::File),
        Ok(_) => Ok(PathKind::Other),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(PathKind::Missing),
        Err(err) => Err(err),
    }
}

/// Split `dir` into an ambient anchor (root, drive prefix, or current
/// directory) and the remainder relative to it.
fn split_anchor(dir: &Utf8Path) -> io::Result<(Dir, Utf8PathBuf)> {
    let std_dir = dir.as_std_path();
    let (anchor, relative) = match std_dir.components().next() {
        Some(Component::Prefix(prefix)) => {
            let text = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            let anchor = Utf8PathBuf::from(text).join(std::path::MAIN_SEPARATOR.to_string());
            let rest = std_dir
                .strip_prefix(anchor.as_std_path())
                .or_else(|_| std_dir.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other(format!("cannot strip prefix from {dir}")))?
                .to_path_buf();
            (anchor, rest)
        }
        Some(Component::RootDir) => {
            let anchor = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let rest = std_dir
                .strip_prefix(anchor.as_std_path())
                .map_err(|_| io::Error::other(format!("cannot strip root from {dir}")))?
                .to_path_buf();
            (anchor, rest)
        }
        _ => (Utf8PathBuf::from("."), std_dir.to_path_buf()),
    };
    let handle = Dir::open_ambient_dir(&anchor, ambient_authority())?;
    let rest = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| io::Error::other("non-UTF-8 directory path"))?;
    Ok((handle, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn root() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        (dir, path)
    }

    #[rstest]
    fn creates_nested_parents(root: (TempDir, Utf8PathBuf)) {
        let (_guard, base) = root;
        let target = base.join("a").join("b").join("cache.sqlite");

        ensure_parent_dir(&target).expect("create parents");

        assert!(base.join("a").join("b").is_dir());
        assert_eq!(path_kind(&target).expect("inspect"), PathKind::Missing);
    }

    #[rstest]
    fn existing_parents_are_fine(root: (TempDir, Utf8PathBuf)) {
        let (_guard, base) = root;
        let target = base.join("cache.sqlite");
        ensure_parent_dir(&target).expect("first");
        ensure_parent_dir(&target).expect("second");
    }

    #[rstest]
    fn bare_file_names_need_nothing() {
        ensure_parent_dir(Utf8Path::new("cache.sqlite")).expect("no parent");
    }

    #[rstest]
    fn classifies_files_and_directories(root: (TempDir, Utf8PathBuf)) {
        let (_guard, base) = root;
        let file = base.join("cache.sqlite");
        std::fs::write(&file, b"sqlite").expect("write");

        assert_eq!(path_kind(&file).expect("file"), PathKind::File);
        assert_eq!(path_kind(&base).expect("dir"), PathKind::Other);
        assert_eq!(
            path_kind(&base.join("absent").join("x.db")).expect("missing parent"),
            PathKind::Missing
        );
    }
}
