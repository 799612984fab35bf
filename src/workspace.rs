//! Per-test working directory
//!
//! A [`Workspace`] is created fresh for every run (`<test dir>/<name>.dir`) and
//! torn down when the run ends, unless the retention policy keeps it. Dropping
//! an unfinished workspace counts as a failed run.

use std::path::{Path, PathBuf};

use crate::config::Retention;
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    retention: Retention,
    finished: bool,
}

impl Workspace {
    /// Create the directory, removing whatever a previous run left there.
    pub fn create(path: impl Into<PathBuf>, retention: Retention) -> Result<Self> {
        let path = path.into();
        teardown(&path)?;
        std::fs::create_dir_all(&path).map_err(|e| {
            Error::DevMalformed(format!("cannot create workspace {}: {}", path.display(), e))
        })?;
        Ok(Self {
            path,
            retention,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `contents` to `name` inside the workspace
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let target = self.path.join(name);
        std::fs::write(&target, contents).map_err(|e| {
            Error::DevMalformed(format!("cannot write {}: {}", target.display(), e))
        })?;
        Ok(target)
    }

    /// Read `name` from the workspace
    pub fn read(&self, name: &str) -> Result<String> {
        let target = self.path.join(name);
        std::fs::read_to_string(&target).map_err(|e| {
            Error::DevMalformed(format!("cannot read {}: {}", target.display(), e))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path.join(name).exists()
    }

    /// End the run. Returns the path when the workspace is kept.
    pub fn finish(mut self, passed: bool) -> Result<Option<PathBuf>> {
        self.finished = true;
        if self.retention.keeps(passed) {
            return Ok(Some(self.path.clone()));
        }
        teardown(&self.path)?;
        Ok(None)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.finished && !self.retention.keeps(false) {
            if let Err(e) = teardown(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "workspace teardown failed");
            }
        }
    }
}

/// Remove a workspace directory. Missing directories are fine.
pub fn teardown(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::DevMalformed(format!(
            "cannot remove workspace {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Relative path from `from` back to `to`.
///
/// Both are made absolute against the current directory first; the result
/// climbs out of `from` with `..` and descends into `to`.
pub fn relative_path(from: &Path, to: &Path) -> Result<PathBuf> {
    let from = std::path::absolute(from)?;
    let to = std::path::absolute(to)?;
    let from: Vec<_> = normalize(&from);
    let to: Vec<_> = normalize(&to);

    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for part in &to[common..] {
        relative.push(part);
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    Ok(relative)
}

fn normalize(path: &Path) -> Vec<std::ffi::OsString> {
    use std::path::Component;
    let mut parts: Vec<std::ffi::OsString> = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir => {}
            other => parts.push(other.as_os_str().to_owned()),
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_replaces_stale_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pair.dir");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("stale.txt"), "old").unwrap();

        let ws = Workspace::create(&path, Retention::Never).unwrap();
        assert!(!ws.contains("stale.txt"));
        ws.write("a.cpp", "int main(){}").unwrap();
        assert_eq!(ws.read("a.cpp").unwrap(), "int main(){}");
    }

    #[test]
    fn test_finish_tears_down_unless_retained() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dir");

        let ws = Workspace::create(&path, Retention::OnFailure).unwrap();
        assert_eq!(ws.finish(true).unwrap(), None);
        assert!(!path.exists());

        let ws = Workspace::create(&path, Retention::OnFailure).unwrap();
        assert_eq!(ws.finish(false).unwrap(), Some(path.clone()));
        assert!(path.exists());
    }

    #[test]
    fn test_drop_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dir");
        drop(Workspace::create(&path, Retention::Never).unwrap());
        assert!(!path.exists());

        drop(Workspace::create(&path, Retention::OnFailure).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.dir");
        teardown(&path).unwrap();
        teardown(&path).unwrap();
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/a/b/tests/t.dir"), Path::new("/a/b")).unwrap(),
            PathBuf::from("../..")
        );
        assert_eq!(
            relative_path(Path::new("/a/tests/t.dir"), Path::new("/a/lib/x")).unwrap(),
            PathBuf::from("../../lib/x")
        );
        assert_eq!(
            relative_path(Path::new("/a"), Path::new("/a/./")).unwrap(),
            PathBuf::from(".")
        );
    }
}
