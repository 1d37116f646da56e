//! Resolve the executable of the target process
//!
//! The user-function probe needs the on-disk binary of the target. An
//! unresolvable path is not an error: the probe is skipped instead.

use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Looks up process executables below a procfs mount
#[derive(Debug, Clone)]
pub struct TargetResolver {
    proc_root: PathBuf,
}

impl TargetResolver {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// Absolute executable path of `pid`, or `None` when it cannot be determined
    ///
    /// Tries the live `exe` link first, then falls back to the first
    /// `cmdline` argument when that argument is already absolute.
    pub fn resolve(&self, pid: u32) -> Option<PathBuf> {
        let proc_dir = self.proc_root.join(pid.to_string());

        match fs::read_link(proc_dir.join("exe")) {
            Ok(path) => return Some(path),
            Err(e) => debug!(pid, error = %e, "exe link unreadable, trying cmdline"),
        }

        let cmdline = match fs::read(proc_dir.join("cmdline")) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(pid, error = %e, "cmdline unreadable");
                return None;
            }
        };

        let argv0 = cmdline.split(|b| *b == 0).next()?;
        if argv0.is_empty() {
            return None;
        }

        let candidate = Path::new(OsStr::from_bytes(argv0));
        candidate.is_absolute().then(|| candidate.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn proc_tree(pid: u32) -> (TempDir, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        (root, dir)
    }

    #[cfg(unix)]
    #[test]
    fn prefers_exe_link() {
        let (root, dir) = proc_tree(10);
        std::os::unix::fs::symlink("/usr/bin/app", dir.join("exe")).unwrap();
        fs::write(dir.join("cmdline"), b"/opt/other\0--flag\0").unwrap();

        let resolver = TargetResolver::new(root.path());
        assert_eq!(resolver.resolve(10), Some(PathBuf::from("/usr/bin/app")));
    }

    #[test]
    fn falls_back_to_absolute_argv0() {
        let (root, dir) = proc_tree(11);
        fs::write(dir.join("cmdline"), b"/srv/app/bin/app\0-listen\0:8080\0").unwrap();

        let resolver = TargetResolver::new(root.path());
        assert_eq!(resolver.resolve(11), Some(PathBuf::from("/srv/app/bin/app")));
    }

    #[test]
    fn non_utf8_argv0_is_kept_verbatim() {
        let (root, dir) = proc_tree(14);
        fs::write(dir.join("cmdline"), b"/srv/b\xe9ta/app\0").unwrap();

        let resolved = TargetResolver::new(root.path()).resolve(14).unwrap();
        assert_eq!(resolved.as_os_str().as_bytes(), b"/srv/b\xe9ta/app");
    }

    #[test]
    fn relative_argv0_is_absent() {
        let (root, dir) = proc_tree(12);
        fs::write(dir.join("cmdline"), b"./app\0").unwrap();

        assert_eq!(TargetResolver::new(root.path()).resolve(12), None);
    }

    #[test]
    fn empty_cmdline_is_absent() {
        let (root, dir) = proc_tree(13);
        fs::write(dir.join("cmdline"), b"").unwrap();

        assert_eq!(TargetResolver::new(root.path()).resolve(13), None);
    }

    #[test]
    fn missing_process_is_absent() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(TargetResolver::new(root.path()).resolve(99), None);
    }
}
