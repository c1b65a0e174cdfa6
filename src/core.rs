use std::io::Write;
use std::path::PathBuf;

use crate::CanonPath;
use crate::error::Error;
use crate::vfs::{DirEntries, Stat};

pub type Result<T> = std::result::Result<T, Error>;

/// Read-only, path-addressed view of a file, a directory tree or a symlink.
///
/// All operations take `&self` and are safe to call from several threads on one shared
/// instance, except that an instance created with modification-time tracking must be driven
/// from a single thread (see [`SourceAccessor::last_modified`]).
pub trait SourceAccessor: Send + Sync {
    /// Returns the status of `path` without following a trailing symlink.
    /// `Ok(None)` means "does not exist" and is never used to report a failure.
    fn maybe_lstat(&self, path: &CanonPath) -> Result<Option<Stat>>;

    /// Lists a directory. Entries `.` and `..` are never included.
    fn read_directory(&self, path: &CanonPath) -> Result<DirEntries>;

    /// Returns the target of the symlink at `path`.
    fn read_link(&self, path: &CanonPath) -> Result<String>;

    /// Streams the contents of the regular file at `path` into `sink`.
    ///
    /// `size_callback` is invoked once with the total size before any byte is written.
    fn read_file(
        &self,
        path: &CanonPath,
        sink: &mut dyn Write,
        size_callback: &mut dyn FnMut(u64),
    ) -> Result<()>;

    /// Returns where `path` would live on the host, if this accessor is backed by one.
    /// Best effort, never to be used for access decisions.
    fn physical_path(&self, path: &CanonPath) -> Option<PathBuf>;

    /// The highest modification time observed so far, only when tracking was requested at
    /// construction. Tracking is a plain high-water mark, not a CAS loop: it assumes a single
    /// thread drives the accessor.
    fn last_modified(&self) -> Option<i64>;

    /// Prefix put in front of paths by [`SourceAccessor::show_path`].
    fn display_prefix(&self) -> &str;

    /// Human-readable rendering of `path`. The root renders as the bare display prefix (no
    /// trailing separator), or `/` when the prefix is empty.
    fn show_path(&self, path: &CanonPath) -> String {
        let prefix = self.display_prefix();
        if path.is_root() && !prefix.is_empty() {
            return prefix.to_string();
        }
        format!("{}{}", prefix, path.abs())
    }

    /// Like [`SourceAccessor::maybe_lstat`], but absence is a [`Error::NotFound`].
    fn lstat(&self, path: &CanonPath) -> Result<Stat> {
        self.maybe_lstat(path)?
            .ok_or_else(|| Error::NotFound(self.show_path(path)))
    }

    fn path_exists(&self, path: &CanonPath) -> Result<bool> {
        Ok(self.maybe_lstat(path)?.is_some())
    }

    /// Reads a whole file into memory.
    fn read_to_vec(&self, path: &CanonPath) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        self.read_file(path, &mut content, &mut |_| {})?;
        Ok(content)
    }
}

pub(crate) mod utils {
    use std::io::Write;

    use crate::CanonPath;
    use crate::core::{Result, SourceAccessor};
    use crate::error::Error;

    /// Writes `data` to `sink`, naming `path` on failure.
    pub(crate) fn write_all<A: SourceAccessor + ?Sized>(
        accessor: &A,
        path: &CanonPath,
        sink: &mut dyn Write,
        data: &[u8],
    ) -> Result<()> {
        sink.write_all(data).map_err(|e| {
            Error::io(
                format!("writing contents of '{}'", accessor.show_path(path)),
                e,
            )
        })
    }
}
