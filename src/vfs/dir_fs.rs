//! This module provides the accessor over a real directory tree, anchored on one open directory
//! descriptor.
//!
//! ### Key Features:
//! - **Anchored root**: the root is opened once by the caller; it is never re-opened by name.
//! - **Safe resolution**: every path is walked component by component from the anchor with
//!   `O_DIRECTORY | O_NOFOLLOW`, so a symlink anywhere before the last component is refused with
//!   [`Error::SymlinkNotAllowed`] instead of being followed out of the tree.
//! - **Thread safety**: intermediate descriptors live for one call only, listings open a fresh
//!   directory stream per call and file contents are read with `pread`.

use std::io::Write;
use std::os::fd::{AsFd, OwnedFd};
use std::path::PathBuf;

use crate::core::{Result, SourceAccessor};
use crate::error::Error;
use crate::sys::{self, OpenError};
use crate::vfs::base::MtimeTracker;
use crate::vfs::{DirEntries, FileFS, FileKind, Stat};
use crate::{CanonPath, Options};

/// A read-only accessor over the directory tree below an open directory descriptor.
///
/// `DirFS` exclusively owns its anchor descriptor and closes it on drop. Only the last component
/// of a path is ever looked up by name with an operation that may observe a symlink: `lstat`
/// reports it as a symlink and `read_link` reads it, nothing else dereferences it.
///
/// ### Usage notes:
/// - `DirFS` follows no symlinks at all; paths through one fail with `SymlinkNotAllowed`.
/// - Construction cannot fail; errors surface on the first access that needs the entry.
/// - Thread-safe, unless modification-time tracking is enabled (single thread only).
///
/// ### Example:
/// ```no_run
/// use fd_accessor::{CanonPath, SourceAccessor, make_fs_accessor};
///
/// let fs = make_fs_accessor(Some("/srv/tree".as_ref()), false);
/// let content = fs.read_to_vec(&CanonPath::new("/docs/note.txt").unwrap()).unwrap();
/// for (name, kind) in fs.read_directory(&CanonPath::root()).unwrap() {
///     println!("{name}: {kind:?}");
/// }
/// ```
pub struct DirFS {
    fd: OwnedFd,
    root: CanonPath, // host-related absolute path
    display_prefix: String,
    tracker: MtimeTracker,
    options: Options,
}

impl DirFS {
    /// Creates an accessor anchored at `fd`, which must be an open directory.
    /// * `root` is the host path `fd` was opened from, used for display and `physical_path`.
    pub fn new(fd: OwnedFd, root: CanonPath, options: &Options) -> Self {
        Self {
            fd,
            display_prefix: root.abs().to_string(),
            root,
            tracker: MtimeTracker::new(options.is_tracking_last_modified()),
            options: options.clone(),
        }
    }

    /// Returns root path related to the host file system.
    pub fn root(&self) -> &CanonPath {
        &self.root
    }

    pub(crate) fn set_display_prefix<S: Into<String>>(&mut self, prefix: S) {
        self.display_prefix = prefix.into();
    }

    fn symlink_error(&self, path: &CanonPath, symlink: CanonPath) -> Error {
        log::debug!(
            "refusing '{}': component '{}' is a symlink",
            self.show_path(path),
            self.show_path(&symlink)
        );
        Error::SymlinkNotAllowed {
            path: self.show_path(path),
            symlink_display: self.show_path(&symlink),
            symlink,
        }
    }
}

/// ENOENT, or ENOTDIR from a non-directory in the middle of the path.
fn is_absent(errno: Option<i32>) -> bool {
    matches!(errno, Some(libc::ENOENT) | Some(libc::ENOTDIR))
}

impl SourceAccessor for DirFS {
    /// Returns the status of `path`. The root is stat'ed through the anchor itself; any other
    /// path is stat'ed by name in its safely opened parent, without following a trailing
    /// symlink.
    fn maybe_lstat(&self, path: &CanonPath) -> Result<Option<Stat>> {
        let st = match path.base_name() {
            None => sys::fstat(self.fd.as_fd())
                .map_err(|e| Error::io(format!("statting '{}'", self.show_path(path)), e))?,
            Some(name) => {
                let parent = match sys::open_parent(self.fd.as_fd(), path) {
                    Ok(parent) => parent,
                    Err(OpenError::Symlink(at)) => return Err(self.symlink_error(path, at)),
                    Err(err) if is_absent(err.errno()) => return Ok(None),
                    Err(OpenError::Os(e)) => {
                        return Err(Error::io(
                            format!("opening parent directory of '{}'", self.show_path(path)),
                            e,
                        ));
                    }
                };
                match sys::fstat_at(parent.as_fd(), name) {
                    Ok(st) => st,
                    Err(e) if is_absent(e.raw_os_error()) => return Ok(None),
                    Err(e) => {
                        return Err(Error::io(format!("statting '{}'", self.show_path(path)), e));
                    }
                }
            }
        };

        let stat = Stat::from_raw(&st);
        if let Some(mtime) = stat.mtime {
            self.tracker.update(mtime);
        }
        Ok(Some(stat))
    }

    /// Lists the directory at `path` through a freshly opened stream, including for the root:
    /// the anchor is never iterated itself. Entry kinds come from `d_type` and stay `None` when
    /// the filesystem does not fill it in.
    fn read_directory(&self, path: &CanonPath) -> Result<DirEntries> {
        let fd = match sys::open_beneath(self.fd.as_fd(), path, sys::DIR_FLAGS) {
            Ok(fd) => fd,
            Err(OpenError::Symlink(at)) => return Err(self.symlink_error(path, at)),
            Err(OpenError::Os(e)) => {
                return Err(match e.raw_os_error() {
                    // a symlink as the last component is not a directory
                    Some(libc::ENOTDIR) | Some(libc::ELOOP) => {
                        Error::NotADirectory(self.show_path(path))
                    }
                    Some(libc::ENOENT) => Error::NotFound(self.show_path(path)),
                    _ => Error::io(format!("opening directory '{}'", self.show_path(path)), e),
                });
            }
        };
        let dir = sys::Dir::from_fd(fd)
            .map_err(|e| Error::io(format!("opening directory '{}'", self.show_path(path)), e))?;

        let mut entries = DirEntries::new();
        for entry in dir {
            self.options.interrupt_token().check(&self.show_path(path))?;
            let entry = entry.map_err(|e| {
                Error::io(format!("reading directory '{}'", self.show_path(path)), e)
            })?;
            if entry.name == b"." || entry.name == b".." {
                continue;
            }
            // a lossy name could collide with another entry and would not resolve
            let name = String::from_utf8(entry.name)
                .map_err(|_| Error::NonUtf8Name(self.show_path(path)))?;
            entries.insert(name, FileKind::from_dirent_type(entry.d_type));
        }
        Ok(entries)
    }

    fn read_link(&self, path: &CanonPath) -> Result<String> {
        let Some(name) = path.base_name() else {
            return Err(Error::NotASymlink(self.show_path(path)));
        };
        let parent = match sys::open_parent(self.fd.as_fd(), path) {
            Ok(parent) => parent,
            Err(OpenError::Symlink(at)) => return Err(self.symlink_error(path, at)),
            Err(err) if is_absent(err.errno()) => {
                return Err(Error::NotFound(self.show_path(path)));
            }
            Err(OpenError::Os(e)) => {
                return Err(Error::io(
                    format!("opening parent directory of '{}'", self.show_path(path)),
                    e,
                ));
            }
        };
        let target =
            sys::read_link_at(parent.as_fd(), name).map_err(|e| match e.raw_os_error() {
                Some(libc::EINVAL) => Error::NotASymlink(self.show_path(path)),
                errno if is_absent(errno) => Error::NotFound(self.show_path(path)),
                _ => Error::io(format!("reading symlink '{}'", self.show_path(path)), e),
            })?;
        String::from_utf8(target).map_err(|_| Error::NonUtf8Name(self.show_path(path)))
    }

    /// Opens `path` read-only beneath the anchor and streams it through a [`FileFS`] scoped to
    /// this call. The root and anything that is not a regular file fail with
    /// [`Error::NotARegularFile`].
    fn read_file(
        &self,
        path: &CanonPath,
        sink: &mut dyn Write,
        size_callback: &mut dyn FnMut(u64),
    ) -> Result<()> {
        if path.is_root() {
            return Err(Error::NotARegularFile {
                path: self.show_path(path),
                is_symlink: false,
            });
        }

        // O_NONBLOCK keeps a fifo from blocking the open; FileFS then rejects it by type
        let flags = libc::O_RDONLY | libc::O_NONBLOCK;
        let fd = match sys::open_beneath(self.fd.as_fd(), path, flags) {
            Ok(fd) => fd,
            Err(OpenError::Symlink(at)) => return Err(self.symlink_error(path, at)),
            Err(OpenError::Os(e)) => {
                return Err(match e.raw_os_error() {
                    // the last component is a symlink
                    Some(libc::ELOOP) => Error::NotARegularFile {
                        path: self.show_path(path),
                        is_symlink: true,
                    },
                    errno if is_absent(errno) => Error::NotFound(self.show_path(path)),
                    _ => Error::io(format!("opening '{}'", self.show_path(path)), e),
                });
            }
        };

        let file = FileFS::new(fd, self.root.concat(path), &self.options);
        file.read_file(&CanonPath::root(), sink, size_callback)?;

        if let Some(mtime) = file.last_modified() {
            self.tracker.update(mtime);
        }
        Ok(())
    }

    /// Returns where `path` would be on the host, whether or not it exists.
    fn physical_path(&self, path: &CanonPath) -> Option<PathBuf> {
        Some(PathBuf::from(self.root.concat(path).abs()))
    }

    fn last_modified(&self) -> Option<i64> {
        self.tracker.get()
    }

    fn display_prefix(&self) -> &str {
        &self.display_prefix
    }
}
