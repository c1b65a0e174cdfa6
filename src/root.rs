//! Root selection: turns a host path into the accessor variant that fits what is found there.

use std::os::fd::AsFd;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::core::SourceAccessor;
use crate::sys;
use crate::vfs::{DirFS, FileFS, FileKind, MapFS, Stat};
use crate::{CanonPath, Options};

static ROOT_FS: Lazy<Arc<dyn SourceAccessor>> = Lazy::new(|| {
    match sys::open(Path::new("/"), libc::O_RDONLY | libc::O_DIRECTORY) {
        Ok(fd) => {
            let mut fs = DirFS::new(fd, CanonPath::root(), &Options::default());
            // render "/etc" rather than "//etc"
            fs.set_display_prefix("");
            Arc::new(fs)
        }
        Err(e) => {
            log::warn!("cannot open the filesystem root: {e}");
            Arc::new(MapFS::new())
        }
    }
});

/// Returns the process-wide accessor for the whole host filesystem.
///
/// It is created on first use and lives for the rest of the process. Modification-time
/// tracking is off, so it may be shared freely between threads.
pub fn fs_accessor() -> Arc<dyn SourceAccessor> {
    ROOT_FS.clone()
}

/// Creates an accessor for `root`, see [`make_fs_accessor_with`].
pub fn make_fs_accessor(root: Option<&Path>, track_last_modified: bool) -> Arc<dyn SourceAccessor> {
    make_fs_accessor_with(
        root,
        &Options::default().track_last_modified(track_last_modified),
    )
}

/// Creates an accessor for the absolute host path `root`.
///
/// * `None`, an empty path or `/` give the shared [`fs_accessor`].
/// * A directory gives a [`DirFS`], a regular file a [`FileFS`] seeded with the status already
///   obtained here.
/// * A symlink gives a [`MapFS`] whose root is a symlink with the same target; no descriptor is
///   ever opened through the link.
/// * Anything else, or a root that cannot be opened, gives an empty [`MapFS`].
///
/// Construction never fails: errors are reported when a path is actually accessed.
pub fn make_fs_accessor_with(root: Option<&Path>, options: &Options) -> Arc<dyn SourceAccessor> {
    let Some(root) = root.filter(|root| !root.as_os_str().is_empty()) else {
        return fs_accessor();
    };
    let Some(raw) = root.to_str().filter(|_| root.is_absolute()) else {
        log::debug!("'{}' is not an absolute UTF-8 path", root.display());
        return empty(&root.to_string_lossy());
    };
    let root_path = CanonPath::normalize(raw);
    if root_path.is_root() {
        return fs_accessor();
    }

    // O_NONBLOCK keeps a fifo root from blocking the open
    let flags = libc::O_RDONLY | libc::O_NOFOLLOW | libc::O_NONBLOCK;
    let fd = match sys::open(Path::new(root_path.abs()), flags) {
        Ok(fd) => fd,
        Err(e) if e.raw_os_error() == Some(libc::ELOOP) => {
            return symlink_root(&root_path, options);
        }
        Err(e) => {
            log::debug!("cannot open '{}': {}", root_path, e);
            return empty(root_path.abs());
        }
    };

    let stat = match sys::fstat(fd.as_fd()) {
        Ok(st) => Stat::from_raw(&st),
        Err(e) => {
            log::debug!("cannot stat '{}': {}", root_path, e);
            return empty(root_path.abs());
        }
    };
    match stat.kind {
        FileKind::Directory => Arc::new(DirFS::new(fd, root_path, options)),
        FileKind::Regular => Arc::new(FileFS::with_stat(fd, root_path, options, stat)),
        kind => {
            log::debug!("'{}' is a {:?}, using an empty accessor", root_path, kind);
            empty(root_path.abs())
        }
    }
}

fn empty(display: &str) -> Arc<dyn SourceAccessor> {
    let mut fs = MapFS::new();
    fs.set_display_prefix(display);
    Arc::new(fs)
}

/// Reads the link through its parent directory into an in-memory accessor.
fn symlink_root(root_path: &CanonPath, options: &Options) -> Arc<dyn SourceAccessor> {
    let (Some(parent), Some(name)) = (root_path.parent(), root_path.base_name()) else {
        return empty(root_path.abs());
    };
    let parent_fd = match sys::open(Path::new(parent.abs()), libc::O_RDONLY | libc::O_DIRECTORY) {
        Ok(fd) => fd,
        Err(e) => {
            log::debug!("cannot open parent of '{}': {}", root_path, e);
            return empty(root_path.abs());
        }
    };
    let read = sys::fstat_at(parent_fd.as_fd(), name)
        .and_then(|st| Ok((st, sys::read_link_at(parent_fd.as_fd(), name)?)));
    let (st, target) = match read {
        Ok(read) => read,
        Err(e) => {
            log::debug!("cannot read symlink '{}': {}", root_path, e);
            return empty(root_path.abs());
        }
    };
    let Ok(target) = String::from_utf8(target) else {
        log::debug!("symlink '{}' has a target that is not valid UTF-8", root_path);
        return empty(root_path.abs());
    };

    log::debug!("'{}' is a symlink to '{}'", root_path, target);
    let mut fs = MapFS::with_root_symlink(target);
    fs.set_display_prefix(root_path.abs());
    fs.set_last_modified(
        options
            .is_tracking_last_modified()
            .then_some(st.st_mtime as i64),
    );
    Arc::new(fs)
}
