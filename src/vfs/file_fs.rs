//! An accessor presenting one open regular file as a filesystem whose only entry is the root.

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use once_cell::sync::OnceCell;

use crate::core::{Result, SourceAccessor, utils};
use crate::error::Error;
use crate::sys;
use crate::vfs::base::MtimeTracker;
use crate::vfs::{DirEntries, Stat};
use crate::{CanonPath, Interrupt, Options};

const CHUNK_SIZE: usize = 64 * 1024;

/// Wraps a descriptor known to refer to a regular file.
///
/// ### Usage notes:
/// - Every path other than the root is absent.
/// - The file is stat'ed at most once per instance; concurrent first callers wait for a single
///   `fstat` and all observe the same record.
/// - Contents are read with `pread`, so concurrent readers never share a file cursor.
pub struct FileFS {
    file: File,
    root: CanonPath, // host-related absolute path
    display_prefix: String,
    stat: OnceCell<Stat>,
    tracker: MtimeTracker,
    interrupt: Interrupt,
}

impl FileFS {
    /// Creates an accessor over `fd`, which must be open for reading.
    /// * `root` is the host path the descriptor was opened from; it is used for display and
    ///   `physical_path` only, never re-opened.
    pub fn new(fd: OwnedFd, root: CanonPath, options: &Options) -> Self {
        Self {
            file: File::from(fd),
            display_prefix: root.abs().to_string(),
            root,
            stat: OnceCell::new(),
            tracker: MtimeTracker::new(options.is_tracking_last_modified()),
            interrupt: options.interrupt_token().clone(),
        }
    }

    /// Like [`FileFS::new`], pre-seeded with a status the caller already obtained for `fd`.
    pub fn with_stat(fd: OwnedFd, root: CanonPath, options: &Options, stat: Stat) -> Self {
        let fs = Self::new(fd, root, options);
        if let Some(mtime) = stat.mtime {
            fs.tracker.update(mtime);
        }
        let _ = fs.stat.set(stat);
        fs
    }

    fn cached_stat(&self) -> Result<&Stat> {
        self.stat.get_or_try_init(|| {
            let st = sys::fstat(self.file.as_fd())
                .map_err(|e| Error::io(format!("statting file '{}'", self.display_prefix), e))?;
            let stat = Stat::from_raw(&st);
            if let Some(mtime) = stat.mtime {
                self.tracker.update(mtime);
            }
            Ok(stat)
        })
    }
}

impl SourceAccessor for FileFS {
    fn maybe_lstat(&self, path: &CanonPath) -> Result<Option<Stat>> {
        if !path.is_root() {
            return Ok(None);
        }
        Ok(Some(self.cached_stat()?.clone()))
    }

    fn read_directory(&self, path: &CanonPath) -> Result<DirEntries> {
        Err(Error::NotADirectory(self.show_path(path)))
    }

    fn read_link(&self, path: &CanonPath) -> Result<String> {
        Err(Error::NotASymlink(self.show_path(path)))
    }

    /// Reads the whole file in 64 KiB positioned reads, polling the interrupt token between
    /// chunks. Hitting end-of-file before the size reported by `fstat` is an error.
    fn read_file(
        &self,
        path: &CanonPath,
        sink: &mut dyn Write,
        size_callback: &mut dyn FnMut(u64),
    ) -> Result<()> {
        if !path.is_root() {
            return Err(Error::NotFound(self.show_path(path)));
        }

        let stat = self.cached_stat()?;
        let Some(size) = stat.file_size else {
            return Err(Error::NotARegularFile {
                path: self.show_path(path),
                is_symlink: stat.is_symlink(),
            });
        };
        size_callback(size);

        let mut left = size;
        let mut offset = 0u64;
        let mut buf = vec![0u8; CHUNK_SIZE.min(usize::try_from(size).unwrap_or(usize::MAX))];
        while left > 0 {
            self.interrupt.check(&self.show_path(path))?;
            let want = buf.len().min(usize::try_from(left).unwrap_or(usize::MAX));
            match self.file.read_at(&mut buf[..want], offset) {
                Ok(0) => return Err(Error::UnexpectedEof(self.show_path(path))),
                Ok(n) => {
                    utils::write_all(self, path, sink, &buf[..n])?;
                    left -= n as u64;
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(Error::io(
                        format!("reading from file '{}'", self.show_path(path)),
                        e,
                    ));
                }
            }
        }
        Ok(())
    }

    fn path_exists(&self, path: &CanonPath) -> Result<bool> {
        Ok(path.is_root())
    }

    fn physical_path(&self, path: &CanonPath) -> Option<PathBuf> {
        path.is_root().then(|| PathBuf::from(self.root.abs()))
    }

    fn last_modified(&self) -> Option<i64> {
        self.tracker.get()
    }

    fn display_prefix(&self) -> &str {
        &self.display_prefix
    }
}
