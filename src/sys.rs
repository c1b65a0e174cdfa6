//! Thin wrappers over the descriptor-relative syscalls the accessors are built on.
//!
//! Every descriptor handed out here is an [`OwnedFd`] opened with `O_CLOEXEC`, so it is closed
//! exactly once when its owner is dropped. Calls that may block (`open`, `openat`, `fstat`,
//! `fstatat`, `readlinkat`) are retried on `EINTR`.

use std::ffi::{CStr, CString};
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr::NonNull;

use libc::c_int;

use crate::CanonPath;
use crate::vfs::FileKind;

pub(crate) const DIR_FLAGS: c_int = libc::O_RDONLY | libc::O_DIRECTORY | libc::O_NOFOLLOW;

/// An embedded NUL becomes `ENOENT`: no directory entry can be named that way.
fn to_cstring(bytes: &[u8]) -> io::Result<CString> {
    CString::new(bytes).map_err(|_| io::Error::from_raw_os_error(libc::ENOENT))
}

fn is_eintr(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINTR)
}

/// `open(2)` on a host path.
pub(crate) fn open(path: &Path, flags: c_int) -> io::Result<OwnedFd> {
    let path = to_cstring(path.as_os_str().as_bytes())?;
    loop {
        // SAFETY: `path` is a valid NUL-terminated string; the return value is checked.
        let fd = unsafe { libc::open(path.as_ptr(), flags | libc::O_CLOEXEC) };
        if fd >= 0 {
            // SAFETY: we just opened this fd and nothing else owns it.
            return Ok(unsafe { OwnedFd::from_raw_fd(fd) });
        }
        let err = io::Error::last_os_error();
        if !is_eintr(&err) {
            return Err(err);
        }
    }
}

/// `openat(2)` of a single entry `name` relative to `dir`.
pub(crate) fn open_at(dir: BorrowedFd<'_>, name: &str, flags: c_int) -> io::Result<OwnedFd> {
    let name = to_cstring(name.as_bytes())?;
    loop {
        // SAFETY: `dir` is a live descriptor, `name` is NUL-terminated; the return value is
        // checked.
        let fd = unsafe { libc::openat(dir.as_raw_fd(), name.as_ptr(), flags | libc::O_CLOEXEC) };
        if fd >= 0 {
            log::trace!("openat({}, {:?}) = {}", dir.as_raw_fd(), name, fd);
            // SAFETY: we just opened this fd and nothing else owns it.
            return Ok(unsafe { OwnedFd::from_raw_fd(fd) });
        }
        let err = io::Error::last_os_error();
        if !is_eintr(&err) {
            return Err(err);
        }
    }
}

/// `fstat(2)`.
pub(crate) fn fstat(fd: BorrowedFd<'_>) -> io::Result<libc::stat> {
    let mut st = MaybeUninit::<libc::stat>::zeroed();
    loop {
        // SAFETY: fstat writes into `st` and we check the return value.
        let ret = unsafe { libc::fstat(fd.as_raw_fd(), st.as_mut_ptr()) };
        if ret == 0 {
            break;
        }
        let err = io::Error::last_os_error();
        if !is_eintr(&err) {
            return Err(err);
        }
    }
    // SAFETY: fstat initialized the struct on success.
    Ok(unsafe { st.assume_init() })
}

/// `fstatat(2)` of `name` relative to `dir`, never following a trailing symlink.
pub(crate) fn fstat_at(dir: BorrowedFd<'_>, name: &str) -> io::Result<libc::stat> {
    let name = to_cstring(name.as_bytes())?;
    let mut st = MaybeUninit::<libc::stat>::zeroed();
    loop {
        // SAFETY: fstatat writes into `st` and we check the return value.
        let ret = unsafe {
            libc::fstatat(
                dir.as_raw_fd(),
                name.as_ptr(),
                st.as_mut_ptr(),
                libc::AT_SYMLINK_NOFOLLOW,
            )
        };
        if ret == 0 {
            break;
        }
        let err = io::Error::last_os_error();
        if !is_eintr(&err) {
            return Err(err);
        }
    }
    // SAFETY: fstatat initialized the struct on success.
    Ok(unsafe { st.assume_init() })
}

/// `readlinkat(2)` of `name` relative to `dir`, returning the raw target bytes. Fails with
/// `EINVAL` if `name` is not a symlink.
pub(crate) fn read_link_at(dir: BorrowedFd<'_>, name: &str) -> io::Result<Vec<u8>> {
    let name = to_cstring(name.as_bytes())?;
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    loop {
        // SAFETY: the kernel writes at most `buf.capacity()` bytes into the buffer.
        let n = unsafe {
            libc::readlinkat(
                dir.as_raw_fd(),
                name.as_ptr(),
                buf.as_mut_ptr().cast::<libc::c_char>(),
                buf.capacity(),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if is_eintr(&err) {
                continue;
            }
            return Err(err);
        }
        let n = n as usize;
        if n < buf.capacity() {
            // SAFETY: readlinkat initialized the first `n` bytes.
            unsafe { buf.set_len(n) };
            return Ok(buf);
        }
        // possibly truncated, retry with a bigger buffer
        buf.reserve(buf.capacity() * 2);
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "emscripten"))]
fn clear_errno() {
    // SAFETY: __errno_location returns a valid pointer to this thread's errno.
    unsafe { *libc::__errno_location() = 0 }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn clear_errno() {
    // SAFETY: __error returns a valid pointer to this thread's errno.
    unsafe { *libc::__error() = 0 }
}

/// One raw record from `readdir(3)`.
pub(crate) struct RawDirEntry {
    pub name: Vec<u8>,
    pub d_type: u8,
}

/// A directory stream owning its descriptor; `closedir(3)` on drop.
///
/// The stream carries a cursor, so it is only ever used by the call that opened it.
pub(crate) struct Dir {
    ptr: NonNull<libc::DIR>,
}

impl Dir {
    pub(crate) fn from_fd(fd: OwnedFd) -> io::Result<Dir> {
        // SAFETY: `fd` is a live directory descriptor; on success the stream takes it over.
        let ptr = unsafe { libc::fdopendir(fd.as_raw_fd()) };
        match NonNull::new(ptr) {
            Some(ptr) => {
                // ownership moved into the DIR stream
                let _ = fd.into_raw_fd();
                Ok(Dir { ptr })
            }
            None => Err(io::Error::last_os_error()),
        }
    }
}

impl Iterator for Dir {
    type Item = io::Result<RawDirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        clear_errno();
        // SAFETY: `ptr` is a valid open stream owned by `self`.
        let entry = unsafe { libc::readdir(self.ptr.as_ptr()) };
        if entry.is_null() {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                None | Some(0) => None,
                Some(_) => Some(Err(err)),
            };
        }
        // SAFETY: readdir returned a valid record that stays alive until the next call.
        let (name, d_type) = unsafe {
            let entry = &*entry;
            (
                CStr::from_ptr(entry.d_name.as_ptr()).to_bytes().to_vec(),
                entry.d_type,
            )
        };
        Some(Ok(RawDirEntry { name, d_type }))
    }
}

impl Drop for Dir {
    fn drop(&mut self) {
        // SAFETY: the stream is open and closed only here.
        unsafe { libc::closedir(self.ptr.as_ptr()) };
    }
}

/// A directory descriptor that is either the accessor's anchor or one opened for a single
/// resolution. Only the owned variant is closed on drop.
pub(crate) enum DirFd<'a> {
    Anchor(BorrowedFd<'a>),
    Owned(OwnedFd),
}

impl AsFd for DirFd<'_> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            DirFd::Anchor(fd) => *fd,
            DirFd::Owned(fd) => fd.as_fd(),
        }
    }
}

/// Failure of a safe resolution walk.
#[derive(Debug)]
pub(crate) enum OpenError {
    /// The given prefix (relative to the anchor) is a symlink.
    Symlink(CanonPath),
    Os(io::Error),
}

impl OpenError {
    pub(crate) fn errno(&self) -> Option<i32> {
        match self {
            OpenError::Symlink(_) => None,
            OpenError::Os(err) => err.raw_os_error(),
        }
    }
}

/// Opens the parent directory of `path` beneath `anchor`, one component at a time, refusing
/// to follow any symlink on the way. The root's parent and top-level entries' parent is the
/// anchor itself, for which nothing is opened.
pub(crate) fn open_parent<'a>(
    anchor: BorrowedFd<'a>,
    path: &CanonPath,
) -> Result<DirFd<'a>, OpenError> {
    let mut current = DirFd::Anchor(anchor);
    let Some(parent) = path.parent() else {
        return Ok(current);
    };
    let mut walked = CanonPath::root();
    for name in parent.components() {
        walked.push_unchecked(name);
        let opened = open_at(current.as_fd(), name, DIR_FLAGS);
        match opened {
            // the previous intermediate descriptor, if any, is closed here
            Ok(fd) => current = DirFd::Owned(fd),
            Err(err) => return Err(classify(current.as_fd(), name, walked, err)),
        }
    }
    Ok(current)
}

/// Opens `path` beneath `anchor` with `flags`, never following a symlink in any component.
/// The root opens a fresh descriptor for the anchor itself.
pub(crate) fn open_beneath(
    anchor: BorrowedFd<'_>,
    path: &CanonPath,
    flags: c_int,
) -> Result<OwnedFd, OpenError> {
    let parent = open_parent(anchor, path)?;
    let name = path.base_name().unwrap_or(".");
    open_at(parent.as_fd(), name, flags | libc::O_NOFOLLOW).map_err(OpenError::Os)
}

fn classify(dir: BorrowedFd<'_>, name: &str, walked: CanonPath, err: io::Error) -> OpenError {
    match err.raw_os_error() {
        // with O_NOFOLLOW, ELOOP means the component itself is a symlink
        Some(libc::ELOOP) => OpenError::Symlink(walked),
        // some systems report O_DIRECTORY on a symlink as ENOTDIR
        Some(libc::ENOTDIR) => match fstat_at(dir, name) {
            Ok(st) if FileKind::from_mode(st.st_mode) == Some(FileKind::Symlink) => {
                OpenError::Symlink(walked)
            }
            _ => OpenError::Os(err),
        },
        _ => OpenError::Os(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempdir::TempDir;

    fn setup_test_env() -> TempDir {
        let temp_dir = TempDir::new("sys_test").unwrap();
        std::fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
        std::fs::write(temp_dir.path().join("a/b/file"), b"data").unwrap();
        std::fs::write(temp_dir.path().join("a/plain"), b"").unwrap();
        symlink("b", temp_dir.path().join("a/link")).unwrap();
        temp_dir
    }

    fn p(s: &str) -> CanonPath {
        CanonPath::new(s).unwrap()
    }

    #[test]
    fn test_open_beneath_regular_file() {
        let temp_dir = setup_test_env();
        let anchor = open(temp_dir.path(), libc::O_RDONLY | libc::O_DIRECTORY).unwrap();
        let fd = open_beneath(anchor.as_fd(), &p("/a/b/file"), libc::O_RDONLY).unwrap();
        let st = fstat(fd.as_fd()).unwrap();
        assert_eq!(st.st_size, 4);
    }

    #[test]
    fn test_open_beneath_root_is_fresh_descriptor() {
        let temp_dir = setup_test_env();
        let anchor = open(temp_dir.path(), libc::O_RDONLY | libc::O_DIRECTORY).unwrap();
        let fd = open_beneath(anchor.as_fd(), &CanonPath::root(), DIR_FLAGS).unwrap();
        assert_ne!(fd.as_raw_fd(), anchor.as_raw_fd());
    }

    #[test]
    fn test_intermediate_symlink_is_rejected() {
        let temp_dir = setup_test_env();
        let anchor = open(temp_dir.path(), libc::O_RDONLY | libc::O_DIRECTORY).unwrap();
        match open_beneath(anchor.as_fd(), &p("/a/link/file"), libc::O_RDONLY) {
            Err(OpenError::Symlink(at)) => assert_eq!(at, p("/a/link")),
            other => panic!("expected symlink rejection, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_final_symlink_is_eloop() {
        let temp_dir = setup_test_env();
        let anchor = open(temp_dir.path(), libc::O_RDONLY | libc::O_DIRECTORY).unwrap();
        let err = open_beneath(anchor.as_fd(), &p("/a/link"), libc::O_RDONLY).unwrap_err();
        assert_eq!(err.errno(), Some(libc::ELOOP));
    }

    #[test]
    fn test_intermediate_regular_file_is_not_a_symlink() {
        let temp_dir = setup_test_env();
        let anchor = open(temp_dir.path(), libc::O_RDONLY | libc::O_DIRECTORY).unwrap();
        let err = open_beneath(anchor.as_fd(), &p("/a/plain/x"), libc::O_RDONLY).unwrap_err();
        assert_eq!(err.errno(), Some(libc::ENOTDIR));
    }

    #[test]
    fn test_missing_intermediate() {
        let temp_dir = setup_test_env();
        let anchor = open(temp_dir.path(), libc::O_RDONLY | libc::O_DIRECTORY).unwrap();
        let err = open_beneath(anchor.as_fd(), &p("/nope/x"), libc::O_RDONLY).unwrap_err();
        assert_eq!(err.errno(), Some(libc::ENOENT));
    }

    #[test]
    fn test_read_link_at() {
        let temp_dir = setup_test_env();
        let dir = open(&temp_dir.path().join("a"), libc::O_RDONLY | libc::O_DIRECTORY).unwrap();
        assert_eq!(read_link_at(dir.as_fd(), "link").unwrap(), b"b");
        let err = read_link_at(dir.as_fd(), "plain").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }

    #[test]
    fn test_read_long_link() {
        let temp_dir = setup_test_env();
        let target = "x".repeat(1000);
        symlink(&target, temp_dir.path().join("long")).unwrap();
        let dir = open(temp_dir.path(), libc::O_RDONLY | libc::O_DIRECTORY).unwrap();
        assert_eq!(read_link_at(dir.as_fd(), "long").unwrap(), target.as_bytes());
    }

    #[test]
    fn test_dir_stream() {
        let temp_dir = setup_test_env();
        let fd = open(&temp_dir.path().join("a"), DIR_FLAGS).unwrap();
        let mut names: Vec<_> = Dir::from_fd(fd)
            .unwrap()
            .map(|e| String::from_utf8(e.unwrap().name).unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec![".", "..", "b", "link", "plain"]);
    }
}
