use std::collections::BTreeMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Char,
    Block,
    Fifo,
    Socket,
}

impl FileKind {
    /// Classifies a `st_mode` value. Returns `None` for modes outside the seven known kinds.
    pub fn from_mode(mode: libc::mode_t) -> Option<FileKind> {
        match mode & libc::S_IFMT {
            libc::S_IFREG => Some(FileKind::Regular),
            libc::S_IFDIR => Some(FileKind::Directory),
            libc::S_IFLNK => Some(FileKind::Symlink),
            libc::S_IFCHR => Some(FileKind::Char),
            libc::S_IFBLK => Some(FileKind::Block),
            libc::S_IFIFO => Some(FileKind::Fifo),
            libc::S_IFSOCK => Some(FileKind::Socket),
            _ => None,
        }
    }

    /// Classifies a `d_type` from a directory listing record. `DT_UNKNOWN` (and anything else
    /// the listing could not classify) yields `None`.
    pub fn from_dirent_type(d_type: u8) -> Option<FileKind> {
        match d_type {
            libc::DT_REG => Some(FileKind::Regular),
            libc::DT_DIR => Some(FileKind::Directory),
            libc::DT_LNK => Some(FileKind::Symlink),
            libc::DT_CHR => Some(FileKind::Char),
            libc::DT_BLK => Some(FileKind::Block),
            libc::DT_FIFO => Some(FileKind::Fifo),
            libc::DT_SOCK => Some(FileKind::Socket),
            _ => None,
        }
    }
}

/// Metadata of one entry, produced fresh by every successful status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub kind: FileKind,
    /// Present for regular files only.
    pub file_size: Option<u64>,
    /// Owner-execute bit; present for regular files only.
    pub is_executable: Option<bool>,
    /// Seconds since the epoch, when known.
    pub mtime: Option<i64>,
}

impl Stat {
    pub fn new(kind: FileKind) -> Self {
        Self {
            kind,
            file_size: None,
            is_executable: None,
            mtime: None,
        }
    }

    pub fn regular(size: u64, executable: bool) -> Self {
        Self {
            kind: FileKind::Regular,
            file_size: Some(size),
            is_executable: Some(executable),
            mtime: None,
        }
    }

    /// Converts a raw `struct stat`. Modes outside the known kinds are reported as regular files.
    pub fn from_raw(st: &libc::stat) -> Self {
        let kind = FileKind::from_mode(st.st_mode).unwrap_or(FileKind::Regular);
        let regular = kind == FileKind::Regular;
        Self {
            kind,
            file_size: regular.then_some(st.st_size as u64),
            is_executable: regular.then_some(st.st_mode & libc::S_IXUSR != 0),
            mtime: Some(st.st_mtime as i64),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::Regular
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// Directory listing: entry name to kind, `None` when the listing could not classify the entry.
/// Never contains `.` or `..`.
pub type DirEntries = BTreeMap<String, Option<FileKind>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_mode() {
        assert_eq!(
            FileKind::from_mode(libc::S_IFDIR | 0o755),
            Some(FileKind::Directory)
        );
        assert_eq!(
            FileKind::from_mode(libc::S_IFLNK | 0o777),
            Some(FileKind::Symlink)
        );
        assert_eq!(FileKind::from_mode(libc::S_IFIFO), Some(FileKind::Fifo));
        assert_eq!(FileKind::from_mode(0), None);
    }

    #[test]
    fn test_from_dirent_type() {
        assert_eq!(
            FileKind::from_dirent_type(libc::DT_REG),
            Some(FileKind::Regular)
        );
        assert_eq!(FileKind::from_dirent_type(libc::DT_UNKNOWN), None);
    }

    #[test]
    fn test_from_raw_regular() {
        // SAFETY: an all-zero `stat` is a valid value; only the fields below are read.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        st.st_mode = libc::S_IFREG | 0o755;
        st.st_size = 4;
        st.st_mtime = 1_700_000_000;

        let stat = Stat::from_raw(&st);
        assert!(stat.is_file());
        assert_eq!(stat.file_size, Some(4));
        assert_eq!(stat.is_executable, Some(true));
        assert_eq!(stat.mtime, Some(1_700_000_000));
    }

    #[test]
    fn test_from_raw_directory_has_no_size() {
        // SAFETY: see above.
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        st.st_mode = libc::S_IFDIR | 0o755;
        st.st_size = 4096;

        let stat = Stat::from_raw(&st);
        assert!(stat.is_dir());
        assert_eq!(stat.file_size, None);
        assert_eq!(stat.is_executable, None);
    }
}
