use std::io;

use thiserror::Error;

use crate::CanonPath;

/// Errors returned by accessor operations.
///
/// Paths inside messages are display paths (see `SourceAccessor::show_path`), never raw
/// descriptor numbers or accessor-internal prefixes.
#[derive(Debug, Error)]
pub enum Error {
    #[error("path '{0}' does not exist")]
    NotFound(String),

    #[error("'{0}' is not a directory")]
    NotADirectory(String),

    #[error("file '{0}' is not a symlink")]
    NotASymlink(String),

    #[error("'{path}' is not a regular file{}", symlink_note(.is_symlink))]
    NotARegularFile { path: String, is_symlink: bool },

    /// An intermediate component of `path` is a symlink. `symlink` is the offending prefix,
    /// relative to the accessor root.
    #[error("path '{path}' goes through symlink '{symlink_display}'")]
    SymlinkNotAllowed {
        path: String,
        symlink: CanonPath,
        symlink_display: String,
    },

    #[error("unexpected end-of-file reading '{0}'")]
    UnexpectedEof(String),

    #[error("interrupted while accessing '{0}'")]
    Interrupted(String),

    /// A directory entry name or symlink target under `0` is not valid UTF-8.
    #[error("'{0}' holds a name that is not valid UTF-8")]
    NonUtf8Name(String),

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

fn symlink_note(is_symlink: &bool) -> &'static str {
    if *is_symlink { " (it is a symlink)" } else { "" }
}

/// The error taxonomy without payloads, for callers that only branch on the kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    NotADirectory,
    NotASymlink,
    NotARegularFile,
    SymlinkNotAllowed,
    Interrupted,
    InvalidPath,
    SystemFailure,
}

impl Error {
    pub fn io<C: Into<String>>(context: C, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::NotADirectory(_) => ErrorKind::NotADirectory,
            Error::NotASymlink(_) => ErrorKind::NotASymlink,
            Error::NotARegularFile { .. } => ErrorKind::NotARegularFile,
            Error::SymlinkNotAllowed { .. } => ErrorKind::SymlinkNotAllowed,
            Error::Interrupted(_) => ErrorKind::Interrupted,
            Error::InvalidPath { .. } | Error::NonUtf8Name(_) => ErrorKind::InvalidPath,
            Error::UnexpectedEof(_) | Error::Io { .. } => ErrorKind::SystemFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_use_display_paths() {
        let err = Error::NotARegularFile {
            path: "/tmp/x/link".into(),
            is_symlink: true,
        };
        assert_eq!(
            err.to_string(),
            "'/tmp/x/link' is not a regular file (it is a symlink)"
        );

        let err = Error::SymlinkNotAllowed {
            path: "/tmp/x/c/passwd".into(),
            symlink: CanonPath::new("/c").unwrap(),
            symlink_display: "/tmp/x/c".into(),
        };
        assert_eq!(
            err.to_string(),
            "path '/tmp/x/c/passwd' goes through symlink '/tmp/x/c'"
        );
    }

    #[test]
    fn test_kind() {
        let err = Error::io("reading", io::Error::from_raw_os_error(libc::EIO));
        assert_eq!(err.kind(), ErrorKind::SystemFailure);
        assert_eq!(Error::UnexpectedEof("/f".into()).kind(), ErrorKind::SystemFailure);
        assert_eq!(Error::NotFound("/f".into()).kind(), ErrorKind::NotFound);
    }
}
