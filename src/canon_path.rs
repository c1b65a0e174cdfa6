//! Canonical, accessor-relative absolute paths.
//!
//! A [`CanonPath`] is always rooted at the accessor's own root (not at the host root), never
//! contains `.` or `..` segments, never contains empty segments and has no trailing separator
//! except for the root itself. It is a pure value: nothing here touches the filesystem.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Div;
use std::str::FromStr;

use crate::core::Result;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonPath {
    path: String, // always starts with '/'
}

impl CanonPath {
    /// Parses an absolute, already normalized path.
    ///
    /// Redundant and trailing separators are dropped, but relative input and `.` / `..`
    /// segments are rejected: use [`CanonPath::normalize`] for arbitrary input.
    pub fn new<S: AsRef<str>>(path: S) -> Result<Self> {
        let raw = path.as_ref();
        if !raw.starts_with('/') {
            return Err(Error::InvalidPath {
                path: raw.to_string(),
                reason: "path must be absolute",
            });
        }
        let mut result = Self::root();
        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(Error::InvalidPath {
                    path: raw.to_string(),
                    reason: "path contains '.' or '..' segments",
                });
            }
            if segment.contains('\0') {
                return Err(Error::InvalidPath {
                    path: raw.escape_default().to_string(),
                    reason: "path contains a NUL byte",
                });
            }
            result.push_unchecked(segment);
        }
        Ok(result)
    }

    /// Lexically normalizes `path`.
    ///
    /// Relative input is treated as rooted, `.` segments are skipped and `..` pops the previous
    /// segment (clamped at the root, so `/../a` is `/a`). Segments are not otherwise checked: a
    /// NUL byte is kept and such a path is simply never found.
    pub fn normalize<S: AsRef<str>>(path: S) -> Self {
        let mut segments: Vec<&str> = Vec::new();
        for segment in path.as_ref().split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                _ => segments.push(segment),
            }
        }
        let mut result = Self::root();
        for segment in segments {
            result.push_unchecked(segment);
        }
        result
    }

    pub fn root() -> Self {
        Self {
            path: String::from("/"),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.len() == 1
    }

    /// Returns the absolute form, e.g. `/a/b`.
    pub fn abs(&self) -> &str {
        &self.path
    }

    /// Returns the form without the leading separator, e.g. `a/b` (empty for the root).
    pub fn rel(&self) -> &str {
        &self.path[1..]
    }

    /// Returns the parent path, or `None` for the root.
    pub fn parent(&self) -> Option<CanonPath> {
        if self.is_root() {
            return None;
        }
        let pos = self.path.rfind('/')?;
        let parent = if pos == 0 { "/" } else { &self.path[..pos] };
        Some(Self {
            path: parent.to_string(),
        })
    }

    /// Returns the last segment, or `None` for the root.
    pub fn base_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.path.rfind('/').map(|pos| &self.path[pos + 1..])
    }

    pub fn components(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.rel().split('/').filter(|s| !s.is_empty())
    }

    /// Appends a single segment in place.
    /// * `name` must be a plain entry name: non-empty, no separator, not `.` or `..`.
    pub fn push(&mut self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(Error::InvalidPath {
                path: name.to_string(),
                reason: "not a single path segment",
            });
        }
        if name.contains('\0') {
            return Err(Error::InvalidPath {
                path: name.escape_default().to_string(),
                reason: "path contains a NUL byte",
            });
        }
        self.push_unchecked(name);
        Ok(())
    }

    /// Like [`CanonPath::push`], but returns a new path.
    pub fn join(&self, name: &str) -> Result<CanonPath> {
        let mut result = self.clone();
        result.push(name)?;
        Ok(result)
    }

    /// Structural concatenation: `/a` and `/b/c` give `/a/b/c`.
    pub fn concat(&self, other: &CanonPath) -> CanonPath {
        let mut result = self.clone();
        for segment in other.components() {
            result.push_unchecked(segment);
        }
        result
    }

    /// Returns `true` if `self` is `ancestor` or lies below it.
    pub fn is_within(&self, ancestor: &CanonPath) -> bool {
        let mut own = self.components();
        ancestor.components().all(|segment| own.next() == Some(segment))
    }

    pub(crate) fn push_unchecked(&mut self, segment: &str) {
        if !self.is_root() {
            self.path.push('/');
        }
        self.path.push_str(segment);
    }
}

impl Default for CanonPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for CanonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl FromStr for CanonPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for CanonPath {
    fn as_ref(&self) -> &str {
        &self.path
    }
}

impl Ord for CanonPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components().cmp(other.components())
    }
}

impl PartialOrd for CanonPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Div<&CanonPath> for &CanonPath {
    type Output = CanonPath;

    fn div(self, rhs: &CanonPath) -> CanonPath {
        self.concat(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> CanonPath {
        CanonPath::new(s).unwrap()
    }

    mod creations {
        use super::*;

        #[test]
        fn test_new_drops_redundant_separators() {
            assert_eq!(p("/a//b/").abs(), "/a/b");
            assert_eq!(p("/").abs(), "/");
            assert_eq!(p("//").abs(), "/");
        }

        #[test]
        fn test_new_rejects_relative() {
            assert!(matches!(
                CanonPath::new("a/b"),
                Err(Error::InvalidPath { .. })
            ));
            assert!(CanonPath::new("").is_err());
        }

        #[test]
        fn test_new_rejects_dot_segments() {
            assert!(CanonPath::new("/a/./b").is_err());
            assert!(CanonPath::new("/a/../b").is_err());
            assert!("/..".parse::<CanonPath>().is_err());
        }

        #[test]
        fn test_rejects_nul() {
            let err = CanonPath::new("/a\0b").unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidPath);
            assert!(err.to_string().contains("NUL"));

            let mut path = p("/a");
            assert!(path.push("b\0").is_err());
            assert_eq!(path.abs(), "/a");
            assert!(path.join("\0").is_err());
        }

        #[test]
        fn test_normalize() {
            assert_eq!(CanonPath::normalize("/a/b/c/").abs(), "/a/b/c");
            assert_eq!(CanonPath::normalize("/a/b/./c").abs(), "/a/b/c");
            assert_eq!(CanonPath::normalize("/a/b/../c").abs(), "/a/c");
            assert_eq!(CanonPath::normalize("/..").abs(), "/");
            assert_eq!(CanonPath::normalize("../a").abs(), "/a");
            assert_eq!(CanonPath::normalize("").abs(), "/");
        }
    }

    mod structure {
        use super::*;

        #[test]
        fn test_root() {
            let root = CanonPath::root();
            assert!(root.is_root());
            assert_eq!(root.parent(), None);
            assert_eq!(root.base_name(), None);
            assert_eq!(root.rel(), "");
            assert_eq!(root.components().count(), 0);
        }

        #[test]
        fn test_parent_and_base_name() {
            let path = p("/a/b/c");
            assert_eq!(path.parent(), Some(p("/a/b")));
            assert_eq!(path.base_name(), Some("c"));
            assert_eq!(p("/a").parent(), Some(CanonPath::root()));
            assert_eq!(path.rel(), "a/b/c");
        }

        #[test]
        fn test_push_and_join() {
            let mut path = CanonPath::root();
            path.push("a").unwrap();
            assert_eq!(path.abs(), "/a");
            assert_eq!(path.join("b").unwrap().abs(), "/a/b");
            assert!(path.join("b/c").is_err());
            assert!(path.join("..").is_err());
            assert!(path.join("").is_err());
        }

        #[test]
        fn test_concat() {
            assert_eq!((&p("/a") / &p("/b/c")).abs(), "/a/b/c");
            assert_eq!(CanonPath::root().concat(&p("/x")).abs(), "/x");
            assert_eq!(p("/x").concat(&CanonPath::root()).abs(), "/x");
        }

        #[test]
        fn test_is_within() {
            assert!(p("/a/b").is_within(&p("/a")));
            assert!(p("/a").is_within(&p("/a")));
            assert!(p("/a").is_within(&CanonPath::root()));
            assert!(!p("/ab").is_within(&p("/a")));
            assert!(!p("/a").is_within(&p("/a/b")));
        }

        #[test]
        fn test_ordering_is_structural() {
            // "/a-b" sorts before "/a/b" as a string, but "a" < "a-b" as a component
            assert!(p("/a/b") < p("/a-b"));
            assert!(CanonPath::root() < p("/a"));
        }
    }
}
