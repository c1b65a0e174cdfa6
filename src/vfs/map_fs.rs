//! This module provides an in-memory accessor, used as the stand-in when a root cannot be anchored
//! on a descriptor (a symlink root, or a root that could not be opened at all).

use std::collections::BTreeMap;
use std::io::Write;
use std::ops::Bound;
use std::path::PathBuf;

use crate::core::{Result, SourceAccessor, utils};
use crate::error::Error;
use crate::vfs::{DirEntries, FileKind, Stat};
use crate::CanonPath;

#[derive(Debug, Clone, PartialEq)]
enum MapEntry {
    Directory,
    File { contents: Vec<u8>, executable: bool },
    Symlink { target: String },
}

impl MapEntry {
    fn kind(&self) -> FileKind {
        match self {
            MapEntry::Directory => FileKind::Directory,
            MapEntry::File { .. } => FileKind::Regular,
            MapEntry::Symlink { .. } => FileKind::Symlink,
        }
    }

    fn stat(&self) -> Stat {
        match self {
            MapEntry::File {
                contents,
                executable,
            } => Stat::regular(contents.len() as u64, *executable),
            other => Stat::new(other.kind()),
        }
    }
}

/// A read-only accessor over entries kept in memory.
///
/// ### Internal state
///
/// * `entries` — every entry by its absolute path. Uses `BTreeMap` keyed by [`CanonPath`], whose
///   ordering is by components, so the children of a directory directly follow it.
/// * `display_prefix` — rendered in front of paths by `show_path`.
/// * `last_modified` — a fixed value reported by `last_modified()`, if any.
///
/// ### Invariants
///
/// 1. **Parent consistency**: for any entry at `/a/b`, there is a `Directory` entry at `/a`.
/// 2. **No root until populated**: a fresh instance has no entries at all, so even the root is
///    absent. This is the "empty" accessor.
///
/// Population needs `&mut self`; once shared, the instance is immutable and therefore safe to use
/// from several threads.
///
/// ### Example
///
/// ```
/// use fd_accessor::{CanonPath, MapFS, SourceAccessor};
///
/// let mut fs = MapFS::new();
/// fs.add_file(&CanonPath::new("/docs/note.txt").unwrap(), b"Hello".to_vec(), false).unwrap();
/// fs.add_symlink(&CanonPath::new("/latest").unwrap(), "docs/note.txt").unwrap();
///
/// assert!(fs.path_exists(&CanonPath::new("/docs").unwrap()).unwrap());
/// assert_eq!(fs.read_link(&CanonPath::new("/latest").unwrap()).unwrap(), "docs/note.txt");
/// ```
#[derive(Debug, Default)]
pub struct MapFS {
    entries: BTreeMap<CanonPath, MapEntry>,
    display_prefix: String,
    last_modified: Option<i64>,
}

impl MapFS {
    /// Creates an empty instance: every path, including the root, is absent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an instance whose root is a symlink pointing to `target`.
    pub fn with_root_symlink<S: Into<String>>(target: S) -> Self {
        let mut fs = Self::new();
        fs.entries.insert(
            CanonPath::root(),
            MapEntry::Symlink {
                target: target.into(),
            },
        );
        fs
    }

    pub fn set_display_prefix<S: Into<String>>(&mut self, prefix: S) {
        self.display_prefix = prefix.into();
    }

    /// Sets the value reported by `last_modified()`; `None` means tracking is off.
    pub fn set_last_modified(&mut self, mtime: Option<i64>) {
        self.last_modified = mtime;
    }

    /// Creates directory and all its parents (if needed).
    pub fn add_directory(&mut self, path: &CanonPath) -> Result<()> {
        self.ensure_parents(path)?;
        match self.entries.get(path) {
            None | Some(MapEntry::Directory) => {
                self.entries.insert(path.clone(), MapEntry::Directory);
                Ok(())
            }
            Some(_) => Err(Error::NotADirectory(self.show_path(path))),
        }
    }

    /// Creates or replaces a regular file. Missing parent directories are created.
    pub fn add_file(&mut self, path: &CanonPath, contents: Vec<u8>, executable: bool) -> Result<()> {
        self.insert_leaf(
            path,
            MapEntry::File {
                contents,
                executable,
            },
        )
    }

    /// Creates or replaces a symlink. Missing parent directories are created.
    pub fn add_symlink<S: Into<String>>(&mut self, path: &CanonPath, target: S) -> Result<()> {
        self.insert_leaf(
            path,
            MapEntry::Symlink {
                target: target.into(),
            },
        )
    }

    fn insert_leaf(&mut self, path: &CanonPath, entry: MapEntry) -> Result<()> {
        if let Some(MapEntry::Directory) = self.entries.get(path) {
            return Err(Error::NotARegularFile {
                path: self.show_path(path),
                is_symlink: false,
            });
        }
        self.ensure_parents(path)?;
        self.entries.insert(path.clone(), entry);
        Ok(())
    }

    fn ensure_parents(&mut self, path: &CanonPath) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let mut built = CanonPath::root();
        let mut ancestors = vec![built.clone()];
        for segment in parent.components() {
            built.push_unchecked(segment);
            ancestors.push(built.clone());
        }
        for ancestor in ancestors {
            match self.entries.get(&ancestor) {
                None => {
                    self.entries.insert(ancestor, MapEntry::Directory);
                }
                Some(MapEntry::Directory) => {}
                Some(_) => return Err(Error::NotADirectory(self.show_path(&ancestor))),
            }
        }
        Ok(())
    }

    fn children(&self, path: &CanonPath) -> impl Iterator<Item = (&CanonPath, &MapEntry)> {
        let depth = path.components().count() + 1;
        self.entries
            .range((Bound::Excluded(path), Bound::Unbounded))
            .take_while(move |(p, _)| p.is_within(path))
            .filter(move |(p, _)| p.components().count() == depth)
    }
}

impl SourceAccessor for MapFS {
    fn maybe_lstat(&self, path: &CanonPath) -> Result<Option<Stat>> {
        Ok(self.entries.get(path).map(MapEntry::stat))
    }

    fn read_directory(&self, path: &CanonPath) -> Result<DirEntries> {
        match self.entries.get(path) {
            Some(MapEntry::Directory) => Ok(self
                .children(path)
                .filter_map(|(p, entry)| Some((p.base_name()?.to_string(), Some(entry.kind()))))
                .collect()),
            Some(_) => Err(Error::NotADirectory(self.show_path(path))),
            None => Err(Error::NotFound(self.show_path(path))),
        }
    }

    fn read_link(&self, path: &CanonPath) -> Result<String> {
        match self.entries.get(path) {
            Some(MapEntry::Symlink { target }) => Ok(target.clone()),
            Some(_) => Err(Error::NotASymlink(self.show_path(path))),
            None => Err(Error::NotFound(self.show_path(path))),
        }
    }

    fn read_file(
        &self,
        path: &CanonPath,
        sink: &mut dyn Write,
        size_callback: &mut dyn FnMut(u64),
    ) -> Result<()> {
        match self.entries.get(path) {
            Some(MapEntry::File { contents, .. }) => {
                size_callback(contents.len() as u64);
                utils::write_all(self, path, sink, contents)
            }
            Some(entry) => Err(Error::NotARegularFile {
                path: self.show_path(path),
                is_symlink: entry.kind() == FileKind::Symlink,
            }),
            None => Err(Error::NotFound(self.show_path(path))),
        }
    }

    fn physical_path(&self, _path: &CanonPath) -> Option<PathBuf> {
        None
    }

    fn last_modified(&self) -> Option<i64> {
        self.last_modified
    }

    fn display_prefix(&self) -> &str {
        &self.display_prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn p(s: &str) -> CanonPath {
        CanonPath::new(s).unwrap()
    }

    fn populated() -> MapFS {
        let mut fs = MapFS::new();
        fs.add_directory(&p("/docs/empty")).unwrap();
        fs.add_file(&p("/docs/note.txt"), b"Hello".to_vec(), false).unwrap();
        fs.add_file(&p("/run.sh"), b"#!/bin/sh".to_vec(), true).unwrap();
        fs.add_symlink(&p("/latest"), "docs/note.txt").unwrap();
        fs
    }

    mod creations {
        use super::*;

        #[test]
        fn test_empty_has_no_root() {
            let fs = MapFS::new();
            assert_eq!(fs.maybe_lstat(&CanonPath::root()).unwrap(), None);
            assert_eq!(
                fs.read_directory(&CanonPath::root()).unwrap_err().kind(),
                ErrorKind::NotFound
            );
            assert_eq!(fs.last_modified(), None);
            assert_eq!(fs.physical_path(&CanonPath::root()), None);
        }

        #[test]
        fn test_parents_are_created() {
            let fs = populated();
            assert!(fs.lstat(&CanonPath::root()).unwrap().is_dir());
            assert!(fs.lstat(&p("/docs")).unwrap().is_dir());
            assert!(fs.lstat(&p("/docs/empty")).unwrap().is_dir());
        }

        #[test]
        fn test_cannot_nest_below_file() {
            let mut fs = populated();
            assert_eq!(
                fs.add_file(&p("/run.sh/x"), vec![], false)
                    .unwrap_err()
                    .kind(),
                ErrorKind::NotADirectory
            );
            assert_eq!(
                fs.add_directory(&p("/run.sh")).unwrap_err().kind(),
                ErrorKind::NotADirectory
            );
        }

        #[test]
        fn test_cannot_replace_directory() {
            let mut fs = populated();
            assert!(fs.add_symlink(&p("/docs"), "x").is_err());
            assert!(fs.add_file(&p("/docs"), vec![], false).is_err());
        }

        #[test]
        fn test_root_symlink() {
            let mut fs = MapFS::with_root_symlink("/nix/store/target");
            fs.set_display_prefix("/home/user/result");
            fs.set_last_modified(Some(77));

            assert!(fs.lstat(&CanonPath::root()).unwrap().is_symlink());
            assert_eq!(
                fs.read_link(&CanonPath::root()).unwrap(),
                "/nix/store/target"
            );
            assert_eq!(fs.show_path(&CanonPath::root()), "/home/user/result");
            assert_eq!(fs.last_modified(), Some(77));
            assert_eq!(
                fs.read_directory(&CanonPath::root()).unwrap_err().kind(),
                ErrorKind::NotADirectory
            );
        }
    }

    mod access {
        use super::*;

        #[test]
        fn test_lstat() {
            let fs = populated();
            assert_eq!(fs.lstat(&p("/docs/note.txt")).unwrap(), Stat::regular(5, false));
            assert_eq!(fs.lstat(&p("/run.sh")).unwrap().is_executable, Some(true));
            assert!(fs.lstat(&p("/latest")).unwrap().is_symlink());
            assert_eq!(fs.maybe_lstat(&p("/nope")).unwrap(), None);
        }

        #[test]
        fn test_read_directory_lists_direct_children_only() {
            let fs = populated();
            let root = fs.read_directory(&CanonPath::root()).unwrap();
            assert_eq!(
                root.into_iter().collect::<Vec<_>>(),
                vec![
                    ("docs".to_string(), Some(FileKind::Directory)),
                    ("latest".to_string(), Some(FileKind::Symlink)),
                    ("run.sh".to_string(), Some(FileKind::Regular)),
                ]
            );
            let docs = fs.read_directory(&p("/docs")).unwrap();
            assert_eq!(docs.len(), 2);
            assert!(fs.read_directory(&p("/docs/empty")).unwrap().is_empty());
        }

        #[test]
        fn test_read_directory_ignores_similar_prefixes() {
            let mut fs = MapFS::new();
            fs.add_file(&p("/a/x"), vec![], false).unwrap();
            fs.add_file(&p("/a-b/y"), vec![], false).unwrap();
            let entries = fs.read_directory(&p("/a")).unwrap();
            assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["x"]);
        }

        #[test]
        fn test_read_file() {
            let fs = populated();
            let mut announced = 0;
            let mut content = Vec::new();
            fs.read_file(&p("/docs/note.txt"), &mut content, &mut |n| announced = n)
                .unwrap();
            assert_eq!(announced, 5);
            assert_eq!(content, b"Hello");

            assert!(matches!(
                fs.read_to_vec(&p("/latest")),
                Err(Error::NotARegularFile {
                    is_symlink: true,
                    ..
                })
            ));
            assert_eq!(
                fs.read_to_vec(&p("/docs")).unwrap_err().kind(),
                ErrorKind::NotARegularFile
            );
            assert_eq!(
                fs.read_to_vec(&p("/nope")).unwrap_err().kind(),
                ErrorKind::NotFound
            );
        }

        #[test]
        fn test_read_link() {
            let fs = populated();
            assert_eq!(fs.read_link(&p("/latest")).unwrap(), "docs/note.txt");
            assert_eq!(
                fs.read_link(&p("/run.sh")).unwrap_err().kind(),
                ErrorKind::NotASymlink
            );
            assert_eq!(
                fs.read_link(&p("/nope")).unwrap_err().kind(),
                ErrorKind::NotFound
            );
        }

        #[test]
        fn test_show_path_without_prefix() {
            let fs = populated();
            assert_eq!(fs.show_path(&CanonPath::root()), "/");
            assert_eq!(fs.show_path(&p("/docs")), "/docs");
        }
    }
}
