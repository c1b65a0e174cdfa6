//! Read-only source accessors anchored on open directory descriptors.
//!
//! ### Overview
//!
//! `fd-accessor` exposes a file, a directory tree or a symlink on the host through one
//! path-addressed trait, [`SourceAccessor`]. Paths are [`CanonPath`]s relative to the
//! accessor's root; the host path is only looked at once, when the accessor is created.
//!
//! **Key ideas**:
//! - **Anchoring**: a directory tree is reached through a descriptor opened at construction.
//!   Replacing or renaming the root afterwards does not redirect later reads.
//! - **No symlink escapes**: lookups descend one component at a time and refuse to follow a
//!   symlink anywhere inside the tree. Such a lookup fails with [`Error::SymlinkNotAllowed`].
//! - **Absence is not failure**: [`SourceAccessor::maybe_lstat`] returns `Ok(None)` for a missing
//!   path and an error for everything else.
//! - **One entry point**: [`make_fs_accessor`] picks [`DirFS`], [`FileFS`] or [`MapFS`] depending
//!   on what the root is, and [`fs_accessor`] hands out the shared accessor for `/`.
//!
//! ### Example
//! ```no_run
//! use fd_accessor::{CanonPath, make_fs_accessor};
//!
//! let fs = make_fs_accessor(Some("/srv/tree".as_ref()), false);
//! for (name, kind) in fs.read_directory(&CanonPath::root()).unwrap() {
//!     println!("{name}: {kind:?}");
//! }
//! ```

mod canon_path;
mod core;
mod error;
mod interrupt;
mod options;
mod root;
mod sys;
mod vfs;

pub use canon_path::CanonPath;
pub use self::core::{Result, SourceAccessor};
pub use error::{Error, ErrorKind};
pub use interrupt::Interrupt;
pub use options::Options;
pub use root::{fs_accessor, make_fs_accessor, make_fs_accessor_with};
pub use vfs::{DirEntries, DirFS, FileFS, FileKind, MapFS, Stat};
