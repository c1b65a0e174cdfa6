mod base;
mod dir_fs;
mod entry;
mod file_fs;
mod map_fs;

pub use dir_fs::DirFS;
pub use entry::{DirEntries, FileKind, Stat};
pub use file_fs::FileFS;
pub use map_fs::MapFS;
