use std::path::PathBuf;

use fd_accessor::{CanonPath, FileKind, SourceAccessor, make_fs_accessor};

fn walk(fs: &dyn SourceAccessor, dir: &CanonPath, depth: usize) -> anyhow::Result<()> {
    for (name, _) in fs.read_directory(dir)? {
        let path = dir.join(&name)?;
        let stat = fs.lstat(&path)?;
        let indent = "  ".repeat(depth);
        match stat.kind {
            FileKind::Directory => {
                println!("{indent}{name}/");
                walk(fs, &path, depth + 1)?;
            }
            FileKind::Symlink => println!("{indent}{name} -> {}", fs.read_link(&path)?),
            FileKind::Regular => println!("{indent}{name} ({} bytes)", stat.file_size.unwrap_or(0)),
            kind => println!("{indent}{name} [{kind:?}]"),
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let root = match std::env::args_os().nth(1) {
        Some(arg) => std::path::absolute(PathBuf::from(arg))?,
        None => std::env::current_dir()?,
    };
    let fs = make_fs_accessor(Some(&root), true);

    let top = fs.lstat(&CanonPath::root())?;
    println!("{}", fs.show_path(&CanonPath::root()));
    match top.kind {
        FileKind::Directory => walk(fs.as_ref(), &CanonPath::root(), 1)?,
        FileKind::Symlink => println!("  -> {}", fs.read_link(&CanonPath::root())?),
        _ => println!("  {} bytes", fs.read_to_vec(&CanonPath::root())?.len()),
    }
    if let Some(mtime) = fs.last_modified() {
        println!("newest mtime: {mtime}");
    }
    Ok(())
}
