// ABOUTME: Symlink guards for paths the orchestrator writes through or probes
// ABOUTME: Fail closed: metadata errors other than not-found count as symlinks

use std::fs::File;
use std::io;
use std::path::Path;

/// True if `path` itself is a symlink. A missing path is not a symlink;
/// any other metadata error fails closed.
pub fn is_symlink_path(path: &Path) -> bool {
    match std::fs::symlink_metadata(path) {
        Ok(meta) => meta.file_type().is_symlink(),
        Err(e) => e.kind() != io::ErrorKind::NotFound,
    }
}

/// True if any ancestor directory of `path` is a symlink. Missing ancestors
/// are skipped; any other metadata error fails closed.
pub fn has_symlink_ancestor(path: &Path) -> bool {
    let mut current = path.parent();
    while let Some(dir) = current {
        match std::fs::symlink_metadata(dir) {
            Ok(meta) => {
                if meta.file_type().is_symlink() {
                    return true;
                }
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    return true;
                }
            }
        }
        current = dir.parent();
    }
    false
}

fn guard_error(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("path must not be or traverse a symlink: {}", path.display()),
    )
}

/// Open `path` for writing (create + truncate), refusing symlinks anywhere on
/// the way: the ancestor chain is checked first, the open itself carries
/// `O_NOFOLLOW`, and the opened handle must be a regular file.
pub fn create_regular_file(path: &Path) -> io::Result<File> {
    if has_symlink_ancestor(path) || is_symlink_path(path) {
        return Err(guard_error(path));
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(nix::fcntl::OFlag::O_NOFOLLOW.bits());
    }

    let file = options.open(path).map_err(|e| {
        #[cfg(unix)]
        {
            if e.raw_os_error() == Some(nix::libc::ELOOP) {
                return guard_error(path);
            }
        }
        e
    })?;
    if !file.metadata()?.is_file() {
        return Err(guard_error(path));
    }
    Ok(file)
}
