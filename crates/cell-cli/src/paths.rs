//! Root resolution (C10 ambient config): where `#/` and `~/` point to when
//! nothing sandboxed overrides them.
//!
//! There is no project manifest format beyond the Cellscript itself; the
//! only external configuration this front end reads is two environment
//! variables recovered from the original implementation's system-root
//! fallback.

use std::path::{Path, PathBuf};

/// Resolve `#/`: `CELL_SYSTEM_ROOT` if set, else a `system/` directory next
/// to the running executable, falling back to a sibling
/// `../share/cell/system/` (the install layout a packaged build ships).
pub fn system_root() -> PathBuf {
    if let Ok(val) = std::env::var("CELL_SYSTEM_ROOT") {
        return PathBuf::from(val);
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));

    match exe_dir {
        Some(dir) => {
            let sibling = dir.join("system");
            if sibling.exists() {
                sibling
            } else {
                dir.join("../share/cell/system")
            }
        }
        None => PathBuf::from("system"),
    }
}

/// Resolve `~/`: `CELL_HOME` if set, else the user's home directory joined
/// with `.cell`. `None` if neither can be determined, which makes `~/`
/// a sandbox violation rather than silently picking something.
pub fn user_root() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("CELL_HOME") {
        return Some(PathBuf::from(val));
    }
    dirs::home_dir().map(|h| h.join(".cell"))
}
