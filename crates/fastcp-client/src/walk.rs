//! Recursive file-tree enumeration for `-r` transfers.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Collect every regular file under `root`, depth first.
///
/// Unreadable directories are skipped with a debug log; the transfer carries
/// on with whatever was reachable.
pub fn collect_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    visit(root, &mut files);
    files
}

fn visit(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            visit(&path, files);
        } else if path.is_file() {
            files.push(path);
        }
    }
}

/// The name sent in BEGIN for a file under `root`: the root-relative path
/// with forward slashes.
pub fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}
