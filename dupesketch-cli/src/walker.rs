//! Repository walker (§6): yields `(repo-id, commit-hash, path, blob-bytes,
//! is-binary)` tuples for every regular file under a directory. Fetching
//! repositories out of archival containers is out of scope (§1); this walks
//! a plain directory on disk and treats it as one repository, which is
//! enough for the `hash` verb to drive the core pipeline end to end.

use std::path::Path;

use walkdir::WalkDir;

/// One file observed by the walker, before feature extraction.
pub struct WalkedFile {
    pub repo: String,
    pub commit: String,
    pub path: String,
    pub bytes: Vec<u8>,
    pub is_binary: bool,
}

/// A file is treated as binary if it contains a NUL byte or is not valid
/// UTF-8 — the same cheap heuristic git itself uses for "binary" blobs.
fn looks_binary(bytes: &[u8]) -> bool {
    bytes.contains(&0) || std::str::from_utf8(bytes).is_err()
}

/// Walk `root`, labeling every file with `repo` and `commit` (both supplied
/// by the caller since there is no repository-archive fetcher behind this
/// CLI — see module docs).
pub fn walk_repository(root: &Path, repo: &str, commit: &str) -> std::io::Result<Vec<WalkedFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let bytes = std::fs::read(entry.path())?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let is_binary = looks_binary(&bytes);
        files.push(WalkedFile { repo: repo.to_string(), commit: commit.to_string(), path: relative, bytes, is_binary });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}
