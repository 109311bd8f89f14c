//! Tree builders and snapshots shared by the frontend tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::fs::set_file_times;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub contents: Option<Vec<u8>>,
    pub mtime: SystemTime,
}

pub fn at_millis(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

pub fn set_mtime(path: &Path, ms: u64) {
    set_file_times(path, at_millis(ms), at_millis(ms)).unwrap();
}

pub fn binary_blob(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Build a tree with nested and empty directories, an empty file, text and
/// binary files. Every entry gets a distinct millisecond mtime.
pub fn build_tree(root: &Path, blob_len: usize) {
    let dirs = ["", "docs", "docs/drafts", "empty", "deep", "deep/a", "deep/a/b", "deep/a/b/c"];
    for dir in dirs {
        std::fs::create_dir_all(root.join(dir)).unwrap();
    }

    let files: [(&str, Vec<u8>); 5] = [
        ("readme.txt", b"top level file\n".to_vec()),
        ("zero.bin", Vec::new()),
        ("docs/notes.md", b"# notes\n\nsome text".to_vec()),
        ("docs/drafts/blob.bin", binary_blob(blob_len)),
        ("deep/a/b/c/leaf.txt", b"leaf".to_vec()),
    ];
    for (i, (name, data)) in files.iter().enumerate() {
        let path = root.join(name);
        std::fs::write(&path, data).unwrap();
        set_mtime(&path, 1_500_000_000_001 + i as u64 * 1_111);
    }

    // deepest first so setting a child does not disturb its parent
    for (i, dir) in dirs.iter().enumerate().rev() {
        set_mtime(&root.join(dir), 1_400_000_000_007 + i as u64 * 2_222);
    }
}

/// Relative path (with `/` separators) to contents and mtime for every entry
/// below `root`, `root` itself included as `""`.
pub fn snapshot(root: &Path) -> BTreeMap<String, Entry> {
    let mut out = BTreeMap::new();
    walk(root, "", &mut out);
    out
}

fn walk(path: &Path, rel: &str, out: &mut BTreeMap<String, Entry>) {
    let meta = std::fs::symlink_metadata(path).unwrap();
    let contents = if meta.is_dir() {
        None
    } else {
        Some(std::fs::read(path).unwrap())
    };
    out.insert(
        rel.to_string(),
        Entry {
            contents,
            mtime: meta.modified().unwrap(),
        },
    );

    if meta.is_dir() {
        for entry in std::fs::read_dir(path).unwrap() {
            let entry = entry.unwrap();
            let name = entry.file_name().into_string().unwrap();
            let child = if rel.is_empty() {
                name
            } else {
                format!("{rel}/{name}")
            };
            walk(&entry.path(), &child, out);
        }
    }
}

/// Names of leftover temporary files anywhere below `root`.
pub fn temp_files(root: &Path) -> Vec<String> {
    snapshot(root)
        .into_keys()
        .filter(|k| k.ends_with(crate::core::TEMP_SUFFIX))
        .collect()
}
