//! Test-file discovery (CLI collaborator).
//!
//! Walks the given paths for `.resty`/`.rest` files. A bare file path is
//! taken as-is (even without a recognised extension, so a user can point at
//! an oddly-named suite directly); a directory is walked with `walkdir`,
//! recursing into subdirectories unless `-r/--recursive` is disabled.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

fn is_test_file(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.eq_ignore_ascii_case("resty") || ext.eq_ignore_ascii_case("rest"),
        None => false,
    }
}

/// Discovers `.resty`/`.rest` files under `paths`, deduplicated and sorted
/// for stable output ordering across runs.
pub fn discover_files(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut found = Vec::new();

    for path in paths {
        if path.is_file() {
            found.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            continue;
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(path).min_depth(1).max_depth(max_depth).into_iter();
        for entry in walker.filter_map(Result::ok) {
            if entry.file_type().is_file() && is_test_file(entry.path()) {
                found.push(entry.path().to_path_buf());
            }
        }
    }

    found.sort();
    found.dedup();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovers_resty_and_rest_extensions_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.resty"), "").unwrap();
        fs::write(dir.path().join("b.rest"), "").unwrap();
        fs::write(dir.path().join("ignore.txt"), "").unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("c.resty"), "").unwrap();

        let files = discover_files(&[dir.path().to_path_buf()], true);
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn non_recursive_skips_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.resty"), "").unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("c.resty"), "").unwrap();

        let files = discover_files(&[dir.path().to_path_buf()], false);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn an_explicit_file_path_is_taken_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd-name.md");
        fs::write(&path, "").unwrap();
        let files = discover_files(&[path.clone()], true);
        assert_eq!(files, vec![path]);
    }
}
