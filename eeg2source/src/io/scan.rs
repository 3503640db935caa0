//! Input discovery for batch runs.

use std::path::{Path, PathBuf};

use super::reader::ReadError;

/// Resolve a mixed list of files and directories into a sorted,
/// deduplicated list of `.set` inputs.
///
/// Explicit file arguments must name `.set` files; directories are
/// scanned for them, descending only when `recursive` is set. Hidden
/// entries are skipped. Order is lexicographic so batches are stable
/// across runs and platforms.
pub fn discover_inputs(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>, ReadError> {
    let mut found = Vec::new();

    for path in paths {
        if !path.exists() {
            return Err(ReadError::NotFound {
                path: path.clone(),
            });
        }
        if path.is_dir() {
            scan_directory(path, recursive, &mut found)?;
        } else if is_set_file(path) {
            found.push(path.clone());
        } else {
            return Err(ReadError::Unsupported {
                path: path.clone(),
                reason: "expected a .set recording".to_string(),
            });
        }
    }

    found.sort();
    found.dedup();
    Ok(found)
}

fn scan_directory(
    dir: &Path,
    recursive: bool,
    found: &mut Vec<PathBuf>,
) -> Result<(), ReadError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            if recursive {
                scan_directory(&path, recursive, found)?;
            }
            continue;
        }
        if is_set_file(&path) {
            found.push(path);
        }
    }
    Ok(())
}

fn is_set_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("set"))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn finds_set_files_sorted() {
        let dir = tempfile::TempDir::new().unwrap();
        touch(&dir.path().join("b.set"));
        touch(&dir.path().join("a.set"));
        touch(&dir.path().join("notes.txt"));

        let inputs = discover_inputs(&[dir.path().to_path_buf()], false).unwrap();
        assert_eq!(
            inputs,
            vec![dir.path().join("a.set"), dir.path().join("b.set")]
        );
    }

    #[test]
    fn recursion_is_opt_in() {
        let dir = tempfile::TempDir::new().unwrap();
        let sub = dir.path().join("session2");
        std::fs::create_dir(&sub).unwrap();
        touch(&dir.path().join("top.set"));
        touch(&sub.join("nested.set"));

        let flat = discover_inputs(&[dir.path().to_path_buf()], false).unwrap();
        assert_eq!(flat, vec![dir.path().join("top.set")]);

        let deep = discover_inputs(&[dir.path().to_path_buf()], true).unwrap();
        assert_eq!(deep, vec![sub.join("nested.set"), dir.path().join("top.set")]);
    }

    #[test]
    fn explicit_file_and_directory_mix_deduplicates() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("once.set");
        touch(&file);

        let inputs =
            discover_inputs(&[file.clone(), dir.path().to_path_buf()], false).unwrap();
        assert_eq!(inputs, vec![file]);
    }

    #[test]
    fn explicit_non_set_file_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("data.fdt");
        touch(&file);

        let err = discover_inputs(&[file], false).unwrap_err();
        assert!(matches!(err, ReadError::Unsupported { .. }));
    }

    #[test]
    fn missing_input_is_reported() {
        let err = discover_inputs(&[PathBuf::from("/no/such/dir")], false).unwrap_err();
        assert!(matches!(err, ReadError::NotFound { .. }));
    }

    #[test]
    fn hidden_files_are_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        touch(&dir.path().join(".hidden.set"));
        touch(&dir.path().join("visible.set"));

        let inputs = discover_inputs(&[dir.path().to_path_buf()], false).unwrap();
        assert_eq!(inputs, vec![dir.path().join("visible.set")]);
    }
}
