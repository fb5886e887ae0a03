use std::path::{Path, PathBuf};

/// `test_output/` at the workspace root.
pub fn test_output_dir() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .unwrap_or(manifest_dir)
        .join("test_output")
}

/// Path for a file written by a test. `name` may contain subdirectories,
/// which are created on demand.
pub fn test_output_path(name: &str) -> PathBuf {
    let path = test_output_dir().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| panic!("Failed to create {}: {}", parent.display(), e));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_names_get_their_directory() {
        let path = test_output_path("test_utils/nested/file.bin");
        assert!(path.starts_with(test_output_dir()));
        assert!(path.parent().unwrap().is_dir());
    }
}
