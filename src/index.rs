use anyhow::Result;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Directory names excluded from indexing on top of hidden entries.
const EXCLUDED_DIRS: &[&str] = &["venv", ".venv", "__pycache__", "target", "node_modules"];

/// Flat list of relative paths under one project root.
///
/// Rebuilt wholesale on demand; the design accepts staleness between calls
/// rather than watching the filesystem. Order is traversal order, not sorted.
#[derive(Debug)]
pub struct FileIndex {
    root: PathBuf,
    files: Vec<String>,
}

impl FileIndex {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            files: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Full tree walk into a fresh path list. O(files) every call.
    pub fn rebuild(&mut self) -> Result<()> {
        self.files.clear();
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !EXCLUDED_DIRS.contains(&name.as_ref())
            })
            .build();

        for entry in walker.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                self.files
                    .push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }

    /// First indexed path whose lower-cased form ends with `suffix` (lower-cased).
    /// Linear scan, first match wins; ambiguous suffixes resolve in traversal
    /// order and callers must tolerate that.
    pub fn resolve(&self, suffix: &str) -> Option<&str> {
        let target = suffix.to_lowercase();
        self.files
            .iter()
            .find(|p| p.to_lowercase().ends_with(&target))
            .map(|p| p.as_str())
    }

    /// Sorted top-level folder bullets for the chat prompt.
    pub fn folder_overview(&self) -> String {
        let mut roots: Vec<&str> = self
            .files
            .iter()
            .filter_map(|p| p.split('/').next())
            .filter(|seg| self.files.iter().any(|p| p.starts_with(&format!("{seg}/"))))
            .collect();
        roots.sort_unstable();
        roots.dedup();
        roots
            .iter()
            .map(|d| format!("- {d}/"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Sorted file bullets for the chat prompt.
    pub fn file_overview(&self) -> String {
        let mut sorted: Vec<&str> = self.files.iter().map(|s| s.as_str()).collect();
        sorted.sort_unstable();
        sorted
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn seed(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn rebuild_lists_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "a.txt", "x");
        seed(tmp.path(), "sub/b.py", "y");
        let mut idx = FileIndex::new(tmp.path());
        idx.rebuild().unwrap();
        assert_eq!(idx.len(), 2);
        assert!(idx.files().contains(&"sub/b.py".to_string()));
    }

    #[test]
    fn hidden_and_excluded_dirs_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), ".hidden/secret.txt", "x");
        seed(tmp.path(), "venv/lib/thing.py", "x");
        seed(tmp.path(), "__pycache__/mod.pyc", "x");
        seed(tmp.path(), "src/keep.rs", "x");
        let mut idx = FileIndex::new(tmp.path());
        idx.rebuild().unwrap();
        assert_eq!(idx.files(), &["src/keep.rs".to_string()]);
    }

    #[test]
    fn resolve_matches_suffix_case_insensitively() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "src/Handlers/Login.py", "x");
        let mut idx = FileIndex::new(tmp.path());
        idx.rebuild().unwrap();
        assert_eq!(idx.resolve("login.py"), Some("src/Handlers/Login.py"));
        assert_eq!(idx.resolve("handlers/login.py"), Some("src/Handlers/Login.py"));
        assert_eq!(idx.resolve("missing.py"), None);
    }

    #[test]
    fn unique_suffix_resolves_exactly() {
        let tmp = tempfile::tempdir().unwrap();
        seed(tmp.path(), "a/x.py", "1");
        seed(tmp.path(), "b/y.py", "2");
        let mut idx = FileIndex::new(tmp.path());
        idx.rebuild().unwrap();
        assert_eq!(idx.resolve("y.py"), Some("b/y.py"));
    }

    #[test]
    fn empty_tree_resolves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut idx = FileIndex::new(tmp.path());
        idx.rebuild().unwrap();
        assert!(idx.is_empty());
        assert_eq!(idx.resolve("anything.py"), None);
    }
}
