//! Host workspace access
//!
//! The analysis engine and the bridge never touch the file system directly;
//! they go through [`Workspace`], which the host implements. [`FsWorkspace`]
//! is the local-disk implementation used by the CLI.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::{Error, Result};

/// File extensions considered by repository scans
pub const SCAN_EXTENSIONS: [&str; 15] = [
    "ts", "tsx", "js", "jsx", "py", "java", "go", "rs", "c", "cpp", "cs", "rb", "php", "swift",
    "kt",
];

/// Document and file enumeration capability of the host
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Workspace root directory
    fn root(&self) -> &Path;

    /// Root-relative spelling of `path`, with `.` components dropped
    ///
    /// Paths outside the root are returned as given.
    fn normalize(&self, path: &Path) -> PathBuf {
        path.strip_prefix(self.root())
            .unwrap_or(path)
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    }

    /// Read a document's full text
    async fn read_document(&self, path: &Path) -> Result<String>;

    /// Replace a document's full text
    async fn write_document(&self, path: &Path, text: &str) -> Result<()>;

    /// Whether a document exists at `path`
    async fn exists(&self, path: &Path) -> bool;

    /// Enumerate files with one of `extensions`, skipping `exclude` globs,
    /// returning at most `max` paths in a stable order
    async fn find_files(
        &self,
        extensions: &[&str],
        exclude: &[String],
        max: usize,
    ) -> Result<Vec<PathBuf>>;
}

/// Workspace backed by the local file system
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    root: PathBuf,
}

impl FsWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `path` against the workspace root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl Workspace for FsWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn read_document(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(self.resolve(path)).await?)
    }

    async fn write_document(&self, path: &Path, text: &str) -> Result<()> {
        Ok(tokio::fs::write(self.resolve(path), text).await?)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(self.resolve(path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn find_files(
        &self,
        extensions: &[&str],
        exclude: &[String],
        max: usize,
    ) -> Result<Vec<PathBuf>> {
        let root = self.root.clone();
        let extensions: Vec<String> = extensions.iter().map(|e| e.to_string()).collect();
        let filter = ExcludeFilter::new(exclude)?;

        tokio::task::spawn_blocking(move || walk(&root, &extensions, &filter, max))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))
    }
}

fn walk(root: &Path, extensions: &[String], filter: &ExcludeFilter, max: usize) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if max == 0 {
        return files;
    }

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            rel.as_os_str().is_empty() || !entry.file_type().is_dir() || !filter.excludes_dir(rel)
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
        if !matches_ext {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(path);
        if filter.excludes_file(rel) {
            continue;
        }
        files.push(path.to_path_buf());
        if files.len() >= max {
            debug!(max, "Reached file cap");
            break;
        }
    }

    files
}

/// Compiled exclude globs
///
/// Patterns ending in `/**` also prune whole directories during the walk.
#[derive(Debug, Clone)]
pub struct ExcludeFilter {
    files: GlobSet,
    dirs: GlobSet,
}

impl ExcludeFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut files = GlobSetBuilder::new();
        let mut dirs = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::Config(format!("Invalid exclude pattern {}: {}", pattern, e)))?;
            files.add(glob);
            if let Some(dir_pattern) = pattern.strip_suffix("/**") {
                let glob = Glob::new(dir_pattern).map_err(|e| {
                    Error::Config(format!("Invalid exclude pattern {}: {}", pattern, e))
                })?;
                dirs.add(glob);
            }
        }

        let build = |builder: GlobSetBuilder| {
            builder
                .build()
                .map_err(|e| Error::Config(format!("Invalid exclude patterns: {}", e)))
        };

        Ok(Self {
            files: build(files)?,
            dirs: build(dirs)?,
        })
    }

    pub fn excludes_file(&self, rel: &Path) -> bool {
        self.files.is_match(rel)
    }

    pub fn excludes_dir(&self, rel: &Path) -> bool {
        self.dirs.is_match(rel)
    }
}

/// Language name for a file, derived from its extension
pub fn language_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "py" => "python",
        "java" => "java",
        "go" => "go",
        "rs" => "rust",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x").unwrap();
    }

    fn defaults() -> Vec<String> {
        crate::config::AnalysisConfig::default().exclude
    }

    #[tokio::test]
    async fn test_find_files_filters_extensions_and_excludes() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/main.rs");
        touch(dir.path(), "src/app.ts");
        touch(dir.path(), "README.md");
        touch(dir.path(), "node_modules/pkg/index.js");
        touch(dir.path(), "web/dist/bundle.js");
        touch(dir.path(), "web/src/index.js");

        let ws = FsWorkspace::new(dir.path());
        let files = ws.find_files(&SCAN_EXTENSIONS, &defaults(), 50).await.unwrap();
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            rel,
            vec![
                PathBuf::from("src/app.ts"),
                PathBuf::from("src/main.rs"),
                PathBuf::from("web/src/index.js"),
            ]
        );
    }

    #[tokio::test]
    async fn test_find_files_respects_cap() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            touch(dir.path(), &format!("f{}.py", i));
        }

        let ws = FsWorkspace::new(dir.path());
        assert_eq!(ws.find_files(&SCAN_EXTENSIONS, &[], 3).await.unwrap().len(), 3);
        assert!(ws.find_files(&SCAN_EXTENSIONS, &[], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_level_exclude() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.test.ts");
        touch(dir.path(), "a.ts");

        let ws = FsWorkspace::new(dir.path());
        let files = ws
            .find_files(&SCAN_EXTENSIONS, &["**/*.test.ts".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(files, vec![dir.path().join("a.ts")]);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(ExcludeFilter::new(&["a/[".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_read_write_relative() {
        let dir = TempDir::new().unwrap();
        let ws = FsWorkspace::new(dir.path());

        ws.write_document(Path::new("a.rs"), "fn main() {}").await.unwrap();
        assert!(ws.exists(Path::new("a.rs")).await);
        assert_eq!(
            ws.read_document(&dir.path().join("a.rs")).await.unwrap(),
            "fn main() {}"
        );
        assert!(ws.read_document(Path::new("missing.rs")).await.is_err());
    }

    #[test]
    fn test_normalize_spellings() {
        let dir = TempDir::new().unwrap();
        let ws = FsWorkspace::new(dir.path());

        let expected = PathBuf::from("src/a.rs");
        assert_eq!(ws.normalize(&dir.path().join("src/a.rs")), expected);
        assert_eq!(ws.normalize(Path::new("src/a.rs")), expected);
        assert_eq!(ws.normalize(Path::new("./src/./a.rs")), expected);
        assert_eq!(
            ws.normalize(Path::new("/elsewhere/b.rs")),
            PathBuf::from("/elsewhere/b.rs")
        );
    }

    #[test]
    fn test_language_for_path() {
        assert_eq!(language_for_path(Path::new("a/b.rs")), "rust");
        assert_eq!(language_for_path(Path::new("x.TSX")), "typescriptreact");
        assert_eq!(language_for_path(Path::new("Makefile")), "plaintext");
    }
}
