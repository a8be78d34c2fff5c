//! Related-file discovery
//!
//! Scans a file for import-like statements with relative specifiers and
//! resolves them against the workspace. Only a handful of files are kept and
//! each is capped so one analysis request stays bounded.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::model::RelatedFile;
use crate::workspace::Workspace;

/// Maximum number of related files per analysis
pub const MAX_RELATED_FILES: usize = 3;

/// Maximum characters read from each related file
pub const RELATED_FILE_READ_CHARS: usize = 3000;

/// Extensions tried when an import specifier has none
const RESOLVE_EXTENSIONS: [&str; 6] = ["ts", "tsx", "js", "jsx", "py", "rs"];

static IMPORT_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(?:import|export)\b[^'"\n]*?['"]([^'"\n]+)['"]"#).expect("valid regex")
});

static REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:require|import)\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).expect("valid regex")
});

static PY_FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*from\s+(\.+[\w.]*)\s+import\b").expect("valid regex"));

static C_INCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*#\s*include\s+"([^"\n]+)""#).expect("valid regex"));

/// Relative import specifiers found in `content`, in order of appearance
pub fn import_specifiers(content: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for regex in [&*IMPORT_FROM, &*REQUIRE] {
        for caps in regex.captures_iter(content) {
            if let Some(m) = caps.get(1) {
                if m.as_str().starts_with('.') {
                    found.push((m.start(), m.as_str().to_string()));
                }
            }
        }
    }

    for caps in PY_FROM.captures_iter(content) {
        if let Some(m) = caps.get(1) {
            found.push((m.start(), python_module_path(m.as_str())));
        }
    }

    for caps in C_INCLUDE.captures_iter(content) {
        if let Some(m) = caps.get(1) {
            found.push((m.start(), format!("./{}", m.as_str())));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    let mut specifiers: Vec<String> = Vec::new();
    for (_, spec) in found {
        if !specifiers.contains(&spec) {
            specifiers.push(spec);
        }
    }
    specifiers
}

/// `..pkg.mod` becomes `../pkg/mod`
fn python_module_path(module: &str) -> String {
    let dots = module.chars().take_while(|c| *c == '.').count();
    let rest = module[dots..].replace('.', "/");

    let mut path = if dots <= 1 {
        ".".to_string()
    } else {
        vec![".."; dots - 1].join("/")
    };
    if !rest.is_empty() {
        path.push('/');
        path.push_str(&rest);
    }
    path
}

/// Lexically resolve `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Candidate paths for one specifier, most specific first
fn candidates(base: &Path, specifier: &str) -> Vec<PathBuf> {
    let target = normalize(&base.join(specifier));
    let mut out = Vec::new();

    if target.extension().is_some() {
        out.push(target.clone());
    }
    for ext in RESOLVE_EXTENSIONS {
        let mut with_ext = target.clone().into_os_string();
        with_ext.push(".");
        with_ext.push(ext);
        out.push(PathBuf::from(with_ext));
    }
    for index in ["index.ts", "index.js", "__init__.py", "mod.rs"] {
        out.push(target.join(index));
    }
    out
}

/// Collect up to [`MAX_RELATED_FILES`] files imported by `file`
pub async fn find_related_files(
    workspace: &dyn Workspace,
    file: &Path,
    content: &str,
) -> Vec<RelatedFile> {
    let base = file.parent().unwrap_or_else(|| Path::new(""));
    let mut related: Vec<RelatedFile> = Vec::new();

    'specifiers: for specifier in import_specifiers(content) {
        if related.len() >= MAX_RELATED_FILES {
            break;
        }
        for candidate in candidates(base, &specifier) {
            if candidate == file || related.iter().any(|r| r.path == candidate) {
                continue;
            }
            if !workspace.exists(&candidate).await {
                continue;
            }
            match workspace.read_document(&candidate).await {
                Ok(text) => {
                    related.push(RelatedFile {
                        path: candidate,
                        content: text.chars().take(RELATED_FILE_READ_CHARS).collect(),
                    });
                    continue 'specifiers;
                }
                Err(e) => {
                    debug!(path = %candidate.display(), error = %e, "Skipping unreadable related file");
                }
            }
        }
    }

    debug!(file = %file.display(), count = related.len(), "Resolved related files");
    related
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::FsWorkspace;
    use tempfile::TempDir;

    #[test]
    fn test_import_specifiers() {
        let content = r#"
import React from 'react';
import { helper } from "./utils/helper";
export * from '../shared';
const cfg = require('./config.json');
const lazy = import('./lazy');
from .models import User
from ..core.db import session
#include "local.h"
#include <stdio.h>
"#;
        assert_eq!(
            import_specifiers(content),
            vec![
                "./utils/helper",
                "../shared",
                "./config.json",
                "./lazy",
                "./models",
                "../core/db",
                "./local.h",
            ]
        );
    }

    #[test]
    fn test_python_module_path() {
        assert_eq!(python_module_path("."), ".");
        assert_eq!(python_module_path(".a.b"), "./a/b");
        assert_eq!(python_module_path("...x"), "../../x");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("src/./a/../b.ts")), PathBuf::from("src/b.ts"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
        assert_eq!(normalize(Path::new("a/../../../x")), PathBuf::from("../../x"));
    }

    #[tokio::test]
    async fn test_find_related_files_resolves_and_caps() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/lib")).unwrap();
        std::fs::write(root.join("src/a.ts"), "export const a = 1;").unwrap();
        std::fs::write(root.join("src/b.js"), "module.exports = 2;").unwrap();
        std::fs::write(root.join("src/lib/index.ts"), "export {};").unwrap();
        std::fs::write(root.join("src/d.ts"), "x".repeat(RELATED_FILE_READ_CHARS + 100)).unwrap();

        let content = "import { a } from './a';\nconst b = require('./b');\nimport './lib';\nimport './d';\nimport './missing';\n";
        let ws = FsWorkspace::new(root);
        let related = find_related_files(&ws, Path::new("src/main.ts"), content).await;

        let paths: Vec<_> = related.iter().map(|r| r.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("src/a.ts"),
                PathBuf::from("src/b.js"),
                PathBuf::from("src/lib/index.ts"),
            ]
        );
    }

    #[tokio::test]
    async fn test_related_content_is_capped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.py"), "y".repeat(RELATED_FILE_READ_CHARS * 2)).unwrap();

        let ws = FsWorkspace::new(dir.path());
        let related = find_related_files(&ws, Path::new("main.py"), "from .big import thing\n").await;

        assert_eq!(related.len(), 1);
        assert_eq!(related[0].content.chars().count(), RELATED_FILE_READ_CHARS);
    }
}
