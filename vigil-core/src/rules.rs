//! Review rules
//!
//! A rule is a named natural-language instruction that steers what the model
//! looks for. Rules come from three sources, merged by id in order:
//! 1. The built-in catalog
//! 2. Workspace rules (`.vigil/rules.toml` at the workspace root)
//! 3. User rules (the `[[rules]]` list in the config file)
//!
//! Later sources replace earlier entries with the same id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anomaly::Severity;
use crate::{Error, Result};

/// Workspace rules file, relative to the workspace root
pub const WORKSPACE_RULES_FILE: &str = ".vigil/rules.toml";

/// A named review policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRule {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub severity: Severity,
    /// Textual hint of what the offending code tends to look like
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Instruction given to the model; falls back to the description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Languages this rule applies to; all languages when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
}

fn default_enabled() -> bool {
    true
}

impl ReviewRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            enabled: true,
            severity,
            pattern: None,
            prompt: None,
            languages: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = Some(languages.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The instruction shown to the model
    pub fn instruction(&self) -> &str {
        self.prompt.as_deref().unwrap_or(&self.description)
    }

    /// Whether the rule applies to a file of the given language
    pub fn applies_to(&self, language: &str) -> bool {
        match &self.languages {
            None => true,
            Some(langs) => langs.iter().any(|l| l.eq_ignore_ascii_case(language)),
        }
    }
}

/// The built-in rule catalog
pub fn default_rules() -> Vec<ReviewRule> {
    vec![
        ReviewRule::new(
            "security-vulnerabilities",
            "Security Vulnerabilities",
            "Detect injection, unsafe deserialization, hardcoded secrets and similar flaws",
            Severity::Error,
        )
        .with_prompt(
            "Look for SQL/command injection, XSS, path traversal, unsafe deserialization, \
             hardcoded credentials and missing input validation.",
        ),
        ReviewRule::new(
            "error-handling",
            "Error Handling",
            "Find swallowed errors, missing error checks and unhandled failure paths",
            Severity::Warning,
        )
        .with_prompt(
            "Flag ignored return values, empty catch blocks, unhandled promise rejections \
             and errors that are logged but not propagated when they should be.",
        ),
        ReviewRule::new(
            "null-safety",
            "Null Safety",
            "Find possible null or undefined dereferences",
            Severity::Error,
        )
        .with_prompt("Flag values that may be null, undefined or None at the point they are used."),
        ReviewRule::new(
            "resource-leaks",
            "Resource Leaks",
            "Find files, sockets, handles and subscriptions that are never released",
            Severity::Warning,
        ),
        ReviewRule::new(
            "concurrency",
            "Concurrency Issues",
            "Find data races, missing synchronization and unawaited async work",
            Severity::Error,
        )
        .with_prompt(
            "Flag shared mutable state without synchronization, check-then-act races and \
             async calls whose result is never awaited.",
        ),
        ReviewRule::new(
            "performance",
            "Performance",
            "Find needless allocations, quadratic loops and repeated expensive work",
            Severity::Warning,
        ),
        ReviewRule::new(
            "logic-errors",
            "Logic Errors",
            "Find off-by-one errors, inverted conditions and unreachable branches",
            Severity::Error,
        ),
        ReviewRule::new(
            "complexity",
            "Complexity",
            "Find functions that are too long or deeply nested to follow",
            Severity::Info,
        ),
        ReviewRule::new(
            "naming",
            "Naming",
            "Find misleading or inconsistent names",
            Severity::Info,
        ),
        ReviewRule::new(
            "dead-code",
            "Dead Code",
            "Find unused variables, functions and imports",
            Severity::Info,
        ),
    ]
}

/// Merge rule lists by id
///
/// `workspace` entries are applied first, then `user` entries replace any rule
/// with the same id. The result keeps the position where an id first appeared.
pub fn merge_rules(workspace: &[ReviewRule], user: &[ReviewRule]) -> Vec<ReviewRule> {
    let mut merged: Vec<ReviewRule> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for rule in workspace.iter().chain(user.iter()) {
        match index.get(&rule.id) {
            Some(&pos) => merged[pos] = rule.clone(),
            None => {
                index.insert(rule.id.clone(), merged.len());
                merged.push(rule.clone());
            }
        }
    }

    merged
}

/// An id-addressable, merged collection of rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ReviewRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ReviewRule>) -> Self {
        Self {
            rules: merge_rules(&rules, &[]),
        }
    }

    /// Built-in catalog, then workspace rules, then user rules
    pub fn merged(workspace: &[ReviewRule], user: &[ReviewRule]) -> Self {
        let base = merge_rules(&default_rules(), workspace);
        Self {
            rules: merge_rules(&base, user),
        }
    }

    /// Load workspace rules from `root` and merge them with the given user rules
    pub fn load(workspace_root: &Path, user: &[ReviewRule]) -> Result<Self> {
        let workspace = load_workspace_rules(workspace_root)?;
        Ok(Self::merged(&workspace, user))
    }

    pub fn get(&self, id: &str) -> Option<&ReviewRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn all(&self) -> &[ReviewRule] {
        &self.rules
    }

    /// Enabled rules applicable to `language`
    pub fn enabled_for(&self, language: &str) -> Vec<&ReviewRule> {
        self.rules
            .iter()
            .filter(|r| r.enabled && r.applies_to(language))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<ReviewRule>,
}

/// Path of the workspace rules file under `root`
pub fn workspace_rules_path(root: &Path) -> PathBuf {
    root.join(WORKSPACE_RULES_FILE)
}

/// Read workspace rules; an absent file yields no rules
pub fn load_workspace_rules(root: &Path) -> Result<Vec<ReviewRule>> {
    let path = workspace_rules_path(root);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = std::fs::read_to_string(&path)?;
    let file: RulesFile = toml::from_str(&contents).map_err(|e| {
        Error::Config(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    debug!(path = %path.display(), count = file.rules.len(), "Loaded workspace rules");
    Ok(file.rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_catalog_ids_unique() {
        let rules = default_rules();
        let merged = merge_rules(&rules, &[]);
        assert_eq!(rules.len(), merged.len());
        assert!(rules.iter().all(|r| r.enabled));
    }

    #[test]
    fn test_user_rule_overrides_workspace_rule() {
        let workspace = vec![ReviewRule::new("no-todo", "No TODO", "workspace", Severity::Info)];
        let user = vec![
            ReviewRule::new("no-todo", "No TODO (user)", "user", Severity::Error)
                .with_prompt("user prompt"),
        ];

        let merged = merge_rules(&workspace, &user);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "No TODO (user)");
        assert_eq!(merged[0].description, "user");
        assert_eq!(merged[0].severity, Severity::Error);
        assert_eq!(merged[0].prompt.as_deref(), Some("user prompt"));
    }

    #[test]
    fn test_merge_keeps_first_position() {
        let workspace = vec![
            ReviewRule::new("a", "A", "a", Severity::Info),
            ReviewRule::new("b", "B", "b", Severity::Info),
        ];
        let user = vec![
            ReviewRule::new("c", "C", "c", Severity::Info),
            ReviewRule::new("a", "A2", "a2", Severity::Info),
        ];

        let ids: Vec<_> = merge_rules(&workspace, &user)
            .into_iter()
            .map(|r| (r.id, r.name))
            .collect();
        assert_eq!(
            ids,
            vec![
                ("a".to_string(), "A2".to_string()),
                ("b".to_string(), "B".to_string()),
                ("c".to_string(), "C".to_string()),
            ]
        );
    }

    #[test]
    fn test_rule_set_overrides_catalog() {
        let user = vec![ReviewRule::new("naming", "Naming", "off", Severity::Info).disabled()];
        let set = RuleSet::merged(&[], &user);

        assert_eq!(set.len(), default_rules().len());
        assert!(!set.get("naming").unwrap().enabled);
        assert!(set.enabled_for("rust").iter().all(|r| r.id != "naming"));
    }

    #[test]
    fn test_language_filter() {
        let rule = ReviewRule::new("py", "Py", "py only", Severity::Info).with_languages(&["python"]);
        assert!(rule.applies_to("Python"));
        assert!(!rule.applies_to("rust"));

        let set = RuleSet::new(vec![rule]);
        assert_eq!(set.enabled_for("python").len(), 1);
        assert!(set.enabled_for("go").is_empty());
    }

    #[test]
    fn test_instruction_falls_back_to_description() {
        let rule = ReviewRule::new("x", "X", "describe", Severity::Info);
        assert_eq!(rule.instruction(), "describe");
        assert_eq!(rule.with_prompt("ask").instruction(), "ask");
    }

    #[test]
    fn test_load_workspace_rules() {
        let dir = TempDir::new().unwrap();
        assert!(load_workspace_rules(dir.path()).unwrap().is_empty());

        std::fs::create_dir_all(dir.path().join(".vigil")).unwrap();
        std::fs::write(
            workspace_rules_path(dir.path()),
            r#"
[[rules]]
id = "no-unwrap"
name = "No unwrap"
description = "Avoid unwrap in library code"
severity = "warning"
languages = ["rust"]

[[rules]]
id = "dead-code"
name = "Dead Code"
description = "disabled here"
enabled = false
"#,
        )
        .unwrap();

        let rules = load_workspace_rules(dir.path()).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].severity, Severity::Warning);
        assert!(rules[0].enabled);
        assert_eq!(rules[1].severity, Severity::Info);

        let set = RuleSet::load(dir.path(), &[]).unwrap();
        assert!(set.get("no-unwrap").is_some());
        assert!(!set.get("dead-code").unwrap().enabled);
    }

    #[test]
    fn test_invalid_rules_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".vigil")).unwrap();
        std::fs::write(workspace_rules_path(dir.path()), "[[rules]]\nid = 3").unwrap();

        assert!(matches!(
            load_workspace_rules(dir.path()),
            Err(Error::Config(_))
        ));
    }
}
