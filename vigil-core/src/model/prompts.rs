//! Prompt templates
//!
//! System prompts are embedded Markdown templates with `{{VARIABLE}}`
//! placeholders. User prompts carry file content and are built directly so
//! that source text is never scanned for placeholders.

use std::collections::HashMap;

use crate::anomaly::{Anomaly, AnomalyType};
use crate::conversation::AnomalyContext;
use crate::rules::ReviewRule;

use super::AnalysisContext;

const ANALYSIS_PROMPT: &str = include_str!("prompts/analysis.md");
const CHAT_PROMPT: &str = include_str!("prompts/chat.md");
const FIX_PROMPT: &str = include_str!("prompts/fix.md");

/// Character budget for each related file quoted in the analysis prompt
pub const RELATED_FILE_PROMPT_CHARS: usize = 2000;

/// Variable substitutions for a template
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    variables: HashMap<String, String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable value (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// Render a template in one pass
///
/// Substituted values are not rescanned. Placeholders without a value render
/// as `(not specified)`.
pub fn render_template(template: &str, context: &PromptContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) if is_placeholder(&after[..end]) => {
                let name = &after[..end];
                match context.variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str("(not specified)"),
                }
                rest = &after[end + 2..];
            }
            _ => {
                out.push_str("{{");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn is_placeholder(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase() || c == '_')
}

/// Truncate to at most `max_chars` characters, marking the cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\n... (truncated)", &text[..idx]),
        None => text.to_string(),
    }
}

/// System prompt for repository analysis
///
/// Lists the given rules (callers pass only enabled ones) and the response
/// schema.
pub fn analysis_system_prompt(rules: &[&ReviewRule]) -> String {
    let rules_str = if rules.is_empty() {
        "(no specific rules; report only clear defects)".to_string()
    } else {
        rules
            .iter()
            .map(|r| format!("- **{}**: {}", r.name, r.instruction()))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let kinds: Vec<&str> = AnomalyType::ALL.iter().map(|t| t.as_str()).collect();

    let context = PromptContext::new()
        .with("RULES", rules_str)
        .with("TYPES", kinds.join(", "))
        .with("TYPE_CHOICES", kinds.join(" | "));

    render_template(ANALYSIS_PROMPT, &context)
}

/// User prompt for repository analysis
pub fn analysis_user_prompt(context: &AnalysisContext) -> String {
    let mut prompt = format!(
        "Analyze this file.\n\nFile: {}\nLanguage: {}\n\n```{}\n{}\n```\n",
        context.file_name.display(),
        context.language,
        context.language,
        context.file_content
    );

    if !context.related_files.is_empty() {
        prompt.push_str("\n## Related files (context only)\n");
        for related in &context.related_files {
            prompt.push_str(&format!(
                "\n### {}\n```\n{}\n```\n",
                related.path.display(),
                truncate_chars(&related.content, RELATED_FILE_PROMPT_CHARS)
            ));
        }
    }

    prompt
}

/// System prompt for a conversation about one anomaly
pub fn chat_system_prompt(context: &AnomalyContext) -> String {
    let lines = if context.start_line == context.end_line {
        context.start_line.to_string()
    } else {
        format!("{}-{}", context.start_line, context.end_line)
    };

    let prompt_context = PromptContext::new()
        .with("FILE", context.file.display().to_string())
        .with("LINES", lines)
        .with("LANGUAGE", context.language.clone())
        .with("TYPE", context.anomaly_type.as_str())
        .with("TITLE", context.title.clone())
        .with("DESCRIPTION", context.description.clone())
        .with(
            "SNIPPET",
            context
                .snippet
                .clone()
                .unwrap_or_else(|| "(code not available)".to_string()),
        );

    render_template(CHAT_PROMPT, &prompt_context)
}

/// System and user prompts for a fix suggestion
pub fn fix_prompts(anomaly: &Anomaly, file_content: &str) -> (String, String) {
    let range = anomaly.location.range;
    let suggestion = anomaly
        .suggestion
        .as_ref()
        .map(|s| format!("Reviewer suggestion: {}", s))
        .unwrap_or_default();

    let context = PromptContext::new()
        .with("TYPE", anomaly.anomaly_type.as_str())
        .with("SEVERITY", anomaly.severity.as_str())
        .with(
            "LINES",
            format!("{}-{}", range.display_start(), range.display_end()),
        )
        .with("TITLE", anomaly.title.clone())
        .with("DESCRIPTION", anomaly.description.clone())
        .with("SUGGESTION", suggestion);

    let language = crate::workspace::language_for_path(&anomaly.location.file);
    let numbered: String = file_content
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>5} | {}\n", i + 1, line))
        .collect();
    let user = format!(
        "File: {}\n\n```{}\n{}```\n",
        anomaly.location.file.display(),
        language,
        numbered
    );

    (render_template(FIX_PROMPT, &context), user)
}
