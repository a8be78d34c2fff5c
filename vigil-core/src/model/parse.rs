//! Response parsing
//!
//! Turns raw model output into plain domain data. Nothing here touches the
//! host: anomalies carry paths and 0-indexed ranges only.

use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::anomaly::{Anomaly, AnomalyType, CodeFix, FileEdit, LineRange, Location, Severity};
use crate::{Error, Result};

/// Maximum response length quoted in parse errors
const MAX_QUOTED_RESPONSE_CHARS: usize = 200;

/// Strip a surrounding Markdown code fence, if any
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening fence line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Find the first balanced `{...}` object, ignoring braces inside strings
fn extract_json_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    let mut start_idx = None;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start_idx = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start_idx.map(|start| &text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn quote(text: &str) -> String {
    match text.char_indices().nth(MAX_QUOTED_RESPONSE_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Parse a JSON object out of a model response
///
/// Tries the raw text, then the fence-stripped text, then the first balanced
/// object found in it.
pub fn parse_structured<T: DeserializeOwned>(content: &str) -> Result<T> {
    let stripped = strip_markdown_fences(content);
    let mut candidates = vec![content.trim(), stripped];
    if let Some(object) = extract_json_object(stripped) {
        candidates.push(object);
    }

    let mut last_err = None;
    for candidate in candidates {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_err = Some(e.to_string()),
        }
    }

    Err(Error::Parse(format!(
        "{} in response: {}",
        last_err.unwrap_or_else(|| "no JSON object".to_string()),
        quote(content.trim())
    )))
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    anomalies: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnomaly {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    start_line: Option<i64>,
    #[serde(default)]
    end_line: Option<i64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse an analysis response into anomalies for `file`
///
/// Unknown types map to `code-smell` and unknown severities to `info`. Line
/// numbers are converted to 0-indexed ranges clamped to `content`. Entries
/// without a title or description are dropped.
pub fn parse_anomalies(response: &str, file: &Path, content: &str) -> Result<Vec<Anomaly>> {
    let parsed: AnalysisResponse = parse_structured(response)?;
    let line_count = content.lines().count();

    let mut anomalies = Vec::with_capacity(parsed.anomalies.len());
    for (index, value) in parsed.anomalies.into_iter().enumerate() {
        let raw: RawAnomaly = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(file = %file.display(), index, error = %e, "Skipping malformed anomaly");
                continue;
            }
        };

        let (Some(title), Some(description)) = (non_blank(raw.title), non_blank(raw.description))
        else {
            warn!(file = %file.display(), index, "Skipping anomaly without title or description");
            continue;
        };

        let start_line = raw.start_line.unwrap_or(1);
        let end_line = raw.end_line.unwrap_or(start_line);
        let range = LineRange::from_one_indexed(start_line, end_line, line_count);

        let mut location = Location::new(file, range);
        if let Some(snippet) = range.slice(content) {
            location = location.with_snippet(snippet);
        }

        let mut anomaly = Anomaly::new(
            raw.kind
                .as_deref()
                .map(AnomalyType::from_model)
                .unwrap_or(AnomalyType::CodeSmell),
            raw.severity
                .as_deref()
                .map(Severity::from_model)
                .unwrap_or_default(),
            location,
            title,
            description,
        );
        if let Some(suggestion) = non_blank(raw.suggestion) {
            anomaly = anomaly.with_suggestion(suggestion);
        }
        anomalies.push(anomaly);
    }

    debug!(file = %file.display(), count = anomalies.len(), "Parsed anomalies");
    Ok(anomalies)
}

#[derive(Debug, Deserialize)]
struct FixResponse {
    #[serde(default)]
    description: String,
    edits: Vec<RawEdit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEdit {
    start_line: i64,
    #[serde(default)]
    end_line: Option<i64>,
    replacement: String,
}

/// Parse a fix response for `anomaly`
///
/// Returns `Ok(None)` when the model reports that no safe fix exists.
pub fn parse_fix(response: &str, anomaly: &Anomaly, content: &str) -> Result<Option<CodeFix>> {
    let parsed: FixResponse = parse_structured(response)?;
    if parsed.edits.is_empty() {
        return Ok(None);
    }

    let line_count = content.lines().count();
    let edits = parsed
        .edits
        .into_iter()
        .map(|edit| FileEdit {
            file: anomaly.location.file.clone(),
            range: LineRange::from_one_indexed(
                edit.start_line,
                edit.end_line.unwrap_or(edit.start_line),
                line_count,
            ),
            replacement: edit.replacement,
        })
        .collect();

    let description = if parsed.description.trim().is_empty() {
        format!("Fix: {}", anomaly.title)
    } else {
        parsed.description
    };

    Ok(Some(CodeFix { description, edits }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ten_lines() -> String {
        (1..=10).map(|i| format!("line {}\n", i)).collect()
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_markdown_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_markdown_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_markdown_fences("  {} "), "{}");
    }

    #[test]
    fn test_extract_object_ignores_braces_in_strings() {
        let text = r#"Here you go: {"a": "}{", "b": {"c": 1}} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"a": "}{", "b": {"c": 1}}"#)
        );
        assert_eq!(extract_json_object("no json"), None);
    }

    #[test]
    fn test_parse_five_five_on_ten_lines() {
        let response = r#"{"anomalies":[{"type":"bug","severity":"warning","startLine":5,"endLine":5,"title":"T","description":"D"}]}"#;
        let anomalies = parse_anomalies(response, Path::new("a.rs"), &ten_lines()).unwrap();

        assert_eq!(anomalies.len(), 1);
        let a = &anomalies[0];
        assert_eq!(a.location.range, LineRange::new(4, 4));
        assert_eq!(a.location.snippet.as_deref(), Some("line 5"));
        assert_eq!(a.anomaly_type, AnomalyType::Bug);
        assert_eq!(a.severity, Severity::Warning);
        assert_eq!(a.location.file, PathBuf::from("a.rs"));
    }

    #[test]
    fn test_parse_clamps_end_line() {
        let response = r#"{"anomalies":[{"type":"bug","severity":"error","startLine":9,"endLine":400,"title":"T","description":"D"}]}"#;
        let anomalies = parse_anomalies(response, Path::new("a.rs"), &ten_lines()).unwrap();
        assert_eq!(anomalies[0].location.range, LineRange::new(8, 9));
    }

    #[test]
    fn test_parse_lenient_enums_and_fences() {
        let response = "```json\n{\"anomalies\":[{\"type\":\"weird\",\"severity\":\"critical\",\"startLine\":1,\"endLine\":1,\"title\":\"T\",\"description\":\"D\",\"suggestion\":\"S\"}]}\n```";
        let anomalies = parse_anomalies(response, Path::new("a.rs"), "x\n").unwrap();
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::CodeSmell);
        assert_eq!(anomalies[0].severity, Severity::Info);
        assert_eq!(anomalies[0].suggestion.as_deref(), Some("S"));
    }

    #[test]
    fn test_parse_skips_incomplete_entries() {
        let response = r#"{"anomalies":[
            {"type":"bug","severity":"error","startLine":1,"endLine":1,"title":"","description":"D"},
            {"type":"bug","severity":"error","startLine":1,"endLine":1,"title":"T"},
            "not an object",
            {"title":"Kept","description":"D"}
        ]}"#;
        let anomalies = parse_anomalies(response, Path::new("a.rs"), "x\n").unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].title, "Kept");
        assert_eq!(anomalies[0].location.range, LineRange::new(0, 0));
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        let empty = parse_anomalies(r#"{"anomalies": []}"#, Path::new("a.rs"), "").unwrap();
        assert!(empty.is_empty());

        assert!(matches!(
            parse_anomalies("I could not analyze this", Path::new("a.rs"), ""),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parse_anomalies(r#"{"issues": []}"#, Path::new("a.rs"), ""),
            Err(Error::Parse(_))
        ));
    }

    fn anomaly() -> Anomaly {
        Anomaly::new(
            AnomalyType::Bug,
            Severity::Error,
            Location::new("src/a.rs", LineRange::new(1, 1)),
            "Off by one",
            "D",
        )
    }

    #[test]
    fn test_parse_fix() {
        let response = r#"{"description":"Use inclusive range","edits":[{"startLine":2,"endLine":2,"replacement":"    for i in 0..=n {}"}]}"#;
        let fix = parse_fix(response, &anomaly(), "fn a() {\n    for i in 0..n {}\n}\n")
            .unwrap()
            .unwrap();

        assert_eq!(fix.description, "Use inclusive range");
        assert_eq!(fix.edits.len(), 1);
        assert_eq!(fix.edits[0].file, PathBuf::from("src/a.rs"));
        assert_eq!(fix.edits[0].range, LineRange::new(1, 1));
    }

    #[test]
    fn test_parse_fix_empty_and_garbage() {
        assert!(parse_fix(r#"{"description":"none","edits":[]}"#, &anomaly(), "x\n")
            .unwrap()
            .is_none());
        assert!(matches!(
            parse_fix("Sorry, no idea.", &anomaly(), "x\n"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_parse_error_quotes_response() {
        let err = parse_structured::<serde_json::Value>(&"z".repeat(1000)).unwrap_err();
        assert!(err.to_string().len() < 400);
    }
}
