//! Anomaly data model
//!
//! An anomaly is a single code issue reported by the model for one analyzed
//! file. Line ranges are stored 0-indexed and inclusive; conversion to the
//! 1-indexed convention used by the model and the UI happens at those edges.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of an anomaly
///
/// Ordering follows rank: `Error < Warning < Info`. A lower rank is more severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    #[default]
    Info,
}

impl Severity {
    /// Numeric rank: error=0, warning=1, info=2
    pub fn rank(self) -> u8 {
        match self {
            Severity::Error => 0,
            Severity::Warning => 1,
            Severity::Info => 2,
        }
    }

    /// Whether an anomaly of this severity is reported under `threshold`
    pub fn passes(self, threshold: Severity) -> bool {
        self.rank() <= threshold.rank()
    }

    /// Map a raw model severity onto the closed set
    ///
    /// Unknown values become `Info`.
    pub fn from_model(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            other => Err(format!(
                "unknown severity '{}', expected error, warning or info",
                other
            )),
        }
    }
}

/// The closed set of anomaly kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyType {
    Bug,
    Security,
    Performance,
    CodeSmell,
    BestPractice,
    ErrorHandling,
    TypeSafety,
    Maintainability,
    Accessibility,
    LogicError,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 10] = [
        AnomalyType::Bug,
        AnomalyType::Security,
        AnomalyType::Performance,
        AnomalyType::CodeSmell,
        AnomalyType::BestPractice,
        AnomalyType::ErrorHandling,
        AnomalyType::TypeSafety,
        AnomalyType::Maintainability,
        AnomalyType::Accessibility,
        AnomalyType::LogicError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyType::Bug => "bug",
            AnomalyType::Security => "security",
            AnomalyType::Performance => "performance",
            AnomalyType::CodeSmell => "code-smell",
            AnomalyType::BestPractice => "best-practice",
            AnomalyType::ErrorHandling => "error-handling",
            AnomalyType::TypeSafety => "type-safety",
            AnomalyType::Maintainability => "maintainability",
            AnomalyType::Accessibility => "accessibility",
            AnomalyType::LogicError => "logic-error",
        }
    }

    /// Map a raw model type onto the closed set
    ///
    /// Unknown values become `CodeSmell`.
    pub fn from_model(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .unwrap_or(AnomalyType::CodeSmell)
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 0-indexed, inclusive line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Build a range from 1-indexed inclusive model lines
    ///
    /// `line_count` is the number of lines in the file. The start is clamped to
    /// 0 and the end to the last line.
    pub fn from_one_indexed(start_line: i64, end_line: i64, line_count: usize) -> Self {
        let last = line_count.saturating_sub(1) as i64;
        let start = start_line.saturating_sub(1).clamp(0, last);
        let end = end_line.saturating_sub(1).clamp(start, last);
        Self {
            start: start as u32,
            end: end as u32,
        }
    }

    /// 1-indexed first line for display
    pub fn display_start(&self) -> u32 {
        self.start + 1
    }

    /// 1-indexed last line for display
    pub fn display_end(&self) -> u32 {
        self.end + 1
    }

    pub fn contains(&self, line: u32) -> bool {
        line >= self.start && line <= self.end
    }

    /// The covered lines of `text`, or `None` when the range starts past the end
    pub fn slice(&self, text: &str) -> Option<String> {
        let lines: Vec<&str> = text
            .lines()
            .skip(self.start as usize)
            .take((self.end - self.start) as usize + 1)
            .collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

/// Where an anomaly sits in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub range: LineRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, range: LineRange) -> Self {
        Self {
            file: file.into(),
            range,
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// A single text replacement over whole lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub file: PathBuf,
    pub range: LineRange,
    pub replacement: String,
}

/// A proposed fix for an anomaly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFix {
    pub description: String,
    pub edits: Vec<FileEdit>,
}

impl CodeFix {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply the edits that target `file` to its text
    ///
    /// Edits are applied bottom-up so earlier ranges stay valid. Ranges past
    /// the end of the text are clamped.
    pub fn apply_to(&self, file: &Path, text: &str) -> String {
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        let trailing_newline = text.ends_with('\n');

        let mut edits: Vec<&FileEdit> = self.edits.iter().filter(|e| e.file == file).collect();
        edits.sort_by(|a, b| b.range.start.cmp(&a.range.start));

        for edit in edits {
            let start = (edit.range.start as usize).min(lines.len());
            let end = (edit.range.end as usize + 1).min(lines.len()).max(start);
            let replacement: Vec<String> = edit.replacement.lines().map(str::to_string).collect();
            lines.splice(start..end, replacement);
        }

        let mut out = lines.join("\n");
        if trailing_newline {
            out.push('\n');
        }
        out
    }
}

/// A single code issue reported for an analyzed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: String,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub location: Location,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<CodeFix>,
}

impl Anomaly {
    /// Create an anomaly with a fresh collision-resistant id
    pub fn new(
        anomaly_type: AnomalyType,
        severity: Severity,
        location: Location,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            anomaly_type,
            severity,
            location,
            title: title.into(),
            description: description.into(),
            suggestion: None,
            related_locations: Vec::new(),
            conversation_id: None,
            fix: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn file(&self) -> &Path {
        &self.location.file
    }

    /// Attach a fix
    pub fn attach_fix(&mut self, fix: CodeFix) {
        self.fix = Some(fix);
    }

    /// Whether `other` reports the same issue at the same place
    ///
    /// Ids differ between analysis runs; this compares what was found.
    pub fn same_finding(&self, other: &Anomaly) -> bool {
        self.location.file == other.location.file
            && self.location.range == other.location.range
            && self.anomaly_type == other.anomaly_type
            && self.title == other.title
    }

    /// Record the conversation opened for this anomaly
    pub fn link_conversation(&mut self, conversation_id: impl Into<String>) {
        self.conversation_id = Some(conversation_id.into());
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}",
            self.location.file.display(),
            self.location.range.display_start(),
            self.severity,
            self.anomaly_type,
            self.title
        )
    }
}

/// Keep anomalies whose severity rank is at or below the threshold rank
pub fn filter_by_severity(anomalies: Vec<Anomaly>, threshold: Severity) -> Vec<Anomaly> {
    anomalies
        .into_iter()
        .filter(|a| a.severity.passes(threshold))
        .collect()
}

/// Outcome of analyzing one or more files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub anomalies: Vec<Anomaly>,
    pub analyzed_files: Vec<PathBuf>,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(anomalies: Vec<Anomaly>, analyzed_files: Vec<PathBuf>) -> Self {
        Self {
            anomalies,
            analyzed_files,
            timestamp: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Combine several results into one
    ///
    /// Analyzed files are deduplicated; the timestamp is the latest of the parts.
    pub fn aggregate<'a>(results: impl IntoIterator<Item = &'a AnalysisResult>) -> Self {
        let mut anomalies = Vec::new();
        let mut analyzed_files = Vec::new();
        let mut seen = HashSet::new();
        let mut timestamp: Option<DateTime<Utc>> = None;

        for result in results {
            anomalies.extend(result.anomalies.iter().cloned());
            for file in &result.analyzed_files {
                if seen.insert(file.clone()) {
                    analyzed_files.push(file.clone());
                }
            }
            timestamp = Some(timestamp.map_or(result.timestamp, |t| t.max(result.timestamp)));
        }

        Self {
            anomalies,
            analyzed_files,
            timestamp: timestamp.unwrap_or_else(Utc::now),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }

    /// Look up an anomaly by id
    pub fn find(&self, id: &str) -> Option<&Anomaly> {
        self.anomalies.iter().find(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anomaly(severity: Severity) -> Anomaly {
        Anomaly::new(
            AnomalyType::Bug,
            severity,
            Location::new("src/lib.rs", LineRange::new(0, 0)),
            "title",
            "description",
        )
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error < Severity::Warning);
        assert!(Severity::Warning < Severity::Info);
        assert_eq!(Severity::Error.rank(), 0);
        assert_eq!(Severity::Warning.rank(), 1);
        assert_eq!(Severity::Info.rank(), 2);
    }

    #[test]
    fn test_filter_by_severity_exact_set() {
        let all = vec![
            anomaly(Severity::Error),
            anomaly(Severity::Warning),
            anomaly(Severity::Info),
        ];

        for threshold in [Severity::Error, Severity::Warning, Severity::Info] {
            let kept = filter_by_severity(all.clone(), threshold);
            let expected: Vec<_> = all
                .iter()
                .filter(|a| a.severity.rank() <= threshold.rank())
                .cloned()
                .collect();
            assert_eq!(kept, expected, "threshold {}", threshold);
        }

        assert_eq!(filter_by_severity(all.clone(), Severity::Error).len(), 1);
        assert_eq!(filter_by_severity(all, Severity::Info).len(), 3);
    }

    #[test]
    fn test_severity_from_model_defaults_to_info() {
        assert_eq!(Severity::from_model("ERROR"), Severity::Error);
        assert_eq!(Severity::from_model(" warning "), Severity::Warning);
        assert_eq!(Severity::from_model("critical"), Severity::Info);
        assert_eq!(Severity::from_model(""), Severity::Info);
    }

    #[test]
    fn test_severity_from_str_is_strict() {
        assert_eq!("warning".parse::<Severity>(), Ok(Severity::Warning));
        assert!("critical".parse::<Severity>().is_err());
    }

    #[test]
    fn test_anomaly_type_from_model() {
        assert_eq!(AnomalyType::from_model("security"), AnomalyType::Security);
        assert_eq!(AnomalyType::from_model("logic_error"), AnomalyType::LogicError);
        assert_eq!(AnomalyType::from_model("Best Practice"), AnomalyType::BestPractice);
        assert_eq!(AnomalyType::from_model("style"), AnomalyType::CodeSmell);
    }

    #[test]
    fn test_line_range_from_one_indexed() {
        assert_eq!(LineRange::from_one_indexed(5, 5, 10), LineRange::new(4, 4));
        // end past the file is clamped to the last line
        assert_eq!(LineRange::from_one_indexed(8, 40, 10), LineRange::new(7, 9));
        // start below 1 is clamped to 0
        assert_eq!(LineRange::from_one_indexed(0, 2, 10), LineRange::new(0, 1));
        // inverted range collapses onto start
        assert_eq!(LineRange::from_one_indexed(6, 3, 10), LineRange::new(5, 5));
        assert_eq!(LineRange::from_one_indexed(3, 4, 0), LineRange::new(0, 0));
    }

    #[test]
    fn test_line_range_slice() {
        let text = "a\nb\nc\nd\n";
        assert_eq!(LineRange::new(1, 2).slice(text).as_deref(), Some("b\nc"));
        assert_eq!(LineRange::new(3, 9).slice(text).as_deref(), Some("d"));
        assert_eq!(LineRange::new(4, 4).slice(text), None);
        assert_eq!(LineRange::new(0, 0).slice(""), None);
    }

    #[test]
    fn test_anomaly_ids_unique() {
        let a = anomaly(Severity::Info);
        let b = anomaly(Severity::Info);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_anomaly_serializes_type_field() {
        let json = serde_json::to_value(anomaly(Severity::Warning)).unwrap();
        assert_eq!(json["type"], "bug");
        assert_eq!(json["severity"], "warning");
        assert!(json.get("suggestion").is_none());
    }

    #[test]
    fn test_code_fix_apply_bottom_up() {
        let file = PathBuf::from("a.rs");
        let fix = CodeFix {
            description: "two edits".to_string(),
            edits: vec![
                FileEdit {
                    file: file.clone(),
                    range: LineRange::new(0, 0),
                    replacement: "first".to_string(),
                },
                FileEdit {
                    file: file.clone(),
                    range: LineRange::new(2, 3),
                    replacement: "third".to_string(),
                },
                FileEdit {
                    file: PathBuf::from("other.rs"),
                    range: LineRange::new(1, 1),
                    replacement: "ignored".to_string(),
                },
            ],
        };

        let out = fix.apply_to(&file, "a\nb\nc\nd\ne\n");
        assert_eq!(out, "first\nb\nthird\ne\n");
    }

    #[test]
    fn test_aggregate_results() {
        let first = AnalysisResult::new(vec![anomaly(Severity::Error)], vec!["a.rs".into()]);
        let second = AnalysisResult::new(
            vec![anomaly(Severity::Info), anomaly(Severity::Warning)],
            vec!["b.rs".into(), "a.rs".into()],
        );

        let combined = AnalysisResult::aggregate([&first, &second]);
        assert_eq!(combined.anomalies.len(), 3);
        assert_eq!(
            combined.analyzed_files,
            vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")]
        );
        assert_eq!(combined.timestamp, first.timestamp.max(second.timestamp));
    }
}
