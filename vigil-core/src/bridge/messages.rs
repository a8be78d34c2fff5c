//! UI message contract
//!
//! Envelopes are `{"type": ..., "payload": ...}` JSON objects. Line numbers
//! crossing this boundary are 1-indexed.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::anomaly::{Anomaly, AnomalyType, Severity};
use crate::conversation::Message;

/// Command sent by the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum UiCommand {
    Ready,
    AnalyzeRepository,
    /// Targets the active editor file when the payload or its file is absent
    AnalyzeFile(Option<FileTarget>),
    SelectAnomaly {
        anomaly_id: String,
    },
    SendMessage {
        content: String,
    },
    ApplyFix {
        anomaly_id: String,
    },
    OpenFile {
        file: PathBuf,
        #[serde(default)]
        line: Option<u32>,
    },
    OpenSettings,
}

impl UiCommand {
    pub fn analyze_file(file: Option<PathBuf>) -> Self {
        UiCommand::AnalyzeFile(Some(FileTarget { file }))
    }
}

/// `analyzeFile` payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Event sent to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum UiEvent {
    InitialState {
        anomalies: Vec<AnomalyView>,
        is_configured: bool,
    },
    AnalysisStarted,
    AnalysisProgress {
        completed: usize,
        total: usize,
        fraction: f64,
    },
    AnalysisComplete {
        anomalies: Vec<AnomalyView>,
        analyzed_files: Vec<PathBuf>,
    },
    AnalysisError {
        error: String,
    },
    AnomaliesUpdated {
        anomalies: Vec<AnomalyView>,
    },
    ConversationUpdated {
        anomaly_id: String,
        anomaly: AnomalyView,
        messages: Vec<Message>,
    },
    ChatLoading {
        loading: bool,
    },
    ChatError {
        error: String,
    },
}

/// Anomaly as rendered by the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyView {
    pub id: String,
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub file: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default)]
    pub has_fix: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl From<&Anomaly> for AnomalyView {
    fn from(anomaly: &Anomaly) -> Self {
        Self {
            id: anomaly.id.clone(),
            anomaly_type: anomaly.anomaly_type,
            severity: anomaly.severity,
            file: anomaly.location.file.clone(),
            start_line: anomaly.location.range.display_start(),
            end_line: anomaly.location.range.display_end(),
            title: anomaly.title.clone(),
            description: anomaly.description.clone(),
            suggestion: anomaly.suggestion.clone(),
            snippet: anomaly.location.snippet.clone(),
            has_fix: anomaly.fix.is_some(),
            conversation_id: anomaly.conversation_id.clone(),
        }
    }
}

/// Views for a list of anomalies
pub fn views(anomalies: &[Anomaly]) -> Vec<AnomalyView> {
    anomalies.iter().map(AnomalyView::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{LineRange, Location};

    #[test]
    fn test_command_envelopes() {
        let ready: UiCommand = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, UiCommand::Ready);

        let select: UiCommand =
            serde_json::from_str(r#"{"type":"selectAnomaly","payload":{"anomalyId":"a1"}}"#)
                .unwrap();
        assert_eq!(
            select,
            UiCommand::SelectAnomaly {
                anomaly_id: "a1".to_string()
            }
        );

        let open: UiCommand =
            serde_json::from_str(r#"{"type":"openFile","payload":{"file":"src/a.rs"}}"#).unwrap();
        assert_eq!(
            open,
            UiCommand::OpenFile {
                file: PathBuf::from("src/a.rs"),
                line: None
            }
        );

        let analyze: UiCommand =
            serde_json::from_str(r#"{"type":"analyzeFile","payload":{}}"#).unwrap();
        assert_eq!(analyze, UiCommand::analyze_file(None));

        let bare: UiCommand = serde_json::from_str(r#"{"type":"analyzeFile"}"#).unwrap();
        assert_eq!(bare, UiCommand::AnalyzeFile(None));

        let targeted: UiCommand =
            serde_json::from_str(r#"{"type":"analyzeFile","payload":{"file":"src/a.rs"}}"#)
                .unwrap();
        assert_eq!(
            targeted,
            UiCommand::analyze_file(Some(PathBuf::from("src/a.rs")))
        );

        assert!(serde_json::from_str::<UiCommand>(r#"{"type":"explode"}"#).is_err());
    }

    #[test]
    fn test_event_envelope() {
        let event = UiEvent::InitialState {
            anomalies: Vec::new(),
            is_configured: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "initialState");
        assert_eq!(json["payload"]["isConfigured"], false);

        let loading = serde_json::to_value(UiEvent::ChatLoading { loading: true }).unwrap();
        assert_eq!(loading["payload"]["loading"], true);
    }

    #[test]
    fn test_anomaly_view_roundtrip() {
        let anomaly = Anomaly::new(
            AnomalyType::Performance,
            Severity::Warning,
            Location::new("src/app.ts", LineRange::new(4, 6)).with_snippet("for (...) {}"),
            "Quadratic loop",
            "Nested iteration over the same list",
        )
        .with_suggestion("Index by id first");

        let view = AnomalyView::from(&anomaly);
        let json = serde_json::to_string(&view).unwrap();
        let back: AnomalyView = serde_json::from_str(&json).unwrap();

        assert_eq!(back, view);
        assert_eq!(back.id, anomaly.id);
        assert_eq!(back.anomaly_type, AnomalyType::Performance);
        assert_eq!(back.severity, Severity::Warning);
        assert_eq!(back.file, PathBuf::from("src/app.ts"));
        assert_eq!((back.start_line, back.end_line), (5, 7));
        assert_eq!(back.suggestion.as_deref(), Some("Index by id first"));
        assert_eq!(back.snippet.as_deref(), Some("for (...) {}"));
        assert!(json.contains("\"type\":\"performance\""));
        assert!(json.contains("\"startLine\":5"));
    }
}
