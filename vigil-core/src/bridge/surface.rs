//! Editor-native surfaces
//!
//! Diagnostics markers and inline decorations are derived from the same
//! anomaly set the UI shows. The host implements [`EditorSurface`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::anomaly::{Anomaly, LineRange, Severity};
use crate::Result;

/// Source tag attached to every diagnostic
pub const DIAGNOSTIC_SOURCE: &str = "vigil";

/// A problem marker over a 0-indexed line range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub range: LineRange,
    pub severity: Severity,
    pub message: String,
    /// Anomaly type, shown as the diagnostic code
    pub code: String,
    pub source: &'static str,
}

impl From<&Anomaly> for Diagnostic {
    fn from(anomaly: &Anomaly) -> Self {
        let message = match &anomaly.suggestion {
            Some(suggestion) => format!("{}: {}\n{}", anomaly.title, anomaly.description, suggestion),
            None => format!("{}: {}", anomaly.title, anomaly.description),
        };
        Self {
            range: anomaly.location.range,
            severity: anomaly.severity,
            message,
            code: anomaly.anomaly_type.to_string(),
            source: DIAGNOSTIC_SOURCE,
        }
    }
}

/// An inline hint rendered after the first line of an anomaly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub line: u32,
    pub severity: Severity,
    pub text: String,
    pub anomaly_id: String,
}

impl From<&Anomaly> for Decoration {
    fn from(anomaly: &Anomaly) -> Self {
        Self {
            line: anomaly.location.range.start,
            severity: anomaly.severity,
            text: anomaly.title.clone(),
            anomaly_id: anomaly.id.clone(),
        }
    }
}

/// Host editor capabilities used by the bridge
#[async_trait]
pub trait EditorSurface: Send + Sync {
    /// Replace all diagnostics for one file; an empty list clears them
    fn set_diagnostics(&self, file: &Path, diagnostics: Vec<Diagnostic>);

    /// Replace all decorations for one file; an empty list clears them
    fn set_decorations(&self, file: &Path, decorations: Vec<Decoration>);

    /// File shown in the active editor, if any
    fn active_file(&self) -> Option<PathBuf>;

    /// Reveal a file, optionally at a 1-indexed line
    async fn open_file(&self, file: &Path, line: Option<u32>) -> Result<()>;

    /// Show the settings page
    fn open_settings(&self);

    /// Surface an error to the user; `offer_settings` adds a shortcut to settings
    fn show_error(&self, message: &str, offer_settings: bool);
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{AnomalyType, Location};

    #[test]
    fn test_diagnostic_from_anomaly() {
        let anomaly = Anomaly::new(
            AnomalyType::ErrorHandling,
            Severity::Warning,
            Location::new("a.go", LineRange::new(2, 3)),
            "Ignored error",
            "The error from Close is dropped",
        )
        .with_suggestion("Check the returned error");

        let diagnostic = Diagnostic::from(&anomaly);
        assert_eq!(diagnostic.range, LineRange::new(2, 3));
        assert_eq!(diagnostic.code, "error-handling");
        assert_eq!(diagnostic.source, "vigil");
        assert!(diagnostic.message.starts_with("Ignored error: The error"));
        assert!(diagnostic.message.ends_with("Check the returned error"));

        let decoration = Decoration::from(&anomaly);
        assert_eq!(decoration.line, 2);
        assert_eq!(decoration.anomaly_id, anomaly.id);
    }
}
