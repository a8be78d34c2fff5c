//! Analysis engine
//!
//! Selects files, gathers related context, calls the model per file, applies
//! the severity threshold and caches each file's result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::anomaly::{filter_by_severity, AnalysisResult, Anomaly};
use crate::config::AnalysisConfig;
use crate::locks::KeyedLocks;
use crate::model::{AnalysisContext, ModelClient};
use crate::rules::RuleSet;
use crate::workspace::{language_for_path, Workspace, SCAN_EXTENSIONS};
use crate::{Error, Result};

use super::cache::{FileStatus, ResultCache};
use super::related::find_related_files;

/// Progress of a repository scan, reported after each file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub completed: usize,
    pub total: usize,
    pub file: PathBuf,
    pub succeeded: bool,
}

impl ScanProgress {
    /// Completed share of the scan in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Receiver of scan progress
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &ScanProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&ScanProgress) + Send + Sync,
{
    fn report(&self, progress: &ScanProgress) {
        self(progress)
    }
}

/// Sink that discards progress
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: &ScanProgress) {}
}

/// Orchestrates per-file and repository analysis
pub struct AnalysisEngine {
    client: ModelClient,
    workspace: Arc<dyn Workspace>,
    rules: RuleSet,
    settings: AnalysisConfig,
    cache: ResultCache,
    locks: KeyedLocks,
}

impl AnalysisEngine {
    pub fn new(
        client: ModelClient,
        workspace: Arc<dyn Workspace>,
        rules: RuleSet,
        settings: AnalysisConfig,
    ) -> Self {
        Self {
            client,
            workspace,
            rules,
            settings,
            cache: ResultCache::new(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn client(&self) -> &ModelClient {
        &self.client
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn settings(&self) -> &AnalysisConfig {
        &self.settings
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    /// Current status of a file in the cache
    pub fn status(&self, path: &Path) -> FileStatus {
        self.cache.status(&self.workspace.normalize(path))
    }

    /// Analyze one file, replacing its cached result
    ///
    /// Returns the anomalies that pass the configured severity threshold.
    /// Cache entries and anomaly locations use the workspace-relative path,
    /// however the caller spelled it.
    pub async fn analyze_file(&self, path: &Path) -> Result<Vec<Anomaly>> {
        self.analyze_file_cancellable(path, &CancellationToken::new())
            .await
    }

    /// [`analyze_file`](Self::analyze_file) that gives up with
    /// [`Error::Cancelled`] once `cancel` fires
    ///
    /// A cancelled run marks the file failed and keeps its last result.
    pub async fn analyze_file_cancellable(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<Anomaly>> {
        if !self.client.is_configured() {
            return Err(Error::NotConfigured);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let path = self.workspace.normalize(path);
        let key = path.to_string_lossy();
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.locks.lock(&key) => guard,
        };

        self.cache.begin(&path);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            outcome = self.run_analysis(&path) => outcome,
        };
        match outcome {
            Ok(anomalies) => {
                self.cache.store(
                    &path,
                    AnalysisResult::new(anomalies.clone(), vec![path.clone()]),
                );
                info!(file = %path.display(), anomalies = anomalies.len(), "File analyzed");
                Ok(anomalies)
            }
            Err(e) => {
                self.cache.fail(&path, e.to_string());
                Err(e)
            }
        }
    }

    async fn run_analysis(&self, path: &Path) -> Result<Vec<Anomaly>> {
        let content = self.workspace.read_document(path).await?;
        let language = language_for_path(path);
        let related_files = find_related_files(self.workspace.as_ref(), path, &content).await;

        let context = AnalysisContext {
            file_name: path.to_path_buf(),
            language: language.to_string(),
            file_content: content,
            related_files,
        };

        let rules = self.rules.enabled_for(language);
        let anomalies = self.client.analyze(&context, &rules).await?;
        let total = anomalies.len();
        let kept = filter_by_severity(anomalies, self.settings.severity_threshold);
        debug!(
            file = %path.display(),
            total,
            kept = kept.len(),
            threshold = %self.settings.severity_threshold,
            "Applied severity threshold"
        );
        Ok(kept)
    }

    /// Analyze every eligible file in the workspace
    ///
    /// A file that fails is logged and skipped; the aggregate lists only the
    /// files that succeeded. The aggregate itself is not cached.
    pub async fn analyze_repository(
        &self,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        if !self.client.is_configured() {
            return Err(Error::NotConfigured);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let files = self
            .workspace
            .find_files(&SCAN_EXTENSIONS, &self.settings.exclude, self.settings.max_files)
            .await?
            .into_iter()
            .map(|file| self.workspace.normalize(&file))
            .collect::<Vec<_>>();
        let total = files.len();
        let concurrency = self.settings.scan_concurrency.max(1);
        info!(files = total, concurrency, "Starting repository analysis");

        let mut results = std::pin::pin!(stream::iter(files)
            .map(|file| async move {
                let outcome = self.analyze_file_cancellable(&file, cancel).await;
                (file, outcome)
            })
            .buffer_unordered(concurrency));

        let mut anomalies = Vec::new();
        let mut analyzed_files = Vec::new();
        let mut completed = 0;

        while let Some((file, outcome)) = results.next().await {
            if cancel.is_cancelled() {
                // In-flight files settle as cancelled
                while results.next().await.is_some() {}
                info!(completed, total, "Repository analysis cancelled");
                return Err(Error::Cancelled);
            }

            completed += 1;
            let succeeded = match outcome {
                Ok(found) => {
                    anomalies.extend(found);
                    analyzed_files.push(file.clone());
                    true
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Failed to analyze file, continuing");
                    false
                }
            };

            progress.report(&ScanProgress {
                completed,
                total,
                file,
                succeeded,
            });
        }

        info!(
            analyzed = analyzed_files.len(),
            failed = total - analyzed_files.len(),
            anomalies = anomalies.len(),
            "Repository analysis complete"
        );
        Ok(AnalysisResult::new(anomalies, analyzed_files))
    }

    /// Cached result for `path`, or an aggregate of every cached file
    pub fn get_cached_results(&self, path: Option<&Path>) -> Option<AnalysisResult> {
        match path {
            Some(path) => self.cache.get(&self.workspace.normalize(path)),
            None => {
                let all = self.cache.all();
                if all.is_empty() {
                    None
                } else {
                    Some(AnalysisResult::aggregate(&all))
                }
            }
        }
    }

    /// Evict one cached file, or all of them
    pub fn clear_cache(&self, path: Option<&Path>) {
        let path = path.map(|p| self.workspace.normalize(p));
        self.cache.clear(path.as_deref());
        debug!(path = ?path, "Cleared analysis cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::Severity;
    use crate::config::ModelConfig;
    use crate::model::testing::ScriptedBackend;
    use crate::workspace::FsWorkspace;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ONE_ERROR_ONE_INFO: &str = r#"{"anomalies":[
        {"type":"bug","severity":"error","startLine":1,"endLine":1,"title":"Bad","description":"D"},
        {"type":"naming","severity":"info","startLine":2,"endLine":2,"title":"Meh","description":"D"}
    ]}"#;

    fn engine(dir: &TempDir, backend: Arc<ScriptedBackend>, settings: AnalysisConfig) -> AnalysisEngine {
        let config = ModelConfig {
            retry_backoff_ms: 1,
            max_retries: 0,
            ..ModelConfig::default()
        };
        AnalysisEngine::new(
            ModelClient::new(backend, config),
            Arc::new(FsWorkspace::new(dir.path())),
            RuleSet::merged(&[], &[]),
            settings,
        )
    }

    fn write(dir: &TempDir, rel: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_analyze_file_filters_and_caches() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "src/a.py", b"x = 1\ny = 2\n");
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ok(ONE_ERROR_ONE_INFO);

        let settings = AnalysisConfig {
            severity_threshold: Severity::Warning,
            ..AnalysisConfig::default()
        };
        let engine = engine(&dir, backend, settings);

        let anomalies = engine.analyze_file(&file).await.unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].title, "Bad");

        let cached = engine.get_cached_results(Some(&file)).unwrap();
        assert_eq!(cached.anomalies, anomalies);
        assert_eq!(cached.analyzed_files, vec![PathBuf::from("src/a.py")]);
        assert_eq!(anomalies[0].file(), Path::new("src/a.py"));
        assert_eq!(engine.status(&file), FileStatus::Cached);

        engine.clear_cache(Some(&file));
        assert!(engine.get_cached_results(Some(&file)).is_none());
    }

    #[tokio::test]
    async fn test_reanalysis_overwrites_cache() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "a.rs", b"fn main() {}\n");
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ok(ONE_ERROR_ONE_INFO);
        backend.push_ok(r#"{"anomalies":[]}"#);
        let engine = engine(&dir, backend, AnalysisConfig::default());

        assert_eq!(engine.analyze_file(&file).await.unwrap().len(), 2);
        assert!(engine.analyze_file(&file).await.unwrap().is_empty());
        assert!(engine.get_cached_results(Some(&file)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_configured() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "a.rs", b"fn main() {}\n");
        let engine = engine(
            &dir,
            Arc::new(ScriptedBackend::unconfigured()),
            AnalysisConfig::default(),
        );

        assert!(matches!(engine.analyze_file(&file).await, Err(Error::NotConfigured)));
        assert!(matches!(
            engine
                .analyze_repository(&NoProgress, &CancellationToken::new())
                .await,
            Err(Error::NotConfigured)
        ));
        assert_eq!(engine.status(&file), FileStatus::Idle);
    }

    #[tokio::test]
    async fn test_failed_analysis_keeps_last_result() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "a.rs", b"fn main() {}\n");
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ok(ONE_ERROR_ONE_INFO);
        backend.push_err(Error::permanent("invalid API key (401)"));
        let engine = engine(&dir, backend, AnalysisConfig::default());

        engine.analyze_file(&file).await.unwrap();
        assert!(engine.analyze_file(&file).await.is_err());
        assert_eq!(engine.status(&file), FileStatus::Failed);
        assert_eq!(engine.get_cached_results(Some(&file)).unwrap().anomalies.len(), 2);
    }

    #[tokio::test]
    async fn test_repository_scan_skips_failing_file() {
        let dir = TempDir::new().unwrap();
        let first = write(&dir, "a.py", b"a = 1\n");
        // Invalid UTF-8 makes the document read fail
        write(&dir, "b.py", &[0xff, 0xfe, 0xfd]);
        let third = write(&dir, "c.py", b"c = 3\n");

        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ok(
            r#"{"anomalies":[{"type":"bug","severity":"error","startLine":1,"endLine":1,"title":"A","description":"D"}]}"#,
        );
        backend.push_ok(
            r#"{"anomalies":[{"type":"bug","severity":"warning","startLine":1,"endLine":1,"title":"C","description":"D"}]}"#,
        );
        let engine = engine(&dir, backend.clone(), AnalysisConfig::default());

        let reports = Mutex::new(Vec::new());
        let sink = |p: &ScanProgress| reports.lock().unwrap().push(p.clone());
        let result = engine
            .analyze_repository(&sink, &CancellationToken::new())
            .await
            .unwrap();

        let titles: Vec<_> = result.anomalies.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
        assert_eq!(
            result.analyzed_files,
            vec![PathBuf::from("a.py"), PathBuf::from("c.py")]
        );
        assert_eq!(engine.status(&first), FileStatus::Cached);
        assert_eq!(engine.status(&third), FileStatus::Cached);
        assert_eq!(backend.requests().len(), 2);

        let reports = reports.into_inner().unwrap();
        assert_eq!(reports.len(), 3);
        assert!(!reports[1].succeeded);
        assert_eq!(reports[2].fraction(), 1.0);
    }

    #[tokio::test]
    async fn test_repository_aggregate_is_not_cached_as_unit() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.rs", b"fn a() {}\n");
        let b = write(&dir, "b.rs", b"fn b() {}\n");
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ok(ONE_ERROR_ONE_INFO);
        backend.push_ok(r#"{"anomalies":[]}"#);
        let engine = engine(&dir, backend, AnalysisConfig::default());

        engine
            .analyze_repository(&NoProgress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(engine.get_cached_results(Some(&a)).unwrap().anomalies.len(), 2);
        assert!(engine.get_cached_results(Some(&b)).unwrap().is_empty());

        let all = engine.get_cached_results(None).unwrap();
        assert_eq!(all.anomalies.len(), 2);
        assert_eq!(
            all.analyzed_files,
            vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")]
        );

        engine.clear_cache(None);
        assert!(engine.get_cached_results(None).is_none());
    }

    #[tokio::test]
    async fn test_path_spellings_share_one_cache_entry() {
        let dir = TempDir::new().unwrap();
        let absolute = write(&dir, "a.rs", b"fn a() {}\n");
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_ok(ONE_ERROR_ONE_INFO);
        backend.push_ok(ONE_ERROR_ONE_INFO);
        let engine = engine(&dir, backend, AnalysisConfig::default());

        let scanned = engine
            .analyze_repository(&NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        let single = engine.analyze_file(Path::new("./a.rs")).await.unwrap();
        assert_eq!(scanned.anomalies[0].file(), single[0].file());

        let all = engine.get_cached_results(None).unwrap();
        assert_eq!(all.analyzed_files, vec![PathBuf::from("a.rs")]);
        assert_eq!(all.anomalies, single);
        assert_eq!(engine.get_cached_results(Some(&absolute)).unwrap().anomalies, single);

        engine.clear_cache(Some(Path::new("a.rs")));
        assert!(engine.get_cached_results(None).is_none());
    }

    #[tokio::test]
    async fn test_repository_scan_cancelled() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.rs", b"fn a() {}\n");
        let engine = engine(&dir, Arc::new(ScriptedBackend::new()), AnalysisConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            engine.analyze_repository(&NoProgress, &cancel).await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_cancel_in_flight_file_keeps_last_result() {
        let dir = TempDir::new().unwrap();
        let file = write(&dir, "a.rs", b"fn a() {}\n");
        let backend = Arc::new(ScriptedBackend::stalling());
        backend.push_ok(ONE_ERROR_ONE_INFO);
        let engine = engine(&dir, backend.clone(), AnalysisConfig::default());
        engine.analyze_file(&file).await.unwrap();

        let cancel = CancellationToken::new();
        let stop = async {
            while backend.requests().len() < 2 {
                tokio::task::yield_now().await;
            }
            cancel.cancel();
        };
        let (outcome, ()) = tokio::join!(engine.analyze_file_cancellable(&file, &cancel), stop);

        assert!(matches!(outcome, Err(Error::Cancelled)));
        assert_eq!(engine.status(&file), FileStatus::Failed);
        assert_eq!(engine.get_cached_results(Some(&file)).unwrap().anomalies.len(), 2);
    }

    #[tokio::test]
    async fn test_repository_scan_respects_max_files() {
        let dir = TempDir::new().unwrap();
        for name in ["a.go", "b.go", "c.go"] {
            write(&dir, name, b"package main\n");
        }
        let backend = Arc::new(ScriptedBackend::new());
        for _ in 0..3 {
            backend.push_ok(r#"{"anomalies":[]}"#);
        }
        let settings = AnalysisConfig {
            max_files: 2,
            scan_concurrency: 2,
            ..AnalysisConfig::default()
        };
        let engine = engine(&dir, backend.clone(), settings);

        let result = engine
            .analyze_repository(&NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.analyzed_files.len(), 2);
        assert_eq!(backend.requests().len(), 2);
    }
}
