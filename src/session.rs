use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::outcome::{Metrics, Outcome};
use crate::request::AnalysisRequest;

/// The most recently completed run, kept so a report can be produced
/// without recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRun {
    pub request: AnalysisRequest,
    pub metrics: Metrics,
    pub completed_at: DateTime<Local>,
    pub chart: Option<PathBuf>,
}

/// In-memory state for one invocation.
#[derive(Debug, Default)]
pub struct Session {
    last: Option<CachedRun>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches a completed run, replacing the previous one and its chart.
    /// Failures are not completed runs and leave the cache untouched.
    pub fn record(&mut self, request: &AnalysisRequest, outcome: &Outcome) -> bool {
        let Some(metrics) = outcome.report_metrics() else {
            return false;
        };
        self.last = Some(CachedRun {
            request: request.clone(),
            metrics,
            completed_at: Local::now(),
            chart: None,
        });
        true
    }

    /// Attaches a chart to the cached run. Returns false with nothing cached.
    pub fn attach_chart(&mut self, path: &Path) -> bool {
        match self.last.as_mut() {
            Some(run) => {
                run.chart = Some(path.to_path_buf());
                true
            }
            None => false,
        }
    }

    pub fn last(&self) -> Option<&CachedRun> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::request;
    use crate::error::AnalysisError;
    use crate::outcome::AnalysisResult;
    use crate::request::AnalysisModule;

    fn success(module: AnalysisModule, value: &str) -> Outcome {
        Outcome::Success(AnalysisResult::new(
            module,
            Metrics::new().with("Value", value),
        ))
    }

    #[test]
    fn new_run_replaces_previous_and_clears_chart() {
        let mut session = Session::new();
        let first = request(AnalysisModule::Flood);
        assert!(session.record(&first, &success(AnalysisModule::Flood, "1")));
        assert!(session.attach_chart(Path::new("chart.png")));

        let second = request(AnalysisModule::Rainfall);
        assert!(session.record(&second, &success(AnalysisModule::Rainfall, "2")));

        let cached = session.last().unwrap();
        assert_eq!(cached.request.module, AnalysisModule::Rainfall);
        assert_eq!(cached.metrics.get("Value"), Some("2"));
        assert_eq!(cached.chart, None);
    }

    #[test]
    fn failure_keeps_previous_run() {
        let mut session = Session::new();
        let req = request(AnalysisModule::Flood);
        session.record(&req, &success(AnalysisModule::Flood, "1"));

        let failed = Outcome::Failure {
            module: AnalysisModule::Flood,
            error: AnalysisError::Other("timeout".to_string()),
        };
        assert!(!session.record(&req, &failed));
        assert_eq!(session.last().unwrap().metrics.get("Value"), Some("1"));
    }

    #[test]
    fn chart_needs_a_cached_run() {
        let mut session = Session::new();
        assert!(!session.attach_chart(Path::new("chart.png")));
        assert!(session.last().is_none());
    }
}
