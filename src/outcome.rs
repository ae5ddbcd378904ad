use crate::backend::VisParams;
use crate::ee::Expr;
use crate::error::AnalysisError;
use crate::request::AnalysisModule;

/// Metric label → pre-formatted value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics(Vec<(String, String)>);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `label`, replacing an existing entry in place.
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self.0.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = value,
            None => self.0.push((label, value)),
        }
    }

    pub fn with(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(label, value);
        self
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapLayer {
    pub name: String,
    pub image: Expr,
    pub vis: VisParams,
}

impl MapLayer {
    pub fn new(name: impl Into<String>, image: Expr, vis: VisParams) -> Self {
        Self {
            name: name.into(),
            image,
            vis,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub module: AnalysisModule,
    pub metrics: Metrics,
    pub layers: Vec<MapLayer>,
    pub download_url: Option<String>,
}

impl AnalysisResult {
    pub fn new(module: AnalysisModule, metrics: Metrics) -> Self {
        Self {
            module,
            metrics,
            layers: Vec::new(),
            download_url: None,
        }
    }

    pub fn with_layer(mut self, layer: MapLayer) -> Self {
        self.layers.push(layer);
        self
    }
}

/// What one analysis run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(AnalysisResult),
    /// The remote collection had no data for the period.
    Empty {
        module: AnalysisModule,
        reason: String,
    },
    Failure {
        module: AnalysisModule,
        error: AnalysisError,
    },
}

impl Outcome {
    pub fn empty(module: AnalysisModule, reason: impl Into<String>) -> Self {
        Outcome::Empty {
            module,
            reason: reason.into(),
        }
    }

    pub fn module(&self) -> AnalysisModule {
        match self {
            Outcome::Success(result) => result.module,
            Outcome::Empty { module, .. } | Outcome::Failure { module, .. } => *module,
        }
    }

    /// Metrics to cache for the report; failures have none.
    pub fn report_metrics(&self) -> Option<Metrics> {
        match self {
            Outcome::Success(result) => Some(result.metrics.clone()),
            Outcome::Empty { reason, .. } => Some(Metrics::new().with("Status", reason.clone())),
            Outcome::Failure { .. } => None,
        }
    }
}
