//! Analysis handlers and the dispatcher that picks one of them.

use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::backend::Backend;
use crate::ee::{self, Expr};
use crate::error::{AnalysisError, BackendError};
use crate::outcome::Outcome;
use crate::region::Region;
use crate::request::{AnalysisModule, AnalysisRequest, Period};

pub mod air_quality;
pub mod flood;
pub mod indices;
pub mod land_cover;
pub mod lst;
pub mod rainfall;
pub mod terrain;
pub mod wildfire;

const MAX_PIXELS: f64 = 1e9;

/// Everything a handler needs for one run.
pub struct Context<'a> {
    pub backend: &'a dyn Backend,
    pub region: &'a Region,
    pub period: Period,
}

impl Context<'_> {
    pub fn roi(&self) -> Expr {
        self.region.roi.clone()
    }

    /// `id` filtered to the region and the selected month.
    pub fn monthly(&self, id: &str) -> Expr {
        ee::image_collection(id)
            .filter_bounds(self.roi())
            .filter_date(self.period.start(), self.period.end())
    }

    pub fn size(&self, collection: &Expr) -> Result<i64, AnalysisError> {
        let value = self.backend.compute(&collection.clone().size())?;
        value.as_i64().ok_or_else(|| {
            BackendError::Decode(format!("collection size was {value}")).into()
        })
    }

    /// Zonal statistics of `image` over the region.
    pub fn reduce(
        &self,
        image: Expr,
        reducer: Expr,
        scale: f64,
    ) -> Result<Map<String, Value>, AnalysisError> {
        self.reduce_with_limit(image, reducer, scale, MAX_PIXELS)
    }

    pub fn reduce_with_limit(
        &self,
        image: Expr,
        reducer: Expr,
        scale: f64,
        max_pixels: f64,
    ) -> Result<Map<String, Value>, AnalysisError> {
        let value = self
            .backend
            .compute(&image.reduce_region(reducer, self.roi(), scale, max_pixels))?;
        match value {
            Value::Object(stats) => Ok(stats),
            Value::Null => Ok(Map::new()),
            other => Err(BackendError::Decode(format!("reduceRegion returned {other}")).into()),
        }
    }

    /// Download links are a convenience; failures are logged and dropped.
    pub fn try_download(&self, image: &Expr, name: String, scale: f64) -> Option<String> {
        let request = crate::backend::DownloadRequest {
            name,
            scale,
            region: self.roi().geometry().bounds(),
        };
        match self.backend.download_url(image, &request) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(action = "download", component = "analysis", error = %e, "Download link unavailable");
                None
            }
        }
    }
}

/// Reads a numeric statistic; missing keys and nulls are `None`.
pub fn number(stats: &Map<String, Value>, key: &str) -> Result<Option<f64>, AnalysisError> {
    match stats.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(other) => Err(AnalysisError::NotANumber {
            key: key.to_string(),
            found: other.to_string(),
        }),
    }
}

/// File-name friendly form of a place name.
pub fn slug(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Runs exactly one handler for `request`. Handler errors become
/// [`Outcome::Failure`] here and never escape.
pub fn dispatch(backend: &dyn Backend, request: &AnalysisRequest) -> Outcome {
    let start_time = Instant::now();
    let module = request.module;
    info!(
        action = "start",
        component = "dispatcher",
        module = %module,
        region = %request.region.name,
        period = %request.period,
        "Running analysis"
    );

    let ctx = Context {
        backend,
        region: &request.region,
        period: request.period,
    };
    let result = match module {
        AnalysisModule::Terrain => terrain::run(&ctx),
        AnalysisModule::Flood => flood::run(&ctx),
        AnalysisModule::SpectralIndices(index) => indices::run(&ctx, index),
        AnalysisModule::AirQuality(pollutant) => air_quality::run(&ctx, pollutant),
        AnalysisModule::LandSurfaceTemperature => lst::run(&ctx),
        AnalysisModule::Wildfire => wildfire::run(&ctx),
        AnalysisModule::LandCover => land_cover::run(&ctx),
        AnalysisModule::Rainfall => rainfall::run(&ctx),
    };

    let outcome = result.unwrap_or_else(|error| {
        error!(action = "complete", component = "dispatcher", module = %module, error = %error, "Analysis failed");
        Outcome::Failure { module, error }
    });

    match &outcome {
        Outcome::Success(result) => info!(
            action = "complete",
            component = "dispatcher",
            metrics = result.metrics.len(),
            layers = result.layers.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Analysis completed"
        ),
        Outcome::Empty { reason, .. } => warn!(
            action = "complete",
            component = "dispatcher",
            reason = %reason,
            duration_ms = start_time.elapsed().as_millis(),
            "Analysis returned no data"
        ),
        Outcome::Failure { .. } => {}
    }
    outcome
}
