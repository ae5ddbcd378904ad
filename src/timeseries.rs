//! Monthly regional means across one year.

use rayon::prelude::*;
use std::time::Instant;
use tracing::{info, warn};

use crate::analysis::air_quality;
use crate::analysis::lst::{LST_BAND, LST_SCALE, MODIS_LST};
use crate::backend::Backend;
use crate::ee::{self, reducer, Expr};
use crate::error::AnalysisError;
use crate::request::{AnalysisModule, Period};

const MODIS_NDVI: &str = "MODIS/061/MOD13Q1";
const NDVI_SCALE: f64 = 0.0001;
const SERIES_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSource {
    pub collection: &'static str,
    pub band: &'static str,
    pub factor: f64,
    pub label: String,
}

/// The monthly product charted for a module, if it has one.
pub fn source_for(module: AnalysisModule) -> Option<SeriesSource> {
    match module {
        AnalysisModule::AirQuality(pollutant) => {
            let (collection, band) = air_quality::dataset(pollutant);
            Some(SeriesSource {
                collection,
                band,
                factor: 1.0,
                label: format!("{} Concentration (mol/m²)", pollutant.label()),
            })
        }
        AnalysisModule::SpectralIndices(_) => Some(SeriesSource {
            collection: MODIS_NDVI,
            band: "NDVI",
            factor: NDVI_SCALE,
            label: "Vegetation Index (NDVI)".to_string(),
        }),
        AnalysisModule::LandSurfaceTemperature => Some(SeriesSource {
            collection: MODIS_LST,
            band: LST_BAND,
            factor: LST_SCALE,
            label: "Surface Temperature (K)".to_string(),
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub label: String,
    pub year: i32,
    /// (month, value); months without data are absent.
    pub points: Vec<(u32, f64)>,
}

impl TimeSeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn month_mean(
    backend: &dyn Backend,
    source: &SeriesSource,
    roi: &Expr,
    period: Period,
) -> Result<Option<f64>, AnalysisError> {
    let image = ee::image_collection(source.collection)
        .select_bands(&[source.band])
        .filter_date(period.start(), period.end())
        .mean()
        .multiply(source.factor);
    let stats =
        backend.compute(&image.reduce_region(reducer::mean(), roi.clone(), SERIES_SCALE, 1e9))?;
    Ok(stats
        .as_object()
        .and_then(|s| s.values().next())
        .and_then(|v| v.as_f64()))
}

/// Extracts twelve monthly means, `workers` months at a time.
pub fn extract(
    backend: &dyn Backend,
    roi: &Expr,
    module: AnalysisModule,
    year: i32,
    workers: usize,
) -> Result<TimeSeries, AnalysisError> {
    let start_time = Instant::now();
    let source = source_for(module)
        .ok_or_else(|| AnalysisError::TimeSeriesUnsupported(module.to_string()))?;
    info!(
        action = "start",
        component = "time_series",
        collection = source.collection,
        year,
        worker_count = workers,
        "Extracting monthly series"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| AnalysisError::Other(e.to_string()))?;

    let months: Vec<(u32, Result<Option<f64>, AnalysisError>)> = pool.install(|| {
        Period::months_of_year(year)
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|period| (period.month(), month_mean(backend, &source, roi, period)))
            .collect()
    });

    let mut points = Vec::new();
    let mut first_error = None;
    let mut failed = 0;
    for (month, value) in months {
        match value {
            Ok(Some(v)) => points.push((month, v)),
            Ok(None) => {}
            Err(e) => {
                // A month with no images has no bands to reduce.
                warn!(action = "month", component = "time_series", month, error = %e, "Month skipped");
                failed += 1;
                first_error.get_or_insert(e);
            }
        }
    }
    if failed == 12 {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    info!(
        action = "complete",
        component = "time_series",
        points = points.len(),
        skipped = failed,
        duration_ms = start_time.elapsed().as_millis(),
        "Monthly series extracted"
    );
    Ok(TimeSeries {
        label: source.label,
        year,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::ScriptedBackend;
    use crate::error::BackendError;
    use crate::request::{Pollutant, SpectralIndex};
    use serde_json::json;

    fn roi() -> Expr {
        ee::feature_collection("FAO/GAUL/2015/level1")
    }

    /// The earliest month date in the filter is the month itself; the
    /// exclusive end is the following month.
    fn month_of(expr: &Expr) -> u32 {
        (1..=12)
            .find(|m| {
                let start = Period::new(2023, *m).unwrap().start();
                format!("{expr:?}").contains(&format!("{start:?}"))
            })
            .unwrap()
    }

    #[test]
    fn unsupported_modules_are_reported() {
        let backend = ScriptedBackend::new(|_: &Expr| Ok(json!({})));
        let err = extract(&backend, &roi(), AnalysisModule::Flood, 2023, 2).unwrap_err();
        assert!(matches!(err, AnalysisError::TimeSeriesUnsupported(_)));
        assert!(backend.computed().is_empty());
    }

    #[test]
    fn months_without_values_are_dropped_and_order_kept() {
        let backend = ScriptedBackend::new(|expr: &Expr| {
            let month = month_of(expr);
            if month % 2 == 0 {
                Ok(json!({ "NDVI": null }))
            } else {
                Ok(json!({ "NDVI": month as f64 / 10.0 }))
            }
        });
        let series = extract(
            &backend,
            &roi(),
            AnalysisModule::SpectralIndices(SpectralIndex::Ndwi),
            2023,
            4,
        )
        .unwrap();

        assert_eq!(series.label, "Vegetation Index (NDVI)");
        assert_eq!(series.points.len(), 6);
        let months: Vec<u32> = series.points.iter().map(|(m, _)| *m).collect();
        assert_eq!(months, vec![1, 3, 5, 7, 9, 11]);
        assert_eq!(series.points[1], (3, 0.3));
        assert_eq!(backend.computed().len(), 12);
    }

    #[test]
    fn failing_months_are_skipped() {
        let backend = ScriptedBackend::new(|expr: &Expr| {
            if month_of(expr) > 6 {
                Err(BackendError::Status {
                    status: 400,
                    message: "Image has no bands".to_string(),
                })
            } else {
                Ok(json!({ "NO2_column_number_density": 0.0001 }))
            }
        });
        let series = extract(
            &backend,
            &roi(),
            AnalysisModule::AirQuality(Pollutant::No2),
            2023,
            1,
        )
        .unwrap();
        assert_eq!(series.points.len(), 6);
    }

    #[test]
    fn all_months_failing_is_an_error() {
        let backend = ScriptedBackend::new(|_: &Expr| {
            Err(BackendError::Transport("offline".to_string()))
        });
        let err = extract(
            &backend,
            &roi(),
            AnalysisModule::LandSurfaceTemperature,
            2023,
            3,
        )
        .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::Backend(BackendError::Transport("offline".to_string()))
        );
    }
}
