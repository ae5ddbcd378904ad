use super::{number, Context};
use crate::backend::VisParams;
use crate::ee::{self, filter, reducer};
use crate::error::AnalysisError;
use crate::outcome::{AnalysisResult, MapLayer, Metrics, Outcome};
use crate::request::AnalysisModule;

const SENTINEL1: &str = "COPERNICUS/S1_GRD";
const SRTM: &str = "USGS/SRTMGL1_003";

/// VV backscatter below this is classified as open water.
const WATER_THRESHOLD_DB: f64 = -17.0;
const SPECKLE_RADIUS_M: f64 = 50.0;

/// Hazard class for a flooded area in km².
pub fn hazard_level(flooded_km2: f64) -> &'static str {
    if flooded_km2 > 5.0 {
        "Critical"
    } else if flooded_km2 > 1.0 {
        "Alert"
    } else {
        "Stable"
    }
}

pub fn run(ctx: &Context) -> Result<Outcome, AnalysisError> {
    let module = AnalysisModule::Flood;
    let radar = ctx
        .monthly(SENTINEL1)
        .filter(filter::eq("instrumentMode", "IW"))
        .select_bands(&["VV"]);

    if ctx.size(&radar)? == 0 {
        return Ok(Outcome::empty(module, "No Satellite Coverage"));
    }

    let smoothed = radar.median().clip(ctx.roi()).focal_median(SPECKLE_RADIUS_M);
    let flood_mask = smoothed.lt(WATER_THRESHOLD_DB).rename(&["flood"]);
    let flooded = flood_mask.clone().update_mask(flood_mask);

    // Low, flat terrain is flood prone regardless of what the radar saw.
    let elevation = ee::image(SRTM).clip(ctx.roi());
    let risk_zones = elevation
        .clone()
        .slope()
        .lt(1.5)
        .and(elevation.lt(1200.0));
    let prone_areas = risk_zones.clone().update_mask(risk_zones);

    let stats = ctx.reduce(
        flooded.clone().multiply(ee::pixel_area()),
        reducer::sum(),
        30.0,
    )?;
    let flooded_km2 = number(&stats, "flood")?.unwrap_or(0.0) / 1e6;
    let hazard = hazard_level(flooded_km2);

    let metrics = Metrics::new()
        .with("Submerged Area", format!("{flooded_km2:.2} sq km"))
        .with("Hazard Level", hazard)
        .with("Detection Method", "SAR Backscatter Thresholding")
        .with("Satellite Platform", "Sentinel-1 (VV)")
        .with("Topographic Risk", "Integrated SRTM Elevation");

    let result = AnalysisResult::new(module, metrics)
        .with_layer(MapLayer::new(
            "High-Risk Topography",
            prone_areas,
            VisParams {
                palette: vec!["#FF4B4B"],
                ..VisParams::default()
            }
            .with_opacity(0.4),
        ))
        .with_layer(MapLayer::new(
            "Satellite Detected Water",
            flooded,
            VisParams {
                palette: vec!["#00D4FF"],
                ..VisParams::default()
            },
        ));
    Ok(Outcome::Success(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::{amman, respond};
    use crate::backend::fake::ScriptedBackend;
    use crate::request::Period;
    use serde_json::json;

    #[test]
    fn hazard_thresholds() {
        assert_eq!(hazard_level(0.0), "Stable");
        assert_eq!(hazard_level(1.0), "Stable");
        assert_eq!(hazard_level(1.01), "Alert");
        assert_eq!(hazard_level(5.0), "Alert");
        assert_eq!(hazard_level(5.5), "Critical");
    }

    #[test]
    fn flooded_area_is_reported_in_square_kilometres() {
        let backend = ScriptedBackend::new(respond(4, json!({ "flood": 6_250_000.0 })));
        let region = amman();
        let ctx = Context {
            backend: &backend,
            region: &region,
            period: Period::new(2024, 1).unwrap(),
        };
        let Outcome::Success(result) = run(&ctx).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(result.metrics.get("Submerged Area"), Some("6.25 sq km"));
        assert_eq!(result.metrics.get("Hazard Level"), Some("Critical"));

        let computed = backend.computed();
        assert!(computed[0].mentions("IW"));
    }

    #[test]
    fn null_sum_means_no_flooding() {
        let backend = ScriptedBackend::new(respond(4, json!({ "flood": null })));
        let region = amman();
        let ctx = Context {
            backend: &backend,
            region: &region,
            period: Period::new(2024, 1).unwrap(),
        };
        let Outcome::Success(result) = run(&ctx).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(result.metrics.get("Submerged Area"), Some("0.00 sq km"));
        assert_eq!(result.metrics.get("Hazard Level"), Some("Stable"));
    }

    #[test]
    fn missing_radar_is_empty() {
        let backend = ScriptedBackend::new(respond(0, json!({})));
        let region = amman();
        let ctx = Context {
            backend: &backend,
            region: &region,
            period: Period::new(2024, 1).unwrap(),
        };
        assert_eq!(
            run(&ctx).unwrap(),
            Outcome::empty(AnalysisModule::Flood, "No Satellite Coverage")
        );
        assert_eq!(backend.computed().len(), 1);
    }
}
