use super::{number, slug, Context};
use crate::backend::VisParams;
use crate::ee::{self, reducer};
use crate::error::AnalysisError;
use crate::outcome::{AnalysisResult, MapLayer, Metrics, Outcome};
use crate::request::AnalysisModule;

const DEM: &str = "JAXA/ALOS/AW3D30/V3_2";
const SCALE: f64 = 30.0;

pub fn run(ctx: &Context) -> Result<Outcome, AnalysisError> {
    let module = AnalysisModule::Terrain;
    let full_dem = ee::image_collection(DEM).select_bands(&["DSM"]).mosaic();

    // Slope and aspect need metric units.
    let projected = full_dem.clone().reproject("EPSG:3857", SCALE);
    let slope = projected.clone().slope().clip(ctx.roi());
    let aspect = projected.aspect().clip(ctx.roi());
    let dem = full_dem.clip(ctx.roi());
    let hillshade = dem.clone().hillshade();

    let elevation = ctx.reduce(
        dem.clone(),
        reducer::combine(reducer::mean(), reducer::min_max()),
        SCALE,
    )?;
    let (Some(mean), Some(min), Some(max)) = (
        number(&elevation, "DSM_mean")?,
        number(&elevation, "DSM_min")?,
        number(&elevation, "DSM_max")?,
    ) else {
        return Ok(Outcome::empty(module, "No elevation data covers this region"));
    };

    let slope_stats = ctx.reduce(slope.clone(), reducer::mean(), SCALE)?;
    let mean_slope = number(&slope_stats, "slope")?
        .map(|s| format!("{s:.1} degrees"))
        .unwrap_or_else(|| "N/A".to_string());

    let metrics = Metrics::new()
        .with("Mean Elevation", format!("{mean:.0} m"))
        .with("Minimum Elevation", format!("{min:.0} m"))
        .with("Maximum Elevation", format!("{max:.0} m"))
        .with("Mean Slope", mean_slope)
        .with("Data Source", "JAXA ALOS AW3D30 (DSM)")
        .with("Resolution", "30 meters");

    let mut result = AnalysisResult::new(module, metrics)
        .with_layer(MapLayer::new(
            "Terrain Relief",
            hillshade,
            VisParams {
                min: Some(150.0),
                max: Some(255.0),
                ..VisParams::default()
            }
            .with_opacity(0.6),
        ))
        .with_layer(MapLayer::new(
            "Elevation (m)",
            dem.clone(),
            VisParams::range(
                400.0,
                1200.0,
                &["#313695", "#74add1", "#ffffbf", "#f46d43", "#a50026"],
            ),
        ))
        .with_layer(MapLayer::new(
            "Slope (degrees)",
            slope,
            VisParams::range(0.0, 30.0, &["#ffffff", "#f1c40f", "#e67e22", "#c0392b"]),
        ))
        .with_layer(MapLayer::new(
            "Aspect (degrees)",
            aspect,
            VisParams::range(
                0.0,
                360.0,
                &["#e74c3c", "#f1c40f", "#2ecc71", "#3498db", "#e74c3c"],
            ),
        ));
    result.download_url = ctx.try_download(&dem, format!("DEM_{}", slug(&ctx.region.name)), SCALE);

    Ok(Outcome::Success(result))
}
