use super::{number, slug, Context};
use crate::backend::VisParams;
use crate::ee::reducer;
use crate::error::AnalysisError;
use crate::outcome::{AnalysisResult, MapLayer, Metrics, Outcome};
use crate::request::AnalysisModule;
use crate::utils::format_number;

const FIRMS: &str = "FIRMS";
/// Brightness temperature band, Kelvin.
const BRIGHTNESS_BAND: &str = "T21";
/// Export scale in metres.
const DOWNLOAD_SCALE: f64 = 5000.0;

pub fn run(ctx: &Context) -> Result<Outcome, AnalysisError> {
    let module = AnalysisModule::Wildfire;
    let fires = ctx.monthly(FIRMS).select_bands(&[BRIGHTNESS_BAND]);
    let hotspots = ctx.size(&fires)?;

    let mut metrics = Metrics::new()
        .with("Detected Hotspots", format!("{} points", format_number(hotspots as u64)))
        .with("Data Source", "NASA FIRMS (MODIS/VIIRS)");

    // No detections is a finding, not missing data.
    if hotspots == 0 {
        metrics.insert("Max Brightness Temp", "N/A");
        metrics.insert(
            "Status",
            format!(
                "No active wildfires were detected in {} during {}",
                ctx.region.name, ctx.period
            ),
        );
        return Ok(Outcome::Success(AnalysisResult::new(module, metrics)));
    }

    let max_temp = fires.max().clip(ctx.roi());
    let stats = ctx.reduce(max_temp.clone(), reducer::max(), 1000.0)?;
    let brightness = number(&stats, BRIGHTNESS_BAND)?
        .map(|k| format!("{k:.1} K"))
        .unwrap_or_else(|| "N/A".to_string());
    metrics.insert("Max Brightness Temp", brightness);
    metrics.insert("Status", "Active fire detections present");

    let mut result = AnalysisResult::new(module, metrics).with_layer(MapLayer::new(
        "Active Fires",
        max_temp.clone(),
        VisParams::range(300.0, 500.0, &["yellow", "orange", "red"]),
    ));
    result.download_url = ctx.try_download(
        &max_temp,
        format!(
            "Wildfire_{}_{}_{}",
            slug(&ctx.region.name),
            ctx.period.year(),
            ctx.period.month()
        ),
        DOWNLOAD_SCALE,
    );
    Ok(Outcome::Success(result))
}
