use super::{number, Context};
use crate::backend::VisParams;
use crate::ee::{self, reducer};
use crate::error::AnalysisError;
use crate::outcome::{AnalysisResult, MapLayer, Metrics, Outcome};
use crate::request::AnalysisModule;

const GPM: &str = "NASA/GPM_L3/IMERG_V06";
const BAND: &str = "precipitationCal";
/// Half-hourly mm/hr rates summed over a month become mm.
const HALF_HOUR: f64 = 0.5;

pub fn run(ctx: &Context) -> Result<Outcome, AnalysisError> {
    let module = AnalysisModule::Rainfall;
    let collection = ee::image_collection(GPM)
        .filter_date(ctx.period.start(), ctx.period.end())
        .select_bands(&[BAND]);

    if ctx.size(&collection)? == 0 {
        return Ok(Outcome::empty(
            module,
            format!(
                "No rainfall data available for {} yet; GPM final products lag about 3 months",
                ctx.period
            ),
        ));
    }

    let total = collection.sum().multiply(HALF_HOUR).clip(ctx.roi());
    let stats = ctx.reduce(
        total.clone(),
        reducer::combine(reducer::mean(), reducer::max()),
        10_000.0,
    )?;
    let mean = number(&stats, &format!("{BAND}_mean"))?.unwrap_or(0.0);
    let max = number(&stats, &format!("{BAND}_max"))?.unwrap_or(0.0);

    let metrics = Metrics::new()
        .with("Average Rainfall", format!("{mean:.2} mm"))
        .with("Max Rainfall", format!("{max:.2} mm"))
        .with("Data Source", "NASA GPM IMERG (V06)");

    let result = AnalysisResult::new(module, metrics).with_layer(MapLayer::new(
        "Rainfall (mm)",
        total,
        VisParams::range(0.0, 100.0, &["white", "blue"]),
    ));
    Ok(Outcome::Success(result))
}
