use super::{number, Context};
use crate::backend::VisParams;
use crate::ee::{mapper, reducer};
use crate::error::AnalysisError;
use crate::outcome::{AnalysisResult, MapLayer, Metrics, Outcome};
use crate::request::AnalysisModule;

pub const MODIS_LST: &str = "MODIS/061/MOD11A1";
pub const LST_BAND: &str = "LST_Day_1km";
/// Raw MOD11A1 digital numbers to Kelvin.
pub const LST_SCALE: f64 = 0.02;
const KELVIN_OFFSET: f64 = 273.15;

pub fn run(ctx: &Context) -> Result<Outcome, AnalysisError> {
    let module = AnalysisModule::LandSurfaceTemperature;
    let collection = ctx.monthly(MODIS_LST).select_bands(&[LST_BAND]);

    if ctx.size(&collection)? == 0 {
        return Ok(Outcome::empty(
            module,
            "No Land Surface Temperature data available for the selected period.",
        ));
    }

    let celsius = collection
        .map(mapper(|img| img.multiply(LST_SCALE).subtract(KELVIN_OFFSET)))
        .mean()
        .clip(ctx.roi());

    let stats = ctx.reduce(
        celsius.clone(),
        reducer::combine(reducer::mean(), reducer::min_max()),
        1000.0,
    )?;
    let Some(mean) = number(&stats, &format!("{LST_BAND}_mean"))? else {
        return Ok(Outcome::empty(module, "All LST pixels were masked for the selected period."));
    };
    let celsius_text = |v: Option<f64>| {
        v.map(|v| format!("{v:.1} °C"))
            .unwrap_or_else(|| "N/A".to_string())
    };

    let metrics = Metrics::new()
        .with("Mean LST", format!("{mean:.1} °C"))
        .with("Minimum LST", celsius_text(number(&stats, &format!("{LST_BAND}_min"))?))
        .with("Maximum LST", celsius_text(number(&stats, &format!("{LST_BAND}_max"))?))
        .with("Sensor", "MODIS Terra (MOD11A1)")
        .with("Resolution", "1 km");

    let result = AnalysisResult::new(module, metrics).with_layer(MapLayer::new(
        "Land Surface Temperature (°C)",
        celsius,
        VisParams::range(
            10.0,
            50.0,
            &["blue", "cyan", "green", "yellow", "orange", "red"],
        ),
    ));
    Ok(Outcome::Success(result))
}
