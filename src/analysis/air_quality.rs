use super::{number, Context};
use crate::backend::VisParams;
use crate::ee::reducer;
use crate::error::AnalysisError;
use crate::outcome::{AnalysisResult, MapLayer, Metrics, Outcome};
use crate::request::{AnalysisModule, Pollutant};

/// Sentinel-5P offline L3 product and band for a pollutant.
pub fn dataset(pollutant: Pollutant) -> (&'static str, &'static str) {
    match pollutant {
        Pollutant::No2 => ("COPERNICUS/S5P/OFFL/L3_NO2", "NO2_column_number_density"),
        Pollutant::Co => ("COPERNICUS/S5P/OFFL/L3_CO", "CO_column_number_density"),
        Pollutant::O3 => ("COPERNICUS/S5P/OFFL/L3_O3", "O3_column_number_density"),
        Pollutant::So2 => ("COPERNICUS/S5P/OFFL/L3_SO2", "SO2_column_number_density"),
    }
}

fn vis_params(pollutant: Pollutant) -> VisParams {
    match pollutant {
        Pollutant::No2 => VisParams::range(
            0.0,
            0.0002,
            &["black", "blue", "purple", "cyan", "green", "yellow", "red"],
        ),
        Pollutant::Co => VisParams::range(0.0, 0.05, &["blue", "cyan", "green", "yellow", "red"]),
        Pollutant::O3 => VisParams::range(0.1, 0.15, &["blue", "green", "yellow", "orange", "red"]),
        Pollutant::So2 => VisParams::range(0.0, 0.0002, &["blue", "red"]),
    }
}

pub fn run(ctx: &Context, pollutant: Pollutant) -> Result<Outcome, AnalysisError> {
    let module = AnalysisModule::AirQuality(pollutant);
    let (collection_id, band) = dataset(pollutant);
    let collection = ctx.monthly(collection_id).select_bands(&[band]);

    if ctx.size(&collection)? == 0 {
        return Ok(Outcome::empty(module, "No data found for the selected period."));
    }

    let image = collection.mean().clip(ctx.roi());
    let stats = ctx.reduce(
        image.clone(),
        reducer::combine(reducer::mean(), reducer::max()),
        1000.0,
    )?;
    let format = |v: Option<f64>| {
        v.map(|v| format!("{v:.3e} mol/m²"))
            .unwrap_or_else(|| "N/A".to_string())
    };

    let metrics = Metrics::new()
        .with("Pollutant", pollutant.label())
        .with("Mean Column Density", format(number(&stats, &format!("{band}_mean"))?))
        .with("Peak Column Density", format(number(&stats, &format!("{band}_max"))?))
        .with("Satellite", "Sentinel-5P TROPOMI")
        .with("Product", collection_id);

    let result = AnalysisResult::new(module, metrics).with_layer(MapLayer::new(
        format!("{} Concentration", pollutant.label()),
        image,
        vis_params(pollutant),
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
    fn pollutant_selects_its_product() {
        let backend = ScriptedBackend::new(respond(
            12,
            json!({ "CO_column_number_density_mean": 0.0312 }),
        ));
        let region = amman();
        let ctx = Context {
            backend: &backend,
            region: &region,
            period: Period::new(2023, 7).unwrap(),
        };
        let Outcome::Success(result) = run(&ctx, Pollutant::Co).unwrap() else {
            panic!("expected success");
        };

        assert_eq!(result.metrics.get("Pollutant"), Some("CO"));
        assert_eq!(result.metrics.get("Mean Column Density"), Some("3.120e-2 mol/m²"));
        assert_eq!(result.metrics.get("Peak Column Density"), Some("N/A"));
        assert!(backend.computed()[0].mentions("COPERNICUS/S5P/OFFL/L3_CO"));
    }
}
