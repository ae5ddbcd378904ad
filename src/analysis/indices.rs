use super::{number, Context};
use crate::backend::VisParams;
use crate::ee::{mapper, reducer, Expr};
use crate::error::AnalysisError;
use crate::outcome::{AnalysisResult, MapLayer, Metrics, Outcome};
use crate::request::{AnalysisModule, SpectralIndex};

const LANDSAT: &str = "LANDSAT/LC08/C02/T1_L2";
const WIDENED_MONTHS: u32 = 6;

fn scale_reflectance(img: Expr) -> Expr {
    let optical = img.clone().select(&["SR_B."]).multiply(0.0000275).add(-0.2);
    img.add_bands_overwrite(optical)
}

/// Drops cloud (bit 3) and cloud-shadow (bit 4) pixels.
fn mask_clouds(img: Expr) -> Expr {
    let qa = img.clone().select(&["QA_PIXEL"]);
    let clear = qa
        .clone()
        .bitwise_and(f64::from(1 << 3))
        .equals(0.0)
        .and(qa.bitwise_and(f64::from(1 << 4)).equals(0.0));
    img.update_mask(clear)
}

/// Band pair for the normalized difference, and display parameters.
fn definition(index: SpectralIndex) -> ((&'static str, &'static str), VisParams) {
    match index {
        SpectralIndex::Ndvi => (
            ("SR_B5", "SR_B4"),
            VisParams::range(-0.1, 0.7, &["#FF0000", "#FFFF00", "#008000"]),
        ),
        SpectralIndex::Ndwi => (
            ("SR_B5", "SR_B6"),
            VisParams::range(-0.5, 0.5, &["brown", "white", "blue"]),
        ),
        SpectralIndex::Ndbi => (
            ("SR_B6", "SR_B5"),
            VisParams::range(-0.3, 0.3, &["green", "white", "red"]),
        ),
        SpectralIndex::Mndwi => (
            ("SR_B3", "SR_B6"),
            VisParams::range(-0.6, 0.2, &["white", "blue"]),
        ),
    }
}

pub fn run(ctx: &Context, index: SpectralIndex) -> Result<Outcome, AnalysisError> {
    let module = AnalysisModule::SpectralIndices(index);
    let prepare = |collection: Expr| {
        collection
            .map(mapper(mask_clouds))
            .map(mapper(scale_reflectance))
    };

    let mut collection = prepare(ctx.monthly(LANDSAT));
    let mut widened = false;
    if ctx.size(&collection)? == 0 {
        collection = prepare(
            crate::ee::image_collection(LANDSAT)
                .filter_bounds(ctx.roi())
                .filter_date(ctx.period.widened_start(WIDENED_MONTHS), ctx.period.end()),
        );
        widened = true;
        if ctx.size(&collection)? == 0 {
            return Ok(Outcome::empty(
                module,
                format!("No Landsat scenes within {WIDENED_MONTHS} months of {}", ctx.period),
            ));
        }
    }

    let image = collection.median().clip(ctx.roi());
    let ((first, second), vis) = definition(index);
    let result_image = image
        .clone()
        .normalized_difference(first, second)
        .rename(&["Index"]);

    let stats = ctx.reduce(
        result_image.clone(),
        reducer::combine(reducer::mean(), reducer::min_max()),
        30.0,
    )?;
    let Some(mean) = number(&stats, "Index_mean")? else {
        return Ok(Outcome::empty(module, "No cloud-free pixels for the selected period"));
    };
    let value = |v: Option<f64>| {
        v.map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "N/A".to_string())
    };

    let metrics = Metrics::new()
        .with("Selected Index", index.label())
        .with("Mean Value", format!("{mean:.4}"))
        .with("Minimum Value", value(number(&stats, "Index_min")?))
        .with("Maximum Value", value(number(&stats, "Index_max")?))
        .with("Satellite", "Landsat 8-9 OLI")
        .with("Spatial Resolution", "30 meters")
        .with("Atmospheric Correction", "LaSRC (Level 2)")
        .with(
            "Search Window",
            if widened {
                format!("Extended to {WIDENED_MONTHS} months")
            } else {
                "Selected month".to_string()
            },
        );

    let result = AnalysisResult::new(module, metrics)
        .with_layer(MapLayer::new(
            "Natural Color",
            image,
            VisParams::range(0.0, 0.3, &[]).with_bands(&["SR_B4", "SR_B3", "SR_B2"]),
        ))
        .with_layer(MapLayer::new(
            format!("{} ({})", index.label(), index.description()),
            result_image,
            vis,
        ));
    Ok(Outcome::Success(result))
}
