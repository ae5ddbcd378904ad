use serde_json::Value;

use super::Context;
use crate::backend::VisParams;
use crate::ee::{self, call, filter, mapper, reducer, strings, Expr};
use crate::error::{AnalysisError, BackendError};
use crate::outcome::{AnalysisResult, MapLayer, Metrics, Outcome};
use crate::request::AnalysisModule;

const SENTINEL2: &str = "COPERNICUS/S2_SR_HARMONIZED";
const WORLD_COVER: &str = "ESA/WorldCover/v200/2021";
const BANDS: [&str; 6] = ["B2", "B3", "B4", "B8", "B11", "B12"];
const TREES: i64 = 100;
const TRAINING_PIXELS: i64 = 1500;
const SEED: i64 = 42;
const STATS_SCALE: f64 = 100.0;

/// WorldCover class value, display name, colour.
const CLASSES: [(i64, &str, &str); 7] = [
    (10, "Trees", "#006400"),
    (20, "Shrubland", "#ffbb22"),
    (30, "Grassland", "#ffff4c"),
    (40, "Cropland", "#f096ff"),
    (50, "Built-up", "#fa0000"),
    (60, "Bare Ground", "#b4b4b4"),
    (80, "Water", "#0064ff"),
];

fn mask_clouds(img: Expr) -> Expr {
    let qa = img.clone().select(&["QA60"]);
    let clear = qa
        .clone()
        .bitwise_and(f64::from(1 << 10))
        .equals(0.0)
        .and(qa.bitwise_and(f64::from(1 << 11)).equals(0.0));
    img.update_mask(clear).divide(10000.0)
}

fn classify(image: Expr, roi: Expr) -> Expr {
    let labels = ee::image(WORLD_COVER).clip(roi.clone());
    let points = call(
        "Image.sample",
        [
            ("image", labels),
            ("region", roi.geometry()),
            ("scale", Expr::from(STATS_SCALE)),
            ("numPixels", Expr::from(TRAINING_PIXELS)),
            ("seed", Expr::from(SEED)),
            ("geometries", Expr::from(true)),
        ],
    );
    let training = call(
        "Image.sampleRegions",
        [
            ("image", image.clone()),
            ("collection", points),
            ("properties", strings(&["Map"])),
            ("scale", Expr::from(10.0)),
        ],
    );
    let classifier = call(
        "Classifier.train",
        [
            (
                "classifier",
                call("Classifier.smileRandomForest", [("numberOfTrees", Expr::from(TREES))]),
            ),
            ("features", training),
            ("classProperty", Expr::from("Map")),
            ("inputProperties", strings(&BANDS)),
        ],
    );
    call("Image.classify", [("image", image), ("classifier", classifier)])
}

/// Area in km² per known class, in class order.
fn class_areas(groups: &Value) -> Result<Vec<(&'static str, f64)>, AnalysisError> {
    let groups = groups
        .as_array()
        .ok_or_else(|| BackendError::Decode(format!("groups was {groups}")))?;

    let mut areas = Vec::new();
    for (value, name, _) in CLASSES {
        let matching: Vec<&Value> = groups
            .iter()
            .filter(|g| g["class"].as_f64().map(|c| c as i64) == Some(value))
            .collect();
        if !matching.is_empty() {
            let total: f64 = matching.iter().filter_map(|g| g["sum"].as_f64()).sum();
            areas.push((name, total / 1e6));
        }
    }
    Ok(areas)
}

pub fn run(ctx: &Context) -> Result<Outcome, AnalysisError> {
    let module = AnalysisModule::LandCover;
    let cloud_free = filter::lt("CLOUDY_PIXEL_PERCENTAGE", 20i64);
    let prepare = |collection: Expr| {
        collection
            .filter(cloud_free.clone())
            .map(mapper(mask_clouds))
            .select_bands(&BANDS)
    };

    let mut collection = prepare(ctx.monthly(SENTINEL2));
    let mut widened = false;
    if ctx.size(&collection)? == 0 {
        collection = prepare(ee::image_collection(SENTINEL2).filter_bounds(ctx.roi()));
        widened = true;
        if ctx.size(&collection)? == 0 {
            return Ok(Outcome::empty(module, "No Sentinel-2 imagery covers this region"));
        }
    }

    let image = collection.median().clip(ctx.roi());
    let classified = classify(image.clone(), ctx.roi());

    let stats = ctx.reduce_with_limit(
        ee::pixel_area().add_bands(classified.clone()),
        reducer::grouped(reducer::sum(), 1, "class"),
        STATS_SCALE,
        1e10,
    )?;
    let areas = match stats.get("groups") {
        Some(groups) => class_areas(groups)?,
        None => Vec::new(),
    };

    let mut metrics = Metrics::new()
        .with("Algorithm", "Random Forest (smileRandomForest)")
        .with("Resolution", "10 meters")
        .with("Training Data", "ESA WorldCover 2021")
        .with(
            "Imagery Window",
            if widened { "All available dates" } else { "Selected month" },
        );
    for (name, km2) in areas {
        metrics.insert(name, format!("{km2:.2} km²"));
    }

    let values: Vec<i64> = CLASSES.iter().map(|(v, _, _)| *v).collect();
    let indices: Vec<i64> = (0..CLASSES.len() as i64).collect();
    let colors: Vec<&'static str> = CLASSES.iter().map(|(_, _, c)| *c).collect();

    let result = AnalysisResult::new(module, metrics)
        .with_layer(MapLayer::new(
            "Reference Imagery",
            image,
            VisParams::range(0.0, 0.3, &[]).with_bands(&["B4", "B3", "B2"]),
        ))
        .with_layer(MapLayer::new(
            "RF Classification",
            classified.remap(&values, &indices),
            VisParams::range(0.0, (CLASSES.len() - 1) as f64, &colors),
        ));
    Ok(Outcome::Success(result))
}
