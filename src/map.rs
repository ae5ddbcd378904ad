//! Leaflet page showing the tile layers of a result.

use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::{BackendError, MapError};
use crate::outcome::AnalysisResult;

/// Centre of Jordan.
const CENTER: (f64, f64) = (31.24, 36.51);
const ZOOM: u8 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileLayer {
    pub name: String,
    pub url: String,
}

/// Requests a tile template for every layer of `result`. A layer the
/// backend refuses is skipped; if every layer fails the first error is
/// returned.
pub fn tile_layers(
    backend: &dyn Backend,
    result: &AnalysisResult,
) -> Result<Vec<TileLayer>, BackendError> {
    let mut layers = Vec::new();
    let mut first_error = None;
    for layer in &result.layers {
        match backend.tile_url(&layer.image, &layer.vis) {
            Ok(url) => layers.push(TileLayer {
                name: layer.name.clone(),
                url,
            }),
            Err(e) => {
                warn!(
                    action = "tiles",
                    component = "map",
                    layer = %layer.name,
                    error = %e,
                    "Layer skipped"
                );
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) if layers.is_empty() => Err(e),
        _ => Ok(layers),
    }
}

pub fn render_page(title: &str, layers: &[TileLayer]) -> String {
    let overlays = serde_json::to_string(layers).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>html, body, #map {{ height: 100%; margin: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
const map = L.map('map').setView([{lat}, {lon}], {zoom});
const base = L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
  attribution: '&copy; OpenStreetMap contributors'
}}).addTo(map);
const overlays = {{}};
for (const layer of {overlays}) {{
  overlays[layer.name] = L.tileLayer(layer.url, {{ attribution: 'Google Earth Engine' }}).addTo(map);
}}
L.control.layers({{ 'OpenStreetMap': base }}, overlays).addTo(map);
</script>
</body>
</html>
"#,
        title = html_escape(title),
        lat = CENTER.0,
        lon = CENTER.1,
        zoom = ZOOM,
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn write_map(
    backend: &dyn Backend,
    result: &AnalysisResult,
    title: &str,
    path: &Path,
) -> Result<usize, MapError> {
    let layers = tile_layers(backend, result)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_page(title, &layers))?;
    info!(
        action = "write",
        component = "map",
        path = %path.display(),
        layer_count = layers.len(),
        "Map viewer written"
    );
    Ok(layers.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::ScriptedBackend;
    use crate::backend::VisParams;
    use crate::ee::{self, Expr};
    use crate::outcome::{MapLayer, Metrics};
    use crate::request::AnalysisModule;
    use serde_json::json;

    fn result() -> AnalysisResult {
        AnalysisResult::new(AnalysisModule::Rainfall, Metrics::new())
            .with_layer(MapLayer::new(
                "Rainfall (mm)",
                ee::image("NASA/GPM"),
                VisParams::range(0.0, 100.0, &["white", "blue"]),
            ))
    }

    #[test]
    fn page_lists_every_layer() {
        let backend = ScriptedBackend::new(|_: &Expr| Ok(json!(null)));
        let layers = tile_layers(&backend, &result()).unwrap();
        assert_eq!(
            layers,
            vec![TileLayer {
                name: "Rainfall (mm)".to_string(),
                url: "https://tiles.test/maps/abc/tiles/{z}/{x}/{y}".to_string(),
            }]
        );

        let page = render_page("Amman <Rainfall>", &layers);
        assert!(page.contains("<title>Amman &lt;Rainfall&gt;</title>"));
        assert!(page.contains(r#""name":"Rainfall (mm)""#));
        assert!(page.contains("setView([31.24, 36.51], 7)"));
    }

    #[test]
    fn map_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps").join("amman.html");
        let backend = ScriptedBackend::new(|_: &Expr| Ok(json!(null)));
        assert_eq!(write_map(&backend, &result(), "Amman", &path).unwrap(), 1);
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn unwritable_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("maps");
        std::fs::write(&blocker, "not a directory").unwrap();
        let backend = ScriptedBackend::new(|_: &Expr| Ok(json!(null)));

        let err = write_map(&backend, &result(), "Amman", &blocker.join("amman.html"));
        assert!(matches!(err, Err(MapError::Io(_))));
    }
}
