//! The seam between analyses and the remote geospatial service.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{debug, info};

use crate::auth::AccessToken;
use crate::config::EarthEngineConfig;
use crate::ee::{call, Expr};
use crate::error::{BackendError, ConfigError};

/// Visualisation parameters for a rendered map layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisParams {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub bands: Vec<&'static str>,
    pub palette: Vec<&'static str>,
    pub opacity: Option<f64>,
}

impl VisParams {
    pub fn range(min: f64, max: f64, palette: &[&'static str]) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            palette: palette.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn with_bands(mut self, bands: &[&'static str]) -> Self {
        self.bands = bands.to_vec();
        self
    }

    fn to_wire(&self) -> Value {
        let mut options = Map::new();
        if let (Some(min), Some(max)) = (self.min, self.max) {
            options.insert("ranges".into(), json!([{ "min": min, "max": max }]));
        }
        if !self.palette.is_empty() {
            let colors: Vec<String> = self
                .palette
                .iter()
                .map(|c| c.trim_start_matches('#').to_string())
                .collect();
            options.insert("paletteColors".into(), json!(colors));
        }
        if let Some(opacity) = self.opacity {
            options.insert("opacity".into(), json!(opacity));
        }
        Value::Object(options)
    }
}

/// A GeoTIFF export of an image over a region.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub name: String,
    pub scale: f64,
    pub region: Expr,
}

impl DownloadRequest {
    /// Body of a `thumbnails` create call. `name` is assigned by the
    /// server, so the file name travels as `filenamePrefix`.
    fn to_wire(&self, image: &Expr) -> Value {
        let clipped = call(
            "Image.clipToBoundsAndScale",
            [
                ("input", image.clone()),
                ("geometry", self.region.clone()),
                ("scale", Expr::from(self.scale)),
            ],
        );
        json!({
            "expression": clipped.to_wire(),
            "fileFormat": "GEO_TIFF",
            "filenamePrefix": self.name,
        })
    }
}

pub trait Backend: Sync {
    /// Evaluates an expression and returns its JSON value.
    fn compute(&self, expr: &Expr) -> Result<Value, BackendError>;

    /// Creates a map layer and returns its `{z}/{x}/{y}` tile URL template.
    fn tile_url(&self, image: &Expr, vis: &VisParams) -> Result<String, BackendError>;

    /// Creates a GeoTIFF download link for `image`.
    fn download_url(&self, image: &Expr, request: &DownloadRequest)
        -> Result<String, BackendError>;
}

/// Earth Engine REST client (blocking).
pub struct EarthEngine {
    agent: ureq::Agent,
    api_base: String,
    project: String,
    token: AccessToken,
}

#[derive(Debug, Deserialize)]
struct ComputeResponse {
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
}

impl EarthEngine {
    pub fn new(
        config: &EarthEngineConfig,
        project: String,
        token: AccessToken,
    ) -> Result<Self, ConfigError> {
        let api_base = config.api_base_url()?.as_str().trim_end_matches('/').to_string();
        let agent = ureq::AgentBuilder::new().timeout(config.timeout()).build();
        Ok(Self {
            agent,
            api_base,
            project,
            token,
        })
    }

    fn post(&self, method: &str, body: Value) -> Result<ureq::Response, BackendError> {
        let url = format!("{}/projects/{}/{}", self.api_base, self.project, method);
        debug!(action = "request", component = "earth_engine", url = %url, "POST");
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.token.token))
            .send_json(body)?;
        Ok(response)
    }
}

impl Backend for EarthEngine {
    fn compute(&self, expr: &Expr) -> Result<Value, BackendError> {
        let start_time = Instant::now();
        let response: ComputeResponse = self
            .post("value:compute", json!({ "expression": expr.to_wire() }))?
            .into_json()?;

        info!(
            action = "compute",
            component = "earth_engine",
            function = expr.function_name().unwrap_or("<constant>"),
            duration_ms = start_time.elapsed().as_millis(),
            "Expression evaluated"
        );
        Ok(response.result)
    }

    fn tile_url(&self, image: &Expr, vis: &VisParams) -> Result<String, BackendError> {
        let image = if vis.bands.is_empty() {
            image.clone()
        } else {
            image.clone().select(&vis.bands)
        };
        let map: NamedResource = self
            .post(
                "maps",
                json!({
                    "expression": image.to_wire(),
                    "fileFormat": "AUTO_JPEG_PNG",
                    "visualizationOptions": vis.to_wire(),
                }),
            )?
            .into_json()?;

        info!(action = "create", component = "map_layer", name = %map.name, "Map layer created");
        Ok(format!("{}/{}/tiles/{{z}}/{{x}}/{{y}}", self.api_base, map.name))
    }

    fn download_url(
        &self,
        image: &Expr,
        request: &DownloadRequest,
    ) -> Result<String, BackendError> {
        let thumbnail: NamedResource = self
            .post("thumbnails", request.to_wire(image))?
            .into_json()?;

        info!(action = "create", component = "download", name = %request.name, "Download link created");
        Ok(format!("{}/{}:getPixels", self.api_base, thumbnail.name))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Answers `compute` with a closure and records every expression.
    pub struct ScriptedBackend<F> {
        respond: F,
        pub calls: Mutex<Vec<Expr>>,
    }

    impl<F> ScriptedBackend<F>
    where
        F: Fn(&Expr) -> Result<Value, BackendError> + Sync,
    {
        pub fn new(respond: F) -> Self {
            Self {
                respond,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn computed(&self) -> Vec<Expr> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl<F> Backend for ScriptedBackend<F>
    where
        F: Fn(&Expr) -> Result<Value, BackendError> + Sync,
    {
        fn compute(&self, expr: &Expr) -> Result<Value, BackendError> {
            self.calls.lock().unwrap().push(expr.clone());
            (self.respond)(expr)
        }

        fn tile_url(&self, _image: &Expr, _vis: &VisParams) -> Result<String, BackendError> {
            Ok("https://tiles.test/maps/abc/tiles/{z}/{x}/{y}".to_string())
        }

        fn download_url(
            &self,
            _image: &Expr,
            request: &DownloadRequest,
        ) -> Result<String, BackendError> {
            Ok(format!("https://download.test/{}:getPixels", request.name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vis_params_strip_hash_from_palette() {
        let vis = VisParams::range(0.0, 30.0, &["#ffffff", "c0392b"]).with_opacity(0.6);
        assert_eq!(
            vis.to_wire(),
            json!({
                "ranges": [{ "min": 0.0, "max": 30.0 }],
                "paletteColors": ["ffffff", "c0392b"],
                "opacity": 0.6,
            })
        );
    }

    #[test]
    fn download_body_names_the_file_not_the_resource() {
        let request = DownloadRequest {
            name: "DEM_Amman".to_string(),
            scale: 30.0,
            region: crate::ee::feature_collection("FAO/GAUL/2015/level1"),
        };
        let body = request.to_wire(&crate::ee::image("JAXA/ALOS/AW3D30/V3_2"));

        assert_eq!(body["filenamePrefix"], "DEM_Amman");
        assert_eq!(body["fileFormat"], "GEO_TIFF");
        assert!(body.get("name").is_none());

        let expression = &body["expression"];
        let root = expression["result"].as_str().unwrap();
        assert_eq!(
            expression["values"][root]["functionInvocationValue"]["functionName"],
            "Image.clipToBoundsAndScale"
        );
    }

    #[test]
    fn empty_vis_params_send_no_options() {
        assert_eq!(VisParams::default().to_wire(), json!({}));
    }
}
