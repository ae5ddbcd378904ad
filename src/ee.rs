//! Earth Engine expression graph.
//!
//! Every remote computation is described as a tree of function
//! invocations that the backend evaluates server-side. [`Expr`] is that
//! tree; [`Expr::to_wire`] produces the REST `Expression` payload
//! (`{"result": "0", "values": {...}}`).

use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Value),
    Call {
        function: String,
        args: BTreeMap<String, Expr>,
    },
    Array(Vec<Expr>),
    Dict(BTreeMap<String, Expr>),
    ArgRef(String),
    Function {
        params: Vec<String>,
        body: Box<Expr>,
    },
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Constant(json!(v))
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Constant(json!(v))
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::Constant(json!(v))
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Constant(json!(v))
    }
}

/// Builds an invocation of a named server-side algorithm.
pub fn call<I, K>(function: &str, args: I) -> Expr
where
    I: IntoIterator<Item = (K, Expr)>,
    K: Into<String>,
{
    Expr::Call {
        function: function.to_string(),
        args: args.into_iter().map(|(k, v)| (k.into(), v)).collect(),
    }
}

pub fn strings(items: &[&str]) -> Expr {
    Expr::Array(items.iter().map(|s| Expr::from(*s)).collect())
}

/// Server-side `Date` from a calendar day (midnight UTC).
pub fn date(day: NaiveDate) -> Expr {
    let millis = day
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default();
    call("Date", [("value", Expr::from(millis))])
}

pub fn image_collection(id: &str) -> Expr {
    call("ImageCollection.load", [("id", Expr::from(id))])
}

pub fn image(id: &str) -> Expr {
    call("Image.load", [("id", Expr::from(id))])
}

pub fn feature_collection(id: &str) -> Expr {
    call("Collection.loadTable", [("tableId", Expr::from(id))])
}

pub fn constant_image(value: f64) -> Expr {
    call("Image.constant", [("value", Expr::from(value))])
}

pub fn pixel_area() -> Expr {
    call("Image.pixelArea", Vec::<(String, Expr)>::new())
}

pub mod filter {
    use super::{call, Expr};

    pub fn eq(field: &str, value: impl Into<Expr>) -> Expr {
        call(
            "Filter.equals",
            [("leftField", Expr::from(field)), ("rightValue", value.into())],
        )
    }

    pub fn lt(field: &str, value: impl Into<Expr>) -> Expr {
        call(
            "Filter.lessThan",
            [("leftField", Expr::from(field)), ("rightValue", value.into())],
        )
    }

    pub fn string_contains(field: &str, value: &str) -> Expr {
        call(
            "Filter.stringContains",
            [("leftField", Expr::from(field)), ("rightValue", Expr::from(value))],
        )
    }

    pub fn bounds(geometry: Expr) -> Expr {
        call(
            "Filter.intersects",
            [("leftField", Expr::from(".all")), ("rightValue", geometry)],
        )
    }

    pub fn date_range(start: Expr, end: Expr) -> Expr {
        let range = call("DateRange", [("start", start), ("end", end)]);
        call(
            "Filter.dateRangeContains",
            [
                ("leftValue", range),
                ("rightField", Expr::from("system:time_start")),
            ],
        )
    }
}

pub mod reducer {
    use super::{call, Expr};

    fn simple(name: &str) -> Expr {
        call(name, Vec::<(String, Expr)>::new())
    }

    pub fn mean() -> Expr {
        simple("Reducer.mean")
    }

    pub fn sum() -> Expr {
        simple("Reducer.sum")
    }

    pub fn max() -> Expr {
        simple("Reducer.max")
    }

    pub fn min_max() -> Expr {
        simple("Reducer.minMax")
    }

    /// Combined reducer with shared inputs; outputs are suffixed
    /// `_<name>` per band.
    pub fn combine(first: Expr, second: Expr) -> Expr {
        call(
            "Reducer.combine",
            [
                ("reducer1", first),
                ("reducer2", second),
                ("sharedInputs", Expr::from(true)),
            ],
        )
    }

    pub fn grouped(reducer: Expr, group_field: i64, group_name: &str) -> Expr {
        call(
            "Reducer.group",
            [
                ("reducer", reducer),
                ("groupField", Expr::from(group_field)),
                ("groupName", Expr::from(group_name)),
            ],
        )
    }
}

/// A mapping function over collection elements, bound to `_MAPPING_VAR_0`.
pub fn mapper(body: impl FnOnce(Expr) -> Expr) -> Expr {
    let param = "_MAPPING_VAR_0".to_string();
    let body = body(Expr::ArgRef(param.clone()));
    Expr::Function {
        params: vec![param],
        body: Box::new(body),
    }
}

impl Expr {
    /// Name of the top-level function, if this node is a call.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Expr::Call { function, .. } => Some(function),
            _ => None,
        }
    }

    pub fn arg(&self, name: &str) -> Option<&Expr> {
        match self {
            Expr::Call { args, .. } => args.get(name),
            _ => None,
        }
    }

    /// True when `function` is invoked anywhere in the tree.
    pub fn calls(&self, function: &str) -> bool {
        match self {
            Expr::Call { function: f, args } => {
                f == function || args.values().any(|a| a.calls(function))
            }
            Expr::Array(items) => items.iter().any(|a| a.calls(function)),
            Expr::Dict(items) => items.values().any(|a| a.calls(function)),
            Expr::Function { body, .. } => body.calls(function),
            Expr::Constant(_) | Expr::ArgRef(_) => false,
        }
    }

    /// True when the string constant `needle` appears anywhere in the tree.
    pub fn mentions(&self, needle: &str) -> bool {
        match self {
            Expr::Constant(Value::String(s)) => s == needle,
            Expr::Constant(_) | Expr::ArgRef(_) => false,
            Expr::Call { args, .. } => args.values().any(|a| a.mentions(needle)),
            Expr::Array(items) => items.iter().any(|a| a.mentions(needle)),
            Expr::Dict(items) => items.values().any(|a| a.mentions(needle)),
            Expr::Function { body, .. } => body.mentions(needle),
        }
    }

    fn method(self, function: &str, self_arg: &str, rest: Vec<(&str, Expr)>) -> Expr {
        let mut args: BTreeMap<String, Expr> =
            rest.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        args.insert(self_arg.to_string(), self);
        Expr::Call {
            function: function.to_string(),
            args,
        }
    }

    // Collection methods

    pub fn filter(self, filter: Expr) -> Expr {
        self.method("Collection.filter", "collection", vec![("filter", filter)])
    }

    /// Keeps elements intersecting the union of `roi`.
    pub fn filter_bounds(self, roi: Expr) -> Expr {
        self.filter(filter::bounds(roi.geometry()))
    }

    pub fn filter_date(self, start: Expr, end: Expr) -> Expr {
        self.filter(filter::date_range(start, end))
    }

    pub fn size(self) -> Expr {
        self.method("Collection.size", "collection", vec![])
    }

    pub fn map(self, function: Expr) -> Expr {
        self.method("Collection.map", "collection", vec![("baseAlgorithm", function)])
    }

    pub fn geometry(self) -> Expr {
        self.method("Collection.geometry", "collection", vec![])
    }

    pub fn bounds(self) -> Expr {
        self.method("Geometry.bounds", "geometry", vec![])
    }

    pub fn select_bands(self, bands: &[&str]) -> Expr {
        self.map(mapper(|img| img.select(bands)))
    }

    pub fn mean(self) -> Expr {
        self.method("reduce.mean", "collection", vec![])
    }

    pub fn median(self) -> Expr {
        self.method("reduce.median", "collection", vec![])
    }

    pub fn max(self) -> Expr {
        self.method("reduce.max", "collection", vec![])
    }

    pub fn sum(self) -> Expr {
        self.method("reduce.sum", "collection", vec![])
    }

    pub fn mosaic(self) -> Expr {
        self.method("ImageCollection.mosaic", "collection", vec![])
    }

    // Image methods

    pub fn select(self, bands: &[&str]) -> Expr {
        self.method("Image.select", "input", vec![("bandSelectors", strings(bands))])
    }

    pub fn rename(self, names: &[&str]) -> Expr {
        self.method("Image.rename", "input", vec![("names", strings(names))])
    }

    /// Clips to the union of a FeatureCollection.
    pub fn clip(self, roi: Expr) -> Expr {
        self.method("Image.clipToCollection", "input", vec![("collection", roi)])
    }

    pub fn multiply(self, factor: impl Into<Operand>) -> Expr {
        self.binary("Image.multiply", factor.into())
    }

    pub fn add(self, value: impl Into<Operand>) -> Expr {
        self.binary("Image.add", value.into())
    }

    pub fn subtract(self, value: impl Into<Operand>) -> Expr {
        self.binary("Image.subtract", value.into())
    }

    pub fn divide(self, value: impl Into<Operand>) -> Expr {
        self.binary("Image.divide", value.into())
    }

    pub fn lt(self, value: impl Into<Operand>) -> Expr {
        self.binary("Image.lt", value.into())
    }

    pub fn equals(self, value: impl Into<Operand>) -> Expr {
        self.binary("Image.eq", value.into())
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary("Image.and", Operand::Image(other))
    }

    pub fn bitwise_and(self, value: impl Into<Operand>) -> Expr {
        self.binary("Image.bitwiseAnd", value.into())
    }

    fn binary(self, function: &str, other: Operand) -> Expr {
        let other = match other {
            Operand::Scalar(v) => constant_image(v),
            Operand::Image(e) => e,
        };
        self.method(function, "image1", vec![("image2", other)])
    }

    pub fn update_mask(self, mask: Expr) -> Expr {
        self.method("Image.updateMask", "image", vec![("mask", mask)])
    }

    /// Replaces same-named bands of `self` with those of `bands`.
    pub fn add_bands_overwrite(self, bands: Expr) -> Expr {
        self.method(
            "Image.addBands",
            "dstImg",
            vec![("srcImg", bands), ("overwrite", Expr::from(true))],
        )
    }

    pub fn add_bands(self, bands: Expr) -> Expr {
        self.method("Image.addBands", "dstImg", vec![("srcImg", bands)])
    }

    pub fn normalized_difference(self, first: &str, second: &str) -> Expr {
        self.method(
            "Image.normalizedDifference",
            "input",
            vec![("bandNames", strings(&[first, second]))],
        )
    }

    pub fn focal_median(self, radius_m: f64) -> Expr {
        self.method(
            "Image.focal_median",
            "image",
            vec![
                ("radius", Expr::from(radius_m)),
                ("kernelType", Expr::from("circle")),
                ("units", Expr::from("meters")),
            ],
        )
    }

    pub fn reproject(self, crs: &str, scale: f64) -> Expr {
        self.method(
            "Image.reproject",
            "image",
            vec![("crs", Expr::from(crs)), ("scale", Expr::from(scale))],
        )
    }

    pub fn slope(self) -> Expr {
        self.method("Terrain.slope", "input", vec![])
    }

    pub fn aspect(self) -> Expr {
        self.method("Terrain.aspect", "input", vec![])
    }

    pub fn hillshade(self) -> Expr {
        self.method("Terrain.hillshade", "input", vec![])
    }

    pub fn remap(self, from: &[i64], to: &[i64]) -> Expr {
        let list = |v: &[i64]| Expr::Array(v.iter().map(|n| Expr::from(*n)).collect());
        self.method(
            "Image.remap",
            "image",
            vec![("from", list(from)), ("to", list(to))],
        )
    }

    pub fn reduce_region(self, reducer: Expr, roi: Expr, scale: f64, max_pixels: f64) -> Expr {
        self.method(
            "Image.reduceRegion",
            "image",
            vec![
                ("reducer", reducer),
                ("geometry", roi.geometry()),
                ("scale", Expr::from(scale)),
                ("maxPixels", Expr::from(max_pixels)),
            ],
        )
    }

    /// Serialises into the REST `Expression` message.
    pub fn to_wire(&self) -> Value {
        let mut encoder = Encoder::default();
        let root = encoder.encode(self);
        let key = encoder.push(root);
        json!({ "result": key, "values": Value::Object(encoder.values) })
    }
}

/// Right-hand side of an image arithmetic operation.
pub enum Operand {
    Scalar(f64),
    Image(Expr),
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Scalar(v)
    }
}

impl From<Expr> for Operand {
    fn from(e: Expr) -> Self {
        Operand::Image(e)
    }
}

#[derive(Default)]
struct Encoder {
    values: Map<String, Value>,
}

impl Encoder {
    fn push(&mut self, node: Value) -> String {
        let key = self.values.len().to_string();
        self.values.insert(key.clone(), node);
        key
    }

    fn encode(&mut self, expr: &Expr) -> Value {
        match expr {
            Expr::Constant(v) => json!({ "constantValue": v }),
            Expr::ArgRef(name) => json!({ "argumentReference": name }),
            Expr::Array(items) => {
                let values: Vec<Value> = items.iter().map(|i| self.encode(i)).collect();
                json!({ "arrayValue": { "values": values } })
            }
            Expr::Dict(items) => {
                let values: Map<String, Value> = items
                    .iter()
                    .map(|(k, v)| (k.clone(), self.encode(v)))
                    .collect();
                json!({ "dictionaryValue": { "values": values } })
            }
            Expr::Call { function, args } => {
                let arguments: Map<String, Value> = args
                    .iter()
                    .map(|(k, v)| (k.clone(), self.encode(v)))
                    .collect();
                json!({
                    "functionInvocationValue": {
                        "functionName": function,
                        "arguments": arguments,
                    }
                })
            }
            Expr::Function { params, body } => {
                // Function bodies are referenced by key, not inlined.
                let body = self.encode(body);
                let body_key = self.push(body);
                json!({
                    "functionDefinitionValue": {
                        "argumentNames": params,
                        "body": body_key,
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_root_is_stored_under_result_key() {
        let wire = Expr::from(5i64).to_wire();
        let key = wire["result"].as_str().unwrap();
        assert_eq!(wire["values"][key]["constantValue"], json!(5));
    }

    #[test]
    fn method_chain_nests_invocations() {
        let expr = image_collection("MODIS/061/MOD11A1").size();
        let wire = expr.to_wire();
        let key = wire["result"].as_str().unwrap();
        let root = &wire["values"][key]["functionInvocationValue"];

        assert_eq!(root["functionName"], "Collection.size");
        let inner = &root["arguments"]["collection"]["functionInvocationValue"];
        assert_eq!(inner["functionName"], "ImageCollection.load");
        assert_eq!(
            inner["arguments"]["id"]["constantValue"],
            "MODIS/061/MOD11A1"
        );
    }

    #[test]
    fn mapped_function_body_is_referenced_by_key() {
        let expr = image_collection("X").map(mapper(|img| img.multiply(0.02)));
        let wire = expr.to_wire();
        let values = wire["values"].as_object().unwrap();
        assert_eq!(values.len(), 2);

        let key = wire["result"].as_str().unwrap();
        let def = &values[key]["functionInvocationValue"]["arguments"]["baseAlgorithm"]
            ["functionDefinitionValue"];
        assert_eq!(def["argumentNames"], json!(["_MAPPING_VAR_0"]));

        let body_key = def["body"].as_str().unwrap();
        let body = &values[body_key]["functionInvocationValue"];
        assert_eq!(body["functionName"], "Image.multiply");
        assert_eq!(
            body["arguments"]["image1"]["argumentReference"],
            "_MAPPING_VAR_0"
        );
    }

    #[test]
    fn scalar_operands_become_constant_images() {
        let expr = image("USGS/SRTMGL1_003").lt(1200.0);
        let rhs = expr.arg("image2").unwrap();
        assert_eq!(rhs.function_name(), Some("Image.constant"));
    }

    #[test]
    fn tree_queries_find_nested_calls_and_constants() {
        let expr = image_collection("COPERNICUS/S1_GRD")
            .filter(filter::eq("instrumentMode", "IW"))
            .size();
        assert!(expr.calls("Filter.equals"));
        assert!(!expr.calls("Filter.stringContains"));
        assert!(expr.mentions("IW"));
        assert!(!expr.mentions("EW"));
    }

    #[test]
    fn date_is_epoch_millis() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let expr = date(day);
        assert_eq!(
            expr.arg("value"),
            Some(&Expr::Constant(json!(1_709_251_200_000i64)))
        );
    }
}
