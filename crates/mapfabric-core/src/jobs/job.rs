//! Job payload types and the result value
//!
//! The four job kinds form a closed tagged union ([`Job`]); the WMS-style
//! parameter blocks keep their values stringly, exactly as they arrived in
//! the originating request, and expose typed accessors for the pieces the
//! worker needs.

use serde::{Deserialize, Serialize};

use crate::jobs::envelope::JobKind;
use crate::jobs::layers::{Custom, Raster, Vector};
use crate::jobs::{DispatchError, DispatchResult};

fn default_format() -> String {
    "image/png".to_string()
}

fn default_info_format() -> String {
    "application/json".to_string()
}

/// WMS request parameters for a map rendering job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WmsMapParams {
    /// Comma-separated `minx,miny,maxx,maxy`
    pub bbox: String,

    /// OGC CRS identifier, e.g. `EPSG:4326`
    pub crs: String,

    /// Output width in pixels
    pub width: String,

    /// Output height in pixels
    pub height: String,

    /// Comma-separated layer names, rendered bottom-up
    pub layers: String,

    /// Comma-separated style names, positional with `layers`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<String>,

    /// Media type of the requested image
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<String>,

    /// Vendor options; a trailing `:<dpi>` segment doubles as a dpi hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_options: Option<String>,
}

impl WmsMapParams {
    /// Parsed bounding box `[minx, miny, maxx, maxy]`
    pub fn bbox(&self) -> DispatchResult<[f64; 4]> {
        parse_bbox(&self.bbox)
    }

    pub fn width(&self) -> DispatchResult<u32> {
        parse_dimension("WIDTH", &self.width)
    }

    pub fn height(&self) -> DispatchResult<u32> {
        parse_dimension("HEIGHT", &self.height)
    }

    /// Requested layer names in request order
    pub fn layers(&self) -> Vec<&str> {
        split_list(&self.layers)
    }

    /// Requested style names, positional with [`Self::layers`]
    pub fn styles(&self) -> Vec<&str> {
        self.styles.as_deref().map(split_list).unwrap_or_default()
    }

    /// Effective dpi: the `dpi` parameter, falling back to the trailing
    /// segment of `format_options`
    pub fn dpi(&self) -> DispatchResult<Option<u32>> {
        let raw = match (&self.dpi, &self.format_options) {
            (Some(dpi), _) => dpi.as_str(),
            (None, Some(options)) => match options.rsplit(':').next() {
                Some(last) => last,
                None => return Ok(None),
            },
            (None, None) => return Ok(None),
        };
        raw.parse::<u32>()
            .map(Some)
            .map_err(|_| DispatchError::MalformedEnvelope(format!("invalid dpi value `{raw}`")))
    }
}

/// WMS request parameters for a feature-info job
///
/// Pixel coordinates are accepted under either the `I`/`J` (WMS 1.3) or
/// `X`/`Y` (WMS 1.1) naming convention; `I`/`J` wins when both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WmsFeatureInfoParams {
    pub bbox: String,

    pub crs: String,

    pub width: String,

    pub height: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub j: Option<String>,

    /// Only `application/json` is supported
    #[serde(default = "default_info_format")]
    pub info_format: String,

    /// Comma-separated names of the layers to query
    pub query_layers: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_options: Option<String>,
}

impl WmsFeatureInfoParams {
    pub fn bbox(&self) -> DispatchResult<[f64; 4]> {
        parse_bbox(&self.bbox)
    }

    pub fn width(&self) -> DispatchResult<u32> {
        parse_dimension("WIDTH", &self.width)
    }

    pub fn height(&self) -> DispatchResult<u32> {
        parse_dimension("HEIGHT", &self.height)
    }

    /// Horizontal pixel coordinate (`I` preferred over `X`)
    pub fn x(&self) -> DispatchResult<i64> {
        parse_pixel("I", self.i.as_deref().or(self.x.as_deref()))
    }

    /// Vertical pixel coordinate (`J` preferred over `Y`)
    pub fn y(&self) -> DispatchResult<i64> {
        parse_pixel("J", self.j.as_deref().or(self.y.as_deref()))
    }

    pub fn query_layers(&self) -> Vec<&str> {
        split_list(&self.query_layers)
    }

    pub fn dpi(&self) -> DispatchResult<Option<u32>> {
        match (&self.dpi, &self.format_options) {
            (None, None) => Ok(None),
            _ => {
                let raw = self
                    .dpi
                    .as_deref()
                    .or_else(|| {
                        self.format_options
                            .as_deref()
                            .and_then(|o| o.rsplit(':').next())
                    })
                    .unwrap_or_default();
                raw.parse::<u32>().map(Some).map_err(|_| {
                    DispatchError::MalformedEnvelope(format!("invalid dpi value `{raw}`"))
                })
            }
        }
    }
}

/// A job to be rendered as an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetMapJob {
    pub service_params: WmsMapParams,

    pub raster_layers: Vec<Raster>,

    pub vector_layers: Vec<Vector>,

    pub custom_layers: Vec<Custom>,

    /// Extra map units rendered around the requested extent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent_buffer: Option<f64>,

    #[serde(default)]
    pub svg_paths: Vec<String>,
}

/// One referenced dataset, whichever list it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DatasetRef<'a> {
    Raster(&'a Raster),
    Vector(&'a Vector),
    Custom(&'a Custom),
}

impl<'a> DatasetRef<'a> {
    pub fn name(&self) -> &str {
        match self {
            DatasetRef::Raster(r) => &r.name,
            DatasetRef::Vector(v) => &v.name,
            DatasetRef::Custom(c) => &c.name,
        }
    }
}

impl GetMapJob {
    /// Look up a referenced dataset across the three layer lists
    pub fn dataset_by_name(&self, name: &str) -> Option<DatasetRef<'_>> {
        self.raster_layers
            .iter()
            .find(|l| l.name == name)
            .map(DatasetRef::Raster)
            .or_else(|| {
                self.vector_layers
                    .iter()
                    .find(|l| l.name == name)
                    .map(DatasetRef::Vector)
            })
            .or_else(|| {
                self.custom_layers
                    .iter()
                    .find(|l| l.name == name)
                    .map(DatasetRef::Custom)
            })
    }

    /// Decode-time payload validation
    pub(crate) fn validate(&self) -> DispatchResult<()> {
        let layers = self.service_params.layers();
        if layers.is_empty() {
            return Err(DispatchError::MissingRequiredField("LAYERS".to_string()));
        }
        let styles = self.service_params.styles();
        if styles.is_empty() {
            return Err(DispatchError::MissingRequiredField("STYLES".to_string()));
        }
        if styles.len() != layers.len() {
            return Err(DispatchError::MalformedEnvelope(format!(
                "STYLES must name one style per layer ({} layers, {} styles)",
                layers.len(),
                styles.len()
            )));
        }
        Ok(())
    }
}

/// A job to extract feature info at a pixel position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetFeatureInfoJob {
    pub service_params: WmsFeatureInfoParams,

    #[serde(default)]
    pub svg_paths: Vec<String>,
}

impl GetFeatureInfoJob {
    pub(crate) fn validate(&self) -> DispatchResult<()> {
        if self.service_params.i.is_none() && self.service_params.x.is_none() {
            return Err(DispatchError::MissingRequiredField("I/X".to_string()));
        }
        if self.service_params.j.is_none() && self.service_params.y.is_none() {
            return Err(DispatchError::MissingRequiredField("J/Y".to_string()));
        }
        if self.service_params.query_layers().is_empty() {
            return Err(DispatchError::MissingRequiredField(
                "QUERY_LAYERS".to_string(),
            ));
        }
        Ok(())
    }
}

/// One query of a feature-retrieval job, WFS 2.0 style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureQuery {
    /// Vector datasets the query (and its filter) applies to
    pub datasets: Vec<Vector>,

    /// Optional alias names, positional with `datasets`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<Vec<String>>,

    /// Optional OGC filter document applied to every dataset of the query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// A job to retrieve features, subdivided into a list of queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetFeatureJob {
    pub queries: Vec<FeatureQuery>,

    /// Paging offset
    #[serde(default)]
    pub start_index: u64,

    /// Paging limit; unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl GetFeatureJob {
    pub(crate) fn validate(&self) -> DispatchResult<()> {
        for (index, query) in self.queries.iter().enumerate() {
            if let Some(alias) = &query.alias {
                if alias.len() != query.datasets.len() {
                    return Err(DispatchError::MalformedEnvelope(format!(
                        "query {index}: alias list length {} does not match {} datasets",
                        alias.len(),
                        query.datasets.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A job to render a legend image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegendJob {
    #[serde(default)]
    pub svg_paths: Vec<String>,
}

/// Closed union over the four job kinds
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    GetMap(GetMapJob),
    GetFeatureInfo(GetFeatureInfoJob),
    GetFeature(GetFeatureJob),
    Legend(LegendJob),
}

impl Job {
    /// Canonical discriminator of this payload
    pub fn kind(&self) -> JobKind {
        match self {
            Job::GetMap(_) => JobKind::GetMap,
            Job::GetFeatureInfo(_) => JobKind::GetFeatureInfo,
            Job::GetFeature(_) => JobKind::GetFeature,
            Job::Legend(_) => JobKind::Legend,
        }
    }

    pub(crate) fn validate(&self) -> DispatchResult<()> {
        match self {
            Job::GetMap(job) => job.validate(),
            Job::GetFeatureInfo(job) => job.validate(),
            Job::GetFeature(job) => job.validate(),
            Job::Legend(_) => Ok(()),
        }
    }
}

/// Result of a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobResult {
    /// Media type of `data`
    pub content_type: String,

    /// Raw result bytes; base64-encoded on the wire
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl JobResult {
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            data,
        }
    }

    /// Serialize for transport on the notification channel
    pub fn encode(&self) -> DispatchResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DispatchError::MalformedEnvelope(e.to_string()))
    }

    /// Deserialize a notification payload
    pub fn decode(bytes: &[u8]) -> DispatchResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| DispatchError::MalformedEnvelope(e.to_string()))
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

fn split_list(raw: &str) -> Vec<&str> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').collect()
}

fn parse_bbox(raw: &str) -> DispatchResult<[f64; 4]> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 4 {
        return Err(DispatchError::MalformedEnvelope(format!(
            "BBOX must have 4 components, got `{raw}`"
        )));
    }
    let mut bbox = [0.0; 4];
    for (slot, part) in bbox.iter_mut().zip(&parts) {
        *slot = part.trim().parse::<f64>().map_err(|_| {
            DispatchError::MalformedEnvelope(format!("invalid BBOX component `{part}`"))
        })?;
    }
    Ok(bbox)
}

fn parse_dimension(field: &str, raw: &str) -> DispatchResult<u32> {
    match raw.parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(DispatchError::MalformedEnvelope(format!(
            "invalid {field} value `{raw}`"
        ))),
    }
}

fn parse_pixel(field: &str, raw: Option<&str>) -> DispatchResult<i64> {
    let raw = raw.ok_or_else(|| DispatchError::MissingRequiredField(field.to_string()))?;
    raw.parse::<i64>().map_err(|_| {
        DispatchError::MalformedEnvelope(format!("invalid {field} pixel coordinate `{raw}`"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::layers::DataSource;

    fn map_params() -> WmsMapParams {
        WmsMapParams {
            bbox: "0,0,10,10".to_string(),
            crs: "EPSG:4326".to_string(),
            width: "256".to_string(),
            height: "256".to_string(),
            layers: "a".to_string(),
            styles: Some("default".to_string()),
            format: "image/png".to_string(),
            dpi: None,
            format_options: None,
        }
    }

    fn raster(name: &str) -> Raster {
        Raster {
            name: name.to_string(),
            title: None,
            path: format!("{name}.tif"),
            driver: "gdal".to_string(),
            source: DataSource {
                gdal: Some(crate::jobs::layers::GdalSource {
                    path: format!("{name}.tif"),
                    layer_name: None,
                    remote: false,
                }),
                ..DataSource::default()
            },
            styles: vec![],
            crs: None,
            bbox: None,
            bbox_wgs84: None,
        }
    }

    #[test]
    fn test_bbox_accessor() {
        let params = map_params();
        assert_eq!(params.bbox().unwrap(), [0.0, 0.0, 10.0, 10.0]);
    }

    #[test]
    fn test_bbox_invalid() {
        let mut params = map_params();
        params.bbox = "0,0,10".to_string();
        assert!(matches!(
            params.bbox(),
            Err(DispatchError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_dimensions() {
        let params = map_params();
        assert_eq!(params.width().unwrap(), 256);
        assert_eq!(params.height().unwrap(), 256);

        let mut bad = map_params();
        bad.width = "0".to_string();
        assert!(bad.width().is_err());
    }

    #[test]
    fn test_dpi_fallback_from_format_options() {
        let mut params = map_params();
        assert_eq!(params.dpi().unwrap(), None);

        params.format_options = Some("dpi:300".to_string());
        assert_eq!(params.dpi().unwrap(), Some(300));

        params.dpi = Some("96".to_string());
        assert_eq!(params.dpi().unwrap(), Some(96));
    }

    #[test]
    fn test_get_map_validation() {
        let job = GetMapJob {
            service_params: map_params(),
            raster_layers: vec![raster("a")],
            vector_layers: vec![],
            custom_layers: vec![],
            extent_buffer: None,
            svg_paths: vec![],
        };
        assert!(job.validate().is_ok());

        let mut missing_styles = job.clone();
        missing_styles.service_params.styles = None;
        assert!(matches!(
            missing_styles.validate(),
            Err(DispatchError::MissingRequiredField(f)) if f == "STYLES"
        ));

        let mut mismatched = job.clone();
        mismatched.service_params.layers = "a,b".to_string();
        assert!(matches!(
            mismatched.validate(),
            Err(DispatchError::MalformedEnvelope(_))
        ));

        let mut empty_layers = job;
        empty_layers.service_params.layers = String::new();
        assert!(matches!(
            empty_layers.validate(),
            Err(DispatchError::MissingRequiredField(f)) if f == "LAYERS"
        ));
    }

    #[test]
    fn test_dataset_lookup() {
        let job = GetMapJob {
            service_params: map_params(),
            raster_layers: vec![raster("a")],
            vector_layers: vec![],
            custom_layers: vec![],
            extent_buffer: None,
            svg_paths: vec![],
        };
        assert_eq!(job.dataset_by_name("a").unwrap().name(), "a");
        assert!(job.dataset_by_name("b").is_none());
    }

    #[test]
    fn test_feature_info_coordinates() {
        let params = WmsFeatureInfoParams {
            bbox: "0,0,10,10".to_string(),
            crs: "EPSG:4326".to_string(),
            width: "256".to_string(),
            height: "256".to_string(),
            x: Some("12".to_string()),
            y: Some("34".to_string()),
            i: None,
            j: None,
            info_format: "application/json".to_string(),
            query_layers: "roads".to_string(),
            dpi: None,
            format_options: None,
        };
        assert_eq!(params.x().unwrap(), 12);
        assert_eq!(params.y().unwrap(), 34);

        // I/J take precedence over X/Y
        let mut both = params.clone();
        both.i = Some("1".to_string());
        both.j = Some("2".to_string());
        assert_eq!(both.x().unwrap(), 1);
        assert_eq!(both.y().unwrap(), 2);
    }

    #[test]
    fn test_feature_info_validation() {
        let job = GetFeatureInfoJob {
            service_params: WmsFeatureInfoParams {
                bbox: "0,0,10,10".to_string(),
                crs: "EPSG:4326".to_string(),
                width: "256".to_string(),
                height: "256".to_string(),
                x: None,
                y: None,
                i: None,
                j: None,
                info_format: "application/json".to_string(),
                query_layers: "roads".to_string(),
                dpi: None,
                format_options: None,
            },
            svg_paths: vec![],
        };
        assert!(matches!(
            job.validate(),
            Err(DispatchError::MissingRequiredField(f)) if f == "I/X"
        ));
    }

    #[test]
    fn test_feature_query_alias_length() {
        let job = GetFeatureJob {
            queries: vec![FeatureQuery {
                datasets: vec![],
                alias: Some(vec!["a".to_string()]),
                filter: None,
            }],
            start_index: 0,
            count: None,
        };
        assert!(matches!(
            job.validate(),
            Err(DispatchError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_job_result_codec() {
        let result = JobResult::new("image/png", vec![1, 2, 3, 255]);
        let encoded = result.encode().unwrap();
        // data travels base64-encoded inside the JSON document
        assert!(String::from_utf8_lossy(&encoded).contains("AQID/w=="));
        assert_eq!(JobResult::decode(&encoded).unwrap(), result);
    }
}
