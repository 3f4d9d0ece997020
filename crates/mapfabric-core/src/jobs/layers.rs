//! Dataset descriptions carried inline in job payloads
//!
//! A submitted job is self-contained: every layer it references travels with
//! the job as one of the description types below, exactly as the exporter
//! flattened it out of the project file. The worker never resolves layers
//! against any registry of its own.

use serde::{Deserialize, Serialize};

/// Coordinate reference system of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Crs {
    /// Authority identifier, e.g. `EPSG:4326`
    pub auth_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgis_srid: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ogc_uri: Option<String>,
}

/// Axis-aligned bounding box in dataset coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

/// Attribute field of a vector dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A named style definition (url-safe base64 over a compressed style
/// document, as produced by the exporter)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedStyle {
    pub name: String,
    pub definition: String,
}

/// File-backed vector source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OgrSource {
    /// Dataset path, relative to the worker data root unless `remote`
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<String>,

    /// True when `path` is a full remote URI
    #[serde(default)]
    pub remote: bool,
}

/// File-backed raster source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GdalSource {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_name: Option<String>,

    #[serde(default)]
    pub remote: bool,
}

/// Database-backed vector source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresSource {
    pub dbname: String,
    pub host: String,
    pub port: String,
    pub schema: String,
    pub table: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Cascading WMS source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WmsSource {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
}

/// Cascading WMTS source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WmtsSource {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_matrix_set: Option<String>,
}

/// Cascading WFS source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WfsSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Vector tile source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorTileSource {
    pub path: String,

    #[serde(default)]
    pub remote: bool,
}

/// Concrete source of a dataset; exactly one field is populated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ogr: Option<OgrSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gdal: Option<GdalSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wms: Option<WmsSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wmts: Option<WmtsSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wfs: Option<WfsSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_tile: Option<VectorTileSource>,
}

/// A vector dataset referenced by a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Vector {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub path: String,

    /// Provider driver, e.g. `ogr`, `postgres`, `wfs`
    pub driver: String,

    pub source: DataSource,

    #[serde(default)]
    pub fields: Vec<Field>,

    #[serde(default)]
    pub styles: Vec<NamedStyle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<Crs>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox_wgs84: Option<BBox>,
}

/// A raster dataset referenced by a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Raster {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub path: String,

    /// Provider driver, e.g. `gdal`, `wms`
    pub driver: String,

    pub source: DataSource,

    #[serde(default)]
    pub styles: Vec<NamedStyle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<Crs>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox_wgs84: Option<BBox>,
}

/// A custom dataset (currently vector tiles) referenced by a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Custom {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub path: String,

    pub driver: String,

    pub source: DataSource,

    #[serde(default)]
    pub styles: Vec<NamedStyle>,
}

impl Vector {
    /// Look up a style definition by name
    pub fn style_by_name(&self, name: &str) -> Option<&NamedStyle> {
        self.styles.iter().find(|s| s.name == name)
    }
}

impl Raster {
    /// Look up a style definition by name
    pub fn style_by_name(&self, name: &str) -> Option<&NamedStyle> {
        self.styles.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_single_field() {
        let json = r#"{"ogr": {"path": "roads.gpkg", "layer_name": "roads"}}"#;
        let source: DataSource = serde_json::from_str(json).unwrap();
        assert!(source.ogr.is_some());
        assert!(source.gdal.is_none());
        assert!(!source.ogr.unwrap().remote);
    }

    #[test]
    fn test_unknown_source_rejected() {
        let json = r#"{"carto": {"path": "x"}}"#;
        assert!(serde_json::from_str::<DataSource>(json).is_err());
    }

    #[test]
    fn test_style_lookup() {
        let vector = Vector {
            name: "roads".to_string(),
            title: None,
            path: "roads.gpkg".to_string(),
            driver: "ogr".to_string(),
            source: DataSource::default(),
            fields: vec![],
            styles: vec![NamedStyle {
                name: "default".to_string(),
                definition: "e30".to_string(),
            }],
            crs: None,
            bbox: None,
            bbox_wgs84: None,
        };
        assert!(vector.style_by_name("default").is_some());
        assert!(vector.style_by_name("night").is_none());
    }
}
