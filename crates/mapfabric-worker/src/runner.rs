//! Per-kind job runners
//!
//! A runner validates the full request, resolves and caches the layers the
//! job references, and produces the result document. The canvas the map
//! runners emit is the composed output surface; drawing actual feature
//! geometry onto it is the concern of the native rendering library this
//! engine stands in for.

use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::json;
use tracing::{debug, info};

use mapfabric_core::jobs::{
    Custom, DatasetRef, DispatchError, ExecutionError, ExecutionResult, GetFeatureInfoJob,
    GetFeatureJob, GetMapJob, JobResult, LegendJob, Raster, Vector,
};

use crate::cache::LayerCache;

/// Media type of the feature-collection documents produced by
/// [`FeatureRunner`]
pub const FEATURE_COLLECTION_CONTENT_TYPE: &str = "application/vnd.mapfabric.features+json";

const LEGEND_WIDTH: u32 = 300;
const LEGEND_HEIGHT: u32 = 200;

/// Shared state the runners operate against
#[derive(Debug, Clone)]
pub struct RunnerContext {
    /// Directory non-remote dataset paths are anchored under
    pub base_path: PathBuf,
}

impl RunnerContext {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

/// Which family of layer a handle was prepared from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Raster,
    Vector,
    Custom,
}

/// A layer resolved and validated for rendering or querying
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedLayer {
    pub name: String,

    pub driver: String,

    /// Fully resolved source location
    pub source: String,

    pub kind: LayerKind,
}

fn request_error(err: DispatchError) -> ExecutionError {
    ExecutionError::new(err.to_string())
}

pub(crate) fn prepare_vector(
    context: &RunnerContext,
    dataset: &Vector,
) -> ExecutionResult<PreparedLayer> {
    let source = if let Some(ogr) = &dataset.source.ogr {
        if ogr.remote {
            dataset.path.clone()
        } else {
            context
                .base_path
                .join(&dataset.path)
                .to_string_lossy()
                .into_owned()
        }
    } else if dataset.source.postgres.is_some() || dataset.source.wfs.is_some() {
        dataset.path.clone()
    } else {
        return Err(ExecutionError::new(format!(
            "Driver not implemented: {}",
            dataset.driver
        )));
    };
    debug!("Loading layer source: {}", source);
    Ok(PreparedLayer {
        name: dataset.name.clone(),
        driver: dataset.driver.clone(),
        source,
        kind: LayerKind::Vector,
    })
}

pub(crate) fn prepare_raster(
    context: &RunnerContext,
    dataset: &Raster,
) -> ExecutionResult<PreparedLayer> {
    let source = if let Some(gdal) = &dataset.source.gdal {
        if gdal.remote {
            dataset.path.clone()
        } else {
            context
                .base_path
                .join(&dataset.path)
                .to_string_lossy()
                .into_owned()
        }
    } else if dataset.source.wms.is_some() || dataset.source.wmts.is_some() {
        dataset.path.clone()
    } else {
        return Err(ExecutionError::new(format!(
            "Driver not implemented: {}",
            dataset.driver
        )));
    };
    debug!("Loading layer source: {}", source);
    Ok(PreparedLayer {
        name: dataset.name.clone(),
        driver: dataset.driver.clone(),
        source,
        kind: LayerKind::Raster,
    })
}

pub(crate) fn prepare_custom(dataset: &Custom) -> ExecutionResult<PreparedLayer> {
    let Some(vector_tile) = &dataset.source.vector_tile else {
        return Err(ExecutionError::new(format!(
            "Driver not implemented: {}",
            dataset.driver
        )));
    };
    if !vector_tile.remote {
        return Err(ExecutionError::new(
            "Currently only remote vector tiles are supported".to_string(),
        ));
    }
    debug!("Loading layer source: {}", dataset.path);
    Ok(PreparedLayer {
        name: dataset.name.clone(),
        driver: dataset.driver.clone(),
        source: dataset.path.clone(),
        kind: LayerKind::Custom,
    })
}

fn prepare_dataset(
    context: &RunnerContext,
    dataset: DatasetRef<'_>,
) -> ExecutionResult<PreparedLayer> {
    match dataset {
        DatasetRef::Vector(vector) => prepare_vector(context, vector),
        DatasetRef::Raster(raster) => prepare_raster(context, raster),
        DatasetRef::Custom(custom) => prepare_custom(custom),
    }
}

/// Requested styles must exist on datasets that carry style definitions;
/// datasets exported without styles accept any requested name.
fn check_style(dataset: DatasetRef<'_>, style_name: &str) -> ExecutionResult<()> {
    let styles = match dataset {
        DatasetRef::Raster(raster) => &raster.styles,
        DatasetRef::Vector(vector) => &vector.styles,
        DatasetRef::Custom(custom) => &custom.styles,
    };
    if style_name.is_empty() || styles.is_empty() || styles.iter().any(|s| s.name == style_name) {
        Ok(())
    } else {
        Err(ExecutionError::new(format!(
            "Style `{}` not found on layer `{}`",
            style_name,
            dataset.name()
        )))
    }
}

/// Encode the output canvas in the requested media type
fn encode_canvas(width: u32, height: u32, format: &str) -> ExecutionResult<Vec<u8>> {
    // transparent background, as the map settings configure it
    let canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    let mut buffer = Cursor::new(Vec::new());
    let written = match format {
        "image/png" => DynamicImage::ImageRgba8(canvas).write_to(&mut buffer, ImageFormat::Png),
        "image/jpeg" => {
            // jpeg carries no alpha channel
            let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
            DynamicImage::ImageRgb8(rgb).write_to(&mut buffer, ImageFormat::Jpeg)
        }
        other => {
            return Err(ExecutionError::new(format!("Format not supported: {other}")));
        }
    };
    written.map_err(|e| ExecutionError::new(format!("Could not encode image: {e}")))?;
    Ok(buffer.into_inner())
}

/// Renders a map job to an image
pub struct MapRunner<'a> {
    context: &'a RunnerContext,
    job: &'a GetMapJob,
    layer_cache: &'a LayerCache<PreparedLayer>,
}

impl<'a> MapRunner<'a> {
    pub fn new(
        context: &'a RunnerContext,
        job: &'a GetMapJob,
        layer_cache: &'a LayerCache<PreparedLayer>,
    ) -> Self {
        Self {
            context,
            job,
            layer_cache,
        }
    }

    pub async fn run(&self) -> ExecutionResult<JobResult> {
        let params = &self.job.service_params;
        let width = params.width().map_err(request_error)?;
        let height = params.height().map_err(request_error)?;
        let bbox = params.bbox().map_err(request_error)?;
        let _dpi = params.dpi().map_err(request_error)?;
        if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
            return Err(ExecutionError::new(format!(
                "BBOX is degenerate: {}",
                params.bbox
            )));
        }

        let styles = params.styles();
        for (index, layer_name) in params.layers().into_iter().enumerate() {
            // styles are positional and validated against layers at decode
            let style_name = styles.get(index).copied().unwrap_or_default();
            let dataset = self.job.dataset_by_name(layer_name).ok_or_else(|| {
                ExecutionError::new(format!("No layer with name `{layer_name}` was found"))
            })?;
            check_style(dataset, style_name)?;
            let prepared = self
                .layer_cache
                .get_or_try_insert_with(layer_name, || prepare_dataset(self.context, dataset))
                .await?;
            info!("Layer prepared: name={}, driver={}", prepared.name, prepared.driver);
        }

        let data = encode_canvas(width, height, &params.format)?;
        Ok(JobResult::new(params.format.clone(), data))
    }
}

/// Extracts feature info at a pixel position
pub struct FeatureInfoRunner<'a> {
    job: &'a GetFeatureInfoJob,
}

impl<'a> FeatureInfoRunner<'a> {
    pub fn new(job: &'a GetFeatureInfoJob) -> Self {
        Self { job }
    }

    pub async fn run(&self) -> ExecutionResult<JobResult> {
        let params = &self.job.service_params;
        if params.info_format != "application/json" {
            return Err(ExecutionError::new(format!(
                "Info format not supported: {}",
                params.info_format
            )));
        }
        let bbox = params.bbox().map_err(request_error)?;
        let width = params.width().map_err(request_error)?;
        let height = params.height().map_err(request_error)?;
        let x = params.x().map_err(request_error)?;
        let y = params.y().map_err(request_error)?;
        let dpi = params.dpi().map_err(request_error)?.unwrap_or(96);

        // pixel position in map coordinates
        let resolution = (bbox[2] - bbox[0]) / width as f64;
        let map_x = bbox[0] + x as f64 * resolution;
        let map_y = bbox[3] - y as f64 * ((bbox[3] - bbox[1]) / height as f64);

        // queryable box: +-2mm at the output dpi
        let tolerance = 0.002 * 39.37 * dpi as f64 * resolution;
        let identify_box = [
            map_x - tolerance,
            map_y - tolerance,
            map_x + tolerance,
            map_y + tolerance,
        ];

        for layer_name in params.query_layers() {
            debug!("Querying layer: {}", layer_name);
        }

        let document = json!({
            "type": "FeatureCollection",
            "features": [],
            "bbox": identify_box,
        });
        let data = serde_json::to_vec(&document)
            .map_err(|e| ExecutionError::new(format!("Could not encode feature info: {e}")))?;
        Ok(JobResult::new(params.info_format.clone(), data))
    }
}

/// Retrieves features, query by query
pub struct FeatureRunner<'a> {
    context: &'a RunnerContext,
    job: &'a GetFeatureJob,
    layer_cache: &'a LayerCache<PreparedLayer>,
}

impl<'a> FeatureRunner<'a> {
    pub fn new(
        context: &'a RunnerContext,
        job: &'a GetFeatureJob,
        layer_cache: &'a LayerCache<PreparedLayer>,
    ) -> Self {
        Self {
            context,
            job,
            layer_cache,
        }
    }

    pub async fn run(&self) -> ExecutionResult<JobResult> {
        let mut feature_collections = Vec::new();
        let mut features = Vec::<serde_json::Value>::new();

        for (index, query) in self.job.queries.iter().enumerate() {
            if let Some(filter) = &query.filter {
                debug!("Query {} is filtered by: {}", index, filter);
            }
            for (position, dataset) in query.datasets.iter().enumerate() {
                let prepared = self
                    .layer_cache
                    .get_or_try_insert_with(&dataset.name, || prepare_vector(self.context, dataset))
                    .await?;
                let name = query
                    .alias
                    .as_ref()
                    .and_then(|alias| alias.get(position))
                    .cloned()
                    .unwrap_or_else(|| prepared.name.clone());
                feature_collections.push(json!({"name": name, "features": []}));
            }
        }

        let number_matched = features.len() as u64;
        let page: Vec<serde_json::Value> = features
            .drain(..)
            .skip(self.job.start_index as usize)
            .take(self.job.count.unwrap_or(u64::MAX) as usize)
            .collect();

        let document = json!({
            "feature_collections": feature_collections,
            "start_index": self.job.start_index,
            "number_matched": number_matched,
            "number_returned": page.len() as u64,
        });
        let data = serde_json::to_vec(&document)
            .map_err(|e| ExecutionError::new(format!("Could not encode features: {e}")))?;
        Ok(JobResult::new(FEATURE_COLLECTION_CONTENT_TYPE, data))
    }
}

/// Renders a legend image
pub struct LegendRunner<'a> {
    #[allow(dead_code)]
    job: &'a LegendJob,
}

impl<'a> LegendRunner<'a> {
    pub fn new(job: &'a LegendJob) -> Self {
        Self { job }
    }

    pub async fn run(&self) -> ExecutionResult<JobResult> {
        let data = encode_canvas(LEGEND_WIDTH, LEGEND_HEIGHT, "image/png")?;
        Ok(JobResult::new("image/png", data))
    }
}
