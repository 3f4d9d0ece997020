//! Execution engine behind the `JobExecutor` seam
//!
//! One [`Engine`] lives for the whole worker process and owns the layer
//! cache; jobs of every kind funnel through [`Engine::process`] into the
//! per-kind runners.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use mapfabric_core::jobs::{ExecutionResult, Job, JobExecutor, JobResult};

use crate::cache::LayerCache;
use crate::runner::{
    FeatureInfoRunner, FeatureRunner, LegendRunner, MapRunner, PreparedLayer, RunnerContext,
};

/// Process-wide engine configuration
#[derive(Debug, Clone)]
pub struct EngineContext {
    /// Directory non-remote dataset paths are anchored under
    pub data_root: PathBuf,
}

impl EngineContext {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }
}

/// Executes decoded jobs sequentially; one instance per worker process
pub struct Engine {
    context: RunnerContext,

    /// Additional symbol search paths handed to the rendering backend
    svg_paths: Vec<String>,

    layer_cache: LayerCache<PreparedLayer>,
}

impl Engine {
    pub fn new(context: EngineContext, svg_paths: Vec<String>) -> Self {
        info!(
            "Engine initialized: data_root={}, svg_paths={:?}",
            context.data_root.display(),
            svg_paths
        );
        Self {
            context: RunnerContext::new(context.data_root),
            svg_paths,
            layer_cache: LayerCache::new(),
        }
    }

    pub fn svg_paths(&self) -> &[String] {
        &self.svg_paths
    }

    /// Number of layers currently held by the cache
    pub async fn cached_layers(&self) -> usize {
        self.layer_cache.len().await
    }
}

#[async_trait]
impl JobExecutor for Engine {
    async fn process(&self, job: &Job) -> ExecutionResult<JobResult> {
        match job {
            Job::GetMap(job) => {
                MapRunner::new(&self.context, job, &self.layer_cache)
                    .run()
                    .await
            }
            Job::GetFeatureInfo(job) => FeatureInfoRunner::new(job).run().await,
            Job::GetFeature(job) => {
                FeatureRunner::new(&self.context, job, &self.layer_cache)
                    .run()
                    .await
            }
            Job::Legend(job) => LegendRunner::new(job).run().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapfabric_core::jobs::{
        DataSource, GdalSource, GetMapJob, LegendJob, Raster, WmsMapParams,
    };

    fn engine() -> Engine {
        Engine::new(EngineContext::new("/io/data"), vec!["/io/svg".to_string()])
    }

    fn map_job() -> Job {
        Job::GetMap(GetMapJob {
            service_params: WmsMapParams {
                bbox: "0,0,10,10".to_string(),
                crs: "EPSG:4326".to_string(),
                width: "32".to_string(),
                height: "32".to_string(),
                layers: "relief".to_string(),
                styles: Some("default".to_string()),
                format: "image/png".to_string(),
                dpi: None,
                format_options: None,
            },
            raster_layers: vec![Raster {
                name: "relief".to_string(),
                title: None,
                path: "relief.tif".to_string(),
                driver: "gdal".to_string(),
                source: DataSource {
                    gdal: Some(GdalSource {
                        path: "relief.tif".to_string(),
                        layer_name: None,
                        remote: false,
                    }),
                    ..DataSource::default()
                },
                styles: vec![],
                crs: None,
                bbox: None,
                bbox_wgs84: None,
            }],
            vector_layers: vec![],
            custom_layers: vec![],
            extent_buffer: None,
            svg_paths: vec![],
        })
    }

    #[tokio::test]
    async fn test_layers_are_cached_across_jobs() {
        let engine = engine();
        assert_eq!(engine.cached_layers().await, 0);

        engine.process(&map_job()).await.unwrap();
        assert_eq!(engine.cached_layers().await, 1);

        engine.process(&map_job()).await.unwrap();
        assert_eq!(engine.cached_layers().await, 1);
    }

    #[tokio::test]
    async fn test_legend_produces_png() {
        let engine = engine();
        let result = engine
            .process(&Job::Legend(LegendJob { svg_paths: vec![] }))
            .await
            .unwrap();
        assert_eq!(result.content_type, "image/png");
        assert!(!result.data.is_empty());
    }
}
