//! Asynchronous border overlay loading
//!
//! Each descriptor is fetched on its own. Results attach in completion order,
//! and only if the map they were requested for is still the live incarnation.

use super::error::MapError;
use super::events::{EventBus, MapEvent};
use super::registry::{BorderLayer, MapHandle, MapInstance, MapRegistry};
use crate::config::HttpConfig;
use crate::model::BorderLayerDescriptor;
use crate::monitoring::MapLogger;
use crate::surface::OverlayStyle;
use anyhow::Context;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

const GEOMETRY_TYPES: [&str; 9] = [
    "FeatureCollection",
    "Feature",
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

/// Retrieves boundary geometry for one descriptor
#[async_trait]
pub trait GeometryFetcher: Send + Sync {
    async fn fetch(&self, descriptor: &BorderLayerDescriptor) -> Result<Value, MapError>;
}

/// Reject payloads that are JSON but not GeoJSON
pub fn validate_geometry(descriptor_id: &str, geometry: &Value) -> Result<(), MapError> {
    let kind = geometry
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| MapError::InvalidGeometry {
            descriptor_id: descriptor_id.to_string(),
            reason: "missing top-level \"type\"".to_string(),
        })?;

    if GEOMETRY_TYPES.contains(&kind) {
        Ok(())
    } else {
        Err(MapError::InvalidGeometry {
            descriptor_id: descriptor_id.to_string(),
            reason: format!("unsupported type \"{}\"", kind),
        })
    }
}

/// Fetches geometry over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpGeometryFetcher {
    http_client: reqwest::Client,
}

impl HttpGeometryFetcher {
    pub fn new(config: &HttpConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(config.pool_idle_timeout())
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl GeometryFetcher for HttpGeometryFetcher {
    async fn fetch(&self, descriptor: &BorderLayerDescriptor) -> Result<Value, MapError> {
        debug!("GET {} for border layer '{}'", descriptor.url, descriptor.id);
        let response = self
            .http_client
            .get(&descriptor.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| MapError::from_reqwest_error(&descriptor.id, &e))?;

        response
            .json::<Value>()
            .await
            .map_err(|e| MapError::from_reqwest_error(&descriptor.id, &e))
    }
}

/// Reads geometry from disk, for `file://` URLs and plain paths
#[derive(Debug, Clone, Default)]
pub struct FileGeometryFetcher {
    base_dir: Option<PathBuf>,
}

impl FileGeometryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `base_dir`
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl GeometryFetcher for FileGeometryFetcher {
    async fn fetch(&self, descriptor: &BorderLayerDescriptor) -> Result<Value, MapError> {
        let path = self.resolve(&descriptor.url);
        debug!("Reading {:?} for border layer '{}'", path, descriptor.id);

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MapError::FetchFailure {
                descriptor_id: descriptor.id.clone(),
                reason: format!("{}: {}", path.display(), e),
            })?;

        serde_json::from_str(&content).map_err(|e| MapError::InvalidGeometry {
            descriptor_id: descriptor.id.clone(),
            reason: e.to_string(),
        })
    }
}

/// Sends http(s) URLs to one fetcher and everything else to another
#[derive(Clone)]
pub struct RoutingFetcher {
    http: Arc<dyn GeometryFetcher>,
    file: Arc<dyn GeometryFetcher>,
}

impl RoutingFetcher {
    pub fn new(http: Arc<dyn GeometryFetcher>, file: Arc<dyn GeometryFetcher>) -> Self {
        Self { http, file }
    }

    pub fn from_config(config: &HttpConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            Arc::new(HttpGeometryFetcher::new(config)?),
            Arc::new(FileGeometryFetcher::new()),
        ))
    }
}

#[async_trait]
impl GeometryFetcher for RoutingFetcher {
    async fn fetch(&self, descriptor: &BorderLayerDescriptor) -> Result<Value, MapError> {
        let url = descriptor.url.to_ascii_lowercase();
        if url.starts_with("http://") || url.starts_with("https://") {
            self.http.fetch(descriptor).await
        } else {
            self.file.fetch(descriptor).await
        }
    }
}

/// In-memory fetcher keyed by URL
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    responses: HashMap<String, Result<Value, String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geometry(mut self, url: impl Into<String>, geometry: Value) -> Self {
        self.responses.insert(url.into(), Ok(geometry));
        self
    }

    pub fn with_failure(mut self, url: impl Into<String>, reason: impl Into<String>) -> Self {
        self.responses.insert(url.into(), Err(reason.into()));
        self
    }

    /// An empty feature collection, enough to draw nothing
    pub fn empty_collection() -> Value {
        json!({ "type": "FeatureCollection", "features": [] })
    }
}

#[async_trait]
impl GeometryFetcher for StaticFetcher {
    async fn fetch(&self, descriptor: &BorderLayerDescriptor) -> Result<Value, MapError> {
        match self.responses.get(&descriptor.url) {
            Some(Ok(geometry)) => Ok(geometry.clone()),
            Some(Err(reason)) => Err(MapError::FetchFailure {
                descriptor_id: descriptor.id.clone(),
                reason: reason.clone(),
            }),
            None => Err(MapError::FetchFailure {
                descriptor_id: descriptor.id.clone(),
                reason: "HTTP 404".to_string(),
            }),
        }
    }
}

/// Outcome of one load call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BorderLoadReport {
    /// Descriptor ids attached, in completion order
    pub attached: Vec<String>,
    pub failed: Vec<(String, MapError)>,
    /// Results discarded because the map was replaced or destroyed
    pub stale: Vec<String>,
}

#[derive(Clone)]
pub struct BorderLayerLoader {
    fetcher: Arc<dyn GeometryFetcher>,
    bus: Arc<EventBus>,
    logger: MapLogger,
}

impl BorderLayerLoader {
    pub fn new(fetcher: Arc<dyn GeometryFetcher>, bus: Arc<EventBus>) -> Self {
        Self {
            fetcher,
            bus,
            logger: MapLogger::default(),
        }
    }

    pub fn with_logger(mut self, logger: MapLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Fetch every descriptor concurrently and attach what resolves
    ///
    /// The registry lock is taken only to attach a finished result, never
    /// while a fetch is pending.
    pub async fn load(
        &self,
        registry: Arc<Mutex<MapRegistry>>,
        handle: MapHandle,
        descriptors: Vec<BorderLayerDescriptor>,
    ) -> BorderLoadReport {
        let mut report = BorderLoadReport::default();
        if descriptors.is_empty() {
            return report;
        }

        let mut context = self.logger.start_operation("border_fetch", &handle.map_id);
        self.logger.add_metadata(&mut context, "descriptors", json!(descriptors.len()));

        let mut pending: FuturesUnordered<_> = descriptors
            .iter()
            .map(|descriptor| async move {
                let result = self.fetcher.fetch(descriptor).await.and_then(|geometry| {
                    validate_geometry(&descriptor.id, &geometry)?;
                    Ok(geometry)
                });
                (descriptor, result)
            })
            .collect();

        while let Some((descriptor, result)) = pending.next().await {
            let geometry = match result {
                Ok(geometry) => geometry,
                Err(e) => {
                    warn!("Map '{}': {}", handle.map_id, e);
                    self.logger.log_failure(&context, &e.to_string());
                    report.failed.push((descriptor.id.clone(), e));
                    continue;
                }
            };

            let attached = {
                let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
                if registry.is_current(&handle) {
                    registry
                        .get_mut(&handle.map_id)
                        .map(|instance| Self::attach(instance, descriptor, &geometry))
                        .is_some()
                } else {
                    false
                }
            };

            if attached {
                report.attached.push(descriptor.id.clone());
                self.bus.publish(MapEvent::BorderLayerAttached {
                    map_id: handle.map_id.clone(),
                    layer_id: descriptor.id.clone(),
                });
            } else {
                let stale = MapError::StaleCallback {
                    map_id: handle.map_id.clone(),
                };
                debug!("Border layer '{}': {}", descriptor.id, stale);
                report.stale.push(descriptor.id.clone());
            }
        }

        self.logger.add_metadata(&mut context, "attached", json!(report.attached.len()));
        self.logger.add_metadata(&mut context, "failed", json!(report.failed.len()));
        self.logger.add_metadata(&mut context, "stale", json!(report.stale.len()));
        self.logger.complete_operation(&context, report.failed.is_empty());

        info!(
            "Map '{}': {} border layer(s) attached, {} failed, {} stale",
            handle.map_id,
            report.attached.len(),
            report.failed.len(),
            report.stale.len()
        );
        report
    }

    /// Put a resolved geometry on the surface with its checkbox
    ///
    /// Returns the checkbox id. A descriptor id that is already attached is
    /// left as it is.
    pub fn attach(
        instance: &mut MapInstance,
        descriptor: &BorderLayerDescriptor,
        geometry: &Value,
    ) -> String {
        if let Some(existing) = instance.border_layer(&descriptor.id) {
            debug!("Map '{}': border layer '{}' already attached", instance.id, descriptor.id);
            return existing.checkbox_id.clone();
        }

        let checkbox_id = format!("oes-map-layer-{}_{}", instance.id, descriptor.id);
        let header = instance.options.legend_label_borders.clone();

        let surface = instance.surface_mut();
        let layer = surface.geojson_overlay(geometry, &OverlayStyle::border());
        surface.add_layer(layer);
        surface.border_checkbox(&checkbox_id, &descriptor.name, &header, true);

        instance.border_layers.push(BorderLayer {
            id: descriptor.id.clone(),
            source_url: descriptor.url.clone(),
            name: descriptor.name.clone(),
            visible: true,
            checkbox_id: checkbox_id.clone(),
            layer,
        });
        checkbox_id
    }

    /// Checkbox toggle: show or hide one border layer; false if unknown
    pub fn set_visible(instance: &mut MapInstance, layer_id: &str, visible: bool) -> bool {
        let Some(index) = instance.border_layers.iter().position(|b| b.id == layer_id) else {
            return false;
        };

        let layer = instance.border_layers[index].layer;
        let surface = instance.surface_mut();
        if visible && !surface.has_layer(layer) {
            surface.add_layer(layer);
        } else if !visible && surface.has_layer(layer) {
            surface.remove_layer(layer);
        }
        instance.border_layers[index].visible = visible;
        true
    }
}

impl std::fmt::Debug for BorderLayerLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BorderLayerLoader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryData, Dataset, EntryRecord};
    use crate::options::MapOptions;
    use crate::surface::{HeadlessFactory, HeadlessLayer};

    fn states() -> BorderLayerDescriptor {
        BorderLayerDescriptor::new("states", "https://example.org/states.geojson", "States")
    }

    fn rivers() -> BorderLayerDescriptor {
        BorderLayerDescriptor::new("rivers", "https://example.org/rivers.geojson", "Rivers")
    }

    fn setup() -> (Arc<Mutex<MapRegistry>>, HeadlessFactory, MapHandle) {
        let factory = HeadlessFactory::new();
        let mut registry = MapRegistry::new();
        let dataset = Dataset::new().with_category(
            "cat1",
            CategoryData::new("Places", vec![EntryRecord::new("1", 52.5, 13.4)]),
        );
        let options = MapOptions::builder().layer_file(states()).layer_file(rivers()).build();
        let handle = registry.create("m", &dataset, options, &factory).unwrap();
        (Arc::new(Mutex::new(registry)), factory, handle)
    }

    fn loader(fetcher: StaticFetcher) -> BorderLayerLoader {
        BorderLayerLoader::new(Arc::new(fetcher), Arc::new(EventBus::new()))
    }

    #[test]
    fn test_validate_geometry_types() {
        assert!(validate_geometry("x", &StaticFetcher::empty_collection()).is_ok());
        assert!(validate_geometry("x", &json!({"type": "Polygon", "coordinates": []})).is_ok());
        assert!(matches!(
            validate_geometry("x", &json!({"type": "Banana"})),
            Err(MapError::InvalidGeometry { .. })
        ));
        assert!(validate_geometry("x", &json!([1, 2, 3])).is_err());
    }

    #[tokio::test]
    async fn test_failed_fetch_does_not_block_siblings() {
        let (registry, factory, handle) = setup();
        let fetcher = StaticFetcher::new()
            .with_geometry(states().url, StaticFetcher::empty_collection())
            .with_failure(rivers().url, "connection refused");

        let report = loader(fetcher)
            .load(Arc::clone(&registry), handle, vec![states(), rivers()])
            .await;

        assert_eq!(report.attached, vec!["states"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "rivers");

        let surface = factory.latest().unwrap();
        assert_eq!(surface.checkboxes.len(), 1);
        assert_eq!(surface.checkboxes[0].id, "oes-map-layer-m_states");
        assert!(surface.checkboxes[0].checked);
        assert_eq!(surface.border_header.as_deref(), Some("Show borders"));
        assert_eq!(surface.visible_overlays().len(), 1);

        let registry = registry.lock().unwrap();
        let instance = registry.get("m").unwrap();
        assert_eq!(instance.border_layers.len(), 1);
        assert_eq!(instance.visible_entry_ids(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_overlay_uses_border_style() {
        let (registry, factory, handle) = setup();
        let fetcher =
            StaticFetcher::new().with_geometry(states().url, StaticFetcher::empty_collection());

        loader(fetcher).load(registry, handle, vec![states()]).await;

        let surface = factory.latest().unwrap();
        let overlay = surface.visible_overlays()[0];
        match &surface.layers[&overlay] {
            HeadlessLayer::Overlay { style, .. } => assert_eq!(*style, OverlayStyle::border()),
            other => panic!("expected overlay, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_geometry_is_absorbed() {
        let (registry, factory, handle) = setup();
        let fetcher = StaticFetcher::new().with_geometry(states().url, json!({"hello": "world"}));

        let report = loader(fetcher).load(registry, handle, vec![states()]).await;

        assert!(report.attached.is_empty());
        assert!(matches!(report.failed[0].1, MapError::InvalidGeometry { .. }));
        assert!(factory.latest().unwrap().checkboxes.is_empty());
    }

    #[tokio::test]
    async fn test_result_for_replaced_map_is_discarded() {
        let (registry, factory, handle) = setup();
        let fetcher =
            StaticFetcher::new().with_geometry(states().url, StaticFetcher::empty_collection());
        let loader = loader(fetcher);
        let pending = loader.load(Arc::clone(&registry), handle, vec![states()]);

        registry
            .lock()
            .unwrap()
            .create("m", &Dataset::new(), MapOptions::default(), &factory)
            .unwrap();

        let report = pending.await;
        assert_eq!(report.stale, vec!["states"]);
        assert!(report.attached.is_empty());
        assert!(registry.lock().unwrap().get("m").unwrap().border_layers.is_empty());
        assert!(factory.latest().unwrap().checkboxes.is_empty());
    }

    #[tokio::test]
    async fn test_checkbox_toggles_only_its_layer() {
        let (registry, _factory, handle) = setup();
        let fetcher = StaticFetcher::new()
            .with_geometry(states().url, StaticFetcher::empty_collection())
            .with_geometry(rivers().url, StaticFetcher::empty_collection());

        loader(fetcher)
            .load(Arc::clone(&registry), handle, vec![states(), rivers()])
            .await;

        let mut registry = registry.lock().unwrap();
        let instance = registry.get_mut("m").unwrap();
        let rivers_layer = instance.border_layer("rivers").unwrap().layer;
        let states_layer = instance.border_layer("states").unwrap().layer;

        assert!(BorderLayerLoader::set_visible(instance, "states", false));
        assert!(!instance.surface().has_layer(states_layer));
        assert!(instance.surface().has_layer(rivers_layer));
        assert!(!instance.border_layer("states").unwrap().visible);
        assert_eq!(instance.visible_entry_ids(), vec!["1"]);

        assert!(BorderLayerLoader::set_visible(instance, "states", true));
        assert!(instance.surface().has_layer(states_layer));
        assert!(!BorderLayerLoader::set_visible(instance, "lakes", false));
    }

    #[tokio::test]
    async fn test_file_fetcher_reads_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("states.geojson"),
            StaticFetcher::empty_collection().to_string(),
        )
        .unwrap();

        let fetcher = FileGeometryFetcher::with_base_dir(dir.path());
        let found = fetcher
            .fetch(&BorderLayerDescriptor::new("s", "states.geojson", "States"))
            .await
            .unwrap();
        assert_eq!(found["type"], "FeatureCollection");

        let missing = fetcher
            .fetch(&BorderLayerDescriptor::new("x", "file://nowhere.geojson", "X"))
            .await;
        assert!(matches!(missing, Err(MapError::FetchFailure { .. })));
    }

    #[tokio::test]
    async fn test_routing_by_scheme() {
        let http = StaticFetcher::new().with_geometry(states().url, json!({"type": "Feature"}));
        let file = StaticFetcher::new().with_geometry("local.json", json!({"type": "Polygon"}));
        let router = RoutingFetcher::new(Arc::new(http), Arc::new(file));

        let remote = router.fetch(&states()).await.unwrap();
        assert_eq!(remote["type"], "Feature");
        let local = router
            .fetch(&BorderLayerDescriptor::new("l", "local.json", "Local"))
            .await
            .unwrap();
        assert_eq!(local["type"], "Polygon");
    }

    /// Answer a single request on a local port with a canned response
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/states.geojson", addr)
    }

    fn http_fetcher() -> HttpGeometryFetcher {
        HttpGeometryFetcher::new(&HttpConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_http_fetcher_reads_geojson() {
        let url = serve_once("200 OK", r#"{"type": "FeatureCollection", "features": []}"#).await;

        let geometry = http_fetcher()
            .fetch(&BorderLayerDescriptor::new("states", url, "States"))
            .await
            .unwrap();

        assert_eq!(geometry["type"], "FeatureCollection");
    }

    #[tokio::test]
    async fn test_http_status_is_a_fetch_failure() {
        let url = serve_once("404 Not Found", "").await;

        let result = http_fetcher()
            .fetch(&BorderLayerDescriptor::new("states", url, "States"))
            .await;

        assert_eq!(
            result,
            Err(MapError::FetchFailure {
                descriptor_id: "states".to_string(),
                reason: "HTTP 404".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_geometry() {
        let url = serve_once("200 OK", "{\"type\": \"FeatureCollection\", ").await;

        let result = http_fetcher()
            .fetch(&BorderLayerDescriptor::new("states", url, "States"))
            .await;

        assert!(matches!(
            result,
            Err(MapError::InvalidGeometry { ref descriptor_id, .. }) if descriptor_id == "states"
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_fetch_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/states.geojson", listener.local_addr().unwrap());
        drop(listener);

        let result = http_fetcher()
            .fetch(&BorderLayerDescriptor::new("states", url, "States"))
            .await;

        assert!(matches!(
            result,
            Err(MapError::FetchFailure { ref reason, .. }) if reason == "connection failed"
        ));
    }
}
