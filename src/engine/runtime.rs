//! Session-level wiring of the map components
//!
//! [`MapEngine`] owns the registry for one page/application session and routes
//! incoming events (filter, range filter, legend clicks, surface callbacks)
//! to the components that handle them. Registry access is serialized through
//! a mutex that is never held across an await point or while events are
//! being published.

use super::borders::{BorderLayerLoader, BorderLoadReport, GeometryFetcher, RoutingFetcher};
use super::error::MapError;
use super::events::{EventBus, MapEvent};
use super::filter::FilterReconciler;
use super::legend::{LegendController, LegendTarget};
use super::registry::{MapHandle, MapInstance, MapRegistry, MapSummary};
use super::view::{ViewController, ViewState};
use crate::config::Config;
use crate::model::{Dataset, FilterEvent};
use crate::monitoring::MapLogger;
use crate::options::{MapOptions, MapOptionsPatch};
use crate::surface::{LayerId, SurfaceEvent, SurfaceFactory};
use futures::future::{self, BoxFuture, FutureExt};
use log::{debug, info, warn};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// The unfiltered input a map was mounted with
#[derive(Debug, Clone)]
struct Mount {
    dataset: Dataset,
    options: MapOptions,
}

/// Result of (re)building a map
///
/// Markers and legend are in place when this is returned; border layers
/// arrive when `borders` is awaited. Dropping it skips the border fetches.
#[must_use = "border layers are only fetched when the rebuild is settled"]
pub struct Rebuild {
    /// `None` when the mapping surface was unavailable and nothing was built
    pub handle: Option<MapHandle>,
    pub borders: BoxFuture<'static, BorderLoadReport>,
}

impl Rebuild {
    fn skipped() -> Self {
        Self {
            handle: None,
            borders: future::ready(BorderLoadReport::default()).boxed(),
        }
    }

    pub fn is_built(&self) -> bool {
        self.handle.is_some()
    }

    /// Wait for border layers and return the handle alongside their report
    pub async fn settle(self) -> (Option<MapHandle>, BorderLoadReport) {
        let report = self.borders.await;
        (self.handle, report)
    }
}

impl std::fmt::Debug for Rebuild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rebuild").field("handle", &self.handle).finish_non_exhaustive()
    }
}

pub struct MapEngine {
    registry: Arc<Mutex<MapRegistry>>,
    factory: Arc<dyn SurfaceFactory>,
    loader: BorderLayerLoader,
    reconciler: FilterReconciler,
    view: ViewController,
    bus: Arc<EventBus>,
    mounts: HashMap<String, Mount>,
    site_options: MapOptionsPatch,
    logger: MapLogger,
}

impl MapEngine {
    /// `site_options` apply to every map underneath its own options
    pub fn new(
        factory: Arc<dyn SurfaceFactory>,
        fetcher: Arc<dyn GeometryFetcher>,
        site_options: MapOptionsPatch,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let auto_show_map = MapOptions::merged(&site_options).auto_show_map;

        Self {
            registry: Arc::new(Mutex::new(MapRegistry::new())),
            factory,
            loader: BorderLayerLoader::new(fetcher, Arc::clone(&bus)),
            reconciler: FilterReconciler::new(),
            view: ViewController::new(auto_show_map, Arc::clone(&bus)),
            bus,
            mounts: HashMap::new(),
            site_options,
            logger: MapLogger::default(),
        }
    }

    /// Engine configured from the on-disk config, fetching borders over HTTP or from disk
    pub fn from_config(config: &Config, factory: Arc<dyn SurfaceFactory>) -> anyhow::Result<Self> {
        let fetcher = RoutingFetcher::from_config(&config.http)?;
        let logger = MapLogger::new(config.monitoring.clone());
        Ok(Self::new(factory, Arc::new(fetcher), config.map.clone()).with_logger(logger))
    }

    pub fn with_logger(mut self, logger: MapLogger) -> Self {
        self.loader = self.loader.with_logger(logger.clone());
        self.view = self.view.with_logger(logger.clone());
        self.logger = logger;
        self
    }

    pub fn with_reconciler(mut self, reconciler: FilterReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn registry(&self) -> Arc<Mutex<MapRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn view_state(&self) -> ViewState {
        self.view.state()
    }

    pub fn spinner_visible(&self) -> bool {
        self.view.spinner_visible()
    }

    fn lock_registry(&self) -> MutexGuard<'_, MapRegistry> {
        self.registry.lock().unwrap_or_else(|poisoned| {
            warn!("Map registry lock was poisoned; continuing with inner state");
            poisoned.into_inner()
        })
    }

    /// Build a map from its full dataset and remember both for later filtering
    ///
    /// With `autoShowMap`, the map view is switched to unless the page has
    /// already moved between map and list.
    pub fn mount(&mut self, map_id: &str, dataset: Dataset, options: &MapOptionsPatch) -> Rebuild {
        let options = MapOptions::merged(&self.site_options).apply(options);
        let rebuild = self.build(map_id, &dataset, &options);
        let auto_show = options.auto_show_map;
        self.mounts.insert(map_id.to_string(), Mount { dataset, options });

        if auto_show && rebuild.is_built() && !self.view.has_switched() {
            self.view.show_map(&self.registry, map_id, true);
        }
        rebuild
    }

    /// Filter the mounted dataset and rebuild the map from what survives
    pub fn on_filter(&mut self, map_id: &str, event: &FilterEvent) -> Result<Rebuild, MapError> {
        let mount = self
            .mounts
            .get(map_id)
            .cloned()
            .ok_or_else(|| MapError::UnknownMap(map_id.to_string()))?;

        let mut context = self.logger.start_operation("filter", map_id);
        let outcome = self.reconciler.apply(&mount.dataset, event);
        self.logger.add_metadata(&mut context, "applied", json!(outcome.applied));
        self.logger.add_metadata(&mut context, "surviving", json!(outcome.surviving_entries));
        self.logger.complete_operation(&context, true);

        if outcome.applied {
            self.bus.publish(MapEvent::ResultCountChanged {
                map_id: map_id.to_string(),
                count: outcome.surviving_entries,
            });
        }

        let rebuild = self.build(map_id, &outcome.dataset, &mount.options);
        if rebuild.is_built() && self.view.state() == ViewState::MapVisible {
            self.view.show_map(&self.registry, map_id, false);
        }
        Ok(rebuild)
    }

    fn build(&mut self, map_id: &str, dataset: &Dataset, options: &MapOptions) -> Rebuild {
        let mut context = self.logger.start_operation("rebuild", map_id);
        self.view.forget_map(map_id);

        let (existed, created, live) = {
            let mut registry = self.lock_registry();
            let existed = registry.contains(map_id);
            let created = registry.create(map_id, dataset, options.clone(), self.factory.as_ref());
            (existed, created, registry.contains(map_id))
        };

        let handle = match created {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Map '{}' not rendered: {}", map_id, e);
                self.logger.log_failure(&context, &e.to_string());
                self.logger.complete_operation(&context, false);
                if existed && !live {
                    self.bus.publish(MapEvent::MapDestroyed {
                        map_id: map_id.to_string(),
                    });
                }
                return Rebuild::skipped();
            }
        };

        if existed {
            self.bus.publish(MapEvent::MapDestroyed {
                map_id: map_id.to_string(),
            });
        }
        self.bus.publish(MapEvent::MapInitialized {
            map_id: map_id.to_string(),
            generation: handle.generation,
        });

        self.logger.add_metadata(&mut context, "generation", json!(handle.generation));
        self.logger.add_metadata(&mut context, "categories", json!(dataset.len()));
        self.logger.complete_operation(&context, true);

        let borders = if options.wants_borders() {
            let loader = self.loader.clone();
            let registry = Arc::clone(&self.registry);
            let descriptors = options.layer_files.clone();
            let handle = handle.clone();
            async move { loader.load(registry, handle, descriptors).await }.boxed()
        } else {
            future::ready(BorderLoadReport::default()).boxed()
        };

        Rebuild {
            handle: Some(handle),
            borders,
        }
    }

    pub fn show_map(&mut self, map_id: &str, switch_tab: bool) {
        self.view.show_map(&self.registry, map_id, switch_tab);
    }

    pub fn show_list(&mut self) {
        self.view.show_list();
    }

    /// A filter control was clicked while this map may be showing
    pub fn refresh(&mut self, map_id: &str) -> bool {
        self.view.refresh(&self.registry, map_id)
    }

    /// Range slider moved; returns how many maps were refreshed
    pub fn on_range_filter(&mut self) -> usize {
        self.view.on_range_filter(&self.registry)
    }

    pub fn register_validator<F>(&mut self, map_id: &str, validator: F)
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        self.view.register_validator(map_id, validator);
    }

    pub fn unregister_validator(&mut self, map_id: &str) -> bool {
        self.view.unregister_validator(map_id)
    }

    pub fn bind_range_slider(&mut self, map_id: &str) {
        self.view.bind_range_slider(map_id);
    }

    /// Legend click from either legend; `"all"` shows every category
    pub fn toggle_legend(
        &self,
        map_id: &str,
        target: impl Into<LegendTarget>,
    ) -> Result<bool, MapError> {
        let target = target.into();
        let mut registry = self.lock_registry();
        let instance = registry.try_get_mut(map_id)?;
        Ok(LegendController::toggle(instance, &target))
    }

    pub fn set_border_visible(
        &self,
        map_id: &str,
        layer_id: &str,
        visible: bool,
    ) -> Result<bool, MapError> {
        let mut registry = self.lock_registry();
        let instance = registry.try_get_mut(map_id)?;
        Ok(BorderLayerLoader::set_visible(instance, layer_id, visible))
    }

    /// Route a callback from the mapping surface
    pub fn handle_surface_event(
        &mut self,
        map_id: &str,
        event: SurfaceEvent,
    ) -> Result<(), MapError> {
        let mut registry = self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match event {
            SurfaceEvent::OverlayAdd(layer) | SurfaceEvent::OverlayRemove(layer) => {
                let added = matches!(event, SurfaceEvent::OverlayAdd(_));
                let instance = registry.try_get_mut(map_id)?;
                if !LegendController::sync_overlay(instance, layer, added) {
                    debug!("Map '{}': overlay event for non-category layer {}", map_id, layer);
                }
            }
            SurfaceEvent::MoveEnd { center, zoom } => {
                let instance = registry.try_get_mut(map_id)?;
                instance.center = center;
                instance.zoom = zoom;
                registry.remember_view(map_id, center, zoom);
            }
            SurfaceEvent::MarkerClick(layer) => {
                let instance = registry.try_get_mut(map_id)?;
                if self.view.open_popup(instance, layer).is_none() {
                    debug!("Map '{}': click on unknown marker layer {}", map_id, layer);
                }
            }
        }
        Ok(())
    }

    /// Popup next/previous; returns the new indicator text if the page changed
    pub fn page_nav(&mut self, map_id: &str, layer: LayerId, direction: isize) -> Option<String> {
        self.view.page_nav(map_id, layer, direction)
    }

    pub fn with_map<R>(&self, map_id: &str, f: impl FnOnce(&MapInstance) -> R) -> Option<R> {
        let registry = self.lock_registry();
        registry.get(map_id).map(f)
    }

    pub fn summary(&self, map_id: &str) -> Option<MapSummary> {
        self.with_map(map_id, MapInstance::summary)
    }

    /// Tear down one map and forget its dataset
    ///
    /// Validators and range-slider bindings belong to the page and survive.
    pub fn destroy(&mut self, map_id: &str) -> bool {
        let existed = self.lock_registry().destroy(map_id);
        self.mounts.remove(map_id);
        self.view.forget_map(map_id);

        if existed {
            self.bus.publish(MapEvent::MapDestroyed {
                map_id: map_id.to_string(),
            });
        }
        existed
    }

    /// End of session: release every surface
    pub fn shutdown(&mut self) {
        let ids: Vec<String> = self.lock_registry().ids().into_iter().map(str::to_string).collect();
        for map_id in &ids {
            self.destroy(map_id);
        }
        self.lock_registry().clear();
        self.mounts.clear();
        info!("Map engine shut down ({} map(s) released)", ids.len());
    }
}

impl std::fmt::Debug for MapEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapEngine")
            .field("maps", &self.mounts.keys().collect::<Vec<_>>())
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}
