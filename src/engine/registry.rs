//! Live map instances keyed by map identifier
//!
//! At most one instance exists per identifier. Creating a map under an
//! identifier that is already live tears the old one down first, releasing
//! its surface handle before a new one is constructed.

use super::error::MapError;
use super::legend::{LegendControl, LegendController, LegendEntry};
use super::markers::{MarkerGroupBuilder, RenderedGroup, RenderedMarker};
use crate::geo::{Bounds, LatLng, Region};
use crate::model::{CategoryGroup, Dataset};
use crate::options::MapOptions;
use crate::surface::{LayerId, MappingSurface, SurfaceFactory, ViewSettings};
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;

/// Identifies one incarnation of a map
///
/// The generation changes on every create, so async work started for an
/// older incarnation can tell it has been replaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapHandle {
    pub map_id: String,
    pub generation: u64,
}

/// A border overlay attached after its geometry resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorderLayer {
    pub id: String,
    pub source_url: String,
    pub name: String,
    pub visible: bool,
    pub checkbox_id: String,
    #[serde(skip)]
    pub layer: LayerId,
}

/// View state remembered across re-initialisation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RememberedView {
    pub center: LatLng,
    pub zoom: u8,
}

pub struct MapInstance {
    pub id: String,
    pub generation: u64,
    pub center: LatLng,
    pub zoom: u8,
    pub max_zoom: u8,
    pub scroll_zoom: bool,
    pub options: MapOptions,
    pub groups: Vec<RenderedGroup>,
    pub bounds: Bounds,
    pub last_fit: Option<Region>,
    pub legend: Option<LegendControl>,
    pub legend_entries: Vec<LegendEntry>,
    pub border_layers: Vec<BorderLayer>,
    surface: Box<dyn MappingSurface>,
}

impl MapInstance {
    fn new(
        id: &str,
        generation: u64,
        view: &ViewSettings,
        options: MapOptions,
        surface: Box<dyn MappingSurface>,
    ) -> Self {
        Self {
            id: id.to_string(),
            generation,
            center: view.center,
            zoom: view.zoom,
            max_zoom: view.max_zoom,
            scroll_zoom: view.scroll_zoom,
            options,
            groups: Vec::new(),
            bounds: Bounds::new(),
            last_fit: None,
            legend: None,
            legend_entries: Vec::new(),
            border_layers: Vec::new(),
            surface,
        }
    }

    pub fn handle(&self) -> MapHandle {
        MapHandle {
            map_id: self.id.clone(),
            generation: self.generation,
        }
    }

    pub fn surface(&self) -> &dyn MappingSurface {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> &mut dyn MappingSurface {
        self.surface.as_mut()
    }

    pub fn group(&self, category_key: &str) -> Option<&RenderedGroup> {
        self.groups.iter().find(|g| g.key == category_key)
    }

    pub fn legend_entry(&self, category_key: &str) -> Option<&LegendEntry> {
        self.legend_entries.iter().find(|e| e.category_key == category_key)
    }

    pub fn border_layer(&self, layer_id: &str) -> Option<&BorderLayer> {
        self.border_layers.iter().find(|b| b.id == layer_id)
    }

    /// Marker (and its group key) for a surface layer
    pub fn marker_by_layer(&self, layer: LayerId) -> Option<(&str, &RenderedMarker)> {
        self.groups.iter().find_map(|group| {
            group
                .markers
                .iter()
                .find(|m| m.layer == layer)
                .map(|m| (group.key.as_str(), m))
        })
    }

    pub fn marker_count(&self) -> usize {
        self.groups.iter().map(|g| g.markers.len()).sum()
    }

    /// Entry ids of markers currently on the surface
    pub fn visible_entry_ids(&self) -> Vec<&str> {
        self.groups
            .iter()
            .flat_map(|g| g.markers.iter())
            .filter(|m| self.surface.has_layer(m.layer))
            .map(|m| m.entry_id.as_str())
            .collect()
    }

    pub fn summary(&self) -> MapSummary {
        MapSummary {
            map_id: self.id.clone(),
            generation: self.generation,
            center: self.center,
            zoom: self.zoom,
            max_zoom: self.max_zoom,
            fitted_region: self.last_fit,
            groups: self
                .groups
                .iter()
                .map(|group| GroupSummary {
                    key: group.key.clone(),
                    title: group.title.clone(),
                    color: group.color.clone(),
                    on_surface: self.surface.has_layer(group.layer),
                    markers: group
                        .markers
                        .iter()
                        .map(|m| MarkerSummary {
                            entry_id: m.entry_id.clone(),
                            position: m.position,
                            visible: self.surface.has_layer(m.layer),
                        })
                        .collect(),
                })
                .collect(),
            legend: self.legend_entries.clone(),
            borders: self.border_layers.clone(),
        }
    }
}

impl std::fmt::Debug for MapInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapInstance")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("groups", &self.groups.len())
            .field("border_layers", &self.border_layers.len())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MapSummary {
    pub map_id: String,
    pub generation: u64,
    pub center: LatLng,
    pub zoom: u8,
    pub max_zoom: u8,
    pub fitted_region: Option<Region>,
    pub groups: Vec<GroupSummary>,
    pub legend: Vec<LegendEntry>,
    pub borders: Vec<BorderLayer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub title: String,
    pub color: String,
    pub on_surface: bool,
    pub markers: Vec<MarkerSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkerSummary {
    pub entry_id: String,
    pub position: LatLng,
    pub visible: bool,
}

/// Process-wide map state, owned by the session that constructs it
#[derive(Debug, Default)]
pub struct MapRegistry {
    maps: HashMap<String, MapInstance>,
    remembered: HashMap<String, RememberedView>,
    next_generation: u64,
}

impl MapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tear down any map under `id`, then build and register a fresh one
    ///
    /// If the mapping library is unavailable nothing is touched and
    /// `MissingDependency` is returned.
    pub fn create(
        &mut self,
        id: &str,
        dataset: &Dataset,
        options: MapOptions,
        factory: &dyn SurfaceFactory,
    ) -> Result<MapHandle, MapError> {
        if !factory.is_available() {
            return Err(MapError::MissingDependency(format!(
                "no mapping surface for map '{}'",
                id
            )));
        }

        self.destroy(id);

        let mut view = options.view_settings();
        if options.remember_view {
            if let Some(remembered) = self.remembered.get(id) {
                view.center = remembered.center;
                view.zoom = remembered.zoom;
            }
        }

        let surface = factory.construct(id, &view)?;
        self.next_generation += 1;
        let mut instance = MapInstance::new(id, self.next_generation, &view, options, surface);

        let groups: Vec<CategoryGroup> = dataset
            .iter()
            .map(|(key, category)| CategoryGroup::from_category(key, category))
            .collect();
        MarkerGroupBuilder::build(&mut instance, &groups);
        LegendController::build(&mut instance);

        let handle = instance.handle();
        info!(
            "Map '{}' initialised (generation {}, {} groups, {} markers)",
            id,
            handle.generation,
            instance.groups.len(),
            instance.marker_count()
        );
        self.maps.insert(id.to_string(), instance);
        Ok(handle)
    }

    /// Release the map under `id`; returns whether one existed
    pub fn destroy(&mut self, id: &str) -> bool {
        match self.maps.remove(id) {
            Some(mut instance) => {
                instance.surface.destroy();
                debug!("Map '{}' generation {} destroyed", id, instance.generation);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&MapInstance> {
        self.maps.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut MapInstance> {
        self.maps.get_mut(id)
    }

    pub fn try_get_mut(&mut self, id: &str) -> Result<&mut MapInstance, MapError> {
        self.maps
            .get_mut(id)
            .ok_or_else(|| MapError::UnknownMap(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.maps.contains_key(id)
    }

    /// Whether `handle` still names the live incarnation
    pub fn is_current(&self, handle: &MapHandle) -> bool {
        self.maps
            .get(&handle.map_id)
            .is_some_and(|m| m.generation == handle.generation)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.maps.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Record the viewport after a pan/zoom for maps that remember it
    pub fn remember_view(&mut self, id: &str, center: LatLng, zoom: u8) {
        let remember = self.maps.get(id).is_some_and(|m| m.options.remember_view);
        if remember {
            self.remembered.insert(id.to_string(), RememberedView { center, zoom });
        }
    }

    pub fn remembered_view(&self, id: &str) -> Option<RememberedView> {
        self.remembered.get(id).copied()
    }

    /// Destroy every map; the registry stays usable
    pub fn clear(&mut self) {
        let ids: Vec<String> = self.maps.keys().cloned().collect();
        for id in ids {
            self.destroy(&id);
        }
        self.remembered.clear();
    }
}

impl Drop for MapRegistry {
    fn drop(&mut self) {
        for instance in self.maps.values_mut() {
            instance.surface.destroy();
        }
    }
}
