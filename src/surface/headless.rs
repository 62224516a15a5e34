//! In-memory mapping surface
//!
//! Records every layer, control and viewport change without rendering
//! anything. Used by the CLI to produce map summaries and by tests to observe
//! what the engine did to a surface.

use super::{
    CircleStyle, ControlId, LayerId, LayersControlSpec, MappingSurface, OverlayStyle, Padding,
    SurfaceFactory, ViewSettings,
};
use crate::engine::error::MapError;
use crate::geo::{LatLng, Region};
use log::{debug, trace};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeadlessLayer {
    Marker {
        position: LatLng,
        style: CircleStyle,
        popup_html: String,
    },
    Group {
        members: Vec<LayerId>,
    },
    Overlay {
        data: Value,
        style: OverlayStyle,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadlessCheckbox {
    pub id: String,
    pub label: String,
    pub checked: bool,
}

/// Everything a headless surface has been asked to do
#[derive(Debug, Clone, Default, Serialize)]
pub struct SurfaceState {
    pub container: String,
    pub view: Option<ViewSettings>,
    pub layers: BTreeMap<LayerId, HeadlessLayer>,
    pub on_map: BTreeSet<LayerId>,
    pub fits: Vec<(Region, Padding)>,
    pub controls: Vec<LayersControlSpec>,
    pub border_header: Option<String>,
    pub checkboxes: Vec<HeadlessCheckbox>,
    pub add_calls: usize,
    pub remove_calls: usize,
    pub destroyed: bool,
    #[serde(skip)]
    next_id: u64,
}

impl SurfaceState {
    /// Markers currently displayed
    pub fn visible_markers(&self) -> Vec<LayerId> {
        self.on_map
            .iter()
            .copied()
            .filter(|id| matches!(self.layers.get(id), Some(HeadlessLayer::Marker { .. })))
            .collect()
    }

    pub fn visible_overlays(&self) -> Vec<LayerId> {
        self.on_map
            .iter()
            .copied()
            .filter(|id| matches!(self.layers.get(id), Some(HeadlessLayer::Overlay { .. })))
            .collect()
    }

    pub fn last_fit(&self) -> Option<&(Region, Padding)> {
        self.fits.last()
    }

    fn allocate(&mut self, layer: HeadlessLayer) -> LayerId {
        self.next_id += 1;
        self.layers.insert(self.next_id, layer);
        self.next_id
    }

    fn members_of(&self, layer: LayerId) -> Vec<LayerId> {
        match self.layers.get(&layer) {
            Some(HeadlessLayer::Group { members }) => members.clone(),
            _ => Vec::new(),
        }
    }
}

fn lock(state: &Mutex<SurfaceState>) -> MutexGuard<'_, SurfaceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A surface whose state lives behind a shared handle
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl HeadlessSurface {
    pub fn new(container: &str, view: &ViewSettings) -> Self {
        let state = SurfaceState {
            container: container.to_string(),
            view: Some(view.clone()),
            ..SurfaceState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SurfaceState {
        lock(&self.state).clone()
    }
}

impl MappingSurface for HeadlessSurface {
    fn circle_marker(
        &mut self,
        position: LatLng,
        style: &CircleStyle,
        popup_html: &str,
    ) -> LayerId {
        lock(&self.state).allocate(HeadlessLayer::Marker {
            position,
            style: style.clone(),
            popup_html: popup_html.to_string(),
        })
    }

    fn layer_group(&mut self, members: &[LayerId]) -> LayerId {
        lock(&self.state).allocate(HeadlessLayer::Group {
            members: members.to_vec(),
        })
    }

    fn geojson_overlay(&mut self, data: &Value, style: &OverlayStyle) -> LayerId {
        lock(&self.state).allocate(HeadlessLayer::Overlay {
            data: data.clone(),
            style: style.clone(),
        })
    }

    fn add_layer(&mut self, layer: LayerId) {
        let mut state = lock(&self.state);
        state.add_calls += 1;
        let members = state.members_of(layer);
        state.on_map.insert(layer);
        state.on_map.extend(members);
        trace!("headless surface {}: add layer {}", state.container, layer);
    }

    fn remove_layer(&mut self, layer: LayerId) {
        let mut state = lock(&self.state);
        state.remove_calls += 1;
        let members = state.members_of(layer);
        state.on_map.remove(&layer);
        for member in members {
            state.on_map.remove(&member);
        }
        trace!("headless surface {}: remove layer {}", state.container, layer);
    }

    fn has_layer(&self, layer: LayerId) -> bool {
        lock(&self.state).on_map.contains(&layer)
    }

    fn fit_bounds(&mut self, region: Region, padding: Padding) {
        lock(&self.state).fits.push((region, padding));
    }

    fn layers_control(&mut self, control: LayersControlSpec) -> ControlId {
        let mut state = lock(&self.state);
        state.controls.push(control);
        state.controls.len() as ControlId
    }

    fn border_checkbox(&mut self, checkbox_id: &str, label: &str, header: &str, checked: bool) {
        let mut state = lock(&self.state);
        if state.border_header.is_none() {
            state.border_header = Some(header.to_string());
        }
        state.checkboxes.push(HeadlessCheckbox {
            id: checkbox_id.to_string(),
            label: label.to_string(),
            checked,
        });
    }

    fn destroy(&mut self) {
        let mut state = lock(&self.state);
        debug!("headless surface {} destroyed", state.container);
        state.destroyed = true;
        state.on_map.clear();
    }
}

/// Factory that keeps a handle to every surface it built
#[derive(Debug, Clone)]
pub struct HeadlessFactory {
    available: bool,
    built: Arc<Mutex<Vec<HeadlessSurface>>>,
}

impl HeadlessFactory {
    pub fn new() -> Self {
        Self {
            available: true,
            built: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A factory that behaves as if the mapping library never loaded
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn built_count(&self) -> usize {
        self.built.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Surfaces not yet destroyed
    pub fn live_handles(&self) -> usize {
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| !s.snapshot().destroyed)
            .count()
    }

    pub fn surface(&self, index: usize) -> Option<SurfaceState> {
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map(HeadlessSurface::snapshot)
    }

    /// State of the most recently built surface
    pub fn latest(&self) -> Option<SurfaceState> {
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(HeadlessSurface::snapshot)
    }
}

impl Default for HeadlessFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceFactory for HeadlessFactory {
    fn is_available(&self) -> bool {
        self.available
    }

    fn construct(
        &self,
        container: &str,
        view: &ViewSettings,
    ) -> Result<Box<dyn MappingSurface>, MapError> {
        if !self.available {
            return Err(MapError::MissingDependency("headless surface disabled".to_string()));
        }
        let surface = HeadlessSurface::new(container, view);
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(surface.clone());
        Ok(Box::new(surface))
    }
}
