//! Mapping surface boundary
//!
//! The pan/zoom/tile engine is an external collaborator. The engine only
//! needs the operations below; a browser binding, a native widget or the
//! in-memory [`headless`] surface can sit behind them.

pub mod headless;

pub use headless::{HeadlessFactory, HeadlessLayer, HeadlessSurface, SurfaceState};

use crate::engine::error::MapError;
use crate::geo::{LatLng, Region};
use serde::Serialize;
use serde_json::Value;

/// Handle to a layer created on a surface
pub type LayerId = u64;

/// Handle to a control (layers control) created on a surface
pub type ControlId = u64;

pub const OSM_TILE_SOURCE: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Padding in pixels applied when fitting the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Padding(pub u32, pub u32);

pub const FIT_PADDING: Padding = Padding(10, 10);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircleStyle {
    pub radius: u32,
    pub stroke_color: String,
    pub fill_color: String,
    pub weight: f64,
    pub opacity: f64,
    pub fill_opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayStyle {
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
    pub fill_opacity: f64,
}

impl OverlayStyle {
    /// Boundary outline: orange stroke, no fill
    pub fn border() -> Self {
        Self {
            color: "orange".to_string(),
            weight: 1.0,
            opacity: 1.0,
            fill_opacity: 0.0,
        }
    }
}

/// Initial view handed to the surface constructor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSettings {
    pub center: LatLng,
    pub zoom: u8,
    pub max_zoom: u8,
    pub scroll_zoom: bool,
    pub tile_source: String,
}

/// One row of the in-map layers control
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayEntry {
    pub layer: LayerId,
    pub label_html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayersControlSpec {
    pub collapsed: bool,
    pub toggle_label: String,
    pub help_text: String,
    pub overlays: Vec<OverlayEntry>,
}

/// Lifecycle events a surface reports back to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// The user checked a layer in the layers control
    OverlayAdd(LayerId),
    /// The user unchecked a layer in the layers control
    OverlayRemove(LayerId),
    /// Pan or zoom finished
    MoveEnd { center: LatLng, zoom: u8 },
    /// A marker was clicked and its popup opened
    MarkerClick(LayerId),
}

/// Operations the engine performs on a live map
///
/// Created layers are detached until passed to [`MappingSurface::add_layer`].
/// Adding or removing a group layer adds or removes its members with it.
pub trait MappingSurface: Send {
    fn circle_marker(&mut self, position: LatLng, style: &CircleStyle, popup_html: &str) -> LayerId;
    fn layer_group(&mut self, members: &[LayerId]) -> LayerId;
    fn geojson_overlay(&mut self, data: &Value, style: &OverlayStyle) -> LayerId;

    fn add_layer(&mut self, layer: LayerId);
    fn remove_layer(&mut self, layer: LayerId);
    fn has_layer(&self, layer: LayerId) -> bool;

    fn fit_bounds(&mut self, region: Region, padding: Padding);

    fn layers_control(&mut self, control: LayersControlSpec) -> ControlId;
    /// Checkbox row under the border header; `header` is created on first use
    fn border_checkbox(&mut self, checkbox_id: &str, label: &str, header: &str, checked: bool);

    /// Release the underlying rendering context
    fn destroy(&mut self);
}

/// Constructs surfaces bound to a display container
pub trait SurfaceFactory: Send + Sync {
    /// Whether the mapping library is loaded at all
    fn is_available(&self) -> bool {
        true
    }

    fn construct(
        &self,
        container: &str,
        view: &ViewSettings,
    ) -> Result<Box<dyn MappingSurface>, MapError>;
}
