//! Map rendering options with builder pattern
//!
//! Callers hand in a [`MapOptionsPatch`] where every field is optional; it is
//! laid over the fixed defaults so unspecified options keep their default.
//! Field names accept the camelCase spelling used by page scripts as well as
//! snake_case.

use crate::geo::LatLng;
use crate::model::BorderLayerDescriptor;
use crate::surface::{OSM_TILE_SOURCE, ViewSettings};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ZOOM: u8 = 5;
pub const DEFAULT_MAX_ZOOM: u8 = 18;
pub const DEFAULT_CENTER: (f64, f64) = (51.1657, 10.4515);

/// Fully resolved options for one map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapOptions {
    pub show_legend: bool,
    pub controls_collapsed: bool,
    pub control_text: String,
    pub legend_label_type: String,
    pub legend_label_borders: String,
    pub fit_bounds: bool,
    pub show_borders: bool,
    pub default_zoom: u8,
    pub max_zoom: u8,
    pub default_center: LatLng,
    pub scroll_zoom: bool,
    pub layer_files: Vec<BorderLayerDescriptor>,
    pub auto_show_map: bool,
    pub remember_view: bool,
    pub tile_source: String,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            show_legend: false,
            controls_collapsed: true,
            control_text: "Legend".to_string(),
            legend_label_type: "Choose Type".to_string(),
            legend_label_borders: "Show borders".to_string(),
            fit_bounds: false,
            show_borders: true,
            default_zoom: DEFAULT_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            default_center: LatLng::from(DEFAULT_CENTER),
            scroll_zoom: false,
            layer_files: Vec::new(),
            auto_show_map: false,
            remember_view: false,
            tile_source: OSM_TILE_SOURCE.to_string(),
        }
    }
}

impl MapOptions {
    pub fn builder() -> MapOptionsBuilder {
        MapOptionsBuilder::new()
    }

    /// Defaults with `patch` applied
    pub fn merged(patch: &MapOptionsPatch) -> Self {
        Self::default().apply(patch)
    }

    /// Override every field the patch sets
    pub fn apply(mut self, patch: &MapOptionsPatch) -> Self {
        if let Some(v) = patch.show_legend {
            self.show_legend = v;
        }
        if let Some(v) = patch.controls_collapsed {
            self.controls_collapsed = v;
        }
        if let Some(v) = &patch.control_text {
            self.control_text = v.clone();
        }
        if let Some(v) = &patch.legend_label_type {
            self.legend_label_type = v.clone();
        }
        if let Some(v) = &patch.legend_label_borders {
            self.legend_label_borders = v.clone();
        }
        if let Some(v) = patch.fit_bounds {
            self.fit_bounds = v;
        }
        if let Some(v) = patch.show_borders {
            self.show_borders = v;
        }
        if let Some(v) = patch.default_zoom {
            self.default_zoom = v;
        }
        if let Some(v) = patch.max_zoom {
            self.max_zoom = v;
        }
        if let Some([lat, lon]) = patch.default_center {
            self.default_center = LatLng::new(lat, lon);
        }
        if let Some(v) = patch.scroll_zoom {
            self.scroll_zoom = v;
        }
        if let Some(v) = &patch.layer_files {
            self.layer_files = v.clone();
        }
        if let Some(v) = patch.auto_show_map {
            self.auto_show_map = v;
        }
        if let Some(v) = patch.remember_view {
            self.remember_view = v;
        }
        if let Some(v) = &patch.tile_source {
            self.tile_source = v.clone();
        }
        self
    }

    /// Initial view for the surface constructor
    pub fn view_settings(&self) -> ViewSettings {
        ViewSettings {
            center: self.default_center,
            zoom: self.default_zoom,
            max_zoom: self.max_zoom,
            scroll_zoom: self.scroll_zoom,
            tile_source: self.tile_source.clone(),
        }
    }

    /// Whether border layers should be fetched at all
    pub fn wants_borders(&self) -> bool {
        self.show_borders && !self.layer_files.is_empty()
    }
}

/// Caller-supplied options; `None` keeps the default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapOptionsPatch {
    #[serde(alias = "show_legend", skip_serializing_if = "Option::is_none")]
    pub show_legend: Option<bool>,
    #[serde(alias = "controls_collapsed", skip_serializing_if = "Option::is_none")]
    pub controls_collapsed: Option<bool>,
    #[serde(alias = "control_text", skip_serializing_if = "Option::is_none")]
    pub control_text: Option<String>,
    #[serde(alias = "legend_label_type", skip_serializing_if = "Option::is_none")]
    pub legend_label_type: Option<String>,
    #[serde(alias = "legend_label_borders", skip_serializing_if = "Option::is_none")]
    pub legend_label_borders: Option<String>,
    #[serde(alias = "fit_bounds", skip_serializing_if = "Option::is_none")]
    pub fit_bounds: Option<bool>,
    #[serde(alias = "show_borders", skip_serializing_if = "Option::is_none")]
    pub show_borders: Option<bool>,
    #[serde(alias = "default_zoom", skip_serializing_if = "Option::is_none")]
    pub default_zoom: Option<u8>,
    #[serde(alias = "max_zoom", skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<u8>,
    #[serde(alias = "default_center", skip_serializing_if = "Option::is_none")]
    pub default_center: Option<[f64; 2]>,
    #[serde(
        rename = "scrollWheelZoom",
        alias = "scroll_zoom",
        alias = "scrollZoom",
        skip_serializing_if = "Option::is_none"
    )]
    pub scroll_zoom: Option<bool>,
    #[serde(alias = "layer_files", skip_serializing_if = "Option::is_none")]
    pub layer_files: Option<Vec<BorderLayerDescriptor>>,
    #[serde(alias = "auto_show_map", skip_serializing_if = "Option::is_none")]
    pub auto_show_map: Option<bool>,
    #[serde(alias = "remember_view", skip_serializing_if = "Option::is_none")]
    pub remember_view: Option<bool>,
    #[serde(alias = "tile_source", skip_serializing_if = "Option::is_none")]
    pub tile_source: Option<String>,
}

/// Builder for MapOptions
#[derive(Debug)]
pub struct MapOptionsBuilder {
    options: MapOptions,
}

impl MapOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: MapOptions::default(),
        }
    }

    pub fn show_legend(mut self, enabled: bool) -> Self {
        self.options.show_legend = enabled;
        self
    }

    pub fn controls_collapsed(mut self, collapsed: bool) -> Self {
        self.options.controls_collapsed = collapsed;
        self
    }

    pub fn fit_bounds(mut self, enabled: bool) -> Self {
        self.options.fit_bounds = enabled;
        self
    }

    pub fn zoom(mut self, zoom: u8) -> Self {
        self.options.default_zoom = zoom;
        self
    }

    pub fn center(mut self, lat: f64, lon: f64) -> Self {
        self.options.default_center = LatLng::new(lat, lon);
        self
    }

    pub fn layer_file(mut self, descriptor: BorderLayerDescriptor) -> Self {
        self.options.layer_files.push(descriptor);
        self
    }

    pub fn remember_view(mut self, enabled: bool) -> Self {
        self.options.remember_view = enabled;
        self
    }

    pub fn build(self) -> MapOptions {
        self.options
    }
}

impl Default for MapOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_options() {
        let options = MapOptions::default();

        assert_eq!(options.default_zoom, 5);
        assert_eq!(options.max_zoom, 18);
        assert_eq!(options.default_center, LatLng::new(51.1657, 10.4515));
        assert!(!options.scroll_zoom);
        assert!(!options.show_legend);
        assert!(!options.fit_bounds);
        assert!(options.show_borders);
        assert!(options.controls_collapsed);
    }

    #[test]
    fn test_patch_overrides_only_given_fields() {
        let patch: MapOptionsPatch = serde_json::from_value(json!({
            "showLegend": true,
            "defaultZoom": 8
        }))
        .unwrap();
        let options = MapOptions::merged(&patch);

        assert!(options.show_legend);
        assert_eq!(options.default_zoom, 8);
        assert_eq!(options.max_zoom, 18);
        assert_eq!(options.control_text, "Legend");
    }

    #[test]
    fn test_patch_accepts_snake_case_and_center_pair() {
        let patch: MapOptionsPatch = serde_json::from_value(json!({
            "fit_bounds": true,
            "defaultCenter": [48.2, 16.37],
            "layer_files": [{"id": 3, "url": "https://example.org/at.geojson", "name": "Austria"}]
        }))
        .unwrap();
        let options = MapOptions::merged(&patch);

        assert!(options.fit_bounds);
        assert_eq!(options.default_center, LatLng::new(48.2, 16.37));
        assert_eq!(options.layer_files[0].id, "3");
        assert!(options.wants_borders());
    }

    #[test]
    fn test_patches_stack_in_order() {
        let site = MapOptionsPatch {
            default_zoom: Some(7),
            show_legend: Some(true),
            ..Default::default()
        };
        let caller = MapOptionsPatch {
            default_zoom: Some(9),
            ..Default::default()
        };
        let options = MapOptions::default().apply(&site).apply(&caller);

        assert_eq!(options.default_zoom, 9);
        assert!(options.show_legend);
    }

    #[test]
    fn test_builder_pattern() {
        let options = MapOptions::builder()
            .show_legend(true)
            .fit_bounds(true)
            .center(52.5, 13.4)
            .zoom(6)
            .build();

        assert!(options.show_legend);
        assert!(options.fit_bounds);
        assert_eq!(options.view_settings().center, LatLng::new(52.5, 13.4));
        assert_eq!(options.view_settings().zoom, 6);
        assert!(!options.wants_borders());
    }
}
