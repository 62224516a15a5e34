//! In-map and external legend state
//!
//! Both legends read and write the same per-category state: whether the
//! group layer is on the surface, and the entry's `active` flag. A toggle
//! from either one is therefore visible to the other.

use super::registry::MapInstance;
use crate::surface::{ControlId, LayerId, LayersControlSpec, OverlayEntry};
use log::debug;
use serde::Serialize;

/// Legend row for one category of one map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub map_id: String,
    pub category_key: String,
    pub title: String,
    pub icon_color: String,
    pub active: bool,
}

/// The layers control placed on the map when the legend is shown
#[derive(Debug, Clone, PartialEq)]
pub struct LegendControl {
    pub control_id: ControlId,
    pub collapsed: bool,
    pub toggle_label: String,
    pub overlays: Vec<(String, LayerId)>,
}

/// What a legend click addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegendTarget {
    All,
    Category(String),
}

impl From<&str> for LegendTarget {
    fn from(value: &str) -> Self {
        if value == "all" {
            LegendTarget::All
        } else {
            LegendTarget::Category(value.to_string())
        }
    }
}

pub struct LegendController;

impl LegendController {
    /// Populate legend entries and, if enabled, the in-map control
    ///
    /// Entries exist for every rendered group so an external legend can
    /// drive them even when the in-map control is off.
    pub fn build(instance: &mut MapInstance) -> Option<ControlId> {
        instance.legend_entries = instance
            .groups
            .iter()
            .map(|group| LegendEntry {
                map_id: instance.id.clone(),
                category_key: group.key.clone(),
                title: group.title.clone(),
                icon_color: group.color.clone(),
                active: true,
            })
            .collect();

        if !instance.options.show_legend {
            instance.legend = None;
            return None;
        }

        let overlays: Vec<OverlayEntry> = instance
            .groups
            .iter()
            .map(|group| OverlayEntry {
                layer: group.layer,
                label_html: Self::label_html(&group.color, &group.title),
            })
            .collect();

        let control = LayersControlSpec {
            collapsed: instance.options.controls_collapsed,
            toggle_label: instance.options.control_text.clone(),
            help_text: instance.options.legend_label_type.clone(),
            overlays,
        };
        let control_id = instance.surface_mut().layers_control(control);

        instance.legend = Some(LegendControl {
            control_id,
            collapsed: instance.options.controls_collapsed,
            toggle_label: instance.options.control_text.clone(),
            overlays: instance.groups.iter().map(|g| (g.key.clone(), g.layer)).collect(),
        });
        Some(control_id)
    }

    /// Small filled circle in the group color
    pub fn icon_html(color: &str) -> String {
        format!(
            "<svg width=\"12\" height=\"12\" viewBox=\"0 0 10 10\" \
             xmlns=\"http://www.w3.org/2000/svg\" \
             style=\"vertical-align: middle; margin-right: 5px;\">\
             <circle cx=\"5\" cy=\"5\" r=\"4\" stroke=\"{color}\" fill=\"{color}\" /></svg>"
        )
    }

    pub fn label_html(color: &str, title: &str) -> String {
        format!(
            "<span class=\"oes-map-group-title\">{}{}</span>",
            Self::icon_html(color),
            title
        )
    }

    /// Apply a legend click; returns false if the category is unknown
    pub fn toggle(instance: &mut MapInstance, target: &LegendTarget) -> bool {
        match target {
            LegendTarget::All => {
                let layers: Vec<LayerId> = instance.groups.iter().map(|g| g.layer).collect();
                let surface = instance.surface_mut();
                for layer in layers {
                    if !surface.has_layer(layer) {
                        surface.add_layer(layer);
                    }
                }
                for entry in &mut instance.legend_entries {
                    entry.active = true;
                }
                debug!("Map '{}': legend shows all categories", instance.id);
                true
            }
            LegendTarget::Category(key) => {
                let Some(layer) = instance.group(key).map(|g| g.layer) else {
                    debug!("Map '{}': legend toggle for unknown category '{}'", instance.id, key);
                    return false;
                };

                let surface = instance.surface_mut();
                if surface.has_layer(layer) {
                    surface.remove_layer(layer);
                } else {
                    surface.add_layer(layer);
                }

                if let Some(entry) = instance
                    .legend_entries
                    .iter_mut()
                    .find(|e| e.category_key == *key)
                {
                    entry.active = !entry.active;
                }
                true
            }
        }
    }

    /// Mirror an `overlayadd`/`overlayremove` from the in-map control
    ///
    /// The surface has already changed membership; only the flag is synced.
    pub fn sync_overlay(instance: &mut MapInstance, layer: LayerId, added: bool) -> bool {
        let Some(key) = instance
            .groups
            .iter()
            .find(|g| g.layer == layer)
            .map(|g| g.key.clone())
        else {
            return false;
        };

        let surface = instance.surface_mut();
        if added && !surface.has_layer(layer) {
            surface.add_layer(layer);
        } else if !added && surface.has_layer(layer) {
            surface.remove_layer(layer);
        }

        if let Some(entry) = instance.legend_entries.iter_mut().find(|e| e.category_key == key) {
            entry.active = added;
        }
        true
    }
}
