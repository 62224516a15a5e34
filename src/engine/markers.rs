//! Per-category marker collections bound to a surface

use super::error::MapError;
use super::registry::MapInstance;
use crate::geo::{Bounds, LatLng};
use crate::model::CategoryGroup;
use crate::surface::{FIT_PADDING, LayerId, MappingSurface};
use log::{debug, warn};

/// A category group that made it onto the surface
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedGroup {
    pub key: String,
    /// `<mapId>_<categoryKey>`, the id legends address the group by
    pub layer_key: String,
    pub title: String,
    pub color: String,
    pub layer: LayerId,
    pub markers: Vec<RenderedMarker>,
}

/// A marker on the surface and the entry it was built from
///
/// `entry_id` is a lookup key into the dataset, not a reference to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMarker {
    pub entry_id: String,
    pub layer: LayerId,
    pub position: LatLng,
    pub popup_html: String,
}

pub struct MarkerGroupBuilder;

impl MarkerGroupBuilder {
    /// Render every non-empty group, record them on the instance and apply the viewport
    ///
    /// Returns the bounding region of all rendered markers.
    pub fn build(instance: &mut MapInstance, groups: &[CategoryGroup]) -> Bounds {
        let mut bounds = Bounds::new();
        let mut rendered = Vec::with_capacity(groups.len());

        for group in groups {
            if group.is_empty() {
                debug!("Map '{}': skipping empty category '{}'", instance.id, group.key);
                continue;
            }

            let surface = instance.surface_mut();
            let markers: Vec<RenderedMarker> = group
                .entries
                .iter()
                .map(|entry| {
                    bounds.extend(entry.position);
                    RenderedMarker {
                        entry_id: entry.entry_id.clone(),
                        layer: surface.circle_marker(
                            entry.position,
                            &entry.style,
                            &entry.popup_html,
                        ),
                        position: entry.position,
                        popup_html: entry.popup_html.clone(),
                    }
                })
                .collect();

            let member_layers: Vec<LayerId> = markers.iter().map(|m| m.layer).collect();
            let layer = surface.layer_group(&member_layers);
            surface.add_layer(layer);

            rendered.push(RenderedGroup {
                key: group.key.clone(),
                layer_key: format!("{}_{}", instance.id, group.key),
                title: group.title.clone(),
                color: group.color.clone(),
                layer,
                markers,
            });
        }

        instance.groups = rendered;
        instance.bounds = bounds;

        if instance.options.fit_bounds && bounds.is_valid() {
            if let Err(e) = Self::fit_viewport(instance, &bounds) {
                warn!("Map '{}': {}", instance.id, e);
            }
        }

        bounds
    }

    /// Fit the viewport to `bounds` with the fixed padding
    pub fn fit_viewport(instance: &mut MapInstance, bounds: &Bounds) -> Result<(), MapError> {
        let region = bounds.region().ok_or(MapError::InvalidBounds)?;
        instance.surface_mut().fit_bounds(region, FIT_PADDING);
        instance.last_fit = Some(region);
        Ok(())
    }

    /// Bounds of the markers currently displayed on the surface
    pub fn visible_bounds(instance: &MapInstance) -> Bounds {
        let surface: &dyn MappingSurface = instance.surface();
        instance
            .groups
            .iter()
            .flat_map(|g| g.markers.iter())
            .filter(|m| surface.has_layer(m.layer))
            .map(|m| m.position)
            .collect()
    }
}
