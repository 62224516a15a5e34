//! Map/list view switching, spinner state and marker visibility passes

use super::events::{EventBus, MapEvent};
use super::markers::MarkerGroupBuilder;
use super::popup::PopupPager;
use super::registry::{MapInstance, MapRegistry};
use crate::monitoring::MapLogger;
use crate::surface::LayerId;
use log::{debug, warn};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewState {
    MapVisible,
    ListVisible,
}

/// Supplies the entry ids that should currently be visible on a map
pub type Validator = Box<dyn Fn() -> Vec<String> + Send + Sync>;

/// What a visibility pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
    pub visible: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

pub struct ViewController {
    state: ViewState,
    /// Set once the page has explicitly moved between map and list
    switched: bool,
    spinner_visible: bool,
    validators: HashMap<String, Validator>,
    range_bound: BTreeSet<String>,
    popups: HashMap<(String, LayerId), PopupPager>,
    bus: Arc<EventBus>,
    logger: MapLogger,
}

impl ViewController {
    pub fn new(auto_show_map: bool, bus: Arc<EventBus>) -> Self {
        Self {
            state: if auto_show_map {
                ViewState::MapVisible
            } else {
                ViewState::ListVisible
            },
            switched: false,
            spinner_visible: false,
            validators: HashMap::new(),
            range_bound: BTreeSet::new(),
            popups: HashMap::new(),
            bus,
            logger: MapLogger::default(),
        }
    }

    pub fn with_logger(mut self, logger: MapLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn spinner_visible(&self) -> bool {
        self.spinner_visible
    }

    pub fn has_switched(&self) -> bool {
        self.switched
    }

    pub fn register_validator<F>(&mut self, map_id: &str, validator: F)
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        self.validators.insert(map_id.to_string(), Box::new(validator));
    }

    pub fn unregister_validator(&mut self, map_id: &str) -> bool {
        self.validators.remove(map_id).is_some()
    }

    pub fn bind_range_slider(&mut self, map_id: &str) {
        self.range_bound.insert(map_id.to_string());
    }

    /// Display the map, applying the registered validator first
    pub fn show_map(&mut self, registry: &Mutex<MapRegistry>, map_id: &str, switch_tab: bool) {
        if let Some(validator) = self.validators.get(map_id) {
            let allowed = validator();
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            match registry.get_mut(map_id) {
                Some(instance) => {
                    let mut context = self.logger.start_operation("reconcile", map_id);
                    let report = Self::reconcile_visibility(instance, &allowed);
                    self.logger.add_metadata(&mut context, "added", json!(report.added));
                    self.logger.add_metadata(&mut context, "removed", json!(report.removed));
                    self.logger.add_metadata(&mut context, "visible", json!(report.visible));
                    self.logger.complete_operation(&context, true);
                }
                None => debug!("Validator registered for '{}' but no map is live", map_id),
            }
        }

        if switch_tab {
            self.state = ViewState::MapVisible;
            self.switched = true;
        }
        self.spinner_visible = false;

        self.bus.publish(MapEvent::MapDisplayed {
            map_id: map_id.to_string(),
        });
    }

    pub fn show_list(&mut self) {
        self.state = ViewState::ListVisible;
        self.switched = true;
        self.bus.publish(MapEvent::ListDisplayed);
    }

    /// A filter control was clicked: refresh the map if it is showing
    ///
    /// Returns whether a refresh happened.
    pub fn refresh(&mut self, registry: &Mutex<MapRegistry>, map_id: &str) -> bool {
        if self.state != ViewState::MapVisible {
            return false;
        }
        self.spinner_visible = true;
        self.show_map(registry, map_id, false);
        true
    }

    /// Range slider moved: refresh every bound map while the map is showing
    pub fn on_range_filter(&mut self, registry: &Mutex<MapRegistry>) -> usize {
        if self.state != ViewState::MapVisible {
            return 0;
        }
        let bound: Vec<String> = self.range_bound.iter().cloned().collect();
        for map_id in &bound {
            self.show_map(registry, map_id, false);
        }
        bound.len()
    }

    /// Make exactly the allowed markers visible, then refit to what is visible
    pub fn reconcile_visibility(instance: &mut MapInstance, allowed: &[String]) -> ReconcileReport {
        let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
        let mut report = ReconcileReport::default();

        let markers: Vec<(LayerId, bool)> = instance
            .groups
            .iter()
            .flat_map(|g| g.markers.iter())
            .map(|m| (m.layer, allowed.contains(m.entry_id.as_str())))
            .collect();

        let surface = instance.surface_mut();
        for (layer, should_show) in markers {
            let showing = surface.has_layer(layer);
            if should_show && !showing {
                surface.add_layer(layer);
                report.added += 1;
            } else if !should_show && showing {
                surface.remove_layer(layer);
                report.removed += 1;
            }
            if surface.has_layer(layer) {
                report.visible += 1;
            }
        }

        let bounds = MarkerGroupBuilder::visible_bounds(instance);
        if bounds.is_valid() {
            if let Err(e) = MarkerGroupBuilder::fit_viewport(instance, &bounds) {
                warn!("Map '{}': {}", instance.id, e);
            }
        }

        debug!(
            "Map '{}' visibility pass: +{} -{} ({} visible)",
            instance.id, report.added, report.removed, report.visible
        );
        report
    }

    /// A marker was clicked; start its popup on the first page
    pub fn open_popup(&mut self, instance: &MapInstance, layer: LayerId) -> Option<&PopupPager> {
        let (_, marker) = instance.marker_by_layer(layer)?;
        let key = (instance.id.clone(), layer);
        self.popups.insert(key.clone(), PopupPager::from_html(&marker.popup_html));
        self.popups.get(&key)
    }

    /// Page through an open popup; returns the indicator text if it moved
    pub fn page_nav(&mut self, map_id: &str, layer: LayerId, direction: isize) -> Option<String> {
        let pager = self.popups.get_mut(&(map_id.to_string(), layer))?;
        pager.navigate(direction).then(|| pager.indicator())
    }

    pub fn popup(&self, map_id: &str, layer: LayerId) -> Option<&PopupPager> {
        self.popups.get(&(map_id.to_string(), layer))
    }

    /// Drop popup state for a map that is being rebuilt or destroyed
    pub fn forget_map(&mut self, map_id: &str) {
        self.popups.retain(|(id, _), _| id != map_id);
    }
}

impl std::fmt::Debug for ViewController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewController")
            .field("state", &self.state)
            .field("switched", &self.switched)
            .field("spinner_visible", &self.spinner_visible)
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .field("range_bound", &self.range_bound)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::EventKind;
    use crate::model::{CategoryData, Dataset, EntryRecord};
    use crate::options::MapOptions;
    use crate::surface::HeadlessFactory;

    fn abc() -> Dataset {
        Dataset::new().with_category(
            "cat1",
            CategoryData::new(
                "Letters",
                vec![
                    EntryRecord::new("a", 50.0, 8.0),
                    EntryRecord::new("b", 54.0, 10.0),
                    EntryRecord::new("c", 48.0, 12.0).with_popup(
                        "<div class='popup-page'>1</div><div class='popup-page'>2</div>",
                    ),
                ],
            ),
        )
    }

    fn setup() -> (Mutex<MapRegistry>, HeadlessFactory, Arc<EventBus>) {
        let factory = HeadlessFactory::new();
        let mut registry = MapRegistry::new();
        registry.create("m", &abc(), MapOptions::default(), &factory).unwrap();
        (Mutex::new(registry), factory, Arc::new(EventBus::new()))
    }

    fn allowed(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reconcile_shows_exactly_allowed_and_is_idempotent() {
        let (registry, factory, _bus) = setup();
        let mut registry = registry.into_inner().unwrap();
        let instance = registry.get_mut("m").unwrap();

        let first = ViewController::reconcile_visibility(instance, &allowed(&["a", "c"]));
        assert_eq!(first.removed, 1);
        assert_eq!(first.added, 0);
        let mut visible = instance.visible_entry_ids();
        visible.sort();
        assert_eq!(visible, vec!["a", "c"]);

        let calls_before = {
            let s = factory.latest().unwrap();
            (s.add_calls, s.remove_calls)
        };
        let second = ViewController::reconcile_visibility(instance, &allowed(&["a", "c"]));
        assert!(second.is_noop());
        let s = factory.latest().unwrap();
        assert_eq!((s.add_calls, s.remove_calls), calls_before);

        let (region, _) = s.last_fit().unwrap();
        assert_eq!(region.south_west.lat, 48.0);
        assert_eq!(region.north_east.lat, 50.0);
    }

    #[test]
    fn test_reconcile_with_nothing_allowed_skips_fit() {
        let (registry, factory, _bus) = setup();
        let mut registry = registry.into_inner().unwrap();
        let instance = registry.get_mut("m").unwrap();

        let report = ViewController::reconcile_visibility(instance, &[]);
        assert_eq!(report.removed, 3);
        assert_eq!(report.visible, 0);
        assert!(factory.latest().unwrap().fits.is_empty());

        let report = ViewController::reconcile_visibility(instance, &allowed(&["b"]));
        assert_eq!(report.added, 1);
        assert_eq!(instance.visible_entry_ids(), vec!["b"]);
    }

    #[test]
    fn test_initial_state_follows_auto_show() {
        let bus = Arc::new(EventBus::new());
        assert_eq!(ViewController::new(false, Arc::clone(&bus)).state(), ViewState::ListVisible);
        assert_eq!(ViewController::new(true, bus).state(), ViewState::MapVisible);
    }

    #[test]
    fn test_show_map_applies_validator_and_notifies() {
        let (registry, _factory, bus) = setup();
        let displayed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&displayed);
        bus.subscribe(EventKind::MapDisplayed, move |e| sink.lock().unwrap().push(e.clone()));

        let mut view = ViewController::new(false, Arc::clone(&bus));
        view.register_validator("m", || vec!["b".to_string()]);
        view.show_map(&registry, "m", true);

        assert_eq!(view.state(), ViewState::MapVisible);
        assert!(!view.spinner_visible());
        assert_eq!(registry.lock().unwrap().get("m").unwrap().visible_entry_ids(), vec!["b"]);
        assert_eq!(displayed.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_show_map_without_switch_keeps_list() {
        let (registry, _factory, bus) = setup();
        let mut view = ViewController::new(false, bus);
        view.show_map(&registry, "m", false);

        assert_eq!(view.state(), ViewState::ListVisible);
        assert_eq!(registry.lock().unwrap().get("m").unwrap().visible_entry_ids().len(), 3);
    }

    #[test]
    fn test_show_list_notifies() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        bus.subscribe(EventKind::ListDisplayed, move |_| *counter.lock().unwrap() += 1);

        let mut view = ViewController::new(true, bus);
        view.show_list();
        view.show_list();

        assert_eq!(view.state(), ViewState::ListVisible);
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_refresh_only_when_map_showing() {
        let (registry, _factory, bus) = setup();
        let mut view = ViewController::new(false, bus);

        assert!(!view.refresh(&registry, "m"));
        view.show_map(&registry, "m", true);
        assert!(view.refresh(&registry, "m"));
        assert!(!view.spinner_visible());
    }

    #[test]
    fn test_range_filter_refreshes_bound_maps() {
        let (registry, _factory, bus) = setup();
        let mut view = ViewController::new(true, bus);
        view.register_validator("m", || vec!["a".to_string()]);

        assert_eq!(view.on_range_filter(&registry), 0);
        view.bind_range_slider("m");
        assert_eq!(view.on_range_filter(&registry), 1);
        assert_eq!(registry.lock().unwrap().get("m").unwrap().visible_entry_ids(), vec!["a"]);
    }

    #[test]
    fn test_popup_paging_through_controller() {
        let (registry, _factory, bus) = setup();
        let mut view = ViewController::new(true, bus);
        let registry = registry.lock().unwrap();
        let instance = registry.get("m").unwrap();
        let layer = instance.groups[0].markers[2].layer;

        assert_eq!(view.open_popup(instance, layer).unwrap().page_count(), 2);
        assert_eq!(view.page_nav("m", layer, 1), Some("2 / 2".to_string()));
        assert_eq!(view.page_nav("m", layer, 1), None);
        assert_eq!(view.page_nav("m", layer, -1), Some("1 / 2".to_string()));

        view.forget_map("m");
        assert!(view.popup("m", layer).is_none());
    }
}
