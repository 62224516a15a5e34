//! Map state engine
//!
//! `registry` owns live maps, `markers`, `legend` and `borders` populate them,
//! `filter` produces reduced datasets, `view` switches between map and list,
//! and `runtime` ties it together for one session.

pub mod borders;
pub mod error;
pub mod events;
pub mod filter;
pub mod legend;
pub mod markers;
pub mod popup;
pub mod registry;
pub mod runtime;
pub mod view;

pub use borders::{
    BorderLayerLoader, BorderLoadReport, FileGeometryFetcher, GeometryFetcher, HttpGeometryFetcher,
    RoutingFetcher, StaticFetcher, validate_geometry,
};
pub use error::MapError;
pub use events::{EventBus, EventKind, MapEvent, SubscriptionId};
pub use filter::{FilterOutcome, FilterReconciler, FilterState, PopupCleaner};
pub use legend::{LegendControl, LegendController, LegendEntry, LegendTarget};
pub use markers::{MarkerGroupBuilder, RenderedGroup, RenderedMarker};
pub use popup::PopupPager;
pub use registry::{BorderLayer, MapHandle, MapInstance, MapRegistry, MapSummary, RememberedView};
pub use runtime::{MapEngine, Rebuild};
pub use view::{ReconcileReport, Validator, ViewController, ViewState};
