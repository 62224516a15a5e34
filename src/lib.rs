//! Map state engine for categorized marker maps
//!
//! Builds marker groups, legends and border overlays on an abstract mapping
//! surface, reconciles them with filter events, and switches between map and
//! list views.

pub mod cli;
pub mod config;
pub mod engine;
pub mod geo;
pub mod model;
pub mod monitoring;
pub mod options;
pub mod surface;

pub use engine::{MapEngine, MapError};
pub use model::{BorderLayerDescriptor, CategoryData, Dataset, EntryRecord, FilterEvent};
pub use options::{MapOptions, MapOptionsPatch};
