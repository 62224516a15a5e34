//! Entry data feed and filter payload types
//!
//! The wire shapes mirror what the server side emits: a JSON object keyed by
//! category slot (`cat1`, `cat2`, ...) whose values carry a title and an
//! ordered list of entries. Identifiers arrive as strings or numbers and are
//! normalised to strings on the way in.

use crate::geo::LatLng;
use crate::surface::CircleStyle;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_MARKER_COLOR: &str = "#000000";
pub const DEFAULT_MARKER_RADIUS: u32 = 5;

/// Category-keyed entry data, in legend order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    categories: Vec<(String, CategoryData)>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a category, keeping the original slot on replace
    pub fn insert(&mut self, key: impl Into<String>, data: CategoryData) {
        let key = key.into();
        match self.categories.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = data,
            None => self.categories.push((key, data)),
        }
    }

    pub fn with_category(mut self, key: impl Into<String>, data: CategoryData) -> Self {
        self.insert(key, data);
        self
    }

    pub fn get(&self, key: &str) -> Option<&CategoryData> {
        self.categories.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryData)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Total entries across all categories
    pub fn entry_count(&self) -> usize {
        self.categories.iter().map(|(_, c)| c.data.len()).sum()
    }

    /// Parse the JSON feed format
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl FromIterator<(String, CategoryData)> for Dataset {
    fn from_iter<I: IntoIterator<Item = (String, CategoryData)>>(iter: I) -> Self {
        let mut dataset = Dataset::new();
        for (key, data) in iter {
            dataset.insert(key, data);
        }
        dataset
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.categories.len()))?;
        for (key, data) in &self.categories {
            map.serialize_entry(key, data)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DatasetVisitor;

        impl<'de> Visitor<'de> for DatasetVisitor {
            type Value = Dataset;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of category key to {title, data}")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Dataset, A::Error> {
                let mut dataset = Dataset::new();
                while let Some((key, data)) = access.next_entry::<String, CategoryData>()? {
                    dataset.insert(key, data);
                }
                Ok(dataset)
            }
        }

        deserializer.deserialize_map(DatasetVisitor)
    }
}

/// One category of the feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub data: Vec<EntryRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CategoryData {
    pub fn new(title: impl Into<String>, data: Vec<EntryRecord>) -> Self {
        Self {
            title: title.into(),
            data,
            extra: Map::new(),
        }
    }
}

/// One entry of the feed, before style defaults are applied
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    #[serde(
        rename = "entry_id",
        alias = "entry_ID",
        alias = "entryID",
        default,
        deserialize_with = "de_id"
    )]
    pub entry_id: String,
    #[serde(deserialize_with = "de_coordinate")]
    pub lat: f64,
    #[serde(deserialize_with = "de_coordinate")]
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(
        rename = "fillOpacity",
        alias = "fill_opacity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fill_opacity: Option<f64>,
    #[serde(default)]
    pub popup_text: String,
    /// Linked records the filter matches against
    #[serde(
        rename = "projects",
        alias = "items",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sub_items: Option<Vec<SubItem>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntryRecord {
    pub fn new(entry_id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            entry_id: entry_id.into(),
            lat,
            lon,
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_popup(mut self, popup_text: impl Into<String>) -> Self {
        self.popup_text = popup_text.into();
        self
    }

    pub fn with_sub_items<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sub_items = Some(ids.into_iter().map(|id| SubItem::new(id)).collect());
        self
    }
}

/// A record linked to an entry (e.g. a project at a location)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubItem {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: Map::new(),
        }
    }
}

/// A point marker with every style default resolved
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerEntry {
    pub entry_id: String,
    pub position: LatLng,
    pub style: CircleStyle,
    pub popup_html: String,
}

impl MarkerEntry {
    /// Resolve a feed record, falling back to the group color for stroke/fill
    pub fn from_record(record: &EntryRecord, group_color: &str) -> Self {
        let color = record
            .color
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| group_color.to_string());

        Self {
            entry_id: record.entry_id.clone(),
            position: LatLng::new(record.lat, record.lon),
            style: CircleStyle {
                radius: record.radius.filter(|r| *r > 0).unwrap_or(DEFAULT_MARKER_RADIUS),
                stroke_color: color.clone(),
                fill_color: color,
                weight: positive_or(record.weight, 1.0),
                opacity: positive_or(record.opacity, 1.0),
                fill_opacity: positive_or(record.fill_opacity, 1.0),
            },
            popup_html: record.popup_text.clone(),
        }
    }
}

// Zero falls through to the default, matching the feed's `value || default` convention.
fn positive_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| *v != 0.0 && !v.is_nan()).unwrap_or(default)
}

/// A legend slot with its resolved markers
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup {
    pub key: String,
    pub title: String,
    pub color: String,
    pub entries: Vec<MarkerEntry>,
}

impl CategoryGroup {
    /// Build a group; the representative color is the first entry's color
    pub fn from_category(key: &str, category: &CategoryData) -> Self {
        let color = category
            .data
            .first()
            .and_then(|first| first.color.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_MARKER_COLOR.to_string());

        let entries = category
            .data
            .iter()
            .map(|record| MarkerEntry::from_record(record, &color))
            .collect();

        Self {
            key: key.to_string(),
            title: category.title.clone(),
            color,
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Payload of the external filter UI's "filter processed" event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterEvent {
    #[serde(
        rename = "filteredIDs",
        alias = "filtered_ids",
        default,
        deserialize_with = "de_id_list"
    )]
    pub filtered_ids: Vec<String>,
    #[serde(
        rename = "currentFilterPostIDs",
        alias = "current_filter_post_ids",
        default,
        deserialize_with = "de_id_groups"
    )]
    pub current_filter_post_ids: BTreeMap<String, Vec<String>>,
}

impl FilterEvent {
    pub fn new<I, S>(filtered_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filtered_ids: filtered_ids.into_iter().map(Into::into).collect(),
            current_filter_post_ids: BTreeMap::new(),
        }
    }

    pub fn with_group<I, S>(mut self, group: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.current_filter_post_ids
            .insert(group.into(), ids.into_iter().map(Into::into).collect());
        self
    }
}

/// A fetchable boundary geometry file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorderLayerDescriptor {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: String,
}

impl BorderLayerDescriptor {
    pub fn new(id: impl Into<String>, url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            name: name.into(),
        }
    }
}

fn id_from_value<E: de::Error>(value: Value) -> Result<String, E> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(E::custom(format!("expected string or number id, got {}", other))),
    }
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    id_from_value(Value::deserialize(deserializer)?)
}

fn de_id_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(id_from_value).collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(de::Error::custom(format!("expected id list, got {}", other))),
    }
}

fn de_id_groups<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, Vec<String>>, D::Error> {
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    let mut groups = BTreeMap::new();
    for (group, value) in raw.unwrap_or_default() {
        let ids = match value {
            Value::Array(items) => items
                .into_iter()
                .map(id_from_value)
                .collect::<Result<Vec<_>, D::Error>>()?,
            Value::Null => Vec::new(),
            other => vec![id_from_value(other)?],
        };
        groups.insert(group, ids);
    }
    Ok(groups)
}

fn de_coordinate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom("coordinate out of range"))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| de::Error::custom(format!("invalid coordinate '{}': {}", s, e)))?,
        other => return Err(de::Error::custom(format!("expected coordinate, got {}", other))),
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(de::Error::custom(format!("coordinate must be finite, got {}", value)))
    }
}
