//! Persisted view state and the settings document it lives in.
//!
//! A [`ViewState`] captures everything a [`TreeView`](crate::TreeView) needs to
//! come back exactly as the user left it: column order, grouping, visibility,
//! per-column filters, sort and the expanded group paths. States are filed in
//! a [`SettingsStore`] by section (e.g. `"database_explorer"`) and subject
//! (e.g. a database name).

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SettingsError;
use crate::item::PathSegment;

/// Serializable snapshot of a view's presentation state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewState {
    pub columns: Vec<String>,
    pub grouped_columns: Vec<String>,
    /// Empty means "all visible" (records written before visibility existed).
    pub visible_columns: Vec<String>,
    pub filters: BTreeMap<String, String>,
    pub sort_column: Option<String>,
    pub sort_ascending: bool,
    pub expanded_paths: Vec<Vec<PathSegment>>,
    /// Base64 [`HeaderGeometry`] blob.
    pub header_state: String,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            grouped_columns: Vec::new(),
            visible_columns: Vec::new(),
            filters: BTreeMap::new(),
            sort_column: None,
            sort_ascending: true,
            expanded_paths: Vec::new(),
            header_state: String::new(),
        }
    }
}

impl ViewState {
    /// State used when nothing was saved for a subject: all columns visible,
    /// nothing grouped, filtered or expanded.
    pub fn default_for<S: AsRef<str>>(columns: &[S]) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        Self {
            visible_columns: columns.clone(),
            columns,
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Column widths as laid out by the header, persisted as an opaque blob.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderGeometry {
    pub widths: Vec<u16>,
}

impl HeaderGeometry {
    pub const fn new(widths: Vec<u16>) -> Self {
        Self { widths }
    }

    /// Saved width of a column; `None` (or zero) means "size to content".
    pub fn width(&self, section: usize) -> Option<u16> {
        self.widths.get(section).copied().filter(|w| *w > 0)
    }

    pub fn set_width(&mut self, section: usize, width: u16) {
        if self.widths.len() <= section {
            self.widths.resize(section + 1, 0);
        }
        self.widths[section] = width;
    }

    /// Little-endian `u16` pairs, base64 encoded.
    pub fn encode(&self) -> String {
        let bytes: Vec<u8> = self.widths.iter().flat_map(|w| w.to_le_bytes()).collect();
        STANDARD.encode(bytes)
    }

    pub fn decode(blob: &str) -> Result<Self, SettingsError> {
        let bytes = STANDARD.decode(blob.trim())?;
        if bytes.len() % 2 != 0 {
            return Err(SettingsError::HeaderLength(bytes.len()));
        }
        let widths = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self { widths })
    }

    /// Decodes a blob, falling back to default geometry on garbage.
    pub fn decode_or_default(blob: &str) -> Self {
        Self::decode(blob).unwrap_or_else(|err| {
            tracing::warn!(target: "tui_treetable::settings", error = %err, "discarding header state");
            Self::default()
        })
    }
}

/// Where view states are filed.
pub trait SettingsStore {
    fn load(&self, section: &str, subject: &str) -> Option<ViewState>;
    fn save(&mut self, section: &str, subject: &str, state: ViewState);
}

/// JSON-document settings store kept in memory.
///
/// The document is a plain object `section → subject → state`; unknown
/// sections are preserved untouched when the document is written back.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemorySettings {
    document: Map<String, Value>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let document = match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => map,
            other => {
                tracing::warn!(target: "tui_treetable::settings", kind = ?other, "settings root is not an object");
                Map::new()
            }
        };
        Ok(Self { document })
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }

    pub fn subjects(&self, section: &str) -> impl Iterator<Item = &str> {
        self.document
            .get(section)
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|subjects| subjects.keys().map(String::as_str))
    }

    pub fn remove(&mut self, section: &str, subject: &str) -> bool {
        self.document
            .get_mut(section)
            .and_then(Value::as_object_mut)
            .is_some_and(|subjects| subjects.remove(subject).is_some())
    }
}

impl SettingsStore for MemorySettings {
    fn load(&self, section: &str, subject: &str) -> Option<ViewState> {
        let value = self.document.get(section)?.get(subject)?;
        match serde_json::from_value(value.clone()) {
            Ok(state) => Some(state),
            Err(err) => {
                tracing::warn!(target: "tui_treetable::settings", section, subject, error = %err, "discarding view state");
                None
            }
        }
    }

    fn save(&mut self, section: &str, subject: &str, state: ViewState) {
        let value = match serde_json::to_value(state) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(target: "tui_treetable::settings", section, subject, error = %err, "view state not serializable");
                return;
            }
        };
        let entry = self
            .document
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(subjects) = entry {
            subjects.insert(subject.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> ViewState {
        let mut state = ViewState::default_for(&["Activity", "Product", "Location"]);
        state.grouped_columns = vec!["Location".to_string()];
        state.visible_columns = vec!["Activity".to_string(), "Location".to_string()];
        state.filters.insert("Product".to_string(), "steel".to_string());
        state.sort_column = Some("Product".to_string());
        state.sort_ascending = false;
        state.expanded_paths = vec![vec![PathSegment::Text("GLO".to_string())]];
        state.header_state = HeaderGeometry::new(vec![30, 12, 8]).encode();
        state
    }

    #[test]
    fn view_state_json_round_trip() {
        let state = sample_state();
        let text = state.to_json().unwrap();
        assert_eq!(ViewState::from_json(&text).unwrap(), state);
    }

    #[test]
    fn partial_records_fill_defaults() {
        let state = ViewState::from_json(r#"{"columns": ["a"], "filters": {"a": "x"}}"#).unwrap();
        assert_eq!(state.columns, ["a"]);
        assert!(state.sort_ascending);
        assert!(state.visible_columns.is_empty());
        assert!(state.expanded_paths.is_empty());
    }

    #[test]
    fn header_geometry_blob_round_trip() {
        let geometry = HeaderGeometry::new(vec![1, 300, 65535]);
        let blob = geometry.encode();
        assert_eq!(HeaderGeometry::decode(&blob).unwrap(), geometry);
        assert_eq!(HeaderGeometry::decode("").unwrap(), HeaderGeometry::default());
    }

    #[test]
    fn header_geometry_rejects_garbage() {
        assert!(matches!(HeaderGeometry::decode("!!"), Err(SettingsError::HeaderBlob(_))));
        // "AAAA" is three bytes.
        assert!(matches!(HeaderGeometry::decode("AAAA"), Err(SettingsError::HeaderLength(3))));
        assert_eq!(HeaderGeometry::decode_or_default("!!"), HeaderGeometry::default());
    }

    #[test]
    fn memory_settings_file_states_by_section_and_subject() {
        let mut store = MemorySettings::new();
        store.save("database_explorer", "ecoinvent", sample_state());
        store.save("database_explorer", "biosphere3", ViewState::default_for(&["Name"]));

        let text = store.to_json().unwrap();
        let reloaded = MemorySettings::from_json(&text).unwrap();
        assert_eq!(reloaded.load("database_explorer", "ecoinvent"), Some(sample_state()));
        assert_eq!(reloaded.subjects("database_explorer").count(), 2);
        assert_eq!(reloaded.load("database_explorer", "missing"), None);
        assert_eq!(reloaded.load("other", "ecoinvent"), None);
    }

    #[test]
    fn undecodable_entries_load_as_absent() {
        let mut store = MemorySettings::from_json(
            r#"{"database_explorer": {"db": {"columns": 5}}, "theme": "dark"}"#,
        )
        .unwrap();
        assert_eq!(store.load("database_explorer", "db"), None);

        store.save("database_explorer", "db", ViewState::default());
        assert!(store.load("database_explorer", "db").is_some());
        assert!(store.to_json().unwrap().contains("\"theme\""));
        assert!(store.remove("database_explorer", "db"));
    }
}
