use rustc_hash::{FxHashMap, FxHashSet};

/// Exchange fields that can be written back field-by-field; everything else
/// is routed to the entity owning the row.
pub const DEFAULT_EDITABLE_FIELDS: [&str; 10] = [
    "amount",
    "formula",
    "uncertainty type",
    "loc",
    "scale",
    "shape",
    "minimum",
    "maximum",
    "comment",
    "functional",
];

/// Model-level behaviour switches.
#[derive(Clone, Debug)]
pub struct ModelConfig {
    /// Store-side field names accepted by the field-level update.
    pub editable_fields: FxHashSet<String>,
    /// Display column → store field name.
    pub field_aliases: FxHashMap<String, String>,
    /// Columns that refuse inline edits (derived or computed values).
    pub locked_columns: FxHashSet<String>,
    /// Fold ASCII case when sorting text.
    pub sort_case_insensitive: bool,
    /// Separator between grouped column names in the first header.
    pub group_separator: &'static str,
    /// Glyph reported as header decoration for filtered columns.
    pub filter_glyph: &'static str,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let field_aliases = [
            ("Amount", "amount"),
            ("Formula", "formula"),
            ("Comment", "comment"),
            ("Functional", "functional"),
            ("Uncertainty", "uncertainty type"),
            ("Product", "reference product"),
            ("Activity", "name"),
            ("Location", "location"),
            ("Unit", "unit"),
            ("Categories", "categories"),
        ]
        .into_iter()
        .map(|(display, field)| (display.to_string(), field.to_string()))
        .collect();

        Self {
            editable_fields: DEFAULT_EDITABLE_FIELDS.iter().map(|f| (*f).to_string()).collect(),
            field_aliases,
            locked_columns: FxHashSet::default(),
            sort_case_insensitive: false,
            group_separator: " > ",
            filter_glyph: "≡",
        }
    }
}

impl ModelConfig {
    /// Marks a column as not inline-editable.
    #[must_use]
    pub fn lock_column(mut self, column: impl Into<String>) -> Self {
        self.locked_columns.insert(column.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, column: impl Into<String>, field: impl Into<String>) -> Self {
        self.field_aliases.insert(column.into(), field.into());
        self
    }

    #[must_use]
    pub const fn sort_case_insensitive(mut self, enabled: bool) -> Self {
        self.sort_case_insensitive = enabled;
        self
    }

    /// Store field name for a display column.
    pub fn field_name<'a>(&'a self, column: &'a str) -> &'a str {
        self.field_aliases.get(column).map_or(column, String::as_str)
    }
}

/// View-level behaviour switches.
#[derive(Clone, Copy, Debug)]
pub struct ViewConfig {
    /// Quick-search prefix that switches to a raw query expression.
    pub raw_query_marker: char,
    /// Per-column filters match case-sensitively.
    pub column_filter_case_sensitive: bool,
    /// Quick search matches case-sensitively.
    pub quick_search_case_sensitive: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            raw_query_marker: '=',
            column_filter_case_sensitive: true,
            quick_search_case_sensitive: false,
        }
    }
}

impl ViewConfig {
    #[must_use]
    pub const fn raw_query_marker(mut self, marker: char) -> Self {
        self.raw_query_marker = marker;
        self
    }

    #[must_use]
    pub const fn column_filter_case_sensitive(mut self, enabled: bool) -> Self {
        self.column_filter_case_sensitive = enabled;
        self
    }

    #[must_use]
    pub const fn quick_search_case_sensitive(mut self, enabled: bool) -> Self {
        self.quick_search_case_sensitive = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_name_falls_back_to_column() {
        let config = ModelConfig::default().alias("Ref. product", "reference product");
        assert_eq!(config.field_name("Ref. product"), "reference product");
        assert_eq!(config.field_name("Amount"), "amount");
        assert_eq!(config.field_name("loc"), "loc");
    }
}
