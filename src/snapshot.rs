use rustc_hash::FxHashMap;

use crate::value::CellValue;

static NULL: CellValue = CellValue::Null;

/// One entity of the flat snapshot: named cells plus an opaque back-reference.
///
/// The back-reference is round-tripped to edit targets and drag payloads and is
/// never displayed or interpreted by the model.
#[derive(Clone, Debug)]
pub struct Row<R> {
    cells: FxHashMap<String, CellValue>,
    reference: R,
}

impl<R> Row<R> {
    pub fn new(reference: R) -> Self {
        Self {
            cells: FxHashMap::default(),
            reference,
        }
    }

    /// Builder-style cell insert.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.insert(column.into(), value.into());
    }

    /// Returns the cell value; missing cells read as [`CellValue::Null`].
    #[inline]
    pub fn get(&self, column: &str) -> &CellValue {
        self.cells.get(column).unwrap_or(&NULL)
    }

    #[inline]
    pub fn has(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    #[inline]
    pub const fn reference(&self) -> &R {
        &self.reference
    }

    pub fn cell_names(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }
}

/// Flat tabular input handed to a [`TableModel`](crate::TableModel).
#[derive(Clone, Debug)]
pub struct Snapshot<R> {
    columns: Vec<String>,
    rows: Vec<Row<R>>,
}

impl<R> Default for Snapshot<R> {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }
}

impl<R> Snapshot<R> {
    /// Creates an empty snapshot with the given display column order.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut snapshot = Self::default();
        for column in columns {
            snapshot.add_column(column);
        }
        snapshot
    }

    /// Appends a column unless it is already present.
    pub fn add_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    /// Appends a row. Cells naming columns not yet declared extend the column list.
    pub fn push(&mut self, row: Row<R>) {
        let mut extra: Vec<&str> = row
            .cell_names()
            .filter(|name| !self.columns.iter().any(|col| col == name))
            .collect();
        // Hash order is not stable; keep newly discovered columns deterministic.
        extra.sort_unstable();
        let extra: Vec<String> = extra.into_iter().map(str::to_string).collect();
        self.columns.extend(extra);
        self.rows.push(row);
    }

    /// Builder-style variant of [`push`](Self::push).
    #[must_use]
    pub fn with_row(mut self, row: Row<R>) -> Self {
        self.push(row);
        self
    }

    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[inline]
    pub fn rows(&self) -> &[Row<R>] {
        &self.rows
    }

    #[inline]
    pub fn row(&self, idx: usize) -> Option<&Row<R>> {
        self.rows.get(idx)
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|col| col == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cells_read_as_null() {
        let row = Row::new(1u32).with("name", "steel");
        assert_eq!(row.get("name"), &CellValue::from("steel"));
        assert!(row.get("unit").is_null());
    }

    #[test]
    fn push_extends_columns_in_sorted_order() {
        let snapshot = Snapshot::new(["name"])
            .with_row(Row::new(()).with("name", "a").with("unit", "kg").with("amount", 1i64));
        assert_eq!(snapshot.columns(), ["name", "amount", "unit"]);
        assert!(snapshot.has_column("unit"));
    }
}
