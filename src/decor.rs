use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::role::Font;
use crate::snapshot::Row;

/// Tag of a closed set of row kinds (e.g. process, product, biosphere flow).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RowKind(pub &'static str);

/// Rendering rule for a `(kind, column)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decoration {
    pub glyph: Option<&'static str>,
    pub font: Font,
}

impl Decoration {
    pub const fn glyph(glyph: &'static str) -> Self {
        Self {
            glyph: Some(glyph),
            font: Font::Regular,
        }
    }

    pub const fn font(font: Font) -> Self {
        Self { glyph: None, font }
    }

    #[must_use]
    pub const fn with_font(mut self, font: Font) -> Self {
        self.font = font;
        self
    }
}

/// Classifies a row into its kind; `None` leaves the row undecorated.
pub type RowClassifier<R> = fn(&Row<R>) -> Option<RowKind>;

/// Lookup table from `(row kind, column)` to a [`Decoration`].
pub struct DecorationTable<R> {
    classify: RowClassifier<R>,
    rules: FxHashMap<RowKind, SmallVec<[(String, Decoration); 4]>>,
}

impl<R> Default for DecorationTable<R> {
    fn default() -> Self {
        Self::new(|_| None)
    }
}

impl<R> DecorationTable<R> {
    pub fn new(classify: RowClassifier<R>) -> Self {
        Self {
            classify,
            rules: FxHashMap::default(),
        }
    }

    /// Adds (or replaces) the rule for `kind` in `column`.
    #[must_use]
    pub fn rule(mut self, kind: RowKind, column: impl Into<String>, decoration: Decoration) -> Self {
        let column = column.into();
        let rules = self.rules.entry(kind).or_default();
        if let Some(slot) = rules.iter_mut().find(|(name, _)| *name == column) {
            slot.1 = decoration;
        } else {
            rules.push((column, decoration));
        }
        self
    }

    pub fn kind_of(&self, row: &Row<R>) -> Option<RowKind> {
        (self.classify)(row)
    }

    /// Resolves the decoration of a row in a column.
    pub fn lookup(&self, row: &Row<R>, column: &str) -> Option<Decoration> {
        let kind = self.kind_of(row)?;
        self.rules
            .get(&kind)?
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, decoration)| *decoration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROCESS: RowKind = RowKind("process");
    const WASTE: RowKind = RowKind("waste");

    fn classify(row: &Row<()>) -> Option<RowKind> {
        match row.get("Type").as_text()? {
            "process" => Some(PROCESS),
            "waste" => Some(WASTE),
            _ => None,
        }
    }

    #[test]
    fn lookup_dispatches_on_kind_and_column() {
        let table = DecorationTable::new(classify)
            .rule(PROCESS, "Activity", Decoration::glyph("⚙"))
            .rule(WASTE, "Product", Decoration::glyph("♻").with_font(Font::Italic));

        let process = Row::new(()).with("Type", "process");
        let waste = Row::new(()).with("Type", "waste");
        let other = Row::new(()).with("Type", "emission");

        assert_eq!(table.lookup(&process, "Activity"), Some(Decoration::glyph("⚙")));
        assert_eq!(table.lookup(&process, "Product"), None);
        assert_eq!(table.lookup(&waste, "Product").map(|d| d.font), Some(Font::Italic));
        assert_eq!(table.lookup(&other, "Activity"), None);
    }
}
