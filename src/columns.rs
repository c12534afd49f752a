use ratatui::text::Span;
use smallvec::SmallVec;

use crate::glyphs::{TreeGlyphs, label_prefix_width};
use crate::item::ItemId;
use crate::model::TableModel;
use crate::role::ItemRole;
use crate::settings::HeaderGeometry;
use crate::state::VisibleNode;

/// Width constraints for a column in adaptive layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnWidth {
    /// Minimum width.
    pub min: u16,
    /// Ideal width (used before expanding toward max).
    pub ideal: u16,
    /// Maximum width.
    pub max: u16,
}

impl ColumnWidth {
    /// Creates a fixed width (min = ideal = max).
    pub const fn fixed(width: u16) -> Self {
        Self {
            min: width,
            ideal: width,
            max: width,
        }
    }
}

/// Narrowest a column is squeezed to when space runs out.
const MIN_COLUMN: u16 = 3;
/// Widest a column sized to its content grows.
const MAX_CONTENT: u16 = 48;

/// Distributes `total` width across columns respecting `min`/`ideal`/`max`.
///
/// If `total` is outside the feasible range (`sum(min)`..=`sum(max)`), the returned widths are
/// clamped to `min` or `max` respectively (so the sum may differ from `total`).
pub fn distribute_widths(total: u16, columns: &[ColumnWidth]) -> SmallVec<[u16; 8]> {
    let mut widths: SmallVec<[u16; 8]> = columns.iter().map(|col| col.min).collect();
    let min_sum = widths.iter().fold(0u16, |acc, w| acc.saturating_add(*w));
    let mut remaining = total.saturating_sub(min_sum);

    // Grow toward ideal widths first, then toward max.
    let targets: [fn(&ColumnWidth) -> u16; 2] = [|col| col.ideal.max(col.min), |col| col.max];
    for target in targets {
        for (width, col) in widths.iter_mut().zip(columns) {
            if remaining == 0 {
                return widths;
            }
            let add = target(col).saturating_sub(*width).min(remaining);
            *width += add;
            remaining -= add;
        }
    }
    widths
}

/// Width bounds of the shown `sections`, measured over `nodes`.
///
/// A width saved in `geometry` is taken as fixed; other columns size to the
/// widest of header and cells. The label column may absorb leftover space.
pub(crate) fn measure_columns<R>(
    model: &TableModel<R>,
    sections: &[usize],
    nodes: &[VisibleNode<ItemId>],
    geometry: &HeaderGeometry,
    glyphs: &TreeGlyphs<'_>,
) -> SmallVec<[ColumnWidth; 8]> {
    sections
        .iter()
        .map(|&section| {
            if let Some(width) = geometry.width(section) {
                return ColumnWidth::fixed(width);
            }
            let header = text_width(&model.header_data(section, ItemRole::Display).text());
            let filter_mark = text_width(&model.header_data(section, ItemRole::Decoration).text());
            let cells = nodes
                .iter()
                .map(|node| {
                    let mut width = text_width(&model.data(node.id(), section, ItemRole::Display).text());
                    if let Some(glyph) = model.data(node.id(), section, ItemRole::Decoration).glyph() {
                        width += text_width(glyph) + 1;
                    }
                    if section == 0 {
                        width += label_prefix_width(node.level(), glyphs);
                    }
                    width
                })
                .max()
                .unwrap_or(0);
            let content = u16::try_from(header.max(cells) + filter_mark + 1).unwrap_or(u16::MAX);
            let ideal = content.clamp(MIN_COLUMN, MAX_CONTENT);
            ColumnWidth {
                min: MIN_COLUMN.min(ideal),
                ideal,
                max: if section == 0 { u16::MAX } else { ideal },
            }
        })
        .collect()
}

fn text_width(text: &str) -> usize {
    Span::raw(text).width()
}
