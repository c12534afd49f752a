use ratatui::style::{Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::Borders;

use crate::role::Font;

/// Scroll policy applied when the selected row changes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TreeScrollPolicy {
    #[default]
    KeepInView,
    CenterOnSelect,
}

/// Visual settings of the tree table widget.
#[derive(Clone)]
pub struct TreeTableStyle<'a> {
    pub title: Option<Line<'a>>,
    pub block_style: Style,
    pub border_style: Style,
    pub header_style: Style,
    /// Patched onto the header cell of a column with an active filter.
    pub filtered_header_style: Style,
    /// Patched onto the header cell under the column cursor.
    pub selected_header_style: Style,
    pub highlight_style: Style,
    pub branch_style: Style,
    pub line_style: Style,
    pub highlight_symbol: &'a str,
    pub borders: Borders,
    pub column_spacing: u16,
    pub virtualize_rows: bool,
    pub scroll_policy: TreeScrollPolicy,
}

impl Default for TreeTableStyle<'_> {
    fn default() -> Self {
        Self {
            title: None,
            block_style: Style::default(),
            border_style: Style::default(),
            header_style: Style::default().add_modifier(Modifier::BOLD),
            filtered_header_style: Style::default().add_modifier(Modifier::UNDERLINED),
            selected_header_style: Style::default().add_modifier(Modifier::REVERSED),
            highlight_style: Style::default().add_modifier(Modifier::REVERSED),
            branch_style: Style::default(),
            line_style: Style::default(),
            highlight_symbol: ">> ",
            borders: Borders::ALL,
            column_spacing: 1,
            virtualize_rows: false,
            scroll_policy: TreeScrollPolicy::KeepInView,
        }
    }
}

/// Terminal style for a model font hint.
pub fn font_style(font: Font) -> Style {
    match font {
        Font::Regular => Style::default(),
        Font::Bold => Style::default().add_modifier(Modifier::BOLD),
        Font::Italic => Style::default().add_modifier(Modifier::ITALIC),
        Font::Underline => Style::default().add_modifier(Modifier::UNDERLINED),
    }
}
