use ratatui::style::Style;

/// Per-row facts the label column needs to draw guides and the expander.
#[derive(Clone, Copy)]
pub struct TreeRowContext<'a> {
    pub level: u16,
    /// One entry per nested level: `true` where that ancestor (or the row
    /// itself, last entry) is the last of its siblings.
    pub is_tail_stack: &'a [bool],
    pub is_expanded: bool,
    pub has_children: bool,
    pub draw_lines: bool,
    pub line_style: Style,
}
