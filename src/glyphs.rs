use std::borrow::Cow;

use ratatui::style::Style;
use ratatui::text::{Line, Span};

use crate::context::TreeRowContext;

/// Guide and expander glyphs of the label column.
#[derive(Clone, Copy)]
pub struct TreeGlyphs<'a> {
    pub indent: &'a str,
    pub branch_last: &'a str,
    pub branch: &'a str,
    pub vert: &'a str,
    pub empty: &'a str,
    pub leaf: &'a str,
    pub expanded: &'a str,
    pub collapsed: &'a str,
}

impl TreeGlyphs<'static> {
    pub const fn unicode() -> Self {
        Self {
            indent: "   ",
            branch_last: "└──",
            branch: "├──",
            vert: "│  ",
            empty: "   ",
            leaf: " ",
            expanded: "▼",
            collapsed: "▶",
        }
    }

    pub const fn ascii() -> Self {
        Self {
            indent: "   ",
            branch_last: "`--",
            branch: "|--",
            vert: "|  ",
            empty: "   ",
            leaf: " ",
            expanded: "v",
            collapsed: ">",
        }
    }
}

/// Content of a label cell: text plus the row's decoration glyph.
#[derive(Clone, Debug, Default)]
pub struct TreeLabel<'a> {
    pub text: Cow<'a, str>,
    pub glyph: Option<&'a str>,
    pub style: Style,
}

impl<'a> TreeLabel<'a> {
    pub fn new(text: impl Into<Cow<'a, str>>) -> Self {
        Self {
            text: text.into(),
            glyph: None,
            style: Style::default(),
        }
    }
}

/// Width of the guides and expander [`tree_label_line`] draws at `level`.
pub fn label_prefix_width(level: u16, glyphs: &TreeGlyphs<'_>) -> usize {
    let guide = Span::raw(glyphs.branch).width().max(Span::raw(glyphs.empty).width());
    let expander = Span::raw(glyphs.collapsed).width().max(Span::raw(glyphs.leaf).width());
    usize::from(level) * guide + expander + 1
}

/// Builds the label column line: guides, expander, glyph and text.
pub fn tree_label_line<'a>(
    ctx: &TreeRowContext<'_>,
    label: TreeLabel<'a>,
    glyphs: &TreeGlyphs<'a>,
) -> Line<'a> {
    let TreeLabel { text, glyph, style } = label;
    let glyph = glyph.filter(|value| !value.is_empty());
    let mut spans = Vec::with_capacity(usize::from(ctx.level) + 5);

    if ctx.draw_lines && ctx.level > 0 {
        let last_level = ctx.is_tail_stack.len().saturating_sub(1);
        for (l, is_last) in ctx.is_tail_stack.iter().enumerate() {
            let part = match (l == last_level, *is_last) {
                (true, true) => glyphs.branch_last,
                (true, false) => glyphs.branch,
                (false, true) => glyphs.indent,
                (false, false) => glyphs.vert,
            };
            spans.push(Span::styled(part, ctx.line_style));
        }
    } else {
        for _ in 0..ctx.level {
            spans.push(Span::raw(glyphs.empty));
        }
    }

    let expander = match (ctx.has_children, ctx.is_expanded) {
        (true, true) => glyphs.expanded,
        (true, false) => glyphs.collapsed,
        (false, _) => glyphs.leaf,
    };
    spans.push(Span::raw(expander));
    spans.push(Span::raw(" "));

    if let Some(glyph) = glyph {
        spans.push(Span::raw(glyph));
        spans.push(Span::raw(" "));
    }

    spans.push(Span::styled(text, style));
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(level: u16, tails: &[bool], has_children: bool) -> TreeRowContext<'_> {
        TreeRowContext {
            level,
            is_tail_stack: tails,
            is_expanded: false,
            has_children,
            draw_lines: true,
            line_style: Style::default(),
        }
    }

    fn flat(line: &Line<'_>) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    #[test]
    fn top_level_rows_have_no_guides() {
        let line = tree_label_line(&ctx(0, &[], true), TreeLabel::new("GLO"), &TreeGlyphs::ascii());
        assert_eq!(flat(&line), "> GLO");
    }

    #[test]
    fn nested_rows_draw_connectors_and_glyph() {
        let label = TreeLabel {
            glyph: Some("⚙"),
            ..TreeLabel::new("market for steel")
        };
        let line = tree_label_line(&ctx(2, &[false, true], false), label, &TreeGlyphs::ascii());
        assert_eq!(flat(&line), "|  `--  ⚙ market for steel");
        assert_eq!(label_prefix_width(2, &TreeGlyphs::ascii()), 8);
    }
}
