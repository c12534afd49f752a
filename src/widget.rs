use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::prelude::Buffer;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, List, ListItem, ListState, Row, Scrollbar, ScrollbarOrientation,
    ScrollbarState, StatefulWidget, Table, TableState, Widget,
};
use smallvec::SmallVec;

use crate::columns::{distribute_widths, measure_columns};
use crate::context::TreeRowContext;
use crate::glyphs::{TreeGlyphs, TreeLabel, tree_label_line};
use crate::item::ItemId;
use crate::menu::{HeaderMenu, MenuEntry};
use crate::model::TableModel;
use crate::role::{Font, ItemRole};
use crate::state::VisibleNode;
use crate::style::{TreeTableStyle, font_style};
use crate::view::TreeView;

/// Tree table widget: renders a [`TableModel`] through a [`TreeView`].
pub struct TreeTable<'a, R> {
    model: &'a TableModel<R>,
    style: TreeTableStyle<'a>,
    glyphs: TreeGlyphs<'a>,
}

impl<'a, R> TreeTable<'a, R> {
    pub const fn new(model: &'a TableModel<R>, style: TreeTableStyle<'a>) -> Self {
        Self {
            model,
            style,
            glyphs: TreeGlyphs::unicode(),
        }
    }

    #[must_use]
    pub const fn glyphs(mut self, glyphs: TreeGlyphs<'a>) -> Self {
        self.glyphs = glyphs;
        self
    }

    fn header_row(&self, sections: &[usize], selected: usize) -> Row<'a> {
        let cells: SmallVec<[Cell<'a>; 8]> = sections
            .iter()
            .map(|&section| {
                let mut style = self.style.header_style;
                if self.model.header_data(section, ItemRole::Font).font() == Some(Font::Underline) {
                    style = style.patch(self.style.filtered_header_style);
                }
                if section == selected {
                    style = style.patch(self.style.selected_header_style);
                }
                let title = self.model.header_data(section, ItemRole::Display).into_text();
                let mut spans = vec![Span::raw(title)];
                if let Some(glyph) = self.model.header_data(section, ItemRole::Decoration).glyph() {
                    spans.push(Span::raw(" "));
                    spans.push(Span::raw(glyph));
                }
                Cell::from(Line::from(spans)).style(style)
            })
            .collect();
        Row::new(cells)
    }

    fn build_rows(&self, nodes: &[VisibleNode<ItemId>], sections: &[usize], view: &TreeView) -> Vec<Row<'a>> {
        let draw_lines = view.state().draw_lines();
        nodes
            .iter()
            .map(|node| {
                let id = node.id();
                let mut cells = SmallVec::<[Cell<'a>; 8]>::with_capacity(sections.len());
                for &section in sections {
                    if section == 0 {
                        let ctx = TreeRowContext {
                            level: node.level(),
                            is_tail_stack: node.is_tail_stack.as_slice(),
                            is_expanded: view.is_expanded(id),
                            has_children: node.has_children(),
                            draw_lines,
                            line_style: self.style.line_style,
                        };
                        let mut style = self.cell_style(id, 0);
                        if node.has_children() {
                            style = style.patch(self.style.branch_style);
                        }
                        let label = TreeLabel {
                            text: self.model.data(id, 0, ItemRole::Display).into_text(),
                            glyph: self.model.data(id, 0, ItemRole::Decoration).glyph(),
                            style,
                        };
                        cells.push(Cell::from(tree_label_line(&ctx, label, &self.glyphs)));
                    } else {
                        cells.push(self.data_cell(id, section));
                    }
                }
                Row::new(cells)
            })
            .collect()
    }

    fn cell_style(&self, id: ItemId, section: usize) -> Style {
        self.model
            .data(id, section, ItemRole::Font)
            .font()
            .map_or_else(Style::default, font_style)
    }

    fn data_cell(&self, id: ItemId, section: usize) -> Cell<'a> {
        let text = self.model.data(id, section, ItemRole::Display).into_text();
        let style = self.cell_style(id, section);
        let line = match self.model.data(id, section, ItemRole::Decoration).glyph() {
            Some(glyph) => Line::from(vec![Span::raw(glyph), Span::raw(" "), Span::styled(text, style)]),
            None => Line::from(Span::styled(text, style)),
        };
        Cell::from(line)
    }

    #[inline]
    fn render_scrollbar(
        area: Rect,
        buf: &mut Buffer,
        offset: usize,
        inner_height: usize,
        scroll_rows: usize,
    ) {
        let scroll_len = scroll_rows.saturating_add(1);
        let mut scrollbar_state = ScrollbarState::new(scroll_len)
            .position(offset.min(scroll_len.saturating_sub(1)))
            .viewport_content_length(inner_height);
        Scrollbar::default()
            .orientation(ScrollbarOrientation::VerticalRight)
            .render(area, buf, &mut scrollbar_state);
    }
}

impl<R> StatefulWidget for TreeTable<'_, R> {
    type State = TreeView;

    fn render(self, area: Rect, buf: &mut Buffer, view: &mut Self::State) {
        let mut block = Block::default().borders(self.style.borders);
        if let Some(title) = self.style.title.clone() {
            block = block.title(title);
        }
        block = block
            .style(self.style.block_style)
            .border_style(self.style.border_style);

        if let Err(err) = view.sync(self.model) {
            tracing::warn!(target: "tui_treetable::view", error = %err, "not rendering tree table");
            block.render(area, buf);
            return;
        }

        let inner_height = block.inner(area).height.saturating_sub(1) as usize;
        view.state_mut()
            .ensure_selection_visible_with_policy(inner_height, self.style.scroll_policy);

        let sections = view.visible_columns(self.model);
        let selected_section = view.selected_section();
        let header = self.header_row(&sections, selected_section);

        let state = view.state();
        let visible_nodes = state.visible_nodes();
        let total_rows = visible_nodes.len();
        let offset = state.list_state().offset().min(total_rows);
        let (range_start, range_end) = if self.style.virtualize_rows {
            (offset, (offset + inner_height).min(total_rows))
        } else {
            (0, total_rows)
        };
        let nodes = &visible_nodes[range_start..range_end];
        let rows = self.build_rows(nodes, &sections, view);
        let scroll_rows = total_rows.saturating_sub(inner_height);

        // The view tracks model sections; the table wants rendered positions.
        let mut table_state: TableState = *state.list_state();
        table_state.select_column(sections.iter().position(|s| *s == selected_section));
        if self.style.virtualize_rows {
            *table_state.offset_mut() = 0;
            let selected = table_state
                .selected()
                .filter(|idx| (range_start..range_end).contains(idx))
                .map(|idx| idx - range_start);
            table_state.select(selected);
        }

        let (table_area, table_block, scrollbar_area) = if scroll_rows > 0 {
            let table_area = Rect {
                width: area.width.saturating_sub(1),
                ..area
            };
            let scrollbar_area = Rect {
                x: area.x + area.width.saturating_sub(1),
                y: area.y,
                width: 1,
                height: area.height,
            };
            let mut table_borders = self.style.borders;
            table_borders.remove(Borders::RIGHT);
            (table_area, block.borders(table_borders), Some(scrollbar_area))
        } else {
            (area, block, None)
        };

        let inner = table_block.inner(table_area);
        let symbol = Span::raw(self.style.highlight_symbol).width();
        let gaps = self
            .style
            .column_spacing
            .saturating_mul(u16::try_from(sections.len().saturating_sub(1)).unwrap_or(u16::MAX));
        let available = inner
            .width
            .saturating_sub(u16::try_from(symbol).unwrap_or(u16::MAX))
            .saturating_sub(gaps);
        let bounds = measure_columns(self.model, &sections, nodes, view.header_geometry(), &self.glyphs);
        let widths = distribute_widths(available, &bounds);

        let table = Table::new(rows, widths.iter().copied().map(Constraint::Length))
            .header(header)
            .style(self.style.block_style)
            .block(table_block)
            .column_spacing(self.style.column_spacing)
            .row_highlight_style(self.style.highlight_style)
            .highlight_symbol(self.style.highlight_symbol);
        StatefulWidget::render(table, table_area, buf, &mut table_state);

        if !self.style.virtualize_rows {
            *view.state_mut().list_state_mut().offset_mut() = table_state.offset();
        }
        if let Some(scrollbar_area) = scrollbar_area {
            let offset = view.state().list_state().offset();
            Self::render_scrollbar(scrollbar_area, buf, offset, inner_height, scroll_rows);
        }
    }
}

/// Popup drawing a [`HeaderMenu`]: filter box, commands, then the "View" toggles.
pub struct HeaderMenuView<'a> {
    menu: &'a HeaderMenu,
    style: Style,
    highlight_style: Style,
}

impl<'a> HeaderMenuView<'a> {
    pub fn new(menu: &'a HeaderMenu) -> Self {
        Self {
            menu,
            style: Style::default(),
            highlight_style: Style::default().add_modifier(Modifier::REVERSED),
        }
    }

    #[must_use]
    pub const fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub const fn highlight_style(mut self, style: Style) -> Self {
        self.highlight_style = style;
        self
    }
}

impl Widget for HeaderMenuView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.menu.column())
            .style(self.style);
        let inner = block.inner(area);
        block.render(area, buf);

        let [filter_area, list_area] =
            Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(inner);
        Line::from(vec![
            Span::styled("Filter: ", Style::default().add_modifier(Modifier::DIM)),
            Span::raw(self.menu.filter_text()),
        ])
        .render(filter_area, buf);

        let mut items: Vec<ListItem<'_>> = self
            .menu
            .commands()
            .iter()
            .map(|entry| ListItem::new(entry.label()))
            .collect();
        let view_entries = self.menu.view_entries();
        if !view_entries.is_empty() {
            items.push(ListItem::new(Line::styled(
                "View",
                Style::default().add_modifier(Modifier::BOLD),
            )));
        }
        items.extend(view_entries.iter().map(|entry| {
            let mark = match entry {
                MenuEntry::Column { visible: true, .. } => "[x] ",
                _ => "[ ] ",
            };
            ListItem::new(format!("{mark}{}", entry.label()))
        }));

        // The "View" caption is not selectable and shifts the toggles down by one.
        let commands = self.menu.commands().len();
        let selected = self.menu.selected();
        let row = if selected >= commands && !view_entries.is_empty() {
            selected + 1
        } else {
            selected
        };
        let mut list_state = ListState::default().with_selected(Some(row));
        StatefulWidget::render(
            List::new(items).highlight_style(self.highlight_style),
            list_area,
            buf,
            &mut list_state,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::snapshot::{Row as DataRow, Snapshot};

    fn model(rows: usize) -> TableModel<usize> {
        let mut snapshot = Snapshot::new(["name", "location"]);
        for idx in 0..rows {
            snapshot.push(
                DataRow::new(idx)
                    .with("name", format!("node-{idx}"))
                    .with("location", if idx % 2 == 0 { "GLO" } else { "CH" }),
            );
        }
        TableModel::with_snapshot(ModelConfig::default(), snapshot)
    }

    fn lines(buf: &Buffer) -> Vec<String> {
        let area = buf.area;
        (area.y..area.bottom())
            .map(|y| (area.x..area.right()).map(|x| buf[(x, y)].symbol()).collect())
            .collect()
    }

    #[test]
    fn render_smoke_with_scrollbar() {
        let model = model(12);
        let mut view = TreeView::default();
        view.bind(&model);
        view.state_mut().select_last();

        let area = Rect::new(0, 0, 30, 6);
        let mut buffer = Buffer::empty(area);
        TreeTable::new(&model, TreeTableStyle::default()).render(area, &mut buffer, &mut view);

        let text = lines(&buffer).join("\n");
        assert!(text.contains("node-9"), "{text}");
        assert!(view.state().list_state().offset() > 0);
    }

    #[test]
    fn header_shows_grouping_and_hides_columns() {
        let mut model = model(3);
        let mut view = TreeView::default();
        view.bind(&model);
        view.group_by(&mut model, "location").unwrap();
        view.set_column_filter(&mut model, "location", "GLO").unwrap();

        let area = Rect::new(0, 0, 40, 5);
        let mut buffer = Buffer::empty(area);
        let style = TreeTableStyle {
            virtualize_rows: true,
            ..TreeTableStyle::default()
        };
        TreeTable::new(&model, style).render(area, &mut buffer, &mut view);
        let text = lines(&buffer).join("\n");
        assert!(text.contains("location > name"), "{text}");
        assert!(text.contains("GLO"), "{text}");
        assert!(!text.contains("CH"), "{text}");

        view.set_column_hidden(&model, 1, true).unwrap();
        let mut buffer = Buffer::empty(area);
        TreeTable::new(&model, TreeTableStyle::default()).render(area, &mut buffer, &mut view);
        assert!(!lines(&buffer).join("\n").contains('≡'));
    }

    #[test]
    fn unbound_view_renders_only_the_frame() {
        let model = model(2);
        let mut view = TreeView::default();
        let area = Rect::new(0, 0, 20, 4);
        let mut buffer = Buffer::empty(area);
        TreeTable::new(&model, TreeTableStyle::default()).render(area, &mut buffer, &mut view);
        assert!(!lines(&buffer).join("\n").contains("node-0"));
    }

    #[test]
    fn header_menu_marks_hidden_columns() {
        let model = model(2);
        let mut view = TreeView::default();
        view.bind(&model);
        view.set_column_hidden(&model, 1, true).unwrap();
        let mut menu = view.header_menu(&model, 0).unwrap();
        menu.push_char('n');

        let area = Rect::new(0, 0, 30, 10);
        let mut buffer = Buffer::empty(area);
        HeaderMenuView::new(&menu).render(area, &mut buffer);
        let text = lines(&buffer).join("\n");
        assert!(text.contains("Filter: n"), "{text}");
        assert!(text.contains("Group by column"), "{text}");
        assert!(text.contains("[ ] location"), "{text}");
    }
}
