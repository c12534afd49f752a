/// Command issued from a column header menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuAction {
    /// Replace the column's filter text (empty clears it).
    Filter { column: String, text: String },
    /// Append the column to the grouping.
    GroupBy(String),
    /// Clear the grouping entirely.
    Ungroup,
    ClearColumnFilter(String),
    ClearAllFilters,
    /// Flip visibility of a column by section index.
    ToggleColumn(usize),
}

/// One selectable line of the menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MenuEntry {
    Command { label: &'static str, action: MenuAction },
    /// Entry of the "View" submenu.
    Column { section: usize, label: String, visible: bool },
}

impl MenuEntry {
    pub fn label(&self) -> &str {
        match self {
            Self::Command { label, .. } => *label,
            Self::Column { label, .. } => label.as_str(),
        }
    }

    pub fn action(&self) -> MenuAction {
        match self {
            Self::Command { action, .. } => action.clone(),
            Self::Column { section, .. } => MenuAction::ToggleColumn(*section),
        }
    }
}

/// Context menu for one column header.
///
/// The first line is a filter box seeded with the column's current filter;
/// every edit yields a [`MenuAction::Filter`] so the view can filter live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderMenu {
    section: usize,
    column: String,
    filter_text: String,
    commands: Vec<MenuEntry>,
    view_entries: Vec<MenuEntry>,
    selected: usize,
}

impl HeaderMenu {
    pub(crate) fn new(
        section: usize,
        column: String,
        filter_text: String,
        view_entries: Vec<MenuEntry>,
    ) -> Self {
        let commands = vec![
            MenuEntry::Command {
                label: "Group by column",
                action: MenuAction::GroupBy(column.clone()),
            },
            MenuEntry::Command {
                label: "Ungroup",
                action: MenuAction::Ungroup,
            },
            MenuEntry::Command {
                label: "Clear column filter",
                action: MenuAction::ClearColumnFilter(column.clone()),
            },
            MenuEntry::Command {
                label: "Clear all filters",
                action: MenuAction::ClearAllFilters,
            },
        ];
        Self {
            section,
            column,
            filter_text,
            commands,
            view_entries,
            selected: 0,
        }
    }

    #[inline]
    pub const fn section(&self) -> usize {
        self.section
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn commands(&self) -> &[MenuEntry] {
        &self.commands
    }

    /// Visibility toggles for columns `1..n`.
    pub fn view_entries(&self) -> &[MenuEntry] {
        &self.view_entries
    }

    /// Commands followed by view entries, in display order.
    pub fn entries(&self) -> impl Iterator<Item = &MenuEntry> {
        self.commands.iter().chain(&self.view_entries)
    }

    pub fn len(&self) -> usize {
        self.commands.len() + self.view_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub const fn selected(&self) -> usize {
        self.selected
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.len() {
            self.selected += 1;
        }
    }

    pub const fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn selected_entry(&self) -> Option<&MenuEntry> {
        self.entries().nth(self.selected)
    }

    /// Action of the highlighted entry.
    pub fn activate(&self) -> Option<MenuAction> {
        self.selected_entry().map(MenuEntry::action)
    }

    /// Types into the filter box.
    pub fn push_char(&mut self, ch: char) -> MenuAction {
        self.filter_text.push(ch);
        self.filter_action()
    }

    /// Deletes the last character of the filter box.
    pub fn pop_char(&mut self) -> MenuAction {
        self.filter_text.pop();
        self.filter_action()
    }

    pub fn set_filter_text(&mut self, text: impl Into<String>) -> MenuAction {
        self.filter_text = text.into();
        self.filter_action()
    }

    fn filter_action(&self) -> MenuAction {
        MenuAction::Filter {
            column: self.column.clone(),
            text: self.filter_text.clone(),
        }
    }

    /// Reflects a visibility toggle without rebuilding the menu.
    pub fn mark_visible(&mut self, section: usize, visible: bool) {
        for entry in &mut self.view_entries {
            if let MenuEntry::Column {
                section: s,
                visible: v,
                ..
            } = entry
                && *s == section
            {
                *v = visible;
            }
        }
    }
}
