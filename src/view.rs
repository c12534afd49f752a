//! Presentation state bound to one [`TableModel`].
//!
//! [`TreeView`] owns everything the model does not: which groups are open,
//! which columns are hidden, the per-column filter texts and the quick search.
//! Expansion is remembered by [`Path`] so it survives model resets; after every
//! reset the remembered paths are resolved again and stale ones are dropped.

use std::collections::BTreeMap;
use std::hash::Hash;

use rustc_hash::{FxBuildHasher, FxHashSet};

use crate::action::{TreeAction, TreeEvent};
use crate::config::ViewConfig;
use crate::error::{ModelError, QueryError, ViewError};
use crate::item::{ItemId, Path, PathSegment};
use crate::menu::{HeaderMenu, MenuAction, MenuEntry};
use crate::model::{ModelChanges, ModelId, SortOrder, TableModel};
use crate::query::Predicate;
use crate::settings::{HeaderGeometry, SettingsStore, ViewState};
use crate::snapshot::Snapshot;
use crate::state::TreeViewState;
use crate::value::CellValue;

#[cfg(feature = "keymap")]
use crossterm::event::KeyEvent;

/// Outcome of the last filter application, for search-box highlighting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterStatus {
    #[default]
    Ok,
    /// The query did not parse or evaluate; the previous rows are still shown.
    Failed,
}

/// View over a [`TableModel`]: expansion, visibility, filters and navigation.
pub struct TreeView {
    config: ViewConfig,
    bound: Option<ModelId>,
    generation: Option<u64>,
    state: TreeViewState<ItemId>,
    expanded_paths: Vec<Path>,
    column_filters: BTreeMap<String, String>,
    all_filter: String,
    hidden: FxHashSet<String>,
    header: HeaderGeometry,
    filter_status: FilterStatus,
    last_error: Option<QueryError>,
}

impl Default for TreeView {
    fn default() -> Self {
        Self::new(ViewConfig::default())
    }
}

impl TreeView {
    pub fn new(config: ViewConfig) -> Self {
        Self {
            config,
            bound: None,
            generation: None,
            state: TreeViewState::new(),
            expanded_paths: Vec::new(),
            column_filters: BTreeMap::new(),
            all_filter: String::new(),
            hidden: FxHashSet::with_capacity_and_hasher(4, FxBuildHasher),
            header: HeaderGeometry::default(),
            filter_status: FilterStatus::Ok,
            last_error: None,
        }
    }

    #[inline]
    pub const fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Binds the view to `model`; later calls with another model are rejected.
    pub fn bind<R>(&mut self, model: &TableModel<R>) {
        if self.bound != Some(model.id()) {
            tracing::debug!(target: "tui_treetable::view", model = ?model.id(), "view bound");
        }
        self.bound = Some(model.id());
        self.generation = None;
        self.sync_inner(model);
    }

    #[inline]
    pub const fn bound_model(&self) -> Option<ModelId> {
        self.bound
    }

    fn check<R>(&self, model: &TableModel<R>) -> Result<(), ViewError> {
        match self.bound {
            None => Err(ViewError::Unbound),
            Some(id) if id != model.id() => Err(ViewError::ModelMismatch),
            Some(_) => Ok(()),
        }
    }

    /// Catches up with model resets; returns `true` if a reset was observed.
    pub fn sync<R>(&mut self, model: &TableModel<R>) -> Result<bool, ViewError> {
        self.check(model)?;
        Ok(self.sync_inner(model))
    }

    fn sync_inner<R>(&mut self, model: &TableModel<R>) -> bool {
        let reset = self.generation != Some(model.generation());
        if reset {
            let before = self.expanded_paths.len();
            let mut ids = Vec::with_capacity(before);
            self.expanded_paths
                .retain(|path| match model.index_from_path(path) {
                    Some(index) if model.has_children(index.item) => {
                        ids.push(index.item);
                        true
                    }
                    _ => false,
                });
            let dropped = before - self.expanded_paths.len();
            if dropped > 0 {
                tracing::debug!(target: "tui_treetable::view", dropped, "expanded paths no longer resolve");
            }
            self.state.replace_expanded(ids);
            self.generation = Some(model.generation());
        }
        self.state.ensure_visible_nodes(model);
        reset
    }

    /// Rewrites remembered paths from the navigation state's expanded ids.
    fn record_expansion<R>(&mut self, model: &TableModel<R>) {
        let state = &self.state;
        let mut covered = FxHashSet::default();
        self.expanded_paths
            .retain(|path| match model.index_from_path(path) {
                Some(index) if state.is_expanded(index.item) => {
                    covered.insert(index.item);
                    true
                }
                _ => false,
            });
        let mut fresh: Vec<ItemId> = state.expanded_ids().filter(|id| !covered.contains(id)).collect();
        fresh.sort_unstable();
        self.expanded_paths
            .extend(fresh.into_iter().map(|id| model.path(id)));
    }

    pub const fn state(&self) -> &TreeViewState<ItemId> {
        &self.state
    }

    pub const fn state_mut(&mut self) -> &mut TreeViewState<ItemId> {
        &mut self.state
    }

    pub fn expanded_paths(&self) -> &[Path] {
        &self.expanded_paths
    }

    #[inline]
    pub fn is_expanded(&self, item: ItemId) -> bool {
        self.state.is_expanded(item)
    }

    pub fn expand<R>(&mut self, model: &TableModel<R>, item: ItemId) -> Result<(), ViewError> {
        self.set_expanded(model, item, true)
    }

    pub fn collapse<R>(&mut self, model: &TableModel<R>, item: ItemId) -> Result<(), ViewError> {
        self.set_expanded(model, item, false)
    }

    pub fn toggle<R>(&mut self, model: &TableModel<R>, item: ItemId) -> Result<(), ViewError> {
        let expand = !self.state.is_expanded(item);
        self.set_expanded(model, item, expand)
    }

    fn set_expanded<R>(&mut self, model: &TableModel<R>, item: ItemId, expand: bool) -> Result<(), ViewError> {
        self.check(model)?;
        self.sync_inner(model);
        if !model.has_children(item) {
            return Ok(());
        }
        self.state.set_expanded(item, expand);
        let path = model.path(item);
        if expand {
            if !self.expanded_paths.contains(&path) {
                self.expanded_paths.push(path);
            }
        } else {
            self.expanded_paths.retain(|p| *p != path);
        }
        Ok(())
    }

    // Filters.

    #[inline]
    pub const fn filter_status(&self) -> FilterStatus {
        self.filter_status
    }

    /// Why the last filter failed, if it did.
    pub const fn last_filter_error(&self) -> Option<&QueryError> {
        self.last_error.as_ref()
    }

    pub fn column_filters(&self) -> &BTreeMap<String, String> {
        &self.column_filters
    }

    pub fn column_filter(&self, column: &str) -> Option<&str> {
        self.column_filters.get(column).map(String::as_str)
    }

    pub fn all_filter(&self) -> &str {
        &self.all_filter
    }

    /// Sets the substring filter of one column; empty text removes it.
    pub fn set_column_filter<R>(
        &mut self,
        model: &mut TableModel<R>,
        column: &str,
        text: &str,
    ) -> Result<FilterStatus, ViewError> {
        self.check(model)?;
        if model.column_index(column).is_none() {
            return Err(ModelError::UnknownColumn(column.to_string()).into());
        }
        if text.is_empty() {
            self.column_filters.remove(column);
        } else {
            self.column_filters.insert(column.to_string(), text.to_string());
        }
        self.apply_filter(model)
    }

    pub fn clear_column_filter<R>(&mut self, model: &mut TableModel<R>, column: &str) -> Result<FilterStatus, ViewError> {
        self.set_column_filter(model, column, "")
    }

    pub fn clear_all_filters<R>(&mut self, model: &mut TableModel<R>) -> Result<FilterStatus, ViewError> {
        self.check(model)?;
        self.column_filters.clear();
        self.apply_filter(model)
    }

    /// Quick search across visible columns, or a raw query after the marker.
    pub fn set_all_filter<R>(&mut self, model: &mut TableModel<R>, text: &str) -> Result<FilterStatus, ViewError> {
        self.check(model)?;
        self.all_filter = text.to_string();
        self.apply_filter(model)
    }

    /// Combines column filters and the quick search into one predicate.
    ///
    /// Filters on columns the model no longer has are pruned first. `None`
    /// means nothing filters.
    pub fn build_query<R>(&mut self, model: &TableModel<R>) -> Result<Option<Predicate>, QueryError> {
        let columns = model.columns();
        self.column_filters.retain(|column, _| {
            let keep = columns.contains(column);
            if !keep {
                tracing::debug!(target: "tui_treetable::view", column, "pruning filter on dropped column");
            }
            keep
        });
        compose_query(
            &self.config,
            &self.column_filters,
            &self.all_filter,
            columns,
            &self.hidden,
        )
    }

    fn apply_filter<R>(&mut self, model: &mut TableModel<R>) -> Result<FilterStatus, ViewError> {
        let query = self.build_query(model);
        // Header marks follow the stored filter texts even when the query fails.
        model.set_filtered_columns(self.column_filters.keys().cloned());
        let result = match query {
            Ok(query) => {
                if let Some(query) = &query {
                    tracing::debug!(target: "tui_treetable::query", %query, "built query");
                }
                model.set_filter(query)
            }
            Err(err) => {
                tracing::info!(target: "tui_treetable::query", error = %err, "query error");
                Err(ModelError::Query(err))
            }
        };
        self.record_filter_result(result)?;
        self.sync_inner(model);
        Ok(self.filter_status)
    }

    /// Query failures become [`FilterStatus::Failed`]; anything else propagates.
    fn record_filter_result(&mut self, result: Result<(), ModelError>) -> Result<(), ModelError> {
        match result {
            Ok(()) => {
                self.filter_status = FilterStatus::Ok;
                self.last_error = None;
                Ok(())
            }
            Err(ModelError::Query(err)) => {
                self.filter_status = FilterStatus::Failed;
                self.last_error = Some(err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    // Grouping and sorting.

    pub fn group_by<R>(&mut self, model: &mut TableModel<R>, column: &str) -> Result<(), ViewError> {
        self.check(model)?;
        model.group(column)?;
        self.sync_inner(model);
        Ok(())
    }

    pub fn ungroup<R>(&mut self, model: &mut TableModel<R>) -> Result<(), ViewError> {
        self.check(model)?;
        model.ungroup();
        self.sync_inner(model);
        Ok(())
    }

    /// Sorts by `column`; returns `false` when nothing changed.
    pub fn sort_by<R>(&mut self, model: &mut TableModel<R>, column: &str, order: SortOrder) -> Result<bool, ViewError> {
        self.check(model)?;
        let changed = model.set_sort(column, order);
        self.sync_inner(model);
        Ok(changed)
    }

    // Column visibility (view only, never forwarded to the model).

    /// Hides or shows a column; the first column always stays visible.
    pub fn set_column_hidden<R>(
        &mut self,
        model: &TableModel<R>,
        section: usize,
        hidden: bool,
    ) -> Result<bool, ViewError> {
        self.check(model)?;
        if section == 0 {
            return Ok(false);
        }
        let name = model
            .columns()
            .get(section)
            .ok_or_else(|| ModelError::UnknownColumn(format!("#{section}")))?;
        let changed = if hidden {
            self.hidden.insert(name.clone())
        } else {
            self.hidden.remove(name)
        };
        Ok(changed)
    }

    pub fn is_column_hidden<R>(&self, model: &TableModel<R>, section: usize) -> bool {
        model
            .columns()
            .get(section)
            .is_some_and(|name| self.hidden.contains(name))
    }

    /// Sections currently shown, in model order.
    pub fn visible_columns<R>(&self, model: &TableModel<R>) -> Vec<usize> {
        (0..model.column_count())
            .filter(|section| !self.is_column_hidden(model, *section))
            .collect()
    }

    // Header geometry.

    pub const fn header_geometry(&self) -> &HeaderGeometry {
        &self.header
    }

    pub fn set_column_width(&mut self, section: usize, width: u16) {
        self.header.set_width(section, width);
    }

    /// Section under the column cursor.
    pub fn selected_section(&self) -> usize {
        self.state.selected_column().unwrap_or(0)
    }

    // Header menu.

    pub fn header_menu<R>(&self, model: &TableModel<R>, section: usize) -> Result<HeaderMenu, ViewError> {
        self.check(model)?;
        let column = model
            .columns()
            .get(section)
            .ok_or_else(|| ModelError::UnknownColumn(format!("#{section}")))?
            .clone();
        let filter_text = self.column_filters.get(&column).cloned().unwrap_or_default();
        let view_entries = model
            .columns()
            .iter()
            .enumerate()
            .skip(1)
            .map(|(section, label)| MenuEntry::Column {
                section,
                label: label.clone(),
                visible: !self.hidden.contains(label),
            })
            .collect();
        Ok(HeaderMenu::new(section, column, filter_text, view_entries))
    }

    pub fn apply_menu_action<R>(
        &mut self,
        model: &mut TableModel<R>,
        action: MenuAction,
    ) -> Result<FilterStatus, ViewError> {
        match action {
            MenuAction::Filter { column, text } => self.set_column_filter(model, &column, &text),
            MenuAction::GroupBy(column) => {
                self.group_by(model, &column)?;
                Ok(self.filter_status)
            }
            MenuAction::Ungroup => {
                self.ungroup(model)?;
                Ok(self.filter_status)
            }
            MenuAction::ClearColumnFilter(column) => self.clear_column_filter(model, &column),
            MenuAction::ClearAllFilters => self.clear_all_filters(model),
            MenuAction::ToggleColumn(section) => {
                let hidden = !self.is_column_hidden(model, section);
                self.set_column_hidden(model, section, hidden)?;
                Ok(self.filter_status)
            }
        }
    }

    // Persistence.

    pub fn save_state<R>(&mut self, model: &TableModel<R>) -> Result<ViewState, ViewError> {
        self.check(model)?;
        self.sync_inner(model);
        let columns = model.columns().to_vec();
        Ok(ViewState {
            visible_columns: columns
                .iter()
                .filter(|column| !self.hidden.contains(*column))
                .cloned()
                .collect(),
            grouped_columns: model.grouping().to_vec(),
            filters: self.column_filters.clone(),
            sort_column: model.sort_column().map(str::to_string),
            sort_ascending: model.sort_order() == SortOrder::Ascending,
            expanded_paths: self.expanded_paths.iter().map(|path| path.to_vec()).collect(),
            header_state: self.header.encode(),
            columns,
        })
    }

    /// Restores a saved state against a fresh snapshot with a single rebuild.
    ///
    /// Columns merge as saved order followed by new snapshot columns, minus
    /// saved columns the snapshot no longer has. Filters, grouping and sort on
    /// dropped columns are discarded.
    pub fn restore_state<R>(
        &mut self,
        model: &mut TableModel<R>,
        state: ViewState,
        snapshot: Snapshot<R>,
    ) -> Result<FilterStatus, ViewError> {
        self.check(model)?;
        let columns = merge_columns(&state.columns, snapshot.columns());
        let ViewState {
            columns: saved_columns,
            grouped_columns,
            visible_columns,
            filters,
            sort_column,
            sort_ascending,
            expanded_paths,
            header_state,
        } = state;

        self.column_filters = filters
            .into_iter()
            .filter(|(column, _)| keep_known(&columns, column, "filter"))
            .collect();
        let grouping: Vec<String> = grouped_columns
            .into_iter()
            .filter(|column| keep_known(&columns, column, "grouping"))
            .collect();
        // Columns new since the save stay visible.
        self.hidden = if visible_columns.is_empty() {
            FxHashSet::default()
        } else {
            columns
                .iter()
                .skip(1)
                .filter(|column| saved_columns.contains(*column) && !visible_columns.contains(*column))
                .cloned()
                .collect()
        };
        self.expanded_paths = expanded_paths.into_iter().map(Path::from_vec).collect();
        self.header = HeaderGeometry::decode_or_default(&header_state);
        self.all_filter.clear();

        let order = if sort_ascending {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        };
        let sort_column = sort_column
            .filter(|column| keep_known(&columns, column, "sort"))
            .or_else(|| columns.first().cloned());

        let query = compose_query(
            &self.config,
            &self.column_filters,
            &self.all_filter,
            &columns,
            &self.hidden,
        );
        let mut changes = ModelChanges::new()
            .columns(columns)
            .snapshot(snapshot)
            .grouping(grouping);
        if let Some(column) = sort_column {
            changes = changes.sort(column, order);
        }
        model.set_filtered_columns(self.column_filters.keys().cloned());
        let result = match query {
            Ok(query) => model.apply(changes.filter(query)),
            Err(err) => {
                tracing::info!(target: "tui_treetable::query", error = %err, "query error");
                model.apply(changes.filter(None))?;
                Err(ModelError::Query(err))
            }
        };
        self.record_filter_result(result)?;

        self.generation = None;
        self.sync_inner(model);
        Ok(self.filter_status)
    }

    /// Saves the current state under `section/subject`.
    pub fn save_to<R, S: SettingsStore>(
        &mut self,
        model: &TableModel<R>,
        store: &mut S,
        section: &str,
        subject: &str,
    ) -> Result<(), ViewError> {
        let state = self.save_state(model)?;
        store.save(section, subject, state);
        Ok(())
    }

    /// Restores `section/subject`, or the all-visible default if nothing was saved.
    pub fn load_from<R, S: SettingsStore>(
        &mut self,
        model: &mut TableModel<R>,
        store: &S,
        section: &str,
        subject: &str,
        snapshot: Snapshot<R>,
    ) -> Result<FilterStatus, ViewError> {
        let state = store
            .load(section, subject)
            .unwrap_or_else(|| ViewState::default_for(snapshot.columns()));
        self.restore_state(model, state, snapshot)
    }

    // Selection.

    #[inline]
    pub fn selected_item(&self) -> Option<ItemId> {
        self.state.selected_id()
    }

    /// Opens the ancestors of the item at `path` and selects it.
    ///
    /// Returns `false` when the path does not resolve in the current tree.
    pub fn select_path<R>(&mut self, model: &TableModel<R>, path: &[PathSegment]) -> Result<bool, ViewError> {
        self.check(model)?;
        self.sync_inner(model);
        let Some(index) = model.index_from_path(path) else {
            return Ok(false);
        };
        let found = self.state.select_by_id(model, index.item);
        self.record_expansion(model);
        Ok(found)
    }

    /// Leaves covered by the selection: the selected leaf, or every leaf
    /// below a selected group.
    pub fn selected_items<R>(&self, model: &TableModel<R>) -> Result<Vec<ItemId>, ViewError> {
        self.check(model)?;
        if self.generation != Some(model.generation()) {
            return Ok(Vec::new());
        }
        let Some(selected) = self.state.selected_id() else {
            return Ok(Vec::new());
        };
        let tree = model.tree();
        let mut leaves = Vec::new();
        let mut stack = vec![selected];
        while let Some(id) = stack.pop() {
            if tree.is_leaf(id) {
                leaves.push(id);
            } else {
                stack.extend(tree.children(id).iter().rev().copied());
            }
        }
        Ok(leaves)
    }

    /// Deduplicated back-references of the selected leaves.
    pub fn selected_references<'m, R: Eq + Hash>(
        &self,
        model: &'m TableModel<R>,
    ) -> Result<Vec<&'m R>, ViewError> {
        let items = self.selected_items(model)?;
        let mut seen = FxHashSet::with_capacity_and_hasher(items.len(), FxBuildHasher);
        Ok(items
            .iter()
            .filter_map(|item| model.row_of(*item))
            .map(|row| row.reference())
            .filter(|reference| seen.insert(*reference))
            .collect())
    }

    /// Drag payload built from `key_column` of the selected leaves.
    pub fn drag_payload<R>(&self, model: &TableModel<R>, key_column: &str) -> Result<Vec<CellValue>, ViewError> {
        let items = self.selected_items(model)?;
        Ok(model.drag_payload(&items, key_column))
    }

    /// Activates the selection: toggles a group, reports a leaf as
    /// `TreeEvent::Action(TreeAction::Open)`.
    pub fn activate<R>(&mut self, model: &TableModel<R>) -> Result<TreeEvent, ViewError> {
        self.handle_action(model, TreeAction::Open)
    }

    // Actions.

    pub fn handle_action<R, C>(
        &mut self,
        model: &TableModel<R>,
        action: TreeAction<C>,
    ) -> Result<TreeEvent<C>, ViewError> {
        self.check(model)?;
        self.sync_inner(model);
        let event = match action {
            TreeAction::SelectPrevColumn => self.step_column(model, false),
            TreeAction::SelectNextColumn => self.step_column(model, true),
            other => self.state.handle_action(model, other),
        };
        self.record_expansion(model);
        Ok(event)
    }

    fn step_column<R, C>(&mut self, model: &TableModel<R>, forward: bool) -> TreeEvent<C> {
        let visible = self.visible_columns(model);
        if visible.is_empty() {
            return TreeEvent::Unhandled;
        }
        let current = self.selected_section();
        let pos = visible.iter().position(|s| *s == current).unwrap_or(0);
        let next = if forward {
            (pos + 1).min(visible.len() - 1)
        } else {
            pos.saturating_sub(1)
        };
        self.state.select_column(Some(visible[next]));
        TreeEvent::Handled
    }

    #[cfg(feature = "keymap")]
    pub fn handle_key<R>(&mut self, model: &TableModel<R>, key: KeyEvent) -> Result<TreeEvent, ViewError> {
        let Some(action) = self.state.keymap().resolve(key) else {
            return Ok(TreeEvent::Unhandled);
        };
        self.handle_action(model, action)
    }

    #[cfg(feature = "keymap")]
    pub fn handle_key_with<R, C, F>(
        &mut self,
        model: &TableModel<R>,
        key: KeyEvent,
        custom: F,
    ) -> Result<TreeEvent<C>, ViewError>
    where
        F: Fn(KeyEvent) -> Option<C>,
    {
        let Some(action) = self.state.keymap().resolve_with(key, custom) else {
            return Ok(TreeEvent::Unhandled);
        };
        self.handle_action(model, action)
    }
}

fn keep_known(columns: &[String], column: &str, what: &'static str) -> bool {
    let known = columns.iter().any(|c| c == column);
    if !known {
        tracing::warn!(target: "tui_treetable::view", column, what, "saved state refers to unknown column");
    }
    known
}

/// `saved ++ (snapshot - saved)`, keeping only columns the snapshot has.
fn merge_columns(saved: &[String], snapshot: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(saved.len() + snapshot.len());
    for column in saved.iter().chain(snapshot) {
        if snapshot.contains(column) && !merged.contains(column) {
            merged.push(column.clone());
        }
    }
    merged
}

fn compose_query(
    config: &ViewConfig,
    column_filters: &BTreeMap<String, String>,
    all_filter: &str,
    columns: &[String],
    hidden: &FxHashSet<String>,
) -> Result<Option<Predicate>, QueryError> {
    let mut parts: Vec<Predicate> = column_filters
        .iter()
        .map(|(column, text)| {
            Predicate::contains(column.as_str(), text.as_str(), config.column_filter_case_sensitive)
        })
        .collect();

    if let Some(raw) = all_filter.strip_prefix(config.raw_query_marker) {
        if !raw.trim().is_empty() {
            parts.push(Predicate::parse(raw)?);
        }
    } else if !all_filter.is_empty() {
        parts.push(Predicate::or(
            columns
                .iter()
                .filter(|column| !hidden.contains(*column))
                .map(|column| {
                    Predicate::contains(column.as_str(), all_filter, config.quick_search_case_sensitive)
                }),
        ));
    }

    let query = Predicate::and(parts);
    Ok((query != Predicate::True).then_some(query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::settings::MemorySettings;
    use crate::snapshot::Row;

    fn snapshot() -> Snapshot<u32> {
        let rows = [
            ("a1", "Steel", 2.0, "GLO"),
            ("a2", "Steel", 1.0, "RER"),
            ("b1", "copper", 1.0, "GLO"),
            ("b2", "copper", 3.0, "CH"),
            ("c1", "water", 1.0, "GLO"),
        ];
        let mut snapshot = Snapshot::new(["name", "product", "amount", "location"]);
        for (idx, (name, product, amount, location)) in rows.into_iter().enumerate() {
            snapshot.push(
                Row::new(u32::try_from(idx).unwrap() % 4)
                    .with("name", name)
                    .with("product", product)
                    .with("amount", amount)
                    .with("location", location),
            );
        }
        snapshot
    }

    fn setup() -> (TableModel<u32>, TreeView) {
        let model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        let mut view = TreeView::default();
        view.bind(&model);
        (model, view)
    }

    fn visible_names(model: &TableModel<u32>, view: &TreeView) -> Vec<String> {
        view.state()
            .visible_nodes()
            .iter()
            .map(|node| model.data(node.id(), 0, crate::ItemRole::Display).text().into_owned())
            .collect()
    }

    fn text(value: &str) -> PathSegment {
        PathSegment::Text(value.to_string())
    }

    #[test]
    fn rejects_foreign_and_missing_models() {
        let (mut model, _) = setup();
        let mut other = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        let mut view = TreeView::default();
        assert_eq!(view.group_by(&mut model, "product"), Err(ViewError::Unbound));

        view.bind(&model);
        assert_eq!(view.bound_model(), Some(model.id()));
        assert_eq!(view.group_by(&mut other, "product"), Err(ViewError::ModelMismatch));
        assert_eq!(view.sync(&other), Err(ViewError::ModelMismatch));
        assert!(other.grouping().is_empty());
    }

    #[test]
    fn select_path_opens_ancestors_and_remembers_them() {
        let (mut model, mut view) = setup();
        view.group_by(&mut model, "product").unwrap();
        view.group_by(&mut model, "location").unwrap();

        assert!(view.select_path(&model, &[text("Steel"), text("RER")]).unwrap());
        let rer = model.index_from_path(&[text("Steel"), text("RER")]).unwrap().item;
        assert_eq!(view.selected_item(), Some(rer));
        assert_eq!(view.expanded_paths(), &[Path::from_vec(vec![text("Steel")])]);

        assert!(!view.select_path(&model, &[text("Steel"), text("CH")]).unwrap());
    }

    #[test]
    fn expansion_survives_rebuilds_that_keep_the_path() {
        let (mut model, mut view) = setup();
        view.group_by(&mut model, "product").unwrap();
        let steel = model.index_from_path(&[text("Steel")]).unwrap().item;
        view.expand(&model, steel).unwrap();
        assert_eq!(view.expanded_paths(), &[Path::from_vec(vec![text("Steel")])]);

        view.sort_by(&mut model, "amount", SortOrder::Descending).unwrap();
        view.set_column_filter(&mut model, "location", "R").unwrap();
        let steel = model.index_from_path(&[text("Steel")]).unwrap().item;
        assert!(view.is_expanded(steel));
        assert_eq!(visible_names(&model, &view), ["Steel", "a2"]);

        view.collapse(&model, steel).unwrap();
        assert!(view.expanded_paths().is_empty());
        view.expand(&model, steel).unwrap();

        view.ungroup(&mut model).unwrap();
        view.group_by(&mut model, "location").unwrap();
        assert!(view.expanded_paths().is_empty());
    }

    #[test]
    fn column_filter_is_case_sensitive_quick_search_is_not() {
        let (mut model, mut view) = setup();
        view.set_column_filter(&mut model, "product", "steel").unwrap();
        assert_eq!(view.column_filter("product"), Some("steel"));
        assert!(model.is_column_filtered("product"));
        assert_eq!(model.tree().leaf_count(), 0);
        assert_eq!(model.header_data(1, crate::ItemRole::Font), crate::ItemData::Font(crate::Font::Underline));

        view.clear_all_filters(&mut model).unwrap();
        assert_eq!(view.set_all_filter(&mut model, "steel").unwrap(), FilterStatus::Ok);
        assert_eq!(visible_names(&model, &view), ["a1", "a2"]);
        assert!(model.header_data(1, crate::ItemRole::Font).is_none());
    }

    #[test]
    fn quick_search_skips_hidden_columns() {
        let (mut model, mut view) = setup();
        assert!(view.set_column_hidden(&model, 1, true).unwrap());
        view.set_all_filter(&mut model, "steel").unwrap();
        assert_eq!(model.tree().leaf_count(), 0);
        assert!(!view.set_column_hidden(&model, 0, true).unwrap());
        assert_eq!(view.visible_columns(&model), [0, 2, 3]);
    }

    #[test]
    fn raw_query_failure_keeps_rows_and_flags_status() {
        let (mut model, mut view) = setup();
        assert_eq!(view.set_all_filter(&mut model, "=amount > 1").unwrap(), FilterStatus::Ok);
        assert_eq!(visible_names(&model, &view), ["a1", "b2"]);

        assert_eq!(view.set_all_filter(&mut model, "=amount >").unwrap(), FilterStatus::Failed);
        assert!(matches!(view.last_filter_error(), Some(QueryError::UnexpectedEnd { .. })));
        assert_eq!(visible_names(&model, &view), ["a1", "b2"]);

        assert_eq!(view.set_all_filter(&mut model, "=unit == 'kg'").unwrap(), FilterStatus::Failed);
        assert_eq!(visible_names(&model, &view), ["a1", "b2"]);

        assert_eq!(view.set_all_filter(&mut model, "").unwrap(), FilterStatus::Ok);
        assert_eq!(view.filter_status(), FilterStatus::Ok);
        assert_eq!(model.tree().leaf_count(), 5);
    }

    #[test]
    fn column_filter_marks_header_while_raw_query_is_broken() {
        let (mut model, mut view) = setup();
        view.set_all_filter(&mut model, "=amount >").unwrap();
        assert_eq!(
            view.set_column_filter(&mut model, "location", "GLO").unwrap(),
            FilterStatus::Failed
        );
        assert_eq!(view.column_filter("location"), Some("GLO"));
        assert!(model.is_column_filtered("location"));
        assert_eq!(model.header_data(3, crate::ItemRole::Font), crate::ItemData::Font(crate::Font::Underline));
    }

    #[test]
    fn build_query_prunes_filters_on_dropped_columns() {
        let (mut model, mut view) = setup();
        view.set_column_filter(&mut model, "location", "GLO").unwrap();
        view.set_column_filter(&mut model, "name", "1").unwrap();

        let mut reduced: Snapshot<u32> = Snapshot::new(["name"]);
        reduced.push(Row::new(0).with("name", "a1"));
        model
            .apply(ModelChanges::new().columns(vec!["name".to_string()]).snapshot(reduced))
            .unwrap();

        let query = view.build_query(&model).unwrap().unwrap();
        assert_eq!(query, Predicate::contains("name", "1", true));
        assert_eq!(view.column_filters().len(), 1);
    }

    #[test]
    fn header_menu_reflects_view_state() {
        let (mut model, mut view) = setup();
        view.set_column_filter(&mut model, "product", "copper").unwrap();
        view.set_column_hidden(&model, 3, true).unwrap();

        let menu = view.header_menu(&model, 1).unwrap();
        assert_eq!(menu.filter_text(), "copper");
        let toggles: Vec<(usize, bool)> = menu
            .view_entries()
            .iter()
            .map(|entry| match entry {
                MenuEntry::Column { section, visible, .. } => (*section, *visible),
                MenuEntry::Command { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(toggles, [(1, true), (2, true), (3, false)]);

        view.apply_menu_action(&mut model, MenuAction::GroupBy("location".to_string()))
            .unwrap();
        assert_eq!(model.grouping(), ["location"]);
        view.apply_menu_action(&mut model, MenuAction::ToggleColumn(3)).unwrap();
        assert!(!view.is_column_hidden(&model, 3));
        view.apply_menu_action(&mut model, MenuAction::ClearColumnFilter("product".to_string()))
            .unwrap();
        assert!(view.column_filters().is_empty());
        view.apply_menu_action(&mut model, MenuAction::Ungroup).unwrap();
        assert!(model.grouping().is_empty());
    }

    #[test]
    fn view_state_round_trip() {
        let (mut model, mut view) = setup();
        view.group_by(&mut model, "location").unwrap();
        view.set_column_filter(&mut model, "name", "1").unwrap();
        view.sort_by(&mut model, "amount", SortOrder::Descending).unwrap();
        view.set_column_hidden(&model, 2, true).unwrap();
        view.set_column_width(0, 24);
        let glo = model.index_from_path(&[text("GLO")]).unwrap().item;
        view.expand(&model, glo).unwrap();
        let saved = view.save_state(&model).unwrap();

        let mut restored_model: TableModel<u32> = TableModel::default();
        let mut restored = TreeView::default();
        restored.bind(&restored_model);
        restored
            .restore_state(&mut restored_model, saved.clone(), snapshot())
            .unwrap();

        assert_eq!(restored.save_state(&restored_model).unwrap(), saved);
        assert_eq!(visible_names(&restored_model, &restored), visible_names(&model, &view));
        assert_eq!(restored.header_geometry().width(0), Some(24));
    }

    #[test]
    fn restore_merges_drifted_columns() {
        let mut model: TableModel<u32> = TableModel::default();
        let mut view = TreeView::default();
        view.bind(&model);

        let mut state = ViewState::default_for(&["A", "B", "C"]);
        state.filters.insert("A".to_string(), "x".to_string());
        state.grouped_columns = vec!["A".to_string(), "C".to_string()];
        let mut next: Snapshot<u32> = Snapshot::new(["B", "C", "D"]);
        next.push(Row::new(0).with("B", "b").with("C", "c").with("D", "d"));

        assert_eq!(view.restore_state(&mut model, state, next).unwrap(), FilterStatus::Ok);
        assert_eq!(model.columns(), ["B", "C", "D"]);
        assert_eq!(model.grouping(), ["C"]);
        assert!(view.column_filters().is_empty());
        assert!(!view.is_column_hidden(&model, 2));
        assert!(model.filter().is_none());
    }

    #[test]
    fn restore_applies_filter_before_first_reset() {
        let mut model: TableModel<u32> = TableModel::default();
        let mut view = TreeView::default();
        view.bind(&model);
        let resets = std::rc::Rc::new(std::cell::Cell::new(0));
        let sink = std::rc::Rc::clone(&resets);
        model.subscribe(move |event| {
            if *event == crate::ModelEvent::Reset {
                sink.set(sink.get() + 1);
            }
        });

        let mut state = ViewState::default_for(&["name", "product", "amount", "location"]);
        state.filters.insert("name".to_string(), "a".to_string());
        view.restore_state(&mut model, state, snapshot()).unwrap();

        assert_eq!(resets.get(), 1);
        assert_eq!(model.tree().leaf_count(), 2);
    }

    #[test]
    fn load_from_falls_back_to_defaults() {
        let mut model: TableModel<u32> = TableModel::default();
        let mut view = TreeView::default();
        view.bind(&model);
        let mut store = MemorySettings::new();

        view.load_from(&mut model, &store, "database_explorer", "db", snapshot())
            .unwrap();
        assert_eq!(view.visible_columns(&model), [0, 1, 2, 3]);

        view.set_column_hidden(&model, 1, true).unwrap();
        view.save_to(&model, &mut store, "database_explorer", "db").unwrap();
        let mut again = TreeView::default();
        again.bind(&model);
        again
            .load_from(&mut model, &store, "database_explorer", "db", snapshot())
            .unwrap();
        assert!(again.is_column_hidden(&model, 1));
    }

    #[test]
    fn selection_yields_deduplicated_references() {
        let (mut model, mut view) = setup();
        view.group_by(&mut model, "location").unwrap();
        // GLO holds rows 0, 2 and 4; references are row index % 4.
        view.state_mut().select_first();
        view.sync(&model).unwrap();
        let refs: Vec<u32> = view
            .selected_references(&model)
            .unwrap()
            .into_iter()
            .copied()
            .collect();
        assert_eq!(refs, [0, 2]);

        assert_eq!(
            view.activate(&model).unwrap(),
            TreeEvent::Handled,
            "activating a group toggles it"
        );
        view.handle_action::<_, ()>(&model, TreeAction::SelectNext).unwrap();
        assert_eq!(view.activate(&model).unwrap(), TreeEvent::Action(TreeAction::Open));
        assert_eq!(view.drag_payload(&model, "name").unwrap(), [CellValue::from("a1")]);
        assert_eq!(view.expanded_paths(), &[Path::from_vec(vec![text("GLO")])]);
    }

    #[test]
    fn column_cursor_skips_hidden_columns() {
        let (model, mut view) = setup();
        view.set_column_hidden(&model, 1, true).unwrap();
        view.handle_action::<_, ()>(&model, TreeAction::SelectNextColumn).unwrap();
        assert_eq!(view.selected_section(), 2);
        view.handle_action::<_, ()>(&model, TreeAction::SelectPrevColumn).unwrap();
        assert_eq!(view.selected_section(), 0);
    }
}
