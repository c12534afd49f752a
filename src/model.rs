use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::{FxBuildHasher, FxHashSet};

use crate::config::ModelConfig;
use crate::decor::DecorationTable;
#[cfg(feature = "edit")]
use crate::edit::{EditRoute, EditTarget};
use crate::error::{ModelError, QueryError};
use crate::events::{SnapshotSource, Subscription};
use crate::item::{ItemId, ItemKind, ItemTree, Path, PathSegment, push_group_keys};
use crate::query::Predicate;
use crate::role::{Font, ItemData, ItemRole};
use crate::snapshot::{Row, Snapshot};
use crate::value::CellValue;

/// Minimal tree contract required by the navigation state.
///
/// A proper tree is expected (not a DAG):
/// - no cycles (DFS traversal is used directly);
/// - each node has exactly one parent;
/// - the root itself is never displayed, only its descendants.
pub trait TreeModel {
    /// Node identifier type.
    type Id: Copy + Eq + Hash;

    /// Returns the (hidden) root node, or `None` if the tree is empty.
    fn root(&self) -> Option<Self::Id>;
    /// Returns the node's children in a deterministic order.
    fn children(&self, id: Self::Id) -> &[Self::Id];
    /// Returns `true` if the node exists in the model.
    fn contains(&self, id: Self::Id) -> bool;
    /// Returns an approximate size hint (not required to be exact).
    fn size_hint(&self) -> usize {
        0
    }
}

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`TableModel`], used by views to reject
/// operations against a model they are not bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelId(u64);

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Position of an item as seen by a view: rank among siblings plus column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelIndex {
    pub row: usize,
    pub column: usize,
    pub item: ItemId,
}

/// Notifications fired by a [`TableModel`].
#[derive(Clone, Debug, PartialEq)]
pub enum ModelEvent {
    /// The whole tree was rebuilt; previously handed out ids are stale.
    Reset,
    /// The grouping changed (column names, outermost first).
    Grouped(Vec<String>),
    /// A filter was applied; `active` is `false` when no filter is set.
    Filtered { active: bool },
    /// A filter failed to evaluate; the previous tree is still shown.
    FilterFailed(QueryError),
}

/// Handle returned by [`TableModel::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ModelEvent)>;

/// Several state changes applied with a single rebuild.
pub struct ModelChanges<R> {
    snapshot: Option<Snapshot<R>>,
    columns: Option<Vec<String>>,
    grouping: Option<Vec<String>>,
    sort: Option<(String, SortOrder)>,
    filter: Option<Option<Predicate>>,
}

impl<R> Default for ModelChanges<R> {
    fn default() -> Self {
        Self {
            snapshot: None,
            columns: None,
            grouping: None,
            sort: None,
            filter: None,
        }
    }
}

impl<R> ModelChanges<R> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(mut self, snapshot: Snapshot<R>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Replaces the column order instead of accumulating it.
    #[must_use]
    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    #[must_use]
    pub fn grouping(mut self, grouping: Vec<String>) -> Self {
        self.grouping = Some(grouping);
        self
    }

    #[must_use]
    pub fn sort(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((column.into(), order));
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Option<Predicate>) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Flat snapshot + grouping/filter/sort → tree of display items.
///
/// Every mutation rebuilds the whole tree and fires [`ModelEvent::Reset`];
/// there is no incremental diffing.
pub struct TableModel<R> {
    id: ModelId,
    config: ModelConfig,
    snapshot: Snapshot<R>,
    columns: Vec<String>,
    grouping: Vec<String>,
    sort_column: Option<String>,
    sort_order: SortOrder,
    filter: Option<Predicate>,
    filtered_columns: FxHashSet<String>,
    tree: ItemTree,
    generation: u64,
    decorations: DecorationTable<R>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl<R> Default for TableModel<R> {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}

impl<R> TableModel<R> {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            id: ModelId(NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed)),
            config,
            snapshot: Snapshot::default(),
            columns: Vec::new(),
            grouping: Vec::new(),
            sort_column: None,
            sort_order: SortOrder::Ascending,
            filter: None,
            filtered_columns: FxHashSet::with_capacity_and_hasher(4, FxBuildHasher),
            tree: ItemTree::default(),
            generation: 0,
            decorations: DecorationTable::default(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Creates a model and immediately loads a snapshot.
    pub fn with_snapshot(config: ModelConfig, snapshot: Snapshot<R>) -> Self {
        let mut model = Self::new(config);
        model.set_snapshot(snapshot);
        model
    }

    #[must_use]
    pub fn with_decorations(mut self, decorations: DecorationTable<R>) -> Self {
        self.decorations = decorations;
        self
    }

    #[inline]
    pub const fn id(&self) -> ModelId {
        self.id
    }

    #[inline]
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }

    #[inline]
    pub const fn snapshot(&self) -> &Snapshot<R> {
        &self.snapshot
    }

    #[inline]
    pub const fn tree(&self) -> &ItemTree {
        &self.tree
    }

    /// Display column order (accumulated across snapshots).
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|col| col == column)
    }

    #[inline]
    pub fn grouping(&self) -> &[String] {
        &self.grouping
    }

    #[inline]
    pub const fn filter(&self) -> Option<&Predicate> {
        self.filter.as_ref()
    }

    /// Effective sort column: the explicit one, else the first column.
    pub fn sort_column(&self) -> Option<&str> {
        self.sort_column
            .as_deref()
            .or_else(|| self.columns.first().map(String::as_str))
    }

    #[inline]
    pub const fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    /// Counter bumped on every reset.
    #[inline]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Registers a listener for [`ModelEvent`]s.
    pub fn subscribe(&mut self, listener: impl FnMut(&ModelEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener; returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: &ModelEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    /// Replaces the snapshot. Unknown columns are appended to the column order.
    pub fn set_snapshot(&mut self, snapshot: Snapshot<R>) {
        self.accumulate_columns(snapshot.columns());
        self.snapshot = snapshot;
        self.rebuild_current();
    }

    /// Pulls a fresh snapshot when `subscription` has a pending change.
    pub fn refresh_from<S, Src>(&mut self, subscription: &Subscription<S>, source: &Src) -> bool
    where
        Src: SnapshotSource<R, S>,
    {
        if !subscription.take_pending() {
            return false;
        }
        self.set_snapshot(source.snapshot(subscription.subject()));
        true
    }

    fn accumulate_columns(&mut self, columns: &[String]) {
        for column in columns {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
    }

    /// Sets or clears the filter.
    ///
    /// On evaluation failure the previous filter and tree stay in place,
    /// [`ModelEvent::FilterFailed`] fires and the error is returned.
    pub fn set_filter(&mut self, filter: Option<Predicate>) -> Result<(), ModelError> {
        match self.build_tree(filter.as_ref()) {
            Ok(tree) => {
                let active = filter.is_some();
                self.filter = filter;
                self.install(tree);
                self.emit(&ModelEvent::Filtered { active });
                Ok(())
            }
            Err(err) => {
                tracing::info!(target: "tui_treetable::model", error = %err, "filter rejected");
                self.emit(&ModelEvent::FilterFailed(err.clone()));
                Err(ModelError::Query(err))
            }
        }
    }

    /// Columns the view currently filters on (reported through [`header_data`](Self::header_data)).
    pub fn set_filtered_columns<I, S>(&mut self, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filtered_columns = columns.into_iter().map(Into::into).collect();
    }

    pub fn is_column_filtered(&self, column: &str) -> bool {
        self.filtered_columns.contains(column)
    }

    /// Changes the sort; returns `false` (no rebuild) when unchanged or unknown.
    pub fn set_sort(&mut self, column: &str, order: SortOrder) -> bool {
        if self.column_index(column).is_none() {
            return false;
        }
        if self.sort_column() == Some(column) && self.sort_order == order {
            return false;
        }
        self.sort_column = Some(column.to_string());
        self.sort_order = order;
        self.rebuild_current();
        true
    }

    /// Appends a grouping level.
    pub fn group(&mut self, column: &str) -> Result<(), ModelError> {
        if self.column_index(column).is_none() {
            return Err(ModelError::UnknownColumn(column.to_string()));
        }
        self.grouping.push(column.to_string());
        self.rebuild_current();
        let grouping = self.grouping.clone();
        self.emit(&ModelEvent::Grouped(grouping));
        Ok(())
    }

    /// Clears all grouping levels.
    pub fn ungroup(&mut self) {
        self.grouping.clear();
        self.rebuild_current();
        self.emit(&ModelEvent::Grouped(Vec::new()));
    }

    /// Applies several changes with a single rebuild.
    ///
    /// Grouping columns must exist after the column update, otherwise nothing
    /// is changed. Replacing the columns drops grouping levels and the sort
    /// on columns that are gone. A failing filter leaves the rest of the
    /// changes applied and the model unfiltered.
    pub fn apply(&mut self, changes: ModelChanges<R>) -> Result<(), ModelError> {
        let ModelChanges {
            snapshot,
            columns,
            grouping,
            sort,
            filter,
        } = changes;

        let replaced = columns.is_some();
        let mut next_columns = columns.unwrap_or_else(|| self.columns.clone());
        if let Some(snapshot) = &snapshot {
            for column in snapshot.columns() {
                if !next_columns.contains(column) {
                    next_columns.push(column.clone());
                }
            }
        }
        if let Some(grouping) = &grouping
            && let Some(missing) = grouping.iter().find(|col| !next_columns.contains(col))
        {
            return Err(ModelError::UnknownColumn(missing.clone()));
        }

        self.columns = next_columns;
        if let Some(snapshot) = snapshot {
            self.snapshot = snapshot;
        }
        if replaced {
            self.prune_dropped_columns();
        }
        let grouping_changed = grouping.is_some();
        if let Some(grouping) = grouping {
            self.grouping = grouping;
        }
        if let Some((column, order)) = sort {
            if self.column_index(&column).is_some() {
                self.sort_column = Some(column);
                self.sort_order = order;
            } else {
                tracing::warn!(target: "tui_treetable::model", %column, "ignoring sort on unknown column");
            }
        }

        let mut result = Ok(());
        let filter_changed = filter.is_some();
        if let Some(filter) = filter {
            if let Some(pred) = &filter
                && let Err(err) = pred.validate(&self.columns)
            {
                tracing::info!(target: "tui_treetable::model", error = %err, "filter rejected");
                self.emit(&ModelEvent::FilterFailed(err.clone()));
                self.filter = None;
                result = Err(ModelError::Query(err));
            } else {
                self.filter = filter;
            }
        }

        self.rebuild_current();
        if grouping_changed {
            let grouping = self.grouping.clone();
            self.emit(&ModelEvent::Grouped(grouping));
        }
        if filter_changed && result.is_ok() {
            let active = self.filter.is_some();
            self.emit(&ModelEvent::Filtered { active });
        }
        result
    }

    /// Forgets grouping levels and the sort column the column list no longer has.
    fn prune_dropped_columns(&mut self) {
        let columns = &self.columns;
        self.grouping.retain(|column| {
            let known = columns.contains(column);
            if !known {
                tracing::warn!(target: "tui_treetable::model", %column, "dropping grouping on removed column");
            }
            known
        });
        if let Some(column) = self.sort_column.take_if(|column| !columns.contains(column)) {
            tracing::warn!(target: "tui_treetable::model", %column, "dropping sort on removed column");
        }
    }

    fn rebuild_current(&mut self) {
        let filter = self.filter.take();
        match self.build_tree(filter.as_ref()) {
            Ok(tree) => {
                self.filter = filter;
                self.install(tree);
            }
            Err(err) => {
                // Columns only accumulate, so a filter that was valid stays valid
                // unless the column order was replaced wholesale.
                tracing::warn!(target: "tui_treetable::model", error = %err, "dropping stale filter");
                self.emit(&ModelEvent::FilterFailed(err));
                if let Ok(tree) = self.build_tree(None) {
                    self.install(tree);
                }
            }
        }
    }

    fn install(&mut self, tree: ItemTree) {
        tracing::debug!(
            target: "tui_treetable::model",
            rows = self.snapshot.len(),
            leaves = tree.leaf_count(),
            branches = tree.branch_count(),
            "model reset"
        );
        self.tree = tree;
        self.generation += 1;
        self.emit(&ModelEvent::Reset);
    }

    /// filter → stable sort → group.
    fn build_tree(&self, filter: Option<&Predicate>) -> Result<ItemTree, QueryError> {
        let rows = self.snapshot.rows();
        let mut order: Vec<usize> = match filter {
            Some(pred) => {
                pred.validate(&self.columns)?;
                let mut kept = Vec::with_capacity(rows.len());
                for (idx, row) in rows.iter().enumerate() {
                    if pred.evaluate(row, &self.columns)? {
                        kept.push(idx);
                    }
                }
                kept
            }
            None => (0..rows.len()).collect(),
        };

        if let Some(column) = self.sort_column() {
            let folded = self.config.sort_case_insensitive;
            let descending = self.sort_order == SortOrder::Descending;
            order.sort_by(|&a, &b| {
                let (left, right) = (rows[a].get(column), rows[b].get(column));
                let ord = if folded {
                    left.total_cmp_folded(right)
                } else {
                    left.total_cmp(right)
                };
                if descending { ord.reverse() } else { ord }
            });
        }

        let mut tree = ItemTree::with_capacity(order.len());
        if self.grouping.is_empty() {
            for idx in order {
                tree.push_leaf(idx);
            }
        } else {
            let mut groups = Path::new();
            for idx in order {
                groups.clear();
                for column in &self.grouping {
                    push_group_keys(&mut groups, rows[idx].get(column));
                }
                tree.put(&groups, idx);
            }
        }
        Ok(tree)
    }

    fn resolve_parent(&self, parent: Option<ItemId>) -> ItemId {
        parent.unwrap_or_else(|| self.tree.root())
    }

    /// Resolves `(row, column, parent)` to an index; `None` parent means the root.
    pub fn index(&self, row: usize, column: usize, parent: Option<ItemId>) -> Option<ModelIndex> {
        if column >= self.columns.len() {
            return None;
        }
        let item = self.tree.child(self.resolve_parent(parent), row)?;
        Some(ModelIndex { row, column, item })
    }

    /// Parent of an item; `None` for top-level items.
    pub fn parent(&self, item: ItemId) -> Option<ItemId> {
        self.tree.parent(item).filter(|parent| *parent != self.tree.root())
    }

    #[inline]
    pub fn rank(&self, item: ItemId) -> usize {
        self.tree.rank(item)
    }

    pub fn row_count(&self, parent: Option<ItemId>) -> usize {
        self.tree.child_count(self.resolve_parent(parent))
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn has_children(&self, item: ItemId) -> bool {
        self.tree.has_children(item)
    }

    pub fn path(&self, item: ItemId) -> Path {
        self.tree.path(item)
    }

    /// Resolves a stored path to a live item (column 0); `None` if it no longer exists.
    pub fn index_from_path(&self, path: &[PathSegment]) -> Option<ModelIndex> {
        if path.is_empty() {
            return None;
        }
        let item = self.tree.locate(path)?;
        Some(ModelIndex {
            row: self.tree.rank(item),
            column: 0,
            item,
        })
    }

    /// Snapshot row behind a leaf item.
    pub fn row_of(&self, item: ItemId) -> Option<&Row<R>> {
        self.tree.leaf_row(item).and_then(|idx| self.snapshot.row(idx))
    }

    /// Cell data for an item, column and presentation aspect.
    pub fn data(&self, item: ItemId, column: usize, role: ItemRole) -> ItemData<'_> {
        let Some(name) = self.columns.get(column) else {
            return ItemData::None;
        };
        match self.tree.kind(item) {
            ItemKind::Branch { key } => match role {
                ItemRole::Display if column == 0 => ItemData::Label(key.label()),
                ItemRole::Font if column == 0 => ItemData::Font(Font::Bold),
                _ => ItemData::None,
            },
            ItemKind::Leaf { row } => {
                let Some(row) = self.snapshot.row(*row) else {
                    return ItemData::None;
                };
                match role {
                    ItemRole::Display => ItemData::Value(row.get(name)),
                    ItemRole::Decoration => self
                        .decorations
                        .lookup(row, name)
                        .and_then(|decoration| decoration.glyph)
                        .map_or(ItemData::None, ItemData::Glyph),
                    ItemRole::Font => ItemData::Font(
                        self.decorations
                            .lookup(row, name)
                            .map_or(Font::Regular, |decoration| decoration.font),
                    ),
                }
            }
        }
    }

    /// Header title, font and decoration for a column.
    pub fn header_data(&self, section: usize, role: ItemRole) -> ItemData<'_> {
        let Some(name) = self.columns.get(section) else {
            return ItemData::None;
        };
        let filtered = self.filtered_columns.contains(name);
        match role {
            ItemRole::Display if section == 0 && !self.grouping.is_empty() => {
                let mut parts: Vec<&str> = self.grouping.iter().map(String::as_str).collect();
                parts.push(name);
                ItemData::Label(parts.join(self.config.group_separator))
            }
            ItemRole::Display => ItemData::Label(name.clone()),
            ItemRole::Font if filtered => ItemData::Font(Font::Underline),
            ItemRole::Decoration if filtered => ItemData::Glyph(self.config.filter_glyph),
            _ => ItemData::None,
        }
    }

    /// Back-references of the given leaf items; branches are skipped.
    pub fn references<'a>(&'a self, items: &'a [ItemId]) -> impl Iterator<Item = &'a R> + 'a {
        items
            .iter()
            .filter_map(|item| self.row_of(*item).map(Row::reference))
    }

    /// Drag payload: `key_column` values of the given leaves, skipping branches and nulls.
    pub fn drag_payload(&self, items: &[ItemId], key_column: &str) -> Vec<CellValue> {
        items
            .iter()
            .filter_map(|item| self.row_of(*item))
            .map(|row| row.get(key_column))
            .filter(|value| !value.is_null())
            .cloned()
            .collect()
    }

    /// Forwards an inline edit to `target` without touching the snapshot.
    ///
    /// Whitelisted fields go to [`EditTarget::update_field`] with the row's
    /// reference; everything else goes to [`EditTarget::update_entity`] keyed by
    /// the entity owning that reference.
    #[cfg(feature = "edit")]
    pub fn set_data<T>(
        &self,
        item: ItemId,
        column: usize,
        value: CellValue,
        target: &mut T,
    ) -> Result<EditRoute, ModelError>
    where
        T: EditTarget<R>,
    {
        let name = self
            .columns
            .get(column)
            .ok_or_else(|| ModelError::UnknownColumn(format!("#{column}")))?;
        if self.config.locked_columns.contains(name) {
            return Err(ModelError::NotEditable(name.clone()));
        }
        let row = self.row_of(item).ok_or(ModelError::NotALeaf)?;
        let field = self.config.field_name(name);

        let route = if self.config.editable_fields.contains(field) {
            target.update_field(row.reference(), field, value);
            EditRoute::Field(field.to_string())
        } else {
            let entity = target.owning_entity(row.reference());
            target.update_entity(entity, field, value);
            EditRoute::Entity(field.to_string())
        };
        tracing::debug!(target: "tui_treetable::model", column = %name, ?route, "edit forwarded");
        Ok(route)
    }
}

impl<R> TreeModel for TableModel<R> {
    type Id = ItemId;

    fn root(&self) -> Option<Self::Id> {
        Some(self.tree.root())
    }

    fn children(&self, id: Self::Id) -> &[Self::Id] {
        self.tree.children(id)
    }

    fn contains(&self, id: Self::Id) -> bool {
        self.tree.contains(id)
    }

    fn size_hint(&self) -> usize {
        self.tree.len()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::events::ChangeBus;

    fn names(model: &TableModel<u32>) -> Vec<String> {
        model
            .tree()
            .leaves()
            .into_iter()
            .map(|leaf| model.row_of(leaf).unwrap().get("name").to_string())
            .collect()
    }

    fn snapshot() -> Snapshot<u32> {
        let rows = [
            ("a1", "steel", 2.0, "GLO"),
            ("a2", "steel", 1.0, "RER"),
            ("b1", "copper", 1.0, "GLO"),
            ("b2", "copper", 3.0, "CH"),
            ("c1", "water", 1.0, "GLO"),
        ];
        let mut snapshot = Snapshot::new(["name", "product", "amount", "location"]);
        for (idx, (name, product, amount, location)) in rows.into_iter().enumerate() {
            snapshot.push(
                Row::new(u32::try_from(idx).unwrap())
                    .with("name", name)
                    .with("product", product)
                    .with("amount", amount)
                    .with("location", location),
            );
        }
        snapshot
    }

    #[test]
    fn filter_contains_keeps_original_order() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        model
            .set_filter(Some(Predicate::contains("name", "a", true)))
            .unwrap();
        assert_eq!(names(&model), ["a1", "a2"]);
    }

    #[test]
    fn grouping_places_every_row_at_its_value_path() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        model.group("product").unwrap();
        model.group("location").unwrap();

        let tree = model.tree();
        assert_eq!(tree.leaf_count(), 5);
        for leaf in tree.leaves() {
            let row_idx = tree.leaf_row(leaf).unwrap();
            let row = &model.snapshot().rows()[row_idx];
            let expected = [
                PathSegment::from_value(row.get("product")),
                PathSegment::from_value(row.get("location")),
                PathSegment::Row(row_idx),
            ];
            assert_eq!(model.path(leaf).as_slice(), &expected);
        }
    }

    #[test]
    fn branches_follow_post_sort_order() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        model.set_sort("amount", SortOrder::Descending);
        model.group("product").unwrap();
        let labels: Vec<String> = model
            .tree()
            .children(model.tree().root())
            .iter()
            .map(|id| model.data(*id, 0, ItemRole::Display).text().into_owned())
            .collect();
        // copper (3.0) first, then steel (2.0), then water.
        assert_eq!(labels, ["copper", "steel", "water"]);
    }

    #[test]
    fn sort_is_stable_for_ties() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        assert!(model.set_sort("amount", SortOrder::Ascending));
        assert_eq!(names(&model), ["a2", "b1", "c1", "a1", "b2"]);
        assert!(model.set_sort("amount", SortOrder::Descending));
        assert_eq!(names(&model), ["b2", "a1", "a2", "b1", "c1"]);
    }

    #[test]
    fn set_sort_is_noop_when_unchanged() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        let generation = model.generation();
        assert!(!model.set_sort("name", SortOrder::Ascending));
        assert!(!model.set_sort("missing", SortOrder::Descending));
        assert_eq!(model.generation(), generation);
    }

    #[test]
    fn set_snapshot_twice_is_idempotent() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        model.group("location").unwrap();
        let first = model.tree().leaf_paths();
        model.set_snapshot(snapshot());
        assert_eq!(model.tree().leaf_paths(), first);
    }

    #[test]
    fn columns_accumulate_across_snapshots() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        let mut next = Snapshot::new(["unit", "name"]);
        next.push(Row::new(9).with("name", "z").with("unit", "kg"));
        model.set_snapshot(next);
        assert_eq!(model.columns(), ["name", "product", "amount", "location", "unit"]);
    }

    #[test]
    fn failing_filter_keeps_previous_tree() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        model
            .set_filter(Some(Predicate::contains("name", "b", true)))
            .unwrap();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        model.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        let err = model
            .set_filter(Some(Predicate::parse("unit == 'kg'").unwrap()))
            .unwrap_err();
        assert!(matches!(err, ModelError::Query(QueryError::UnknownColumn(_))));
        assert_eq!(names(&model), ["b1", "b2"]);
        assert!(model.filter().is_some());
        assert!(matches!(events.borrow()[0], ModelEvent::FilterFailed(_)));

        model.set_filter(None).unwrap();
        assert_eq!(
            events.borrow().last(),
            Some(&ModelEvent::Filtered { active: false })
        );
    }

    #[test]
    fn group_emits_grouping_and_rejects_unknown_columns() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let listener = model.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        model.group("product").unwrap();
        assert_eq!(
            events.borrow().as_slice(),
            &[ModelEvent::Reset, ModelEvent::Grouped(vec!["product".to_string()])]
        );
        assert_eq!(
            model.group("nope"),
            Err(ModelError::UnknownColumn("nope".to_string()))
        );

        assert!(model.unsubscribe(listener));
        model.ungroup();
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn index_parent_and_rank_are_consistent() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        model.group("product").unwrap();
        assert_eq!(model.row_count(None), 3);

        let steel = model.index(0, 0, None).unwrap();
        assert_eq!(model.parent(steel.item), None);
        assert_eq!(model.row_count(Some(steel.item)), 2);

        let child = model.index(1, 2, Some(steel.item)).unwrap();
        assert_eq!(model.parent(child.item), Some(steel.item));
        assert_eq!(model.rank(child.item), 1);
        assert!(!model.has_children(child.item));
        assert!(model.index(0, 9, None).is_none());
        assert!(model.index(7, 0, None).is_none());
    }

    #[test]
    fn index_from_path_misses_are_silent() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        model.group("product").unwrap();
        let copper = [PathSegment::Text("copper".to_string())];
        let found = model.index_from_path(&copper).unwrap();
        assert_eq!(found.row, 1);
        assert_eq!(found.column, 0);

        model.ungroup();
        assert!(model.index_from_path(&copper).is_none());
        assert!(model.index_from_path(&[]).is_none());
    }

    #[test]
    fn list_and_missing_values_group_consistently() {
        let mut snapshot: Snapshot<u32> = Snapshot::new(["name", "categories"]);
        snapshot.push(Row::new(0).with("name", "co2").with("categories", vec!["air", "urban"]));
        snapshot.push(Row::new(1).with("name", "ore"));
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot);
        model.group("categories").unwrap();

        let air = [
            PathSegment::Text("air".to_string()),
            PathSegment::Text("urban".to_string()),
            PathSegment::Row(0),
        ];
        assert!(model.index_from_path(&air).is_some());
        assert!(model.index_from_path(&[PathSegment::Null, PathSegment::Row(1)]).is_some());
    }

    #[test]
    fn header_joins_grouping_and_flags_filters() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        model.group("product").unwrap();
        model.group("location").unwrap();
        model.set_filtered_columns(["amount"]);

        assert_eq!(
            model.header_data(0, ItemRole::Display).text(),
            "product > location > name"
        );
        assert_eq!(model.header_data(2, ItemRole::Font), ItemData::Font(Font::Underline));
        assert_eq!(model.header_data(2, ItemRole::Decoration).glyph(), Some("≡"));
        assert!(model.header_data(1, ItemRole::Font).is_none());
    }

    #[test]
    fn branch_cells_are_empty_beyond_label() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        model.group("product").unwrap();
        let branch = model.index(0, 0, None).unwrap().item;
        assert_eq!(model.data(branch, 0, ItemRole::Display).text(), "steel");
        assert!(model.data(branch, 1, ItemRole::Display).is_none());
        assert!(model.data(branch, 0, ItemRole::Decoration).is_none());
    }

    #[test]
    fn drag_payload_skips_nulls_and_branches() {
        let mut snapshot: Snapshot<u32> = Snapshot::new(["name", "key"]);
        snapshot.push(Row::new(0).with("name", "a").with("key", "db|a"));
        snapshot.push(Row::new(1).with("name", "b"));
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot);
        let leaves = model.tree().leaves();
        assert_eq!(model.drag_payload(&leaves, "key"), vec![CellValue::from("db|a")]);

        model.group("name").unwrap();
        let branches = model.tree().children(model.tree().root()).to_vec();
        assert!(model.drag_payload(&branches, "key").is_empty());
        let leaves = model.tree().leaves();
        let refs: Vec<u32> = model.references(&leaves).copied().collect();
        assert_eq!(refs, [0, 1]);
    }

    #[test]
    fn refresh_from_pulls_snapshot_on_notification() {
        let bus = ChangeBus::new();
        let subscription = bus.subscribe("ecoinvent".to_string());
        let mut model: TableModel<u32> = TableModel::default();
        let source = |_: &String| snapshot();

        assert!(!model.refresh_from(&subscription, &source));
        bus.notify(&"ecoinvent".to_string());
        assert!(model.refresh_from(&subscription, &source));
        assert_eq!(model.tree().leaf_count(), 5);
    }

    #[test]
    fn apply_rebuilds_once() {
        let mut model: TableModel<u32> = TableModel::default();
        let resets = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&resets);
        model.subscribe(move |event| {
            if *event == ModelEvent::Reset {
                *counter.borrow_mut() += 1;
            }
        });
        model
            .apply(
                ModelChanges::new()
                    .snapshot(snapshot())
                    .grouping(vec!["location".to_string()])
                    .sort("amount", SortOrder::Descending)
                    .filter(Some(Predicate::contains("name", "1", true))),
            )
            .unwrap();
        assert_eq!(*resets.borrow(), 1);
        assert_eq!(model.tree().leaf_count(), 3);
        assert_eq!(model.sort_column(), Some("amount"));
    }

    #[test]
    fn rejected_batch_leaves_snapshot_and_tree_untouched() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        let generation = model.generation();
        let replacement = Snapshot::new(["z"]).with_row(Row::new(9).with("z", "z"));

        let err = model
            .apply(
                ModelChanges::new()
                    .snapshot(replacement)
                    .grouping(vec!["missing".to_string()]),
            )
            .unwrap_err();
        assert_eq!(err, ModelError::UnknownColumn("missing".to_string()));
        assert_eq!(model.snapshot().len(), 5);
        assert_eq!(model.columns(), ["name", "product", "amount", "location"]);
        assert_eq!(model.generation(), generation);
        assert_eq!(names(&model), ["a1", "a2", "b1", "b2", "c1"]);
    }

    #[test]
    fn replacing_columns_drops_grouping_and_sort_on_removed_ones() {
        let mut model = TableModel::with_snapshot(ModelConfig::default(), snapshot());
        model.group("location").unwrap();
        assert!(model.set_sort("amount", SortOrder::Descending));

        let narrow = Snapshot::new(["name"]).with_row(Row::new(9).with("name", "z"));
        model
            .apply(
                ModelChanges::new()
                    .columns(vec!["name".to_string()])
                    .snapshot(narrow),
            )
            .unwrap();
        assert!(model.grouping().is_empty());
        assert_eq!(model.sort_column(), Some("name"));
        assert_eq!(model.header_data(0, ItemRole::Display).text(), "name");
        assert_eq!(names(&model), ["z"]);
    }

    #[cfg(feature = "edit")]
    mod edits {
        use super::*;

        #[derive(Default)]
        struct Store {
            fields: Vec<(u32, String, CellValue)>,
            entities: Vec<(u32, String, CellValue)>,
        }

        impl EditTarget<u32> for Store {
            type EntityKey = u32;

            fn owning_entity(&self, reference: &u32) -> u32 {
                reference + 100
            }

            fn update_field(&mut self, reference: &u32, field: &str, value: CellValue) {
                self.fields.push((*reference, field.to_string(), value));
            }

            fn update_entity(&mut self, entity: u32, field: &str, value: CellValue) {
                self.entities.push((entity, field.to_string(), value));
            }
        }

        fn exchange_model() -> TableModel<u32> {
            let mut snapshot = Snapshot::new(["Amount", "Activity", "Allocation factor"]);
            snapshot.push(Row::new(7).with("Amount", 1.0).with("Activity", "steel"));
            TableModel::with_snapshot(
                ModelConfig::default().lock_column("Allocation factor"),
                snapshot,
            )
        }

        #[test]
        fn whitelisted_fields_update_the_row_reference() {
            let model = exchange_model();
            let leaf = model.tree().leaves()[0];
            let mut store = Store::default();
            let route = model.set_data(leaf, 0, CellValue::Float(2.5), &mut store).unwrap();
            assert_eq!(route, EditRoute::Field("amount".to_string()));
            assert_eq!(store.fields, [(7, "amount".to_string(), CellValue::Float(2.5))]);
            assert!(store.entities.is_empty());
            // The model waits for a change notification instead of patching itself.
            assert_eq!(model.snapshot().rows()[0].get("Amount"), &CellValue::Float(1.0));
        }

        #[test]
        fn other_fields_update_the_owning_entity() {
            let model = exchange_model();
            let leaf = model.tree().leaves()[0];
            let mut store = Store::default();
            let route = model.set_data(leaf, 1, "iron".into(), &mut store).unwrap();
            assert_eq!(route, EditRoute::Entity("name".to_string()));
            assert_eq!(store.entities, [(107, "name".to_string(), CellValue::from("iron"))]);
        }

        #[test]
        fn branches_and_locked_columns_are_rejected() {
            let mut model = exchange_model();
            let leaf = model.tree().leaves()[0];
            let mut store = Store::default();
            assert_eq!(
                model.set_data(leaf, 2, CellValue::Null, &mut store),
                Err(ModelError::NotEditable("Allocation factor".to_string()))
            );
            model.group("Activity").unwrap();
            let branch = model.tree().children(model.tree().root())[0];
            assert_eq!(
                model.set_data(branch, 0, CellValue::Null, &mut store),
                Err(ModelError::NotALeaf)
            );
        }
    }
}
