use std::hash::Hash;

use ratatui::widgets::TableState;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::action::{TreeAction, TreeEvent};
use crate::model::TreeModel;
use crate::style::TreeScrollPolicy;

#[cfg(feature = "keymap")]
use crate::keymap::TreeKeyBindings;

/// A visible node row with metadata used for rendering and navigation.
#[derive(Clone, Debug)]
pub struct VisibleNode<Id> {
    pub(crate) id: Id,
    pub(crate) level: u16,
    pub(crate) parent: Option<Id>,
    pub(crate) has_children: bool,
    pub(crate) is_tail_stack: SmallVec<[bool; 8]>,
}

impl<Id: Copy> VisibleNode<Id> {
    #[inline]
    pub const fn id(&self) -> Id {
        self.id
    }

    #[inline]
    pub const fn level(&self) -> u16 {
        self.level
    }

    #[inline]
    pub const fn has_children(&self) -> bool {
        self.has_children
    }
}

/// Navigation state: expanded nodes, selection and the visible-row cache.
///
/// The model root is never shown; its children are the level-0 rows.
pub struct TreeViewState<Id> {
    list_state: TableState,
    expanded: FxHashSet<Id>,
    // Cached visible rows to avoid recomputing DFS every render.
    visible_nodes: Vec<VisibleNode<Id>>,
    visible_index: FxHashMap<Id, usize>,
    dirty: bool,
    draw_lines: bool,
    #[cfg(feature = "keymap")]
    keymap: TreeKeyBindings,
}

impl<Id: Copy + Eq + Hash> Default for TreeViewState<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: Copy + Eq + Hash> TreeViewState<Id> {
    /// Creates a new empty state with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a state with preallocated capacity for the given number of nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            list_state: TableState::default(),
            expanded: FxHashSet::with_capacity_and_hasher(capacity, FxBuildHasher),
            visible_nodes: Vec::with_capacity(capacity),
            visible_index: FxHashMap::with_capacity_and_hasher(capacity, FxBuildHasher),
            dirty: true,
            draw_lines: true,
            #[cfg(feature = "keymap")]
            keymap: TreeKeyBindings::new(),
        }
    }

    /// Returns the key binding set.
    #[cfg(feature = "keymap")]
    pub const fn keymap(&self) -> &TreeKeyBindings {
        &self.keymap
    }

    /// Returns a mutable reference to the key binding set.
    #[cfg(feature = "keymap")]
    pub const fn keymap_mut(&mut self) -> &mut TreeKeyBindings {
        &mut self.keymap
    }

    pub(crate) const fn list_state(&self) -> &TableState {
        &self.list_state
    }

    pub(crate) const fn list_state_mut(&mut self) -> &mut TableState {
        &mut self.list_state
    }

    /// Rows currently shown, in display order.
    pub fn visible_nodes(&self) -> &[VisibleNode<Id>] {
        &self.visible_nodes
    }

    fn visible_index_of(&self, id: Id) -> Option<usize> {
        self.visible_index.get(&id).copied()
    }

    #[inline]
    pub fn is_expanded(&self, id: Id) -> bool {
        self.expanded.contains(&id)
    }

    /// Expanded nodes, in no particular order.
    pub fn expanded_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.expanded.iter().copied()
    }

    /// Replaces the expanded set wholesale (used after a model reset).
    pub fn replace_expanded(&mut self, ids: impl IntoIterator<Item = Id>) {
        self.expanded.clear();
        self.expanded.extend(ids);
        self.dirty = true;
    }

    /// Returns whether guide lines are drawn.
    #[inline]
    pub const fn draw_lines(&self) -> bool {
        self.draw_lines
    }

    /// Enables or disables drawing of guide lines.
    pub const fn set_draw_lines(&mut self, draw: bool) {
        self.draw_lines = draw;
    }

    /// Selects the first visible row.
    pub const fn select_first(&mut self) {
        self.list_state.select_first();
    }

    /// Selects the last visible row.
    pub const fn select_last(&mut self) {
        self.list_state.select_last();
    }

    /// Moves selection to the previous visible row.
    pub fn select_prev(&mut self) {
        if self.visible_nodes.is_empty() {
            self.list_state.select(None);
            return;
        }
        let selected = self.list_state.selected().unwrap_or(0);
        self.list_state.select(Some(selected.saturating_sub(1)));
    }

    /// Moves selection to the next visible row.
    pub fn select_next(&mut self) {
        if self.visible_nodes.is_empty() {
            self.list_state.select(None);
            return;
        }
        let selected = self.list_state.selected().unwrap_or(0);
        let new_selected = (selected + 1).min(self.visible_nodes.len().saturating_sub(1));
        self.list_state.select(Some(new_selected));
    }

    /// Column under the header cursor.
    pub fn selected_column(&self) -> Option<usize> {
        self.list_state.selected_column()
    }

    pub fn select_column(&mut self, column: Option<usize>) {
        self.list_state.select_column(column);
    }

    /// Moves the column cursor by `delta` within `0..count`.
    pub fn step_column(&mut self, delta: isize, count: usize) {
        if count == 0 {
            self.list_state.select_column(None);
            return;
        }
        let current = self.list_state.selected_column().unwrap_or(0);
        let next = current.saturating_add_signed(delta).min(count - 1);
        self.list_state.select_column(Some(next));
    }

    /// Adjusts scroll offset so the selection is within the viewport.
    pub fn ensure_selection_visible(&mut self, viewport_height: usize) {
        self.clamp_selection();
        let Some(selected) = self.list_state.selected() else {
            return;
        };
        let viewport_height = viewport_height.max(1);
        let offset = self.list_state.offset();
        if selected < offset {
            *self.list_state.offset_mut() = selected;
        } else if selected >= offset + viewport_height {
            *self.list_state.offset_mut() = selected + 1 - viewport_height;
        }
    }

    /// Adjusts selection visibility according to the provided scroll policy.
    pub fn ensure_selection_visible_with_policy(
        &mut self,
        viewport_height: usize,
        policy: TreeScrollPolicy,
    ) {
        match policy {
            TreeScrollPolicy::KeepInView => self.ensure_selection_visible(viewport_height),
            TreeScrollPolicy::CenterOnSelect => {
                self.ensure_selection_visible_centered(viewport_height);
            }
        }
    }

    fn ensure_selection_visible_centered(&mut self, viewport_height: usize) {
        self.clamp_selection();
        let Some(selected) = self.list_state.selected() else {
            return;
        };
        let viewport_height = viewport_height.max(1);
        let total = self.visible_nodes.len();
        if total <= viewport_height {
            *self.list_state.offset_mut() = 0;
            return;
        }

        let half = viewport_height / 2;
        let max_offset = total.saturating_sub(viewport_height);
        *self.list_state.offset_mut() = selected.saturating_sub(half).min(max_offset);
    }

    /// Returns the id of the currently selected node, if any.
    pub fn selected_id(&self) -> Option<Id> {
        self.list_state
            .selected()
            .and_then(|idx| self.visible_nodes.get(idx).map(|node| node.id))
    }

    /// Returns the parent id of the currently selected node, if any.
    pub fn selected_parent_id(&self) -> Option<Id> {
        self.list_state
            .selected()
            .and_then(|idx| self.visible_nodes.get(idx).and_then(|node| node.parent))
    }

    /// Returns the number of visible nodes in the current view.
    pub const fn visible_len(&self) -> usize {
        self.visible_nodes.len()
    }

    /// Expands the tree to the node and selects it if present.
    pub fn select_by_id<T: TreeModel<Id = Id>>(&mut self, model: &T, id: Id) -> bool {
        let _ = self.expand_to(model, id);
        self.ensure_visible_nodes(model);
        if let Some(idx) = self.visible_index_of(id) {
            self.list_state.select(Some(idx));
            true
        } else {
            false
        }
    }

    /// Expands all ancestors of the node so it becomes visible.
    pub fn expand_to<T: TreeModel<Id = Id>>(&mut self, model: &T, id: Id) -> bool {
        let Some(path) = Self::find_path_to(model, id) else {
            return false;
        };
        // The node itself stays as it is; only its ancestors open.
        for node in &path[..path.len().saturating_sub(1)] {
            self.expanded.insert(*node);
        }
        self.dirty = true;
        true
    }

    /// Expands every node that has children.
    pub fn expand_all<T: TreeModel<Id = Id>>(&mut self, model: &T) {
        self.expanded.clear();
        let hint = model.size_hint();
        self.expanded.reserve(hint);
        if let Some(root) = model.root() {
            let mut stack: Vec<Id> = model.children(root).to_vec();
            while let Some(node) = stack.pop() {
                let children = model.children(node);
                if !children.is_empty() {
                    self.expanded.insert(node);
                    stack.extend(children.iter().copied());
                }
            }
        }
        self.dirty = true;
    }

    /// Collapses all nodes.
    pub fn collapse_all(&mut self) {
        self.expanded.clear();
        self.dirty = true;
    }

    /// Ensures the visible node list is up to date (if marked dirty).
    pub fn ensure_visible_nodes<T: TreeModel<Id = Id>>(&mut self, model: &T) {
        if !self.dirty {
            return;
        }
        self.update_visible_nodes(model);
    }

    /// Handles a tree action and returns the resulting event.
    pub fn handle_action<T: TreeModel<Id = Id>, C>(
        &mut self,
        model: &T,
        action: TreeAction<C>,
    ) -> TreeEvent<C> {
        self.ensure_visible_nodes(model);
        self.handle_action_inner(model, action)
    }

    fn handle_action_inner<T: TreeModel<Id = Id>, C>(
        &mut self,
        model: &T,
        action: TreeAction<C>,
    ) -> TreeEvent<C> {
        if matches!(
            &action,
            TreeAction::Custom(_) | TreeAction::HeaderMenu | TreeAction::QuickSearch
        ) {
            return TreeEvent::Action(action);
        }

        if self.visible_nodes.is_empty() {
            return TreeEvent::Unhandled;
        }

        match action {
            TreeAction::SelectPrev => {
                self.select_prev();
                TreeEvent::Handled
            }
            TreeAction::SelectNext => {
                self.select_next();
                TreeEvent::Handled
            }
            TreeAction::SelectParent => {
                self.select_parent();
                TreeEvent::Handled
            }
            TreeAction::SelectChild => {
                self.select_child_with_descendants(model);
                TreeEvent::Handled
            }
            TreeAction::SelectFirst => {
                self.select_first();
                TreeEvent::Handled
            }
            TreeAction::SelectLast => {
                self.select_last();
                TreeEvent::Handled
            }
            // Column bounds are known to the view, which intercepts these.
            TreeAction::SelectPrevColumn | TreeAction::SelectNextColumn => TreeEvent::Unhandled,
            TreeAction::ToggleRecursive => {
                if let Some((id, true)) = self.selected_entry() {
                    let should_expand = !self.expanded.contains(&id);
                    self.set_expanded_recursive(model, id, should_expand);
                    self.dirty = true;
                    return TreeEvent::Handled;
                }
                TreeEvent::Unhandled
            }
            TreeAction::ToggleNode => {
                if let Some((id, true)) = self.selected_entry() {
                    self.toggle(id);
                    return TreeEvent::Handled;
                }
                TreeEvent::Unhandled
            }
            TreeAction::Open => match self.selected_entry() {
                Some((id, true)) => {
                    self.toggle(id);
                    TreeEvent::Handled
                }
                Some((_, false)) => TreeEvent::Action(action),
                None => TreeEvent::Unhandled,
            },
            TreeAction::ExpandAll => {
                self.expand_all(model);
                TreeEvent::Handled
            }
            TreeAction::CollapseAll => {
                self.collapse_all();
                TreeEvent::Handled
            }
            TreeAction::ToggleGuides => {
                self.draw_lines = !self.draw_lines;
                TreeEvent::Handled
            }
            TreeAction::HeaderMenu | TreeAction::QuickSearch | TreeAction::Custom(_) => {
                TreeEvent::Action(action)
            }
        }
    }

    /// Selected id and whether it has children.
    fn selected_entry(&self) -> Option<(Id, bool)> {
        self.list_state
            .selected()
            .and_then(|idx| self.visible_nodes.get(idx))
            .map(|node| (node.id, node.has_children))
    }

    /// Toggles expansion state for the given node.
    pub fn toggle(&mut self, id: Id) {
        if !self.expanded.remove(&id) {
            self.expanded.insert(id);
        }
        self.dirty = true;
    }

    /// Sets expansion state for the given node.
    pub fn set_expanded(&mut self, id: Id, expand: bool) {
        if expand {
            self.expanded.insert(id);
        } else {
            self.expanded.remove(&id);
        }
        self.dirty = true;
    }

    fn update_visible_nodes<T: TreeModel<Id = Id>>(&mut self, model: &T) {
        self.visible_nodes.clear();
        self.visible_index.clear();
        let hint = model.size_hint();
        self.visible_nodes.reserve(hint.saturating_sub(self.visible_nodes.capacity()));
        if let Some(root) = model.root() {
            let mut is_tail_stack: SmallVec<[bool; 8]> = SmallVec::new();
            self.push_children(model, root, 0, None, &mut is_tail_stack);
        }
        self.dirty = false;
        self.clamp_selection();
    }

    fn push_children<T: TreeModel<Id = Id>>(
        &mut self,
        model: &T,
        node_id: Id,
        level: u16,
        parent: Option<Id>,
        is_tail_stack: &mut SmallVec<[bool; 8]>,
    ) {
        let children = model.children(node_id);
        let last = children.len().saturating_sub(1);
        // Top-level rows draw no guides, so the stack only tracks nested levels.
        let nested = level > 0;
        for (i, child) in children.iter().copied().enumerate() {
            if nested {
                is_tail_stack.push(i == last);
            }
            self.build_visible_nodes(model, child, level, parent, is_tail_stack);
            if nested {
                is_tail_stack.pop();
            }
        }
    }

    fn build_visible_nodes<T: TreeModel<Id = Id>>(
        &mut self,
        model: &T,
        node_id: Id,
        level: u16,
        parent: Option<Id>,
        is_tail_stack: &mut SmallVec<[bool; 8]>,
    ) {
        let has_children = !model.children(node_id).is_empty();
        let idx = self.visible_nodes.len();
        self.visible_nodes.push(VisibleNode {
            id: node_id,
            level,
            parent,
            has_children,
            is_tail_stack: is_tail_stack.clone(),
        });
        self.visible_index.insert(node_id, idx);

        if has_children && self.expanded.contains(&node_id) {
            self.push_children(model, node_id, level + 1, Some(node_id), is_tail_stack);
        }
    }

    /// Ancestors of `target` below the root, ending with `target` itself.
    fn find_path_to<T: TreeModel<Id = Id>>(model: &T, target: Id) -> Option<Vec<Id>> {
        let root = model.root()?;
        let mut path = Vec::new();
        for child in model.children(root).iter().copied() {
            if Self::dfs_find_path(model, child, target, &mut path) {
                return Some(path);
            }
        }
        None
    }

    fn dfs_find_path<T: TreeModel<Id = Id>>(
        model: &T,
        node: Id,
        target: Id,
        path: &mut Vec<Id>,
    ) -> bool {
        path.push(node);
        if node == target {
            return true;
        }
        for child in model.children(node).iter().copied() {
            if Self::dfs_find_path(model, child, target, path) {
                return true;
            }
        }
        path.pop();
        false
    }

    const fn clamp_selection(&mut self) {
        if self.visible_nodes.is_empty() {
            self.list_state.select(None);
            return;
        }

        if let Some(selected) = self.list_state.selected()
            && selected >= self.visible_nodes.len()
        {
            self.list_state
                .select(Some(self.visible_nodes.len().saturating_sub(1)));
        }
    }

    fn select_parent(&mut self) {
        let Some(parent_id) = self.selected_parent_id() else {
            return;
        };
        if let Some(parent_idx) = self.visible_index_of(parent_id) {
            self.list_state.select(Some(parent_idx));
        }
    }

    fn select_child_with_descendants<T: TreeModel<Id = Id>>(&mut self, model: &T) {
        let Some(mut selected_idx) = self.list_state.selected() else {
            return;
        };
        let Some(selected_node) = self.visible_nodes.get(selected_idx) else {
            return;
        };
        let node_id = selected_node.id;
        let mut level = selected_node.level;

        if selected_node.has_children {
            if self.expanded.insert(node_id) {
                self.update_visible_nodes(model);

                let Some(current_idx) = self.visible_index_of(node_id) else {
                    return;
                };
                selected_idx = current_idx;
                level = self.visible_nodes[current_idx].level;
                self.list_state.select(Some(current_idx));
            }

            // Prefer child groups over leaves.
            for idx in selected_idx + 1..self.visible_nodes.len() {
                let candidate = &self.visible_nodes[idx];
                if candidate.level <= level {
                    break;
                }
                if candidate.level == level + 1 && candidate.has_children {
                    self.list_state.select(Some(idx));
                    return;
                }
            }

            // Otherwise step onto the first child.
            if let Some(first) = self.visible_nodes.get(selected_idx + 1)
                && first.level == level + 1
            {
                self.list_state.select(Some(selected_idx + 1));
            }
        }
    }

    fn set_expanded_recursive<T: TreeModel<Id = Id>>(&mut self, model: &T, node_id: Id, expand: bool) {
        let children = model.children(node_id);
        if children.is_empty() {
            return;
        }
        if expand {
            self.expanded.insert(node_id);
        } else {
            self.expanded.remove(&node_id);
        }
        for child in children.iter().copied() {
            self.set_expanded_recursive(model, child, expand);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestTree {
        children: Vec<Vec<usize>>,
    }

    impl TestTree {
        fn new() -> Self {
            Self {
                children: vec![
                    vec![1, 2], // 0 (hidden root)
                    vec![3, 4], // 1
                    vec![],     // 2
                    vec![],     // 3
                    vec![],     // 4
                ],
            }
        }
    }

    impl TreeModel for TestTree {
        type Id = usize;

        fn root(&self) -> Option<Self::Id> {
            Some(0)
        }

        fn children(&self, id: Self::Id) -> &[Self::Id] {
            &self.children[id]
        }

        fn contains(&self, id: Self::Id) -> bool {
            id < self.children.len()
        }
    }

    fn ids(state: &TreeViewState<usize>) -> Vec<usize> {
        state.visible_nodes().iter().map(VisibleNode::id).collect()
    }

    #[test]
    fn root_is_hidden_and_children_start_at_level_zero() {
        let tree = TestTree::new();
        let mut state = TreeViewState::<usize>::new();
        state.ensure_visible_nodes(&tree);
        assert_eq!(ids(&state), [1, 2]);

        state.set_expanded(1, true);
        state.ensure_visible_nodes(&tree);
        let levels: Vec<_> = state.visible_nodes().iter().map(VisibleNode::level).collect();
        assert_eq!(ids(&state), [1, 3, 4, 2]);
        assert_eq!(levels, [0, 1, 1, 0]);
    }

    #[test]
    fn select_child_expands_then_descends() {
        let tree = TestTree::new();
        let mut state = TreeViewState::<usize>::new();
        state.ensure_visible_nodes(&tree);
        state.select_first();

        assert_eq!(state.handle_action::<_, ()>(&tree, TreeAction::SelectChild), TreeEvent::Handled);
        assert!(state.is_expanded(1));
        assert_eq!(state.selected_id(), Some(3));

        state.handle_action::<_, ()>(&tree, TreeAction::SelectParent);
        assert_eq!(state.selected_id(), Some(1));
    }

    #[test]
    fn open_toggles_groups_and_forwards_leaves() {
        let tree = TestTree::new();
        let mut state = TreeViewState::<usize>::new();
        state.ensure_visible_nodes(&tree);
        state.select_first();

        assert_eq!(state.handle_action::<_, ()>(&tree, TreeAction::Open), TreeEvent::Handled);
        assert!(state.is_expanded(1));

        state.handle_action::<_, ()>(&tree, TreeAction::SelectNext);
        assert_eq!(
            state.handle_action::<_, ()>(&tree, TreeAction::Open),
            TreeEvent::Action(TreeAction::Open)
        );
    }

    #[test]
    fn select_by_id_opens_ancestors() {
        let tree = TestTree::new();
        let mut state = TreeViewState::<usize>::new();
        assert!(state.select_by_id(&tree, 4));
        assert_eq!(state.selected_id(), Some(4));
        assert!(state.is_expanded(1));
        assert!(!state.is_expanded(4));
    }

    #[test]
    fn select_prev_clears_selection_when_empty() {
        let mut state = TreeViewState::<usize>::new();
        state.list_state.select(Some(0));

        state.select_prev();

        assert_eq!(state.list_state.selected(), None);
    }

    #[test]
    fn expand_all_skips_leaves() {
        let tree = TestTree::new();
        let mut state = TreeViewState::<usize>::new();
        state.expand_all(&tree);
        let mut expanded: Vec<_> = state.expanded_ids().collect();
        expanded.sort_unstable();
        assert_eq!(expanded, [1]);
    }

    #[test]
    fn step_column_clamps() {
        let mut state = TreeViewState::<usize>::new();
        state.step_column(-1, 3);
        assert_eq!(state.selected_column(), Some(0));
        state.step_column(5, 3);
        assert_eq!(state.selected_column(), Some(2));
    }
}
