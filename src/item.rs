//! Display item arena built from a snapshot on every model reset.

use std::fmt;

use rustc_hash::{FxBuildHasher, FxHashMap};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::value::CellValue;

/// Handle of a display item within the current tree.
///
/// Ids are reallocated on every rebuild; persist [`Path`]s instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u32);

impl ItemId {
    pub(crate) const ROOT: Self = Self(0);

    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One segment of a [`Path`]: a group key, or the identity of a leaf row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    Null,
    Bool(bool),
    Int(i64),
    /// Float group key stored by bit pattern.
    Float(u64),
    Text(String),
    /// Leaf identity: index of the row in the snapshot.
    Row(usize),
}

impl PathSegment {
    /// Builds the group key for a scalar value.
    ///
    /// Lists must be flattened with [`push_group_keys`] first.
    pub fn from_value(value: &CellValue) -> Self {
        match value {
            CellValue::Null => Self::Null,
            CellValue::Bool(value) => Self::Bool(*value),
            CellValue::Int(value) => Self::Int(*value),
            // Normalize -0.0 so it groups with 0.0.
            CellValue::Float(value) => Self::Float((*value + 0.0).to_bits()),
            CellValue::Text(value) => Self::Text(value.clone()),
            CellValue::List(_) => Self::Text(value.to_string()),
        }
    }

    /// Label shown for a branch built from this key.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("(none)"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Self::Text(value) => f.write_str(value),
            Self::Row(idx) => write!(f, "#{idx}"),
        }
    }
}

/// Ordered group keys terminated by a leaf identity.
pub type Path = SmallVec<[PathSegment; 4]>;

/// Appends the group keys of `value`, flattening lists into consecutive segments.
///
/// An empty list contributes a single `Null` key so the leaf still lands at a
/// consistent depth.
pub fn push_group_keys(path: &mut Path, value: &CellValue) {
    match value {
        CellValue::List(values) if values.is_empty() => path.push(PathSegment::Null),
        CellValue::List(values) => {
            for value in values {
                push_group_keys(path, value);
            }
        }
        other => path.push(PathSegment::from_value(other)),
    }
}

/// Leaf or branch payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemKind {
    /// Wraps one snapshot row.
    Leaf { row: usize },
    /// Synthetic grouping node.
    Branch { key: PathSegment },
}

#[derive(Clone, Debug)]
struct Item {
    kind: ItemKind,
    parent: Option<ItemId>,
    rank: usize,
    children: Vec<ItemId>,
    by_key: FxHashMap<PathSegment, ItemId>,
}

/// Arena of display items rooted at an implicit root branch.
#[derive(Clone, Debug)]
pub struct ItemTree {
    items: Vec<Item>,
    leaf_count: usize,
}

impl Default for ItemTree {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl ItemTree {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut items = Vec::with_capacity(capacity + 1);
        items.push(Item {
            kind: ItemKind::Branch {
                key: PathSegment::Text("root".to_string()),
            },
            parent: None,
            rank: 0,
            children: Vec::new(),
            by_key: FxHashMap::with_capacity_and_hasher(capacity, FxBuildHasher),
        });
        Self {
            items,
            leaf_count: 0,
        }
    }

    #[inline]
    pub const fn root(&self) -> ItemId {
        ItemId::ROOT
    }

    #[inline]
    fn item(&self, id: ItemId) -> &Item {
        match self.items.get(id.index()) {
            Some(item) => item,
            None => panic!("item {id:?} does not belong to this tree ({} items)", self.items.len()),
        }
    }

    pub fn contains(&self, id: ItemId) -> bool {
        id.index() < self.items.len()
    }

    pub fn kind(&self, id: ItemId) -> &ItemKind {
        &self.item(id).kind
    }

    /// Returns the snapshot row of a leaf item.
    pub fn leaf_row(&self, id: ItemId) -> Option<usize> {
        match self.item(id).kind {
            ItemKind::Leaf { row } => Some(row),
            ItemKind::Branch { .. } => None,
        }
    }

    pub fn is_leaf(&self, id: ItemId) -> bool {
        matches!(self.item(id).kind, ItemKind::Leaf { .. })
    }

    pub fn children(&self, id: ItemId) -> &[ItemId] {
        &self.item(id).children
    }

    /// Child with the given rank.
    pub fn child(&self, parent: ItemId, rank: usize) -> Option<ItemId> {
        self.item(parent).children.get(rank).copied()
    }

    pub fn child_count(&self, id: ItemId) -> usize {
        self.item(id).children.len()
    }

    pub fn has_children(&self, id: ItemId) -> bool {
        !self.item(id).children.is_empty()
    }

    /// Parent item; `None` only for the root.
    pub fn parent(&self, id: ItemId) -> Option<ItemId> {
        let item = self.item(id);
        assert!(
            item.parent.is_some() || id == ItemId::ROOT,
            "item {id:?} has no parent but is not the root"
        );
        item.parent
    }

    /// Position among siblings.
    pub fn rank(&self, id: ItemId) -> usize {
        self.item(id).rank
    }

    /// Number of display items excluding the root.
    pub fn len(&self) -> usize {
        self.items.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.items.len() == 1
    }

    pub const fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn branch_count(&self) -> usize {
        self.len() - self.leaf_count
    }

    fn segment(&self, id: ItemId) -> PathSegment {
        match &self.item(id).kind {
            ItemKind::Leaf { row } => PathSegment::Row(*row),
            ItemKind::Branch { key } => key.clone(),
        }
    }

    /// Path from the root to the item (empty for the root).
    pub fn path(&self, id: ItemId) -> Path {
        let mut path = Path::new();
        let mut current = id;
        while current != ItemId::ROOT {
            path.push(self.segment(current));
            current = self
                .parent(current)
                .unwrap_or_else(|| panic!("item {current:?} is detached from the root"));
        }
        path.reverse();
        path
    }

    /// Resolves a path to a live item, walking the per-branch key index.
    pub fn locate(&self, path: &[PathSegment]) -> Option<ItemId> {
        let mut current = ItemId::ROOT;
        for segment in path {
            current = *self.item(current).by_key.get(segment)?;
        }
        Some(current)
    }

    fn alloc(&mut self, kind: ItemKind, parent: ItemId) -> ItemId {
        let id = ItemId(u32::try_from(self.items.len()).unwrap_or_else(|_| panic!("item arena overflow")));
        let key = match &kind {
            ItemKind::Leaf { row } => PathSegment::Row(*row),
            ItemKind::Branch { key } => key.clone(),
        };
        if matches!(kind, ItemKind::Leaf { .. }) {
            self.leaf_count += 1;
        }
        let parent_item = &mut self.items[parent.index()];
        let rank = parent_item.children.len();
        parent_item.children.push(id);
        parent_item.by_key.insert(key, id);
        self.items.push(Item {
            kind,
            parent: Some(parent),
            rank,
            children: Vec::new(),
            by_key: FxHashMap::default(),
        });
        id
    }

    /// Appends a leaf for `row` directly under the root.
    pub fn push_leaf(&mut self, row: usize) -> ItemId {
        self.alloc(ItemKind::Leaf { row }, ItemId::ROOT)
    }

    /// Inserts a leaf for `row` under the branch chain named by `groups`,
    /// creating missing branches in first-encountered order.
    pub fn put(&mut self, groups: &[PathSegment], row: usize) -> ItemId {
        let mut current = ItemId::ROOT;
        for segment in groups {
            current = match self.items[current.index()].by_key.get(segment) {
                Some(&existing) => existing,
                None => self.alloc(ItemKind::Branch { key: segment.clone() }, current),
            };
        }
        self.alloc(ItemKind::Leaf { row }, current)
    }

    /// All leaves in depth-first display order.
    pub fn leaves(&self) -> Vec<ItemId> {
        let mut out = Vec::with_capacity(self.leaf_count);
        let mut stack = vec![ItemId::ROOT];
        while let Some(id) = stack.pop() {
            let item = self.item(id);
            if matches!(item.kind, ItemKind::Leaf { .. }) {
                out.push(id);
            }
            stack.extend(item.children.iter().rev().copied());
        }
        out
    }

    /// Paths of all leaves in display order.
    pub fn leaf_paths(&self) -> Vec<Path> {
        self.leaves().into_iter().map(|id| self.path(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> PathSegment {
        PathSegment::Text(value.to_string())
    }

    #[test]
    fn put_creates_branches_in_first_seen_order() {
        let mut tree = ItemTree::default();
        tree.put(&[text("b")], 0);
        tree.put(&[text("a")], 1);
        tree.put(&[text("b")], 2);

        let root_children = tree.children(tree.root());
        assert_eq!(root_children.len(), 2);
        assert_eq!(tree.kind(root_children[0]), &ItemKind::Branch { key: text("b") });
        assert_eq!(tree.child_count(root_children[0]), 2);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.branch_count(), 2);
    }

    #[test]
    fn path_and_locate_agree() {
        let mut tree = ItemTree::default();
        let leaf = tree.put(&[text("x"), PathSegment::Null], 7);
        let path = tree.path(leaf);
        assert_eq!(path.as_slice(), &[text("x"), PathSegment::Null, PathSegment::Row(7)]);
        assert_eq!(tree.locate(&path), Some(leaf));
        assert_eq!(tree.locate(&[text("y")]), None);
    }

    #[test]
    fn rank_and_parent_follow_insertion() {
        let mut tree = ItemTree::default();
        let first = tree.push_leaf(3);
        let second = tree.push_leaf(1);
        assert_eq!(tree.rank(first), 0);
        assert_eq!(tree.rank(second), 1);
        assert_eq!(tree.parent(second), Some(tree.root()));
        assert_eq!(tree.parent(tree.root()), None);
        assert_eq!(tree.child(tree.root(), 1), Some(second));
    }

    #[test]
    fn list_values_flatten_into_segments() {
        let mut path = Path::new();
        push_group_keys(&mut path, &CellValue::from(vec!["a", "b"]));
        push_group_keys(&mut path, &CellValue::List(Vec::new()));
        assert_eq!(path.as_slice(), &[text("a"), text("b"), PathSegment::Null]);
    }

    #[test]
    #[should_panic(expected = "does not belong")]
    fn foreign_ids_fail_loudly() {
        let tree = ItemTree::default();
        let _ = tree.children(ItemId(42));
    }
}
