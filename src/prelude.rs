pub use crate::{
    CellValue, Decoration, DecorationTable, FilterStatus, Font, HeaderMenu, HeaderMenuView,
    ItemData, ItemId, ItemRole, MemorySettings, MenuAction, ModelConfig, ModelEvent, Predicate,
    Row, RowKind, SettingsStore, Snapshot, SortOrder, TableModel, TreeAction, TreeEvent,
    TreeGlyphs, TreeModel, TreeScrollPolicy, TreeTable, TreeTableStyle, TreeView, ViewConfig,
    ViewState,
};

#[cfg(feature = "keymap")]
pub use crate::{KeymapProfile, TreeKeyBindings};

#[cfg(feature = "edit")]
pub use crate::{EditRoute, EditTarget};
