//! Grouped, filterable tree-table for ratatui.
//!
//! A [`TableModel`] turns a flat [`Snapshot`] of rows into a tree: rows are
//! filtered by a [`Predicate`], stably sorted, then grouped by column values
//! into synthetic branches. A [`TreeView`] keeps the presentation state
//! (expanded groups by path, hidden columns, column filters, quick search)
//! and survives model resets. [`TreeTable`] renders both as a ratatui
//! `StatefulWidget`.
//!
//! Feature flags:
//! - `keymap`: crossterm-based key bindings and `TreeView::handle_key*` helpers.
//! - `edit`: inline edits routed to an [`EditTarget`].

mod action;
mod columns;
mod config;
mod context;
mod decor;
#[cfg(feature = "edit")]
mod edit;
mod error;
mod events;
mod glyphs;
mod item;
#[cfg(feature = "keymap")]
mod keymap;
mod menu;
mod model;
pub mod prelude;
mod query;
mod role;
mod settings;
mod snapshot;
mod state;
mod style;
mod value;
mod view;
mod widget;

pub use action::{TreeAction, TreeEvent};
pub use columns::{ColumnWidth, distribute_widths};
pub use config::{DEFAULT_EDITABLE_FIELDS, ModelConfig, ViewConfig};
pub use context::TreeRowContext;
pub use decor::{Decoration, DecorationTable, RowClassifier, RowKind};
#[cfg(feature = "edit")]
pub use edit::{EditRoute, EditTarget};
pub use error::{ModelError, QueryError, SettingsError, ViewError};
pub use events::{ChangeBus, SnapshotSource, Subscription};
pub use glyphs::{TreeGlyphs, TreeLabel, label_prefix_width, tree_label_line};
pub use item::{ItemId, ItemKind, ItemTree, Path, PathSegment, push_group_keys};
#[cfg(feature = "keymap")]
pub use keymap::{KeymapProfile, TreeKeyBindings};
pub use menu::{HeaderMenu, MenuAction, MenuEntry};
pub use model::{
    ListenerId, ModelChanges, ModelEvent, ModelId, ModelIndex, SortOrder, TableModel, TreeModel,
};
pub use query::{CompareOp, Predicate, TextOp};
pub use role::{Font, ItemData, ItemRole};
pub use settings::{HeaderGeometry, MemorySettings, SettingsStore, ViewState};
pub use snapshot::{Row, Snapshot};
pub use state::{TreeViewState, VisibleNode};
pub use style::{TreeScrollPolicy, TreeTableStyle, font_style};
pub use value::CellValue;
pub use view::{FilterStatus, TreeView};
pub use widget::{HeaderMenuView, TreeTable};
