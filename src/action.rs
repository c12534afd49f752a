/// Actions that a user or application can initiate on the tree table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeAction<Custom = ()> {
    /// Move selection to the previous visible row.
    SelectPrev,
    /// Move selection to the next visible row.
    SelectNext,
    /// Move selection to the parent group.
    SelectParent,
    /// Expand the selection; if possible, move to an expandable descendant.
    SelectChild,
    /// Select the first visible row.
    SelectFirst,
    /// Select the last visible row.
    SelectLast,
    /// Move the column cursor left (header menu target).
    SelectPrevColumn,
    /// Move the column cursor right (header menu target).
    SelectNextColumn,
    /// Toggle expansion recursively for the selected group.
    ToggleRecursive,
    /// Toggle expansion for the selected group only.
    ToggleNode,
    /// Expand all groups.
    ExpandAll,
    /// Collapse all groups.
    CollapseAll,
    /// Toggle drawing of guide lines.
    ToggleGuides,
    /// Activate the selection: toggles a group, forwards a leaf to the caller.
    Open,
    /// Ask the caller to show the header menu for the selected column.
    HeaderMenu,
    /// Ask the caller to focus the quick search input.
    QuickSearch,
    /// Custom action forwarded to the caller without internal handling.
    Custom(Custom),
}

/// Result of handling an action or key event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeEvent<Custom = ()> {
    /// The action was handled internally and state was updated.
    Handled,
    /// The action was ignored (e.g., nothing selected / nothing to do).
    Unhandled,
    /// The action is forwarded to the caller for handling.
    Action(TreeAction<Custom>),
}
