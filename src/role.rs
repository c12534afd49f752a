use std::borrow::Cow;

use crate::value::CellValue;

/// Presentation aspect requested from [`TableModel::data`](crate::TableModel::data).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemRole {
    /// Primary value shown in the cell.
    Display,
    /// Icon glyph drawn before the value.
    Decoration,
    /// Font emphasis for the cell.
    Font,
}

/// Font emphasis understood by the widget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Font {
    #[default]
    Regular,
    Bold,
    Italic,
    Underline,
}

/// Data returned for an item/column/role triple.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ItemData<'a> {
    #[default]
    None,
    /// Borrowed snapshot value (leaf display).
    Value(&'a CellValue),
    /// Computed text (branch labels, header titles).
    Label(String),
    Glyph(&'static str),
    Font(Font),
}

impl<'a> ItemData<'a> {
    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Text form for display roles; empty for non-textual data.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Value(value) => value.as_str_lossy(),
            Self::Label(label) => Cow::Borrowed(label.as_str()),
            Self::Glyph(glyph) => Cow::Borrowed(*glyph),
            Self::None | Self::Font(_) => Cow::Borrowed(""),
        }
    }

    /// Like [`text`](Self::text), but keeps the model borrow instead of `self`.
    pub fn into_text(self) -> Cow<'a, str> {
        match self {
            Self::Value(value) => value.as_str_lossy(),
            Self::Label(label) => Cow::Owned(label),
            Self::Glyph(glyph) => Cow::Borrowed(glyph),
            Self::None | Self::Font(_) => Cow::Borrowed(""),
        }
    }

    pub const fn font(&self) -> Option<Font> {
        match self {
            Self::Font(font) => Some(*font),
            _ => None,
        }
    }

    pub const fn glyph(&self) -> Option<&'static str> {
        match self {
            Self::Glyph(glyph) => Some(*glyph),
            _ => None,
        }
    }
}
