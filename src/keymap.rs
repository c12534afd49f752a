use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::action::TreeAction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KeymapProfile {
    #[default]
    Default,
    Vim,
    Arrows,
}

#[derive(Clone, Copy, Debug)]
pub struct TreeKeyBindings {
    profile: KeymapProfile,
}

impl Default for TreeKeyBindings {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeKeyBindings {
    pub const fn new() -> Self {
        Self {
            profile: KeymapProfile::Default,
        }
    }

    pub const fn with_profile(profile: KeymapProfile) -> Self {
        Self { profile }
    }

    pub const fn profile(&self) -> KeymapProfile {
        self.profile
    }

    pub const fn set_profile(&mut self, profile: KeymapProfile) {
        self.profile = profile;
    }

    pub fn resolve<C>(&self, key: KeyEvent) -> Option<TreeAction<C>> {
        if key.modifiers.contains(KeyModifiers::SHIFT) {
            match key.code {
                KeyCode::Left => return Some(TreeAction::SelectPrevColumn),
                KeyCode::Right => return Some(TreeAction::SelectNextColumn),
                _ => {}
            }
        }

        let nav_action = match self.profile {
            KeymapProfile::Default => Self::resolve_default_nav(key),
            KeymapProfile::Vim => Self::resolve_vim_nav(key),
            KeymapProfile::Arrows => Self::resolve_arrow_nav(key),
        };
        if nav_action.is_some() {
            return nav_action;
        }

        Self::resolve_common(key)
    }

    pub fn resolve_with<C, F>(&self, key: KeyEvent, custom: F) -> Option<TreeAction<C>>
    where
        F: Fn(KeyEvent) -> Option<C>,
    {
        if let Some(action) = custom(key) {
            return Some(TreeAction::Custom(action));
        }

        self.resolve(key)
    }

    const fn resolve_default_nav<C>(key: KeyEvent) -> Option<TreeAction<C>> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => Some(TreeAction::SelectPrev),
            KeyCode::Down | KeyCode::Char('j') => Some(TreeAction::SelectNext),
            KeyCode::Left | KeyCode::Char('h') => Some(TreeAction::SelectParent),
            KeyCode::Right | KeyCode::Char('l') => Some(TreeAction::SelectChild),
            KeyCode::Char('H') => Some(TreeAction::SelectPrevColumn),
            KeyCode::Char('L') => Some(TreeAction::SelectNextColumn),
            _ => None,
        }
    }

    const fn resolve_vim_nav<C>(key: KeyEvent) -> Option<TreeAction<C>> {
        match key.code {
            KeyCode::Char('k') => Some(TreeAction::SelectPrev),
            KeyCode::Char('j') => Some(TreeAction::SelectNext),
            KeyCode::Char('h') => Some(TreeAction::SelectParent),
            KeyCode::Char('l') => Some(TreeAction::SelectChild),
            KeyCode::Char('H') => Some(TreeAction::SelectPrevColumn),
            KeyCode::Char('L') => Some(TreeAction::SelectNextColumn),
            _ => None,
        }
    }

    const fn resolve_arrow_nav<C>(key: KeyEvent) -> Option<TreeAction<C>> {
        match key.code {
            KeyCode::Up => Some(TreeAction::SelectPrev),
            KeyCode::Down => Some(TreeAction::SelectNext),
            KeyCode::Left => Some(TreeAction::SelectParent),
            KeyCode::Right => Some(TreeAction::SelectChild),
            _ => None,
        }
    }

    const fn resolve_common<C>(key: KeyEvent) -> Option<TreeAction<C>> {
        match key.code {
            KeyCode::Char(' ') => Some(TreeAction::ToggleRecursive),
            KeyCode::Tab => Some(TreeAction::ToggleNode),
            KeyCode::Enter => Some(TreeAction::Open),
            KeyCode::Char('*') => Some(TreeAction::ExpandAll),
            KeyCode::Char('z') => Some(TreeAction::CollapseAll),
            KeyCode::Char('g') => Some(TreeAction::ToggleGuides),
            KeyCode::Char('f') => Some(TreeAction::HeaderMenu),
            KeyCode::Char('/') => Some(TreeAction::QuickSearch),
            KeyCode::Home => Some(TreeAction::SelectFirst),
            KeyCode::End => Some(TreeAction::SelectLast),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn enter_opens_and_shift_arrows_move_columns() {
        let bindings = TreeKeyBindings::new();
        assert_eq!(bindings.resolve::<()>(key(KeyCode::Enter)), Some(TreeAction::Open));
        assert_eq!(
            bindings.resolve::<()>(KeyEvent::new(KeyCode::Right, KeyModifiers::SHIFT)),
            Some(TreeAction::SelectNextColumn)
        );
    }

    #[test]
    fn arrows_profile_ignores_letters() {
        let bindings = TreeKeyBindings::with_profile(KeymapProfile::Arrows);
        assert_eq!(bindings.resolve::<()>(key(KeyCode::Char('j'))), None);
        assert_eq!(bindings.resolve::<()>(key(KeyCode::Down)), Some(TreeAction::SelectNext));
    }

    #[test]
    fn custom_mapping_takes_precedence() {
        let bindings = TreeKeyBindings::new();
        let action = bindings.resolve_with(key(KeyCode::Enter), |k| (k.code == KeyCode::Enter).then_some(7u8));
        assert_eq!(action, Some(TreeAction::Custom(7)));
    }
}
