//! Preferences and theme selection for TreePad.
//! TreePad 的偏好設定與主題選擇。

pub mod preferences;
pub mod theme;

pub use preferences::{
    EditorPreferences, Preferences, PreferencesError, PreferencesStore, RunPreferences,
    StoragePreferences,
};
pub use theme::{Theme, ThemeParseError};
