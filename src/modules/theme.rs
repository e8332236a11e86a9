use std::fs;
use std::io::ErrorKind;
use std::sync::Mutex;

use derive_more::with_trait::Display;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::modules::errors::ConsoleError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    #[display("dark")]
    Dark,
    #[display("light")]
    Light,
}

impl Theme {
    pub fn flipped(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "dark" => Some(Theme::Dark),
            "light" => Some(Theme::Light),
            _ => None,
        }
    }
}

/// Persistent slot holding the chosen theme.
pub trait ThemeStore {
    fn load(&self) -> Result<Option<Theme>, ConsoleError>;
    fn save(&self, theme: Theme) -> Result<(), ConsoleError>;
}

impl<T: ThemeStore + ?Sized> ThemeStore for &T {
    fn load(&self) -> Result<Option<Theme>, ConsoleError> {
        (**self).load()
    }

    fn save(&self, theme: Theme) -> Result<(), ConsoleError> {
        (**self).save(theme)
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ThemeFile {
    theme: Option<Theme>,
}

/// Stores `theme = "dark"` in a small TOML file.
pub struct FileThemeStore {
    path: String,
}

impl FileThemeStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl ThemeStore for FileThemeStore {
    fn load(&self) -> Result<Option<Theme>, ConsoleError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let file: ThemeFile = toml::from_str(&text)?;
        Ok(file.theme)
    }

    fn save(&self, theme: Theme) -> Result<(), ConsoleError> {
        let toml_str = toml::to_string_pretty(&ThemeFile { theme: Some(theme) })?;
        fs::write(&self.path, toml_str)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryThemeStore {
    slot: Mutex<Option<Theme>>,
    read_only: bool,
}

impl MemoryThemeStore {
    pub fn with(theme: Theme) -> Self {
        Self {
            slot: Mutex::new(Some(theme)),
            read_only: false,
        }
    }

    /// A store whose writes always fail, like storage blocked by the browser.
    pub fn read_only() -> Self {
        Self {
            slot: Mutex::new(None),
            read_only: true,
        }
    }
}

impl ThemeStore for MemoryThemeStore {
    fn load(&self) -> Result<Option<Theme>, ConsoleError> {
        Ok(*self.slot.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn save(&self, theme: Theme) -> Result<(), ConsoleError> {
        if self.read_only {
            return Err(std::io::Error::new(ErrorKind::PermissionDenied, "theme storage is read-only").into());
        }
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(theme);
        Ok(())
    }
}

/// Everything on screen that depends on the theme.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("data-theme={root_attribute} icon={icon_class} label={label}")]
pub struct ThemeView {
    pub root_attribute: &'static str,
    pub icon_class: &'static str,
    pub label: &'static str,
    pub select_value: &'static str,
}

pub struct ThemeController<S: ThemeStore> {
    store: S,
    theme: Theme,
}

impl<S: ThemeStore> ThemeController<S> {
    /// Starts from the stored theme, or dark when nothing usable is stored.
    pub fn new(store: S) -> Self {
        let theme = match store.load() {
            Ok(Some(theme)) => theme,
            Ok(None) => Theme::Dark,
            Err(err) => {
                warn!("Cannot read stored theme, using dark: {err}");
                Theme::Dark
            }
        };
        Self { store, theme }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Header button.
    pub fn toggle(&mut self) -> ThemeView {
        self.select(self.theme.flipped())
    }

    /// Settings dropdown.
    pub fn select(&mut self, theme: Theme) -> ThemeView {
        self.theme = theme;
        if let Err(err) = self.store.save(theme) {
            warn!("Theme not persisted: {err}");
        }
        info!("Theme set to {theme}");
        self.view()
    }

    pub fn view(&self) -> ThemeView {
        match self.theme {
            Theme::Dark => ThemeView {
                root_attribute: "dark",
                icon_class: "fas fa-moon",
                label: "Dark Mode",
                select_value: "dark",
            },
            Theme::Light => ThemeView {
                root_attribute: "light",
                icon_class: "fas fa-sun",
                label: "Light Mode",
                select_value: "light",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_dark() {
        let controller = ThemeController::new(MemoryThemeStore::default());
        assert_eq!(controller.theme(), Theme::Dark);
        assert_eq!(controller.view().icon_class, "fas fa-moon");
    }

    #[test]
    fn toggle_persists_and_survives_reload() {
        let store = MemoryThemeStore::default();
        let mut controller = ThemeController::new(&store);
        let view = controller.toggle();
        assert_eq!(view.root_attribute, "light");
        assert_eq!(view.label, "Light Mode");
        assert_eq!(store.load().unwrap(), Some(Theme::Light));

        let reloaded = ThemeController::new(&store);
        assert_eq!(reloaded.view(), view);
    }

    #[test]
    fn failed_save_still_switches() {
        let mut controller = ThemeController::new(MemoryThemeStore::read_only());
        assert_eq!(controller.select(Theme::Light).root_attribute, "light");
        assert_eq!(controller.theme(), Theme::Light);
    }

    #[test]
    fn file_store_round_trip() {
        let path = std::env::temp_dir().join(format!("mekanai-theme-{}.toml", std::process::id()));
        let store = FileThemeStore::new(path.to_string_lossy());
        assert_eq!(store.load().unwrap(), None);
        store.save(Theme::Light).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), r#"theme = "light""#);
        assert_eq!(store.load().unwrap(), Some(Theme::Light));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unreadable_file_falls_back_to_dark() {
        let path = std::env::temp_dir().join(format!("mekanai-theme-bad-{}.toml", std::process::id()));
        fs::write(&path, "theme = \"sepia\"").unwrap();
        let controller = ThemeController::new(FileThemeStore::new(path.to_string_lossy()));
        assert_eq!(controller.theme(), Theme::Dark);
        fs::remove_file(&path).unwrap();
    }
}
