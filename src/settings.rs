use log::{LevelFilter, debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{LazyLock, RwLock};

use crate::engine::LayoutParams;
use crate::session::{DEFAULT_RESOLUTION, SessionConfig};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pagesession";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Device resolution in dots per inch
    #[serde(default = "default_resolution")]
    pub resolution: u32,

    #[serde(default = "default_layout_width")]
    pub layout_width: f32,

    #[serde(default = "default_layout_height")]
    pub layout_height: f32,

    #[serde(default = "default_layout_em")]
    pub layout_em: f32,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_resolution() -> u32 {
    DEFAULT_RESOLUTION
}

fn default_layout_width() -> f32 {
    LayoutParams::default().width
}

fn default_layout_height() -> f32 {
    LayoutParams::default().height
}

fn default_layout_em() -> f32 {
    LayoutParams::default().em
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            resolution: default_resolution(),
            layout_width: default_layout_width(),
            layout_height: default_layout_height(),
            layout_em: default_layout_em(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            resolution: self.resolution.max(1),
            layout: LayoutParams::new(self.layout_width, self.layout_height, self.layout_em),
        }
    }

    /// Parsed `log_level`; unknown names fall back to `Info`
    #[must_use]
    pub fn log_level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Info)
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

#[must_use]
pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Loads the settings file, creating it with defaults when missing
pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };
    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

/// Replaces the global settings with the contents of `path`.
///
/// Unreadable or malformed files are logged and leave the current settings in place.
pub fn load_settings_from_path(path: &Path) {
    match fs::read_to_string(path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");

                if settings.version < CURRENT_VERSION {
                    migrate_settings(&mut settings);
                    save_settings_to_file(&settings, path);
                }

                if let Ok(mut global) = SETTINGS.write() {
                    *global = settings;
                }
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::from(SETTINGS_HEADER);

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str(&format!("resolution: {}\n", settings.resolution));
    content.push_str(&format!("layout_width: {}\n", settings.layout_width));
    content.push_str(&format!("layout_height: {}\n", settings.layout_height));
    content.push_str(&format!("layout_em: {}\n", settings.layout_em));
    content.push_str(&format!("log_level: \"{}\"\n", settings.log_level));

    content
}

const SETTINGS_HEADER: &str = r#"# pagesession settings
#
# resolution:     device resolution (dpi) used as the base render zoom
# layout_*:       viewport used to paginate reflowable documents at open
# log_level:      off, error, warn, info, debug, or trace

"#;

// Public API for accessing/modifying settings

#[must_use]
pub fn current() -> Settings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

#[must_use]
pub fn session_config() -> SessionConfig {
    current().session_config()
}

#[must_use]
pub fn get_log_level() -> LevelFilter {
    SETTINGS
        .read()
        .map(|s| s.log_level_filter())
        .unwrap_or(LevelFilter::Info)
}

pub fn set_resolution(resolution: u32) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.resolution = resolution;
    }
}

/// Restores the built-in defaults in memory
pub fn reset_settings() {
    if let Ok(mut settings) = SETTINGS.write() {
        *settings = Settings::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_pocket_book_layout() {
        let config = Settings::default().session_config();
        assert_eq!(config.resolution, 160);
        assert_eq!(config.layout, LayoutParams::new(312.0, 504.0, 10.0));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings = serde_yaml::from_str("resolution: 96\n").unwrap();
        assert_eq!(settings.resolution, 96);
        assert_eq!(settings.layout_em, 10.0);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.version, CURRENT_VERSION);
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let settings = Settings {
            log_level: "chatty".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.log_level_filter(), LevelFilter::Info);
        let settings = Settings {
            log_level: "debug".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.log_level_filter(), LevelFilter::Debug);
    }

    #[test]
    #[serial]
    fn saved_file_loads_back() {
        reset_settings();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);
        let settings = Settings {
            resolution: 220,
            layout_width: 400.0,
            log_level: "warn".to_string(),
            ..Settings::default()
        };

        save_settings_to_file(&settings, &path);
        load_settings_from_path(&path);

        assert_eq!(current(), settings);
        assert_eq!(session_config().resolution, 220);
        assert_eq!(get_log_level(), LevelFilter::Warn);
        reset_settings();
    }

    #[test]
    #[serial]
    fn old_version_is_migrated_and_rewritten() {
        reset_settings();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 0\nresolution: 72\n").unwrap();

        load_settings_from_path(&path);

        assert_eq!(current().version, CURRENT_VERSION);
        assert_eq!(current().resolution, 72);
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains(&format!("version: {CURRENT_VERSION}")));
        reset_settings();
    }

    #[test]
    #[serial]
    fn malformed_file_keeps_current_settings() {
        reset_settings();
        set_resolution(300);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "resolution: [not, a, number]\n").unwrap();

        load_settings_from_path(&path);

        assert_eq!(current().resolution, 300);
        reset_settings();
    }
}
