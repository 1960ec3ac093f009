use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, PoisonError, RwLock};
use std::time::Duration;

use crate::overlay::OverlayStyle;
use crate::render::{DEFAULT_CACHE_SIZE, DEFAULT_WORKERS, RenderConfig};
use crate::viewer::ViewerConfig;
use crate::viewport::{
    DEFAULT_BASELINE_PAGES, DEFAULT_MARGIN_PAGES, DEFAULT_PAGE_GAP_PX,
    DEFAULT_PLACEHOLDER_HEIGHT_PX, DEFAULT_PROXIMITY_PX, VirtualizerConfig,
};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "evidence-lens";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_scale")]
    pub scale: f32,

    #[serde(default = "default_baseline_pages")]
    pub baseline_pages: u32,

    #[serde(default = "default_margin_pages")]
    pub margin_pages: u32,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    #[serde(default = "default_page_gap_px")]
    pub page_gap_px: f32,

    #[serde(default = "default_proximity_px")]
    pub proximity_px: f32,

    #[serde(default = "default_placeholder_height_px")]
    pub placeholder_height_px: f32,

    #[serde(default = "default_fill_opacity")]
    pub fill_opacity: f32,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_scale() -> f32 {
    1.0
}

fn default_baseline_pages() -> u32 {
    DEFAULT_BASELINE_PAGES
}

fn default_margin_pages() -> u32 {
    DEFAULT_MARGIN_PAGES
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_page_gap_px() -> f32 {
    DEFAULT_PAGE_GAP_PX
}

fn default_proximity_px() -> f32 {
    DEFAULT_PROXIMITY_PX
}

fn default_placeholder_height_px() -> f32 {
    DEFAULT_PLACEHOLDER_HEIGHT_PX
}

fn default_fill_opacity() -> f32 {
    0.2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            scale: default_scale(),
            baseline_pages: default_baseline_pages(),
            margin_pages: default_margin_pages(),
            cache_capacity: default_cache_capacity(),
            workers: default_workers(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            page_gap_px: default_page_gap_px(),
            proximity_px: default_proximity_px(),
            placeholder_height_px: default_placeholder_height_px(),
            fill_opacity: default_fill_opacity(),
        }
    }
}

impl Settings {
    /// Engine configuration described by these settings
    #[must_use]
    pub fn viewer_config(&self) -> ViewerConfig {
        ViewerConfig {
            scale: if self.scale.is_finite() && self.scale > 0.0 {
                self.scale
            } else {
                default_scale()
            },
            render: RenderConfig {
                workers: self.workers.max(1),
                cache_capacity: self.cache_capacity.max(1),
            },
            viewport: VirtualizerConfig {
                baseline_pages: self.baseline_pages,
                margin_pages: self.margin_pages,
                page_gap_px: self.page_gap_px.max(0.0),
                proximity_px: self.proximity_px.max(0.0),
                placeholder_height_px: self.placeholder_height_px.max(1.0),
            },
            overlay: OverlayStyle {
                fill_opacity: self.fill_opacity.clamp(0.0, 1.0),
                ..OverlayStyle::default()
            },
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

#[must_use]
pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from `path`, or from the default location. A missing file
/// leaves the defaults in place; a broken one is logged and ignored.
pub fn load_settings(path: Option<&Path>) -> Settings {
    let path = path.map(Path::to_path_buf).or_else(preferred_config_path);
    match path {
        Some(path) if path.exists() => {
            if let Some(settings) = load_settings_from_path(&path) {
                *SETTINGS.write().unwrap_or_else(PoisonError::into_inner) = settings;
            }
        }
        Some(path) => info!("Settings file {path:?} not found, using defaults"),
        None => warn!("Could not determine config directory, using default settings"),
    }
    get_settings()
}

#[must_use]
pub fn get_settings() -> Settings {
    SETTINGS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub fn set_scale(scale: f32) {
    SETTINGS.write().unwrap_or_else(PoisonError::into_inner).scale = scale;
}

/// Write the current settings to `path`, or to the default location
pub fn save_settings(path: Option<&Path>) {
    let Some(path) = path.map(Path::to_path_buf).or_else(preferred_config_path) else {
        warn!("Could not determine config directory, cannot save settings");
        return;
    };
    save_settings_to_file(&get_settings(), &path);
}

fn load_settings_from_path(path: &Path) -> Option<Settings> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            return None;
        }
    };
    match serde_yaml::from_str::<Settings>(&content) {
        Ok(mut settings) => {
            debug!("Loaded settings from {path:?}");
            if settings.version < CURRENT_VERSION {
                migrate_settings(&mut settings);
                save_settings_to_file(&settings, path);
            }
            Some(settings)
        }
        Err(e) => {
            error!("Failed to parse settings file {path:?}: {e}");
            None
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

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    match fs::write(path, generate_settings_yaml(settings)) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str("\n# Display scale (1.0 = one pixel per page unit)\n");
    content.push_str(&format!("scale: {}\n", settings.scale));
    content.push_str("\n# Pages always rendered from the top of the document\n");
    content.push_str(&format!("baseline_pages: {}\n", settings.baseline_pages));
    content.push_str("# Pages rendered before and after each visible page\n");
    content.push_str(&format!("margin_pages: {}\n", settings.margin_pages));
    content.push_str("\n# Page bitmaps kept in memory\n");
    content.push_str(&format!("cache_capacity: {}\n", settings.cache_capacity));
    content.push_str(&format!("workers: {}\n", settings.workers));
    content.push_str(&format!("fetch_timeout_ms: {}\n", settings.fetch_timeout_ms));
    content.push_str("\n# Layout, in pixels\n");
    content.push_str(&format!("page_gap_px: {}\n", settings.page_gap_px));
    content.push_str(&format!("proximity_px: {}\n", settings.proximity_px));
    content.push_str(&format!(
        "placeholder_height_px: {}\n",
        settings.placeholder_height_px
    ));
    content.push_str("\n# Highlight fill opacity, 0.0 - 1.0\n");
    content.push_str(&format!("fill_opacity: {}\n", settings.fill_opacity));

    content
}
