//! Gallery configuration.
//!
//! Loads `gallery.toml`, overlays it on the stock defaults and validates the
//! result. A missing file is fine: the stock defaults describe the public fox
//! endpoint with 320px rounded images.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [source]
//! base_url = "https://randomfox.ca/images"  # Foxes live at {base_url}/{n}.jpg
//! max_image_number = 123                    # n is drawn from 1..=max_image_number
//!
//! [surface]
//! width = 320                      # Fixed image width in pixels; height is auto
//! rounded_class = "rounded-2xl"    # Always applied
//! placeholder_class = "bg-gray-300" # Applied only while the placeholder shows
//!
//! [loader]
//! fallback = "load-immediately"    # or "keep-placeholder" when the host can't observe visibility
//! retarget = "reobserve"           # or "swap-immediately" when a loaded image gets a new URL
//!
//! [page]
//! title = "Fox Gallery"
//! heading = "Hello Foxes"
//! initial_count = 0                # Foxes added before the first render
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::loader::{FallbackPolicy, LoaderOptions, RetargetPolicy};
use crate::surface::SurfaceStyle;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Upper bound for `page.initial_count` and for any requested fox count.
pub const MAX_INITIAL_COUNT: usize = 1000;

/// Foxes added when neither the caller nor `page.initial_count` asks for any.
pub const DEFAULT_COUNT: usize = 6;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GalleryConfig {
    /// Where fox images come from.
    pub source: SourceConfig,
    /// How each image surface is drawn.
    pub surface: SurfaceConfig,
    /// Loader policies.
    pub loader: LoaderConfig,
    /// Page-level text and initial contents.
    pub page: PageConfig,
}

impl GalleryConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = &self.source.base_url;
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(ConfigError::Validation(
                "source.base_url must be an http(s) URL".into(),
            ));
        }
        if self.source.max_image_number == 0 {
            return Err(ConfigError::Validation(
                "source.max_image_number must be at least 1".into(),
            ));
        }
        if self.surface.width == 0 {
            return Err(ConfigError::Validation(
                "surface.width must be non-zero".into(),
            ));
        }
        if self.page.initial_count > MAX_INITIAL_COUNT {
            return Err(ConfigError::Validation(format!(
                "page.initial_count must be at most {MAX_INITIAL_COUNT}"
            )));
        }
        Ok(())
    }

    /// Number of foxes to add up front: `requested` if given, otherwise
    /// `page.initial_count`, otherwise [`DEFAULT_COUNT`].
    pub fn resolve_count(&self, requested: Option<usize>) -> Result<usize, ConfigError> {
        let count = match (requested, self.page.initial_count) {
            (Some(n), _) => n,
            (None, 0) => DEFAULT_COUNT,
            (None, n) => n,
        };
        if count > MAX_INITIAL_COUNT {
            return Err(ConfigError::Validation(format!(
                "fox count {count} exceeds the limit of {MAX_INITIAL_COUNT}"
            )));
        }
        Ok(count)
    }

    pub fn surface_style(&self) -> SurfaceStyle {
        SurfaceStyle {
            width: self.surface.width,
            rounded_class: self.surface.rounded_class.clone(),
            placeholder_class: self.surface.placeholder_class.clone(),
        }
    }

    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            style: self.surface_style(),
            fallback: self.loader.fallback,
            retarget: self.loader.retarget,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    /// Image host prefix; a fox is `{base_url}/{n}.jpg`.
    pub base_url: String,
    /// Highest image number the host serves.
    pub max_image_number: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://randomfox.ca/images".to_string(),
            max_image_number: 123,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SurfaceConfig {
    pub width: u32,
    pub rounded_class: String,
    pub placeholder_class: String,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        let style = SurfaceStyle::default();
        Self {
            width: style.width,
            rounded_class: style.rounded_class,
            placeholder_class: style.placeholder_class,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub fallback: FallbackPolicy,
    pub retarget: RetargetPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageConfig {
    pub title: String,
    pub heading: String,
    pub initial_count: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            title: "Fox Gallery".to_string(),
            heading: "Hello Foxes".to_string(),
            initial_count: 0,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Stock defaults as a TOML table, the base layer for user overrides.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(GalleryConfig::default())
        .map_err(|e| ConfigError::Validation(format!("stock defaults do not serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key by key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse config text on top of the stock defaults and validate it.
pub fn parse_config(content: &str) -> Result<GalleryConfig, ConfigError> {
    let overlay: toml::Value = toml::from_str(content)?;
    let merged = merge_toml(stock_defaults_value()?, overlay);
    let config: GalleryConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`. A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<GalleryConfig, ConfigError> {
    if !path.exists() {
        log::debug!("no config at {}, using stock defaults", path.display());
        return Ok(GalleryConfig::default());
    }
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}

/// A fully commented stock `gallery.toml`, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# Fox Gallery Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Image source
# ---------------------------------------------------------------------------
[source]
# Each fox is fetched from {base_url}/{n}.jpg.
base_url = "https://randomfox.ca/images"

# n is drawn uniformly from 1..=max_image_number.
max_image_number = 123

# ---------------------------------------------------------------------------
# Image surface
# ---------------------------------------------------------------------------
[surface]
# Fixed width in pixels. Height is always "auto".
width = 320

# Class applied to every image.
rounded_class = "rounded-2xl"

# Background tint shown behind the blank placeholder, removed once loaded.
placeholder_class = "bg-gray-300"

# ---------------------------------------------------------------------------
# Loader behavior
# ---------------------------------------------------------------------------
[loader]
# When the host cannot observe visibility:
#   "load-immediately"  show the real image right away
#   "keep-placeholder"  never load
fallback = "load-immediately"

# When a mounted image receives a new URL:
#   "reobserve"         go back to the placeholder and wait to be seen again
#   "swap-immediately"  if already loaded, show the new URL at once
retarget = "reobserve"

# ---------------------------------------------------------------------------
# Page
# ---------------------------------------------------------------------------
[page]
title = "Fox Gallery"
heading = "Hello Foxes"

# Foxes added before the first render (0-1000).
initial_count = 0
"##
}
