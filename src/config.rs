// SPDX-License-Identifier: GPL-3.0-only

use crate::capture::types::SessionPreset;
use crate::constants::{app_info, layout};
use crate::errors::{PickerError, PickerResult};
use crate::grid::geometry::ScrollDirection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Capture behaviour of the picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// What the session is configured to capture
    pub preset: SessionPreset,
    pub saves_captured_photos_to_library: bool,
    pub saves_captured_live_photos_to_library: bool,
    pub saves_captured_videos_to_library: bool,
    /// Directory for recordings and live photo companion movies
    /// (process temp directory when unset)
    pub temp_dir: Option<PathBuf>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            preset: SessionPreset::Photos,
            saves_captured_photos_to_library: true,
            saves_captured_live_photos_to_library: true,
            saves_captured_videos_to_library: true,
            temp_dir: None,
        }
    }
}

impl CaptureSettings {
    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Which sections the grid shows and how its cells are sized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfiguration {
    pub shows_first_action_item: bool,
    pub shows_second_action_item: bool,
    pub shows_camera_item: bool,
    pub scroll_direction: ScrollDirection,
    /// Asset cells across the scroll axis
    pub asset_items_per_line: usize,
    pub interitem_spacing: f64,
    /// Gap after the action and camera sections
    pub action_section_spacing: f64,
}

impl Default for LayoutConfiguration {
    fn default() -> Self {
        Self {
            shows_first_action_item: true,
            shows_second_action_item: true,
            shows_camera_item: true,
            scroll_direction: ScrollDirection::Horizontal,
            asset_items_per_line: layout::DEFAULT_ASSET_ITEMS_PER_LINE,
            interitem_spacing: layout::DEFAULT_INTERITEM_SPACING,
            action_section_spacing: layout::DEFAULT_ACTION_SECTION_SPACING,
        }
    }
}

impl LayoutConfiguration {
    pub fn action_item_count(&self) -> usize {
        usize::from(self.shows_first_action_item) + usize::from(self.shows_second_action_item)
    }

    pub fn section_index_actions(&self) -> usize {
        layout::SECTION_INDEX_ACTIONS
    }

    pub fn section_index_camera(&self) -> usize {
        layout::SECTION_INDEX_CAMERA
    }

    pub fn section_index_assets(&self) -> usize {
        layout::SECTION_INDEX_ASSETS
    }
}

/// RGBA color, stored as `#rrggbb` or `#rrggbbaa`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const SYSTEM_BLUE: Color = Color::rgb(0, 122, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let hex = value
            .strip_prefix('#')
            .ok_or_else(|| format!("color '{}' must start with '#'", value))?;
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(format!("color '{}' must have 6 or 8 hex digits", value));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| format!("color '{}' is not valid hex", value))
        };
        Ok(Color {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if hex.len() == 8 { channel(6)? } else { 255 },
        })
    }
}

impl From<Color> for String {
    fn from(c: Color) -> String {
        if c.a == 255 {
            format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", c.r, c.g, c.b, c.a)
        }
    }
}

/// Styling overrides; unset fields fall back to the next level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Appearance {
    pub background_color: Option<Color>,
    pub selection_color: Option<Color>,
    pub cell_corner_radius: Option<f64>,
}

/// Appearance with every field decided
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedAppearance {
    pub background_color: Color,
    pub selection_color: Color,
    pub cell_corner_radius: f64,
}

impl Default for ResolvedAppearance {
    fn default() -> Self {
        Self {
            background_color: Color::WHITE,
            selection_color: Color::SYSTEM_BLUE,
            cell_corner_radius: 0.0,
        }
    }
}

impl Appearance {
    /// Resolve instance overrides over `global`, then the built-in defaults
    pub fn resolve(&self, global: &Appearance) -> ResolvedAppearance {
        let builtin = ResolvedAppearance::default();
        ResolvedAppearance {
            background_color: self
                .background_color
                .or(global.background_color)
                .unwrap_or(builtin.background_color),
            selection_color: self
                .selection_color
                .or(global.selection_color)
                .unwrap_or(builtin.selection_color),
            cell_corner_radius: self
                .cell_corner_radius
                .or(global.cell_corner_radius)
                .unwrap_or(builtin.cell_corner_radius),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureSettings,
    pub layout: LayoutConfiguration,
    pub appearance: Appearance,
}

impl Config {
    /// `<config dir>/image-picker/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(app_info::CONFIG_DIR_NAME)
                .join(app_info::CONFIG_FILE_NAME)
        })
    }

    /// Read the config at `path`, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> PickerResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        info!(path = %path.display(), preset = ?config.capture.preset, "Loaded config");
        Ok(config)
    }

    /// Read the config from [`default_path`](Self::default_path)
    pub fn load_default() -> PickerResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> PickerResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(PickerError::ConfigFile)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_hex_round_trip() {
        let color = Color::try_from("#007aff".to_string()).unwrap();
        assert_eq!(color, Color::SYSTEM_BLUE);
        assert_eq!(String::from(color), "#007aff");

        let translucent = Color::try_from("#00000080".to_string()).unwrap();
        assert_eq!(translucent.a, 0x80);
        assert!(Color::try_from("007aff".to_string()).is_err());
        assert!(Color::try_from("#07af".to_string()).is_err());
    }

    #[test]
    fn test_appearance_precedence() {
        let global = Appearance {
            background_color: Some(Color::BLACK),
            cell_corner_radius: Some(4.0),
            ..Default::default()
        };
        let instance = Appearance {
            cell_corner_radius: Some(8.0),
            ..Default::default()
        };

        let resolved = instance.resolve(&global);
        assert_eq!(resolved.background_color, Color::BLACK);
        assert_eq!(resolved.selection_color, Color::SYSTEM_BLUE);
        assert_eq!(resolved.cell_corner_radius, 8.0);
    }

    #[test]
    fn test_action_item_count() {
        let mut layout = LayoutConfiguration::default();
        assert_eq!(layout.action_item_count(), 2);
        layout.shows_second_action_item = false;
        assert_eq!(layout.action_item_count(), 1);
    }
}
