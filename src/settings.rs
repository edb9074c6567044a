//! Application settings (spec §6.2): a single `appsettings.json` object
//! tolerant of unknown/missing fields across versions.
//!
//! Grounded on the teacher's `snapshot.rs` whole-file JSON read/write
//! convention, same as [`crate::profile_store`].

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrayIconKind {
    Default,
    Minimal,
    Colored,
}

impl Default for TrayIconKind {
    fn default() -> Self {
        TrayIconKind::Default
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub maximized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub last_used_profile_id: Option<String>,
    pub auto_load_last_profile: bool,
    pub theme: String,
    pub ui_font_scale: f32,
    pub last_sc_export_profile_name: Option<String>,
    pub last_sc_export_per_environment: HashMap<String, String>,
    pub window_geometry: WindowGeometry,
    pub close_to_tray: bool,
    pub tray_icon: TrayIconKind,
    /// Maps a virtual slot id to a device-map key the UI uses to pick a
    /// controller silhouette image for that slot.
    pub slot_silhouettes: HashMap<u8, String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            last_used_profile_id: None,
            auto_load_last_profile: false,
            theme: "dark".to_string(),
            ui_font_scale: 1.0,
            last_sc_export_profile_name: None,
            last_sc_export_per_environment: HashMap::new(),
            window_geometry: WindowGeometry::default(),
            close_to_tray: true,
            tray_icon: TrayIconKind::default(),
            slot_silhouettes: HashMap::new(),
        }
    }
}

impl AppSettings {
    /// Load from `path`, falling back to defaults when the file is absent
    /// or unparseable rather than failing startup over a settings file
    /// (spec §6.2 is a convenience surface, not part of the hot path).
    pub fn load_or_default(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_tolerated_on_load() {
        let json = r#"{
            "last_used_profile_id": "p1",
            "auto_load_last_profile": true,
            "theme": "dark",
            "ui_font_scale": 1.25,
            "last_sc_export_profile_name": null,
            "last_sc_export_per_environment": {},
            "window_geometry": {"x": 0, "y": 0, "width": 800, "height": 600, "maximized": false},
            "close_to_tray": true,
            "tray_icon": "minimal",
            "slot_silhouettes": {},
            "future_field_from_a_newer_build": 42
        }"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.last_used_profile_id.as_deref(), Some("p1"));
        assert_eq!(settings.tray_icon, TrayIconKind::Minimal);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let settings = AppSettings::load_or_default(Path::new("/nonexistent/appsettings.json"));
        assert!(!settings.auto_load_last_profile);
        assert_eq!(settings.theme, "dark");
    }
}
