//! Editor configuration.
//!
//! All fields have defaults, so a config file only needs the keys it changes:
//!
//! ```json
//! { "maxZoom": 3.0, "snapToGrid": true, "storeDir": "/var/lib/leadflow" }
//! ```

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::geometry::{NodeLayout, Point};
use crate::viewport::{DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, ZoomLimits};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Factor applied per toolbar click or wheel notch.
    pub zoom_step: f32,
    /// Offset (both axes, canvas units) of a duplicated node from its original.
    pub duplicate_offset: f32,
    pub snap_to_grid: bool,
    pub grid_size: f32,
    pub node_width: f32,
    pub header_height: f32,
    pub port_spacing: f32,
    pub port_hit_radius: f32,
    pub edge_hit_tolerance: f32,
    /// Pointer travel (screen pixels) before a press on a node becomes a drag.
    pub drag_threshold: f32,
    pub history_depth: usize,
    pub store_dir: Utf8PathBuf,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            zoom_step: 1.2,
            duplicate_offset: 40.0,
            snap_to_grid: false,
            grid_size: 10.0,
            node_width: 220.0,
            header_height: 36.0,
            port_spacing: 24.0,
            port_hit_radius: 10.0,
            edge_hit_tolerance: 8.0,
            drag_threshold: 3.0,
            history_depth: 200,
            store_dir: Utf8PathBuf::from("flows"),
        }
    }
}

impl EditorConfig {
    /// Load a JSON config file.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
        let config: EditorConfig =
            serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path))?;
        if config.min_zoom <= 0.0 || config.min_zoom > config.max_zoom {
            anyhow::bail!(
                "Invalid zoom range [{}, {}] in {}",
                config.min_zoom,
                config.max_zoom,
                path
            );
        }
        Ok(config)
    }

    pub fn zoom_limits(&self) -> ZoomLimits {
        ZoomLimits {
            min: self.min_zoom,
            max: self.max_zoom,
        }
    }

    pub fn layout(&self) -> NodeLayout {
        NodeLayout {
            node_width: self.node_width,
            header_height: self.header_height,
            port_spacing: self.port_spacing,
            port_hit_radius: self.port_hit_radius,
            edge_hit_tolerance: self.edge_hit_tolerance,
        }
    }

    pub fn duplicate_offset(&self) -> Point {
        Point::new(self.duplicate_offset, self.duplicate_offset)
    }

    /// Snap a canvas position to the grid if snapping is enabled.
    pub fn snap(&self, p: Point) -> Point {
        if self.snap_to_grid && self.grid_size > 0.0 {
            Point::new(
                (p.x / self.grid_size).round() * self.grid_size,
                (p.y / self.grid_size).round() * self.grid_size,
            )
        } else {
            p
        }
    }
}
