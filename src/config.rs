use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::assets::AssetPaths;

/// Number of crystals in the ring.
pub const COUNT: usize = 12;
/// Ring radius in world units.
pub const RADIUS: f32 = 30.0;
/// Period of the camera retarget timer.
pub const RETARGET_INTERVAL: Duration = Duration::from_millis(3000);

/// Tunables of the sketch. Defaults reproduce the reference scene; an XML
/// file can override any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SketchConfig {
    pub count: usize,
    pub radius: f32,
    pub retarget_interval_ms: u64,
    pub camera_aspect: f32,
    pub camera_far: f32,
    pub focal_length: f32,
    /// Linear RGB in `0..1`.
    pub clear_color: Vec3,
    pub clear_alpha: f32,
    pub model_path: String,
    pub normal_map_path: String,
    pub surface_map_path: String,
    /// Id of the canvas element used by the browser build.
    pub canvas_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            count: COUNT,
            radius: RADIUS,
            retarget_interval_ms: RETARGET_INTERVAL.as_millis() as u64,
            camera_aspect: 3.0 / 2.0,
            camera_far: 1000.0,
            focal_length: 50.0,
            clear_color: Vec3::splat(14.0 / 255.0),
            clear_alpha: 1.0,
            model_path: "model/crystal.obj".to_string(),
            normal_map_path: "img/normal.jpg".to_string(),
            surface_map_path: "img/surface.jpg".to_string(),
            canvas_id: "canvas-webgl".to_string(),
            log_filter: None,
        }
    }
}

impl SketchConfig {
    /// Parses a `<sketch>` document. Missing tags keep their defaults.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid sketch XML")?;
        let root = document.root_element();
        if !root.has_tag_name("sketch") {
            return Err(anyhow!(
                "expected <sketch> root element, found <{}>",
                root.tag_name().name()
            ));
        }

        let mut config = Self::default();
        config.count = parse_number(optional_text(&root, "count"), config.count)?;
        config.radius = parse_number(optional_text(&root, "radius"), config.radius)?;
        config.retarget_interval_ms =
            parse_number(optional_text(&root, "interval"), config.retarget_interval_ms)?;
        config.camera_aspect = parse_number(optional_text(&root, "aspect"), config.camera_aspect)?;
        config.camera_far = parse_number(optional_text(&root, "far"), config.camera_far)?;
        config.focal_length =
            parse_number(optional_text(&root, "focal_length"), config.focal_length)?;
        config.clear_color = parse_color(optional_text(&root, "clear_color"), config.clear_color)?;
        config.clear_alpha = parse_number(optional_text(&root, "clear_alpha"), config.clear_alpha)?;
        if let Some(path) = optional_text(&root, "model") {
            config.model_path = path;
        }
        if let Some(path) = optional_text(&root, "normal_map") {
            config.normal_map_path = path;
        }
        if let Some(path) = optional_text(&root, "surface_map") {
            config.surface_map_path = path;
        }
        if let Some(id) = optional_text(&root, "canvas") {
            config.canvas_id = id;
        }
        config.log_filter = optional_text(&root, "log").or(config.log_filter);

        if config.count == 0 {
            return Err(anyhow!("<count> must be at least 1"));
        }
        if config.camera_aspect <= 0.0 {
            return Err(anyhow!("<aspect> must be positive"));
        }
        Ok(config)
    }

    pub fn retarget_interval(&self) -> Duration {
        Duration::from_millis(self.retarget_interval_ms)
    }

    pub fn asset_paths(&self) -> AssetPaths {
        AssetPaths {
            model: self.model_path.clone(),
            normal_map: self.normal_map_path.clone(),
            surface_map: self.surface_map_path.clone(),
        }
    }
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_number<T>(value: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => value
            .parse::<T>()
            .map_err(|err| anyhow!("failed to parse number {value:?}: {err}")),
        None => Ok(default),
    }
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let mut numbers = value
        .split_whitespace()
        .filter_map(|component| component.parse::<f32>().ok());
    let mut next = || {
        numbers
            .next()
            .ok_or_else(|| anyhow!("color is missing components"))
    };
    let r = next()?;
    let g = next()?;
    let b = next()?;
    Ok(Vec3::new(r / 255.0, g / 255.0, b / 255.0))
}
