use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, ensure, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::lighting::rgb_hex;

/// Rendering options for a backdrop. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackdropOptions {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub background: Vec3,
    pub enable_decorative_entities: bool,
    /// Directory that panorama and entity asset paths are resolved against.
    pub asset_root: PathBuf,
}

impl Default for BackdropOptions {
    fn default() -> Self {
        Self {
            fov: 85.0,
            near: 0.05,
            far: 1000.0,
            background: rgb_hex(0x324568),
            enable_decorative_entities: false,
            asset_root: PathBuf::from("assets"),
        }
    }
}

impl BackdropOptions {
    /// Parses a `<backdrop>` document. Missing tags keep their defaults.
    ///
    /// ```xml
    /// <backdrop>
    ///     <fov>70</fov>
    ///     <background>50 69 104</background>
    ///     <enableDecorativeEntities>true</enableDecorativeEntities>
    /// </backdrop>
    /// ```
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid backdrop XML")?;
        let root = document.root_element();
        if !root.has_tag_name("backdrop") {
            return Err(anyhow!(
                "expected <backdrop> root element, found <{}>",
                root.tag_name().name()
            ));
        }

        let defaults = Self::default();
        let options = Self {
            fov: parse_f32(optional_text(&root, "fov"), defaults.fov)?,
            near: parse_f32(optional_text(&root, "near"), defaults.near)?,
            far: parse_f32(optional_text(&root, "far"), defaults.far)?,
            background: parse_color(optional_text(&root, "background"), defaults.background)?,
            enable_decorative_entities: parse_bool(
                optional_text(&root, "enableDecorativeEntities"),
                defaults.enable_decorative_entities,
            )?,
            asset_root: optional_text(&root, "assetRoot")
                .map(PathBuf::from)
                .unwrap_or(defaults.asset_root),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        Self::from_xml(&xml).with_context(|| format!("invalid options in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.fov > 0.0 && self.fov < 180.0,
            "field of view must be between 0 and 180 degrees (got {})",
            self.fov
        );
        ensure!(self.near > 0.0, "near plane must be positive (got {})", self.near);
        ensure!(
            self.far > self.near,
            "far plane ({}) must lie beyond the near plane ({})",
            self.far,
            self.near
        );
        Ok(())
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

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float `{value}`: {err}")),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(anyhow!("expected a boolean, found `{other}`")),
    }
}

/// Colours are written as three 0-255 components.
fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let mut numbers = value.split_whitespace().map(str::parse::<f32>);
    let mut next = || -> Result<f32> {
        numbers
            .next()
            .ok_or_else(|| anyhow!("color is missing components"))?
            .map_err(|err| anyhow!("invalid color component: {err}"))
    };
    let (r, g, b) = (next()?, next()?, next()?);
    Ok(Vec3::new(r / 255.0, g / 255.0, b / 255.0))
}
