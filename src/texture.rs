use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::{Mat3, Vec2};
use log::debug;

/// RGBA8 image plus the UV transform applied when it is sampled.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
    pub uv_transform: Mat3,
    /// When false, `uv_transform` is authoritative and is never recomputed.
    pub matrix_auto_update: bool,
}

impl Texture {
    pub fn from_rgba(path: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            pixels: Arc::from(pixels.into_boxed_slice()),
            uv_transform: Mat3::IDENTITY,
            matrix_auto_update: true,
        }
    }

    /// Single-pixel texture, handy for untextured materials and tests.
    pub fn solid(path: impl Into<String>, rgba: [u8; 4]) -> Self {
        Self::from_rgba(path, 1, 1, rgba.to_vec())
    }

    /// Pins the UV transform to `matrix` and stops automatic updates.
    pub fn set_uv_transform(&mut self, matrix: Mat3) {
        self.matrix_auto_update = false;
        self.uv_transform = matrix;
    }

    /// Maps a mesh UV through the texture transform.
    pub fn transform_uv(&self, uv: Vec2) -> Vec2 {
        self.uv_transform.transform_point2(uv)
    }
}

/// Resolves asset paths to textures. Loading is synchronous.
pub trait TextureLoader {
    fn load_texture(&self, path: &str) -> Result<Texture>;
}

impl<T> TextureLoader for Rc<T>
where
    T: TextureLoader + ?Sized,
{
    fn load_texture(&self, path: &str) -> Result<Texture> {
        (**self).load_texture(path)
    }
}

/// Loads PNG textures relative to an asset root directory.
#[derive(Debug, Clone)]
pub struct FsTextureLoader {
    root: PathBuf,
}

impl FsTextureLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TextureLoader for FsTextureLoader {
    fn load_texture(&self, path: &str) -> Result<Texture> {
        let full_path = self.root.join(path);
        let image = image::open(&full_path)
            .with_context(|| format!("unable to decode {}", full_path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        debug!("loaded texture {path} ({width}x{height})");
        Ok(Texture::from_rgba(path, width, height, image.into_raw()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uv_transform_mirrors_horizontally() {
        let mut texture = Texture::solid("face.png", [255, 255, 255, 255]);
        assert!(texture.matrix_auto_update);
        texture.set_uv_transform(Mat3::from_cols_array(&[
            -1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0,
        ]));
        assert!(!texture.matrix_auto_update);
        assert_eq!(texture.transform_uv(Vec2::new(0.25, 0.5)), Vec2::new(0.75, 0.5));
        assert_eq!(texture.transform_uv(Vec2::ZERO), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn fs_loader_decodes_png() {
        let dir = tempfile::tempdir().unwrap();
        let image = image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));
        image.save(dir.path().join("face.png")).unwrap();

        let loader = FsTextureLoader::new(dir.path());
        let texture = loader.load_texture("face.png").unwrap();
        assert_eq!((texture.width, texture.height), (4, 2));
        assert_eq!(texture.pixels.len(), 4 * 2 * 4);
        assert_eq!(&texture.pixels[..4], &[10, 20, 30, 255]);
        assert_eq!(texture.path, "face.png");
    }

    #[test]
    fn fs_loader_reports_missing_asset() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FsTextureLoader::new(dir.path());
        let err = loader.load_texture("missing.png").unwrap_err();
        assert!(format!("{err:?}").contains("missing.png"));
    }
}
