use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use log::*;

use crate::error::EngineError;

/// Supplies compiled SPIR-V for a named shader module.
pub trait ShaderSource {
    fn load(&self, name: &str) -> Result<Vec<u8>>;
}

/// Supplies decoded RGBA8 pixels for a named texture.
pub trait TextureSource {
    fn load(&self, name: &str) -> Result<TexturePixels>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TexturePixels {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TexturePixels {
    pub fn byte_len(&self) -> u64 {
        self.pixels.len() as u64
    }

    /// Requires a non-empty image with exactly four bytes per texel.
    pub fn validate(&self, name: &str) -> Result<()> {
        let expected = u64::from(self.width) * u64::from(self.height) * 4;

        let reason = if self.width == 0 || self.height == 0 {
            format!("image is empty ({}x{})", self.width, self.height)
        } else if self.byte_len() != expected {
            format!(
                "{} bytes of pixel data for a {}x{} RGBA8 image, expected {}",
                self.byte_len(),
                self.width,
                self.height,
                expected
            )
        } else {
            return Ok(());
        };

        Err(EngineError::TextureLoad {
            path: PathBuf::from(name),
            reason,
        }
        .into())
    }
}

/// Reads `<root>/shaders/<name>` from disk.
#[derive(Clone, Debug)]
pub struct FileShaderSource {
    root: PathBuf,
}

impl FileShaderSource {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            root: asset_root.into().join("shaders"),
        }
    }
}

impl ShaderSource for FileShaderSource {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.root.join(name);
        debug!("Loading shader bytecode from `{}`.", path.display());

        fs::read(&path).map_err(|e| {
            EngineError::ShaderLoad {
                path,
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Decodes `<root>/textures/<name>` with the `image` crate.
#[derive(Clone, Debug)]
pub struct FileTextureSource {
    root: PathBuf,
}

impl FileTextureSource {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            root: asset_root.into().join("textures"),
        }
    }
}

impl TextureSource for FileTextureSource {
    fn load(&self, name: &str) -> Result<TexturePixels> {
        let path = self.root.join(name);
        debug!("Decoding texture from `{}`.", path.display());

        let decoded = image::open(&path).map_err(|e| EngineError::TextureLoad {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let rgba = decoded.to_rgba8();

        Ok(TexturePixels {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("engine-assets-{}-{}", name, std::process::id()));
        fs::create_dir_all(dir.join("shaders")).unwrap();
        fs::create_dir_all(dir.join("textures")).unwrap();
        dir
    }

    fn kind(error: &anyhow::Error) -> &EngineError {
        error.downcast_ref::<EngineError>().unwrap()
    }

    #[test]
    fn missing_shader_is_a_load_error() {
        let source = FileShaderSource::new(Path::new("/nonexistent/asset/root"));
        let error = source.load("vert.spv").unwrap_err();

        assert!(matches!(kind(&error), EngineError::ShaderLoad { .. }));
    }

    #[test]
    fn shader_bytes_are_returned_verbatim() {
        let root = scratch_dir("shader");
        let bytes = vec![0x03, 0x02, 0x23, 0x07, 0, 0, 1, 0];
        fs::write(root.join("shaders").join("test.spv"), &bytes).unwrap();

        let loaded = FileShaderSource::new(&root).load("test.spv").unwrap();
        assert_eq!(loaded, bytes);

        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn texture_decodes_to_rgba8() {
        let root = scratch_dir("texture");
        let image = image::RgbImage::from_fn(3, 2, |x, y| image::Rgb([x as u8, y as u8, 7]));
        image.save(root.join("textures").join("tiny.png")).unwrap();

        let texture = FileTextureSource::new(&root).load("tiny.png").unwrap();
        assert_eq!((texture.width, texture.height), (3, 2));
        assert_eq!(texture.byte_len(), 3 * 2 * 4);
        // Second pixel of the first row, alpha filled in as opaque.
        assert_eq!(&texture.pixels[4..8], &[1, 0, 7, 255]);
        texture.validate("tiny.png").unwrap();

        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn undecodable_texture_is_a_load_error() {
        let root = scratch_dir("garbage");
        fs::write(root.join("textures").join("broken.png"), b"not a png").unwrap();

        let error = FileTextureSource::new(&root).load("broken.png").unwrap_err();
        assert!(matches!(kind(&error), EngineError::TextureLoad { .. }));

        fs::remove_dir_all(root).ok();
    }

    #[test]
    fn short_pixel_buffer_is_rejected() {
        let texture = TexturePixels {
            width: 4,
            height: 4,
            pixels: vec![0; 4 * 4 * 4 - 1],
        };

        let error = texture.validate("short.png").unwrap_err();
        match kind(&error) {
            EngineError::TextureLoad { path, reason } => {
                assert_eq!(path, &PathBuf::from("short.png"));
                assert!(reason.contains("expected 64"), "{}", reason);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn empty_image_is_rejected() {
        for (width, height) in [(0, 0), (0, 8), (8, 0)] {
            let texture = TexturePixels {
                width,
                height,
                pixels: Vec::new(),
            };

            let error = texture.validate("empty.png").unwrap_err();
            assert!(matches!(kind(&error), EngineError::TextureLoad { .. }));
        }
    }
}
