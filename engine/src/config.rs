use std::path::PathBuf;

pub const WINDOW_TITLE: &str = "Textured Quad";
pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 600;

/// Upper bound on frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

pub const VERTEX_SHADER: &str = "vert.spv";
pub const FRAGMENT_SHADER: &str = "frag.spv";
pub const TEXTURE: &str = "texture.png";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Directory holding `shaders/` and `textures/`.
    pub asset_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: WINDOW_TITLE.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            asset_root: PathBuf::from("."),
        }
    }
}

impl EngineConfig {
    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }
}
