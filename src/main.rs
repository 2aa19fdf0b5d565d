use anyhow::Result;

use engine::{Engine, EngineConfig};

fn main() -> Result<()> {
    pretty_env_logger::init();

    let config = EngineConfig::default().with_asset_root(env!("CARGO_MANIFEST_DIR"));
    Engine::new(config)?.run()
}
