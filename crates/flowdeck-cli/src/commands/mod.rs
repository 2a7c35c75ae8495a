pub mod init;
pub mod synth;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use flowdeck_core::DeployConfig;
use flowdeck_synth::{DeploymentInputs, Synthesizer, Topology};

/// Load `flowdeck.toml` and run the full pipeline.
pub(crate) fn synthesize(config_path: &str) -> anyhow::Result<Topology> {
    let path = Path::new(config_path);
    let config = DeployConfig::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let inputs = DeploymentInputs::from_config(&config)?;
    Ok(Synthesizer::new(inputs).synthesize()?)
}
