use std::path::Path;

use anyhow::bail;
use flowdeck_core::DeployConfig;

pub fn init(path: &str, name: &str) -> anyhow::Result<()> {
    let output = Path::new(path).join("flowdeck.toml");
    if output.exists() {
        bail!("{} already exists", output.display());
    }

    let config = DeployConfig::scaffold(name);
    std::fs::write(&output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}
