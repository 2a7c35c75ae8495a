use std::path::Path;

use anyhow::{Context, bail};
use tracing::info;

pub fn synth(config: &str, format: &str, output: Option<&str>) -> anyhow::Result<()> {
    let topology = super::synthesize(config)?;

    if let Some(output) = output {
        let path = Path::new(output);
        std::fs::write(path, topology.to_json()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "topology written");
        println!("✓ Wrote {}", path.display());
        return Ok(());
    }

    match format {
        "json" => println!("{}", topology.to_json()?),
        "text" => println!("{}", flowdeck_synth::format_topology(&topology)),
        other => bail!("unknown output format '{other}' (expected text or json)"),
    }

    Ok(())
}
