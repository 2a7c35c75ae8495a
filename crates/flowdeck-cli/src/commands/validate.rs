pub fn validate(config: &str) -> anyhow::Result<()> {
    let topology = super::synthesize(config)?;

    println!(
        "✓ {config} is valid: {} task definitions, {} services, {} on-demand",
        topology.units.len(),
        topology.services.len(),
        topology.on_demand.len()
    );
    Ok(())
}
