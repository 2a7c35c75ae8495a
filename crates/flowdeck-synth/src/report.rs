//! Human-readable topology summary.

use crate::topology::{Allocation, OutputValue, Topology};

pub fn format_topology(topology: &Topology) -> String {
    let mut out = String::new();

    out.push_str("\n╔══════════════════════════════════════════╗\n");
    out.push_str("║  Flowdeck Deployment Topology            ║\n");
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str(&format!("║  Deployment: {:<28}║\n", cell(&topology.deployment)));
    out.push_str(&format!("║  Cluster:    {:<28}║\n", cell(&topology.cluster)));
    out.push_str(&format!(
        "║  Units:      {:<28}║\n",
        cell(&format!(
            "{} persistent, {} on-demand",
            topology.units.len(),
            topology.on_demand.len()
        ))
    ));
    out.push_str("╚══════════════════════════════════════════╝\n\n");

    out.push_str("TASK DEFINITIONS:\n\n");
    for unit in &topology.units {
        let allocation = match unit.allocation {
            Allocation::Shared => "shared",
            Allocation::Dedicated => "dedicated",
        };
        out.push_str(&format!(
            "  • {} ({allocation}, {})\n",
            unit.definition.family(),
            unit.traffic.label()
        ));
        for container in unit.definition.containers() {
            let ports: Vec<String> = container.ports().map(|p| p.to_string()).collect();
            out.push_str(&format!(
                "      {:<12} {} cpu / {} MiB  ports [{}]\n",
                container.role,
                container.resources.cpu_units,
                container.resources.memory_mib,
                ports.join(", ")
            ));
        }
        out.push_str(&format!("      fingerprint {}\n", short(&unit.fingerprint)));
    }
    out.push('\n');

    out.push_str("SERVICES:\n\n");
    for service in &topology.services {
        out.push_str(&format!("  • {} → {}\n", service.name, service.family()));
        if let Some(lb) = service.load_balancer() {
            out.push_str(&format!(
                "      load balancer {} :{} → :{} (health {})\n",
                lb.name, lb.listener_port, lb.target_port, lb.health_check.path
            ));
        }
        if let Some(policy) = service.autoscaling() {
            out.push_str(&format!(
                "      autoscaling {}..{} ({} triggers)\n",
                policy.min_count,
                policy.max_count,
                policy.triggers.len()
            ));
        }
        for rule in &service.ingress {
            out.push_str(&format!(
                "      ingress {} {}-{} from {}\n",
                rule.protocol, rule.from_port, rule.to_port, rule.source_security_group
            ));
        }
    }
    out.push('\n');

    if !topology.on_demand.is_empty() {
        out.push_str("ON-DEMAND TASKS:\n\n");
        for task in &topology.on_demand {
            out.push_str(&format!("  • {}  {}\n", task.family, short(&task.fingerprint)));
            for volume in task.definition.volumes() {
                out.push_str(&format!("      volume {} ({})\n", volume.name, volume.filesystem_id));
            }
        }
        out.push('\n');
    }

    out.push_str("OUTPUTS:\n\n");
    for output in &topology.outputs {
        let value = match &output.value {
            OutputValue::Literal { .. } => "<redacted>".to_string(),
            OutputValue::Attribute { resource, attribute } => format!("{resource}.{attribute}"),
        };
        out.push_str(&format!("  {:<20} {value}\n", output.name));
    }

    out
}

const CELL_WIDTH: usize = 28;

/// Clip a header value so the box border stays aligned.
fn cell(value: &str) -> String {
    if value.chars().count() <= CELL_WIDTH {
        return value.to_string();
    }
    let mut clipped: String = value.chars().take(CELL_WIDTH - 1).collect();
    clipped.push('…');
    clipped
}

fn short(fingerprint: &str) -> &str {
    &fingerprint[..fingerprint.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::DeploymentInputs;
    use crate::pipeline::Synthesizer;

    #[test]
    fn report_lists_services_and_hides_secret() {
        let inputs = DeploymentInputs::from_config(&flowdeck_core::DeployConfig::scaffold("flow")).unwrap();
        let secret = inputs.environment.admin_secret().unwrap().to_string();
        let topology = Synthesizer::new(inputs).synthesize().unwrap();

        let report = format_topology(&topology);
        assert!(report.contains("flow-primary-service"));
        assert!(report.contains("flow-worker-service"));
        assert!(report.contains("flow-primary-nlb.DNSName"));
        assert!(report.contains("<redacted>"));
        assert!(!report.contains(&secret));
    }

    #[test]
    fn long_names_keep_the_box_aligned() {
        let name = "analytics-platform-production-eu-west";
        let inputs = DeploymentInputs::from_config(&flowdeck_core::DeployConfig::scaffold(name)).unwrap();
        let topology = Synthesizer::new(inputs).synthesize().unwrap();

        let report = format_topology(&topology);
        let header: Vec<&str> = report.lines().filter(|l| l.starts_with('║')).collect();
        assert_eq!(header.len(), 4);
        for line in header {
            assert_eq!(line.chars().count(), 44, "{line}");
            assert!(line.ends_with('║'));
        }
        assert!(report.contains("analytics-platform-producti…"));
    }
}
