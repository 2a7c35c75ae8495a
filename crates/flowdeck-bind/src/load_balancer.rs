//! Public load balancer binding.
//!
//! The single public entry point: an internet-facing, cross-zone network
//! load balancer forwarding the listener port to the public container's
//! traffic port, with an HTTP health check against that same port.

use serde::{Deserialize, Serialize};

/// Health check protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthProtocol {
    Http,
}

/// Port a health check probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckPort {
    /// The same port the target receives traffic on.
    TrafficPort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub protocol: HealthProtocol,
    pub path: String,
    pub port: HealthCheckPort,
}

/// Operator-tunable load balancer parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerSettings {
    pub listener_port: u16,
    pub health_path: String,
    /// Seconds in-flight requests get to drain before a replaced target
    /// leaves rotation.
    pub deregistration_delay_secs: u64,
}

impl Default for LoadBalancerSettings {
    fn default() -> Self {
        Self {
            listener_port: 80,
            health_path: "/health".to_string(),
            deregistration_delay_secs: 60,
        }
    }
}

/// Load balancer attached to the public service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerBinding {
    pub name: String,
    pub internet_facing: bool,
    pub cross_zone: bool,
    pub listener_port: u16,
    pub target_port: u16,
    pub health_check: HealthCheck,
    pub deregistration_delay_secs: u64,
}

impl LoadBalancerBinding {
    pub fn new(family: &str, target_port: u16, settings: &LoadBalancerSettings) -> Self {
        Self {
            name: format!("{family}-nlb"),
            internet_facing: true,
            cross_zone: true,
            listener_port: settings.listener_port,
            target_port,
            health_check: HealthCheck {
                protocol: HealthProtocol::Http,
                path: settings.health_path.clone(),
                port: HealthCheckPort::TrafficPort,
            },
            deregistration_delay_secs: settings.deregistration_delay_secs,
        }
    }

    /// Attribute of this load balancer holding its public DNS name.
    pub fn dns_name_attribute(&self) -> (&str, &'static str) {
        (&self.name, "DNSName")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binding_matches_front_door_contract() {
        let lb = LoadBalancerBinding::new("flow-primary", 8080, &LoadBalancerSettings::default());

        assert_eq!(lb.name, "flow-primary-nlb");
        assert!(lb.internet_facing);
        assert!(lb.cross_zone);
        assert_eq!(lb.listener_port, 80);
        assert_eq!(lb.target_port, 8080);
        assert_eq!(lb.health_check.protocol, HealthProtocol::Http);
        assert_eq!(lb.health_check.path, "/health");
        assert_eq!(lb.health_check.port, HealthCheckPort::TrafficPort);
        assert_eq!(lb.deregistration_delay_secs, 60);
    }

    #[test]
    fn settings_override_defaults() {
        let settings = LoadBalancerSettings {
            listener_port: 8443,
            health_path: "/healthz".to_string(),
            deregistration_delay_secs: 15,
        };
        let lb = LoadBalancerBinding::new("flow-primary", 8080, &settings);
        assert_eq!(lb.listener_port, 8443);
        assert_eq!(lb.health_check.path, "/healthz");
        assert_eq!(lb.deregistration_delay_secs, 15);
        assert_eq!(lb.dns_name_attribute(), ("flow-primary-nlb", "DNSName"));
    }

    #[test]
    fn health_check_serializes_protocol_uppercase() {
        let lb = LoadBalancerBinding::new("flow-primary", 8080, &LoadBalancerSettings::default());
        let json = serde_json::to_string(&lb.health_check).unwrap();
        assert!(json.contains("\"HTTP\""));
        assert!(json.contains("traffic_port"));
    }
}
