//! Autoscaling policy for internal pools.
//!
//! Declarative only: the hosting platform's control loop evaluates the
//! triggers. A policy always carries min/max bounds; CPU and memory
//! triggers are attached independently, so a policy can have two, one or
//! no triggers. With none, the pool stays inside its bounds but never
//! scales on its own.
//!
//! Each trigger uses the same cooldown for scale-in and scale-out to keep
//! the pool from oscillating.

use serde::{Deserialize, Serialize};

use crate::error::{BindError, BindResult};

pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMetric {
    CpuUtilization,
    MemoryUtilization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingTrigger {
    pub metric: ScalingMetric,
    pub target_percent: u32,
    pub scale_in_cooldown_secs: u64,
    pub scale_out_cooldown_secs: u64,
}

/// Operator-supplied scaling parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoscalingSettings {
    pub min_count: u32,
    pub max_count: u32,
    pub cpu_target_percent: Option<u32>,
    pub memory_target_percent: Option<u32>,
    pub cooldown_secs: u64,
}

impl Default for AutoscalingSettings {
    fn default() -> Self {
        Self {
            min_count: 1,
            max_count: 1,
            cpu_target_percent: None,
            memory_target_percent: None,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
        }
    }
}

impl AutoscalingSettings {
    pub fn validate(&self) -> BindResult<()> {
        if self.max_count == 0 {
            return Err(BindError::InvalidScaling("max_count must be at least 1".to_string()));
        }
        if self.min_count > self.max_count {
            return Err(BindError::InvalidScaling(format!(
                "min_count {} exceeds max_count {}",
                self.min_count, self.max_count
            )));
        }
        for (name, target) in [
            ("cpu_target_percent", self.cpu_target_percent),
            ("memory_target_percent", self.memory_target_percent),
        ] {
            if let Some(t) = target
                && !(1..=100).contains(&t)
            {
                return Err(BindError::InvalidScaling(format!(
                    "{name} must be within 1..=100, got {t}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscalingPolicy {
    pub min_count: u32,
    pub max_count: u32,
    pub triggers: Vec<ScalingTrigger>,
}

impl AutoscalingPolicy {
    pub fn from_settings(settings: &AutoscalingSettings) -> BindResult<Self> {
        settings.validate()?;

        let trigger = |metric, target_percent| ScalingTrigger {
            metric,
            target_percent,
            scale_in_cooldown_secs: settings.cooldown_secs,
            scale_out_cooldown_secs: settings.cooldown_secs,
        };

        let triggers = [
            settings
                .cpu_target_percent
                .map(|t| trigger(ScalingMetric::CpuUtilization, t)),
            settings
                .memory_target_percent
                .map(|t| trigger(ScalingMetric::MemoryUtilization, t)),
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(Self {
            min_count: settings.min_count,
            max_count: settings.max_count,
            triggers,
        })
    }

    pub fn trigger(&self, metric: ScalingMetric) -> Option<&ScalingTrigger> {
        self.triggers.iter().find(|t| t.metric == metric)
    }

    /// Whether the platform will ever change the count on its own.
    pub fn scales_automatically(&self) -> bool {
        !self.triggers.is_empty() && self.min_count < self.max_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(cpu: Option<u32>, mem: Option<u32>) -> AutoscalingSettings {
        AutoscalingSettings {
            min_count: 1,
            max_count: 5,
            cpu_target_percent: cpu,
            memory_target_percent: mem,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
        }
    }

    #[test]
    fn both_targets_yield_two_triggers() {
        let policy = AutoscalingPolicy::from_settings(&settings(Some(70), Some(80))).unwrap();
        assert_eq!(policy.triggers.len(), 2);
        assert_eq!(policy.trigger(ScalingMetric::CpuUtilization).unwrap().target_percent, 70);
        assert_eq!(policy.trigger(ScalingMetric::MemoryUtilization).unwrap().target_percent, 80);
        assert!(policy.scales_automatically());
    }

    #[test]
    fn memory_only_yields_single_memory_trigger() {
        let policy = AutoscalingPolicy::from_settings(&settings(None, Some(75))).unwrap();
        assert_eq!(policy.triggers.len(), 1);
        let t = &policy.triggers[0];
        assert_eq!(t.metric, ScalingMetric::MemoryUtilization);
        assert_eq!(t.scale_in_cooldown_secs, 60);
        assert_eq!(t.scale_out_cooldown_secs, 60);
    }

    #[test]
    fn no_targets_keeps_bounds_without_scaling() {
        let policy = AutoscalingPolicy::from_settings(&settings(None, None)).unwrap();
        assert!(policy.triggers.is_empty());
        assert_eq!((policy.min_count, policy.max_count), (1, 5));
        assert!(!policy.scales_automatically());
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let mut s = settings(Some(70), None);
        s.min_count = 6;
        assert!(matches!(
            AutoscalingPolicy::from_settings(&s),
            Err(BindError::InvalidScaling(_))
        ));

        let s = settings(Some(0), None);
        assert!(s.validate().is_err());
        let s = settings(None, Some(150));
        assert!(s.validate().is_err());
    }

    #[test]
    fn default_settings_are_a_fixed_single_instance() {
        let policy = AutoscalingPolicy::from_settings(&AutoscalingSettings::default()).unwrap();
        assert_eq!((policy.min_count, policy.max_count), (1, 1));
        assert!(!policy.scales_automatically());
    }
}
