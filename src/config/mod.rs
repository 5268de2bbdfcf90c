use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const MERGE_FALLBACK_VAR: &str = "FEDPLAN_MERGE_FALLBACK";
pub const MAX_JOIN_STAGES_VAR: &str = "FEDPLAN_MAX_JOIN_STAGES";

const DEFAULT_MAX_JOIN_STAGES: usize = 16;

/// What to do with a merge stage no branch connector can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MergeFallback {
    /// The dispatcher merges the partial results itself.
    #[default]
    Coordinator,
    /// Planning fails with NoCommonConnector.
    Reject,
}

impl FromStr for MergeFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coordinator" => Ok(MergeFallback::Coordinator),
            "reject" => Ok(MergeFallback::Reject),
            other => Err(format!("unknown merge fallback '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub merge_fallback: MergeFallback,
    pub max_join_stages: usize,
}

impl PlannerConfig {
    pub fn new() -> PlannerConfig {
        PlannerConfig::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Missing or unparseable values use the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PlannerConfig {
        let merge_fallback = match lookup(MERGE_FALLBACK_VAR) {
            Some(val) => val.parse::<MergeFallback>().unwrap_or_default(),
            None => MergeFallback::default(),
        };
        let max_join_stages = match lookup(MAX_JOIN_STAGES_VAR) {
            Some(val) => val.trim().parse::<usize>().unwrap_or(DEFAULT_MAX_JOIN_STAGES),
            None => DEFAULT_MAX_JOIN_STAGES,
        };
        PlannerConfig {
            merge_fallback,
            max_join_stages,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            merge_fallback: MergeFallback::Coordinator,
            max_join_stages: DEFAULT_MAX_JOIN_STAGES,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_without_variables() {
        let config = PlannerConfig::from_lookup(|_| None);
        assert_eq!(config, PlannerConfig::default());
        assert_eq!(config.max_join_stages, 16);
        assert_eq!(config.merge_fallback, MergeFallback::Coordinator);
    }

    #[test]
    fn test_values_from_lookup() {
        let config = PlannerConfig::from_lookup(|key| match key {
            MERGE_FALLBACK_VAR => Some(" Reject ".to_string()),
            MAX_JOIN_STAGES_VAR => Some("3".to_string()),
            _ => None,
        });
        assert_eq!(config.merge_fallback, MergeFallback::Reject);
        assert_eq!(config.max_join_stages, 3);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = PlannerConfig::from_lookup(|_| Some("lots".to_string()));
        assert_eq!(config, PlannerConfig::default());
    }
}
