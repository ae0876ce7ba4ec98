use serde::{Deserialize, Serialize};

/// How far the Wick expansion goes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractionMode {
    /// Only complete pairings survive: vacuum expectation values.
    #[default]
    FullyContracted,
    /// Every partial pairing, the rest kept as a normal-ordered product.
    NormalOrdered,
}

/// Limits and switches fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deepest nested commutator a single call may request.
    pub max_commutator_depth: usize,
    /// Longest operator string, bra and ket operators included.
    pub max_operators_per_term: usize,
    /// Contract and canonicalize terms on the rayon pool.
    pub parallel: bool,
    pub contraction: ContractionMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_commutator_depth: 4,
            max_operators_per_term: 24,
            parallel: true,
            contraction: ContractionMode::FullyContracted,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            EngineConfig::from_json(r#"{"max_commutator_depth": 5, "contraction": "normal_ordered"}"#)
                .unwrap();
        assert_eq!(config.max_commutator_depth, 5);
        assert_eq!(config.contraction, ContractionMode::NormalOrdered);
        assert_eq!(config.max_operators_per_term, 24);
        assert!(config.parallel);
    }

    #[test]
    fn json_round_trip() {
        let config = EngineConfig {
            parallel: false,
            ..Default::default()
        };
        let back = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn unknown_mode_is_an_error() {
        assert!(EngineConfig::from_json(r#"{"contraction": "partial"}"#).is_err());
    }
}
