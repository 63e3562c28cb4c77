//! World configuration.
//!
//! [`WorldConfig`] carries the capacity knobs of a [`World`](crate::world::World).
//! Every field has a default, so a config file only needs the values it
//! overrides:
//!
//! ```
//! use tessera_ecs::config::WorldConfig;
//!
//! let config = WorldConfig::from_json_str(r#"{ "min_group_capacity": 64 }"#).unwrap();
//! assert_eq!(config.min_group_capacity, 64);
//! assert_eq!(config.entity_capacity, 0);
//! ```

use serde::Deserialize;

use crate::archetype::DEFAULT_MIN_CAPACITY;
use crate::EcsError;

/// Tunable capacities for a world.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Row capacity an archetype allocates on its first row. Later growth doubles.
    pub min_group_capacity: usize,
    /// Number of entities the entity index and record table reserve up front.
    pub entity_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            min_group_capacity: DEFAULT_MIN_CAPACITY,
            entity_capacity: 0,
        }
    }
}

impl WorldConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, EcsError> {
        let config: WorldConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the storage cannot work with.
    pub fn validate(&self) -> Result<(), EcsError> {
        if self.min_group_capacity == 0 {
            return Err(EcsError::InvalidConfig {
                field: "min_group_capacity",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}
