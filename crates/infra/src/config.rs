//! Configuration loading and representation.

use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

use stowage_inventory::InventoryType;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Engine and worker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    /// Lifetime of every reservation hold. Callers cannot extend it.
    pub reservation_ttl: Duration,
    pub sweep_interval: StdDuration,
    /// Upper bound for capacity increases.
    pub max_capacity: u32,
    pub default_capacity: DefaultCapacities,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DefaultCapacities {
    pub equip: u32,
    pub use_: u32,
    pub setup: u32,
    pub etc: u32,
    pub cash: u32,
}

impl DefaultCapacities {
    pub fn for_type(&self, inventory_type: InventoryType) -> u32 {
        match inventory_type {
            InventoryType::Equip => self.equip,
            InventoryType::Use => self.use_,
            InventoryType::Setup => self.setup,
            InventoryType::Etc => self.etc,
            InventoryType::Cash => self.cash,
        }
    }
}

impl Default for DefaultCapacities {
    fn default() -> Self {
        Self {
            equip: 24,
            use_: 24,
            setup: 24,
            etc: 24,
            cash: 96,
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::milliseconds(30_000),
            sweep_interval: StdDuration::from_millis(1_000),
            max_capacity: 96,
            default_capacity: DefaultCapacities::default(),
        }
    }
}

impl InventoryConfig {
    /// Read settings from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; missing keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let caps = defaults.default_capacity;

        let ttl_ms = parse(&lookup, "RESERVATION_TTL_MS", 30_000u64)?;
        let sweep_ms = parse(&lookup, "RESERVATION_SWEEP_INTERVAL_MS", 1_000u64)?;
        let reservation_ttl = i64::try_from(ttl_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::milliseconds)
            .ok_or(ConfigError::Invalid {
                key: "RESERVATION_TTL_MS",
                value: ttl_ms.to_string(),
            })?;
        if sweep_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "RESERVATION_SWEEP_INTERVAL_MS",
                value: sweep_ms.to_string(),
            });
        }

        let config = Self {
            reservation_ttl,
            sweep_interval: StdDuration::from_millis(sweep_ms),
            max_capacity: parse(&lookup, "COMPARTMENT_MAX_CAPACITY", defaults.max_capacity)?,
            default_capacity: DefaultCapacities {
                equip: parse(&lookup, "DEFAULT_CAPACITY_EQUIP", caps.equip)?,
                use_: parse(&lookup, "DEFAULT_CAPACITY_USE", caps.use_)?,
                setup: parse(&lookup, "DEFAULT_CAPACITY_SETUP", caps.setup)?,
                etc: parse(&lookup, "DEFAULT_CAPACITY_ETC", caps.etc)?,
                cash: parse(&lookup, "DEFAULT_CAPACITY_CASH", caps.cash)?,
            },
        };

        for t in InventoryType::ALL {
            let capacity = config.default_capacity.for_type(t);
            if capacity == 0 || capacity > config.max_capacity {
                return Err(ConfigError::Invalid {
                    key: capacity_key(t),
                    value: capacity.to_string(),
                });
            }
        }
        Ok(config)
    }
}

fn capacity_key(inventory_type: InventoryType) -> &'static str {
    match inventory_type {
        InventoryType::Equip => "DEFAULT_CAPACITY_EQUIP",
        InventoryType::Use => "DEFAULT_CAPACITY_USE",
        InventoryType::Setup => "DEFAULT_CAPACITY_SETUP",
        InventoryType::Etc => "DEFAULT_CAPACITY_ETC",
        InventoryType::Cash => "DEFAULT_CAPACITY_CASH",
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
