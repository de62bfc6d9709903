use crate::{
    avci::{AvciConfig, AvciEngine, AvciState, DEFAULT_AVCI_WINDOW_MS},
    error::StatisticError,
    imbalance::{
        DEFAULT_QI_K_LEVELS, DEFAULT_QI_WINDOW_MS, QueueImbalanceConfig, QueueImbalanceEngine,
        QueueImbalanceState,
    },
    markout::{
        DEFAULT_MARKOUT_TAU_MS, DEFAULT_MARKOUT_WINDOW_MS, HorizonType, MarkoutConfig,
        MarkoutEngine, MarkoutState,
    },
    snapshot::Snapshot,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// Configuration of every statistic engine for one instrument.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize)]
pub struct MicrostructureConfig {
    pub avci: AvciConfig,
    pub queue_imbalance: QueueImbalanceConfig,
    pub markout: MarkoutConfig,
}

impl MicrostructureConfig {
    /// Load from environment variables, falling back to defaults for any that are missing or
    /// unparseable.
    ///
    /// | Variable             | Default  |
    /// |----------------------|----------|
    /// | `AVCI_WINDOW_MS`     | 10000    |
    /// | `QI_K_LEVELS`        | 10       |
    /// | `QI_TICK_SIZE`       | 0.01     |
    /// | `QI_HALF_LIFE_TICKS` | 0.5      |
    /// | `QI_WINDOW_MS`       | 30000    |
    /// | `MARKOUT_HORIZON`    | clock    |
    /// | `MARKOUT_TAU_MS`     | 1000     |
    /// | `MARKOUT_K_TRADES`   | unset    |
    /// | `MARKOUT_WINDOW_MS`  | 300000   |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using the provided variable lookup. See [`MicrostructureConfig::from_env`].
    pub fn from_lookup<Lookup>(lookup: Lookup) -> Self
    where
        Lookup: Fn(&str) -> Option<String>,
    {
        let horizon_type = lookup("MARKOUT_HORIZON")
            .and_then(|value| match value.trim().to_ascii_lowercase().as_str() {
                "clock" => Some(HorizonType::Clock),
                "event" => Some(HorizonType::Event),
                other => {
                    warn!(value = other, "unknown MARKOUT_HORIZON, using clock");
                    None
                }
            })
            .unwrap_or(HorizonType::Clock);

        Self {
            avci: AvciConfig {
                window_ms: parse_or(&lookup, "AVCI_WINDOW_MS", DEFAULT_AVCI_WINDOW_MS),
            },
            queue_imbalance: QueueImbalanceConfig {
                k_levels: parse_or(&lookup, "QI_K_LEVELS", DEFAULT_QI_K_LEVELS),
                tick_size: parse_or(&lookup, "QI_TICK_SIZE", Decimal::new(1, 2)),
                half_life_ticks: parse_or(&lookup, "QI_HALF_LIFE_TICKS", Decimal::new(5, 1)),
                window_ms: parse_or(&lookup, "QI_WINDOW_MS", DEFAULT_QI_WINDOW_MS),
            },
            markout: MarkoutConfig {
                horizon_type,
                tau_ms: Some(parse_or(&lookup, "MARKOUT_TAU_MS", DEFAULT_MARKOUT_TAU_MS)),
                k_trades: parse(&lookup, "MARKOUT_K_TRADES"),
                window_ms: parse_or(&lookup, "MARKOUT_WINDOW_MS", DEFAULT_MARKOUT_WINDOW_MS),
            },
        }
    }

    pub fn validate(&self) -> Result<(), StatisticError> {
        self.avci.validate()?;
        self.queue_imbalance.validate()?;
        self.markout.validate()
    }
}

fn parse<Lookup, T>(lookup: &Lookup, key: &'static str) -> Option<T>
where
    Lookup: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, %value, "failed to parse configuration variable, using default");
            None
        }
    }
}

fn parse_or<Lookup, T>(lookup: &Lookup, key: &'static str, default: T) -> T
where
    Lookup: Fn(&str) -> Option<String>,
    T: FromStr,
{
    parse(lookup, key).unwrap_or(default)
}

/// Every statistic engine for one instrument, built from a [`MicrostructureConfig`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MicrostructureEngines {
    pub avci: AvciEngine,
    pub queue_imbalance: QueueImbalanceEngine,
    pub markout: MarkoutEngine,
}

impl MicrostructureEngines {
    pub fn new(config: &MicrostructureConfig) -> Result<Self, StatisticError> {
        Ok(Self {
            avci: AvciEngine::new(config.avci)?,
            queue_imbalance: QueueImbalanceEngine::new(config.queue_imbalance)?,
            markout: MarkoutEngine::new(config.markout)?,
        })
    }

    pub fn from_state(state: MicrostructureState) -> Result<Self, StatisticError> {
        Ok(Self {
            avci: AvciEngine::from_state(state.avci)?,
            queue_imbalance: QueueImbalanceEngine::from_state(state.queue_imbalance)?,
            markout: MarkoutEngine::from_state(state.markout)?,
        })
    }

    pub fn export_state(&self) -> MicrostructureState {
        MicrostructureState {
            avci: self.avci.export_state(),
            queue_imbalance: self.queue_imbalance.export_state(),
            markout: self.markout.export_state(),
        }
    }
}

/// Serialisable snapshot of [`MicrostructureEngines`].
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct MicrostructureState {
    pub avci: AvciState,
    pub queue_imbalance: QueueImbalanceState,
    pub markout: MarkoutState,
}

impl Snapshot for MicrostructureState {}
