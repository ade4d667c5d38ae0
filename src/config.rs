use crate::domain::eligibility::EligibilityRules;
use crate::domain::fine::FinePolicy;
use crate::domain::money::Money;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Runtime settings for the engine.
///
/// Sources, later ones winning: built-in defaults, an optional config file
/// (format picked from its extension), then `RENTMESH__<SECTION>__<KEY>`
/// environment variables.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub eligibility: EligibilityRules,
    pub fees: FeeSettings,
    pub sweeper: SweeperSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeeSettings {
    /// Share of an order's gross kept by the platform on payout.
    pub platform_fee_rate: Decimal,
    /// Fine charged per whole day an order is overdue.
    pub daily_fine_rate: Money,
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            platform_fee_rate: dec!(0.10),
            daily_fine_rate: Money::from(10),
        }
    }
}

impl FeeSettings {
    pub fn fine_policy(&self) -> FinePolicy {
        FinePolicy::new(self.daily_fine_rate)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SweeperSettings {
    pub interval_secs: u64,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl SweeperSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(
                config::Environment::with_prefix("RENTMESH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    /// Rejects settings the engine cannot run with.
    pub fn validated(self) -> Result<Self, config::ConfigError> {
        let rate = self.fees.platform_fee_rate;
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(config::ConfigError::Message(format!(
                "fees.platform_fee_rate must be between 0 and 1, got {rate}"
            )));
        }
        Ok(self)
    }
}
