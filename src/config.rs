//! Pool Configuration
//!
//! Human-readable settings (decimal rates, days, token amounts) loaded from
//! the environment (`.env` supported) or a TOML file, and converted into the
//! engine's fixed-point parameter types.

use alloy_primitives::{Address, U256};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::fee_model::{FeeModel, FeeTier, InterestFee};
use crate::math::{self, UNDERLYING_DECIMALS};
use crate::money_market::{AaveMarket, AnyMarket, CToken, CompoundMarket, LendingReserve, MarketKind};
use crate::oracle::OracleParams;
use crate::pool::PoolParams;

const DAY: u64 = 24 * 60 * 60;

// ============================================
// SIMULATED ADDRESSES
// ============================================

pub const POOL_ADDRESS: Address = Address::repeat_byte(0x90);
pub const COMPOUND_ADAPTER: Address = Address::repeat_byte(0xc1);
pub const CTOKEN: Address = Address::repeat_byte(0xc2);
pub const AAVE_ADAPTER: Address = Address::repeat_byte(0xa1);
pub const LENDING_RESERVE: Address = Address::repeat_byte(0xa2);

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // ========== Money Market ==========
    /// External yield source backing the pool
    pub market: MarketKind,

    /// Underlying stablecoin symbol (display only)
    pub underlying_symbol: String,

    /// Starting cToken exchange rate in underlying per cToken (0.02 = Compound launch rate)
    pub initial_exchange_rate: f64,

    /// Market APY the oracle starts from (0.10 = 10%)
    pub initial_apy: f64,

    // ========== Pool ==========
    /// Share of the average market rate promised to depositors (must be < 1)
    pub uir_multiplier: f64,

    pub min_deposit_period_days: u64,
    pub max_deposit_period_days: u64,

    /// Smallest deposit, in underlying tokens
    pub min_deposit_amount: f64,

    /// Per-transaction deposit cap, in underlying tokens
    pub max_deposit_amount: f64,

    // ========== Fees ==========
    /// Flat interest fee (0.10 = 10% of interest)
    pub interest_fee: f64,

    /// Optional tiered schedule as (min interest in tokens, rate); overrides the flat fee
    pub interest_fee_tiers: Vec<(f64, f64)>,

    /// Principal penalty if withdrawn right after depositing (0.01 = 1%)
    pub early_withdraw_fee: f64,

    /// Receives fees and penalties
    pub fee_beneficiary: Option<String>,

    // ========== Oracle ==========
    pub oracle_update_interval_secs: u64,
    pub oracle_smoothing_factor: u64,
    pub oracle_window_intervals: u64,

    // ========== Event Log ==========
    pub event_log: bool,
    pub event_log_path: String,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            // Money market
            market: match env::var("MARKET") {
                Ok(value) => parse_market(&value)?,
                Err(_) => defaults.market,
            },
            underlying_symbol: env::var("UNDERLYING_SYMBOL").unwrap_or(defaults.underlying_symbol),
            initial_exchange_rate: parse_env("INITIAL_EXCHANGE_RATE", defaults.initial_exchange_rate),
            initial_apy: parse_env("INITIAL_APY", defaults.initial_apy),

            // Pool
            uir_multiplier: parse_env("UIR_MULTIPLIER", defaults.uir_multiplier),
            min_deposit_period_days: parse_env("MIN_DEPOSIT_PERIOD_DAYS", defaults.min_deposit_period_days),
            max_deposit_period_days: parse_env("MAX_DEPOSIT_PERIOD_DAYS", defaults.max_deposit_period_days),
            min_deposit_amount: parse_env("MIN_DEPOSIT_AMOUNT", defaults.min_deposit_amount),
            max_deposit_amount: parse_env("MAX_DEPOSIT_AMOUNT", defaults.max_deposit_amount),

            // Fees
            interest_fee: parse_env("INTEREST_FEE", defaults.interest_fee),
            interest_fee_tiers: env::var("INTEREST_FEE_TIERS")
                .map(|s| parse_tiers(&s))
                .unwrap_or_default(),
            early_withdraw_fee: parse_env("EARLY_WITHDRAW_FEE", defaults.early_withdraw_fee),
            fee_beneficiary: env::var("FEE_BENEFICIARY").ok(),

            // Oracle
            oracle_update_interval_secs: parse_env("ORACLE_UPDATE_INTERVAL_SECS", defaults.oracle_update_interval_secs),
            oracle_smoothing_factor: parse_env("ORACLE_SMOOTHING_FACTOR", defaults.oracle_smoothing_factor),
            oracle_window_intervals: parse_env("ORACLE_WINDOW_INTERVALS", defaults.oracle_window_intervals),

            // Event log
            event_log: parse_env("EVENT_LOG", defaults.event_log),
            event_log_path: env::var("EVENT_LOG_PATH").unwrap_or(defaults.event_log_path),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration before building a pool
    pub fn validate(&self) -> Result<()> {
        if !(self.uir_multiplier > 0.0 && self.uir_multiplier < 1.0) {
            return Err(eyre::eyre!(
                "UIR_MULTIPLIER must be between 0 and 1 exclusive (currently {})",
                self.uir_multiplier
            ));
        }
        if self.initial_exchange_rate <= 0.0 {
            return Err(eyre::eyre!("INITIAL_EXCHANGE_RATE must be positive"));
        }
        if self.initial_apy < 0.0 {
            return Err(eyre::eyre!("INITIAL_APY cannot be negative"));
        }
        for (name, rate) in [
            ("INTEREST_FEE", self.interest_fee),
            ("EARLY_WITHDRAW_FEE", self.early_withdraw_fee),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(eyre::eyre!("{} must be between 0 and 1 (currently {})", name, rate));
            }
        }
        if self.oracle_update_interval_secs == 0 || self.oracle_window_intervals == 0 {
            return Err(eyre::eyre!("Oracle interval and window must be positive"));
        }

        self.pool_params().validate()?;
        self.fee_model()?.validate()?;
        Ok(())
    }

    // ============================================
    // CONVERSIONS
    // ============================================

    pub fn pool_params(&self) -> PoolParams {
        PoolParams {
            uir_multiplier: math::from_decimal(self.uir_multiplier, 18),
            min_deposit_period: self.min_deposit_period_days * DAY,
            max_deposit_period: self.max_deposit_period_days * DAY,
            min_deposit_amount: self.token_amount(self.min_deposit_amount),
            max_deposit_amount: self.token_amount(self.max_deposit_amount),
        }
    }

    pub fn fee_model(&self) -> Result<FeeModel> {
        let interest_fee = if self.interest_fee_tiers.is_empty() {
            InterestFee::Flat(math::from_decimal(self.interest_fee, 18))
        } else {
            InterestFee::Tiered(
                self.interest_fee_tiers
                    .iter()
                    .map(|&(min_interest, rate)| FeeTier {
                        min_interest: self.token_amount(min_interest),
                        rate: math::from_decimal(rate, 18),
                    })
                    .collect(),
            )
        };
        let beneficiary = match &self.fee_beneficiary {
            Some(address) => Address::from_str(address)
                .map_err(|e| eyre::eyre!("Invalid FEE_BENEFICIARY {}: {}", address, e))?,
            None => FeeModel::default().beneficiary,
        };
        Ok(FeeModel::new(
            interest_fee,
            math::from_decimal(self.early_withdraw_fee, 18),
            beneficiary,
        ))
    }

    pub fn oracle_params(&self) -> OracleParams {
        OracleParams {
            update_interval: self.oracle_update_interval_secs,
            smoothing_factor: self.oracle_smoothing_factor,
            average_window_in_intervals: self.oracle_window_intervals,
            initial_rate_per_second: math::apy_to_rate_per_second(self.initial_apy),
        }
    }

    /// Fresh simulated market of the configured kind
    pub fn build_market(&self) -> AnyMarket {
        match self.market {
            MarketKind::Compound => {
                // cTokens have 8 decimals, so the WAD rate carries an extra 1e10
                let rate = math::from_decimal(self.initial_exchange_rate, 18) * U256::from(10_000_000_000u64);
                AnyMarket::Compound(CompoundMarket::new(COMPOUND_ADAPTER, CToken::new(CTOKEN, rate)))
            }
            MarketKind::Aave => AnyMarket::Aave(AaveMarket::new(AAVE_ADAPTER, LendingReserve::new(LENDING_RESERVE))),
        }
    }

    fn token_amount(&self, amount: f64) -> U256 {
        math::from_decimal(amount, UNDERLYING_DECIMALS)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              DINTEREST POOL - CONFIGURATION                ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Money Market:      {:^40} ║", self.market.to_string());
        println!("║ Underlying:        {:^40} ║", self.underlying_symbol);
        println!("║ Initial APY:       {:>38.2}% ║", self.initial_apy * 100.0);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ DEPOSITS                                                   ║");
        println!("║ • UIR Multiplier:  {:>39.2} ║", self.uir_multiplier);
        println!("║ • Term:            {:>29} - {:>4} days ║", self.min_deposit_period_days, self.max_deposit_period_days);
        println!("║ • Amount:          {:>23} - {:>10} {} ║",
            self.min_deposit_amount, self.max_deposit_amount, fit_symbol(&self.underlying_symbol)
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ FEES                                                       ║");
        println!("║ • Interest Fee:    {:^40} ║",
            if self.interest_fee_tiers.is_empty() {
                format!("{:.2}% flat", self.interest_fee * 100.0)
            } else {
                format!("{} tiers", self.interest_fee_tiers.len())
            }
        );
        println!("║ • Early Exit:      {:>38.2}% ║", self.early_withdraw_fee * 100.0);
        println!("║ • Beneficiary:     {:^40} ║",
            if self.fee_beneficiary.is_some() { "✓ Configured" } else { "✗ Default" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ ORACLE                                                     ║");
        println!("║ • Update Interval: {:>37}s ║", self.oracle_update_interval_secs);
        println!("║ • Window:          {:>30} intervals ║", self.oracle_window_intervals);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ • Event Log:       {:^40} ║",
            if self.event_log { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            market: MarketKind::Compound,
            underlying_symbol: "DAI".to_string(),
            initial_exchange_rate: 0.02,
            initial_apy: 0.10,
            uir_multiplier: 0.75,
            min_deposit_period_days: 90,
            max_deposit_period_days: 3650,
            min_deposit_amount: 0.01,
            max_deposit_amount: 1000.0,
            interest_fee: 0.10,
            interest_fee_tiers: vec![],
            early_withdraw_fee: 0.01,
            fee_beneficiary: None,
            oracle_update_interval_secs: DAY,
            oracle_smoothing_factor: 2,
            oracle_window_intervals: 30,
            event_log: true,
            event_log_path: "./logs/pool_events.jsonl".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse a `MARKET` / `--market` value
pub fn parse_market(value: &str) -> Result<MarketKind> {
    match value.trim().to_lowercase().as_str() {
        "compound" => Ok(MarketKind::Compound),
        "aave" => Ok(MarketKind::Aave),
        other => Err(eyre::eyre!("Unknown market '{}' (expected compound or aave)", other)),
    }
}

/// Parse `min:rate,min:rate` tier lists
fn parse_tiers(raw: &str) -> Vec<(f64, f64)> {
    raw.split(',')
        .filter_map(|tier| {
            let (min, rate) = tier.split_once(':')?;
            Some((min.trim().parse().ok()?, rate.trim().parse().ok()?))
        })
        .collect()
}

fn fit_symbol(symbol: &str) -> String {
    format!("{:<4}", symbol.chars().take(4).collect::<String>())
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{PRECISION, RAY};
    use crate::money_market::MoneyMarket;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.market, MarketKind::Compound);

        let params = config.pool_params();
        assert_eq!(params.uir_multiplier, PRECISION * U256::from(3u64) / U256::from(4u64));
        assert_eq!(params.min_deposit_period, 90 * DAY);
        assert_eq!(params.max_deposit_amount, PRECISION * U256::from(1000u64));
        assert_eq!(config.fee_model().unwrap(), FeeModel::default());
    }

    #[test]
    fn test_multiplier_must_stay_below_one() {
        let config = Config {
            uir_multiplier: 1.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_fee_settings_rejected() {
        let config = Config {
            early_withdraw_fee: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            fee_beneficiary: Some("not-an-address".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        // Tiers must start at zero interest
        let config = Config {
            interest_fee_tiers: vec![(5.0, 0.1)],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config {
            market: MarketKind::Aave,
            interest_fee_tiers: vec![(0.0, 0.2), (100.0, 0.1)],
            ..Config::default()
        };
        let path = std::env::temp_dir().join(format!("dinterest-config-{}.toml", std::process::id()));
        config.save_to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
        assert!(matches!(loaded.fee_model().unwrap().interest_fee, InterestFee::Tiered(ref t) if t.len() == 2));
    }

    #[test]
    fn test_parse_tiers() {
        assert_eq!(parse_tiers("0:0.2, 100:0.1"), vec![(0.0, 0.2), (100.0, 0.1)]);
        assert!(parse_tiers("garbage").is_empty());
    }

    #[test]
    fn test_parse_market() {
        assert_eq!(parse_market("Aave").unwrap(), MarketKind::Aave);
        assert_eq!(parse_market(" compound ").unwrap(), MarketKind::Compound);
        assert!(parse_market("uniswap").is_err());
        assert!(parse_market("").is_err());
    }

    #[test]
    fn test_build_market_uses_configured_rate() {
        let market = Config::default().build_market();
        // 0.02 underlying per 8-decimal cToken
        assert_eq!(market.income_index(), U256::from(200_000_000_000_000_000_000_000_000u128));

        let aave = Config {
            market: MarketKind::Aave,
            ..Config::default()
        }
        .build_market();
        assert_eq!(aave.income_index(), RAY);
    }
}
