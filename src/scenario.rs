//! Profiling Scenario
//!
//! Replays the pool's reference workload end to end:
//!
//! 1. one depositor opens `deposits` one-year deposits in batches
//! 2. a funder covers the whole deficit with `fund_all`
//! 3. time moves forward and the market gains `market_growth`
//! 4. every deposit is withdrawn early in a single batch
//!
//! Amounts can be randomized from a seed so runs stay reproducible.

use alloy_primitives::{Address, U256};
use eyre::{Result, WrapErr};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::clock::{Clock, ManualClock};
use crate::config::{Config, POOL_ADDRESS};
use crate::ledger::Erc20Ledger;
use crate::math::{self, YEAR_IN_SECONDS};
use crate::money_market::{AnyMarket, MoneyMarket};
use crate::pool::{Pool, PoolEvent, Surplus};

/// 2021-01-01T00:00:00Z
pub const SCENARIO_START: u64 = 1_609_459_200;

pub const DEPOSITOR: Address = Address::repeat_byte(0xd1);
pub const FUNDER: Address = Address::repeat_byte(0xf1);

#[derive(Debug, Clone)]
pub struct ScenarioParams {
    pub deposits: usize,
    pub batch_size: usize,

    /// Base deposit size, in underlying tokens
    pub deposit_amount: f64,

    pub term_secs: u64,

    /// Time between funding and the early withdrawals
    pub elapsed_secs: u64,

    /// Market growth over `elapsed_secs` (0.05 = +5%)
    pub market_growth: f64,

    /// Randomize each deposit between 0.5x and 1.5x the base size
    pub seed: Option<u64>,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            deposits: 90,
            batch_size: 38,
            deposit_amount: 1.0,
            term_secs: YEAR_IN_SECONDS,
            elapsed_secs: YEAR_IN_SECONDS / 2,
            market_growth: 0.05,
            seed: None,
        }
    }
}

/// Progress notifications for front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioStep {
    Deposited { count: usize },
    Funded { funding_id: u64 },
    TimeTravel { seconds: u64 },
    Withdrawn { count: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub market: String,
    pub deposits: usize,
    pub total_deposited: U256,
    pub interest_promised: U256,
    pub deficit_funded: U256,
    pub paid_to_depositors: U256,
    pub fees_collected: U256,
    pub funder_credit: U256,
    pub surplus_after: Surplus,
    pub events: usize,
}

impl ScenarioReport {
    /// Funder's return on the deficit it covered, as a fraction
    pub fn funder_return(&self) -> f64 {
        let funded = math::to_decimal(self.deficit_funded, 18);
        if funded == 0.0 {
            return 0.0;
        }
        math::to_decimal(self.funder_credit, 18) / funded - 1.0
    }
}

pub struct Scenario {
    config: Config,
    params: ScenarioParams,
}

impl Scenario {
    pub fn new(config: Config, params: ScenarioParams) -> Self {
        Self { config, params }
    }

    pub fn params(&self) -> &ScenarioParams {
        &self.params
    }

    /// Deposit amounts for this run
    pub fn amounts(&self) -> Vec<U256> {
        let mut rng = self.params.seed.map(StdRng::seed_from_u64);
        (0..self.params.deposits)
            .map(|_| {
                let factor = match rng.as_mut() {
                    Some(rng) => rng.gen_range(0.5..1.5),
                    None => 1.0,
                };
                math::from_decimal(self.params.deposit_amount * factor, math::UNDERLYING_DECIMALS)
            })
            .collect()
    }

    /// Fresh pool with funded, approved actors and market cash for yield
    pub fn build_pool(&self, clock: &ManualClock, amounts: &[U256]) -> Result<Pool<AnyMarket>> {
        self.config.validate()?;
        let total = amounts.iter().fold(U256::ZERO, |acc, a| acc.saturating_add(*a));

        let market = self.config.build_market();
        let mut stablecoin = Erc20Ledger::new(self.config.underlying_symbol.clone(), math::UNDERLYING_DECIMALS);
        stablecoin.mint(DEPOSITOR, total)?;
        stablecoin.mint(FUNDER, total)?;
        stablecoin.mint(market.cash_address(), total)?;
        stablecoin.approve(DEPOSITOR, POOL_ADDRESS, U256::MAX);
        stablecoin.approve(FUNDER, POOL_ADDRESS, U256::MAX);

        let pool = Pool::new(
            POOL_ADDRESS,
            self.config.pool_params(),
            market,
            self.config.fee_model()?,
            self.config.oracle_params(),
            stablecoin,
            Arc::new(clock.clone()),
        )?;
        Ok(pool)
    }

    pub fn run(&self) -> Result<(ScenarioReport, Vec<PoolEvent>)> {
        self.run_with_progress(|_| {})
    }

    pub fn run_with_progress(&self, mut progress: impl FnMut(ScenarioStep)) -> Result<(ScenarioReport, Vec<PoolEvent>)> {
        let clock = ManualClock::new(SCENARIO_START);
        let amounts = self.amounts();
        let mut pool = self.build_pool(&clock, &amounts)?;
        let batch_size = self.params.batch_size.max(1);

        // 1. Deposits
        let maturation = clock.now() + self.params.term_secs;
        let mut ids = Vec::with_capacity(amounts.len());
        for batch in amounts.chunks(batch_size) {
            let batch_ids = pool
                .multi_deposit(DEPOSITOR, batch, &vec![maturation; batch.len()])
                .wrap_err("multi_deposit failed")?;
            progress(ScenarioStep::Deposited { count: batch_ids.len() });
            ids.extend(batch_ids);
        }
        let total_deposited = pool.total_deposit();
        let interest_promised = pool.total_interest_owed();

        // 2. Funding
        let funder_before = pool.stablecoin().balance_of(FUNDER);
        let funding_id = pool.fund_all(FUNDER).wrap_err("fund_all failed")?;
        let deficit_funded = funder_before - pool.stablecoin().balance_of(FUNDER);
        progress(ScenarioStep::Funded { funding_id });

        // 3. Time travel and market growth
        clock.advance(self.params.elapsed_secs);
        pool.money_market_mut()
            .simulate_growth(math::from_decimal(self.params.market_growth, 18))?;
        progress(ScenarioStep::TimeTravel {
            seconds: self.params.elapsed_secs,
        });

        // 4. Batch early withdrawal
        let depositor_before = pool.stablecoin().balance_of(DEPOSITOR);
        let payouts = pool
            .multi_early_withdraw(DEPOSITOR, &ids, &vec![U256::MAX; ids.len()])
            .wrap_err("multi_early_withdraw failed")?;
        progress(ScenarioStep::Withdrawn { count: payouts.len() });

        let funder_credit = pool
            .fundings()
            .iter()
            .fold(U256::ZERO, |acc, f| acc.saturating_add(f.recipient_credit));
        let events = pool.drain_events();
        let report = ScenarioReport {
            market: pool.money_market().name().to_string(),
            deposits: ids.len(),
            total_deposited,
            interest_promised,
            deficit_funded,
            paid_to_depositors: pool.stablecoin().balance_of(DEPOSITOR) - depositor_before,
            fees_collected: pool.stablecoin().balance_of(pool.fee_model().beneficiary),
            funder_credit,
            surplus_after: pool.surplus()?,
            events: events.len(),
        };
        info!(
            "Scenario complete: {} deposits, deficit {:.6}, funder credit {:.6}, surplus {}",
            report.deposits,
            math::to_decimal(report.deficit_funded, 18),
            math::to_decimal(report.funder_credit, 18),
            report.surplus_after
        );
        Ok((report, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::PRECISION;
    use crate::money_market::MarketKind;

    #[test]
    fn test_reference_scenario() {
        let scenario = Scenario::new(Config::default(), ScenarioParams::default());
        let mut steps = Vec::new();
        let (report, events) = scenario.run_with_progress(|step| steps.push(step)).unwrap();

        assert_eq!(report.deposits, 90);
        assert_eq!(report.total_deposited, PRECISION * U256::from(90u64));
        // Rounded up to whole cTokens, each worth 2e8 wei at the initial rate
        assert!(report.deficit_funded >= report.interest_promised);
        assert!(report.deficit_funded - report.interest_promised <= U256::from(200_000_000u64));
        // Coverage back plus 5% on the 90 funded
        assert_eq!(report.funder_credit, report.deficit_funded + PRECISION * U256::from(45u64) / U256::from(10u64));
        // 1% penalty with half the term left
        assert_eq!(report.fees_collected, PRECISION * U256::from(45u64) / U256::from(100u64));
        assert_eq!(report.paid_to_depositors, report.total_deposited - report.fees_collected);
        assert!(!report.surplus_after.is_negative);
        assert!(report.funder_return() > 0.0);

        // 90 deposits, one funding, 90 withdrawals each paying the funder
        assert_eq!(events.len(), 271);
        assert_eq!(steps.first(), Some(&ScenarioStep::Deposited { count: 38 }));
        assert_eq!(steps.last(), Some(&ScenarioStep::Withdrawn { count: 90 }));
    }

    #[test]
    fn test_seeded_scenario_is_reproducible() {
        let params = ScenarioParams {
            deposits: 20,
            seed: Some(7),
            ..ScenarioParams::default()
        };
        let config = Config {
            market: MarketKind::Aave,
            ..Config::default()
        };
        let scenario = Scenario::new(config, params);
        let amounts = scenario.amounts();
        assert!(amounts.windows(2).any(|w| w[0] != w[1]));
        assert_eq!(amounts, scenario.amounts());

        let (first, _) = scenario.run().unwrap();
        let (second, _) = scenario.run().unwrap();
        assert_eq!(first.funder_credit, second.funder_credit);
        assert_eq!(first.market, "Aave");
        assert!(!first.surplus_after.is_negative);
    }
}
