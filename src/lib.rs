//! dinterest - fixed-rate deposits on top of a variable-rate money market
//!
//! Depositors lock a stablecoin for a term and are promised a fixed interest
//! amount at deposit time. The pool parks every deposit in an external money
//! market; funders cover the gap between promised interest and market value
//! and earn the yield of the principal they cover.
//!
//! ## Layout
//!
//! - [`pool`]: the engine (deposits, withdrawals, funding, surplus)
//! - [`money_market`]: Compound-style and Aave-style yield source adapters
//! - [`fee_model`]: interest fees and early withdrawal penalties
//! - [`oracle`]: EMA of the market's per-second yield
//! - [`registry`] / [`ledger`]: receipt NFTs and the underlying token
//! - [`scenario`]: end-to-end profiling workload used by the CLI

pub mod clock;
pub mod config;
pub mod fee_model;
pub mod ledger;
pub mod math;
pub mod money_market;
pub mod oracle;
pub mod pool;
pub mod registry;
pub mod scenario;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use fee_model::FeeModel;
pub use money_market::{AnyMarket, MarketKind, MoneyMarket};
pub use pool::{Pool, PoolError, PoolEvent, PoolParams, Surplus};
