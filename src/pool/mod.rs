//! Pool Engine
//!
//! Fixed-rate deposits on top of a variable-rate money market:
//!
//! - **Deposits** lock principal for a term and are promised interest at the
//!   oracle's average rate times the UIR multiplier, fixed at deposit time
//! - **Withdrawals** at maturity pay principal plus interest minus the fee;
//!   early exits pay principal minus a time-weighted penalty
//! - **Fundings** cover the gap between owed interest and market value, and
//!   collect the yield of the principal they cover
//!
//! Every mutating operation runs on a staged copy of the pool and commits
//! only if it fully succeeds, so a failed batch leaves no trace.

mod engine;
mod error;
mod events;
mod funding;
mod types;
mod withdraw;


pub use engine::{Pool, DEPOSIT_RECEIPT, FUNDING_RECEIPT};
pub use error::PoolError;
pub use events::PoolEvent;
pub use types::{Deposit, DepositStatus, Funding, PoolParams, Surplus};
