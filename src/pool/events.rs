//! Pool event log
//!
//! Every committed operation appends events here (and logs them through
//! `tracing`). Rejected operations leave no events behind.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum PoolEvent {
    Deposit {
        sender: Address,
        deposit_id: u64,
        amount: U256,
        maturation_timestamp: u64,
        interest_amount: U256,
        fee_rate: U256,
        /// Fee due at maturity on the full interest amount
        fee_amount: U256,
        timestamp: u64,
    },
    Withdraw {
        sender: Address,
        recipient: Address,
        deposit_id: u64,
        early: bool,
        principal: U256,
        interest: U256,
        fee: U256,
        payout: U256,
        timestamp: u64,
    },
    Fund {
        sender: Address,
        funding_id: u64,
        deposit_ids: Vec<u64>,
        deficit_amount: U256,
        /// Paid in by the funder, the deficit rounded up to whole market shares
        amount: U256,
        timestamp: u64,
    },
    FunderPayout {
        funding_id: u64,
        recipient: Address,
        interest: U256,
        refund: U256,
        timestamp: u64,
    },
}

impl PoolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::Deposit { .. } => "Deposit",
            PoolEvent::Withdraw { .. } => "Withdraw",
            PoolEvent::Fund { .. } => "Fund",
            PoolEvent::FunderPayout { .. } => "FunderPayout",
        }
    }

    /// Single-line JSON, for event log files
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged() {
        let event = PoolEvent::Fund {
            sender: Address::repeat_byte(0x11),
            funding_id: 1,
            deposit_ids: vec![1, 2],
            deficit_amount: U256::from(42u64),
            amount: U256::from(43u64),
            timestamp: 7,
        };
        let line = event.to_json_line().unwrap();
        assert!(line.starts_with("{\"event\":\"Fund\""));
        assert!(!line.contains('\n'));

        let back: PoolEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.name(), "Fund");
    }
}
