//! Fixed-Point Math
//!
//! Every amount in the pool is a `U256` in the underlying asset's smallest
//! unit. Rates are WAD fractions (1e18 = 100%). Index-based money markets
//! quote their income index in RAY (1e27).
//!
//! All helpers are checked: overflow, underflow and division by zero
//! surface as [`MathError`] instead of panicking.

use alloy_primitives::U256;
use thiserror::Error;

// ============================================
// CONSTANTS
// ============================================

/// 1e18 - fixed-point unit for rates and exchange rates
pub const PRECISION: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// 1e27 - fixed-point unit for index-based money markets
pub const RAY: U256 = U256::from_limbs([11_515_845_246_265_065_472, 54_210_108, 0, 0]);

/// Seconds in a (Gregorian average) year
pub const YEAR_IN_SECONDS: u64 = 31_556_952;

/// Decimals of the underlying stablecoin
pub const UNDERLYING_DECIMALS: u8 = 18;

// ============================================
// ERRORS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,
}

// ============================================
// CHECKED OPERATIONS
// ============================================

pub fn add(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

pub fn sub(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

/// `a * b / c`, rounded down
pub fn mul_div(a: U256, b: U256, c: U256) -> Result<U256, MathError> {
    if c.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    Ok(a.checked_mul(b).ok_or(MathError::Overflow)? / c)
}

/// `a * b / c`, rounded up
pub fn mul_div_up(a: U256, b: U256, c: U256) -> Result<U256, MathError> {
    if c.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    let quotient = product / c;
    if (product % c).is_zero() {
        Ok(quotient)
    } else {
        add(quotient, U256::from(1u64))
    }
}

/// Multiply two WAD values: `a * b / 1e18`
pub fn decmul(a: U256, b: U256) -> Result<U256, MathError> {
    mul_div(a, b, PRECISION)
}

/// Divide two WAD values: `a * 1e18 / b`
pub fn decdiv(a: U256, b: U256) -> Result<U256, MathError> {
    mul_div(a, PRECISION, b)
}

// ============================================
// CONVERSIONS
// ============================================

/// Convert a human-readable amount (e.g. `1.5` tokens) into base units
pub fn from_decimal(value: f64, decimals: u8) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 10f64.powi(decimals as i32)) as u128)
}

/// Convert base units into a human-readable amount (lossy, display only)
pub fn to_decimal(value: U256, decimals: u8) -> f64 {
    value.saturating_to::<u128>() as f64 / 10f64.powi(decimals as i32)
}

/// Convert an annual percentage yield into a WAD per-second rate
pub fn apy_to_rate_per_second(apy: f64) -> U256 {
    from_decimal(apy, UNDERLYING_DECIMALS) / U256::from(YEAR_IN_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(v: u64) -> U256 {
        U256::from(v) * PRECISION
    }

    #[test]
    fn test_constants() {
        assert_eq!(PRECISION, U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(RAY, U256::from(10u64).pow(U256::from(27u64)));
    }

    #[test]
    fn test_decmul_decdiv() {
        let half = PRECISION / U256::from(2u64);
        assert_eq!(decmul(wad(10), half).unwrap(), wad(5));
        assert_eq!(decdiv(wad(5), half).unwrap(), wad(10));
        assert_eq!(decdiv(wad(1), U256::ZERO), Err(MathError::DivisionByZero));
    }

    #[test]
    fn test_rounding_direction() {
        let seven = U256::from(7u64);
        let two = U256::from(2u64);
        assert_eq!(mul_div(seven, U256::from(1u64), two).unwrap(), U256::from(3u64));
        assert_eq!(mul_div_up(seven, U256::from(1u64), two).unwrap(), U256::from(4u64));
        assert_eq!(mul_div_up(U256::from(8u64), U256::from(1u64), two).unwrap(), U256::from(4u64));
    }

    #[test]
    fn test_checked_errors() {
        assert_eq!(sub(U256::ZERO, U256::from(1u64)), Err(MathError::Underflow));
        assert_eq!(add(U256::MAX, U256::from(1u64)), Err(MathError::Overflow));
        assert_eq!(decmul(U256::MAX, wad(2)), Err(MathError::Overflow));
    }

    #[test]
    fn test_decimal_conversions() {
        assert_eq!(from_decimal(1.0, 18), PRECISION);
        assert_eq!(from_decimal(-3.0, 18), U256::ZERO);
        assert!((to_decimal(wad(1000), 18) - 1000.0).abs() < 1e-9);

        // 10% APY is roughly 3.17e9 per second in WAD
        let rate = apy_to_rate_per_second(0.1);
        assert!(rate > U256::from(3_100_000_000u64) && rate < U256::from(3_200_000_000u64));
    }
}
