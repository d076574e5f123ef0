//! Implied-probability and stake-allocation math.
//!
//! Pure functions over decimal odds. All arithmetic is double-precision
//! with no intermediate rounding — rounding happens only at presentation
//! boundaries (alert formatting), so the margin test is never eroded by
//! compounded rounding error.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CalcError {
    /// Decimal odds must be strictly greater than 1.0 (odds of 1.0 return
    /// exactly the stake; anything at or below is not a valid price).
    #[error("invalid decimal odds: {0}")]
    InvalidOdds(f64),
    #[error("invalid total stake: {0}")]
    InvalidStake(f64),
}

/// Bookmaker-implied probability of an outcome: `1 / decimal_odds`.
/// Always in (0, 1) for valid odds.
pub fn implied_probability(decimal_odds: f64) -> Result<f64, CalcError> {
    if !decimal_odds.is_finite() || decimal_odds <= 1.0 {
        return Err(CalcError::InvalidOdds(decimal_odds));
    }
    Ok(1.0 / decimal_odds)
}

/// Total implied probability for one leg per outcome.
/// An arbitrage exists iff the result is below 1.0.
pub fn arbitrage_margin(legs: &[f64]) -> Result<f64, CalcError> {
    let mut total = 0.0;
    for &odds in legs {
        total += implied_probability(odds)?;
    }
    Ok(total)
}

/// Profit percentage for a given total implied probability:
/// `(1/total − 1) × 100`.
pub fn profit_pct(total_implied: f64) -> f64 {
    (1.0 / total_implied - 1.0) * 100.0
}

/// Split `total_stake` across legs proportionally to implied probability,
/// so that the payout is identical whichever outcome occurs.
///
/// Returns `(stakes, guaranteed_return)` where stakes sum to `total_stake`
/// and every leg pays out `total_stake / total`.
pub fn stake_allocation(legs: &[f64], total_stake: f64) -> Result<(Vec<f64>, f64), CalcError> {
    if !total_stake.is_finite() || total_stake <= 0.0 {
        return Err(CalcError::InvalidStake(total_stake));
    }

    let total = arbitrage_margin(legs)?;
    let stakes = legs
        .iter()
        .map(|&odds| total_stake * (1.0 / odds) / total)
        .collect();

    Ok((stakes, total_stake / total))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
