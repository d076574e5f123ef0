//! Core domain types shared across the scanner.
//!
//! Odds quotes and market snapshots are built at the feed boundary from
//! validated wire data; opportunities are produced by the detector and
//! persisted as immutable records (a later detection for the same market
//! supersedes with a new record, never an update).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Odds quotes
// ---------------------------------------------------------------------------

/// A single bookmaker price for one outcome of one market, as observed
/// during a scan cycle. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsQuote {
    pub bookmaker: String,
    pub event_id: String,
    pub market_type: String,
    /// Standardized outcome label (see `markets::MarketMapper`).
    pub outcome: String,
    /// Decimal odds — total return per unit stake, always > 1.0 once
    /// validated at the feed boundary.
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Market snapshots
// ---------------------------------------------------------------------------

/// All quotes for one event+market gathered within a single scan cycle.
///
/// Holds at most one quote per (bookmaker, outcome); on duplicates the
/// most recent `observed_at` wins. `outcomes` is the market's declared
/// outcome set — it also records labels whose quotes were rejected as
/// malformed, so completeness checks see the hole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub event_id: String,
    pub sport_key: String,
    pub market_type: String,
    pub observed_at: DateTime<Utc>,
    pub outcomes: BTreeSet<String>,
    quotes: Vec<OddsQuote>,
}

impl MarketSnapshot {
    pub fn new(event_id: &str, sport_key: &str, market_type: &str, observed_at: DateTime<Utc>) -> Self {
        Self {
            event_id: event_id.to_string(),
            sport_key: sport_key.to_string(),
            market_type: market_type.to_string(),
            observed_at,
            outcomes: BTreeSet::new(),
            quotes: Vec::new(),
        }
    }

    /// Declare an outcome label without attaching a quote.
    ///
    /// Used when a quote failed validation: the market still has that
    /// outcome, we just have no usable price for it.
    pub fn declare_outcome(&mut self, outcome: &str) {
        self.outcomes.insert(outcome.to_string());
    }

    /// Insert a quote, keeping at most one per (bookmaker, outcome).
    /// The most recent `observed_at` wins on duplicate.
    pub fn insert(&mut self, quote: OddsQuote) {
        self.outcomes.insert(quote.outcome.clone());
        if let Some(existing) = self
            .quotes
            .iter_mut()
            .find(|q| q.bookmaker == quote.bookmaker && q.outcome == quote.outcome)
        {
            if quote.observed_at >= existing.observed_at {
                *existing = quote;
            }
        } else {
            self.quotes.push(quote);
        }
    }

    pub fn quotes(&self) -> &[OddsQuote] {
        &self.quotes
    }

    /// Quotes for a single outcome label.
    pub fn quotes_for<'a>(&'a self, outcome: &'a str) -> impl Iterator<Item = &'a OddsQuote> + 'a {
        self.quotes.iter().filter(move |q| q.outcome == outcome)
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Arbitrage opportunities
// ---------------------------------------------------------------------------

/// One leg of an arbitrage: the chosen bookmaker price for one outcome,
/// and the stake allocated to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityLeg {
    pub outcome: String,
    pub bookmaker: String,
    pub odds: f64,
    pub stake: f64,
}

/// A detected arbitrage opportunity: one leg per outcome of the market,
/// total implied probability < 1. Immutable; superseded by a new record
/// if odds move, so history stays auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub id: Uuid,
    pub event_id: String,
    pub sport_key: String,
    pub market_type: String,
    /// Exactly one leg per outcome, sorted by outcome label.
    pub legs: Vec<OpportunityLeg>,
    /// Σ 1/odds across legs — strictly below 1.
    pub total_implied: f64,
    /// `(1/total_implied − 1) × 100`.
    pub profit_pct: f64,
    pub total_stake: f64,
    /// Identical payout whichever outcome occurs: `total_stake / total_implied`.
    pub guaranteed_return: f64,
    pub detected_at: DateTime<Utc>,
}

impl ArbitrageOpportunity {
    /// Whether `other` is the same bookmaker/odds combination on the same
    /// event and market. Used for re-detection suppression: matching
    /// combinations within the staleness window are not newly alertable.
    pub fn same_combination(&self, other: &ArbitrageOpportunity) -> bool {
        self.event_id == other.event_id
            && self.market_type == other.market_type
            && self.legs.len() == other.legs.len()
            && self.legs.iter().zip(&other.legs).all(|(a, b)| {
                a.outcome == b.outcome && a.bookmaker == b.bookmaker && a.odds == b.odds
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
