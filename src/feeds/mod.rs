//! Odds data sources.
//!
//! Defines the `OddsFeed` trait, the typed wire format for raw odds
//! records, and ingestion into validated `MarketSnapshot`s. Feeds are
//! treated purely as data sources; quota accounting and persistence
//! happen in the engine.

pub mod odds_api;
pub mod sample;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

use crate::markets::MarketMapper;
use crate::quota::ReportedUsage;
use crate::types::{MarketSnapshot, OddsQuote};

// ---------------------------------------------------------------------------
// Wire format (raw feed JSON → Rust)
// ---------------------------------------------------------------------------

/// One event with odds from multiple bookmakers, as delivered by the
/// feed. Explicit types at the boundary: malformed values are caught
/// during ingestion, never propagated into the calculator.
#[derive(Debug, Clone, Deserialize)]
pub struct EventOdds {
    pub id: String,
    pub sport_key: String,
    pub commence_time: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub bookmakers: Vec<BookmakerOdds>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookmakerOdds {
    pub key: String,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub markets: Vec<MarketOdds>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketOdds {
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<OutcomeOdds>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeOdds {
    pub name: String,
    pub price: f64,
}

/// A successful fetch: the events plus any authoritative quota figures
/// the provider attached to the response.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub events: Vec<EventOdds>,
    pub usage: Option<ReportedUsage>,
}

// ---------------------------------------------------------------------------
// Feed trait
// ---------------------------------------------------------------------------

/// Abstraction over odds data sources.
#[async_trait]
pub trait OddsFeed: Send + Sync {
    /// Fetch raw odds for one sport. Each call counts against the API
    /// quota; the engine checks the budget before invoking this.
    async fn fetch_odds(&self, sport_key: &str) -> Result<FetchResult>;

    /// Feed name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// Convert raw event odds into validated market snapshots.
///
/// One snapshot per event+normalized market. Quotes with non-finite or
/// ≤ 1.0 prices are logged as data-quality issues and dropped, but
/// their outcome label still counts toward the market's declared
/// outcome set so the detector sees the hole.
pub fn build_snapshots(
    events: &[EventOdds],
    mapper: &MarketMapper,
    observed_at: DateTime<Utc>,
) -> Vec<MarketSnapshot> {
    let mut snapshots: HashMap<(String, String), MarketSnapshot> = HashMap::new();

    for event in events {
        for bookmaker in &event.bookmakers {
            let quote_time = bookmaker.last_update.unwrap_or(observed_at);
            for market in &bookmaker.markets {
                let market_type = mapper.normalize_market_key(&market.key);
                let snap = snapshots
                    .entry((event.id.clone(), market_type.clone()))
                    .or_insert_with(|| {
                        MarketSnapshot::new(&event.id, &event.sport_key, &market_type, observed_at)
                    });

                for outcome in &market.outcomes {
                    let label = mapper.standardize_outcome(&outcome.name);
                    if !outcome.price.is_finite() || outcome.price <= 1.0 {
                        warn!(
                            event_id = %event.id,
                            bookmaker = %bookmaker.key,
                            outcome = %label,
                            price = outcome.price,
                            "Malformed price from feed, excluding quote"
                        );
                        snap.declare_outcome(&label);
                        continue;
                    }
                    snap.insert(OddsQuote {
                        bookmaker: bookmaker.key.clone(),
                        event_id: event.id.clone(),
                        market_type: market_type.clone(),
                        outcome: label,
                        price: outcome.price,
                        observed_at: quote_time,
                    });
                }
            }
        }
    }

    let mut result: Vec<MarketSnapshot> = snapshots.into_values().collect();
    result.sort_by(|a, b| {
        a.event_id
            .cmp(&b.event_id)
            .then(a.market_type.cmp(&b.market_type))
    });
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, bookmakers: Vec<BookmakerOdds>) -> EventOdds {
        EventOdds {
            id: id.to_string(),
            sport_key: "soccer_epl".to_string(),
            commence_time: Utc::now(),
            home_team: "Arsenal".to_string(),
            away_team: "Spurs".to_string(),
            bookmakers,
        }
    }

    fn bookmaker(key: &str, market_key: &str, outcomes: Vec<(&str, f64)>) -> BookmakerOdds {
        BookmakerOdds {
            key: key.to_string(),
            last_update: None,
            markets: vec![MarketOdds {
                key: market_key.to_string(),
                outcomes: outcomes
                    .into_iter()
                    .map(|(name, price)| OutcomeOdds {
                        name: name.to_string(),
                        price,
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn test_snapshots_grouped_per_event_and_market() {
        let events = vec![
            event("ev1", vec![bookmaker("betfair", "h2h", vec![("Arsenal", 2.1)])]),
            event("ev2", vec![bookmaker("betfair", "h2h", vec![("Chelsea", 1.9)])]),
        ];
        let snaps = build_snapshots(&events, &MarketMapper::default(), Utc::now());
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].event_id, "ev1");
        assert_eq!(snaps[1].event_id, "ev2");
    }

    #[test]
    fn test_market_aliases_merge_into_one_snapshot() {
        // Two bookmakers naming the same market differently end up in
        // the same snapshot after normalization.
        let events = vec![event(
            "ev1",
            vec![
                bookmaker("betfair", "moneyline", vec![("Arsenal", 2.1)]),
                bookmaker("pinnacle", "h2h", vec![("Arsenal", 2.05)]),
            ],
        )];
        let snaps = build_snapshots(&events, &MarketMapper::default(), Utc::now());
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].market_type, "h2h");
        assert_eq!(snaps[0].quotes().len(), 2);
    }

    #[test]
    fn test_malformed_price_dropped_but_outcome_declared() {
        let events = vec![event(
            "ev1",
            vec![bookmaker(
                "betfair",
                "h2h",
                vec![("Arsenal", 2.1), ("Spurs", 0.0)],
            )],
        )];
        let snaps = build_snapshots(&events, &MarketMapper::default(), Utc::now());
        assert_eq!(snaps[0].quotes().len(), 1);
        assert_eq!(snaps[0].outcomes.len(), 2);
        assert!(snaps[0].outcomes.contains("spurs"));
    }

    #[test]
    fn test_outcome_labels_standardized() {
        let events = vec![event(
            "ev1",
            vec![
                bookmaker("betfair", "h2h", vec![("The Draw", 3.4)]),
                bookmaker("pinnacle", "h2h", vec![("Tie", 3.5)]),
            ],
        )];
        let snaps = build_snapshots(&events, &MarketMapper::default(), Utc::now());
        assert_eq!(snaps[0].outcomes.len(), 1);
        assert_eq!(snaps[0].quotes_for("draw").count(), 2);
    }

    #[test]
    fn test_bookmaker_last_update_stamps_quotes() {
        let stamp = Utc::now() - chrono::Duration::seconds(42);
        let mut bm = bookmaker("betfair", "h2h", vec![("Arsenal", 2.1)]);
        bm.last_update = Some(stamp);
        let snaps = build_snapshots(&[event("ev1", vec![bm])], &MarketMapper::default(), Utc::now());
        assert_eq!(snaps[0].quotes()[0].observed_at, stamp);
    }

    #[test]
    fn test_wire_format_deserializes() {
        let json = r#"{
            "id": "abc123",
            "sport_key": "soccer_epl",
            "commence_time": "2026-03-01T15:00:00Z",
            "home_team": "Arsenal",
            "away_team": "Spurs",
            "bookmakers": [{
                "key": "betfair",
                "last_update": "2026-03-01T14:00:00Z",
                "markets": [{
                    "key": "h2h",
                    "outcomes": [
                        {"name": "Arsenal", "price": 2.1},
                        {"name": "Spurs", "price": 3.9}
                    ]
                }]
            }]
        }"#;
        let event: EventOdds = serde_json::from_str(json).unwrap();
        assert_eq!(event.bookmakers.len(), 1);
        assert_eq!(event.bookmakers[0].markets[0].outcomes[1].price, 3.9);
    }
}
