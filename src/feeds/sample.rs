//! Deterministic sample feed.
//!
//! Serves canned events when no API key is configured, so the full
//! scan→detect→persist→alert cycle can run dry without touching the
//! network or spending quota.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{BookmakerOdds, EventOdds, FetchResult, MarketOdds, OddsFeed, OutcomeOdds};

pub struct SampleFeed;

impl SampleFeed {
    fn bookmaker(key: &str, outcomes: &[(&str, f64)]) -> BookmakerOdds {
        BookmakerOdds {
            key: key.to_string(),
            last_update: Some(Utc::now()),
            markets: vec![MarketOdds {
                key: "h2h".to_string(),
                outcomes: outcomes
                    .iter()
                    .map(|(name, price)| OutcomeOdds {
                        name: name.to_string(),
                        price: *price,
                    })
                    .collect(),
            }],
        }
    }
}

#[async_trait]
impl OddsFeed for SampleFeed {
    async fn fetch_odds(&self, sport_key: &str) -> Result<FetchResult> {
        let commence = Utc::now() + Duration::hours(6);

        let events = vec![
            // Cross-bookmaker prices that sum below 1 — a real surebet.
            EventOdds {
                id: format!("{sport_key}-sample-arb"),
                sport_key: sport_key.to_string(),
                commence_time: commence,
                home_team: "Home United".to_string(),
                away_team: "Away City".to_string(),
                bookmakers: vec![
                    Self::bookmaker("alphabook", &[("Home United", 2.10), ("Draw", 3.40), ("Away City", 4.10)]),
                    Self::bookmaker("betahouse", &[("Home United", 1.95), ("Draw", 3.80), ("Away City", 4.20)]),
                    Self::bookmaker("gammabet", &[("Home United", 2.00), ("Draw", 3.60), ("Away City", 4.50)]),
                ],
            },
            // Ordinary overround market — no opportunity.
            EventOdds {
                id: format!("{sport_key}-sample-quiet"),
                sport_key: sport_key.to_string(),
                commence_time: commence,
                home_team: "North FC".to_string(),
                away_team: "South FC".to_string(),
                bookmakers: vec![
                    Self::bookmaker("alphabook", &[("North FC", 1.90), ("Draw", 3.30), ("South FC", 3.90)]),
                    Self::bookmaker("betahouse", &[("North FC", 1.85), ("Draw", 3.40), ("South FC", 4.00)]),
                ],
            },
        ];

        Ok(FetchResult {
            events,
            usage: None,
        })
    }

    fn name(&self) -> &str {
        "sample"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
