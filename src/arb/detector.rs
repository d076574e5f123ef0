//! Cross-bookmaker arbitrage detection.
//!
//! Given a `MarketSnapshot`, finds the profit-maximizing combination of
//! one bookmaker price per outcome whose implied probabilities sum to
//! less than one, and packages it as an `ArbitrageOpportunity`.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::arb::calc;
use crate::types::{ArbitrageOpportunity, MarketSnapshot, OddsQuote, OpportunityLeg};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Detection thresholds and policy knobs. Defaults mirror config.toml;
/// at runtime they are always overridden from `[scanner]`.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Minimum profit percentage to report — the margin epsilon that
    /// filters noise and fee-eroded combinations.
    pub min_profit_pct: f64,
    /// Sanity ceiling: margins above this are almost always bad feed data
    /// (stale outright prices, mismatched outcomes) and are rejected.
    pub max_profit_pct: f64,
    /// Total stake the allocation is computed against.
    pub total_stake: f64,
    /// Whether one bookmaker may fill more than one leg. Even when false,
    /// a bookmaker that is the sole offerer for an outcome may be reused.
    pub allow_shared_bookmaker: bool,
    /// How long a stored opportunity stays "live" for re-detection
    /// suppression.
    pub staleness_window: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_profit_pct: 0.5,
            max_profit_pct: 30.0,
            total_stake: 100.0,
            allow_shared_bookmaker: false,
            staleness_window: Duration::seconds(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Pure function of a snapshot: no I/O, no suspension, deterministic.
pub struct OpportunityDetector {
    config: DetectorConfig,
}

impl OpportunityDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Find the best arbitrage combination in a snapshot, if any.
    ///
    /// A snapshot with no quotes, an incomplete outcome set, or no
    /// combination above the minimum margin yields `None` — none of
    /// those are errors.
    pub fn detect(&self, snapshot: &MarketSnapshot) -> Option<ArbitrageOpportunity> {
        if snapshot.is_empty() || snapshot.outcomes.len() < 2 {
            return None;
        }

        // Per-outcome candidate lists: valid quotes, best price first,
        // ties broken by earliest observation for determinism.
        let mut candidates: Vec<Vec<&OddsQuote>> = Vec::new();
        for outcome in &snapshot.outcomes {
            let mut quotes: Vec<&OddsQuote> = snapshot
                .quotes_for(outcome)
                .filter(|q| {
                    let valid = q.price.is_finite() && q.price > 1.0;
                    if !valid {
                        warn!(
                            event_id = %q.event_id,
                            bookmaker = %q.bookmaker,
                            outcome = %q.outcome,
                            price = q.price,
                            "Dropping malformed quote"
                        );
                    }
                    valid
                })
                .collect();

            if quotes.is_empty() {
                // Cannot arbitrage an outcome with no offered price.
                debug!(
                    event_id = %snapshot.event_id,
                    market = %snapshot.market_type,
                    outcome = %outcome,
                    "Market incomplete, skipping"
                );
                return None;
            }

            quotes.sort_by(|a, b| {
                b.price
                    .partial_cmp(&a.price)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.observed_at.cmp(&b.observed_at))
            });
            candidates.push(quotes);
        }

        let chosen = if self.config.allow_shared_bookmaker {
            vec![0; candidates.len()]
        } else {
            resolve_bookmaker_conflicts(&candidates)
        };

        let legs: Vec<&OddsQuote> = chosen
            .iter()
            .zip(&candidates)
            .map(|(&i, list)| list[i])
            .collect();

        let prices: Vec<f64> = legs.iter().map(|q| q.price).collect();
        let total = match calc::arbitrage_margin(&prices) {
            Ok(t) => t,
            Err(e) => {
                // Candidates are pre-validated, so this is unreachable in
                // practice; treat it as data quality, not a failure.
                warn!(event_id = %snapshot.event_id, error = %e, "Margin computation rejected legs");
                return None;
            }
        };

        if total >= 1.0 - self.config.min_profit_pct / 100.0 {
            return None;
        }

        let profit = calc::profit_pct(total);
        if profit > self.config.max_profit_pct {
            warn!(
                event_id = %snapshot.event_id,
                market = %snapshot.market_type,
                profit_pct = profit,
                "Margin above sanity ceiling, treating as bad data"
            );
            return None;
        }

        let (stakes, guaranteed_return) =
            match calc::stake_allocation(&prices, self.config.total_stake) {
                Ok(r) => r,
                Err(e) => {
                    warn!(event_id = %snapshot.event_id, error = %e, "Stake allocation failed");
                    return None;
                }
            };

        let legs = legs
            .iter()
            .zip(stakes)
            .map(|(q, stake)| OpportunityLeg {
                outcome: q.outcome.clone(),
                bookmaker: q.bookmaker.clone(),
                odds: q.price,
                stake,
            })
            .collect();

        Some(ArbitrageOpportunity {
            id: Uuid::new_v4(),
            event_id: snapshot.event_id.clone(),
            sport_key: snapshot.sport_key.clone(),
            market_type: snapshot.market_type.clone(),
            legs,
            total_implied: total,
            profit_pct: profit,
            total_stake: self.config.total_stake,
            guaranteed_return,
            detected_at: Utc::now(),
        })
    }

    /// Whether `candidate` is a re-detection of a previously stored
    /// opportunity: same bookmaker/odds combination and still inside the
    /// staleness window. Re-detections are not newly alertable and must
    /// not create a second record.
    pub fn is_redetection(
        &self,
        previous: &ArbitrageOpportunity,
        candidate: &ArbitrageOpportunity,
        now: DateTime<Utc>,
    ) -> bool {
        candidate.same_combination(previous)
            && now - previous.detected_at <= self.config.staleness_window
    }
}

/// Pick one candidate index per outcome so that no bookmaker fills two
/// legs, unless it is the only bookmaker offering odds for an outcome.
///
/// Greedy: start from the best price everywhere; while some bookmaker
/// holds multiple legs, keep it on the leg where switching away costs the
/// most and advance the others to their best price from a different
/// bookmaker. Each step advances an index, so the loop terminates.
fn resolve_bookmaker_conflicts(candidates: &[Vec<&OddsQuote>]) -> Vec<usize> {
    let mut chosen = vec![0usize; candidates.len()];

    loop {
        let mut switched = false;

        for i in 0..candidates.len() {
            let bookmaker = candidates[i][chosen[i]].bookmaker.clone();
            let conflicts: Vec<usize> = (0..candidates.len())
                .filter(|&j| candidates[j][chosen[j]].bookmaker == bookmaker)
                .collect();
            if conflicts.len() < 2 {
                continue;
            }

            // Cost of moving a leg off this bookmaker: price lost to the
            // best alternative. No alternative (sole offerer) → untouchable.
            let moves: Vec<(usize, Option<usize>, f64)> = conflicts
                .iter()
                .map(|&j| {
                    let alt = (chosen[j] + 1..candidates[j].len())
                        .find(|&k| candidates[j][k].bookmaker != bookmaker);
                    let cost = match alt {
                        Some(k) => candidates[j][chosen[j]].price - candidates[j][k].price,
                        None => f64::INFINITY,
                    };
                    (j, alt, cost)
                })
                .collect();

            let keep = moves
                .iter()
                .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
                .map(|m| m.0)
                .unwrap_or(conflicts[0]);

            for (j, alt, _) in moves {
                if j == keep {
                    continue;
                }
                if let Some(k) = alt {
                    chosen[j] = k;
                    switched = true;
                }
            }
        }

        if !switched {
            return chosen;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketSnapshot;

    fn quote(bookmaker: &str, outcome: &str, price: f64) -> OddsQuote {
        quote_at(bookmaker, outcome, price, Utc::now())
    }

    fn quote_at(bookmaker: &str, outcome: &str, price: f64, at: DateTime<Utc>) -> OddsQuote {
        OddsQuote {
            bookmaker: bookmaker.to_string(),
            event_id: "ev1".to_string(),
            market_type: "h2h".to_string(),
            outcome: outcome.to_string(),
            price,
            observed_at: at,
        }
    }

    fn snapshot(quotes: Vec<OddsQuote>) -> MarketSnapshot {
        let mut snap = MarketSnapshot::new("ev1", "soccer_epl", "h2h", Utc::now());
        for q in quotes {
            snap.insert(q);
        }
        snap
    }

    fn detector() -> OpportunityDetector {
        OpportunityDetector::new(DetectorConfig::default())
    }

    #[test]
    fn test_three_way_surebet_detected() {
        let snap = snapshot(vec![
            quote("betfair", "home", 2.10),
            quote("pinnacle", "home", 1.95),
            quote("pinnacle", "draw", 3.80),
            quote("unibet", "draw", 3.50),
            quote("unibet", "away", 4.50),
            quote("betfair", "away", 4.10),
        ]);

        let opp = detector().detect(&snap).expect("opportunity");
        assert_eq!(opp.legs.len(), 3);
        assert!((opp.total_implied - 0.9616).abs() < 0.0005);
        assert!((opp.profit_pct - 3.99).abs() < 0.01);
        assert!((opp.guaranteed_return - 103.99).abs() < 0.01);

        // Best price per outcome, each from a different bookmaker.
        let by_outcome: Vec<(&str, &str, f64)> = opp
            .legs
            .iter()
            .map(|l| (l.outcome.as_str(), l.bookmaker.as_str(), l.odds))
            .collect();
        assert!(by_outcome.contains(&("home", "betfair", 2.10)));
        assert!(by_outcome.contains(&("draw", "pinnacle", 3.80)));
        assert!(by_outcome.contains(&("away", "unibet", 4.50)));
    }

    #[test]
    fn test_no_opportunity_when_margin_at_or_above_one() {
        let snap = snapshot(vec![
            quote("a", "home", 2.0),
            quote("b", "draw", 2.0),
            quote("c", "away", 2.0),
        ]);
        assert!(detector().detect(&snap).is_none());
    }

    #[test]
    fn test_empty_snapshot_is_quietly_none() {
        let snap = MarketSnapshot::new("ev1", "soccer_epl", "h2h", Utc::now());
        assert!(detector().detect(&snap).is_none());
    }

    #[test]
    fn test_missing_outcome_blocks_even_profitable_subset() {
        // Home/away alone would be a 2-way arb, but the market has a
        // declared draw outcome with no price.
        let mut snap = snapshot(vec![
            quote("a", "home", 2.2),
            quote("b", "away", 2.2),
        ]);
        snap.declare_outcome("draw");
        assert!(detector().detect(&snap).is_none());
    }

    #[test]
    fn test_malformed_only_quote_makes_market_incomplete() {
        let snap = snapshot(vec![
            quote("a", "home", 2.2),
            quote("b", "away", 2.2),
            quote("c", "draw", 0.0), // malformed, excluded, but outcome stays declared
        ]);
        assert!(detector().detect(&snap).is_none());
    }

    #[test]
    fn test_malformed_quote_excluded_but_alternatives_used() {
        let snap = snapshot(vec![
            quote("a", "home", 2.2),
            quote("b", "away", 0.0),
            quote("c", "away", 2.2),
        ]);
        let opp = detector().detect(&snap).expect("opportunity");
        let away = opp.legs.iter().find(|l| l.outcome == "away").unwrap();
        assert_eq!(away.bookmaker, "c");
    }

    #[test]
    fn test_tie_broken_by_earliest_observation() {
        let now = Utc::now();
        let snap = snapshot(vec![
            quote_at("late", "home", 2.2, now + Duration::seconds(10)),
            quote_at("early", "home", 2.2, now),
            quote("other", "away", 2.2),
        ]);
        let opp = detector().detect(&snap).expect("opportunity");
        let home = opp.legs.iter().find(|l| l.outcome == "home").unwrap();
        assert_eq!(home.bookmaker, "early");
    }

    #[test]
    fn test_detection_is_idempotent() {
        let snap = snapshot(vec![
            quote("a", "home", 2.10),
            quote("b", "draw", 3.80),
            quote("c", "away", 4.50),
        ]);
        let d = detector();
        let first = d.detect(&snap).unwrap();
        let second = d.detect(&snap).unwrap();
        assert!(first.same_combination(&second));
        assert_eq!(first.total_implied, second.total_implied);
        assert_eq!(first.profit_pct, second.profit_pct);
    }

    #[test]
    fn test_min_profit_epsilon_filters_thin_margins() {
        // Total implied ≈ 0.9985 — profitable on paper, below a 1% floor.
        let snap = snapshot(vec![
            quote("a", "home", 2.003),
            quote("b", "away", 2.003),
        ]);
        let strict = OpportunityDetector::new(DetectorConfig {
            min_profit_pct: 1.0,
            ..DetectorConfig::default()
        });
        assert!(strict.detect(&snap).is_none());

        let loose = OpportunityDetector::new(DetectorConfig {
            min_profit_pct: 0.01,
            ..DetectorConfig::default()
        });
        assert!(loose.detect(&snap).is_some());
    }

    #[test]
    fn test_max_profit_ceiling_rejects_suspect_data() {
        // 50%+ margin — realistically a feed glitch.
        let snap = snapshot(vec![
            quote("a", "home", 3.5),
            quote("b", "away", 3.5),
        ]);
        assert!(detector().detect(&snap).is_none());

        let permissive = OpportunityDetector::new(DetectorConfig {
            max_profit_pct: 100.0,
            ..DetectorConfig::default()
        });
        assert!(permissive.detect(&snap).is_some());
    }

    #[test]
    fn test_shared_bookmaker_displaced_to_next_best() {
        // "sharp" has the best price on both outcomes; policy forbids
        // reuse, so one leg moves to the runner-up.
        let snap = snapshot(vec![
            quote("sharp", "home", 2.30),
            quote("soft", "home", 2.25),
            quote("sharp", "away", 2.10),
            quote("soft", "away", 2.05),
        ]);
        let opp = detector().detect(&snap).expect("opportunity");
        let bookmakers: Vec<&str> = opp.legs.iter().map(|l| l.bookmaker.as_str()).collect();
        assert!(bookmakers.contains(&"sharp"));
        assert!(bookmakers.contains(&"soft"));

        // The kept sharp leg is the one where switching cost more.
        let home = opp.legs.iter().find(|l| l.outcome == "home").unwrap();
        assert_eq!(home.bookmaker, "sharp"); // 0.05 lost vs 0.05... equal here
        let away = opp.legs.iter().find(|l| l.outcome == "away").unwrap();
        assert_eq!(away.bookmaker, "soft");
    }

    #[test]
    fn test_sole_offerer_may_fill_two_legs() {
        let snap = snapshot(vec![
            quote("only", "home", 2.30),
            quote("only", "away", 2.30), // no one else prices "away"
        ]);
        let opp = detector().detect(&snap).expect("opportunity");
        assert!(opp.legs.iter().all(|l| l.bookmaker == "only"));
    }

    #[test]
    fn test_allow_shared_bookmaker_takes_best_everywhere() {
        let snap = snapshot(vec![
            quote("sharp", "home", 2.30),
            quote("soft", "home", 2.25),
            quote("sharp", "away", 2.10),
            quote("soft", "away", 2.05),
        ]);
        let d = OpportunityDetector::new(DetectorConfig {
            allow_shared_bookmaker: true,
            ..DetectorConfig::default()
        });
        let opp = d.detect(&snap).expect("opportunity");
        assert!(opp.legs.iter().all(|l| l.bookmaker == "sharp"));
    }

    #[test]
    fn test_redetection_inside_window() {
        let d = detector();
        let snap = snapshot(vec![
            quote("a", "home", 2.10),
            quote("b", "draw", 3.80),
            quote("c", "away", 4.50),
        ]);
        let prev = d.detect(&snap).unwrap();
        let cand = d.detect(&snap).unwrap();

        let now = prev.detected_at + Duration::seconds(30);
        assert!(d.is_redetection(&prev, &cand, now));

        // Past the staleness window the combination is alertable again.
        let later = prev.detected_at + Duration::seconds(120);
        assert!(!d.is_redetection(&prev, &cand, later));
    }

    #[test]
    fn test_odds_move_is_not_a_redetection() {
        let d = detector();
        let snap = snapshot(vec![
            quote("a", "home", 2.10),
            quote("b", "draw", 3.80),
            quote("c", "away", 4.50),
        ]);
        let prev = d.detect(&snap).unwrap();

        let moved_snap = snapshot(vec![
            quote("a", "home", 2.15),
            quote("b", "draw", 3.80),
            quote("c", "away", 4.50),
        ]);
        let cand = d.detect(&moved_snap).unwrap();
        assert!(!d.is_redetection(&prev, &cand, prev.detected_at + Duration::seconds(5)));
    }
}
