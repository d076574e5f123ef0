//! Market and outcome name normalization.
//!
//! Bookmakers and feeds disagree on market keys ("moneyline", "1x2",
//! "match_winner" are all the same bet) and on outcome labels ("Tie",
//! "The Draw"). Cross-bookmaker comparison only works after both are
//! mapped onto a single internal vocabulary.

use std::collections::{HashMap, HashSet};

/// Standard internal market keys.
pub const H2H: &str = "h2h";
pub const SPREADS: &str = "spreads";
pub const TOTALS: &str = "totals";

/// Maps feed market keys and outcome labels onto the internal vocabulary.
pub struct MarketMapper {
    aliases: HashMap<&'static str, &'static str>,
}

impl Default for MarketMapper {
    fn default() -> Self {
        let aliases = HashMap::from([
            ("h2h", H2H),
            ("h2h_lay", H2H),
            ("moneyline", H2H),
            ("match_winner", H2H),
            ("1x2", H2H),
            ("spreads", SPREADS),
            ("handicap", SPREADS),
            ("asian_handicap", SPREADS),
            ("totals", TOTALS),
            ("over_under", TOTALS),
        ]);
        Self { aliases }
    }
}

impl MarketMapper {
    /// Convert a feed market key to the internal standard key.
    /// Unknown keys pass through lowercased so new markets are not lost.
    pub fn normalize_market_key(&self, api_key: &str) -> String {
        let lower = api_key.to_lowercase();
        self.aliases
            .get(lower.as_str())
            .map(|k| k.to_string())
            .unwrap_or(lower)
    }

    /// All feed keys that map onto the same internal market.
    /// Useful for requesting every equivalent key from an API.
    pub fn equivalent_keys(&self, market_key: &str) -> HashSet<&'static str> {
        let normalized = self.normalize_market_key(market_key);
        self.aliases
            .iter()
            .filter(|(_, v)| **v == normalized)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Standardize an outcome label for cross-bookmaker matching.
    /// e.g. "Under 2.5 Goals" → "u2.5", "The Draw" → "draw".
    pub fn standardize_outcome(&self, name: &str) -> String {
        let mut name = name.to_lowercase().trim().to_string();

        name = name.replace("over ", "o").replace("under ", "u");
        name = name.replace("goals", "").trim().to_string();

        if matches!(name.as_str(), "tie" | "the draw" | "draw (x)") {
            name = "draw".to_string();
        }

        name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
