//! Alert delivery.
//!
//! Opportunities that survive deduplication are pushed to an
//! `AlertSink`. The only production sink is Telegram; the engine treats
//! delivery as best-effort — one retry, then the alert is dropped and
//! the cycle moves on. A missed alert must never stall scanning.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{info, warn};

use crate::types::ArbitrageOpportunity;

/// Abstraction over notification channels.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one opportunity alert. A single bounded retry is the
    /// implementation's business; beyond that, return the error.
    async fn notify(&self, opportunity: &ArbitrageOpportunity) -> Result<()>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Message formatting
// ---------------------------------------------------------------------------

/// Render an opportunity as a Telegram HTML message.
///
/// This is the presentation boundary — the one place where stakes and
/// percentages get rounded.
pub fn format_opportunity(opportunity: &ArbitrageOpportunity) -> String {
    let mut odds_lines = String::new();
    let mut stake_lines = String::new();
    for leg in &opportunity.legs {
        odds_lines.push_str(&format!(
            "• {}: {} @ {:.2}\n",
            leg.bookmaker, leg.outcome, leg.odds
        ));
        stake_lines.push_str(&format!(
            "• {} ({}): ${:.2}\n",
            leg.bookmaker, leg.outcome, leg.stake
        ));
    }

    format!(
        "🎯 <b>ARBITRAGE OPPORTUNITY DETECTED!</b>\n\n\
         📊 <b>Profit:</b> <code>{:.2}%</code>\n\
         ⚽ <b>Sport:</b> {}\n\
         🎮 <b>Market:</b> {}\n\n\
         <b>Odds:</b>\n{}\n\
         <b>Optimal Stakes (${:.2} total):</b>\n{}\n\
         💰 <b>Guaranteed Return:</b> ${:.2}",
        opportunity.profit_pct,
        opportunity.sport_key,
        opportunity.market_type,
        odds_lines,
        opportunity.total_stake,
        stake_lines,
        opportunity.guaranteed_return,
    )
}

// ---------------------------------------------------------------------------
// Telegram sink
// ---------------------------------------------------------------------------

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Telegram Bot API notifier. Pure sink: no command handling, no
/// polling — it only posts formatted messages to one chat.
pub struct TelegramNotifier {
    http: Client,
    bot_token: SecretString,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            bot_token,
            chat_id: chat_id.to_string(),
        })
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!(
            "{TELEGRAM_API}/bot{}/sendMessage",
            self.bot_token.expose_secret()
        );
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .context("Telegram request failed")?;

        if !response.status().is_success() {
            bail!("Telegram returned {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl AlertSink for TelegramNotifier {
    async fn notify(&self, opportunity: &ArbitrageOpportunity) -> Result<()> {
        let text = format_opportunity(opportunity);

        // One bounded retry, then give up — the engine logs and drops.
        if let Err(first) = self.send_message(&text).await {
            warn!(error = %first, "Telegram send failed, retrying once");
            self.send_message(&text)
                .await
                .context("Telegram send failed after retry")?;
        }

        info!(
            event_id = %opportunity.event_id,
            profit_pct = format!("{:.2}", opportunity.profit_pct),
            "Alert sent"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpportunityLeg;
    use chrono::Utc;
    use uuid::Uuid;

    fn opportunity() -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            id: Uuid::new_v4(),
            event_id: "ev1".to_string(),
            sport_key: "soccer_epl".to_string(),
            market_type: "h2h".to_string(),
            legs: vec![
                OpportunityLeg {
                    outcome: "home".to_string(),
                    bookmaker: "betfair".to_string(),
                    odds: 2.1,
                    stake: 49.5238,
                },
                OpportunityLeg {
                    outcome: "draw".to_string(),
                    bookmaker: "pinnacle".to_string(),
                    odds: 3.8,
                    stake: 27.3684,
                },
                OpportunityLeg {
                    outcome: "away".to_string(),
                    bookmaker: "unibet".to_string(),
                    odds: 4.5,
                    stake: 23.1111,
                },
            ],
            total_implied: 0.9616,
            profit_pct: 3.9933,
            total_stake: 100.0,
            guaranteed_return: 103.9933,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_includes_all_legs_and_totals() {
        let text = format_opportunity(&opportunity());
        assert!(text.contains("3.99%"));
        assert!(text.contains("soccer_epl"));
        assert!(text.contains("betfair: home @ 2.10"));
        assert!(text.contains("pinnacle: draw @ 3.80"));
        assert!(text.contains("unibet: away @ 4.50"));
        assert!(text.contains("betfair (home): $49.52"));
        assert!(text.contains("$103.99"));
    }

    #[test]
    fn test_format_rounds_only_at_presentation() {
        // The unrounded stake lives on the opportunity; the message
        // carries the two-decimal rendering.
        let opp = opportunity();
        assert!((opp.legs[0].stake - 49.5238).abs() < 1e-9);
        let text = format_opportunity(&opp);
        assert!(text.contains("$49.52"));
        assert!(!text.contains("49.5238"));
    }
}
