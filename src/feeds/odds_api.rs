//! The Odds API integration.
//!
//! API docs: https://the-odds-api.com/liveapi/guides/v4/
//! Base URL: https://api.the-odds-api.com/v4
//! Quota: monthly request budget; every response reports usage via the
//! `x-requests-remaining` / `x-requests-used` headers.
//! Auth: `apiKey` query parameter.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::{EventOdds, FetchResult, OddsFeed};
use crate::quota::ReportedUsage;

const BASE_URL: &str = "https://api.the-odds-api.com/v4";
const FEED_NAME: &str = "the-odds-api";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Entry from `/v4/sports` — used to validate the API key at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SportInfo {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub active: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The Odds API client.
pub struct TheOddsApiClient {
    http: Client,
    api_key: SecretString,
    regions: String,
    markets: String,
}

impl TheOddsApiClient {
    pub fn new(api_key: SecretString, regions: &str, markets: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("surebet/0.1")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_key,
            regions: regions.to_string(),
            markets: markets.to_string(),
        })
    }

    /// List available sports. Cheap way to verify the API key works
    /// before entering the scan loop.
    pub async fn list_sports(&self) -> Result<Vec<SportInfo>> {
        let url = format!("{BASE_URL}/sports");
        let response = self
            .http
            .get(&url)
            .query(&[("apiKey", self.api_key.expose_secret().as_str())])
            .send()
            .await
            .context("Sports list request failed")?;

        if !response.status().is_success() {
            bail!("Sports list request returned {}", response.status());
        }

        let sports: Vec<SportInfo> = response
            .json()
            .await
            .context("Failed to parse sports list")?;
        info!(count = sports.len(), "The Odds API key validated");
        Ok(sports)
    }
}

#[async_trait]
impl OddsFeed for TheOddsApiClient {
    async fn fetch_odds(&self, sport_key: &str) -> Result<FetchResult> {
        let url = format!("{BASE_URL}/sports/{sport_key}/odds");
        debug!(sport = sport_key, "Fetching odds");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.expose_secret().as_str()),
                ("regions", self.regions.as_str()),
                ("markets", self.markets.as_str()),
                ("oddsFormat", "decimal"),
            ])
            .send()
            .await
            .with_context(|| format!("Odds request for {sport_key} failed"))?;

        let status = response.status();
        let usage = usage_from_headers(response.headers());

        if !status.is_success() {
            bail!("Odds request for {sport_key} returned {status}");
        }

        let events: Vec<EventOdds> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse odds for {sport_key}"))?;

        if let Some(u) = usage {
            debug!(used = u.used, remaining = u.remaining, "API quota headers");
        }
        info!(sport = sport_key, events = events.len(), "Odds retrieved");

        Ok(FetchResult { events, usage })
    }

    fn name(&self) -> &str {
        FEED_NAME
    }
}

/// Parse the authoritative quota figures The Odds API attaches to every
/// response. Absent or unparsable headers yield `None`.
fn usage_from_headers(headers: &HeaderMap) -> Option<ReportedUsage> {
    let parse = |name: &str| -> Option<u32> {
        headers
            .get(name)?
            .to_str()
            .ok()?
            .parse::<f64>()
            .ok()
            .map(|v| v.max(0.0) as u32)
    };

    Some(ReportedUsage {
        remaining: parse("x-requests-remaining")?,
        used: parse("x-requests-used")?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_usage_parsed_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-requests-remaining", HeaderValue::from_static("458"));
        headers.insert("x-requests-used", HeaderValue::from_static("42"));

        let usage = usage_from_headers(&headers).unwrap();
        assert_eq!(usage.remaining, 458);
        assert_eq!(usage.used, 42);
    }

    #[test]
    fn test_fractional_usage_headers_truncate() {
        // The API occasionally reports fractional request costs.
        let mut headers = HeaderMap::new();
        headers.insert("x-requests-remaining", HeaderValue::from_static("457.5"));
        headers.insert("x-requests-used", HeaderValue::from_static("42.5"));

        let usage = usage_from_headers(&headers).unwrap();
        assert_eq!(usage.remaining, 457);
        assert_eq!(usage.used, 42);
    }

    #[test]
    fn test_missing_headers_yield_none() {
        assert!(usage_from_headers(&HeaderMap::new()).is_none());

        let mut partial = HeaderMap::new();
        partial.insert("x-requests-remaining", HeaderValue::from_static("10"));
        assert!(usage_from_headers(&partial).is_none());
    }

    #[test]
    fn test_garbage_headers_yield_none() {
        let mut headers = HeaderMap::new();
        headers.insert("x-requests-remaining", HeaderValue::from_static("lots"));
        headers.insert("x-requests-used", HeaderValue::from_static("42"));
        assert!(usage_from_headers(&headers).is_none());
    }
}
