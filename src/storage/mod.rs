//! Persistence layer.
//!
//! SQLite via sqlx. Two tables: `odds_snapshots` keeps the raw evidence
//! each cycle observed, `opportunities` keeps every detected arbitrage
//! as an immutable record. Opportunities are never updated — a moved
//! combination is saved as a new, superseding row so history stays
//! auditable. Legs and quotes are stored as JSON columns.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{ArbitrageOpportunity, MarketSnapshot, OpportunityLeg};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS odds_snapshots (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id    TEXT NOT NULL,
    sport_key   TEXT NOT NULL,
    market_type TEXT NOT NULL,
    observed_at TEXT NOT NULL,
    quotes      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS opportunities (
    id                TEXT PRIMARY KEY,
    event_id          TEXT NOT NULL,
    sport_key         TEXT NOT NULL,
    market_type       TEXT NOT NULL,
    total_implied     REAL NOT NULL,
    profit_pct        REAL NOT NULL,
    total_stake       REAL NOT NULL,
    guaranteed_return REAL NOT NULL,
    legs              TEXT NOT NULL,
    detected_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_opportunities_market
    ON opportunities (event_id, market_type, detected_at);
"#;

/// Row counts for the periodic stats log.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub snapshots_total: i64,
    pub opportunities_total: i64,
    pub opportunities_today: i64,
}

/// SQLite-backed store for snapshots and opportunities.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file and apply the schema.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {path}"))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path, "Database ready");
        Ok(store)
    }

    /// In-memory database for tests. Single connection, since each
    /// in-memory connection would otherwise be its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        // raw_sql: the schema is several statements in one batch.
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("Failed to apply schema")?;
        Ok(())
    }

    /// Persist the quotes a cycle observed for one event+market.
    pub async fn save_market_snapshot(&self, snapshot: &MarketSnapshot) -> Result<()> {
        let quotes =
            serde_json::to_string(snapshot.quotes()).context("Failed to serialise quotes")?;

        sqlx::query(
            "INSERT INTO odds_snapshots (event_id, sport_key, market_type, observed_at, quotes)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&snapshot.event_id)
        .bind(&snapshot.sport_key)
        .bind(&snapshot.market_type)
        .bind(snapshot.observed_at)
        .bind(quotes)
        .execute(&self.pool)
        .await
        .context("Failed to save market snapshot")?;

        debug!(
            event_id = %snapshot.event_id,
            market = %snapshot.market_type,
            quotes = snapshot.quotes().len(),
            "Snapshot saved"
        );
        Ok(())
    }

    /// Persist a detected opportunity as a new immutable record.
    pub async fn save_opportunity(&self, opportunity: &ArbitrageOpportunity) -> Result<()> {
        let legs =
            serde_json::to_string(&opportunity.legs).context("Failed to serialise legs")?;

        sqlx::query(
            "INSERT INTO opportunities
             (id, event_id, sport_key, market_type, total_implied, profit_pct,
              total_stake, guaranteed_return, legs, detected_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(opportunity.id.to_string())
        .bind(&opportunity.event_id)
        .bind(&opportunity.sport_key)
        .bind(&opportunity.market_type)
        .bind(opportunity.total_implied)
        .bind(opportunity.profit_pct)
        .bind(opportunity.total_stake)
        .bind(opportunity.guaranteed_return)
        .bind(legs)
        .bind(opportunity.detected_at)
        .execute(&self.pool)
        .await
        .context("Failed to save opportunity")?;

        debug!(
            id = %opportunity.id,
            event_id = %opportunity.event_id,
            profit_pct = opportunity.profit_pct,
            "Opportunity saved"
        );
        Ok(())
    }

    /// Most recent opportunity for an event+market that is still inside
    /// the staleness window. Used by the engine for re-detection
    /// suppression.
    pub async fn find_live_opportunity(
        &self,
        event_id: &str,
        market_type: &str,
        staleness: Duration,
    ) -> Result<Option<ArbitrageOpportunity>> {
        let cutoff = Utc::now() - staleness;
        let row = sqlx::query(
            "SELECT id, event_id, sport_key, market_type, total_implied, profit_pct,
                    total_stake, guaranteed_return, legs, detected_at
             FROM opportunities
             WHERE event_id = ? AND market_type = ? AND detected_at >= ?
             ORDER BY detected_at DESC
             LIMIT 1",
        )
        .bind(event_id)
        .bind(market_type)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query live opportunity")?;

        row.map(row_to_opportunity).transpose()
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let snapshots_total: i64 = sqlx::query("SELECT COUNT(*) AS n FROM odds_snapshots")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;

        let opportunities_total: i64 = sqlx::query("SELECT COUNT(*) AS n FROM opportunities")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;

        let start_of_day = Utc
            .from_utc_datetime(&Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap_or_default());
        let opportunities_today: i64 =
            sqlx::query("SELECT COUNT(*) AS n FROM opportunities WHERE detected_at >= ?")
                .bind(start_of_day)
                .fetch_one(&self.pool)
                .await?
                .try_get("n")?;

        Ok(StoreStats {
            snapshots_total,
            opportunities_total,
            opportunities_today,
        })
    }
}

fn row_to_opportunity(row: sqlx::sqlite::SqliteRow) -> Result<ArbitrageOpportunity> {
    let id: String = row.try_get("id")?;
    let legs_json: String = row.try_get("legs")?;
    let legs: Vec<OpportunityLeg> =
        serde_json::from_str(&legs_json).context("Failed to parse stored legs")?;
    let detected_at: DateTime<Utc> = row.try_get("detected_at")?;

    Ok(ArbitrageOpportunity {
        id: Uuid::parse_str(&id).context("Malformed opportunity id in store")?,
        event_id: row.try_get("event_id")?,
        sport_key: row.try_get("sport_key")?,
        market_type: row.try_get("market_type")?,
        legs,
        total_implied: row.try_get("total_implied")?,
        profit_pct: row.try_get("profit_pct")?,
        total_stake: row.try_get("total_stake")?,
        guaranteed_return: row.try_get("guaranteed_return")?,
        detected_at,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
