//! Scan orchestrator.
//!
//! Drives one cycle: authorize sports against the API quota, fetch the
//! authorized ones concurrently, build snapshots, run detection, persist
//! evidence, and forward new opportunities to the alert sink.
//!
//! Failure containment is the rule: a failed fetch skips that sport, a
//! failed persist skips that event, a failed alert is dropped after the
//! sink's own bounded retry. Only the process shutdown signal or a fatal
//! configuration error stops the loop, and both live in `main`.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::alerts::AlertSink;
use crate::arb::detector::OpportunityDetector;
use crate::feeds::{build_snapshots, FetchResult, OddsFeed};
use crate::markets::MarketMapper;
use crate::quota::QuotaTracker;
use crate::storage::{SqliteStore, StoreStats};
use crate::types::MarketSnapshot;

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Summary of one scan cycle. Skip counts are observability, not
/// control flow — a cycle full of skips still completes normally.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub sports_scanned: usize,
    pub sports_skipped_quota: usize,
    pub sports_failed: usize,
    pub events_seen: usize,
    pub snapshots_built: usize,
    pub opportunities_detected: usize,
    pub opportunities_new: usize,
    pub alerts_sent: usize,
    pub persist_failures: usize,
    pub quota_remaining: u32,
    pub timestamp: chrono::DateTime<Utc>,
}

impl CycleReport {
    fn new(cycle_number: u64) -> Self {
        Self {
            cycle_number,
            sports_scanned: 0,
            sports_skipped_quota: 0,
            sports_failed: 0,
            events_seen: 0,
            snapshots_built: 0,
            opportunities_detected: 0,
            opportunities_new: 0,
            alerts_sent: 0,
            persist_failures: 0,
            quota_remaining: 0,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// The scan-cycle orchestrator.
///
/// Owns the quota tracker behind a `Mutex`: it is the one piece of
/// mutable state shared by concurrent fetch tasks, and check/record must
/// never interleave.
pub struct Scanner {
    feed: Box<dyn OddsFeed>,
    detector: OpportunityDetector,
    store: SqliteStore,
    sink: Option<Box<dyn AlertSink>>,
    quota: Mutex<QuotaTracker>,
    mapper: MarketMapper,
    sports: Vec<String>,
}

impl Scanner {
    pub fn new(
        feed: Box<dyn OddsFeed>,
        detector: OpportunityDetector,
        store: SqliteStore,
        sink: Option<Box<dyn AlertSink>>,
        quota: QuotaTracker,
        sports: Vec<String>,
    ) -> Self {
        Self {
            feed,
            detector,
            store,
            sink,
            quota: Mutex::new(quota),
            mapper: MarketMapper::default(),
            sports,
        }
    }

    /// Run one full scan cycle. Never fails — per-item errors are
    /// contained, logged, and counted in the report.
    pub async fn run_cycle(&self, cycle_number: u64) -> CycleReport {
        let mut report = CycleReport::new(cycle_number);
        info!(cycle = cycle_number, sports = self.sports.len(), "Starting cycle");

        // 1. Authorize sports under a single lock acquisition: the i-th
        //    sport asks "may I make i+1 calls", so two tasks can never
        //    both be admitted against the same last unit of budget.
        let authorized: Vec<&String> = {
            let mut quota = self.quota.lock().expect("quota lock poisoned");
            let mut pending: u32 = 0;
            let mut authorized = Vec::new();
            for sport in &self.sports {
                match quota.check(pending + 1) {
                    Ok(_) => {
                        pending += 1;
                        authorized.push(sport);
                    }
                    Err(e) => {
                        warn!(sport = %sport, retry_in = %e.retry_in, "Quota denied, skipping sport");
                        report.sports_skipped_quota += 1;
                    }
                }
            }
            authorized
        };

        // 2. Fetch authorized sports concurrently.
        let fetches = join_all(
            authorized
                .iter()
                .map(|sport| self.fetch_sport(sport.as_str())),
        )
        .await;

        // 3. Detect, persist, alert — per event, skip-and-continue.
        for (sport, outcome) in fetches {
            match outcome {
                Ok(result) => {
                    report.sports_scanned += 1;
                    report.events_seen += result.events.len();
                    let snapshots = build_snapshots(&result.events, &self.mapper, Utc::now());
                    report.snapshots_built += snapshots.len();
                    for snapshot in &snapshots {
                        self.process_snapshot(snapshot, &mut report).await;
                    }
                }
                Err(e) => {
                    warn!(sport = %sport, error = %e, "Fetch failed, skipping sport");
                    report.sports_failed += 1;
                }
            }
        }

        report.quota_remaining = self
            .quota
            .lock()
            .expect("quota lock poisoned")
            .remaining();
        report.timestamp = Utc::now();
        report
    }

    /// Fetch one sport and settle the quota books: usage is recorded
    /// only after the call demonstrably happened, and the provider's
    /// own figures win when they are tighter than ours.
    async fn fetch_sport(&self, sport: &str) -> (String, anyhow::Result<FetchResult>) {
        let outcome = self.feed.fetch_odds(sport).await;

        if let Ok(result) = &outcome {
            let mut quota = self.quota.lock().expect("quota lock poisoned");
            quota.record(1);
            if let Some(usage) = result.usage {
                quota.reconcile(usage);
            }
        }

        (sport.to_string(), outcome)
    }

    async fn process_snapshot(&self, snapshot: &MarketSnapshot, report: &mut CycleReport) {
        // Evidence first: every alerted opportunity must be
        // reconstructible from stored state, so a failed snapshot save
        // means this market sits the cycle out.
        if let Err(e) = self.store.save_market_snapshot(snapshot).await {
            warn!(event_id = %snapshot.event_id, error = %e, "Snapshot persist failed, skipping event");
            report.persist_failures += 1;
            return;
        }

        let Some(opportunity) = self.detector.detect(snapshot) else {
            return;
        };
        report.opportunities_detected += 1;

        // Re-detection of a still-live combination: not newly alertable,
        // no second record.
        match self
            .store
            .find_live_opportunity(
                &opportunity.event_id,
                &opportunity.market_type,
                self.detector.config().staleness_window,
            )
            .await
        {
            Ok(Some(previous))
                if self
                    .detector
                    .is_redetection(&previous, &opportunity, Utc::now()) =>
            {
                debug!(
                    event_id = %opportunity.event_id,
                    market = %opportunity.market_type,
                    "Re-detection of live opportunity, suppressing"
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                // Dedup lookup failure: treat as new rather than lose an
                // alert; worst case is a duplicate notification.
                warn!(event_id = %opportunity.event_id, error = %e, "Dedup lookup failed");
            }
        }

        if let Err(e) = self.store.save_opportunity(&opportunity).await {
            warn!(event_id = %opportunity.event_id, error = %e, "Opportunity persist failed, not alerting");
            report.persist_failures += 1;
            return;
        }
        report.opportunities_new += 1;

        info!(
            event_id = %opportunity.event_id,
            market = %opportunity.market_type,
            profit_pct = format!("{:.2}", opportunity.profit_pct),
            legs = opportunity.legs.len(),
            "Arbitrage opportunity found"
        );

        if let Some(sink) = &self.sink {
            match sink.notify(&opportunity).await {
                Ok(()) => report.alerts_sent += 1,
                Err(e) => {
                    warn!(sink = sink.name(), error = %e, "Alert delivery failed, dropping");
                }
            }
        }
    }

    /// Current database counters, for the periodic stats log.
    pub async fn stats(&self) -> anyhow::Result<StoreStats> {
        self.store.stats().await
    }

    /// Remaining API budget in the current quota window.
    pub fn quota_remaining(&self) -> u32 {
        self.quota.lock().expect("quota lock poisoned").remaining()
    }
}
