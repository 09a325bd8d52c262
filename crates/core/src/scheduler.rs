//! Poll loop driving valuation, thresholds, withdrawals and reporting.
//!
//! One cycle runs to completion before the next starts, and positions are
//! processed one at a time, so the registry and every position's baselines
//! have a single writer.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use watcher_chain::LiquidityClient;

use crate::config::{Thresholds, WatcherConfig};
use crate::portfolio::{PortfolioAggregator, PortfolioReport};
use crate::position_tracker::PositionTracker;
use crate::registry::PositionRegistry;
use crate::retry::{with_retry, RetryPolicy};
use crate::threshold::{Direction, ThresholdEvent};
use crate::valuation::{value_position, PositionSnapshot};

/// Scheduler settings, derived from [`WatcherConfig`].
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub value_token: Address,
    pub thresholds: Thresholds,
    pub poll_interval: Duration,
    pub report_all_every: Duration,
    pub removal_baseline_reset: Duration,
    pub failure_backoff: Duration,
    /// Applied to each position's valuation
    pub retry: RetryPolicy,
}

impl WatcherSettings {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            value_token: config.value_currency,
            thresholds: config.thresholds.clone(),
            poll_interval: config.schedule.poll_interval(),
            report_all_every: config.schedule.report_all_every(),
            removal_baseline_reset: config.schedule.removal_baseline_reset(),
            failure_backoff: config.schedule.failure_backoff(),
            retry: RetryPolicy::with_attempts(config.chain.rpc_attempts),
        }
    }
}

/// Two independent periodic deadlines, each advanced only when it fires.
#[derive(Debug, Clone)]
struct Deadlines {
    full_report: Instant,
    full_report_every: Duration,
    removal_reset: Instant,
    removal_reset_every: Duration,
}

impl Deadlines {
    fn new(start: Instant, full_report_every: Duration, removal_reset_every: Duration) -> Self {
        Self {
            full_report: start + full_report_every,
            full_report_every,
            removal_reset: start + removal_reset_every,
            removal_reset_every,
        }
    }

    fn full_report_due(&mut self, now: Instant) -> bool {
        fire(&mut self.full_report, self.full_report_every, now)
    }

    fn removal_reset_due(&mut self, now: Instant) -> bool {
        fire(&mut self.removal_reset, self.removal_reset_every, now)
    }
}

fn fire(deadline: &mut Instant, period: Duration, now: Instant) -> bool {
    if now >= *deadline {
        *deadline = now + period;
        true
    } else {
        false
    }
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Fresh valuations plus the last known value of each skipped position
    pub total: f64,
    pub valued: usize,
    pub skipped: usize,
    pub withdrawn: Vec<Address>,
    pub portfolio: Option<PortfolioReport>,
    /// Shutdown was requested before every position was processed
    pub cancelled: bool,
}

/// The liquidity watcher: owns the registry and all per-position state.
pub struct Watcher {
    client: Arc<dyn LiquidityClient>,
    settings: WatcherSettings,
    registry: PositionRegistry,
    tracker: PositionTracker,
    portfolio: PortfolioAggregator,
    deadlines: Deadlines,
    value_symbol: String,
    shutdown: CancellationToken,
}

impl Watcher {
    pub fn new(
        client: Arc<dyn LiquidityClient>,
        settings: WatcherSettings,
        registry: PositionRegistry,
        shutdown: CancellationToken,
    ) -> Self {
        let deadlines = Deadlines::new(
            Instant::now(),
            settings.report_all_every,
            settings.removal_baseline_reset,
        );
        Self {
            client,
            portfolio: PortfolioAggregator::new(settings.thresholds.percent_report_change),
            settings,
            registry,
            tracker: PositionTracker::new(),
            deadlines,
            value_symbol: String::new(),
            shutdown,
        }
    }

    pub fn registry(&self) -> &PositionRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn value_symbol(&self) -> &str {
        &self.value_symbol
    }

    /// Resolve the value currency and fill an empty registry from the chain.
    #[instrument(skip(self))]
    pub async fn bootstrap(&mut self) -> Result<()> {
        let client = Arc::clone(&self.client);
        let value_token = self.settings.value_token;

        let shutdown = &self.shutdown;
        self.value_symbol = with_retry(&self.settings.retry, shutdown, "resolve_symbol", || {
            client.resolve_symbol(value_token)
        })
        .await
        .context("resolving value currency symbol")?;

        info!(
            account = %client.account(),
            "Interval: {}s. Currency: {}.",
            self.settings.poll_interval.as_secs(),
            self.value_symbol
        );

        if self.registry.is_empty() {
            info!("No pools found. Searching for liquidity pools...");
            let pairs = with_retry(&self.settings.retry, &self.shutdown, "list_positions", || {
                client.list_positions_with_balance()
            })
            .await
            .context("listing positions with balance")?;

            for pair in pairs {
                self.registry.upsert(pair, 0.0);
            }
            info!("Found {} pools!", self.registry.len());
        } else {
            info!(
                path = %self.registry.path().display(),
                "Loaded {} pools from registry",
                self.registry.len()
            );
        }

        self.registry
            .save()
            .with_context(|| format!("writing registry {}", self.registry.path().display()))?;
        Ok(())
    }

    /// Poll until shutdown is requested.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            positions = self.registry.len(),
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            "Watcher started"
        );

        while !self.shutdown.is_cancelled() {
            let report = self.poll_cycle(Instant::now()).await;
            debug!(
                total = report.total,
                valued = report.valued,
                skipped = report.skipped,
                withdrawn = report.withdrawn.len(),
                "Cycle complete"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = self.shutdown.cancelled() => {}
            }
        }

        info!("Shutdown requested, watcher stopped");
        Ok(())
    }

    /// Run one cycle at time `now`.
    #[instrument(skip(self, now), fields(positions = self.registry.len()))]
    pub async fn poll_cycle(&mut self, now: Instant) -> CycleReport {
        let mut report = CycleReport::default();
        if self.shutdown.is_cancelled() {
            report.cancelled = true;
            return report;
        }

        let full_report = self.deadlines.full_report_due(now);
        if full_report {
            debug!("Full report due");
            self.tracker.clear_report_markers();
        }
        if self.deadlines.removal_reset_due(now) {
            info!("Resetting removal baselines");
            self.tracker.reset_removal_baselines();
        }

        for pair in self.registry.pairs() {
            if self.shutdown.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let Some(snapshot) = self.value(pair).await else {
                if self.shutdown.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                report.skipped += 1;
                // Keep the portfolio total comparable across an outage
                report.total += self.registry.last_value(&pair).unwrap_or(0.0);
                self.failure_backoff().await;
                continue;
            };

            report.valued += 1;
            report.total += snapshot.total_value;
            self.registry.upsert(pair, snapshot.total_value);

            if self.process(&snapshot).await {
                report.withdrawn.push(pair);
            }
        }

        if !report.cancelled {
            report.portfolio = self.portfolio.observe(report.total, full_report);
            if let Some(total) = &report.portfolio {
                info!(
                    reason = ?total.reason,
                    "Total (in {}): {}",
                    self.value_symbol,
                    total.total
                );
            }
        }

        for pair in &report.withdrawn {
            self.registry.remove(pair);
            self.tracker.remove(pair);
        }

        if let Err(e) = self.registry.save() {
            error!(
                path = %self.registry.path().display(),
                error = %e,
                "Failed to save registry"
            );
        }

        report
    }

    async fn value(&self, pair: Address) -> Option<PositionSnapshot> {
        let client = Arc::clone(&self.client);
        let value_token = self.settings.value_token;
        let shutdown = &self.shutdown;
        let result = with_retry(&self.settings.retry, shutdown, "value_position", || {
            value_position(client.as_ref(), pair, value_token, shutdown)
        })
        .await;

        match result {
            Ok(snapshot) => Some(snapshot),
            Err(e) if shutdown.is_cancelled() => {
                debug!(pair = %pair, error = %e, "Valuation abandoned on shutdown");
                None
            }
            Err(e) => {
                warn!(pair = %pair, error = %e, "Could not value position, skipping this cycle");
                None
            }
        }
    }

    /// Apply thresholds to one snapshot. Returns true when a withdrawal was dispatched.
    async fn process(&mut self, snapshot: &PositionSnapshot) -> bool {
        let pair = snapshot.pair;
        let observation = self
            .tracker
            .observe(pair, snapshot.total_value, &self.settings.thresholds);

        if self.tracker.needs_full_report(&pair) {
            info!(
                pair = %pair,
                "{}. {}: {:.5}. {}: {:.5}. value: {:.5}.",
                snapshot.label,
                snapshot.symbol_a,
                snapshot.amount_a,
                snapshot.symbol_b,
                snapshot.amount_b,
                snapshot.total_value
            );
            self.tracker.mark_reported(&pair);
        }
        if observation.first_seen {
            return false;
        }

        let mut withdrawn = false;
        for event in observation.events {
            match event {
                ThresholdEvent::Changed {
                    direction,
                    value,
                    previous,
                } => {
                    info!(
                        pair = %pair,
                        "{} is {} to {:.7} from {:.7}!",
                        snapshot.label, direction, value, previous
                    );
                }
                ThresholdEvent::WithdrawRequested {
                    direction,
                    baseline,
                    value,
                    percent,
                } => {
                    let moved = match direction {
                        Direction::Down => "down",
                        Direction::Up => "up",
                    };
                    warn!(
                        pair = %pair,
                        baseline = baseline,
                        value = value,
                        "WARNING: {} is {} {} percent.",
                        snapshot.label, moved, percent
                    );
                    self.withdraw(snapshot).await;
                    withdrawn = true;
                }
            }
        }
        withdrawn
    }

    /// Exactly one withdrawal call; the outcome is only logged.
    async fn withdraw(&self, snapshot: &PositionSnapshot) {
        info!(pair = %snapshot.pair, "Removing liquidity from pair: {}...", snapshot.label);
        match self.client.withdraw_all(snapshot.pair).await {
            Ok(outcome) if outcome.success => {
                info!(
                    pair = %snapshot.pair,
                    tx_hash = ?outcome.tx_hash,
                    "Liquidity removed from {}",
                    snapshot.label
                );
            }
            Ok(_) => {
                warn!(pair = %snapshot.pair, "Nothing withdrawn from {}", snapshot.label);
            }
            Err(e) => {
                error!(
                    pair = %snapshot.pair,
                    error = %e,
                    "Withdrawal from {} failed",
                    snapshot.label
                );
            }
        }
    }

    async fn failure_backoff(&self) {
        if self.settings.failure_backoff.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.settings.failure_backoff) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }
}
