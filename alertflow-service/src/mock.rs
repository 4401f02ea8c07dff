//! Mock observation feed for load testing and local development.
//!
//! On a fixed cycle the feed expands every subscription's flights into
//! (target, condition) pairs, generates a sticky on/off observation value for
//! each, and drives the full production protocol against the pipeline:
//! enqueue all rows, then signal end-of-cycle and wait for the flush.
//!
//! Values are sticky so alerts look realistic: once a (target, condition)
//! pair flips on it stays on for a few minutes before it may flip off again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alertflow::alert_error;
use alertflow::concurrency::shutdown::ShutdownRx;
use alertflow::error::{AlertResult, ErrorKind};
use alertflow::ingest::IngestQueue;
use alertflow::types::{ConditionTemplate, ObservationRow, Subscription, TargetKind};
use alertflow_config::shared::MockConfig;
use alertflow_postgres::loaders::{
    load_condition_templates, load_flight_targets, load_subscriptions,
};
use chrono::Utc;
use rand::Rng;
use sqlx::PgPool;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info, warn};

/// Conditions that trigger when the observed value falls below the threshold
/// instead of exceeding it.
const INVERTED_CONDITIONS: &[&str] = &["fog", "low_altitude", "low_fuel"];

/// How long a sticky alert stays on, lower bound in minutes.
const STICKY_MIN_MINUTES: u64 = 3;

/// One-in-N chance that an off pair flips on in a cycle.
const FLIP_ON_CHANCE: u32 = 10;

#[derive(Debug, Clone, Copy)]
struct AlertState {
    expires_at: Instant,
}

type StickyStates = Mutex<HashMap<(i64, TargetKind, i64), AlertState>>;

/// Handle to a running mock feed task.
#[derive(Debug)]
pub struct MockFeedHandle {
    join_handle: JoinHandle<AlertResult<()>>,
}

impl MockFeedHandle {
    /// Waits for the feed to complete.
    pub async fn wait(self) -> AlertResult<()> {
        match self.join_handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "mock feed task panicked");
                Err(alert_error!(ErrorKind::Unknown, "The mock feed panicked"))
            }
        }
    }
}

/// Generates mock observations and feeds them through the ingestion queue.
#[derive(Debug)]
pub struct MockFeed {
    pool: PgPool,
    queue: IngestQueue,
    cycle: Duration,
    max_concurrent_subscriptions: usize,
    shutdown_rx: ShutdownRx,
}

impl MockFeed {
    pub fn new(
        pool: PgPool,
        queue: IngestQueue,
        mock_config: &MockConfig,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            pool,
            queue,
            cycle: Duration::from_millis(mock_config.cycle_ms),
            max_concurrent_subscriptions: mock_config.max_concurrent_subscriptions,
            shutdown_rx,
        }
    }

    /// Starts the feed in a background task.
    pub fn start(self) -> MockFeedHandle {
        MockFeedHandle {
            join_handle: tokio::spawn(self.run()),
        }
    }

    async fn run(mut self) -> AlertResult<()> {
        // Conditions are loaded once; subscriptions are re-read every cycle
        // so new ones are picked up without a restart.
        let templates = Arc::new(load_condition_templates(&self.pool).await?);
        let sticky: Arc<StickyStates> = Arc::new(Mutex::new(HashMap::new()));

        info!(
            cycle_ms = self.cycle.as_millis() as u64,
            conditions = templates.len(),
            "starting mock observation feed"
        );

        let mut cycle_interval = interval_at(Instant::now() + self.cycle, self.cycle);
        cycle_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown signal received, stopping mock observation feed");
                    return Ok(());
                }

                _ = cycle_interval.tick() => {
                    if let Err(err) = self.run_cycle(&templates, &sticky).await {
                        // A dead queue means the pipeline stopped; anything
                        // else only spoils this cycle.
                        if err.kind() == ErrorKind::InvalidState {
                            info!("ingestion queue is gone, stopping mock observation feed");
                            return Ok(());
                        }

                        warn!(error = %err, "mock production cycle failed");
                    }
                }
            }
        }
    }

    async fn run_cycle(
        &self,
        templates: &Arc<Vec<ConditionTemplate>>,
        sticky: &Arc<StickyStates>,
    ) -> AlertResult<()> {
        let started = Instant::now();
        let subscriptions = load_subscriptions(&self.pool).await?;
        let permits = Arc::new(Semaphore::new(self.max_concurrent_subscriptions));

        let mut tasks = JoinSet::new();
        for subscription in subscriptions {
            let pool = self.pool.clone();
            let queue = self.queue.clone();
            let templates = templates.clone();
            let sticky = sticky.clone();
            let permits = permits.clone();

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return 0;
                };

                match produce_subscription(&pool, &queue, &templates, &sticky, &subscription).await
                {
                    Ok(flights) => flights,
                    Err(err) => {
                        warn!(
                            subscription_id = %subscription.id,
                            error = %err,
                            "failed to produce observations for subscription"
                        );
                        0
                    }
                }
            });
        }

        let mut flights = 0usize;
        while let Some(result) = tasks.join_next().await {
            flights += result.unwrap_or(0);
        }

        // Rendezvous: returns once everything produced above is flushed and
        // merged.
        self.queue.end_cycle().await?;

        info!(
            flights,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "completed mock production cycle"
        );

        Ok(())
    }
}

/// Produces one cycle's observations for a single subscription.
///
/// Returns the number of flights processed. The `start_update` and
/// `finish_update` stamps bracket the production window; database triggers
/// use them to notify about the refreshed subscription.
async fn produce_subscription(
    pool: &PgPool,
    queue: &IngestQueue,
    templates: &[ConditionTemplate],
    sticky: &StickyStates,
    subscription: &Subscription,
) -> AlertResult<usize> {
    let _ = sqlx::query("update subscriptions set start_update = now() where id = $1")
        .bind(subscription.id.0)
        .execute(pool)
        .await;

    let flights = load_flight_targets(pool, &subscription.view_name).await?;

    for flight in &flights {
        for (target_id, target_kind) in flight.targets() {
            for template in templates
                .iter()
                .filter(|template| template.target_kind == target_kind)
            {
                let (is_on, value) = sticky_value(sticky, template, target_id, target_kind).await;

                queue
                    .enqueue(ObservationRow {
                        condition_id: template.id,
                        target_id,
                        target_kind,
                        is_on,
                        payload: serde_json::json!({"helper": "mock", "value": value}),
                        received_at: Utc::now(),
                    })
                    .await?;
            }
        }
    }

    let _ = sqlx::query("update subscriptions set finish_update = now() where id = $1")
        .bind(subscription.id.0)
        .execute(pool)
        .await;

    Ok(flights.len())
}

/// Decides whether the (target, condition) pair is currently alerting and
/// generates a plausible observed value for that state.
async fn sticky_value(
    sticky: &StickyStates,
    template: &ConditionTemplate,
    target_id: i64,
    target_kind: TargetKind,
) -> (bool, i64) {
    let key = (target_id, target_kind, template.id);
    let now = Instant::now();

    let mut states = sticky.lock().await;
    let is_on = match states.get(&key) {
        Some(state) if now < state.expires_at => true,
        _ => {
            states.remove(&key);

            let mut rng = rand::thread_rng();
            if rng.gen_range(0..FLIP_ON_CHANCE) == 0 {
                let minutes = rng.gen_range(STICKY_MIN_MINUTES..STICKY_MIN_MINUTES + 3);
                states.insert(
                    key,
                    AlertState {
                        expires_at: now + Duration::from_secs(minutes * 60),
                    },
                );
                true
            } else {
                false
            }
        }
    };
    drop(states);

    (is_on, generate_value(template, is_on))
}

/// Generates a value on the alerting or non-alerting side of the threshold.
///
/// Inverted conditions alert below their threshold, e.g. `low_fuel` with
/// threshold 20 alerts at 15, not at 25.
fn generate_value(template: &ConditionTemplate, is_on: bool) -> i64 {
    let offset = rand::thread_rng().gen_range(1..=50);
    let inverted = INVERTED_CONDITIONS.contains(&template.name.as_str());

    if is_on != inverted {
        template.threshold + offset
    } else {
        template.threshold - offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str, threshold: i64) -> ConditionTemplate {
        ConditionTemplate {
            id: 1,
            target_kind: TargetKind::Flight,
            threshold,
            name: name.to_owned(),
        }
    }

    #[test]
    fn normal_conditions_alert_above_the_threshold() {
        let template = template("high_wind", 100);

        for _ in 0..50 {
            assert!(generate_value(&template, true) > 100);
            assert!(generate_value(&template, false) < 100);
        }
    }

    #[test]
    fn inverted_conditions_alert_below_the_threshold() {
        let template = template("low_fuel", 20);

        for _ in 0..50 {
            assert!(generate_value(&template, true) < 20);
            assert!(generate_value(&template, false) > 20);
        }
    }

    #[tokio::test]
    async fn sticky_pairs_stay_on_until_expiry() {
        let sticky: StickyStates = Mutex::new(HashMap::new());
        let template = template("high_wind", 100);

        sticky.lock().await.insert(
            (7, TargetKind::Flight, template.id),
            AlertState {
                expires_at: Instant::now() + Duration::from_secs(60),
            },
        );

        for _ in 0..10 {
            let (is_on, value) = sticky_value(&sticky, &template, 7, TargetKind::Flight).await;
            assert!(is_on);
            assert!(value > 100);
        }
    }

    #[tokio::test]
    async fn expired_pairs_are_rerolled() {
        let sticky: StickyStates = Mutex::new(HashMap::new());
        let template = template("high_wind", 100);

        sticky.lock().await.insert(
            (7, TargetKind::Flight, template.id),
            AlertState {
                // Already expired.
                expires_at: Instant::now() - Duration::from_secs(1),
            },
        );

        let _ = sticky_value(&sticky, &template, 7, TargetKind::Flight).await;

        let states = sticky.lock().await;
        let state = states.get(&(7, TargetKind::Flight, template.id));
        // Either the reroll flipped it back on with a fresh expiry, or the
        // entry is gone.
        if let Some(state) = state {
            assert!(state.expires_at > Instant::now());
        }
    }
}
