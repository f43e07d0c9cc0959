//! Background loop that keeps the reconciler running.
//!
//! Passes fire on a fixed refresh interval and whenever a new position set is
//! submitted. Retries fire on a shorter tick. Both run as detached tasks so a
//! slow pass never delays a retry.

use super::reconciler::{PassOutcome, ReconcileRequest, Reconciler};
use crate::domain::TimeMs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub struct Driver {
    reconciler: Arc<Reconciler>,
    requests: watch::Sender<Option<Arc<ReconcileRequest>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Driver {
    pub fn spawn(reconciler: Arc<Reconciler>, refresh: Duration, tick: Duration) -> Self {
        let (requests, rx) = watch::channel(None);
        let handle = tokio::spawn(run_loop(reconciler.clone(), rx, refresh, tick));
        info!(
            refresh_ms = refresh.as_millis() as u64,
            tick_ms = tick.as_millis() as u64,
            "Reconciliation driver started"
        );
        Self {
            reconciler,
            requests,
            task: Mutex::new(Some(handle)),
        }
    }

    /// Replace the tracked position set and trigger a pass.
    pub fn submit(&self, request: ReconcileRequest) {
        self.requests.send_replace(Some(Arc::new(request)));
    }

    pub fn current_request(&self) -> Option<Arc<ReconcileRequest>> {
        self.requests.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the loop and drop every cached result and pending retry.
    pub async fn shutdown(&self) {
        let handle = self.lock_task().take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.reconciler.reset().await;
        info!("Reconciliation driver stopped");
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_task().take() {
            handle.abort();
        }
    }
}

async fn run_loop(
    reconciler: Arc<Reconciler>,
    mut requests: watch::Receiver<Option<Arc<ReconcileRequest>>>,
    refresh: Duration,
    tick: Duration,
) {
    let mut refresh_timer = tokio::time::interval(refresh);
    refresh_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut retry_timer = tokio::time::interval(tick);
    retry_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = refresh_timer.tick() => {
                let current = requests.borrow().clone();
                spawn_pass(&reconciler, current);
            }
            changed = requests.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = requests.borrow_and_update().clone();
                spawn_pass(&reconciler, current);
            }
            _ = retry_timer.tick() => {
                let reconciler = reconciler.clone();
                tokio::spawn(async move {
                    let report = reconciler.tick(TimeMs::now()).await;
                    if report.attempted > 0 {
                        debug!(
                            attempted = report.attempted,
                            settled = report.settled,
                            rescheduled = report.rescheduled,
                            exhausted = report.exhausted,
                            "Retry tick complete"
                        );
                    }
                });
            }
        }
    }
    debug!("Reconciliation driver loop exited");
}

fn spawn_pass(reconciler: &Arc<Reconciler>, request: Option<Arc<ReconcileRequest>>) {
    let Some(request) = request else {
        return;
    };
    let reconciler = reconciler.clone();
    tokio::spawn(async move {
        if let PassOutcome::Skipped = reconciler.reconcile(&request, TimeMs::now()).await {
            debug!("Pass skipped; previous pass still running");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{MockChainClient, MockIndexer, ViewTarget};
    use crate::domain::{AssetSymbol, LedgerEvent, ObjectId, Position, ReconciliationState};
    use crate::engine::RetryPolicy;
    use crate::orchestration::{CostBasisFetcher, ValueBatcher};

    fn id(s: &str) -> ObjectId {
        ObjectId::parse(s).unwrap()
    }

    fn reconciler() -> Arc<Reconciler> {
        let key = id("0xa");
        let chain = MockChainClient::new().with_value(&key, 1200);
        let indexer = MockIndexer::new().with_events(
            &key,
            vec![LedgerEvent::supply(1000, 1000, TimeMs::new(1))],
            vec![],
        );
        Arc::new(Reconciler::new(
            ValueBatcher::new(
                Arc::new(chain),
                ViewTarget::new(id("0xbeef"), "lending_view", "supply_balance"),
            ),
            CostBasisFetcher::new(Arc::new(indexer), 10_000),
            RetryPolicy::default(),
        ))
    }

    #[tokio::test]
    async fn test_submit_triggers_pass_and_shutdown_clears() {
        let reconciler = reconciler();
        let driver = Driver::spawn(
            reconciler.clone(),
            Duration::from_secs(3600),
            Duration::from_millis(20),
        );
        let mut updates = reconciler.subscribe();

        driver.submit(ReconcileRequest::new(vec![Position::new(
            id("0x1"),
            id("0xa"),
            AssetSymbol::new("SUI".to_string()),
            1000,
        )]));

        let settled = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                updates.changed().await.unwrap();
                let snapshot = updates.borrow_and_update().clone();
                if snapshot
                    .get(&id("0xa"))
                    .is_some_and(|e| e.reconciliation_state == ReconciliationState::Settled)
                {
                    return snapshot;
                }
            }
        })
        .await
        .expect("position should settle");
        assert_eq!(settled[&id("0xa")].interest_earned, Some(200));
        assert!(driver.is_running());

        driver.shutdown().await;
        assert!(!driver.is_running());
        assert!(reconciler.snapshot().is_empty());
    }
}
