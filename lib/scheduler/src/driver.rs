//! Background driver that fires due non-blocking timers.
//!
//! Blocking delays are not driven here: the host that suspended the
//! conversation owns its wake-up and calls
//! [`DelayScheduler::on_timer_fire`] itself.

use crate::config::SchedulerConfig;
use crate::error::DeliveryError;
use crate::manager::{DelayScheduler, FireOutcome};
use crate::timer::Resumption;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Receives resumptions for fired timers.
#[async_trait]
pub trait ResumptionSink: Send + Sync {
    /// Hands a fired timer to the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot accept it. The timer is already
    /// gone by then and is not retried.
    async fn deliver(&self, resumption: Resumption) -> Result<(), DeliveryError>;
}

/// Polls a [`DelayScheduler`] and delivers fired timers to a sink.
pub struct TimerDriver<S> {
    scheduler: Arc<DelayScheduler>,
    sink: S,
    tick: Duration,
}

impl<S: ResumptionSink> TimerDriver<S> {
    #[must_use]
    pub fn new(scheduler: Arc<DelayScheduler>, sink: S, config: &SchedulerConfig) -> Self {
        Self {
            scheduler,
            sink,
            tick: config.tick_interval(),
        }
    }

    /// Fires every timer due at `now`. Returns how many were delivered.
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        let mut delivered = 0;
        for handle in self.scheduler.due_timers(now) {
            let FireOutcome::Fired(resumption) = self.scheduler.on_timer_fire(handle, now) else {
                debug!(%handle, "timer changed before firing");
                continue;
            };
            let conversation_id = resumption.conversation_id;
            match self.sink.deliver(resumption).await {
                Ok(()) => delivered += 1,
                Err(error) => {
                    warn!(%handle, %conversation_id, %error, "dropping undelivered resumption");
                }
            }
        }
        delivered
    }

    /// Runs until `shutdown` turns true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_ms = self.tick.as_millis(), "timer driver started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let fired = self.tick(Utc::now()).await;
                    if fired > 0 {
                        debug!(fired, "timers fired");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("timer driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::DelayOutcome;
    use chatflow_context::ExecutionContext;
    use chatflow_core::ConversationId;
    use chatflow_flow::{DelayConfig, FlowNode};
    use chrono::{TimeDelta, TimeZone};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingSink {
        delivered: Arc<Mutex<Vec<Resumption>>>,
        fail: bool,
    }

    #[async_trait]
    impl ResumptionSink for RecordingSink {
        async fn deliver(&self, resumption: Resumption) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::new("host offline"));
            }
            self.delivered.lock().unwrap().push(resumption);
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn arm(scheduler: &DelayScheduler, node: &str, config: DelayConfig) -> DelayOutcome {
        scheduler
            .arm_delay(
                ConversationId::new(),
                &FlowNode::delay(node, config),
                &ExecutionContext::new(t0()),
            )
            .expect("arm")
    }

    #[tokio::test]
    async fn tick_fires_due_armed_timers_only() {
        let scheduler = Arc::new(DelayScheduler::new());
        arm(&scheduler, "soon", DelayConfig::fixed(10));
        arm(&scheduler, "later", DelayConfig::fixed(100));
        arm(&scheduler, "blocking", DelayConfig::fixed(5).with_blocking(true));

        let sink = RecordingSink::default();
        let driver =
            TimerDriver::new(Arc::clone(&scheduler), sink.clone(), &SchedulerConfig::default());

        assert_eq!(driver.tick(t0() + TimeDelta::seconds(10)).await, 1);
        assert_eq!(driver.tick(t0() + TimeDelta::seconds(10)).await, 0);

        let delivered = sink.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].node_id, "soon");
        assert_eq!(scheduler.active_count(), 2);
    }

    #[tokio::test]
    async fn failed_delivery_is_not_retried() {
        let scheduler = Arc::new(DelayScheduler::new());
        arm(&scheduler, "soon", DelayConfig::fixed(1));
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let driver = TimerDriver::new(Arc::clone(&scheduler), sink, &SchedulerConfig::default());

        assert_eq!(driver.tick(t0() + TimeDelta::seconds(1)).await, 0);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let scheduler = Arc::new(DelayScheduler::new());
        let config = SchedulerConfig { tick_interval_ms: 5 };
        let driver = TimerDriver::new(scheduler, RecordingSink::default(), &config);
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(driver.run(rx));
        tx.send(true).expect("driver listening");
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("driver stopped")
            .expect("driver task");
    }
}
