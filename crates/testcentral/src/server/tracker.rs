//! Subscription tracking and the heartbeat notification task

use crate::clock::TickClock;
use crate::error::{Error, Result};
use crate::gatt::CharacteristicHandle;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// A periodic heartbeat on one characteristic.
///
/// The task is aborted when dropped, so it can never outlive its owner.
struct NotificationTask {
    characteristic: CharacteristicHandle,
    handle: JoinHandle<()>,
}

impl NotificationTask {
    fn spawn<T: Transport>(
        transport: Arc<T>,
        characteristic: CharacteristicHandle,
        period: Duration,
        clock: Arc<TickClock>,
    ) -> Self {
        let first_tick = Instant::now() + period;
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let payload = clock.now_bytes();
                match transport.notify(&characteristic, &payload).await {
                    Ok(()) => trace!(payload = %hex::encode(payload), "heartbeat sent"),
                    Err(err) => warn!(
                        uuid = %characteristic.uuid,
                        error = %err,
                        "heartbeat notification failed"
                    ),
                }
            }
        });
        Self {
            characteristic,
            handle,
        }
    }

    /// Aborts the task and waits until it has stopped
    async fn cancel(mut self) {
        self.handle.abort();
        if let Err(err) = (&mut self.handle).await {
            if err.is_panic() {
                error!(uuid = %self.characteristic.uuid, "heartbeat task panicked");
            }
        }
    }
}

impl Drop for NotificationTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Starts and stops the heartbeat as the subscriber count moves between zero
/// and non-zero. Only the count matters, never which centrals are subscribed.
pub struct SubscriptionTracker<T> {
    transport: Arc<T>,
    clock: Arc<TickClock>,
    period: Duration,
    subscribers: usize,
    task: Option<NotificationTask>,
}

impl<T: Transport> SubscriptionTracker<T> {
    pub fn new(transport: Arc<T>, clock: Arc<TickClock>, period: Duration) -> Self {
        Self {
            transport,
            clock,
            period,
            subscribers: 0,
            task: None,
        }
    }

    /// Last reported subscriber count
    pub fn subscribers(&self) -> usize {
        self.subscribers
    }

    /// Whether a heartbeat task is live
    pub fn is_notifying(&self) -> bool {
        self.task.is_some()
    }

    /// Applies a subscriber-count change for `characteristic`
    pub async fn on_subscribers_changed(
        &mut self,
        characteristic: &CharacteristicHandle,
        count: usize,
    ) -> Result<()> {
        let previous = std::mem::replace(&mut self.subscribers, count);
        debug!(uuid = %characteristic.uuid, previous, count, "subscribers changed");

        if count == 0 {
            self.cancel().await;
        } else if self.task.is_none() {
            self.start_task(characteristic)?;
        }
        Ok(())
    }

    fn start_task(&mut self, characteristic: &CharacteristicHandle) -> Result<()> {
        if let Some(task) = &self.task {
            return Err(Error::DuplicateTask(task.characteristic.uuid));
        }
        info!(
            uuid = %characteristic.uuid,
            period_ms = self.period.as_millis() as u64,
            "starting heartbeat notifications"
        );
        self.task = Some(NotificationTask::spawn(
            self.transport.clone(),
            *characteristic,
            self.period,
            self.clock.clone(),
        ));
        Ok(())
    }

    /// Cancels the heartbeat, if any. No tick fires once this returns.
    pub async fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            info!(uuid = %task.characteristic.uuid, "stopping heartbeat notifications");
            task.cancel().await;
        }
    }

    /// Cancels the heartbeat and forgets the subscriber count, for when the
    /// characteristic itself goes away.
    pub async fn reset(&mut self) {
        self.cancel().await;
        self.subscribers = 0;
    }
}
